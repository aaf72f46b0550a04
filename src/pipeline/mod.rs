use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

pub mod core;
pub mod keys;
pub mod steps;

pub use crate::error::PipelineError;
pub use core::{BuildStep, Pipeline};
pub use keys::*;

/// Data handed from step to step
#[derive(Clone)]
pub struct PipeMap {
    data: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl PipeMap {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Insert a value with a typed key (compile-time type checking)
    pub fn insert_typed<T: Any + Send + Sync>(&mut self, key: TypedKey<T>, value: T) {
        self.data.insert(key.name().to_string(), Arc::new(value));
    }

    /// Get a value with a typed key (compile-time type checking)
    pub fn get_typed<T: Any + Send + Sync>(&self, key: TypedKey<T>) -> Option<&T> {
        self.data
            .get(key.name())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Get a value, failing with a missing-input error naming `step`
    pub fn require<T: Any + Send + Sync>(
        &self,
        key: TypedKey<T>,
        step: &str,
    ) -> Result<&T, PipelineError> {
        self.get_typed(key).ok_or_else(|| PipelineError::MissingInput {
            step: step.to_string(),
            required: key.name().to_string(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    // Get all keys for debugging
    pub fn keys(&self) -> Vec<&String> {
        self.data.keys().collect()
    }
}

impl Default for PipeMap {
    fn default() -> Self {
        Self::new()
    }
}

use crate::bundle::output::FileOrigin;
use crate::config::BuildConfig;
use crate::pipeline::steps::styles::CompiledStyle;
use crate::pipeline::steps::toolchain::ToolchainArtifacts;
use indexmap::IndexMap;
/// Type-safe keys for PipeMap
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A type-safe key for PipeMap that enforces compile-time type checking
pub struct TypedKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> TypedKey<T> {
    /// Create a new typed key with a static name
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    /// Get the key name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for TypedKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypedKey<T> {}

/// Build configuration shared by every step
pub const CONFIG: TypedKey<Arc<BuildConfig>> = TypedKey::new("config");

/// Cancellation for the build in flight
pub const CANCELLATION: TypedKey<CancellationToken> = TypedKey::new("cancellation");

/// Directory the bundle is assembled in before commit
pub const STAGING_DIR: TypedKey<PathBuf> = TypedKey::new("staging_dir");

/// Loader script and binary module produced by the toolchain
pub const TOOLCHAIN_ARTIFACTS: TypedKey<ToolchainArtifacts> =
    TypedKey::new("toolchain_artifacts");

/// Compiled stylesheets reachable from the entry script
pub const STYLESHEETS: TypedKey<Vec<CompiledStyle>> = TypedKey::new("stylesheets");

/// Copied assets: output-relative destination -> source file
pub const COPIED_ASSETS: TypedKey<IndexMap<PathBuf, PathBuf>> = TypedKey::new("copied_assets");

/// Every file written to the staging directory
pub const BUNDLE_FILES: TypedKey<IndexMap<PathBuf, FileOrigin>> = TypedKey::new("bundle_files");

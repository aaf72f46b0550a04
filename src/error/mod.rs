/// Centralized error handling for webbundle
pub mod bundle;
pub mod pipeline;

pub use bundle::{BundleError, Result};
pub use pipeline::PipelineError;

/// Pipeline assembly and validation error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing required input '{required}' for step '{step}'")]
    MissingInput { step: String, required: String },

    #[error("Missing required output '{required}' for step '{step}'")]
    MissingOutput { step: String, required: String },

    #[error("Pipeline configuration error: {message}")]
    ConfigError { message: String },
}

impl PipelineError {
    /// Create a new ConfigError
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }
}

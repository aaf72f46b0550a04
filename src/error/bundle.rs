/// Unified error type for webbundle
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    // External compiler or preprocessor failed or is missing
    #[error("Toolchain `{tool}` failed: {message}{}", fmt_diagnostics(.diagnostics))]
    Toolchain {
        tool: String,
        message: String,
        diagnostics: String,
    },

    // A declared copy source is missing or cannot be placed
    #[error("Asset error for {}: {message}", .path.display())]
    Asset { path: PathBuf, message: String },

    #[error("Stylesheet {} failed to compile: {message}", .path.display())]
    Style { path: PathBuf, message: String },

    #[error("Cannot bind dev server to {addr}: address already in use")]
    PortInUse {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::error::PipelineError),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using BundleError
pub type Result<T> = std::result::Result<T, BundleError>;

fn fmt_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("\n{trimmed}")
    }
}

impl BundleError {
    /// Create a toolchain error with captured diagnostic output
    pub fn toolchain(
        tool: impl Into<String>,
        message: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::Toolchain {
            tool: tool.into(),
            message: message.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create an asset error
    pub fn asset(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Asset {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a stylesheet error
    pub fn style(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Style {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether the error only means the build was superseded
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BundleError = io_err.into();

        assert!(matches!(err, BundleError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_toolchain_error_carries_diagnostics() {
        let err = BundleError::toolchain("wasm-pack", "exited with status 1", "error[E0425]: x\n");
        assert_eq!(
            err.to_string(),
            "Toolchain `wasm-pack` failed: exited with status 1\nerror[E0425]: x"
        );
    }

    #[test]
    fn test_toolchain_error_without_diagnostics() {
        let err = BundleError::toolchain("sass", "not found", "  ");
        assert_eq!(err.to_string(), "Toolchain `sass` failed: not found");
    }

    #[test]
    fn test_asset_error() {
        let err = BundleError::asset("static", "source does not exist");
        assert_eq!(
            err.to_string(),
            "Asset error for static: source does not exist"
        );
    }
}

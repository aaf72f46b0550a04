pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod server;
pub mod util;
pub mod watch;

pub use bundle::Orchestrator;
pub use bundle::output::{BuildOutput, FileOrigin};
pub use config::{BuildConfig, Mode};
pub use error::{BundleError, Result};

pub mod build;
pub mod constants;

pub use build::{
    AssetRule, BuildConfig, ConfigFile, Mode, Overrides, ServerConfig, StyleCompiler,
    StyleConfig, ToolchainConfig, WatchConfig,
};

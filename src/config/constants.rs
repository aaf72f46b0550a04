//! Constants for webbundle

/// Default project configuration file
pub const CONFIG_FILE: &str = "bundle.toml";

/// Default entry script
pub const DEFAULT_ENTRY: &str = "bootstrap.js";

/// Default output directory
pub const DEFAULT_OUT_DIR: &str = "dist";

/// Default entry script filename in the output directory
pub const DEFAULT_SCRIPT: &str = "index.js";

/// Default binary module filename in the output directory
pub const DEFAULT_MODULE: &str = "index.wasm";

/// Default index document, also used for fallback routing
pub const DEFAULT_INDEX: &str = "index.html";

/// Default URL prefix the index document loads the entry script from
pub const DEFAULT_PUBLIC_PATH: &str = "/";

/// Default static asset directory
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Default external toolchain
pub const DEFAULT_TOOLCHAIN: &str = "wasm-pack";

/// Default toolchain output directory, relative to the crate directory
pub const DEFAULT_TOOLCHAIN_OUT_DIR: &str = "pkg";

/// Default toolchain target
pub const DEFAULT_TOOLCHAIN_TARGET: &str = "web";

/// Default external stylesheet preprocessor
pub const DEFAULT_SASS: &str = "sass";

/// Default dev server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default dev server port
pub const DEFAULT_PORT: u16 = 8000;

/// Default debounce window for watch mode
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// Supported stylesheet extensions
pub const STYLE_EXTENSIONS: &[&str] = &["sass", "scss"];

/// Directory name for run logs under the system temp dir
pub const LOG_DIR: &str = "webbundle/logs";

/// Run logs kept per log directory
pub const KEEP_LOG_FILES: usize = 20;

/// Build configuration: defaults, `bundle.toml` loading and CLI overrides
use crate::config::constants;
use crate::error::{BundleError, Result};
use crate::util::file::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Build mode selected on the command line
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }

    /// Development builds keep watching sources after the first build
    pub fn watches(self) -> bool {
        !self.is_production()
    }

    /// Dev server responses are compressed only for production builds
    pub fn compresses(self) -> bool {
        self.is_production()
    }

    /// Profile flag handed to the toolchain
    pub fn profile_flag(self) -> &'static str {
        match self {
            Mode::Development => "--dev",
            Mode::Production => "--release",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Development => write!(f, "development"),
            Mode::Production => write!(f, "production"),
        }
    }
}

/// External compiler toolchain settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub program: String,
    pub crate_dir: PathBuf,
    /// Where the toolchain writes its artifacts, relative to `crate_dir`
    pub out_dir: PathBuf,
    pub out_name: Option<String>,
    pub target: String,
    pub extra_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: constants::DEFAULT_TOOLCHAIN.to_string(),
            crate_dir: PathBuf::from("."),
            out_dir: PathBuf::from(constants::DEFAULT_TOOLCHAIN_OUT_DIR),
            out_name: None,
            target: constants::DEFAULT_TOOLCHAIN_TARGET.to_string(),
            extra_args: vec!["--no-typescript".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleCompiler {
    /// Compile in process with grass
    #[default]
    Builtin,
    /// Run a sass-compatible binary
    External,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleConfig {
    pub compiler: StyleCompiler,
    pub program: String,
    pub load_paths: Vec<PathBuf>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            compiler: StyleCompiler::Builtin,
            program: constants::DEFAULT_SASS.to_string(),
            load_paths: Vec::new(),
        }
    }
}

/// One copy rule of the asset manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetRule {
    pub from: PathBuf,
    /// Destination relative to the output directory; empty means the root
    #[serde(default)]
    pub to: PathBuf,
}

impl AssetRule {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                BundleError::invalid_config(format!("invalid server host '{}': {e}", self.host))
            })?
            .next()
            .ok_or_else(|| {
                BundleError::invalid_config(format!("server host '{}' did not resolve", self.host))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// Extra roots to watch besides the crate sources, assets and stylesheets
    pub paths: Vec<PathBuf>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            paths: Vec::new(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

/// Raw contents of `bundle.toml`, every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub mode: Option<Mode>,
    pub entry: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub script: Option<String>,
    pub module: Option<String>,
    pub index: Option<String>,
    pub public_path: Option<String>,
    pub toolchain: ToolchainConfig,
    pub styles: StyleConfig,
    pub assets: Option<Vec<AssetRule>>,
    pub server: ServerConfig,
    pub watch: WatchConfig,
}

impl ConfigFile {
    pub fn parse(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| BundleError::invalid_config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            BundleError::invalid_config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&source)
    }
}

/// Values taken from the command line, applied on top of the config file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<Mode>,
    pub out_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub watch: Option<bool>,
    pub serve: bool,
}

/// Immutable build configuration, created once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    /// Directory relative paths were resolved against
    pub root: PathBuf,
    pub mode: Mode,
    pub entry: PathBuf,
    pub out_dir: PathBuf,
    /// Entry script filename in the output directory
    pub script: String,
    /// Binary module filename in the output directory
    pub module: String,
    /// Index document, also the fallback for unknown routes
    pub index: String,
    /// URL prefix of the bundle, absolute so deep routes still find the script
    pub public_path: String,
    pub toolchain: ToolchainConfig,
    pub styles: StyleConfig,
    pub assets: Vec<AssetRule>,
    pub server: ServerConfig,
    pub watch: WatchConfig,
    pub watch_enabled: bool,
    pub serve_enabled: bool,
}

impl BuildConfig {
    /// Load `bundle.toml` (explicit path, or the default file if present) and apply overrides
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let (file, root) = match config_path {
            Some(path) => {
                let path = normalize(&cwd.join(path));
                debug!("Loading config from {:?}", path);
                let root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
                (ConfigFile::load(&path)?, root)
            }
            None => {
                let default_path = cwd.join(constants::CONFIG_FILE);
                if default_path.is_file() {
                    debug!("Loading config from {:?}", default_path);
                    (ConfigFile::load(&default_path)?, cwd)
                } else {
                    debug!("No {} found, using defaults", constants::CONFIG_FILE);
                    (ConfigFile::default(), cwd)
                }
            }
        };
        Self::from_file(file, &root, overrides)
    }

    /// Resolve a parsed config file against `root`
    pub fn from_file(file: ConfigFile, root: &Path, overrides: &Overrides) -> Result<Self> {
        let root = normalize(root);
        let resolve = |p: &Path| normalize(&root.join(p));

        let mode = overrides.mode.or(file.mode).unwrap_or_default();

        let mut toolchain = file.toolchain;
        toolchain.crate_dir = resolve(&toolchain.crate_dir);
        toolchain.out_dir = normalize(&toolchain.crate_dir.join(&toolchain.out_dir));

        let mut styles = file.styles;
        styles.load_paths = styles.load_paths.iter().map(|p| resolve(p)).collect();

        let assets = file
            .assets
            .unwrap_or_else(|| vec![AssetRule::new(constants::DEFAULT_STATIC_DIR, "")])
            .into_iter()
            .map(|rule| AssetRule {
                from: resolve(&rule.from),
                to: rule.to,
            })
            .collect();

        let mut server = file.server;
        if let Some(port) = overrides.port {
            server.port = port;
        }

        let mut watch = file.watch;
        watch.paths = watch.paths.iter().map(|p| resolve(p)).collect();

        let out_dir = overrides
            .out_dir
            .clone()
            .or(file.out_dir)
            .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_OUT_DIR));

        let config = Self {
            mode,
            entry: resolve(&file.entry.unwrap_or_else(|| PathBuf::from(constants::DEFAULT_ENTRY))),
            out_dir: resolve(&out_dir),
            script: file
                .script
                .unwrap_or_else(|| constants::DEFAULT_SCRIPT.to_string()),
            module: file
                .module
                .unwrap_or_else(|| constants::DEFAULT_MODULE.to_string()),
            index: file
                .index
                .unwrap_or_else(|| constants::DEFAULT_INDEX.to_string()),
            public_path: file
                .public_path
                .unwrap_or_else(|| constants::DEFAULT_PUBLIC_PATH.to_string()),
            toolchain,
            styles,
            assets,
            server,
            watch,
            watch_enabled: overrides.watch.unwrap_or_else(|| mode.watches()),
            serve_enabled: overrides.serve,
            root,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, name) in [
            ("script", &self.script),
            ("module", &self.module),
            ("index", &self.index),
        ] {
            if !is_plain_file_name(name) {
                return Err(BundleError::invalid_config(format!(
                    "`{key}` must be a plain file name, got '{name}'"
                )));
            }
        }
        if self.script == self.module || self.script == self.index || self.module == self.index {
            return Err(BundleError::invalid_config(
                "`script`, `module` and `index` must be distinct file names",
            ));
        }
        if !self.public_path.ends_with('/') {
            return Err(BundleError::invalid_config(format!(
                "`public_path` must end with '/', got '{}'",
                self.public_path
            )));
        }
        if self.toolchain.program.trim().is_empty() {
            return Err(BundleError::invalid_config("`toolchain.program` is empty"));
        }
        for rule in &self.assets {
            let escapes = rule
                .to
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(BundleError::invalid_config(format!(
                    "asset destination '{}' must stay inside the output directory",
                    rule.to.display()
                )));
            }
        }
        if self.root.starts_with(&self.out_dir) {
            return Err(BundleError::invalid_config(
                "the output directory cannot contain the project root",
            ));
        }
        Ok(())
    }

    /// URL the index document loads the entry script from
    pub fn script_url(&self) -> String {
        format!("{}{}", self.public_path, self.script)
    }

    /// Name handed to the toolchain for its generated files
    pub fn toolchain_out_name(&self) -> String {
        self.toolchain.out_name.clone().unwrap_or_else(|| {
            Path::new(&self.script)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "index".to_string())
        })
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/project")
    }

    #[test]
    fn test_defaults() {
        let config =
            BuildConfig::from_file(ConfigFile::default(), &root(), &Overrides::default()).unwrap();

        assert_eq!(config.mode, Mode::Development);
        assert_eq!(config.entry, PathBuf::from("/project/bootstrap.js"));
        assert_eq!(config.out_dir, PathBuf::from("/project/dist"));
        assert_eq!(config.script, "index.js");
        assert_eq!(config.module, "index.wasm");
        assert_eq!(config.index, "index.html");
        assert_eq!(config.public_path, "/");
        assert_eq!(config.script_url(), "/index.js");
        assert_eq!(config.toolchain.crate_dir, PathBuf::from("/project"));
        assert_eq!(config.toolchain.out_dir, PathBuf::from("/project/pkg"));
        assert_eq!(config.toolchain.extra_args, vec!["--no-typescript"]);
        assert_eq!(
            config.assets,
            vec![AssetRule::new("/project/static", "")]
        );
        assert_eq!(config.server.port, 8000);
        assert!(config.watch_enabled);
        assert!(!config.serve_enabled);
    }

    #[test]
    fn test_parse_file() {
        let file = ConfigFile::parse(
            r#"
            entry = "web/bootstrap.js"
            out_dir = "public"
            script = "llrs.js"
            module = "llrs.wasm"

            [toolchain]
            crate_dir = "site"
            extra_args = ["--no-typescript", "--no-pack"]

            [styles]
            compiler = "external"
            load_paths = ["scss"]

            [[assets]]
            from = "static"

            [[assets]]
            from = "fonts"
            to = "assets/fonts"

            [server]
            port = 9000

            [watch]
            debounce_ms = 50
            "#,
        )
        .unwrap();

        let config = BuildConfig::from_file(file, &root(), &Overrides::default()).unwrap();
        assert_eq!(config.entry, PathBuf::from("/project/web/bootstrap.js"));
        assert_eq!(config.out_dir, PathBuf::from("/project/public"));
        assert_eq!(config.toolchain.out_dir, PathBuf::from("/project/site/pkg"));
        assert_eq!(config.toolchain_out_name(), "llrs");
        assert_eq!(config.styles.compiler, StyleCompiler::External);
        assert_eq!(config.styles.load_paths, vec![PathBuf::from("/project/scss")]);
        assert_eq!(config.assets.len(), 2);
        assert_eq!(config.assets[1].to, PathBuf::from("assets/fonts"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn test_overrides_win() {
        let file = ConfigFile::parse("mode = \"development\"\n[server]\nport = 9000\n").unwrap();
        let overrides = Overrides {
            mode: Some(Mode::Production),
            out_dir: Some(PathBuf::from("build")),
            port: Some(8080),
            watch: None,
            serve: true,
        };

        let config = BuildConfig::from_file(file, &root(), &overrides).unwrap();
        assert_eq!(config.mode, Mode::Production);
        assert_eq!(config.out_dir, PathBuf::from("/project/build"));
        assert_eq!(config.server.port, 8080);
        assert!(!config.watch_enabled);
        assert!(config.serve_enabled);
    }

    #[test]
    fn test_mode_flags() {
        assert!(Mode::Development.watches());
        assert!(!Mode::Development.compresses());
        assert_eq!(Mode::Development.profile_flag(), "--dev");
        assert!(!Mode::Production.watches());
        assert!(Mode::Production.compresses());
        assert_eq!(Mode::Production.profile_flag(), "--release");
    }

    #[test]
    fn test_rejects_nested_script_name() {
        let file = ConfigFile::parse("script = \"js/app.js\"").unwrap();
        let err = BuildConfig::from_file(file, &root(), &Overrides::default()).unwrap_err();
        assert!(matches!(err, BundleError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_escaping_asset_destination() {
        let file = ConfigFile::parse("[[assets]]\nfrom = \"static\"\nto = \"../outside\"\n").unwrap();
        let err = BuildConfig::from_file(file, &root(), &Overrides::default()).unwrap_err();
        assert!(matches!(err, BundleError::InvalidConfig(_)));
    }

    #[test]
    fn test_public_path() {
        let file = ConfigFile::parse("script = \"llrs.js\"\npublic_path = \"/app/\"\n").unwrap();
        let config = BuildConfig::from_file(file, &root(), &Overrides::default()).unwrap();
        assert_eq!(config.script_url(), "/app/llrs.js");

        let file = ConfigFile::parse("public_path = \"/app\"").unwrap();
        let err = BuildConfig::from_file(file, &root(), &Overrides::default()).unwrap_err();
        assert!(matches!(err, BundleError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(ConfigFile::parse("entri = \"x.js\"").is_err());
    }
}

use crate::config::{BuildConfig, StyleCompiler};
use crate::error::{BundleError, Result};
use crate::pipeline::{BuildStep, CANCELLATION, CONFIG, PipeMap, STYLESHEETS};
use crate::process::{Invocation, ProcessRunner};
use crate::util::file::{is_stylesheet, normalize};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Static `import ... from "x"`, `import "x"` and `require("x")` statements, one per line
static IMPORT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*(?:import[ \t]+(?:[^'";\n]+?[ \t]+from[ \t]+)?|require[ \t]*\([ \t]*)["']([^"'\n]+)["'][ \t]*\)?[ \t]*;?[ \t]*$"#,
    )
    .expect("import pattern is valid")
});

/// Dynamic `import("x")` expressions with a literal specifier
static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport[ \t]*\([ \t]*["']([^"'\n]+)["'][ \t]*\)"#)
        .expect("dynamic import pattern is valid")
});

/// CSS produced from one stylesheet source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStyle {
    pub source: PathBuf,
    pub css: String,
}

/// Module specifiers of every static import in `source`, in order
pub fn import_specifiers(source: &str) -> Vec<String> {
    IMPORT_LINE
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Remove import lines whose specifier matches `drop`
pub fn strip_imports(source: &str, drop: impl Fn(&str) -> bool) -> String {
    IMPORT_LINE
        .replace_all(source, |caps: &Captures| {
            if drop(&caps[1]) {
                String::new()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Point import lines whose specifier matches `retarget` at `target` instead
pub fn retarget_imports(source: &str, retarget: impl Fn(&str) -> bool, target: &str) -> String {
    IMPORT_LINE
        .replace_all(source, |caps: &Captures| {
            if retarget(&caps[1]) {
                caps[0].replacen(&caps[1], target, 1)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Replace whole `import("x")` expressions whose specifier matches `retarget`
pub fn retarget_dynamic_imports(
    source: &str,
    retarget: impl Fn(&str) -> bool,
    expression: &str,
) -> String {
    DYNAMIC_IMPORT
        .replace_all(source, |caps: &Captures| {
            if retarget(&caps[1]) {
                expression.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Stylesheets imported by the entry script, resolved against its directory
pub fn discover_stylesheets(source: &str, entry_dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    for specifier in import_specifiers(source) {
        let path = Path::new(&specifier);
        if !is_stylesheet(path) {
            continue;
        }
        let resolved = normalize(&entry_dir.join(path));
        if !found.contains(&resolved) {
            found.push(resolved);
        }
    }
    found
}

/// Compiles `.sass`/`.scss` sources reachable from the entry script
pub struct CompileStylesStep {
    runner: Arc<dyn ProcessRunner>,
}

impl CompileStylesStep {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn compile(
        &self,
        config: &BuildConfig,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !tokio::fs::try_exists(path).await? {
            return Err(BundleError::style(path, "stylesheet does not exist"));
        }

        match config.styles.compiler {
            StyleCompiler::Builtin => compile_builtin(config, path),
            StyleCompiler::External => self.compile_external(config, path, cancel).await,
        }
    }

    async fn compile_external(
        &self,
        config: &BuildConfig,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let style = if config.mode.is_production() {
            "--style=compressed"
        } else {
            "--style=expanded"
        };
        let invocation = Invocation::new(&config.styles.program)
            .arg(style)
            .arg("--no-source-map")
            .args(
                config
                    .styles
                    .load_paths
                    .iter()
                    .map(|p| format!("--load-path={}", p.display())),
            )
            .arg(path.to_string_lossy())
            .current_dir(&config.root);

        let output = self.runner.run(&invocation, cancel).await?;
        if !output.success {
            return Err(BundleError::style(
                path,
                format!(
                    "{} {}: {}",
                    config.styles.program,
                    output.status_text(),
                    output.stderr_lossy().trim()
                ),
            ));
        }
        Ok(output.stdout_lossy())
    }
}

fn compile_builtin(config: &BuildConfig, path: &Path) -> Result<String> {
    let style = if config.mode.is_production() {
        grass::OutputStyle::Compressed
    } else {
        grass::OutputStyle::Expanded
    };
    let mut options = grass::Options::default()
        .style(style)
        .load_paths(&config.styles.load_paths);
    if let Some(parent) = path.parent() {
        options = options.load_path(parent);
    }

    grass::from_path(path, &options).map_err(|e| BundleError::style(path, e.to_string()))
}

#[async_trait]
impl BuildStep for CompileStylesStep {
    fn name(&self) -> String {
        "CompileStyles".to_string()
    }

    fn input(&self) -> Vec<String> {
        vec!["config".to_string(), "cancellation?".to_string()]
    }

    fn output(&self) -> Vec<String> {
        vec!["stylesheets".to_string()]
    }

    async fn process(&self, mut data: PipeMap) -> Result<PipeMap> {
        let config = data.require(CONFIG, "CompileStyles")?.clone();
        let cancel = data.get_typed(CANCELLATION).cloned().unwrap_or_default();

        let entry_source = tokio::fs::read_to_string(&config.entry)
            .await
            .map_err(|e| {
                BundleError::asset(&config.entry, format!("cannot read entry script: {e}"))
            })?;
        let entry_dir = config.entry.parent().unwrap_or(config.root.as_path());

        let mut compiled = Vec::new();
        for source in discover_stylesheets(&entry_source, entry_dir) {
            info!("Compiling stylesheet {:?}", source);
            let css = self.compile(&config, &source, &cancel).await?;
            debug!("Stylesheet {:?} produced {} bytes of CSS", source, css.len());
            compiled.push(CompiledStyle { source, css });
        }

        data.insert_typed(STYLESHEETS, compiled);
        Ok(data)
    }
}

use crate::bundle::output::FileOrigin;
use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::pipeline::steps::styles::{
    CompiledStyle, retarget_dynamic_imports, retarget_imports, strip_imports,
};
use crate::pipeline::steps::toolchain::ToolchainArtifacts;
use crate::pipeline::{
    BUNDLE_FILES, BuildStep, CONFIG, COPIED_ASSETS, PipeMap, STAGING_DIR, STYLESHEETS,
    TOOLCHAIN_ARTIFACTS,
};
use crate::util::file::{display_relative, is_stylesheet, normalize};
use crate::util::html::HtmlEscape;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{{TITLE}}</title>
  </head>
  <body>
    <script type="module" src="{{SCRIPT}}"></script>
  </body>
</html>
"#;

/// Writes the entry script, the binary module and, when no asset provides
/// one, the index document
pub struct EmitBundleStep;

/// JavaScript that injects each compiled stylesheet as a `<style>` element
pub fn style_prelude(styles: &[CompiledStyle], root: &Path) -> String {
    let mut prelude = String::new();
    for style in styles {
        let source = style
            .source
            .strip_prefix(root)
            .map(display_relative)
            .unwrap_or_else(|_| display_relative(&style.source));
        // serde_json string literals are valid JavaScript string literals
        let css = serde_json::Value::String(style.css.clone()).to_string();
        let source = serde_json::Value::String(source).to_string();
        let _ = writeln!(
            prelude,
            "(() => {{\n  const style = document.createElement(\"style\");\n  style.dataset.source = {source};\n  style.textContent = {css};\n  document.head.appendChild(style);\n}})();"
        );
    }
    prelude
}

/// Point the loader at the renamed binary module
pub fn rewrite_loader(loader: &str, produced_module: &str, module: &str) -> String {
    if produced_module.is_empty() || produced_module == module {
        return loader.to_string();
    }
    loader.replace(produced_module, module)
}

/// The entry script with stylesheet imports removed and toolchain package
/// imports bound to the emitted script itself.
///
/// A dynamic `import()` of the package resolves to the script's module
/// namespace. For the `web` target the module is initialised first, since
/// only bundler targets instantiate it on import.
pub fn rewrite_entry(source: &str, config: &BuildConfig) -> String {
    let entry_dir = config.entry.parent().unwrap_or(config.root.as_path());
    let is_package = |specifier: &str| {
        (specifier.starts_with("./") || specifier.starts_with("../"))
            && normalize(&entry_dir.join(specifier)).starts_with(&config.toolchain.out_dir)
    };
    let self_import = format!("./{}", config.script);

    let without_styles = strip_imports(source, |s| is_stylesheet(Path::new(s)));
    let linked = retarget_imports(&without_styles, &is_package, &self_import);

    let namespace = if config.toolchain.target == "web" {
        format!(
            "import(\"{self_import}\").then(async (module) => {{ await module.default(); return module; }})"
        )
    } else {
        format!("import(\"{self_import}\")")
    };
    retarget_dynamic_imports(&linked, &is_package, &namespace)
}

/// Minimal document loading the entry script
pub fn index_document(title: &str, script: &str) -> String {
    INDEX_TEMPLATE
        .replace("{{TITLE}}", &HtmlEscape::escape_content(title))
        .replace("{{SCRIPT}}", &HtmlEscape::escape_attribute(script))
}

fn check_collisions(config: &BuildConfig, copied: &IndexMap<PathBuf, PathBuf>) -> Result<()> {
    for (generated, what) in [(&config.script, "entry script"), (&config.module, "binary module")] {
        if let Some(source) = copied.get(Path::new(generated)) {
            return Err(BundleError::asset(
                source,
                format!("collides with the generated {what} '{generated}'"),
            ));
        }
    }
    Ok(())
}

async fn assemble_script(
    config: &BuildConfig,
    artifacts: &ToolchainArtifacts,
    styles: &[CompiledStyle],
) -> Result<String> {
    let loader = tokio::fs::read_to_string(&artifacts.loader_script).await?;
    let entry = tokio::fs::read_to_string(&config.entry)
        .await
        .map_err(|e| BundleError::asset(&config.entry, format!("cannot read entry script: {e}")))?;
    let produced_module = artifacts
        .module
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut script = style_prelude(styles, &config.root);
    script.push_str(&rewrite_loader(&loader, &produced_module, &config.module));
    if !script.ends_with('\n') {
        script.push('\n');
    }
    script.push_str(&rewrite_entry(&entry, config));
    Ok(script)
}

#[async_trait]
impl BuildStep for EmitBundleStep {
    fn name(&self) -> String {
        "EmitBundle".to_string()
    }

    fn input(&self) -> Vec<String> {
        vec![
            "config".to_string(),
            "staging_dir".to_string(),
            "toolchain_artifacts".to_string(),
            "stylesheets".to_string(),
            "copied_assets".to_string(),
        ]
    }

    fn output(&self) -> Vec<String> {
        vec!["bundle_files".to_string()]
    }

    async fn process(&self, mut data: PipeMap) -> Result<PipeMap> {
        let config = data.require(CONFIG, "EmitBundle")?.clone();
        let staging = data.require(STAGING_DIR, "EmitBundle")?.clone();
        let artifacts = data.require(TOOLCHAIN_ARTIFACTS, "EmitBundle")?.clone();
        let styles = data.require(STYLESHEETS, "EmitBundle")?.clone();
        let copied = data.require(COPIED_ASSETS, "EmitBundle")?.clone();

        check_collisions(&config, &copied)?;

        let mut files: IndexMap<PathBuf, FileOrigin> = IndexMap::new();

        let script = assemble_script(&config, &artifacts, &styles).await?;
        tokio::fs::write(staging.join(&config.script), script.as_bytes()).await?;
        files.insert(PathBuf::from(&config.script), FileOrigin::EntryScript);

        tokio::fs::copy(&artifacts.module, staging.join(&config.module)).await?;
        files.insert(PathBuf::from(&config.module), FileOrigin::BinaryModule);

        if copied.contains_key(Path::new(&config.index)) {
            debug!("Index document '{}' provided by assets", config.index);
        } else {
            let html = index_document(&config.toolchain_out_name(), &config.script_url());
            tokio::fs::write(staging.join(&config.index), html).await?;
            files.insert(PathBuf::from(&config.index), FileOrigin::IndexDocument);
        }

        for (destination, source) in &copied {
            files.insert(
                destination.clone(),
                FileOrigin::Asset {
                    source: source.clone(),
                },
            );
        }

        info!(
            "Emitted {} ({} bytes) and {} with {} stylesheet(s)",
            config.script,
            script.len(),
            config.module,
            styles.len()
        );
        data.insert_typed(BUNDLE_FILES, files);
        Ok(data)
    }
}

use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::pipeline::{BuildStep, CANCELLATION, CONFIG, PipeMap, TOOLCHAIN_ARTIFACTS};
use crate::process::{Invocation, ProcessRunner};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Files the toolchain leaves in its output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainArtifacts {
    /// Script that instantiates the binary module
    pub loader_script: PathBuf,
    /// Compiled WebAssembly module
    pub module: PathBuf,
}

/// The subset of the generated `package.json` used to locate artifacts
#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    module: Option<String>,
    main: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

/// Compiles the WebAssembly crate with the external toolchain
pub struct CompileToolchainStep {
    runner: Arc<dyn ProcessRunner>,
}

impl CompileToolchainStep {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    /// Command line for the configured toolchain
    pub fn invocation(config: &BuildConfig) -> Invocation {
        let toolchain = &config.toolchain;
        Invocation::new(&toolchain.program)
            .arg("build")
            .arg(toolchain.crate_dir.to_string_lossy())
            .arg(config.mode.profile_flag())
            .args(["--target", toolchain.target.as_str()])
            .arg("--out-dir")
            .arg(toolchain.out_dir.to_string_lossy())
            .args(["--out-name".to_string(), config.toolchain_out_name()])
            .args(toolchain.extra_args.iter().cloned())
            .current_dir(&toolchain.crate_dir)
    }

    async fn compile(
        &self,
        config: &BuildConfig,
        cancel: &CancellationToken,
    ) -> Result<ToolchainArtifacts> {
        let invocation = Self::invocation(config);
        info!(
            "Compiling {:?} with {} ({})",
            config.toolchain.crate_dir, config.toolchain.program, config.mode
        );

        let output = self.runner.run(&invocation, cancel).await?;
        if !output.success {
            return Err(BundleError::toolchain(
                &config.toolchain.program,
                output.status_text(),
                output.stderr_lossy(),
            ));
        }

        locate_artifacts(
            &config.toolchain.program,
            &config.toolchain.out_dir,
            &config.toolchain_out_name(),
        )
        .await
    }
}

/// Find the loader script and binary module in the toolchain output directory
pub async fn locate_artifacts(
    tool: &str,
    out_dir: &Path,
    out_name: &str,
) -> Result<ToolchainArtifacts> {
    let manifest_path = out_dir.join("package.json");
    let manifest = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(source) => serde_json::from_str::<PackageManifest>(&source).map_err(|e| {
            BundleError::toolchain(
                tool,
                format!("unreadable {}: {e}", manifest_path.display()),
                "",
            )
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No package.json in {:?}, using default artifact names", out_dir);
            PackageManifest::default()
        }
        Err(e) => return Err(e.into()),
    };

    let loader_name = manifest
        .module
        .or(manifest.main)
        .unwrap_or_else(|| format!("{out_name}.js"));
    let module_name = manifest
        .files
        .into_iter()
        .find(|f| f.ends_with(".wasm"))
        .unwrap_or_else(|| format!("{out_name}_bg.wasm"));

    let artifacts = ToolchainArtifacts {
        loader_script: out_dir.join(loader_name),
        module: out_dir.join(module_name),
    };

    for produced in [&artifacts.loader_script, &artifacts.module] {
        if !tokio::fs::try_exists(produced).await? {
            return Err(BundleError::toolchain(
                tool,
                format!("expected output {} was not produced", produced.display()),
                "",
            ));
        }
    }

    debug!("Toolchain artifacts: {:?}", artifacts);
    Ok(artifacts)
}

#[async_trait]
impl BuildStep for CompileToolchainStep {
    fn name(&self) -> String {
        "CompileToolchain".to_string()
    }

    fn input(&self) -> Vec<String> {
        vec!["config".to_string(), "cancellation?".to_string()]
    }

    fn output(&self) -> Vec<String> {
        vec!["toolchain_artifacts".to_string()]
    }

    async fn process(&self, mut data: PipeMap) -> Result<PipeMap> {
        let config = data.require(CONFIG, "CompileToolchain")?.clone();
        let cancel = data.get_typed(CANCELLATION).cloned().unwrap_or_default();

        let artifacts = self.compile(&config, &cancel).await?;

        data.insert_typed(TOOLCHAIN_ARTIFACTS, artifacts);
        Ok(data)
    }
}

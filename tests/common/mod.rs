#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use webbundle::config::{BuildConfig, ConfigFile, Overrides};
use webbundle::error::{BundleError, Result};
use webbundle::process::{Invocation, ProcessOutput, ProcessRunner};

pub const FAVICON: &[u8] = &[0, 0, 1, 0, 1, 0, 16, 16, 0, 0, 1, 0, 32, 0];

/// Stands in for wasm-pack: writes a loader, a module and package.json
#[derive(Default)]
pub struct FakeToolchain {
    calls: AtomicUsize,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exits with status 1 and `stderr`
    pub fn failing(stderr: &str) -> Self {
        Self {
            failure: Some(stderr.to_string()),
            ..Self::default()
        }
    }

    /// Takes `delay` to finish unless cancelled first
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessRunner for FakeToolchain {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BundleError::Cancelled),
            }
        }

        if let Some(stderr) = &self.failure {
            return Ok(ProcessOutput {
                success: false,
                code: Some(1),
                stdout: Vec::new(),
                stderr: stderr.as_bytes().to_vec(),
            });
        }

        let out_dir = PathBuf::from(invocation.flag_value("--out-dir").unwrap_or("pkg"));
        let name = invocation.flag_value("--out-name").unwrap_or("index");
        std::fs::create_dir_all(&out_dir)?;
        std::fs::write(
            out_dir.join(format!("{name}.js")),
            format!(
                "async function __wbg_init(module_or_path) {{\n    module_or_path = new URL('{name}_bg.wasm', import.meta.url);\n    return module_or_path;\n}}\nexport default __wbg_init;\n"
            ),
        )?;
        std::fs::write(
            out_dir.join(format!("{name}_bg.wasm")),
            [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00],
        )?;
        std::fs::write(
            out_dir.join("package.json"),
            format!(
                r#"{{"name":"{name}","module":"{name}.js","files":["{name}_bg.wasm","{name}.js"]}}"#
            ),
        )?;

        Ok(ProcessOutput {
            success: true,
            code: Some(0),
            ..ProcessOutput::default()
        })
    }
}

/// A project producing the `llrs` bundle: entry script, one stylesheet and a favicon
pub fn llrs_project(extra_config: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    std::fs::write(
        root.join("bundle.toml"),
        format!(
            "script = \"llrs.js\"\nmodule = \"llrs.wasm\"\n{extra_config}\n"
        ),
    )
    .unwrap();
    std::fs::write(
        root.join("bootstrap.js"),
        "import \"./style.scss\";\nimport init from \"./pkg/llrs.js\";\n\ninit();\n",
    )
    .unwrap();
    std::fs::write(
        root.join("style.scss"),
        "$bg: #102030;\nbody { background: $bg; }\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("static")).unwrap();
    std::fs::write(root.join("static/favicon.ico"), FAVICON).unwrap();

    dir
}

pub fn load_config(root: &Path, overrides: &Overrides) -> BuildConfig {
    let file = ConfigFile::load(&root.join("bundle.toml")).unwrap();
    BuildConfig::from_file(file, root, overrides).unwrap()
}

/// Every file under `dir`, relative path -> contents
pub fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path
                    .strip_prefix(dir)
                    .unwrap()
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.insert(relative, std::fs::read(&path).unwrap());
            }
        }
    }
    files
}

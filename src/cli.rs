use crate::bundle::Orchestrator;
use crate::bundle::output::BuildOutput;
use crate::config::{BuildConfig, Mode, Overrides};
use crate::error::Result;
use crate::watch;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Subcommand)]
#[command(version, about, long_about = None)]
pub enum Commands {
    /// Build the bundle into the output directory
    Build {
        /// Config file (defaults to ./bundle.toml when present)
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Build mode
        #[clap(short, long, value_enum)]
        mode: Option<Mode>,
        /// Output directory
        #[clap(short, long)]
        out_dir: Option<PathBuf>,
        /// Keep rebuilding when sources change, even in production mode
        #[clap(short, long)]
        watch: bool,
        /// Build once, even in development mode
        #[clap(long, conflicts_with = "watch")]
        no_watch: bool,
        /// Write the manifest of produced files as JSON
        #[clap(long)]
        report: Option<PathBuf>,
    },

    /// Build, serve the output directory and rebuild on change
    Serve {
        /// Config file (defaults to ./bundle.toml when present)
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// Build mode
        #[clap(short, long, value_enum)]
        mode: Option<Mode>,
        /// Output directory
        #[clap(short, long)]
        out_dir: Option<PathBuf>,
        /// Port to listen on
        #[clap(short, long)]
        port: Option<u16>,
        /// Serve without watching, even in development mode
        #[clap(long)]
        no_watch: bool,
    },
}

/// WebBundle Command
#[derive(Parser)]
#[command(about = "Bundle a WebAssembly crate with its assets and stylesheets")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
    /// Directory for the per-run debug log
    #[clap(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

/// Cancel `shutdown` on Ctrl-C
fn stop_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping...");
            shutdown.cancel();
        }
    });
}

async fn write_report(path: &Path, output: &BuildOutput) -> Result<()> {
    tokio::fs::write(path, output.to_json()?).await?;
    debug!("Report written to {:?}", path);
    Ok(())
}

/// Explicit `--watch`/`--no-watch` flags; otherwise the mode decides
pub fn watch_override(watch: bool, no_watch: bool) -> Option<bool> {
    if watch {
        Some(true)
    } else {
        no_watch.then_some(false)
    }
}

pub async fn build_command(
    config_path: Option<PathBuf>,
    mode: Option<Mode>,
    out_dir: Option<PathBuf>,
    watch: bool,
    no_watch: bool,
    report: Option<PathBuf>,
) -> Result<()> {
    let overrides = Overrides {
        mode,
        out_dir,
        port: None,
        watch: watch_override(watch, no_watch),
        serve: false,
    };
    let config = BuildConfig::load(config_path.as_deref(), &overrides)?;
    debug!("Configuration: {:?}", config);
    info!("Building {} bundle into {:?}", config.mode, config.out_dir);

    let orchestrator = Orchestrator::new(config);
    stop_on_ctrl_c(orchestrator.shutdown_token());

    let first = orchestrator.build().await;
    if let (Ok(output), Some(path)) = (&first, &report) {
        write_report(path, output).await?;
    }

    if !orchestrator.config().watch_enabled {
        let output = first?;
        info!("Build completed: {}", output.paths().join(", "));
        return Ok(());
    }

    match &first {
        Ok(output) => info!("Build completed: {}", output.paths().join(", ")),
        Err(e) if e.is_cancelled() => return Ok(()),
        Err(e) => error!("Initial build failed: {}", e),
    }

    let mut pending_report: Option<BuildOutput> = None;
    orchestrator
        .watch(|result| {
            watch::report(result);
            if let Ok(output) = result {
                pending_report = Some(output.clone());
            }
        })
        .await?;

    if let (Some(output), Some(path)) = (pending_report, &report) {
        write_report(path, &output).await?;
    }
    Ok(())
}

pub async fn serve_command(
    config_path: Option<PathBuf>,
    mode: Option<Mode>,
    out_dir: Option<PathBuf>,
    port: Option<u16>,
    no_watch: bool,
) -> Result<()> {
    let overrides = Overrides {
        mode,
        out_dir,
        port,
        watch: watch_override(false, no_watch),
        serve: true,
    };
    let config = BuildConfig::load(config_path.as_deref(), &overrides)?;
    debug!("Configuration: {:?}", config);

    let orchestrator = Orchestrator::new(config);
    stop_on_ctrl_c(orchestrator.shutdown_token());

    let server = orchestrator.serve().await?;

    match orchestrator.build().await {
        Ok(output) => info!("Build completed: {}", output.paths().join(", ")),
        Err(e) if e.is_cancelled() => return Ok(()),
        Err(e) => warn!("Initial build failed, serving previous output: {}", e),
    }

    if orchestrator.config().watch_enabled {
        tokio::try_join!(server.run(), orchestrator.watch(watch::report))?;
    } else {
        server.run().await?;
    }
    Ok(())
}

//! The build orchestrator: one object that owns the configuration, the
//! process runner and the shutdown token, and drives builds, the watch loop
//! and the dev server.

pub mod output;

use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::pipeline::steps::{
    CompileStylesStep, CompileToolchainStep, CopyAssetsStep, EmitBundleStep,
};
use crate::pipeline::{BUNDLE_FILES, CANCELLATION, CONFIG, PipeMap, Pipeline, STAGING_DIR};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::server::DevServer;
use crate::watch::{self, WatchFilter};
use indexmap::IndexMap;
use notify::{Config, Event, RecommendedWatcher, Watcher};
use output::{BuildOutput, FileOrigin};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: Arc<BuildConfig>,
    runner: Arc<dyn ProcessRunner>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: BuildConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner))
    }

    pub fn with_runner(config: BuildConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Token cancelled by [`Orchestrator::stop`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// End the watch loop and the dev server, killing any build in flight
    pub fn stop(&self) {
        info!("Stopping...");
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The build steps in execution order
    pub fn pipeline(&self) -> Result<Pipeline> {
        let pipeline = Pipeline::new("WebBundleBuildPipeline")
            .with_external_inputs(vec![
                "config".to_string(),
                "staging_dir".to_string(),
                "cancellation".to_string(),
            ])
            .add_step(Box::new(CompileToolchainStep::new(self.runner.clone())))?
            .add_step(Box::new(CompileStylesStep::new(self.runner.clone())))?
            .add_step(Box::new(CopyAssetsStep))?
            .add_step(Box::new(EmitBundleStep))?;
        Ok(pipeline)
    }

    /// Build once and commit the result to the output directory
    pub async fn build(&self) -> Result<BuildOutput> {
        self.build_with_cancel(self.shutdown.child_token()).await
    }

    /// Build once; `cancel` aborts the build and kills its processes
    pub async fn build_with_cancel(&self, cancel: CancellationToken) -> Result<BuildOutput> {
        let out_dir = self.config.out_dir.clone();
        let staging = output::prepare_staging(&out_dir).await?;

        match self.run_pipeline(&staging, &cancel).await {
            Ok(files) => {
                if let Err(e) = output::commit(&staging, &out_dir).await {
                    output::discard(&staging).await;
                    return Err(e);
                }
                info!("Bundle written to {:?} ({} files)", out_dir, files.len());
                Ok(BuildOutput { out_dir, files })
            }
            Err(e) => {
                output::discard(&staging).await;
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        staging: &Path,
        cancel: &CancellationToken,
    ) -> Result<IndexMap<PathBuf, FileOrigin>> {
        let pipeline = self.pipeline()?;
        debug!("Running {}: {:?}", pipeline.name(), pipeline.step_names());

        let mut data = PipeMap::new();
        data.insert_typed(CONFIG, self.config.clone());
        data.insert_typed(STAGING_DIR, staging.to_path_buf());
        data.insert_typed(CANCELLATION, cancel.clone());

        let result = pipeline.execute(data).await?;
        debug!("{} produced {:?}", pipeline.name(), result.keys());
        if cancel.is_cancelled() {
            return Err(BundleError::Cancelled);
        }
        Ok(result.require(BUNDLE_FILES, "commit")?.clone())
    }

    /// Watch sources and rebuild on change until stopped
    pub async fn watch<F>(&self, on_change: F) -> Result<()>
    where
        F: FnMut(&Result<BuildOutput>),
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let filter = WatchFilter::new(&self.config);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let paths = filter.relevant_paths(event);
                    if !paths.is_empty() && tx.send(paths).is_err() {
                        debug!("Watch loop gone, dropping change event");
                    }
                }
                Err(e) => warn!("Watch error: {}", e),
            },
            Config::default(),
        )?;

        for (root, mode) in watch::watch_roots(&self.config).await {
            watcher.watch(&root, mode)?;
            debug!("Watching {:?} ({:?})", root, mode);
        }

        info!("Watching for changes...");
        self.watch_events(rx, on_change).await;
        Ok(())
    }

    /// Run the rebuild loop on an explicit change source
    pub async fn watch_events<F>(&self, events: UnboundedReceiver<Vec<PathBuf>>, on_change: F)
    where
        F: FnMut(&Result<BuildOutput>),
    {
        watch::run_loop(
            events,
            self.config.watch.debounce(),
            &self.shutdown,
            |cancel| self.build_with_cancel(cancel),
            on_change,
        )
        .await;
    }

    /// Bind the dev server; it runs until [`Orchestrator::stop`]
    pub async fn serve(&self) -> Result<DevServer> {
        DevServer::bind(&self.config, self.shutdown.clone()).await
    }
}

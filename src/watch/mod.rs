//! Change detection and the debounced rebuild loop.

pub mod debounce;

pub use debounce::Debouncer;

use crate::bundle::output::{BuildOutput, previous_dir_for, staging_dir_for};
use crate::config::BuildConfig;
use crate::error::Result;
use crate::pipeline::steps::styles::discover_stylesheets;
use notify::{Event, EventKind, RecursiveMode};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Decides which changed paths should trigger a rebuild
#[derive(Debug, Clone)]
pub struct WatchFilter {
    ignored: Vec<PathBuf>,
}

impl WatchFilter {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            ignored: vec![
                config.out_dir.clone(),
                staging_dir_for(&config.out_dir),
                previous_dir_for(&config.out_dir),
                config.toolchain.out_dir.clone(),
                config.toolchain.crate_dir.join("target"),
            ],
        }
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        if self.ignored.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        // Editor swap and backup files
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        !(name.ends_with('~') || name.ends_with(".swp") || name.starts_with(".#"))
    }

    /// Relevant paths of a notify event, empty for events that never matter
    pub fn relevant_paths(&self, event: Event) -> Vec<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => event
                .paths
                .into_iter()
                .filter(|path| self.is_relevant(path))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Directories and files the watcher subscribes to. Missing paths are skipped.
pub async fn watch_roots(config: &BuildConfig) -> Vec<(PathBuf, RecursiveMode)> {
    let mut roots: Vec<(PathBuf, RecursiveMode)> = vec![
        (config.toolchain.crate_dir.join("src"), RecursiveMode::Recursive),
        (config.toolchain.crate_dir.join("Cargo.toml"), RecursiveMode::NonRecursive),
    ];
    for rule in &config.assets {
        roots.push((rule.from.clone(), RecursiveMode::Recursive));
    }
    if let Some(entry_dir) = config.entry.parent() {
        roots.push((entry_dir.to_path_buf(), RecursiveMode::NonRecursive));
        if let Ok(source) = tokio::fs::read_to_string(&config.entry).await {
            for sheet in discover_stylesheets(&source, entry_dir) {
                if let Some(parent) = sheet.parent() {
                    roots.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
                }
            }
        }
    }
    for path in config.styles.load_paths.iter().chain(&config.watch.paths) {
        roots.push((path.clone(), RecursiveMode::Recursive));
    }

    let mut unique: Vec<(PathBuf, RecursiveMode)> = Vec::new();
    for (path, mode) in roots {
        if !path.exists() {
            debug!("Not watching missing path {:?}", path);
            continue;
        }
        match unique.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, existing_mode)) => {
                if mode == RecursiveMode::Recursive {
                    *existing_mode = RecursiveMode::Recursive;
                }
            }
            None => unique.push((path, mode)),
        }
    }
    unique
}

/// Rebuild loop driven by batches of changed paths.
///
/// A change cancels the build in flight and arms the debouncer. Once the
/// window passes with nothing in flight exactly one build starts. Completed
/// results go to `on_change`; cancelled ones are dropped. The loop ends when
/// `shutdown` fires, or when `events` closes after pending changes were
/// flushed with one final build.
pub async fn run_loop<B, Fut, F>(
    mut events: UnboundedReceiver<Vec<PathBuf>>,
    debounce: Duration,
    shutdown: &CancellationToken,
    build: B,
    mut on_change: F,
) where
    B: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<BuildOutput>>,
    F: FnMut(&Result<BuildOutput>),
{
    let mut debouncer = Debouncer::new(debounce);
    let mut in_flight: Option<(CancellationToken, Pin<Box<Fut>>)> = None;
    let mut closed = false;

    loop {
        if closed && in_flight.is_none() {
            if debouncer.flush() && !shutdown.is_cancelled() {
                debug!("Change source closed, running final build");
                let result = build(shutdown.child_token()).await;
                if !matches!(&result, Err(e) if e.is_cancelled()) {
                    on_change(&result);
                }
            }
            break;
        }

        let deadline = if in_flight.is_none() {
            debouncer.deadline()
        } else {
            None
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some((cancel, _)) = in_flight.take() {
                    cancel.cancel();
                }
                debug!("Watch loop stopped");
                break;
            }
            event = events.recv(), if !closed => match event {
                Some(paths) if paths.is_empty() => {}
                Some(paths) => {
                    debug!("Changed: {:?}", paths);
                    if let Some((cancel, _)) = &in_flight {
                        debug!("Cancelling superseded build");
                        cancel.cancel();
                    }
                    debouncer.record(Instant::now());
                }
                None => closed = true,
            },
            _ = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            } => {
                let changes = debouncer.pending();
                if debouncer.take_ready(Instant::now()) {
                    info!("Detected {} change(s), rebuilding", changes);
                    let cancel = shutdown.child_token();
                    let future = Box::pin(build(cancel.clone()));
                    in_flight = Some((cancel, future));
                }
            }
            result = async {
                match in_flight.as_mut() {
                    Some((_, future)) => future.as_mut().await,
                    None => std::future::pending().await,
                }
            } => {
                in_flight = None;
                match &result {
                    Err(e) if e.is_cancelled() => debug!("Build superseded by newer changes"),
                    _ => on_change(&result),
                }
            }
        }
    }
}

/// Log a watch-mode build result; failures never end the loop
pub fn report(result: &Result<BuildOutput>) {
    match result {
        Ok(output) => info!(
            "Rebuilt {} file(s) into {:?}",
            output.files.len(),
            output.out_dir
        ),
        Err(e) => warn!("Rebuild failed, keeping previous output: {}", e),
    }
}

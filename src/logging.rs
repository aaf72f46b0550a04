//! Per-run debug log files for webbundle

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::constants::{KEEP_LOG_FILES, LOG_DIR};

/// Directory run logs go to: `--log-dir` when given, else under the system temp dir
pub fn log_dir(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::temp_dir().join(LOG_DIR))
}

/// `<project>_<pid>_<timestamp>.log`, named after the directory webbundle runs in
pub fn log_file_name(project_dir: &Path, pid: u32, timestamp: u64) -> String {
    let project = project_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("{project}_{pid}_{timestamp}.log")
}

/// Remove the oldest `.log` files in `dir` so at most `keep` remain.
/// Returns how many were removed.
pub fn prune_logs(dir: &Path, keep: usize) -> io::Result<usize> {
    let mut logs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "log") && entry.file_type()?.is_file() {
            let modified = entry.metadata()?.modified().unwrap_or(UNIX_EPOCH);
            logs.push((modified, path));
        }
    }
    if logs.len() <= keep {
        return Ok(0);
    }

    logs.sort();
    let excess = logs.len() - keep;
    for (_, path) in &logs[..excess] {
        std::fs::remove_file(path)?;
    }
    Ok(excess)
}

/// Create this run's debug log file, making room for it among older logs
pub fn create_log_file(dir: Option<&Path>) -> io::Result<(File, PathBuf)> {
    let dir = log_dir(dir);
    std::fs::create_dir_all(&dir)?;
    if let Err(e) = prune_logs(&dir, KEEP_LOG_FILES.saturating_sub(1)) {
        eprintln!("Could not prune old logs in {}: {e}", dir.display());
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let path = dir.join(log_file_name(
        &std::env::current_dir()?,
        std::process::id(),
        timestamp,
    ));

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)?;
    Ok((file, path))
}

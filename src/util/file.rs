use crate::config::constants;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Lexically normalize a path: drop `.` components and fold `..` into the parent
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Check if the file is a stylesheet the preprocessor understands
pub fn is_stylesheet(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| constants::STYLE_EXTENSIONS.contains(&ext.as_str()))
}

/// Recursively collect every file under `base_dir`, paired with its path relative to `base_dir`.
///
/// Entries are sorted so repeated builds visit files in the same order.
pub async fn collect_files(base_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>, std::io::Error> {
    let mut files = Vec::new();
    let mut pending = vec![base_dir.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        let mut entry_count = 0;

        while let Some(entry) = read_dir.next_entry().await? {
            entry_count += 1;
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() || tokio::fs::metadata(&path).await?.is_file() {
                let relative = path
                    .strip_prefix(base_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
                files.push((path, relative));
            }
        }

        debug!("Found {} entries in directory {:?}", entry_count, dir);
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Render a relative path with forward slashes, for logs and manifests
pub fn display_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

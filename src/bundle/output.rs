//! Build output manifest and the staging-directory commit.
//!
//! A build is assembled in a sibling `.{name}.staging` directory. Commit moves
//! the current output aside to `.{name}.previous`, renames staging into place,
//! and only then deletes the previous tree. If the second rename fails the
//! previous tree is renamed back, so the output directory always holds the
//! last successful build.

use crate::error::{BundleError, Result};
use crate::util::file::display_relative;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a produced file came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileOrigin {
    EntryScript,
    BinaryModule,
    IndexDocument,
    Asset { source: PathBuf },
}

/// Manifest of a committed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    pub out_dir: PathBuf,
    #[serde(serialize_with = "serialize_files")]
    pub files: IndexMap<PathBuf, FileOrigin>,
}

fn serialize_files<S: Serializer>(
    files: &IndexMap<PathBuf, FileOrigin>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_map(files.iter().map(|(path, origin)| (display_relative(path), origin)))
}

impl BuildOutput {
    /// Output-relative paths in manifest order
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().map(|p| display_relative(p)).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BundleError::Io(std::io::Error::other(e)))
    }
}

fn sibling(out_dir: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(out_dir.file_name().unwrap_or_else(|| "out".as_ref()));
    name.push(suffix);
    out_dir.with_file_name(name)
}

/// Directory a build is assembled in before commit
pub fn staging_dir_for(out_dir: &Path) -> PathBuf {
    sibling(out_dir, ".staging")
}

/// Where the replaced output is parked during commit
pub fn previous_dir_for(out_dir: &Path) -> PathBuf {
    sibling(out_dir, ".previous")
}

async fn remove_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create an empty staging directory, clearing leftovers of interrupted builds
pub async fn prepare_staging(out_dir: &Path) -> Result<PathBuf> {
    let staging = staging_dir_for(out_dir);
    remove_if_exists(&staging).await?;
    tokio::fs::create_dir_all(&staging).await?;
    debug!("Prepared staging directory {:?}", staging);
    Ok(staging)
}

/// Remove a staging directory after a failed or cancelled build
pub async fn discard(staging: &Path) {
    if let Err(e) = remove_if_exists(staging).await {
        warn!("Failed to remove staging directory {:?}: {}", staging, e);
    }
}

/// Replace `out_dir` with `staging`
pub async fn commit(staging: &Path, out_dir: &Path) -> Result<()> {
    let previous = previous_dir_for(out_dir);
    remove_if_exists(&previous).await?;

    let had_previous = tokio::fs::try_exists(out_dir).await?;
    if had_previous {
        tokio::fs::rename(out_dir, &previous).await?;
    }

    if let Err(e) = tokio::fs::rename(staging, out_dir).await {
        if had_previous && let Err(restore) = tokio::fs::rename(&previous, out_dir).await {
            warn!(
                "Failed to restore previous output from {:?}: {}",
                previous, restore
            );
        }
        return Err(e.into());
    }

    if had_previous {
        remove_if_exists(&previous).await?;
    }
    debug!("Committed {:?} to {:?}", staging, out_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_names() {
        assert_eq!(
            staging_dir_for(Path::new("/project/dist")),
            PathBuf::from("/project/.dist.staging")
        );
        assert_eq!(
            previous_dir_for(Path::new("/project/dist")),
            PathBuf::from("/project/.dist.previous")
        );
    }

    #[tokio::test]
    async fn test_commit_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("dist");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("stale.js"), "old").unwrap();

        let staging = prepare_staging(&out_dir).await.unwrap();
        std::fs::write(staging.join("index.js"), "new").unwrap();
        commit(&staging, &out_dir).await.unwrap();

        assert_eq!(std::fs::read_to_string(out_dir.join("index.js")).unwrap(), "new");
        assert!(!out_dir.join("stale.js").exists());
        assert!(!staging.exists());
        assert!(!previous_dir_for(&out_dir).exists());
    }

    #[tokio::test]
    async fn test_commit_without_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("dist");

        let staging = prepare_staging(&out_dir).await.unwrap();
        std::fs::write(staging.join("index.html"), "<html>").unwrap();
        commit(&staging, &out_dir).await.unwrap();

        assert!(out_dir.join("index.html").is_file());
    }

    #[tokio::test]
    async fn test_failed_commit_restores_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("dist");
        std::fs::create_dir_all(&out_dir).unwrap();
        std::fs::write(out_dir.join("index.js"), "old").unwrap();

        let missing_staging = dir.path().join(".dist.staging");
        assert!(commit(&missing_staging, &out_dir).await.is_err());
        assert_eq!(std::fs::read_to_string(out_dir.join("index.js")).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_prepare_clears_stale_staging() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("dist");
        let stale = staging_dir_for(&out_dir);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("leftover"), "x").unwrap();

        let staging = prepare_staging(&out_dir).await.unwrap();
        assert!(!staging.join("leftover").exists());
        discard(&staging).await;
        assert!(!staging.exists());
    }

    #[test]
    fn test_report_json() {
        let mut files = IndexMap::new();
        files.insert(PathBuf::from("index.js"), FileOrigin::EntryScript);
        files.insert(
            PathBuf::from("favicon.ico"),
            FileOrigin::Asset {
                source: PathBuf::from("/project/static/favicon.ico"),
            },
        );
        let output = BuildOutput {
            out_dir: PathBuf::from("/project/dist"),
            files,
        };

        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(json["files"]["index.js"]["kind"], "entry_script");
        assert_eq!(json["files"]["favicon.ico"]["kind"], "asset");
        assert_eq!(
            json["files"]["favicon.ico"]["source"],
            "/project/static/favicon.ico"
        );
        assert_eq!(output.paths(), vec!["index.js", "favicon.ico"]);
    }
}

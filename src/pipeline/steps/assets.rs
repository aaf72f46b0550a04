use crate::config::AssetRule;
use crate::error::{BundleError, Result};
use crate::pipeline::{BuildStep, CONFIG, COPIED_ASSETS, PipeMap, STAGING_DIR};
use crate::util::file::{collect_files, display_relative, normalize};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Copies every rule of the asset manifest into the staging directory
pub struct CopyAssetsStep;

/// Expand copy rules into `destination -> source` pairs.
///
/// Fails when a source is missing or two sources claim one destination.
pub async fn plan_copies(rules: &[AssetRule]) -> Result<IndexMap<PathBuf, PathBuf>> {
    let mut plan: IndexMap<PathBuf, PathBuf> = IndexMap::new();

    for rule in rules {
        let metadata = match tokio::fs::metadata(&rule.from).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BundleError::asset(&rule.from, "copy source does not exist"));
            }
            Err(e) => return Err(BundleError::asset(&rule.from, e.to_string())),
        };

        let entries: Vec<(PathBuf, PathBuf)> = if metadata.is_dir() {
            collect_files(&rule.from)
                .await
                .map_err(|e| BundleError::asset(&rule.from, e.to_string()))?
                .into_iter()
                .map(|(source, relative)| (source, rule.to.join(relative)))
                .collect()
        } else {
            vec![(rule.from.clone(), file_destination(rule))]
        };

        for (source, destination) in entries {
            let destination = normalize(&destination);
            if let Some(previous) = plan.get(&destination) {
                return Err(BundleError::asset(
                    &source,
                    format!(
                        "destination '{}' is already produced by {}",
                        display_relative(&destination),
                        previous.display()
                    ),
                ));
            }
            plan.insert(destination, source);
        }
    }

    Ok(plan)
}

/// Where a single-file rule lands
fn file_destination(rule: &AssetRule) -> PathBuf {
    let to = rule.to.as_os_str();
    let is_directory = to.is_empty() || to.to_string_lossy().ends_with(['/', '\\']);
    match rule.from.file_name() {
        Some(name) if is_directory => rule.to.join(name),
        _ => rule.to.clone(),
    }
}

/// Copy planned files into `staging`, creating parent directories as needed
pub async fn copy_planned(staging: &Path, plan: &IndexMap<PathBuf, PathBuf>) -> Result<()> {
    for (destination, source) in plan {
        let target = staging.join(destination);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| BundleError::asset(source, format!("copy failed: {e}")))?;
        debug!("Copied {:?} -> {}", source, display_relative(destination));
    }
    Ok(())
}

#[async_trait]
impl BuildStep for CopyAssetsStep {
    fn name(&self) -> String {
        "CopyAssets".to_string()
    }

    fn input(&self) -> Vec<String> {
        vec!["config".to_string(), "staging_dir".to_string()]
    }

    fn output(&self) -> Vec<String> {
        vec!["copied_assets".to_string()]
    }

    async fn process(&self, mut data: PipeMap) -> Result<PipeMap> {
        let config = data.require(CONFIG, "CopyAssets")?.clone();
        let staging = data.require(STAGING_DIR, "CopyAssets")?.clone();

        let plan = plan_copies(&config.assets).await?;
        copy_planned(&staging, &plan).await?;

        info!(
            "Copied {} asset files from {} rules",
            plan.len(),
            config.assets.len()
        );
        data.insert_typed(COPIED_ASSETS, plan);
        Ok(data)
    }
}

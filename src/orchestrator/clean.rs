//! The `clean` operation.
//!
//! A cleanup is computed up front as a [`CleanupPlan`]. Dry runs stop there.
//! Otherwise each category is confirmed separately and removed in a fixed
//! order: pods, volumes, images, network, configs.

use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::engine::ObservedState;
use crate::error::Result;
use crate::planner::ServicePlan;
use crate::state::SecretStore;

use super::report::{CleanCategory, CleanRecord, CleanReport, CleanupPlan};
use super::Orchestrator;

/// Infix of configuration backups, as in `config.toml.backup.20250101120000`.
pub const BACKUP_SUFFIX: &str = "backup";

/// What `clean` may remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanTargets {
    /// Pods and their containers.
    pub pods: bool,
    /// Engine volumes and bind directories of the plan.
    pub volumes: bool,
    /// Service images.
    pub images: bool,
    /// The shared network.
    pub network: bool,
    /// Configuration file and shared secret.
    pub configs: bool,
}

impl CleanTargets {
    /// Every category.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            pods: true,
            volumes: true,
            images: true,
            network: true,
            configs: true,
        }
    }

    /// Returns whether any category needs the engine.
    #[must_use]
    pub const fn any_engine(&self) -> bool {
        self.pods || self.volumes || self.images || self.network
    }

    /// Returns the selected categories in removal order.
    #[must_use]
    pub fn categories(&self) -> Vec<CleanCategory> {
        [
            (self.pods, CleanCategory::Pods),
            (self.volumes, CleanCategory::Volumes),
            (self.images, CleanCategory::Images),
            (self.network, CleanCategory::Network),
            (self.configs, CleanCategory::Configs),
        ]
        .into_iter()
        .filter_map(|(selected, category)| selected.then_some(category))
        .collect()
    }
}

/// Options for `clean`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    /// Categories to clean.
    pub targets: CleanTargets,
    /// Skip confirmations.
    pub force: bool,
    /// Report what would be removed without removing it.
    pub dry_run: bool,
    /// Copy `config.toml` aside before removing it.
    pub backup_config: bool,
}

impl Orchestrator {
    /// Removes the selected categories of airpods resources.
    ///
    /// # Errors
    ///
    /// Returns an error if dependencies are missing or the engine cannot be
    /// observed. Failures removing individual items are reported.
    pub async fn clean(&self, plan: &ServicePlan, options: CleanOptions) -> Result<CleanReport> {
        let targets = options.targets;
        let observed = if targets.any_engine() {
            self.check_dependencies(plan).await?;
            self.observe(plan, &plan.select(&[])?).await?
        } else {
            ObservedState::default()
        };

        let cleanup = cleanup_plan(plan, &observed, targets);
        let mut report = CleanReport {
            dry_run: options.dry_run,
            plan: cleanup.clone(),
            removed: Vec::new(),
            declined: Vec::new(),
            backup: None,
        };

        if cleanup.is_empty() {
            info!("Nothing to clean");
            return Ok(report);
        }
        if options.dry_run {
            info!("Dry run; nothing was removed");
            return Ok(report);
        }

        for category in targets.categories() {
            let items = cleanup.items(category);
            if items.is_empty() {
                continue;
            }
            let prompt = format!("Remove {} {category}: {}?", items.len(), items.join(", "));
            if !options.force && !self.confirmer.confirm(&prompt) {
                info!("Skipping {category}");
                report.declined.push(category);
                continue;
            }

            match category {
                CleanCategory::Pods => {
                    for pod in &cleanup.pods {
                        let result = self.gateway.remove_pod(pod).await.map_err(|e| e.to_string());
                        report.removed.push(record(category, pod, result));
                    }
                }
                CleanCategory::Volumes => {
                    for volume in &cleanup.volumes {
                        let result = self.gateway.remove_volume(volume).await.map_err(|e| e.to_string());
                        report.removed.push(record(category, volume, result));
                    }
                    for dir in &cleanup.bind_dirs {
                        let result = std::fs::remove_dir_all(dir).map_err(|e| e.to_string());
                        report.removed.push(record(category, &dir.display().to_string(), result));
                    }
                }
                CleanCategory::Images => {
                    for image in &cleanup.images {
                        let result = self.gateway.remove_image(image).await.map_err(|e| e.to_string());
                        report.removed.push(record(category, image, result));
                    }
                }
                CleanCategory::Network => {
                    if let Some(network) = &cleanup.network {
                        let result = self.gateway.remove_network(network).await.map_err(|e| e.to_string());
                        report.removed.push(record(category, network, result));
                    }
                }
                CleanCategory::Configs => {
                    let config_file = plan.paths.config_file();
                    if options.backup_config && config_file.is_file() {
                        let backup = backup_path(&config_file);
                        std::fs::copy(&config_file, &backup)?;
                        info!("Backed up {} to {}", config_file.display(), backup.display());
                        report.backup = Some(backup);
                    }
                    for file in &cleanup.config_files {
                        let result = std::fs::remove_file(file).map_err(|e| e.to_string());
                        report.removed.push(record(category, &file.display().to_string(), result));
                    }
                }
            }
        }

        Ok(report)
    }
}

fn record(category: CleanCategory, name: &str, result: std::result::Result<(), String>) -> CleanRecord {
    match &result {
        Ok(()) => info!("Removed {category} {name}"),
        Err(e) => warn!("Failed to remove {category} {name}: {e}"),
    }
    CleanRecord {
        category,
        name: name.to_string(),
        error: result.err(),
    }
}

fn cleanup_plan(plan: &ServicePlan, observed: &ObservedState, targets: CleanTargets) -> CleanupPlan {
    let mut cleanup = CleanupPlan::default();

    for spec in &plan.specs {
        if targets.pods && observed.pod(spec).is_some() {
            cleanup.pods.push(spec.pod.clone());
        }
        if targets.volumes {
            for volume in spec.engine_volumes() {
                if observed.volumes.contains(volume) && !cleanup.volumes.iter().any(|v| v == volume) {
                    cleanup.volumes.push(volume.to_string());
                }
            }
            for dir in spec.bind_dirs() {
                if dir.is_dir() && !cleanup.bind_dirs.contains(dir) {
                    cleanup.bind_dirs.push(dir.clone());
                }
            }
        }
        if targets.images && observed.has_image(&spec.image) && !cleanup.images.contains(&spec.image) {
            cleanup.images.push(spec.image.clone());
        }
    }

    if targets.network && observed.network_exists {
        cleanup.network = Some(plan.config.config.runtime.network_name.clone());
    }

    if targets.configs {
        let secret = plan.secret_store();
        cleanup.config_files = [
            plan.paths.config_file(),
            secret.path().to_path_buf(),
            plan.paths.caddyfile(),
        ]
            .into_iter()
            .filter(|path| path.is_file())
            .collect();
    }

    cleanup
}

fn backup_path(config_file: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    let mut name = config_file.as_os_str().to_os_string();
    name.push(format!(".{BACKUP_SUFFIX}.{stamp}"));
    PathBuf::from(name)
}

//! Run reports returned by orchestrator operations.
//!
//! Reports keep succeeded and failed services apart so the caller can
//! render partial outcomes instead of a single pass/fail verdict.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::accelerator::AcceleratorDecision;
use crate::engine::{ContainerState, HealthOutcome, PodState, PullResult};
use crate::error::{ServiceFailure, EXIT_PARTIAL, EXIT_SUCCESS};
use crate::planner::PortMapping;

use super::diff::LaunchAction;

/// Phases of a start run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    /// Building the plan.
    Planning,
    /// Creating the network, volumes and bind directories.
    Provisioning,
    /// Pulling images.
    Pulling,
    /// Creating and starting containers.
    Launching,
    /// Waiting for health contracts.
    HealthGating,
    /// Every requested service is ready.
    Settled,
    /// At least one requested service failed.
    PartiallyFailed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planning => "planning",
            Self::Provisioning => "provisioning",
            Self::Pulling => "pulling",
            Self::Launching => "launching",
            Self::HealthGating => "health gating",
            Self::Settled => "settled",
            Self::PartiallyFailed => "partially failed",
        };
        f.write_str(label)
    }
}

/// Kind of provisioned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// The shared network.
    Network,
    /// An engine volume.
    Volume,
    /// A host bind directory.
    BindDir,
    /// A file rendered from configuration.
    GeneratedFile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::Volume => "volume",
            Self::BindDir => "bind dir",
            Self::GeneratedFile => "generated file",
        };
        f.write_str(label)
    }
}

/// One provisioned resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionRecord {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Name or path.
    pub name: String,
    /// Whether it was created by this run.
    pub created: bool,
}

/// What happened to a service's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchOutcome {
    /// A new pod and container were created.
    Created,
    /// The running container was left alone.
    Reused,
    /// The stopped container was started.
    Started,
    /// The outdated container was removed and recreated.
    Replaced,
    /// Replacement was declined; the outdated container was kept.
    KeptOutdated,
}

impl fmt::Display for LaunchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Reused => "reused",
            Self::Started => "started",
            Self::Replaced => "replaced",
            Self::KeptOutdated => "kept (outdated)",
        };
        f.write_str(label)
    }
}

/// Per-service result of a start run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRun {
    /// Service name.
    pub name: String,
    /// Planned launch action.
    pub action: Option<LaunchAction>,
    /// What was done.
    pub launch: Option<LaunchOutcome>,
    /// Health session, for services with a contract.
    pub health: Option<HealthOutcome>,
    /// Failure, if the service is not ready.
    pub failure: Option<ServiceFailure>,
    /// Where the service answers.
    pub url: Option<String>,
}

impl ServiceRun {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            action: None,
            launch: None,
            health: None,
            failure: None,
            url: None,
        }
    }

    /// Returns whether the service is ready.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    /// Terminal phase.
    pub phase: RunPhase,
    /// Accelerator decisions for the requested services.
    pub decisions: Vec<AcceleratorDecision>,
    /// Provisioned resources.
    pub provisioned: Vec<ProvisionRecord>,
    /// Pull results, sorted by image.
    pub pulls: Vec<PullResult>,
    /// Per-service results.
    pub services: Vec<ServiceRun>,
    /// The run was interrupted.
    pub cancelled: bool,
}

impl StartReport {
    /// Services that are ready.
    pub fn succeeded(&self) -> impl Iterator<Item = &ServiceRun> {
        self.services.iter().filter(|s| s.succeeded())
    }

    /// Services that failed.
    pub fn failed(&self) -> impl Iterator<Item = &ServiceRun> {
        self.services.iter().filter(|s| !s.succeeded())
    }

    /// Returns the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.failed().next().is_some() {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }
}

/// What `stop` did to one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopAction {
    /// The pod was stopped.
    Stopped,
    /// The pod was stopped and removed.
    Removed,
    /// The pod exists but was not running.
    AlreadyStopped,
    /// No pod exists.
    Missing,
}

impl fmt::Display for StopAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Removed => "removed",
            Self::AlreadyStopped => "already stopped",
            Self::Missing => "not found",
        };
        f.write_str(label)
    }
}

/// Per-service result of `stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopRecord {
    /// Service name.
    pub name: String,
    /// Pod name.
    pub pod: String,
    /// What was done.
    pub action: Option<StopAction>,
    /// Engine error, if any.
    pub error: Option<String>,
}

/// Result of `stop`.
#[derive(Debug, Clone, Serialize)]
pub struct StopReport {
    /// Removal was declined; nothing was touched.
    pub aborted: bool,
    /// Per-service results.
    pub services: Vec<StopRecord>,
}

impl StopReport {
    /// Returns the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.services.iter().any(|s| s.error.is_some()) {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }
}

/// Health classification shown by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "health", content = "detail", rename_all = "kebab-case")]
pub enum HealthSummary {
    /// The probe was accepted.
    Healthy,
    /// The probe was rejected or failed.
    Unhealthy(String),
    /// The service has no contract or no published port.
    Unchecked,
    /// The container is not running.
    Down,
}

impl fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy(detail) => write!(f, "unhealthy ({detail})"),
            Self::Unchecked => f.write_str("running"),
            Self::Down => f.write_str("down"),
        }
    }
}

/// One row of `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    /// Service name.
    pub name: String,
    /// Pod name.
    pub pod: String,
    /// Pod state, `None` if absent.
    pub pod_state: Option<PodState>,
    /// Container state, `None` if absent.
    pub container_state: Option<ContainerState>,
    /// Image the container runs, or the planned image.
    pub image: String,
    /// The container runs a different spec than planned.
    pub outdated: bool,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Mount sources.
    pub volumes: Vec<String>,
    /// When the container started.
    pub started_at: Option<DateTime<Utc>>,
    /// Time since start.
    pub uptime_secs: Option<i64>,
    /// Health classification.
    pub health: HealthSummary,
    /// Where the service answers.
    pub url: Option<String>,
    /// Accelerator variant.
    pub variant: String,
}

/// Result of `status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Shared network name.
    pub network: String,
    /// Whether the network exists.
    pub network_exists: bool,
    /// Per-service rows.
    pub services: Vec<ServiceStatus>,
}

impl StatusReport {
    /// Returns the process exit code; status never fails partially.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        EXIT_SUCCESS
    }
}

/// A cleanup category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanCategory {
    /// Pods and their containers.
    Pods,
    /// Engine volumes and bind directories.
    Volumes,
    /// Service images.
    Images,
    /// The shared network.
    Network,
    /// Configuration files and the shared secret.
    Configs,
}

impl fmt::Display for CleanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pods => "pods",
            Self::Volumes => "volumes",
            Self::Images => "images",
            Self::Network => "network",
            Self::Configs => "configs",
        };
        f.write_str(label)
    }
}

/// Everything a cleanup would remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupPlan {
    /// Existing pods.
    pub pods: Vec<String>,
    /// Existing engine volumes referenced by the plan.
    pub volumes: Vec<String>,
    /// Existing bind directories referenced by the plan.
    pub bind_dirs: Vec<PathBuf>,
    /// Present images.
    pub images: Vec<String>,
    /// The network, if it exists.
    pub network: Option<String>,
    /// Existing configuration files.
    pub config_files: Vec<PathBuf>,
}

impl CleanupPlan {
    /// Returns whether nothing would be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
            && self.volumes.is_empty()
            && self.bind_dirs.is_empty()
            && self.images.is_empty()
            && self.network.is_none()
            && self.config_files.is_empty()
    }

    /// Returns the items of one category, for display.
    #[must_use]
    pub fn items(&self, category: CleanCategory) -> Vec<String> {
        match category {
            CleanCategory::Pods => self.pods.clone(),
            CleanCategory::Volumes => self
                .volumes
                .iter()
                .cloned()
                .chain(self.bind_dirs.iter().map(|p| p.display().to_string()))
                .collect(),
            CleanCategory::Images => self.images.clone(),
            CleanCategory::Network => self.network.iter().cloned().collect(),
            CleanCategory::Configs => self
                .config_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }
}

/// One removed (or failed) item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanRecord {
    /// Category.
    pub category: CleanCategory,
    /// Name or path.
    pub name: String,
    /// Error, if removal failed.
    pub error: Option<String>,
}

/// Result of `clean`.
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    /// Nothing was deleted because this was a dry run.
    pub dry_run: bool,
    /// What was (or would be) removed.
    pub plan: CleanupPlan,
    /// Removal results.
    pub removed: Vec<CleanRecord>,
    /// Categories the operator declined.
    pub declined: Vec<CleanCategory>,
    /// Backup of the configuration file, if one was made.
    pub backup: Option<PathBuf>,
}

impl CleanReport {
    /// Returns the process exit code.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.removed.iter().any(|r| r.error.is_some()) {
            EXIT_PARTIAL
        } else {
            EXIT_SUCCESS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_exit_codes() {
        let mut report = StartReport {
            phase: RunPhase::Settled,
            decisions: Vec::new(),
            provisioned: Vec::new(),
            pulls: Vec::new(),
            services: vec![ServiceRun::new("ollama"), ServiceRun::new("comfyui")],
            cancelled: false,
        };
        assert_eq!(report.exit_code(), EXIT_SUCCESS);

        report.services[1].failure = Some(ServiceFailure::Launch {
            reason: String::from("boom"),
        });
        assert_eq!(report.exit_code(), EXIT_PARTIAL);
        assert_eq!(report.succeeded().count(), 1);
        assert_eq!(report.failed().next().unwrap().name, "comfyui");
    }

    #[test]
    fn test_cleanup_plan_items() {
        let plan = CleanupPlan {
            volumes: vec![String::from("cache")],
            bind_dirs: vec![PathBuf::from("/tmp/a")],
            ..CleanupPlan::default()
        };
        assert!(!plan.is_empty());
        assert_eq!(plan.items(CleanCategory::Volumes), ["cache", "/tmp/a"]);
        assert!(CleanupPlan::default().is_empty());
    }
}

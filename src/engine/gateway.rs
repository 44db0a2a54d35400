//! The container engine boundary.
//!
//! Everything the orchestrator does to the host goes through
//! [`EngineGateway`]. Resources are addressed by the names in
//! [`ServiceSpec`](crate::planner::ServiceSpec); the gateway never decides
//! anything on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EnginePreference, NetworkConfig};
use crate::error::{DependencyError, EngineError};
use crate::planner::{PortMapping, Resources};

use super::podman::PodmanGateway;

/// Label carrying the spec hash on managed containers.
pub const SPEC_HASH_LABEL: &str = "airpods.spec-hash";

/// Result type for gateway calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Stopped or exited.
    Exited,
    /// Any other engine state.
    Unknown,
}

impl ContainerState {
    /// Parses an engine state string.
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" | "configured" | "initialized" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "exited" | "stopped" | "dead" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Returns whether the container is running.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Exited => "exited",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Lifecycle state of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PodState {
    /// Created, no container started yet.
    Created,
    /// At least one container running.
    Running,
    /// Some containers running, some not.
    Degraded,
    /// No container running.
    Exited,
    /// Any other engine state.
    Unknown,
}

impl PodState {
    /// Parses an engine pod state string.
    #[must_use]
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "degraded" => Self::Degraded,
            "exited" | "stopped" | "dead" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Returns whether any container in the pod runs.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::Degraded)
    }
}

impl fmt::Display for PodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Exited => "exited",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// What the engine reports about a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    /// Container name.
    pub name: String,
    /// Lifecycle state.
    pub state: ContainerState,
    /// Image reference the container was created from.
    pub image: String,
    /// Value of [`SPEC_HASH_LABEL`], if present.
    pub spec_hash: Option<String>,
    /// When the container last started.
    pub started_at: Option<DateTime<Utc>>,
}

/// Network creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRequest {
    /// Network name.
    pub name: String,
    /// Creation options.
    pub options: NetworkConfig,
}

/// Pod creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRequest {
    /// Pod name.
    pub name: String,
    /// Network to join.
    pub network: String,
    /// Published ports; pods own the port bindings.
    pub ports: Vec<PortMapping>,
}

/// A resolved mount argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountArg {
    /// Host path or engine volume name.
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Container creation request.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRequest {
    /// Container name.
    pub name: String,
    /// Pod to join.
    pub pod: String,
    /// Image reference.
    pub image: String,
    /// Environment, including injected secrets.
    pub env: BTreeMap<String, String>,
    /// Mounts.
    pub mounts: Vec<MountArg>,
    /// Network aliases.
    pub network_aliases: Vec<String>,
    /// Labels.
    pub labels: BTreeMap<String, String>,
    /// Restart policy spelling.
    pub restart_policy: String,
    /// Extra engine arguments used to attach GPUs, empty for CPU.
    pub gpu_args: Vec<String>,
    /// Resource limits.
    pub resources: Resources,
}

impl ContainerRequest {
    /// Returns the spec hash label value.
    #[must_use]
    pub fn spec_hash(&self) -> Option<&str> {
        self.labels.get(SPEC_HASH_LABEL).map(String::as_str)
    }
}

/// Container engine operations used by the orchestrator.
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Engine name, for messages.
    fn name(&self) -> &str;

    /// Verifies that the engine answers; returns its version.
    async fn check_available(&self) -> EngineResult<String>;

    /// Returns whether the network exists.
    async fn network_exists(&self, name: &str) -> EngineResult<bool>;

    /// Creates a network.
    async fn create_network(&self, request: &NetworkRequest) -> EngineResult<()>;

    /// Removes a network.
    async fn remove_network(&self, name: &str) -> EngineResult<()>;

    /// Lists engine volume names.
    async fn list_volumes(&self) -> EngineResult<Vec<String>>;

    /// Returns whether an engine volume exists.
    async fn volume_exists(&self, name: &str) -> EngineResult<bool>;

    /// Creates an engine volume.
    async fn create_volume(&self, name: &str) -> EngineResult<()>;

    /// Removes an engine volume.
    async fn remove_volume(&self, name: &str) -> EngineResult<()>;

    /// Returns the pod state, or `None` if it does not exist.
    async fn pod_state(&self, name: &str) -> EngineResult<Option<PodState>>;

    /// Creates a pod.
    async fn create_pod(&self, request: &PodRequest) -> EngineResult<()>;

    /// Starts a pod and its containers.
    async fn start_pod(&self, name: &str) -> EngineResult<()>;

    /// Stops a pod, waiting up to `timeout` before killing.
    async fn stop_pod(&self, name: &str, timeout: Duration) -> EngineResult<()>;

    /// Removes a pod and its containers.
    async fn remove_pod(&self, name: &str) -> EngineResult<()>;

    /// Returns container details, or `None` if it does not exist.
    async fn inspect_container(&self, name: &str) -> EngineResult<Option<ContainerInfo>>;

    /// Creates and starts a container.
    async fn create_container(&self, request: &ContainerRequest) -> EngineResult<()>;

    /// Starts an existing container.
    async fn start_container(&self, name: &str) -> EngineResult<()>;

    /// Removes a container.
    async fn remove_container(&self, name: &str) -> EngineResult<()>;

    /// Returns whether the image is present locally.
    async fn image_exists(&self, image: &str) -> EngineResult<bool>;

    /// Pulls an image.
    async fn pull_image(&self, image: &str) -> EngineResult<()>;

    /// Removes a local image.
    async fn remove_image(&self, image: &str) -> EngineResult<()>;

    /// Returns the last `lines` lines of container output.
    async fn tail_logs(&self, container: &str, lines: u32) -> EngineResult<String>;
}

/// Picks the gateway implementation for an engine preference.
///
/// # Errors
///
/// Returns [`DependencyError::UnsupportedEngine`] for Docker.
pub fn select_gateway(
    prefer: EnginePreference,
    command_timeout: Duration,
) -> std::result::Result<Arc<dyn EngineGateway>, DependencyError> {
    match prefer {
        EnginePreference::Auto | EnginePreference::Podman => {
            Ok(Arc::new(PodmanGateway::new(command_timeout)))
        }
        EnginePreference::Docker => Err(DependencyError::UnsupportedEngine {
            engine: String::from(prefer.as_str()),
        }),
    }
}

/// Creates a bind mount directory if it is absent.
///
/// Returns `true` if the directory was created.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_bind_dir(path: &Path) -> std::io::Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(path)?;
    Ok(true)
}

/// Writes a generated file unless it already holds `contents`.
///
/// Returns `true` if the file was written.
///
/// # Errors
///
/// Returns an error if the parent directory or the file cannot be written.
pub fn ensure_generated_file(path: &Path, contents: &str) -> std::io::Result<bool> {
    if path.is_file() && std::fs::read_to_string(path)? == contents {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parsing() {
        assert_eq!(ContainerState::parse("Running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("weird"), ContainerState::Unknown);
        assert!(PodState::parse("Degraded").is_running());
        assert!(!PodState::parse("Exited").is_running());
    }

    #[test]
    fn test_generated_file_written_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("configs").join("Caddyfile");

        assert!(ensure_generated_file(&path, ":80 {}\n").unwrap());
        assert!(!ensure_generated_file(&path, ":80 {}\n").unwrap());
        assert!(ensure_generated_file(&path, ":81 {}\n").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), ":81 {}\n");
    }

    #[test]
    fn test_docker_is_rejected() {
        let result = select_gateway(EnginePreference::Docker, Duration::from_secs(5));
        assert!(matches!(
            result,
            Err(DependencyError::UnsupportedEngine { ref engine }) if engine == "docker"
        ));
        assert!(select_gateway(EnginePreference::Auto, Duration::from_secs(5)).is_ok());
    }
}

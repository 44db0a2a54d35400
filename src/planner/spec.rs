//! Concrete per-service specifications.
//!
//! A [`ServiceSpec`] is everything the orchestrator needs to create or
//! compare one service's pod and container. Specs are derived once per
//! invocation and never mutated afterwards.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::config::{GpuConfig, HealthConfig, RestartPolicy};

/// A published `(host, container)` port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortMapping {
    /// Host side port.
    pub host: u16,
    /// Container side port.
    pub container: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Where a mount's data lives on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MountSource {
    /// A host directory.
    Bind(PathBuf),
    /// A single host file generated by airpods.
    File(PathBuf),
    /// A named engine volume.
    Volume(String),
}

impl MountSource {
    /// Returns the `--volume` source argument.
    #[must_use]
    pub fn as_arg(&self) -> String {
        match self {
            Self::Bind(path) | Self::File(path) => path.display().to_string(),
            Self::Volume(name) => name.clone(),
        }
    }
}

/// A named mount of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    /// Descriptive name from the configuration.
    pub name: String,
    /// Resolved source.
    pub source: MountSource,
    /// Absolute path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// Inclusive range of accepted HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusRange {
    /// Lowest accepted status.
    pub start: u16,
    /// Highest accepted status.
    pub end: u16,
}

impl StatusRange {
    /// Returns whether `status` is accepted.
    #[must_use]
    pub const fn contains(&self, status: u16) -> bool {
        status >= self.start && status <= self.end
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Readiness contract of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthContract {
    /// HTTP path probed on the first published host port.
    pub path: String,
    /// Accepted status codes.
    pub accepted: StatusRange,
}

impl HealthContract {
    /// Builds a contract from configuration; `None` when no path is set.
    #[must_use]
    pub fn from_config(config: &HealthConfig) -> Option<Self> {
        let path = config.path.as_ref()?.trim();
        if path.is_empty() {
            return None;
        }
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let [start, end] = config.expected_status;
        Some(Self {
            path,
            accepted: StatusRange { start, end },
        })
    }
}

/// How strongly a service depends on an accelerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceleratorRequirement {
    /// CPU only.
    None,
    /// Uses a GPU when one is available.
    Optional,
    /// Needs a GPU device attached.
    Required,
}

impl AcceleratorRequirement {
    /// Maps GPU settings onto a requirement level.
    #[must_use]
    pub const fn from_gpu(gpu: &GpuConfig) -> Self {
        match (gpu.enabled, gpu.required) {
            (false, _) => Self::None,
            (true, false) => Self::Optional,
            (true, true) => Self::Required,
        }
    }
}

/// Resource limits passed to the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Resources {
    /// Memory limit such as `8g`.
    pub memory: Option<String>,
    /// CPU quota.
    pub cpus: Option<f64>,
}

/// The concrete specification of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    /// Service name.
    pub name: String,
    /// Pod name.
    pub pod: String,
    /// Container name.
    pub container: String,
    /// Image reference after variant substitution.
    pub image: String,
    /// Published ports, in configuration order.
    pub ports: Vec<PortMapping>,
    /// Mounts, ordered by name.
    pub mounts: Vec<Mount>,
    /// Environment variables.
    pub env: BTreeMap<String, String>,
    /// DNS names on the shared network, the service name first.
    pub network_aliases: Vec<String>,
    /// Readiness contract.
    pub health: Option<HealthContract>,
    /// Accelerator dependency.
    pub accelerator: AcceleratorRequirement,
    /// CPU was forced.
    pub force_cpu: bool,
    /// GPU devices are attached.
    pub use_gpu: bool,
    /// Chosen accelerator variant.
    pub variant: String,
    /// Receives the shared WebUI secret.
    pub needs_shared_secret: bool,
    /// Resource limits.
    pub resources: Resources,
    /// Container restart policy.
    pub restart_policy: RestartPolicy,
    /// Hash over image, ports and env.
    pub spec_hash: String,
}

impl ServiceSpec {
    /// Returns the base URL for health probes, if a host port is published.
    #[must_use]
    pub fn probe_url(&self) -> Option<String> {
        self.ports
            .first()
            .map(|port| format!("http://127.0.0.1:{}", port.host))
    }

    /// Returns whether `name` addresses this service.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.network_aliases.iter().any(|alias| alias == name)
    }

    /// Returns the engine volumes this service mounts.
    pub fn engine_volumes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().filter_map(|mount| match &mount.source {
            MountSource::Volume(name) => Some(name.as_str()),
            MountSource::Bind(_) | MountSource::File(_) => None,
        })
    }

    /// Returns the host directories this service bind-mounts.
    pub fn bind_dirs(&self) -> impl Iterator<Item = &PathBuf> {
        self.mounts.iter().filter_map(|mount| match &mount.source {
            MountSource::Bind(path) => Some(path),
            MountSource::File(_) | MountSource::Volume(_) => None,
        })
    }
}

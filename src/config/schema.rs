//! Typed configuration schema.
//!
//! These types are the typed projection of the merged, template-expanded
//! TOML document. Every section carries serde defaults so that partially
//! specified service tables deserialize, while the built-in defaults
//! document supplies the values operators normally see.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Value meaning "decide automatically" for accelerator and engine options.
pub const AUTO: &str = "auto";

/// Device flag substituted for `runtime.gpu_device_flag = "auto"`.
pub const DEFAULT_GPU_DEVICE_FLAG: &str = "--device nvidia.com/gpu=all";

/// Services that must be defined in every configuration.
pub const REQUIRED_SERVICES: &[&str] = &["ollama", "open-webui"];

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct AirpodsConfig {
    /// Document metadata.
    #[serde(default)]
    pub meta: MetaConfig,
    /// Container runtime settings.
    #[serde(default)]
    #[validate(nested)]
    pub runtime: RuntimeConfig,
    /// CLI behavior settings.
    #[serde(default)]
    #[validate(nested)]
    pub cli: CliConfig,
    /// External tool requirements.
    #[serde(default)]
    pub dependencies: DependenciesConfig,
    /// Service definitions keyed by service name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// Document metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetaConfig {
    /// Schema version of the document.
    pub version: String,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            version: String::from("1.0"),
        }
    }
}

/// Preferred container engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnginePreference {
    /// Use whichever supported engine is available.
    #[default]
    Auto,
    /// Rootless Podman.
    Podman,
    /// Docker (not supported yet).
    Docker,
}

impl EnginePreference {
    /// Returns the configuration spelling of this preference.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    No,
    /// Restart when the container exits non-zero.
    OnFailure,
    /// Always restart.
    Always,
    /// Restart unless stopped by the operator.
    #[default]
    UnlessStopped,
}

impl RestartPolicy {
    /// Returns the engine spelling of this policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::OnFailure => "on-failure",
            Self::Always => "always",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Preferred engine.
    pub prefer: EnginePreference,
    /// Name of the shared network.
    #[validate(length(min = 1))]
    pub network_name: String,
    /// Network creation options.
    pub network: NetworkConfig,
    /// Flag(s) passed to the engine to attach GPUs.
    pub gpu_device_flag: String,
    /// Restart policy for every container.
    pub restart_policy: RestartPolicy,
    /// Global accelerator variant override (`auto` to detect).
    pub cuda_version: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            prefer: EnginePreference::Auto,
            network_name: String::from("airpods_network"),
            network: NetworkConfig::default(),
            gpu_device_flag: String::from(AUTO),
            restart_policy: RestartPolicy::UnlessStopped,
            cuda_version: String::from(AUTO),
        }
    }
}

/// Network creation options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network driver.
    pub driver: String,
    /// Optional subnet in CIDR notation.
    pub subnet: Option<String>,
    /// Optional gateway address.
    pub gateway: Option<String>,
    /// DNS servers handed to containers.
    pub dns_servers: Vec<String>,
    /// Enable IPv6.
    pub ipv6: bool,
    /// Restrict external access.
    pub internal: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            driver: String::from("bridge"),
            subnet: None,
            gateway: None,
            dns_servers: Vec::new(),
            ipv6: false,
            internal: false,
        }
    }
}

/// CLI behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[serde(default)]
pub struct CliConfig {
    /// Grace period for stopping pods, in seconds.
    #[validate(range(min = 1, max = 300))]
    pub stop_timeout: u64,
    /// Default number of log lines to show.
    #[validate(range(min = 1, max = 10_000))]
    pub log_lines: u32,
    /// Timeout of a single status probe, in seconds.
    #[validate(custom(function = "validate_finite"), range(min = 0.1, max = 60.0))]
    pub ping_timeout: f64,
    /// Shared health gating budget for a start run, in seconds.
    #[validate(range(min = 10, max = 600))]
    pub startup_timeout: u64,
    /// Interval between health probe attempts, in seconds.
    #[validate(custom(function = "validate_finite"), range(min = 0.5, max = 10.0))]
    pub startup_check_interval: f64,
    /// Maximum number of concurrent image pulls.
    #[validate(range(min = 1, max = 16))]
    pub max_concurrent_pulls: usize,
    /// Answer yes to every confirmation.
    pub auto_confirm: bool,
    /// Enable debug logging.
    pub debug: bool,
}

impl CliConfig {
    /// Returns the status probe timeout.
    #[must_use]
    pub fn ping_timeout(&self) -> Duration {
        seconds(self.ping_timeout, Self::default().ping_timeout)
    }

    /// Returns the interval between health probe attempts.
    #[must_use]
    pub fn startup_check_interval(&self) -> Duration {
        seconds(self.startup_check_interval, Self::default().startup_check_interval)
    }
}

/// Converts validated seconds; values that slipped past validation fall
/// back to `default`.
fn seconds(value: f64, default: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(default))
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            stop_timeout: 10,
            log_lines: 200,
            ping_timeout: 2.0,
            startup_timeout: 120,
            startup_check_interval: 2.0,
            max_concurrent_pulls: 3,
            auto_confirm: false,
            debug: false,
        }
    }
}

/// External tool requirements.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DependenciesConfig {
    /// Tools that must be on `PATH` before any mutation.
    pub required: Vec<String>,
    /// Tools that are reported but not enforced.
    pub optional: Vec<String>,
    /// Skip the tool checks entirely.
    pub skip_checks: bool,
}

impl Default for DependenciesConfig {
    fn default() -> Self {
        Self {
            required: vec![String::from("podman")],
            optional: vec![String::from("nvidia-smi")],
            skip_checks: false,
        }
    }
}

/// Definition of one orchestrated service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct ServiceConfig {
    /// Whether the service is part of the plan.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base image reference.
    #[serde(default)]
    pub image: String,
    /// Accelerator variant to image reference overrides.
    #[serde(default)]
    pub image_variants: BTreeMap<String, String>,
    /// Pod name (defaults to the service name).
    #[serde(default)]
    pub pod: Option<String>,
    /// Container name (defaults to `<pod>-0`).
    #[serde(default)]
    pub container: Option<String>,
    /// Published ports.
    #[serde(default)]
    #[validate(nested)]
    pub ports: Vec<PortConfig>,
    /// Mounts keyed by a descriptive name.
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeConfig>,
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra DNS names on the shared network.
    #[serde(default)]
    pub network_aliases: Vec<String>,
    /// Readiness contract.
    #[serde(default)]
    #[validate(nested)]
    pub health: Option<HealthConfig>,
    /// GPU settings.
    #[serde(default)]
    pub gpu: GpuConfig,
    /// Per-service accelerator variant override (`auto` to defer).
    #[serde(default)]
    pub cuda_override: Option<String>,
    /// Resource limits.
    #[serde(default)]
    #[validate(nested)]
    pub resources: ResourceLimits,
    /// Whether the service receives the generated WebUI secret.
    #[serde(default)]
    pub needs_webui_secret: bool,
    /// Reached through the gateway service when it runs.
    #[serde(default)]
    pub behind_gateway: bool,
}

impl ServiceConfig {
    /// Returns the pod name for the service.
    #[must_use]
    pub fn pod_name(&self, service: &str) -> String {
        self.pod.clone().unwrap_or_else(|| service.to_string())
    }

    /// Returns the container name for the service.
    #[must_use]
    pub fn container_name(&self, service: &str) -> String {
        self.container
            .clone()
            .unwrap_or_else(|| format!("{}-0", self.pod_name(service)))
    }
}

/// A published port.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct PortConfig {
    /// Host side port.
    #[validate(range(min = 1))]
    pub host: u16,
    /// Container side port (defaults to the host port).
    #[serde(default)]
    #[validate(range(min = 1))]
    pub container: Option<u16>,
}

impl PortConfig {
    /// Returns the container port, falling back to the host port.
    #[must_use]
    pub fn container_port(&self) -> u16 {
        self.container.unwrap_or(self.host)
    }
}

/// A named mount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeConfig {
    /// `bind://name`, an absolute host path, or an engine volume name.
    pub source: String,
    /// Absolute mount point inside the container.
    pub target: String,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
}

/// Readiness contract settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct HealthConfig {
    /// HTTP path to probe; no path means no contract.
    #[serde(default)]
    pub path: Option<String>,
    /// Inclusive range of accepted status codes.
    #[serde(default = "default_expected_status")]
    #[validate(custom(function = "validate_status_range"))]
    pub expected_status: [u16; 2],
}

/// GPU settings of a service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct GpuConfig {
    /// The service can use a GPU.
    pub enabled: bool,
    /// The service cannot run without a GPU device attached.
    pub required: bool,
    /// Always use the CPU variant.
    pub force_cpu: bool,
}

/// Resource limits of a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, Validate)]
#[serde(default)]
pub struct ResourceLimits {
    /// Memory limit such as `8g` or `512m`.
    pub memory: Option<String>,
    /// CPU quota.
    #[validate(custom(function = "validate_finite"), range(min = 0.01))]
    pub cpus: Option<f64>,
}

const fn default_true() -> bool {
    true
}

const fn default_expected_status() -> [u16; 2] {
    [200, 399]
}

#[allow(clippy::needless_pass_by_value)]
fn validate_finite(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::new("not_finite"))
    }
}

fn validate_status_range(range: &[u16; 2]) -> Result<(), ValidationError> {
    let [start, end] = *range;
    if !(100..=599).contains(&start) || !(100..=599).contains(&end) {
        return Err(ValidationError::new("status_out_of_range"));
    }
    if start > end {
        return Err(ValidationError::new("status_range_reversed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_port_defaults_to_host() {
        let port = PortConfig {
            host: 11434,
            container: None,
        };
        assert_eq!(port.container_port(), 11434);
    }

    #[test]
    fn test_names_default_from_service() {
        let service: ServiceConfig = toml::from_str("image = \"docker.io/x/y:1\"").unwrap();
        assert!(service.enabled);
        assert_eq!(service.pod_name("comfyui"), "comfyui");
        assert_eq!(service.container_name("comfyui"), "comfyui-0");
    }

    #[test]
    fn test_status_range_validation() {
        let health = HealthConfig {
            path: Some(String::from("/")),
            expected_status: [300, 200],
        };
        assert!(health.validate().is_err());

        let health = HealthConfig {
            path: Some(String::from("/")),
            expected_status: [200, 299],
        };
        assert!(health.validate().is_ok());
    }

    #[test]
    fn test_cli_ranges() {
        let cli = CliConfig {
            stop_timeout: 0,
            ..CliConfig::default()
        };
        assert!(cli.validate().is_err());
        assert!(CliConfig::default().validate().is_ok());
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        for value in [f64::NAN, f64::INFINITY] {
            let cli = CliConfig {
                ping_timeout: value,
                ..CliConfig::default()
            };
            assert!(cli.validate().is_err());

            let cli = CliConfig {
                startup_check_interval: value,
                ..CliConfig::default()
            };
            assert!(cli.validate().is_err());

            let limits = ResourceLimits {
                memory: None,
                cpus: Some(value),
            };
            assert!(limits.validate().is_err());
        }
        assert!(ResourceLimits::default().validate().is_ok());
    }

    #[test]
    fn test_durations_never_panic() {
        let cli = CliConfig {
            ping_timeout: f64::NAN,
            startup_check_interval: -1.0,
            ..CliConfig::default()
        };
        assert_eq!(cli.ping_timeout(), Duration::from_secs(2));
        assert_eq!(cli.startup_check_interval(), Duration::from_secs(2));
        assert_eq!(CliConfig::default().ping_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_restart_policy_spelling() {
        let runtime: RuntimeConfig = toml::from_str("restart_policy = \"on-failure\"").unwrap();
        assert_eq!(runtime.restart_policy.as_str(), "on-failure");
        assert_eq!(runtime.network_name, "airpods_network");
    }
}

//! Host accelerator capability detection.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::DetectionError;

/// Default timeout for the detection command.
const DETECT_TIMEOUT_SECS: u64 = 10;

/// A CUDA compute capability such as `8.9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ComputeCapability {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl ComputeCapability {
    /// Creates a capability value.
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ComputeCapability {
    type Err = DetectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || DetectionError::Unparsable {
            line: s.to_string(),
        };
        let (major, minor) = s.trim().split_once('.').ok_or_else(unparsable)?;
        Ok(Self {
            major: major.trim().parse().map_err(|_| unparsable())?,
            minor: minor.trim().parse().map_err(|_| unparsable())?,
        })
    }
}

/// A detected GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpuInfo {
    /// Marketing name reported by the driver.
    pub name: String,
    /// Compute capability.
    pub capability: ComputeCapability,
}

/// Source of host accelerator capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Detects the first GPU on the host.
    async fn detect(&self) -> Result<GpuInfo, DetectionError>;
}

/// Probe backed by `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiProbe {
    program: String,
    timeout: Duration,
}

impl Default for NvidiaSmiProbe {
    fn default() -> Self {
        Self {
            program: String::from("nvidia-smi"),
            timeout: Duration::from_secs(DETECT_TIMEOUT_SECS),
        }
    }
}

impl NvidiaSmiProbe {
    /// Creates a probe with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CapabilityProbe for NvidiaSmiProbe {
    async fn detect(&self) -> Result<GpuInfo, DetectionError> {
        let program = which::which(&self.program).map_err(|_| DetectionError::ToolMissing {
            tool: self.program.clone(),
        })?;

        let mut command = Command::new(program);
        command
            .args([
                "--query-gpu=name,compute_cap",
                "--format=csv,noheader,nounits",
            ])
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| DetectionError::CommandFailed {
                message: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| DetectionError::CommandFailed {
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(DetectionError::CommandFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("nvidia-smi reported: {}", stdout.trim());
        parse_gpu_query(&stdout)
    }
}

/// Parses the first line of `nvidia-smi --query-gpu=name,compute_cap` CSV output.
///
/// # Errors
///
/// Returns [`DetectionError::NoDevices`] for empty output, or
/// [`DetectionError::Unparsable`] for malformed lines.
pub fn parse_gpu_query(output: &str) -> Result<GpuInfo, DetectionError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(DetectionError::NoDevices)?;

    let (name, capability) = line.rsplit_once(',').ok_or_else(|| DetectionError::Unparsable {
        line: line.to_string(),
    })?;

    Ok(GpuInfo {
        name: name.trim().to_string(),
        capability: capability.parse().map_err(|_| DetectionError::Unparsable {
            line: line.to_string(),
        })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_gpu() {
        let info = parse_gpu_query("NVIDIA GeForce RTX 4090, 8.9\nNVIDIA T4, 7.5\n").unwrap();
        assert_eq!(info.name, "NVIDIA GeForce RTX 4090");
        assert_eq!(info.capability, ComputeCapability::new(8, 9));
    }

    #[test]
    fn test_parse_empty_output() {
        assert_eq!(parse_gpu_query("\n  \n"), Err(DetectionError::NoDevices));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_gpu_query("No devices were found"),
            Err(DetectionError::Unparsable { .. })
        ));
        assert!(matches!(
            parse_gpu_query("Tesla K80, [N/A]"),
            Err(DetectionError::Unparsable { .. })
        ));
    }

    #[test]
    fn test_capability_ordering() {
        let older: ComputeCapability = "7.5".parse().unwrap();
        let newer: ComputeCapability = "12.0".parse().unwrap();
        assert!(older < newer);
        assert_eq!(newer.to_string(), "12.0");
    }
}

//! Per-service accelerator variant selection.
//!
//! Priority chain, first match wins:
//! 1. forced CPU (service `gpu.force_cpu` or the CLI `--cpu` flag)
//! 2. service `cuda_override`
//! 3. global `runtime.cuda_version`
//! 4. detected compute capability mapped through [`VARIANT_TABLE`]
//! 5. [`FALLBACK_VARIANT`]

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use crate::config::{ServiceConfig, AUTO};
use crate::error::DetectionError;

use super::detect::{CapabilityProbe, ComputeCapability, GpuInfo};

/// Variant used when nothing better is known.
pub const FALLBACK_VARIANT: &str = "cu126";

/// CPU-only variant.
pub const CPU_VARIANT: &str = "cpu";

/// Capability lower bounds and their variants, ascending.
pub const VARIANT_TABLE: &[(ComputeCapability, &str)] = &[
    (ComputeCapability::new(3, 5), "cu118"),
    (ComputeCapability::new(6, 0), "cu126"),
    (ComputeCapability::new(8, 0), "cu128"),
    (ComputeCapability::new(9, 0), "cu130"),
];

/// Returns the newest variant whose lower bound does not exceed `capability`.
#[must_use]
pub fn variant_for_capability(capability: ComputeCapability) -> Option<&'static str> {
    VARIANT_TABLE
        .iter()
        .rev()
        .find(|(lower, _)| *lower <= capability)
        .map(|(_, variant)| *variant)
}

/// Returns a human readable label for a variant tag.
#[must_use]
pub fn variant_label(variant: &str) -> String {
    match variant {
        CPU_VARIANT => String::from("CPU only"),
        "cu118" => String::from("CUDA 11.8"),
        "cu126" => String::from("CUDA 12.6"),
        "cu128" => String::from("CUDA 12.8"),
        "cu130" => String::from("CUDA 13.0"),
        other => other.to_uppercase(),
    }
}

/// Why a variant was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    /// The service does not use a GPU.
    NotRequired,
    /// CPU was forced by the service or the command line.
    Forced,
    /// The service's own override.
    ServiceOverride,
    /// The global runtime override.
    GlobalOverride,
    /// Mapped from the detected capability.
    AutoDetected,
    /// Detection failed or matched nothing.
    Fallback,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotRequired => "not required",
            Self::Forced => "forced",
            Self::ServiceOverride => "service override",
            Self::GlobalOverride => "global override",
            Self::AutoDetected => "auto-detected",
            Self::Fallback => "fallback",
        };
        f.write_str(label)
    }
}

/// The accelerator choice for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceleratorDecision {
    /// Service name.
    pub service: String,
    /// Chosen variant tag.
    pub variant: String,
    /// Why it was chosen.
    pub source: DecisionSource,
    /// Detected capability, if detection ran and succeeded.
    pub capability: Option<ComputeCapability>,
    /// Detected GPU name.
    pub gpu_name: Option<String>,
    /// Whether GPU devices are attached to the container.
    pub attach_gpu: bool,
}

impl AcceleratorDecision {
    fn cpu(service: &str, source: DecisionSource) -> Self {
        Self {
            service: service.to_string(),
            variant: CPU_VARIANT.to_string(),
            source,
            capability: None,
            gpu_name: None,
            attach_gpu: false,
        }
    }
}

impl fmt::Display for AcceleratorDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}) via {}",
            self.service,
            variant_label(&self.variant),
            self.variant,
            self.source
        )?;
        if let Some(capability) = self.capability {
            write!(f, " for compute {capability}")?;
        }
        Ok(())
    }
}

/// Decides accelerator variants for a set of services.
pub struct AcceleratorSelector<'a> {
    probe: &'a dyn CapabilityProbe,
    global_override: Option<String>,
    force_cpu: bool,
}

impl<'a> AcceleratorSelector<'a> {
    /// Creates a selector over a capability probe.
    #[must_use]
    pub fn new(probe: &'a dyn CapabilityProbe, global_override: &str, force_cpu: bool) -> Self {
        Self {
            probe,
            global_override: explicit(Some(global_override)),
            force_cpu,
        }
    }

    /// Decides every enabled service. The probe runs at most once.
    pub async fn decide_all(
        &self,
        services: &BTreeMap<String, ServiceConfig>,
    ) -> Vec<AcceleratorDecision> {
        let mut detected: Option<Result<GpuInfo, DetectionError>> = None;
        let mut decisions = Vec::new();

        for (name, service) in services.iter().filter(|(_, s)| s.enabled) {
            let decision = if !service.gpu.enabled {
                AcceleratorDecision::cpu(name, DecisionSource::NotRequired)
            } else if self.force_cpu || service.gpu.force_cpu {
                AcceleratorDecision::cpu(name, DecisionSource::Forced)
            } else if let Some(variant) = explicit(service.cuda_override.as_deref()) {
                Self::overridden(name, variant, DecisionSource::ServiceOverride)
            } else if let Some(variant) = self.global_override.clone() {
                Self::overridden(name, variant, DecisionSource::GlobalOverride)
            } else {
                if detected.is_none() {
                    detected = Some(self.probe.detect().await);
                }
                match detected.as_ref() {
                    Some(result) => Self::from_detection(name, service.gpu.required, result),
                    None => Self::fallback(name, service.gpu.required, None),
                }
            };

            info!("Accelerator {decision}");
            decisions.push(decision);
        }

        decisions
    }

    fn overridden(service: &str, variant: String, source: DecisionSource) -> AcceleratorDecision {
        AcceleratorDecision {
            service: service.to_string(),
            attach_gpu: variant != CPU_VARIANT,
            variant,
            source,
            capability: None,
            gpu_name: None,
        }
    }

    fn from_detection(
        service: &str,
        required: bool,
        detected: &Result<GpuInfo, DetectionError>,
    ) -> AcceleratorDecision {
        match detected {
            Ok(gpu) => match variant_for_capability(gpu.capability) {
                Some(variant) => AcceleratorDecision {
                    service: service.to_string(),
                    variant: variant.to_string(),
                    source: DecisionSource::AutoDetected,
                    capability: Some(gpu.capability),
                    gpu_name: Some(gpu.name.clone()),
                    attach_gpu: true,
                },
                None => {
                    warn!(
                        "Compute capability {} of {} is below every known variant, using {FALLBACK_VARIANT}",
                        gpu.capability, gpu.name
                    );
                    let mut decision = Self::fallback(service, true, Some(gpu));
                    decision.capability = Some(gpu.capability);
                    decision
                }
            },
            Err(e) => {
                warn!("GPU detection failed for {service}: {e}; using {FALLBACK_VARIANT}");
                Self::fallback(service, required, None)
            }
        }
    }

    fn fallback(service: &str, attach_gpu: bool, gpu: Option<&GpuInfo>) -> AcceleratorDecision {
        AcceleratorDecision {
            service: service.to_string(),
            variant: FALLBACK_VARIANT.to_string(),
            source: DecisionSource::Fallback,
            capability: None,
            gpu_name: gpu.map(|g| g.name.clone()),
            attach_gpu,
        }
    }
}

fn explicit(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(AUTO))
        .map(str::to_lowercase)
}

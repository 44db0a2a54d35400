//! Accelerator (GPU/CUDA) image variant selection.
//!
//! Detection is delegated to a [`CapabilityProbe`]; its failures are never
//! fatal and always degrade to [`FALLBACK_VARIANT`].

mod detect;
mod select;

pub use detect::{parse_gpu_query, CapabilityProbe, ComputeCapability, GpuInfo, NvidiaSmiProbe};
pub use select::{
    variant_for_capability, variant_label, AcceleratorDecision, AcceleratorSelector,
    DecisionSource, CPU_VARIANT, FALLBACK_VARIANT, VARIANT_TABLE,
};

#[cfg(test)]
pub(crate) use detect::MockCapabilityProbe;

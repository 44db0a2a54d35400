//! Planning module for service specs.
//!
//! This module turns the resolved configuration and accelerator decisions
//! into concrete, validated service specifications, and bundles them into
//! the immutable [`ServicePlan`] the orchestrator drives.

mod builder;
mod gateway;
mod hash;
mod plan;
mod spec;

pub use builder::ServiceSpecBuilder;
pub use gateway::{
    gateway_enabled, render_caddyfile, GeneratedFile, CADDYFILE_TARGET, GATEWAY_SERVICE,
};
pub use hash::{short_hash, SpecHasher};
pub use plan::{InvocationContext, ServicePlan};
pub use spec::{
    AcceleratorRequirement, HealthContract, Mount, MountSource, PortMapping, Resources,
    ServiceSpec, StatusRange,
};

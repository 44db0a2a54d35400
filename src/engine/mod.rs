//! Container engine integration.
//!
//! This module provides:
//! - The [`EngineGateway`] boundary and its Podman implementation
//! - Fresh snapshots of engine state
//! - Bounded-concurrency image pulls
//! - HTTP health probing

#[cfg(test)]
pub(crate) mod fake;
mod gateway;
mod health;
mod observer;
mod podman;
mod pull;

pub use gateway::{
    ensure_bind_dir, ensure_generated_file, select_gateway, ContainerInfo, ContainerRequest, ContainerState,
    EngineGateway, EngineResult, MountArg, NetworkRequest, PodRequest, PodState, SPEC_HASH_LABEL,
};
pub use health::{HealthOutcome, HealthProber, HealthState, ProbeAttempt};
pub use observer::ObservedState;
pub use podman::{network_create_args, parse_container_inspect, pod_create_args, run_args, PodmanGateway};
pub use pull::{PullJob, PullOutcome, PullPolicy, PullResult, PullScheduler};

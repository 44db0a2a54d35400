//! Snapshot of engine state for the planned services.
//!
//! Fetched fresh at the start of every orchestrator run; nothing here is
//! cached between runs.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::planner::ServiceSpec;

use super::gateway::{ContainerInfo, EngineGateway, EngineResult, PodState};

/// What the engine reports for the resources a plan references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    /// Whether the shared network exists.
    pub network_exists: bool,
    /// Engine volumes present on the host.
    pub volumes: BTreeSet<String>,
    /// Pod states keyed by pod name; absent pods are missing.
    pub pods: BTreeMap<String, PodState>,
    /// Containers keyed by container name; absent containers are missing.
    pub containers: BTreeMap<String, ContainerInfo>,
    /// Images present locally.
    pub images: BTreeSet<String>,
}

impl ObservedState {
    /// Queries the engine for everything `specs` reference.
    ///
    /// # Errors
    ///
    /// Returns the first engine error encountered.
    pub async fn fetch(
        gateway: &dyn EngineGateway,
        network: &str,
        specs: &[&ServiceSpec],
    ) -> EngineResult<Self> {
        let mut observed = Self {
            network_exists: gateway.network_exists(network).await?,
            volumes: gateway.list_volumes().await?.into_iter().collect(),
            ..Self::default()
        };

        for spec in specs {
            if let Some(state) = gateway.pod_state(&spec.pod).await? {
                observed.pods.insert(spec.pod.clone(), state);
            }
            if let Some(info) = gateway.inspect_container(&spec.container).await? {
                observed.containers.insert(spec.container.clone(), info);
            }
            if !observed.images.contains(&spec.image) && gateway.image_exists(&spec.image).await? {
                observed.images.insert(spec.image.clone());
            }
        }

        debug!(
            pods = observed.pods.len(),
            containers = observed.containers.len(),
            images = observed.images.len(),
            "Observed engine state"
        );
        Ok(observed)
    }

    /// Returns the observed container for a spec.
    #[must_use]
    pub fn container(&self, spec: &ServiceSpec) -> Option<&ContainerInfo> {
        self.containers.get(&spec.container)
    }

    /// Returns the observed pod state for a spec.
    #[must_use]
    pub fn pod(&self, spec: &ServiceSpec) -> Option<PodState> {
        self.pods.get(&spec.pod).copied()
    }

    /// Returns whether the image is present locally.
    #[must_use]
    pub fn has_image(&self, image: &str) -> bool {
        self.images.contains(image)
    }
}

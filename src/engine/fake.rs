//! In-memory [`EngineGateway`] for tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::RestartPolicy;
use crate::error::EngineError;
use crate::planner::{AcceleratorRequirement, Resources, ServiceSpec};

use super::gateway::{
    ContainerInfo, ContainerRequest, ContainerState, EngineGateway, EngineResult, NetworkRequest,
    PodRequest, PodState,
};

/// Calls that only read state.
const READ_CALLS: &[&str] = &[
    "check_available",
    "network_exists",
    "list_volumes",
    "volume_exists",
    "pod_state",
    "inspect_container",
    "image_exists",
    "tail_logs",
];

/// A minimal CPU-only spec without ports or mounts.
pub fn spec(name: &str) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        pod: name.to_string(),
        container: format!("{name}-0"),
        image: format!("docker.io/test/{name}:1"),
        ports: Vec::new(),
        mounts: Vec::new(),
        env: BTreeMap::new(),
        network_aliases: vec![name.to_string()],
        health: None,
        accelerator: AcceleratorRequirement::None,
        force_cpu: false,
        use_gpu: false,
        variant: String::from("cpu"),
        needs_shared_secret: false,
        resources: Resources::default(),
        restart_policy: RestartPolicy::UnlessStopped,
        spec_hash: format!("hash-{name}"),
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub networks: BTreeSet<String>,
    pub volumes: BTreeSet<String>,
    pub pods: BTreeMap<String, PodState>,
    pub containers: BTreeMap<String, ContainerInfo>,
    pub container_pods: BTreeMap<String, String>,
    pub images: BTreeSet<String>,
    pub failing_pulls: BTreeSet<String>,
    pub failing_containers: BTreeSet<String>,
    pub last_requests: BTreeMap<String, ContainerRequest>,
}

#[derive(Debug, Default)]
pub struct FakeEngine {
    pub state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
    pull_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pull_delay(mut self, delay: Duration) -> Self {
        self.pull_delay = delay;
        self
    }

    pub fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    pub fn fail_pull(self, image: &str) -> Self {
        self.state.lock().unwrap().failing_pulls.insert(image.to_string());
        self
    }

    pub fn fail_container(self, container: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_containers
            .insert(container.to_string());
        self
    }

    /// Seeds a pod with one container in `state`.
    pub fn with_container(self, pod: &str, container: &str, image: &str, hash: &str, state: ContainerState) -> Self {
        {
            let mut s = self.state.lock().unwrap();
            let pod_state = if state.is_running() { PodState::Running } else { PodState::Exited };
            s.pods.insert(pod.to_string(), pod_state);
            s.container_pods.insert(container.to_string(), pod.to_string());
            s.containers.insert(
                container.to_string(),
                ContainerInfo {
                    name: container.to_string(),
                    state,
                    image: image.to_string(),
                    spec_hash: Some(hash.to_string()),
                    started_at: Some(Utc::now()),
                },
            );
            s.images.insert(image.to_string());
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                let verb = call.split(' ').next().unwrap_or_default();
                !READ_CALLS.contains(&verb)
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn container_state(&self, name: &str) -> Option<ContainerState> {
        self.state.lock().unwrap().containers.get(name).map(|c| c.state)
    }

    pub fn last_request(&self, container: &str) -> Option<ContainerRequest> {
        self.state.lock().unwrap().last_requests.get(container).cloned()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn set_pod_containers(state: &mut FakeState, pod: &str, to: ContainerState) {
        let names: Vec<String> = state
            .container_pods
            .iter()
            .filter(|(_, p)| p.as_str() == pod)
            .map(|(c, _)| c.clone())
            .collect();
        for name in names {
            if let Some(container) = state.containers.get_mut(&name) {
                container.state = to;
            }
        }
    }
}

#[async_trait]
impl EngineGateway for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_available(&self) -> EngineResult<String> {
        self.record("check_available");
        Ok(String::from("5.0.0"))
    }

    async fn network_exists(&self, name: &str) -> EngineResult<bool> {
        self.record(format!("network_exists {name}"));
        Ok(self.state.lock().unwrap().networks.contains(name))
    }

    async fn create_network(&self, request: &NetworkRequest) -> EngineResult<()> {
        self.record(format!("create_network {}", request.name));
        self.state.lock().unwrap().networks.insert(request.name.clone());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        self.record(format!("remove_network {name}"));
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn list_volumes(&self) -> EngineResult<Vec<String>> {
        self.record("list_volumes");
        Ok(self.state.lock().unwrap().volumes.iter().cloned().collect())
    }

    async fn volume_exists(&self, name: &str) -> EngineResult<bool> {
        self.record(format!("volume_exists {name}"));
        Ok(self.state.lock().unwrap().volumes.contains(name))
    }

    async fn create_volume(&self, name: &str) -> EngineResult<()> {
        self.record(format!("create_volume {name}"));
        self.state.lock().unwrap().volumes.insert(name.to_string());
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> EngineResult<()> {
        self.record(format!("remove_volume {name}"));
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }

    async fn pod_state(&self, name: &str) -> EngineResult<Option<PodState>> {
        self.record(format!("pod_state {name}"));
        Ok(self.state.lock().unwrap().pods.get(name).copied())
    }

    async fn create_pod(&self, request: &PodRequest) -> EngineResult<()> {
        self.record(format!("create_pod {}", request.name));
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(request.name.clone(), PodState::Created);
        Ok(())
    }

    async fn start_pod(&self, name: &str) -> EngineResult<()> {
        self.record(format!("start_pod {name}"));
        let mut state = self.state.lock().unwrap();
        state.pods.insert(name.to_string(), PodState::Running);
        Self::set_pod_containers(&mut state, name, ContainerState::Running);
        Ok(())
    }

    async fn stop_pod(&self, name: &str, _timeout: Duration) -> EngineResult<()> {
        self.record(format!("stop_pod {name}"));
        let mut state = self.state.lock().unwrap();
        if state.pods.contains_key(name) {
            state.pods.insert(name.to_string(), PodState::Exited);
            Self::set_pod_containers(&mut state, name, ContainerState::Exited);
        }
        Ok(())
    }

    async fn remove_pod(&self, name: &str) -> EngineResult<()> {
        self.record(format!("remove_pod {name}"));
        let mut state = self.state.lock().unwrap();
        state.pods.remove(name);
        let orphaned: Vec<String> = state
            .container_pods
            .iter()
            .filter(|(_, p)| p.as_str() == name)
            .map(|(c, _)| c.clone())
            .collect();
        for container in orphaned {
            state.containers.remove(&container);
            state.container_pods.remove(&container);
        }
        Ok(())
    }

    async fn inspect_container(&self, name: &str) -> EngineResult<Option<ContainerInfo>> {
        self.record(format!("inspect_container {name}"));
        Ok(self.state.lock().unwrap().containers.get(name).cloned())
    }

    async fn create_container(&self, request: &ContainerRequest) -> EngineResult<()> {
        self.record(format!("create_container {}", request.name));
        let mut state = self.state.lock().unwrap();
        if state.failing_containers.contains(&request.name) {
            return Err(EngineError::command_failed("podman run", Some(125), "boom"));
        }
        if !state.pods.contains_key(&request.pod) {
            return Err(EngineError::command_failed("podman run", Some(125), "no such pod"));
        }
        state.pods.insert(request.pod.clone(), PodState::Running);
        state
            .container_pods
            .insert(request.name.clone(), request.pod.clone());
        state.containers.insert(
            request.name.clone(),
            ContainerInfo {
                name: request.name.clone(),
                state: ContainerState::Running,
                image: request.image.clone(),
                spec_hash: request.spec_hash().map(String::from),
                started_at: Some(Utc::now()),
            },
        );
        state.last_requests.insert(request.name.clone(), request.clone());
        Ok(())
    }

    async fn start_container(&self, name: &str) -> EngineResult<()> {
        self.record(format!("start_container {name}"));
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state.container_pods.get(name).cloned() {
            state.pods.insert(pod, PodState::Running);
        }
        if let Some(container) = state.containers.get_mut(name) {
            container.state = ContainerState::Running;
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> EngineResult<()> {
        self.record(format!("remove_container {name}"));
        let mut state = self.state.lock().unwrap();
        state.containers.remove(name);
        state.container_pods.remove(name);
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        self.record(format!("image_exists {image}"));
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        self.record(format!("pull_image {image}"));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.pull_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        if state.failing_pulls.contains(image) {
            return Err(EngineError::command_failed(
                format!("podman pull {image}"),
                Some(125),
                "manifest unknown",
            ));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn remove_image(&self, image: &str) -> EngineResult<()> {
        self.record(format!("remove_image {image}"));
        self.state.lock().unwrap().images.remove(image);
        Ok(())
    }

    async fn tail_logs(&self, container: &str, lines: u32) -> EngineResult<String> {
        self.record(format!("tail_logs {container}"));
        Ok(format!("{lines} lines of {container}\n"))
    }
}

//! Rootless Podman backend.
//!
//! Every call is one `podman` subprocess with captured output. Existence
//! checks use the `exists` subcommands, whose exit status 1 means "absent"
//! rather than failure.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::EngineError;

use super::gateway::{
    ContainerInfo, ContainerRequest, ContainerState, EngineGateway, EngineResult, NetworkRequest,
    PodRequest, PodState, SPEC_HASH_LABEL,
};

const PROGRAM: &str = "podman";

/// Exit status of `podman <kind> exists` for a missing resource.
const EXISTS_MISSING: i32 = 1;

/// Podman implementation of [`EngineGateway`].
#[derive(Debug, Clone)]
pub struct PodmanGateway {
    program: String,
    timeout: Duration,
}

impl PodmanGateway {
    /// Creates a gateway whose non-pull commands time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: String::from(PROGRAM),
            timeout,
        }
    }

    fn render(&self, args: &[String]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    async fn output(&self, args: &[String], limit: Option<Duration>) -> EngineResult<Output> {
        debug!("Running: {}", self.render(args));

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let pending = command.output();
        let result = match limit {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| EngineError::Timeout {
                    command: self.render(args),
                    secs: limit.as_secs(),
                })?,
            None => pending.await,
        };

        result.map_err(|e| EngineError::Spawn {
            program: self.program.clone(),
            message: e.to_string(),
        })
    }

    async fn run_with(&self, args: &[String], limit: Option<Duration>) -> EngineResult<String> {
        let output = self.output(args, limit).await?;
        if !output.status.success() {
            return Err(EngineError::command_failed(
                self.render(args),
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run(&self, args: &[String]) -> EngineResult<String> {
        self.run_with(args, Some(self.timeout)).await
    }

    async fn exists(&self, args: &[String]) -> EngineResult<bool> {
        let output = self.output(args, Some(self.timeout)).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(EXISTS_MISSING) => Ok(false),
            code => Err(EngineError::command_failed(
                self.render(args),
                code,
                &String::from_utf8_lossy(&output.stderr),
            )),
        }
    }
}

fn argv<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|part| (*part).to_string()).collect()
}

/// Builds `podman network create` arguments.
#[must_use]
pub fn network_create_args(request: &NetworkRequest) -> Vec<String> {
    let options = &request.options;
    let mut args = argv(["network", "create", "--driver", &options.driver]);
    if let Some(subnet) = &options.subnet {
        args.extend(argv(["--subnet", subnet]));
    }
    if let Some(gateway) = &options.gateway {
        args.extend(argv(["--gateway", gateway]));
    }
    for dns in &options.dns_servers {
        args.extend(argv(["--dns", dns]));
    }
    if options.ipv6 {
        args.push(String::from("--ipv6"));
    }
    if options.internal {
        args.push(String::from("--internal"));
    }
    args.push(request.name.clone());
    args
}

/// Builds `podman pod create` arguments.
#[must_use]
pub fn pod_create_args(request: &PodRequest) -> Vec<String> {
    let mut args = argv(["pod", "create", "--name", &request.name, "--network", &request.network]);
    for port in &request.ports {
        args.push(String::from("-p"));
        args.push(port.to_string());
    }
    args
}

/// Builds `podman run` arguments for a detached, replaceable container.
#[must_use]
pub fn run_args(request: &ContainerRequest) -> Vec<String> {
    let mut args = argv([
        "run",
        "--detach",
        "--replace",
        "--name",
        &request.name,
        "--pod",
        &request.pod,
        "--restart",
        &request.restart_policy,
    ]);
    for (key, value) in &request.labels {
        args.push(String::from("--label"));
        args.push(format!("{key}={value}"));
    }
    for alias in &request.network_aliases {
        args.extend(argv(["--network-alias", alias]));
    }
    for (key, value) in &request.env {
        args.push(String::from("-e"));
        args.push(format!("{key}={value}"));
    }
    for mount in &request.mounts {
        let suffix = if mount.read_only { ":ro" } else { "" };
        args.push(String::from("-v"));
        args.push(format!("{}:{}{suffix}", mount.source, mount.target));
    }
    if let Some(memory) = &request.resources.memory {
        args.extend(argv(["--memory", memory]));
    }
    if let Some(cpus) = request.resources.cpus {
        args.push(String::from("--cpus"));
        args.push(cpus.to_string());
    }
    args.extend(request.gpu_args.iter().cloned());
    args.push(request.image.clone());
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectContainer {
    name: String,
    #[serde(default)]
    image_name: Option<String>,
    #[serde(default)]
    image: Option<String>,
    state: InspectState,
    #[serde(default)]
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    started_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

/// Parses `podman container inspect --format json` output.
///
/// # Errors
///
/// Returns [`EngineError::InvalidResponse`] if the output is not the
/// expected JSON array.
pub fn parse_container_inspect(command: &str, json: &str) -> EngineResult<Option<ContainerInfo>> {
    let containers: Vec<InspectContainer> =
        serde_json::from_str(json).map_err(|e| EngineError::InvalidResponse {
            command: command.to_string(),
            message: e.to_string(),
        })?;

    Ok(containers.into_iter().next().map(|container| {
        let started_at = container
            .state
            .started_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            // Never-started containers report the zero time.
            .filter(|ts| ts.year() > 1);

        ContainerInfo {
            name: container.name,
            state: ContainerState::parse(&container.state.status),
            image: container.image_name.or(container.image).unwrap_or_default(),
            spec_hash: container
                .config
                .labels
                .and_then(|mut labels| labels.remove(SPEC_HASH_LABEL)),
            started_at,
        }
    }))
}

#[async_trait]
impl EngineGateway for PodmanGateway {
    fn name(&self) -> &str {
        &self.program
    }

    async fn check_available(&self) -> EngineResult<String> {
        let version = self
            .run(&argv(["version", "--format", "{{.Client.Version}}"]))
            .await?;
        Ok(version.trim().to_string())
    }

    async fn network_exists(&self, name: &str) -> EngineResult<bool> {
        self.exists(&argv(["network", "exists", name])).await
    }

    async fn create_network(&self, request: &NetworkRequest) -> EngineResult<()> {
        self.run(&network_create_args(request)).await.map(drop)
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["network", "rm", name])).await.map(drop)
    }

    async fn list_volumes(&self) -> EngineResult<Vec<String>> {
        let output = self
            .run(&argv(["volume", "ls", "--format", "{{.Name}}"]))
            .await?;
        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    async fn volume_exists(&self, name: &str) -> EngineResult<bool> {
        self.exists(&argv(["volume", "exists", name])).await
    }

    async fn create_volume(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["volume", "create", name])).await.map(drop)
    }

    async fn remove_volume(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["volume", "rm", "--force", name])).await.map(drop)
    }

    async fn pod_state(&self, name: &str) -> EngineResult<Option<PodState>> {
        if !self.exists(&argv(["pod", "exists", name])).await? {
            return Ok(None);
        }
        let state = self
            .run(&argv(["pod", "inspect", "--format", "{{.State}}", name]))
            .await?;
        Ok(Some(PodState::parse(&state)))
    }

    async fn create_pod(&self, request: &PodRequest) -> EngineResult<()> {
        self.run(&pod_create_args(request)).await.map(drop)
    }

    async fn start_pod(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["pod", "start", name])).await.map(drop)
    }

    async fn stop_pod(&self, name: &str, timeout: Duration) -> EngineResult<()> {
        let grace = format!("--time={}", timeout.as_secs());
        // The engine may take the whole grace period before killing.
        let limit = self.timeout + timeout;
        self.run_with(&argv(["pod", "stop", "--ignore", &grace, name]), Some(limit))
            .await
            .map(drop)
    }

    async fn remove_pod(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["pod", "rm", "--force", "--ignore", name]))
            .await
            .map(drop)
    }

    async fn inspect_container(&self, name: &str) -> EngineResult<Option<ContainerInfo>> {
        if !self.exists(&argv(["container", "exists", name])).await? {
            return Ok(None);
        }
        let args = argv(["container", "inspect", "--format", "json", name]);
        let output = self.run(&args).await?;
        parse_container_inspect(&self.render(&args), &output)
    }

    async fn create_container(&self, request: &ContainerRequest) -> EngineResult<()> {
        self.run(&run_args(request)).await.map(drop)
    }

    async fn start_container(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["start", name])).await.map(drop)
    }

    async fn remove_container(&self, name: &str) -> EngineResult<()> {
        self.run(&argv(["rm", "--force", "--ignore", name])).await.map(drop)
    }

    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        self.exists(&argv(["image", "exists", image])).await
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        // Pulls are bounded by cancellation, not by the command timeout.
        self.run_with(&argv(["pull", "--quiet", image]), None)
            .await
            .map(drop)
    }

    async fn remove_image(&self, image: &str) -> EngineResult<()> {
        self.run(&argv(["image", "rm", "--force", image])).await.map(drop)
    }

    async fn tail_logs(&self, container: &str, lines: u32) -> EngineResult<String> {
        let args = argv(["logs", "--tail", &lines.to_string(), container]);
        let output = self.output(&args, Some(self.timeout)).await?;
        if !output.status.success() {
            return Err(EngineError::command_failed(
                self.render(&args),
                output.status.code(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        // Container stderr is forwarded on podman's stderr.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::engine::gateway::MountArg;
    use crate::planner::{PortMapping, Resources};

    fn container_request() -> ContainerRequest {
        ContainerRequest {
            name: String::from("open-webui-0"),
            pod: String::from("open-webui"),
            image: String::from("ghcr.io/open-webui/open-webui:latest"),
            env: BTreeMap::from([(String::from("WEBUI_SECRET_KEY"), String::from("s3cret"))]),
            mounts: vec![MountArg {
                source: String::from("/home/u/.config/airpods/volumes/data"),
                target: String::from("/app/backend/data"),
                read_only: true,
            }],
            network_aliases: vec![String::from("open-webui"), String::from("webui")],
            labels: BTreeMap::from([(String::from(SPEC_HASH_LABEL), String::from("abc"))]),
            restart_policy: String::from("unless-stopped"),
            gpu_args: vec![String::from("--device"), String::from("nvidia.com/gpu=all")],
            resources: Resources {
                memory: Some(String::from("8g")),
                cpus: None,
            },
        }
    }

    #[test]
    fn test_run_args() {
        let args = run_args(&container_request());
        let joined = args.join(" ");

        assert!(joined.starts_with("run --detach --replace --name open-webui-0 --pod open-webui"));
        assert!(joined.contains("--label airpods.spec-hash=abc"));
        assert!(joined.contains("--network-alias webui"));
        assert!(joined.contains("-e WEBUI_SECRET_KEY=s3cret"));
        assert!(joined.contains("-v /home/u/.config/airpods/volumes/data:/app/backend/data:ro"));
        assert!(joined.contains("--memory 8g"));
        assert!(joined.contains("--device nvidia.com/gpu=all"));
        assert_eq!(args.last().unwrap(), "ghcr.io/open-webui/open-webui:latest");
    }

    #[test]
    fn test_pod_and_network_args() {
        let pod = PodRequest {
            name: String::from("ollama"),
            network: String::from("airpods_network"),
            ports: vec![PortMapping { host: 11434, container: 11434 }],
        };
        assert_eq!(
            pod_create_args(&pod).join(" "),
            "pod create --name ollama --network airpods_network -p 11434:11434"
        );

        let network = NetworkRequest {
            name: String::from("airpods_network"),
            options: NetworkConfig {
                subnet: Some(String::from("10.89.0.0/24")),
                dns_servers: vec![String::from("1.1.1.1")],
                internal: true,
                ..NetworkConfig::default()
            },
        };
        assert_eq!(
            network_create_args(&network).join(" "),
            "network create --driver bridge --subnet 10.89.0.0/24 --dns 1.1.1.1 --internal airpods_network"
        );
    }

    #[test]
    fn test_parse_inspect() {
        let json = r#"[{
            "Name": "ollama-0",
            "ImageName": "docker.io/ollama/ollama:latest",
            "State": {"Status": "running", "StartedAt": "2026-01-02T03:04:05.123456789Z"},
            "Config": {"Labels": {"airpods.spec-hash": "deadbeef"}}
        }]"#;
        let info = parse_container_inspect("inspect", json).unwrap().unwrap();
        assert_eq!(info.state, ContainerState::Running);
        assert_eq!(info.spec_hash.as_deref(), Some("deadbeef"));
        assert_eq!(info.image, "docker.io/ollama/ollama:latest");
        assert!(info.started_at.is_some());
    }

    #[test]
    fn test_parse_inspect_never_started() {
        let json = r#"[{
            "Name": "ollama-0",
            "Image": "sha256:1",
            "State": {"Status": "created", "StartedAt": "0001-01-01T00:00:00Z"},
            "Config": {"Labels": null}
        }]"#;
        let info = parse_container_inspect("inspect", json).unwrap().unwrap();
        assert_eq!(info.state, ContainerState::Created);
        assert!(info.started_at.is_none());
        assert!(info.spec_hash.is_none());
    }

    #[test]
    fn test_parse_inspect_garbage() {
        assert!(matches!(
            parse_container_inspect("inspect", "not json"),
            Err(EngineError::InvalidResponse { .. })
        ));
        assert!(parse_container_inspect("inspect", "[]").unwrap().is_none());
    }
}

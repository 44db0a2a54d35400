//! The `start` operation.
//!
//! Phases run in order: dependency check, provisioning, pulling, launching,
//! health gating. Only the first two can abort the run; afterwards every
//! failure is isolated to the service it belongs to and nothing is rolled
//! back.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{
    ensure_bind_dir, ensure_generated_file, ContainerInfo, ContainerRequest, EngineGateway, EngineResult, HealthOutcome,
    MountArg, NetworkRequest, ObservedState, PodRequest, PullOutcome, PullPolicy, PullResult,
    PullScheduler, SPEC_HASH_LABEL,
};
use crate::error::{Result, ServiceFailure};
use crate::planner::{ServicePlan, ServiceSpec, GATEWAY_SERVICE};
use crate::state::SecretStore;

use super::diff::{plan_launch, LaunchAction};
use super::report::{
    LaunchOutcome, ProvisionRecord, ResourceKind, RunPhase, ServiceRun, StartReport,
};
use super::Orchestrator;

/// Environment variable carrying the shared secret.
const SECRET_ENV: &str = "WEBUI_SECRET_KEY";

/// Label naming the owning service.
const SERVICE_LABEL: &str = "airpods.service";

/// Options for `start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartOptions {
    /// Replace outdated containers without asking.
    pub force: bool,
    /// Pull every image even if present.
    pub always_pull: bool,
    /// Pull one image at a time.
    pub sequential: bool,
}

/// Result of health gating one service.
enum Gate {
    Probed(HealthOutcome),
    Running(std::result::Result<(), ServiceFailure>),
}

impl Orchestrator {
    /// Brings the requested services up.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown services, missing dependencies, or
    /// engine failures while observing or provisioning shared resources.
    /// Per-service failures are reported in the [`StartReport`].
    pub async fn start(
        &self,
        plan: &ServicePlan,
        names: &[String],
        options: StartOptions,
    ) -> Result<StartReport> {
        let specs = plan.select(names)?;
        info!(phase = %RunPhase::Planning, services = specs.len(), "Starting services");

        self.check_dependencies(plan).await?;
        let observed = self.observe(plan, &specs).await?;

        info!(phase = %RunPhase::Provisioning, "Provisioning shared resources");
        let provisioned = self.provision(plan, &specs, &observed).await?;
        let secret = if specs.iter().any(|s| s.needs_shared_secret) {
            Some(plan.secret_store().load_or_create()?)
        } else {
            None
        };

        info!(phase = %RunPhase::Pulling, "Pulling images");
        let cli = &plan.config.config.cli;
        let mut scheduler = PullScheduler::new(cli.max_concurrent_pulls);
        if options.sequential {
            scheduler = scheduler.sequential();
        }
        let policy = if options.always_pull {
            PullPolicy::Always
        } else {
            PullPolicy::IfMissing
        };
        let pulls = scheduler
            .run(
                Arc::clone(&self.gateway),
                PullScheduler::jobs_for(&specs),
                policy,
                &observed.images,
                &self.cancel,
            )
            .await;

        info!(phase = %RunPhase::Launching, "Launching containers");
        let mut runs = Vec::with_capacity(specs.len());
        for spec in &specs {
            let mut run = ServiceRun::new(&spec.name);
            run.url = spec.probe_url();

            if let Some(failure) = pull_failure(&pulls, spec) {
                warn!("Not launching {}: {failure}", spec.name);
                run.failure = Some(failure);
                runs.push(run);
                continue;
            }
            if self.cancel.is_cancelled() {
                run.failure = Some(ServiceFailure::Launch {
                    reason: String::from("cancelled before launch"),
                });
                runs.push(run);
                continue;
            }

            let container = observed.container(spec);
            let action = plan_launch(spec, container);
            info!("{}: {action}", spec.name);
            run.action = Some(action.clone());

            match self
                .launch(plan, spec, &action, container, &observed, secret.as_deref(), options.force)
                .await
            {
                Ok(outcome) => run.launch = Some(outcome),
                Err(e) => {
                    warn!("Launching {} failed: {e}", spec.name);
                    run.failure = Some(ServiceFailure::Launch {
                        reason: e.to_string(),
                    });
                }
            }
            runs.push(run);
        }

        info!(phase = %RunPhase::HealthGating, timeout_secs = cli.startup_timeout, "Waiting for services");
        let deadline = Instant::now() + Duration::from_secs(cli.startup_timeout);
        let interval = cli.startup_check_interval();
        self.gate(&specs, &mut runs, deadline, interval).await;

        let phase = if runs.iter().all(ServiceRun::succeeded) {
            RunPhase::Settled
        } else {
            RunPhase::PartiallyFailed
        };
        info!(phase = %phase, "Start finished");

        Ok(StartReport {
            phase,
            decisions: specs
                .iter()
                .filter_map(|spec| plan.decision(&spec.name).cloned())
                .collect(),
            provisioned,
            pulls,
            services: runs,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    async fn provision(
        &self,
        plan: &ServicePlan,
        specs: &[&ServiceSpec],
        observed: &ObservedState,
    ) -> Result<Vec<ProvisionRecord>> {
        let runtime = &plan.config.config.runtime;
        let mut records = Vec::new();

        let created = !observed.network_exists;
        if created {
            self.gateway
                .create_network(&NetworkRequest {
                    name: runtime.network_name.clone(),
                    options: runtime.network.clone(),
                })
                .await?;
            info!("Created network {}", runtime.network_name);
        }
        records.push(ProvisionRecord {
            kind: ResourceKind::Network,
            name: runtime.network_name.clone(),
            created,
        });

        let volumes: BTreeSet<&str> = specs.iter().flat_map(|s| s.engine_volumes()).collect();
        for volume in volumes {
            let created = !observed.volumes.contains(volume);
            if created {
                self.gateway.create_volume(volume).await?;
                info!("Created volume {volume}");
            }
            records.push(ProvisionRecord {
                kind: ResourceKind::Volume,
                name: volume.to_string(),
                created,
            });
        }

        let bind_dirs: BTreeSet<_> = specs.iter().flat_map(|s| s.bind_dirs()).collect();
        for dir in bind_dirs {
            let created = ensure_bind_dir(dir)?;
            records.push(ProvisionRecord {
                kind: ResourceKind::BindDir,
                name: dir.display().to_string(),
                created,
            });
        }

        if let Some(file) = plan
            .gateway_file
            .as_ref()
            .filter(|_| specs.iter().any(|s| s.name == GATEWAY_SERVICE))
        {
            let created = ensure_generated_file(&file.path, &file.contents)?;
            if created {
                info!("Wrote {}", file.path.display());
            }
            records.push(ProvisionRecord {
                kind: ResourceKind::GeneratedFile,
                name: file.path.display().to_string(),
                created,
            });
        }

        Ok(records)
    }

    #[allow(clippy::too_many_arguments)]
    async fn launch(
        &self,
        plan: &ServicePlan,
        spec: &ServiceSpec,
        action: &LaunchAction,
        container: Option<&ContainerInfo>,
        observed: &ObservedState,
        secret: Option<&str>,
        force: bool,
    ) -> EngineResult<LaunchOutcome> {
        match action {
            LaunchAction::Create => {
                if observed.pod(spec).is_none() {
                    self.gateway.create_pod(&pod_request(plan, spec)).await?;
                }
                self.gateway
                    .create_container(&container_request(plan, spec, secret))
                    .await?;
                Ok(LaunchOutcome::Created)
            }
            LaunchAction::Reuse => Ok(LaunchOutcome::Reused),
            LaunchAction::Start => {
                self.gateway.start_pod(&spec.pod).await?;
                Ok(LaunchOutcome::Started)
            }
            LaunchAction::Replace { .. } => {
                let prompt = format!(
                    "{} was created from a different configuration. Replace it?",
                    spec.container
                );
                if !force && !self.confirmer.confirm(&prompt) {
                    info!("Keeping outdated container {}", spec.container);
                    if !container.is_some_and(|c| c.state.is_running()) {
                        self.gateway.start_pod(&spec.pod).await?;
                    }
                    return Ok(LaunchOutcome::KeptOutdated);
                }

                self.gateway.remove_container(&spec.container).await?;
                self.gateway.remove_pod(&spec.pod).await?;
                self.gateway.create_pod(&pod_request(plan, spec)).await?;
                self.gateway
                    .create_container(&container_request(plan, spec, secret))
                    .await?;
                Ok(LaunchOutcome::Replaced)
            }
        }
    }

    /// Waits for every launched service under one shared deadline.
    async fn gate(
        &self,
        specs: &[&ServiceSpec],
        runs: &mut [ServiceRun],
        deadline: Instant,
        interval: Duration,
    ) {
        let mut tasks = JoinSet::new();
        let mut waiting = BTreeSet::new();

        for (index, spec) in specs.iter().enumerate() {
            if runs[index].failure.is_some() {
                continue;
            }
            waiting.insert(index);

            let gateway = Arc::clone(&self.gateway);
            let prober = self.prober.clone();
            let cancel = self.cancel.clone();
            let contract = spec.health.clone();
            let url = spec.probe_url();
            let container = spec.container.clone();

            tasks.spawn(async move {
                let gate = match (contract, url) {
                    (Some(contract), Some(url)) => Gate::Probed(
                        prober
                            .wait_until_healthy(&url, &contract, deadline, &cancel)
                            .await,
                    ),
                    _ => Gate::Running(
                        wait_until_running(gateway.as_ref(), &container, deadline, interval, &cancel)
                            .await,
                    ),
                };
                (index, gate)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, gate) = match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!("Health task ended abnormally: {e}");
                    continue;
                }
            };
            waiting.remove(&index);
            let run = &mut runs[index];
            match gate {
                Gate::Probed(outcome) => {
                    if outcome.is_healthy() {
                        info!("{} is healthy after {} attempt(s)", run.name, outcome.attempts);
                    } else {
                        warn!("{} did not become healthy", run.name);
                        run.failure = Some(ServiceFailure::HealthTimeout {
                            attempts: outcome.attempts,
                            last: outcome.last_observation(),
                            cancelled: outcome.cancelled,
                        });
                    }
                    run.health = Some(outcome);
                }
                Gate::Running(Ok(())) => info!("{} is running", run.name),
                Gate::Running(Err(failure)) => {
                    warn!("{}: {failure}", run.name);
                    run.failure = Some(failure);
                }
            }
        }

        for index in waiting {
            runs[index].failure = Some(ServiceFailure::HealthTimeout {
                attempts: 0,
                last: Some(String::from("health task did not report")),
                cancelled: self.cancel.is_cancelled(),
            });
        }
    }
}

async fn wait_until_running(
    gateway: &dyn EngineGateway,
    container: &str,
    deadline: Instant,
    interval: Duration,
    cancel: &CancellationToken,
) -> std::result::Result<(), ServiceFailure> {
    let mut last = String::from("missing");
    loop {
        match gateway.inspect_container(container).await {
            Ok(Some(info)) if info.state.is_running() => return Ok(()),
            Ok(Some(info)) => last = info.state.to_string(),
            Ok(None) => last = String::from("missing"),
            Err(e) => last = e.to_string(),
        }

        if cancel.is_cancelled() || Instant::now() >= deadline {
            return Err(ServiceFailure::NotRunning { state: last });
        }
        let next = (Instant::now() + interval).min(deadline);
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ServiceFailure::NotRunning { state: last }),
            () = tokio::time::sleep_until(next) => {}
        }
    }
}

fn pull_failure(pulls: &[PullResult], spec: &ServiceSpec) -> Option<ServiceFailure> {
    let result = pulls.iter().find(|r| r.job.image == spec.image)?;
    match &result.outcome {
        PullOutcome::Failed { reason } => Some(ServiceFailure::Pull {
            image: spec.image.clone(),
            reason: reason.clone(),
        }),
        PullOutcome::Cancelled => Some(ServiceFailure::PullCancelled {
            image: spec.image.clone(),
        }),
        PullOutcome::Pulled | PullOutcome::AlreadyPresent => None,
    }
}

fn pod_request(plan: &ServicePlan, spec: &ServiceSpec) -> PodRequest {
    PodRequest {
        name: spec.pod.clone(),
        network: plan.config.config.runtime.network_name.clone(),
        ports: spec.ports.clone(),
    }
}

fn container_request(plan: &ServicePlan, spec: &ServiceSpec, secret: Option<&str>) -> ContainerRequest {
    let mut env = spec.env.clone();
    if spec.needs_shared_secret {
        if let Some(secret) = secret {
            env.insert(SECRET_ENV.to_string(), secret.to_string());
        }
    }

    let gpu_args = if spec.use_gpu {
        plan.config
            .config
            .runtime
            .gpu_device_flag
            .split_whitespace()
            .map(String::from)
            .collect()
    } else {
        Vec::new()
    };

    ContainerRequest {
        name: spec.container.clone(),
        pod: spec.pod.clone(),
        image: spec.image.clone(),
        env,
        mounts: spec
            .mounts
            .iter()
            .map(|mount| MountArg {
                source: mount.source.as_arg(),
                target: mount.target.clone(),
                read_only: mount.read_only,
            })
            .collect(),
        network_aliases: spec.network_aliases.clone(),
        labels: BTreeMap::from([
            (SPEC_HASH_LABEL.to_string(), spec.spec_hash.clone()),
            (SERVICE_LABEL.to_string(), spec.name.clone()),
        ]),
        restart_policy: spec.restart_policy.as_str().to_string(),
        gpu_args,
        resources: spec.resources.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{orchestrator, plan, ScriptedConfirmer};
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::engine::ContainerState;
    use crate::error::EXIT_PARTIAL;
    use crate::planner::{HealthContract, PortMapping, StatusRange};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_fresh_start_creates_everything() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(FakeEngine::new());

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &[], StartOptions::default())
            .await
            .unwrap();

        assert_eq!(report.phase, RunPhase::Settled);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.succeeded().count(), 3);
        assert!(report
            .services
            .iter()
            .all(|s| s.launch == Some(LaunchOutcome::Created)));
        assert!(report.provisioned[0].created);
        assert!(report
            .provisioned
            .iter()
            .filter(|p| p.kind == ResourceKind::BindDir)
            .all(|p| std::path::Path::new(&p.name).is_dir()));

        let calls = engine.calls();
        assert!(calls.contains(&String::from("create_network airpods_network")));
        assert!(calls.contains(&String::from("create_pod ollama")));
    }

    #[tokio::test]
    async fn test_secret_is_injected_and_stable() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(FakeEngine::new());
        let orchestrator = orchestrator(&engine, ScriptedConfirmer::new(true));

        orchestrator
            .start(&plan, &names(&["open-webui"]), StartOptions::default())
            .await
            .unwrap();
        let request = engine.last_request("open-webui-0").unwrap();
        let secret = request.env.get(SECRET_ENV).unwrap().clone();
        assert_eq!(secret.len(), 64);
        assert_eq!(request.spec_hash(), Some(plan.spec("open-webui").unwrap().spec_hash.as_str()));

        let stored = std::fs::read_to_string(plan.paths.secret_path()).unwrap();
        assert_eq!(stored.trim(), secret);
    }

    #[tokio::test]
    async fn test_second_start_reuses() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(FakeEngine::new());
        let orchestrator = orchestrator(&engine, ScriptedConfirmer::new(true));

        orchestrator.start(&plan, &[], StartOptions::default()).await.unwrap();
        let before = engine.mutations().len();
        let report = orchestrator.start(&plan, &[], StartOptions::default()).await.unwrap();

        assert!(report
            .services
            .iter()
            .all(|s| s.launch == Some(LaunchOutcome::Reused)));
        assert!(report.provisioned.iter().all(|p| !p.created));
        assert_eq!(engine.mutations().len(), before, "second start must not mutate");
    }

    #[tokio::test]
    async fn test_stopped_container_is_started() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let ollama = plan.spec("ollama").unwrap();
        let engine = Arc::new(FakeEngine::new().with_container(
            &ollama.pod,
            &ollama.container,
            &ollama.image,
            &ollama.spec_hash,
            ContainerState::Exited,
        ));

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &names(&["ollama"]), StartOptions::default())
            .await
            .unwrap();

        assert_eq!(report.services[0].launch, Some(LaunchOutcome::Started));
        assert_eq!(engine.container_state("ollama-0"), Some(ContainerState::Running));
    }

    #[tokio::test]
    async fn test_declined_replacement_keeps_container() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let ollama = plan.spec("ollama").unwrap();
        let engine = Arc::new(FakeEngine::new().with_container(
            &ollama.pod,
            &ollama.container,
            &ollama.image,
            "stale",
            ContainerState::Running,
        ));
        let confirmer = ScriptedConfirmer::new(false);

        let report = orchestrator(&engine, confirmer.clone())
            .start(&plan, &names(&["ollama"]), StartOptions::default())
            .await
            .unwrap();

        assert_eq!(confirmer.asked(), 1);
        assert_eq!(report.services[0].launch, Some(LaunchOutcome::KeptOutdated));
        assert!(!engine.mutations().iter().any(|c| c.starts_with("remove_")));
    }

    #[tokio::test]
    async fn test_forced_replacement_skips_prompt() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let ollama = plan.spec("ollama").unwrap();
        let engine = Arc::new(FakeEngine::new().with_container(
            &ollama.pod,
            &ollama.container,
            &ollama.image,
            "stale",
            ContainerState::Running,
        ));
        let confirmer = ScriptedConfirmer::new(false);

        let options = StartOptions {
            force: true,
            ..StartOptions::default()
        };
        let report = orchestrator(&engine, confirmer.clone())
            .start(&plan, &names(&["ollama"]), options)
            .await
            .unwrap();

        assert_eq!(confirmer.asked(), 0);
        assert_eq!(report.services[0].launch, Some(LaunchOutcome::Replaced));
        let request = engine.last_request("ollama-0").unwrap();
        assert_eq!(request.spec_hash(), Some(ollama.spec_hash.as_str()));
    }

    #[tokio::test]
    async fn test_pull_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let comfy_image = plan.spec("comfyui").unwrap().image.clone();
        let engine = Arc::new(FakeEngine::new().fail_pull(&comfy_image));

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &[], StartOptions::default())
            .await
            .unwrap();

        assert_eq!(report.phase, RunPhase::PartiallyFailed);
        assert_eq!(report.exit_code(), EXIT_PARTIAL);
        let failed: Vec<_> = report.failed().map(|s| s.name.as_str()).collect();
        assert_eq!(failed, ["comfyui"]);
        assert!(matches!(
            report.services[0].failure,
            Some(ServiceFailure::Pull { .. })
        ));
        assert!(!engine.calls().contains(&String::from("create_container comfyui-0")));
        assert_eq!(report.succeeded().count(), 2);
    }

    #[tokio::test]
    async fn test_launch_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(FakeEngine::new().fail_container("ollama-0"));

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &[], StartOptions::default())
            .await
            .unwrap();

        let failed: Vec<_> = report.failed().map(|s| s.name.as_str()).collect();
        assert_eq!(failed, ["ollama"]);
        assert!(matches!(
            report.services[1].failure,
            Some(ServiceFailure::Launch { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_gating_uses_contract() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let port = server.address().port();

        let dir = TempDir::new().unwrap();
        let mut plan = plan(&dir, "").await;
        for spec in &mut plan.specs {
            if spec.name == "ollama" {
                spec.ports = vec![PortMapping { host: port, container: 11434 }];
                spec.health = Some(HealthContract {
                    path: String::from("/api/tags"),
                    accepted: StatusRange { start: 200, end: 299 },
                });
            }
        }
        let engine = Arc::new(FakeEngine::new());

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &names(&["ollama"]), StartOptions::default())
            .await
            .unwrap();

        let health = report.services[0].health.as_ref().unwrap();
        assert!(health.is_healthy());
        assert_eq!(report.phase, RunPhase::Settled);
    }

    #[tokio::test]
    async fn test_gpu_flags_only_for_gpu_services() {
        let dir = TempDir::new().unwrap();
        let mut plan = plan(&dir, "").await;
        for spec in &mut plan.specs {
            spec.use_gpu = spec.name == "comfyui";
        }
        let engine = Arc::new(FakeEngine::new());

        orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &[], StartOptions::default())
            .await
            .unwrap();

        assert_eq!(
            engine.last_request("comfyui-0").unwrap().gpu_args,
            ["--device", "nvidia.com/gpu=all"]
        );
        assert!(engine.last_request("ollama-0").unwrap().gpu_args.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_start_writes_and_mounts_caddyfile() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "[services.gateway]\nenabled = true\n").await;
        let engine = Arc::new(FakeEngine::new());

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &names(&["gateway", "open-webui"]), StartOptions::default())
            .await
            .unwrap();
        assert_eq!(report.phase, RunPhase::Settled);

        let caddyfile = plan.paths.caddyfile();
        let written = std::fs::read_to_string(&caddyfile).unwrap();
        assert!(written.contains("reverse_proxy open-webui:8080"));
        assert!(report
            .provisioned
            .iter()
            .any(|p| p.kind == ResourceKind::GeneratedFile && p.created));
        assert!(caddyfile.is_file());

        let gateway = engine.last_request("gateway-0").unwrap();
        let mount = gateway
            .mounts
            .iter()
            .find(|m| m.target == "/etc/caddy/Caddyfile")
            .unwrap();
        assert_eq!(mount.source, caddyfile.display().to_string());
        assert!(mount.read_only);

        let webui = report.services.iter().find(|s| s.name == "open-webui").unwrap();
        assert!(webui.url.is_none());
    }

    #[tokio::test]
    async fn test_caddyfile_only_written_when_gateway_selected() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "[services.gateway]\nenabled = true\n").await;
        let engine = Arc::new(FakeEngine::new());

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .start(&plan, &names(&["ollama"]), StartOptions::default())
            .await
            .unwrap();

        assert!(!plan.paths.caddyfile().exists());
        assert!(report.provisioned.iter().all(|p| p.kind != ResourceKind::GeneratedFile));
    }
}

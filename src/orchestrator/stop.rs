//! The `stop` operation.

use std::time::Duration;
use tracing::{info, warn};

use crate::engine::PodState;
use crate::error::Result;
use crate::planner::{ServicePlan, ServiceSpec};

use super::report::{StopAction, StopRecord, StopReport};
use super::Orchestrator;

/// Options for `stop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    /// Remove pods after stopping them.
    pub remove: bool,
    /// Skip the removal confirmation.
    pub force: bool,
    /// Grace period override, in seconds.
    pub timeout: Option<u64>,
}

impl Orchestrator {
    /// Stops the requested services, optionally removing their pods.
    ///
    /// Volumes and bind directories are never touched. When removal is
    /// requested and declined, nothing is stopped either.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown services, missing dependencies, or
    /// engine failures while observing state. Failures stopping individual
    /// pods are reported per service.
    pub async fn stop(&self, plan: &ServicePlan, names: &[String], options: StopOptions) -> Result<StopReport> {
        let specs = plan.select(names)?;
        self.check_dependencies(plan).await?;
        let observed = self.observe(plan, &specs).await?;

        let present: Vec<&ServiceSpec> = specs
            .iter()
            .copied()
            .filter(|spec| observed.pod(spec).is_some())
            .collect();

        if options.remove && !options.force && !present.is_empty() {
            let pods: Vec<&str> = present.iter().map(|s| s.pod.as_str()).collect();
            let prompt = format!("Remove pods {}? Volumes are kept.", pods.join(", "));
            if !self.confirmer.confirm(&prompt) {
                info!("Removal declined; nothing was stopped");
                return Ok(StopReport {
                    aborted: true,
                    services: Vec::new(),
                });
            }
        }

        let grace = Duration::from_secs(
            options
                .timeout
                .unwrap_or(plan.config.config.cli.stop_timeout),
        );

        let mut services = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut record = StopRecord {
                name: spec.name.clone(),
                pod: spec.pod.clone(),
                action: None,
                error: None,
            };

            match observed.pod(spec) {
                None => record.action = Some(StopAction::Missing),
                Some(state) => match self.stop_one(spec, state, grace, options.remove).await {
                    Ok(action) => {
                        info!("{}: {action}", spec.name);
                        record.action = Some(action);
                    }
                    Err(e) => {
                        warn!("Stopping {} failed: {e}", spec.name);
                        record.error = Some(e.to_string());
                    }
                },
            }
            services.push(record);
        }

        Ok(StopReport {
            aborted: false,
            services,
        })
    }

    async fn stop_one(
        &self,
        spec: &ServiceSpec,
        state: PodState,
        grace: Duration,
        remove: bool,
    ) -> Result<StopAction> {
        let was_running = state.is_running();
        if was_running {
            self.gateway.stop_pod(&spec.pod, grace).await?;
        }

        if remove {
            self.gateway.remove_pod(&spec.pod).await?;
            return Ok(StopAction::Removed);
        }

        Ok(if was_running {
            StopAction::Stopped
        } else {
            StopAction::AlreadyStopped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{orchestrator, plan, ScriptedConfirmer};
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::engine::ContainerState;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn seeded(plan: &ServicePlan, state: ContainerState) -> FakeEngine {
        plan.specs.iter().fold(FakeEngine::new(), |engine, spec| {
            engine.with_container(&spec.pod, &spec.container, &spec.image, &spec.spec_hash, state)
        })
    }

    #[tokio::test]
    async fn test_stop_running_pods() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(seeded(&plan, ContainerState::Running));

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .stop(&plan, &[], StopOptions::default())
            .await
            .unwrap();

        assert!(!report.aborted);
        assert!(report
            .services
            .iter()
            .all(|s| s.action == Some(StopAction::Stopped)));
        assert_eq!(engine.container_state("ollama-0"), Some(ContainerState::Exited));
        assert!(!engine.mutations().iter().any(|c| c.starts_with("remove_")));
    }

    #[tokio::test]
    async fn test_stop_reports_missing_and_stopped() {
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
            .stop(&plan, &[], StopOptions::default())
            .await
            .unwrap();

        let actions: Vec<_> = report.services.iter().map(|s| s.action).collect();
        assert_eq!(
            actions,
            [
                Some(StopAction::Missing),
                Some(StopAction::AlreadyStopped),
                Some(StopAction::Missing)
            ]
        );
        assert!(engine.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_declined_removal_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(seeded(&plan, ContainerState::Running));
        let confirmer = ScriptedConfirmer::new(false);

        let options = StopOptions {
            remove: true,
            ..StopOptions::default()
        };
        let report = orchestrator(&engine, confirmer.clone())
            .stop(&plan, &[], options)
            .await
            .unwrap();

        assert!(report.aborted);
        assert_eq!(confirmer.asked(), 1);
        assert!(engine.mutations().is_empty());
        assert_eq!(engine.container_state("comfyui-0"), Some(ContainerState::Running));
    }

    #[tokio::test]
    async fn test_forced_removal_keeps_volumes() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "").await;
        let engine = Arc::new(seeded(&plan, ContainerState::Running));
        let confirmer = ScriptedConfirmer::new(false);

        let options = StopOptions {
            remove: true,
            force: true,
            timeout: Some(3),
        };
        let report = orchestrator(&engine, confirmer.clone())
            .stop(&plan, &names(), options)
            .await
            .unwrap();

        assert_eq!(confirmer.asked(), 0);
        assert_eq!(report.services.len(), 1);
        assert_eq!(report.services[0].action, Some(StopAction::Removed));
        assert_eq!(engine.container_state("ollama-0"), None);
        assert_eq!(engine.container_state("comfyui-0"), Some(ContainerState::Running));
        assert!(!engine.mutations().iter().any(|c| c.contains("volume")));
    }

    fn names() -> Vec<String> {
        vec![String::from("ollama")]
    }
}

//! The `status` operation. Never mutates anything.

use chrono::Utc;
use std::time::Duration;
use tracing::debug;

use crate::engine::ObservedState;
use crate::error::Result;
use crate::planner::{ServicePlan, ServiceSpec, GATEWAY_SERVICE};

use super::report::{HealthSummary, ServiceStatus, StatusReport};
use super::Orchestrator;

impl Orchestrator {
    /// Reports the state of the requested services.
    ///
    /// Running services with a health contract get one short probe;
    /// services routed through a running gateway are probed through it.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown services, missing dependencies, or
    /// engine failures while observing state.
    pub async fn status(&self, plan: &ServicePlan, names: &[String]) -> Result<StatusReport> {
        let specs = plan.select(names)?;
        self.check_dependencies(plan).await?;

        let gateway = plan.spec(GATEWAY_SERVICE);
        let mut observed_specs = specs.clone();
        if let Some(gateway) = gateway {
            if !observed_specs.iter().any(|s| s.name == gateway.name) {
                observed_specs.push(gateway);
            }
        }
        let observed = self.observe(plan, &observed_specs).await?;

        let gateway_url = gateway
            .filter(|g| observed.container(g).is_some_and(|c| c.state.is_running()))
            .and_then(ServiceSpec::probe_url);

        let ping_timeout = plan.config.config.cli.ping_timeout();
        let mut services = Vec::with_capacity(specs.len());
        for spec in specs {
            let behind_gateway = plan
                .config
                .config
                .services
                .get(&spec.name)
                .is_some_and(|service| service.behind_gateway);
            let url = if behind_gateway && gateway_url.is_some() {
                gateway_url.clone()
            } else {
                spec.probe_url()
            };
            services.push(self.service_status(spec, &observed, url, ping_timeout).await);
        }

        Ok(StatusReport {
            network: plan.config.config.runtime.network_name.clone(),
            network_exists: observed.network_exists,
            services,
        })
    }

    async fn service_status(
        &self,
        spec: &ServiceSpec,
        observed: &ObservedState,
        url: Option<String>,
        ping_timeout: Duration,
    ) -> ServiceStatus {
        let container = observed.container(spec);
        let running = container.is_some_and(|c| c.state.is_running());

        let health = if !running {
            HealthSummary::Down
        } else {
            match (&spec.health, spec.probe_url().or_else(|| url.clone())) {
                (Some(contract), Some(base)) => {
                    let attempt = self.prober.probe_once(&base, contract, ping_timeout).await;
                    debug!("{} probe: {}", spec.name, attempt.describe());
                    if attempt.accepted {
                        HealthSummary::Healthy
                    } else {
                        HealthSummary::Unhealthy(attempt.describe())
                    }
                }
                _ => HealthSummary::Unchecked,
            }
        };

        let started_at = container.filter(|_| running).and_then(|c| c.started_at);
        ServiceStatus {
            name: spec.name.clone(),
            pod: spec.pod.clone(),
            pod_state: observed.pod(spec),
            container_state: container.map(|c| c.state),
            image: container.map_or_else(|| spec.image.clone(), |c| c.image.clone()),
            outdated: container.is_some_and(|c| c.spec_hash.as_deref() != Some(spec.spec_hash.as_str())),
            ports: spec.ports.clone(),
            volumes: spec.mounts.iter().map(|m| m.source.as_arg()).collect(),
            started_at,
            uptime_secs: started_at.map(|at| (Utc::now() - at).num_seconds().max(0)),
            health,
            url: if running { url } else { None },
            variant: spec.variant.clone(),
        }
    }
}

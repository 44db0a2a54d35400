//! Service lifecycle orchestration.
//!
//! The [`Orchestrator`] drives an immutable [`ServicePlan`] against an
//! [`EngineGateway`]. Every operation observes engine state fresh, and every
//! destructive step goes through the [`Confirmer`] unless forced.
//!
//! # Operations
//!
//! - `start`: provision, pull, launch and health-gate services
//! - `stop`: gracefully stop pods, optionally removing them
//! - `status`: report state without mutating anything
//! - `clean`: remove pods, volumes, images, the network or config files
//! - `logs`: tail a container's output

mod clean;
mod diff;
mod doctor;
mod report;
mod start;
mod status;
mod stop;

pub use clean::{CleanOptions, CleanTargets, BACKUP_SUFFIX};
pub use diff::{plan_launch, LaunchAction};
pub use doctor::{DoctorReport, ToolCheck};
pub use report::{
    CleanCategory, CleanRecord, CleanReport, CleanupPlan, HealthSummary, LaunchOutcome,
    ProvisionRecord, ResourceKind, RunPhase, ServiceRun, ServiceStatus, StartReport, StopAction,
    StopRecord, StopReport, StatusReport,
};
pub use start::StartOptions;
pub use stop::StopOptions;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{EngineGateway, HealthProber, ObservedState};
use crate::error::{DependencyError, Result};
use crate::planner::{ServicePlan, ServiceSpec};

/// Asks the operator before destructive steps.
pub trait Confirmer: Send + Sync {
    /// Returns `true` if the operator agrees.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Drives service plans against a container engine.
pub struct Orchestrator {
    gateway: Arc<dyn EngineGateway>,
    prober: HealthProber,
    confirmer: Arc<dyn Confirmer>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn EngineGateway>,
        prober: HealthProber,
        confirmer: Arc<dyn Confirmer>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            prober,
            confirmer,
            cancel,
        }
    }

    /// Verifies required tools and engine availability.
    ///
    /// Returns the engine version.
    ///
    /// # Errors
    ///
    /// Returns a [`DependencyError`] naming the missing tool or the engine.
    pub async fn check_dependencies(&self, plan: &ServicePlan) -> Result<String> {
        let dependencies = &plan.config.config.dependencies;
        if dependencies.skip_checks {
            debug!("Skipping tool checks");
        } else {
            for tool in &dependencies.required {
                which::which(tool).map_err(|_| DependencyError::missing_tool(tool.as_str()))?;
            }
        }

        let version = self.gateway.check_available().await.map_err(|e| {
            DependencyError::EngineUnavailable {
                engine: self.gateway.name().to_string(),
                message: e.to_string(),
            }
        })?;
        debug!("{} {version} is available", self.gateway.name());
        Ok(version)
    }

    /// Returns the last lines of a service's container output.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown services or engine failures.
    pub async fn logs(&self, plan: &ServicePlan, service: &str, lines: Option<u32>) -> Result<String> {
        let specs = plan.select(&[service.to_string()])?;
        let lines = lines.unwrap_or(plan.config.config.cli.log_lines);
        let mut output = String::new();
        for spec in specs {
            output.push_str(&self.gateway.tail_logs(&spec.container, lines).await?);
        }
        Ok(output)
    }

    async fn observe(&self, plan: &ServicePlan, specs: &[&ServiceSpec]) -> Result<ObservedState> {
        let network = &plan.config.config.runtime.network_name;
        Ok(ObservedState::fetch(self.gateway.as_ref(), network, specs).await?)
    }
}

//! The `doctor` diagnostic.

use serde::Serialize;
use std::path::PathBuf;

use crate::accelerator::AcceleratorDecision;
use crate::planner::ServicePlan;
use crate::state::SecretStore;

use super::Orchestrator;

/// Availability of one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCheck {
    /// Tool name.
    pub name: String,
    /// Whether `start` refuses to run without it.
    pub required: bool,
    /// Resolved location, if found.
    pub path: Option<PathBuf>,
}

impl ToolCheck {
    /// Returns whether the tool was found.
    #[must_use]
    pub const fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// Environment diagnosis.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    /// Loaded configuration file, `None` for built-in defaults.
    pub config_path: Option<PathBuf>,
    /// State root.
    pub state_root: PathBuf,
    /// Tool lookups.
    pub tools: Vec<ToolCheck>,
    /// Engine name.
    pub engine: String,
    /// Engine version, or why it is unusable.
    pub engine_status: Result<String, String>,
    /// Problem with the shared secret location, if any.
    pub secret_problem: Option<String>,
    /// Accelerator decisions.
    pub decisions: Vec<AcceleratorDecision>,
}

impl DoctorReport {
    /// Returns whether every required tool and the engine are usable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.tools.iter().all(|t| !t.required || t.found())
            && self.engine_status.is_ok()
            && self.secret_problem.is_none()
    }
}

impl Orchestrator {
    /// Diagnoses tools, engine and state without failing on problems.
    pub async fn doctor(&self, plan: &ServicePlan) -> DoctorReport {
        let dependencies = &plan.config.config.dependencies;
        let tools = dependencies
            .required
            .iter()
            .map(|name| (name, true))
            .chain(dependencies.optional.iter().map(|name| (name, false)))
            .map(|(name, required)| ToolCheck {
                name: name.clone(),
                required,
                path: which::which(name).ok(),
            })
            .collect();

        DoctorReport {
            config_path: plan.config.path.clone(),
            state_root: plan.paths.root().to_path_buf(),
            tools,
            engine: self.gateway.name().to_string(),
            engine_status: self.gateway.check_available().await.map_err(|e| e.to_string()),
            secret_problem: plan.secret_store().check_reachable().err(),
            decisions: plan.decisions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{orchestrator, plan, ScriptedConfirmer};
    use crate::engine::fake::FakeEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_doctor_reports_missing_optional_tool() {
        let dir = TempDir::new().unwrap();
        let plan = plan(
            &dir,
            "[dependencies]\nrequired = []\noptional = [\"airpods-test-no-such-tool\"]\n",
        )
        .await;
        let engine = Arc::new(FakeEngine::new());

        let report = orchestrator(&engine, ScriptedConfirmer::new(true))
            .doctor(&plan)
            .await;

        assert_eq!(report.tools.len(), 1);
        assert!(!report.tools[0].required);
        assert!(!report.tools[0].found());
        assert!(report.engine_status.is_ok());
        assert!(report.secret_problem.is_none());
        assert_eq!(report.decisions.len(), 3);
        assert!(report.is_healthy());
        assert!(engine.mutations().is_empty());
    }
}

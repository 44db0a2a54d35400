//! The immutable service plan for one invocation.
//!
//! Setup flows one way: load → expand templates → choose accelerator
//! variants → build specs. The result is a [`ServicePlan`] that every
//! orchestrator operation reads and none mutates.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::info;

use crate::accelerator::{AcceleratorDecision, AcceleratorSelector, CapabilityProbe};
use crate::config::{ConfigDocument, ConfigEnv, ConfigLoader, ResolvedConfig};
use crate::error::{ConfigError, Result};
use crate::state::{FileSecretStore, StatePaths};

use super::builder::ServiceSpecBuilder;
use super::gateway::{render_caddyfile, GeneratedFile};
use super::spec::ServiceSpec;

/// Everything an invocation knows before configuration is loaded.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Snapshot of the relevant environment.
    pub env: ConfigEnv,
    /// `--config` path, if given.
    pub config_path: Option<PathBuf>,
    /// `--cpu` was passed.
    pub force_cpu: bool,
}

impl InvocationContext {
    /// Returns a loader for this context.
    #[must_use]
    pub fn loader(&self) -> ConfigLoader {
        ConfigLoader::new(self.env.clone(), self.config_path.clone())
    }
}

/// The resolved configuration plus derived specs.
#[derive(Debug, Clone)]
pub struct ServicePlan {
    /// When the plan was built.
    pub created_at: DateTime<Utc>,
    /// Resolved configuration.
    pub config: ResolvedConfig,
    /// Durable state layout.
    pub paths: StatePaths,
    /// Accelerator decisions, one per enabled service.
    pub decisions: Vec<AcceleratorDecision>,
    /// Service specs ordered by name.
    pub specs: Vec<ServiceSpec>,
    /// Gateway configuration to write before the gateway starts.
    pub gateway_file: Option<GeneratedFile>,
}

impl ServicePlan {
    /// Loads the configuration and builds the plan.
    ///
    /// # Errors
    ///
    /// Returns configuration, template or validation errors. Accelerator
    /// detection problems are never errors.
    pub async fn build(ctx: &InvocationContext, probe: &dyn CapabilityProbe) -> Result<Self> {
        let document = ctx.loader().load()?;
        Self::from_document(&document, ctx, probe).await
    }

    /// Builds the plan from an already loaded document.
    ///
    /// # Errors
    ///
    /// See [`ServicePlan::build`].
    pub async fn from_document(
        document: &ConfigDocument,
        ctx: &InvocationContext,
        probe: &dyn CapabilityProbe,
    ) -> Result<Self> {
        let config = ResolvedConfig::from_document(document)?;
        let paths = StatePaths::discover(&ctx.env, config.path.as_deref())?;

        let selector = AcceleratorSelector::new(
            probe,
            &config.config.runtime.cuda_version,
            ctx.force_cpu,
        );
        let decisions = selector.decide_all(&config.config.services).await;

        let gateway_file = render_caddyfile(&config, &paths)?;
        let secrets = FileSecretStore::new(paths.secret_path());
        let specs = ServiceSpecBuilder::new(&config, &paths, &secrets)
            .with_gateway_file(gateway_file.as_ref())
            .build(&decisions)?;

        info!(
            services = specs.len(),
            root = %paths.root().display(),
            "Service plan ready"
        );

        Ok(Self {
            created_at: Utc::now(),
            config,
            paths,
            decisions,
            specs,
            gateway_file,
        })
    }

    /// Returns the shared secret store of this plan.
    #[must_use]
    pub fn secret_store(&self) -> FileSecretStore {
        FileSecretStore::new(self.paths.secret_path())
    }

    /// Returns a spec by service name or alias.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&ServiceSpec> {
        self.specs
            .iter()
            .find(|s| s.name == name)
            .or_else(|| self.specs.iter().find(|s| s.answers_to(name)))
    }

    /// Resolves requested names to specs; an empty request selects all.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownService`] listing the available
    /// services if a name matches nothing.
    pub fn select(&self, names: &[String]) -> Result<Vec<&ServiceSpec>> {
        if names.is_empty() {
            return Ok(self.specs.iter().collect());
        }

        let mut selected: Vec<&ServiceSpec> = Vec::new();
        for name in names {
            let spec = self.spec(name).ok_or_else(|| ConfigError::UnknownService {
                name: name.clone(),
                available: self.available(),
            })?;
            if !selected.iter().any(|s| s.name == spec.name) {
                selected.push(spec);
            }
        }
        Ok(selected)
    }

    /// Returns the accelerator decision for a service.
    #[must_use]
    pub fn decision(&self, service: &str) -> Option<&AcceleratorDecision> {
        self.decisions.iter().find(|d| d.service == service)
    }

    fn available(&self) -> String {
        self.specs
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accelerator::{ComputeCapability, GpuInfo, MockCapabilityProbe};
    use crate::config::SourceKind;
    use crate::error::AirpodsError;
    use crate::planner::PortMapping;
    use tempfile::TempDir;

    fn probe() -> MockCapabilityProbe {
        let mut probe = MockCapabilityProbe::new();
        probe.expect_detect().returning(|| {
            Ok(GpuInfo {
                name: String::from("NVIDIA GeForce RTX 4090"),
                capability: ComputeCapability::new(8, 9),
            })
        });
        probe
    }

    async fn plan(dir: &TempDir, overlay: &str, force_cpu: bool) -> Result<ServicePlan> {
        let ctx = InvocationContext {
            env: ConfigEnv {
                home_override: Some(dir.path().to_path_buf()),
                ..ConfigEnv::default()
            },
            config_path: None,
            force_cpu,
        };
        let user = ConfigDocument {
            kind: SourceKind::HomeOverride,
            path: Some(dir.path().join("configs").join("config.toml")),
            table: overlay.parse().unwrap(),
        };
        let document = ConfigDocument::merge(&[user, ConfigDocument::defaults().unwrap()]);
        ServicePlan::from_document(&document, &ctx, &probe()).await
    }

    #[tokio::test]
    async fn test_plan_from_defaults() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "", false).await.unwrap();

        assert_eq!(plan.specs.len(), 3);
        assert_eq!(plan.paths.root(), dir.path());
        let comfy = plan.spec("comfyui").unwrap();
        assert_eq!(comfy.variant, "cu128");
        assert!(comfy.use_gpu);
        assert_eq!(plan.decision("open-webui").unwrap().variant, "cpu");
    }

    #[tokio::test]
    async fn test_force_cpu_applies_to_all() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "", true).await.unwrap();
        assert!(plan.specs.iter().all(|s| !s.use_gpu));
        assert_eq!(plan.spec("comfyui").unwrap().variant, "cpu");
    }

    #[tokio::test]
    async fn test_select_by_name_and_alias() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "", false).await.unwrap();

        assert_eq!(plan.select(&[]).unwrap().len(), 3);
        let selected = plan
            .select(&[String::from("webui"), String::from("open-webui")])
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "open-webui");
    }

    #[tokio::test]
    async fn test_select_unknown_lists_available() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "", false).await.unwrap();

        let err = plan.select(&[String::from("gateway")]).unwrap_err();
        match err {
            AirpodsError::Config(ConfigError::UnknownService { name, available }) => {
                assert_eq!(name, "gateway");
                assert_eq!(available, "comfyui, ollama, open-webui");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_enabled_gateway_carries_caddyfile() {
        let dir = TempDir::new().unwrap();
        let plan = plan(&dir, "[services.gateway]\nenabled = true\n", false).await.unwrap();

        let file = plan.gateway_file.as_ref().unwrap();
        assert_eq!(file.path, dir.path().join("configs").join("Caddyfile"));
        assert!(plan.spec("open-webui").unwrap().ports.is_empty());
        assert!(plan.spec("gateway").unwrap().probe_url().is_some());

        let plain = self::plan(&dir, "", false).await.unwrap();
        assert!(plain.gateway_file.is_none());
        assert_eq!(plain.spec("open-webui").unwrap().ports.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_file_behind_missing_env_override() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("explicit.toml");
        std::fs::write(&explicit, "[[services.ollama.ports]]\nhost = 11434\n").unwrap();
        let ctx = InvocationContext {
            env: ConfigEnv {
                config_override: Some(dir.path().join("absent.toml")),
                home_override: Some(dir.path().to_path_buf()),
                ..ConfigEnv::default()
            },
            config_path: Some(explicit.clone()),
            force_cpu: false,
        };

        let plan = ServicePlan::build(&ctx, &probe()).await.unwrap();

        assert_eq!(plan.config.source, SourceKind::ExplicitFile);
        assert_eq!(plan.config.path, Some(explicit));
        assert_eq!(
            plan.spec("ollama").unwrap().ports,
            vec![PortMapping {
                host: 11434,
                container: 11434
            }]
        );
        // Everything the file leaves out comes from the defaults.
        assert_eq!(plan.specs.len(), 3);
        assert_eq!(plan.config.config.cli.log_lines, 200);
    }

    #[tokio::test]
    async fn test_template_error_aborts_planning() {
        let dir = TempDir::new().unwrap();
        let result = plan(&dir, "[services.ollama.env]\nX = \"{{services.nope.port}}\"\n", false).await;
        assert!(matches!(result, Err(AirpodsError::Template(_))));
    }
}

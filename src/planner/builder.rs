//! Derivation of [`ServiceSpec`]s from the resolved configuration.
//!
//! Building is a pure function of the configuration, the accelerator
//! decisions and the state layout. All plan-level validation happens here,
//! before any engine call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::accelerator::{AcceleratorDecision, DecisionSource, CPU_VARIANT, FALLBACK_VARIANT};
use crate::config::{ResolvedConfig, ServiceConfig, VolumeConfig};
use crate::error::{Result, ValidationError};
use crate::state::{SecretStore, StatePaths, BIND_PREFIX};

use super::gateway::{GeneratedFile, CADDYFILE_TARGET, GATEWAY_SERVICE};
use super::hash::SpecHasher;
use super::spec::{
    AcceleratorRequirement, HealthContract, Mount, MountSource, PortMapping, Resources,
    ServiceSpec,
};

/// Mount name of the generated Caddyfile.
const CADDYFILE_MOUNT: &str = "caddyfile";

/// Builds service specs for every enabled service.
pub struct ServiceSpecBuilder<'a> {
    config: &'a ResolvedConfig,
    paths: &'a StatePaths,
    secrets: &'a dyn SecretStore,
    gateway_file: Option<&'a GeneratedFile>,
    hasher: SpecHasher,
}

impl<'a> ServiceSpecBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: &'a ResolvedConfig, paths: &'a StatePaths, secrets: &'a dyn SecretStore) -> Self {
        Self {
            config,
            paths,
            secrets,
            gateway_file: None,
            hasher: SpecHasher::new(),
        }
    }

    /// Routes `behind_gateway` services through the gateway and mounts the
    /// rendered Caddyfile into it.
    #[must_use]
    pub const fn with_gateway_file(mut self, file: Option<&'a GeneratedFile>) -> Self {
        self.gateway_file = file;
        self
    }

    /// Builds and validates the specs, ordered by service name.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for empty images, invalid volume
    /// targets, repeated or colliding host ports, duplicate pod or container
    /// names, or an unusable shared secret location.
    pub fn build(&self, decisions: &[AcceleratorDecision]) -> Result<Vec<ServiceSpec>> {
        let mut specs = Vec::new();

        for (name, service) in &self.config.config.services {
            if !service.enabled {
                debug!("Skipping disabled service {name}");
                continue;
            }
            let decision = decisions.iter().find(|d| d.service == *name);
            specs.push(self.build_one(name, service, decision)?);
        }

        check_unique(&specs)?;
        self.check_secret(&specs)?;
        Ok(specs)
    }

    fn build_one(
        &self,
        name: &str,
        service: &ServiceConfig,
        decision: Option<&AcceleratorDecision>,
    ) -> Result<ServiceSpec> {
        let variant = decision.map_or(CPU_VARIANT, |d| d.variant.as_str());
        let image = select_image(service, variant);
        if image.trim().is_empty() {
            return Err(ValidationError::EmptyImage {
                service: name.to_string(),
            }
            .into());
        }

        let routed = self.gateway_file.is_some() && service.behind_gateway && name != GATEWAY_SERVICE;
        let ports: Vec<PortMapping> = if routed {
            debug!("{name} is reached through the gateway; publishing no host ports");
            Vec::new()
        } else {
            service
                .ports
                .iter()
                .map(|port| PortMapping {
                    host: port.host,
                    container: port.container_port(),
                })
                .collect()
        };

        let mut mounts = service
            .volumes
            .iter()
            .map(|(key, volume)| self.resolve_mount(name, key, volume))
            .collect::<Result<Vec<_>>>()?;

        let mut network_aliases = vec![name.to_string()];
        for alias in &service.network_aliases {
            if !network_aliases.contains(alias) {
                network_aliases.push(alias.clone());
            }
        }

        let mut spec_hash = self.hasher.hash(&image, &ports, &service.env);
        if let Some(file) = self.gateway_file.filter(|_| name == GATEWAY_SERVICE) {
            mounts.push(Mount {
                name: CADDYFILE_MOUNT.to_string(),
                source: MountSource::File(file.path.clone()),
                target: CADDYFILE_TARGET.to_string(),
                read_only: true,
            });
            mounts.sort_by(|a, b| a.name.cmp(&b.name));
            spec_hash = self.hasher.with_contents(&spec_hash, &file.contents);
        }

        Ok(ServiceSpec {
            name: name.to_string(),
            pod: service.pod_name(name),
            container: service.container_name(name),
            image,
            ports,
            mounts,
            env: service.env.clone(),
            network_aliases,
            health: service.health.as_ref().and_then(HealthContract::from_config),
            accelerator: AcceleratorRequirement::from_gpu(&service.gpu),
            force_cpu: decision.is_some_and(|d| d.source == DecisionSource::Forced),
            use_gpu: decision.is_some_and(|d| d.attach_gpu),
            variant: variant.to_string(),
            needs_shared_secret: service.needs_webui_secret,
            resources: Resources {
                memory: service.resources.memory.clone(),
                cpus: service.resources.cpus,
            },
            restart_policy: self.config.config.runtime.restart_policy,
            spec_hash,
        })
    }

    fn resolve_mount(&self, service: &str, key: &str, volume: &VolumeConfig) -> Result<Mount> {
        let target = volume.target.trim();
        if target.is_empty() || !target.starts_with('/') {
            return Err(ValidationError::InvalidVolumeTarget {
                service: service.to_string(),
                volume: key.to_string(),
                target: volume.target.clone(),
            }
            .into());
        }

        let source = volume.source.trim();
        let source = if let Some(bind) = source.strip_prefix(BIND_PREFIX) {
            MountSource::Bind(self.paths.bind_source(bind))
        } else if Path::new(source).is_absolute() {
            MountSource::Bind(PathBuf::from(source))
        } else {
            MountSource::Volume(source.to_string())
        };

        Ok(Mount {
            name: key.to_string(),
            source,
            target: target.to_string(),
            read_only: volume.read_only,
        })
    }

    fn check_secret(&self, specs: &[ServiceSpec]) -> Result<()> {
        let Some(spec) = specs.iter().find(|s| s.needs_shared_secret) else {
            return Ok(());
        };
        self.secrets.check_reachable().map_err(|message| {
            ValidationError::SecretUnavailable {
                service: spec.name.clone(),
                path: self.secrets.path().to_path_buf(),
                message,
            }
            .into()
        })
    }
}

/// Picks the image for a variant: the variant's own image, then the
/// fallback variant's image, then the base image.
fn select_image(service: &ServiceConfig, variant: &str) -> String {
    service
        .image_variants
        .get(variant)
        .or_else(|| service.image_variants.get(FALLBACK_VARIANT))
        .unwrap_or(&service.image)
        .clone()
}

fn check_unique(specs: &[ServiceSpec]) -> Result<()> {
    let mut ports: BTreeMap<u16, &str> = BTreeMap::new();
    let mut pods: BTreeMap<&str, &str> = BTreeMap::new();
    let mut containers: BTreeMap<&str, &str> = BTreeMap::new();

    for spec in specs {
        for port in &spec.ports {
            match ports.insert(port.host, &spec.name) {
                Some(first) if first == spec.name => {
                    return Err(ValidationError::DuplicatePort {
                        service: spec.name.clone(),
                        port: port.host,
                    }
                    .into());
                }
                Some(first) => {
                    return Err(ValidationError::PortCollision {
                        port: port.host,
                        first: first.to_string(),
                        second: spec.name.clone(),
                    }
                    .into());
                }
                None => {}
            }
        }
        for (kind, seen, value) in [
            ("pod", &mut pods, spec.pod.as_str()),
            ("container", &mut containers, spec.container.as_str()),
        ] {
            if let Some(first) = seen.insert(value, &spec.name) {
                return Err(ValidationError::DuplicateName {
                    kind,
                    name: value.to_string(),
                    first: first.to_string(),
                    second: spec.name.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

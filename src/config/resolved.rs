//! The immutable runtime configuration.
//!
//! [`ResolvedConfig`] is the only configuration form read downstream of
//! loading: templates are expanded, the typed schema is parsed and
//! validated, and runtime defaults are applied.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use toml::Table;
use tracing::debug;
use validator::Validate;

use crate::error::{ConfigError, Result};

use super::loader::{ConfigDocument, SourceKind};
use super::schema::{AirpodsConfig, AUTO, DEFAULT_GPU_DEVICE_FLAG, REQUIRED_SERVICES};
use super::template::resolve_templates;

#[allow(clippy::expect_used)]
static MEMORY_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[kKmMgG]$").expect("memory pattern compiles"));

/// Merged, template-expanded and validated configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Expanded document, kept for display.
    pub table: Table,
    /// Typed view of the document.
    pub config: AirpodsConfig,
    /// Kind of the source file that was loaded.
    pub source: SourceKind,
    /// Path of the source file that was loaded, if any.
    pub path: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Expands, parses and validates a merged document.
    ///
    /// # Errors
    ///
    /// Returns a template error for unresolvable placeholders, or a
    /// configuration error naming the offending field.
    pub fn from_document(document: &ConfigDocument) -> Result<Self> {
        let table = resolve_templates(&document.table)?;

        let mut config: AirpodsConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::invalid("<document>", e.message()))?;

        validate(&config)?;
        apply_runtime_defaults(&mut config);

        debug!(
            services = config.services.len(),
            "Configuration resolved from {}", document.kind
        );

        Ok(Self {
            table,
            config,
            source: document.kind,
            path: document.path.clone(),
        })
    }

    /// Renders the expanded document as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.table)
            .map_err(|e| crate::error::AirpodsError::internal(format!("cannot render config: {e}")))
    }
}

fn validate(config: &AirpodsConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| ConfigError::invalid("config", e.to_string().replace('\n', "; ")))?;

    for required in REQUIRED_SERVICES {
        if !config.services.contains_key(*required) {
            return Err(ConfigError::invalid(
                format!("services.{required}"),
                "service definition is required",
            )
            .into());
        }
    }

    for (name, service) in &config.services {
        service
            .validate()
            .map_err(|e| ConfigError::invalid(format!("services.{name}"), e.to_string().replace('\n', "; ")))?;

        if !service.image.is_empty() && !service.image.contains('/') {
            return Err(ConfigError::invalid(
                format!("services.{name}.image"),
                format!("'{}' must be a fully qualified reference (registry/name:tag)", service.image),
            )
            .into());
        }

        if let Some(memory) = &service.resources.memory {
            if !MEMORY_LIMIT.is_match(memory) {
                return Err(ConfigError::invalid(
                    format!("services.{name}.resources.memory"),
                    format!("'{memory}' must look like 512m or 8g"),
                )
                .into());
            }
        }
    }
    Ok(())
}

fn apply_runtime_defaults(config: &mut AirpodsConfig) {
    if config.runtime.gpu_device_flag.trim().is_empty() || config.runtime.gpu_device_flag == AUTO {
        config.runtime.gpu_device_flag = DEFAULT_GPU_DEVICE_FLAG.to_string();
    }
}

//! Configuration module for airpods.
//!
//! This module handles everything between the files on disk and the typed
//! runtime configuration:
//! - Discovering and loading layered TOML sources
//! - Deep-merging them over the built-in defaults
//! - Expanding `{{dotted.path}}` templates
//! - Parsing and validating the typed schema

mod loader;
mod merge;
mod resolved;
mod schema;
mod template;

pub use loader::{
    config_home, find_repo_root, ConfigDocument, ConfigEnv, ConfigLoader, ConfigSource,
    SourceKind, CONFIG_ENV, CONFIG_FILE_NAME, DEFAULT_CONFIG, HOME_ENV,
};
pub use merge::{deep_merge, merge_layers};
pub use resolved::ResolvedConfig;
pub use schema::{
    AirpodsConfig, CliConfig, DependenciesConfig, EnginePreference, GpuConfig, HealthConfig,
    MetaConfig, NetworkConfig, PortConfig, ResourceLimits, RestartPolicy, RuntimeConfig,
    ServiceConfig, VolumeConfig, AUTO, DEFAULT_GPU_DEVICE_FLAG, REQUIRED_SERVICES,
};
pub use template::{has_placeholders, render_template, resolve_templates};

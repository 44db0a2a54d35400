//! On-disk layout of the airpods home directory.
//!
//! ```text
//! <root>/
//!   configs/config.toml
//!   configs/webui_secret
//!   configs/Caddyfile
//!   volumes/<bind mount directories>
//! ```

use std::path::{Path, PathBuf};

use crate::config::{config_home, ConfigEnv, CONFIG_FILE_NAME};
use crate::error::{AirpodsError, Result};

/// Prefix marking a mount source as a directory under the volumes dir.
pub const BIND_PREFIX: &str = "bind://";

/// File name of the generated WebUI secret.
pub const SECRET_FILE_NAME: &str = "webui_secret";

/// File name of the generated gateway configuration.
pub const CADDYFILE_NAME: &str = "Caddyfile";

/// Resolved locations of durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Creates paths rooted at `root`.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Determines the state root for an invocation.
    ///
    /// `AIRPODS_HOME` wins, then the home of the loaded configuration file,
    /// then the user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn discover(env: &ConfigEnv, config_path: Option<&Path>) -> Result<Self> {
        if let Some(home) = &env.home_override {
            return Ok(Self::new(home.clone()));
        }
        if let Some(path) = config_path {
            return Ok(Self::new(config_home(path)));
        }
        env.user_config_dir()
            .map(Self::new)
            .ok_or_else(|| AirpodsError::internal("cannot determine a home directory for airpods state"))
    }

    /// Returns the state root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding configuration files and secrets.
    #[must_use]
    pub fn configs_dir(&self) -> PathBuf {
        self.root.join("configs")
    }

    /// Returns the default configuration file location.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.configs_dir().join(CONFIG_FILE_NAME)
    }

    /// Returns the directory holding bind mount sources.
    #[must_use]
    pub fn volumes_dir(&self) -> PathBuf {
        self.root.join("volumes")
    }

    /// Returns the WebUI secret location.
    #[must_use]
    pub fn secret_path(&self) -> PathBuf {
        self.configs_dir().join(SECRET_FILE_NAME)
    }

    /// Returns the generated gateway configuration location.
    #[must_use]
    pub fn caddyfile(&self) -> PathBuf {
        self.configs_dir().join(CADDYFILE_NAME)
    }

    /// Returns the host directory for a `bind://` name.
    #[must_use]
    pub fn bind_source(&self, name: &str) -> PathBuf {
        self.volumes_dir().join(name.trim_start_matches('/'))
    }
}

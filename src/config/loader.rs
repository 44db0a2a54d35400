//! Configuration discovery and loading.
//!
//! Candidate files are checked in a fixed priority order. The first one
//! that exists is parsed and every lower-priority file is ignored; the
//! built-in defaults are always merged underneath.

use std::fmt;
use std::path::{Path, PathBuf};
use toml::Table;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

use super::merge::merge_layers;

/// The built-in defaults document.
pub const DEFAULT_CONFIG: &str = include_str!("defaults.toml");

/// Environment variable pointing directly at a configuration file.
pub const CONFIG_ENV: &str = "AIRPODS_CONFIG";

/// Environment variable overriding the airpods home directory.
pub const HOME_ENV: &str = "AIRPODS_HOME";

/// File name of the configuration document.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Where a configuration document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// `AIRPODS_CONFIG`.
    EnvOverride,
    /// `--config` on the command line.
    ExplicitFile,
    /// `AIRPODS_HOME`.
    HomeOverride,
    /// The enclosing repository checkout.
    RepositoryLocal,
    /// `$XDG_CONFIG_HOME/airpods`.
    Xdg,
    /// `~/.config/airpods`.
    UserHome,
    /// Compiled-in defaults.
    Defaults,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EnvOverride => "AIRPODS_CONFIG",
            Self::ExplicitFile => "--config",
            Self::HomeOverride => "AIRPODS_HOME",
            Self::RepositoryLocal => "repository",
            Self::Xdg => "XDG config",
            Self::UserHome => "user config",
            Self::Defaults => "built-in defaults",
        };
        f.write_str(label)
    }
}

/// A candidate configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    /// Kind of source.
    pub kind: SourceKind,
    /// Candidate path.
    pub path: PathBuf,
}

/// A parsed configuration document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    /// Kind of the highest-priority source that contributed.
    pub kind: SourceKind,
    /// File the document was read from, if any.
    pub path: Option<PathBuf>,
    /// Document contents.
    pub table: Table,
}

impl ConfigDocument {
    /// Parses the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded defaults are not valid TOML.
    pub fn defaults() -> Result<Self> {
        let table = DEFAULT_CONFIG
            .parse::<Table>()
            .map_err(|e| ConfigError::Unparsable {
                path: PathBuf::from("<built-in defaults>"),
                message: e.to_string(),
            })?;
        Ok(Self {
            kind: SourceKind::Defaults,
            path: None,
            table,
        })
    }

    /// Reads and parses one candidate file.
    ///
    /// # Errors
    ///
    /// Returns an error naming the path if the file cannot be read or parsed.
    pub fn read(source: &ConfigSource) -> Result<Self> {
        let text = std::fs::read_to_string(&source.path).map_err(|e| ConfigError::Unreadable {
            path: source.path.clone(),
            message: e.to_string(),
        })?;
        let table = text.parse::<Table>().map_err(|e| ConfigError::Unparsable {
            path: source.path.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            kind: source.kind,
            path: Some(source.path.clone()),
            table,
        })
    }

    /// Deep-merges documents given highest priority first.
    #[must_use]
    pub fn merge(documents: &[Self]) -> Self {
        let first = documents.first();
        Self {
            kind: first.map_or(SourceKind::Defaults, |d| d.kind),
            path: first.and_then(|d| d.path.clone()),
            table: merge_layers(documents.iter().map(|d| &d.table)),
        }
    }
}

/// Snapshot of the process environment relevant to discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigEnv {
    /// Value of `AIRPODS_CONFIG`.
    pub config_override: Option<PathBuf>,
    /// Value of `AIRPODS_HOME`.
    pub home_override: Option<PathBuf>,
    /// Value of `XDG_CONFIG_HOME`.
    pub xdg_config_home: Option<PathBuf>,
    /// The user's home directory.
    pub home_dir: Option<PathBuf>,
    /// Working directory used for repository detection.
    pub cwd: Option<PathBuf>,
}

impl ConfigEnv {
    /// Captures the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        let non_empty = |name: &str| {
            std::env::var_os(name)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        };
        Self {
            config_override: non_empty(CONFIG_ENV),
            home_override: non_empty(HOME_ENV),
            xdg_config_home: non_empty("XDG_CONFIG_HOME"),
            home_dir: dirs::home_dir(),
            cwd: std::env::current_dir().ok(),
        }
    }

    /// Returns `$XDG_CONFIG_HOME/airpods` or `~/.config/airpods`.
    #[must_use]
    pub fn user_config_dir(&self) -> Option<PathBuf> {
        self.xdg_config_home
            .as_ref()
            .map(|xdg| xdg.join("airpods"))
            .or_else(|| self.home_dir.as_ref().map(|home| home.join(".config").join("airpods")))
    }
}

/// Locates and loads the configuration for one invocation.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env: ConfigEnv,
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    /// Creates a loader over an environment snapshot.
    #[must_use]
    pub const fn new(env: ConfigEnv, explicit: Option<PathBuf>) -> Self {
        Self { env, explicit }
    }

    /// Returns the environment snapshot.
    #[must_use]
    pub const fn env(&self) -> &ConfigEnv {
        &self.env
    }

    /// Loads `.env` from `dir` into the process environment, if present.
    ///
    /// Must run before [`ConfigEnv::from_process`] so the snapshot sees it.
    pub fn load_dotenv(dir: &Path) {
        let env_file = dir.join(".env");
        if !env_file.exists() {
            return;
        }
        match dotenvy::from_path(&env_file) {
            Ok(()) => debug!("Loaded environment from {}", env_file.display()),
            Err(e) => warn!("Ignoring {}: {e}", env_file.display()),
        }
    }

    /// Returns every candidate file, highest priority first.
    #[must_use]
    pub fn candidates(&self) -> Vec<ConfigSource> {
        let mut candidates = Vec::new();

        if let Some(path) = &self.env.config_override {
            candidates.push(ConfigSource {
                kind: SourceKind::EnvOverride,
                path: path.clone(),
            });
        }
        if let Some(path) = &self.explicit {
            candidates.push(ConfigSource {
                kind: SourceKind::ExplicitFile,
                path: path.clone(),
            });
        }

        let mut homes = Vec::new();
        if let Some(home) = &self.env.home_override {
            homes.push((SourceKind::HomeOverride, home.clone()));
        }
        if let Some(repo) = self.env.cwd.as_deref().and_then(find_repo_root) {
            homes.push((SourceKind::RepositoryLocal, repo));
        }
        if let Some(xdg) = &self.env.xdg_config_home {
            homes.push((SourceKind::Xdg, xdg.join("airpods")));
        }
        if let Some(home) = &self.env.home_dir {
            homes.push((SourceKind::UserHome, home.join(".config").join("airpods")));
        }
        for (kind, base) in homes {
            candidates.push(ConfigSource {
                kind,
                path: base.join("configs").join(CONFIG_FILE_NAME),
            });
            candidates.push(ConfigSource {
                kind,
                path: base.join(CONFIG_FILE_NAME),
            });
        }

        candidates
    }

    /// Returns the first candidate that exists on disk.
    #[must_use]
    pub fn discover(&self) -> Option<ConfigSource> {
        self.candidates().into_iter().find(|candidate| {
            let exists = candidate.path.is_file();
            if !exists {
                match candidate.kind {
                    SourceKind::EnvOverride | SourceKind::ExplicitFile => warn!(
                        "{} points to missing file {}, skipping",
                        candidate.kind,
                        candidate.path.display()
                    ),
                    _ => debug!("No config at {}", candidate.path.display()),
                }
            }
            exists
        })
    }

    /// Loads the discovered file merged over the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered file cannot be read or parsed.
    pub fn load(&self) -> Result<ConfigDocument> {
        let defaults = ConfigDocument::defaults()?;
        let Some(source) = self.discover() else {
            info!("No configuration file found, using built-in defaults");
            return Ok(defaults);
        };

        info!("Loading configuration from {} ({})", source.path.display(), source.kind);
        let document = ConfigDocument::read(&source)?;
        Ok(ConfigDocument::merge(&[document, defaults]))
    }

    /// Writes the built-in defaults to `path` unless a file already exists.
    ///
    /// Returns `true` if a file was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn bootstrap_default(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(true)
    }
}

/// Returns the airpods home for a configuration file path.
///
/// Files inside a `configs/` directory belong to its parent.
#[must_use]
pub fn config_home(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if parent.file_name().is_some_and(|name| name == "configs") {
        parent.parent().unwrap_or(parent).to_path_buf()
    } else {
        parent.to_path_buf()
    }
}

/// Returns the nearest ancestor of `start` containing a `.git` entry.
#[must_use]
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_in(dir: &TempDir) -> ConfigEnv {
        ConfigEnv {
            config_override: None,
            home_override: None,
            xdg_config_home: None,
            home_dir: Some(dir.path().join("home")),
            cwd: Some(dir.path().join("work")),
        }
    }

    fn write(path: &Path, text: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_defaults_parse() {
        let defaults = ConfigDocument::defaults().unwrap();
        assert_eq!(defaults.kind, SourceKind::Defaults);
        assert!(defaults.table["services"].get("ollama").is_some());
    }

    #[test]
    fn test_candidate_order() {
        let dir = TempDir::new().unwrap();
        let mut env = env_in(&dir);
        env.config_override = Some(dir.path().join("env.toml"));
        env.home_override = Some(dir.path().join("ahome"));
        env.xdg_config_home = Some(dir.path().join("xdg"));

        let loader = ConfigLoader::new(env, Some(dir.path().join("explicit.toml")));
        let kinds: Vec<SourceKind> = loader.candidates().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SourceKind::EnvOverride,
                SourceKind::ExplicitFile,
                SourceKind::HomeOverride,
                SourceKind::HomeOverride,
                SourceKind::Xdg,
                SourceKind::Xdg,
                SourceKind::UserHome,
                SourceKind::UserHome,
            ]
        );
    }

    #[test]
    fn test_first_existing_file_wins() {
        let dir = TempDir::new().unwrap();
        let mut env = env_in(&dir);
        env.xdg_config_home = Some(dir.path().join("xdg"));
        write(
            &dir.path().join("xdg/airpods/config.toml"),
            "[cli]\nstop_timeout = 42\n",
        );
        write(
            &dir.path().join("home/.config/airpods/config.toml"),
            "[cli]\nlog_lines = 7\n",
        );

        let document = ConfigLoader::new(env, None).load().unwrap();
        assert_eq!(document.kind, SourceKind::Xdg);
        assert_eq!(document.table["cli"]["stop_timeout"].as_integer(), Some(42));
        // Lower-priority files are skipped entirely; defaults fill the gap.
        assert_eq!(document.table["cli"]["log_lines"].as_integer(), Some(200));
    }

    #[test]
    fn test_missing_env_override_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut env = env_in(&dir);
        env.config_override = Some(dir.path().join("absent.toml"));
        let explicit = dir.path().join("explicit.toml");
        write(&explicit, "[[services.ollama.ports]]\nhost = 11434\n");

        let document = ConfigLoader::new(env, Some(explicit.clone())).load().unwrap();
        assert_eq!(document.kind, SourceKind::ExplicitFile);
        assert_eq!(document.path, Some(explicit));
    }

    #[test]
    fn test_repository_local_config() {
        let dir = TempDir::new().unwrap();
        let env = env_in(&dir);
        std::fs::create_dir_all(dir.path().join("work/.git")).unwrap();
        write(
            &dir.path().join("work/configs/config.toml"),
            "[runtime]\nnetwork_name = \"repo_net\"\n",
        );

        let document = ConfigLoader::new(env, None).load().unwrap();
        assert_eq!(document.kind, SourceKind::RepositoryLocal);
        assert_eq!(
            document.table["runtime"]["network_name"].as_str(),
            Some("repo_net")
        );
    }

    #[test]
    fn test_unparsable_file_names_path() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("broken.toml");
        write(&explicit, "[cli\nstop_timeout = ");

        let err = ConfigLoader::new(env_in(&dir), Some(explicit.clone()))
            .load()
            .unwrap_err();
        assert!(err.to_string().contains(&explicit.display().to_string()));
    }

    #[test]
    fn test_no_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let document = ConfigLoader::new(env_in(&dir), None).load().unwrap();
        assert_eq!(document.kind, SourceKind::Defaults);
        assert!(document.path.is_none());
    }

    #[test]
    fn test_bootstrap_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("configs").join(CONFIG_FILE_NAME);
        assert!(ConfigLoader::bootstrap_default(&path).unwrap());
        std::fs::write(&path, "# mine\n").unwrap();
        assert!(!ConfigLoader::bootstrap_default(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");
    }

    #[test]
    fn test_config_home() {
        assert_eq!(
            config_home(Path::new("/a/b/configs/config.toml")),
            PathBuf::from("/a/b")
        );
        assert_eq!(config_home(Path::new("/a/b/config.toml")), PathBuf::from("/a/b"));
    }
}

//! Durable shared secret for services that sign sessions.
//!
//! The secret is generated once, stored next to the configuration and
//! reused on every later start so existing sessions stay valid.

use rand::rngs::OsRng;
use rand::RngCore;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::Result;

/// Number of random bytes in a generated secret.
pub const SECRET_BYTES: usize = 32;

/// Storage for the generated shared secret.
pub trait SecretStore: Send + Sync {
    /// Returns the storage location.
    fn path(&self) -> &Path;

    /// Checks, without writing, that the secret can be read or created.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem.
    fn check_reachable(&self) -> std::result::Result<(), String>;

    /// Returns the stored secret, generating and persisting one if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    fn load_or_create(&self) -> Result<String>;
}

/// File-backed secret store.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Creates a store at `path`.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn generate() -> String {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn check_reachable(&self) -> std::result::Result<(), String> {
        if self.path.is_dir() {
            return Err(String::from("path is a directory"));
        }
        if self.path.exists() {
            return std::fs::File::open(&self.path)
                .map(|_| ())
                .map_err(|e| e.to_string());
        }

        // Nearest existing ancestor must be a writable directory.
        let ancestor = self
            .path
            .ancestors()
            .skip(1)
            .find(|dir| dir.exists())
            .ok_or_else(|| String::from("no existing parent directory"))?;
        let metadata = std::fs::metadata(ancestor).map_err(|e| e.to_string())?;
        if !metadata.is_dir() {
            return Err(format!("{} is not a directory", ancestor.display()));
        }
        if metadata.permissions().readonly() {
            return Err(format!("{} is read-only", ancestor.display()));
        }
        Ok(())
    }

    fn load_or_create(&self) -> Result<String> {
        if self.path.exists() {
            let existing = std::fs::read_to_string(&self.path)?;
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(existing.to_string());
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let secret = Self::generate();
        std::fs::write(&self.path, &secret)?;
        Self::restrict_permissions(&self.path)?;
        info!("Generated shared secret at {}", self.path.display());
        Ok(secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_secret_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path().join("configs").join("webui_secret"));
        assert!(store.check_reachable().is_ok());

        let first = store.load_or_create().unwrap();
        assert_eq!(first.len(), SECRET_BYTES * 2);
        assert_eq!(store.load_or_create().unwrap(), first);
    }

    #[test]
    fn test_existing_secret_is_reused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("webui_secret");
        std::fs::write(&path, "abc\n").unwrap();
        let store = FileSecretStore::new(path);
        assert_eq!(store.load_or_create().unwrap(), "abc");
    }

    #[test]
    fn test_directory_in_place_is_unreachable() {
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path().to_path_buf());
        assert!(store.check_reachable().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_secret_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path().join("webui_secret"));
        store.load_or_create().unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

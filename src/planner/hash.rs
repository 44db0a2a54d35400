//! Spec hashing for change detection.
//!
//! The hash is stored as a container label at launch and compared on the
//! next run to decide between reusing and replacing a container.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::spec::PortMapping;

/// Number of hex characters shown in human readable output.
const SHORT_HASH_LEN: usize = 12;

/// Hasher for service specs.
#[derive(Debug, Default)]
pub struct SpecHasher;

impl SpecHasher {
    /// Creates a new spec hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the hash over image, ports and environment.
    ///
    /// Ports are sorted so reordering them is not a change; env is already
    /// key-ordered.
    #[must_use]
    pub fn hash(&self, image: &str, ports: &[PortMapping], env: &BTreeMap<String, String>) -> String {
        let mut hasher = Sha256::new();

        hasher.update(b"image\0");
        hasher.update(image.as_bytes());

        let mut ports = ports.to_vec();
        ports.sort_unstable();
        hasher.update(b"\0ports\0");
        for port in ports {
            hasher.update(port.host.to_be_bytes());
            hasher.update(port.container.to_be_bytes());
        }

        hasher.update(b"\0env\0");
        for (key, value) in env {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\0");
        }

        hex::encode(hasher.finalize())
    }

    /// Folds the contents of a generated file into an existing hash.
    #[must_use]
    pub fn with_contents(&self, hash: &str, contents: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(hash.as_bytes());
        hasher.update(b"\0file\0");
        hasher.update(contents.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Truncates a hash for display.
#[must_use]
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

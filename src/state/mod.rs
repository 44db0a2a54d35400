//! Durable local state.
//!
//! Everything airpods keeps between invocations lives on disk under one
//! home directory: the configuration file, the generated shared secret, the
//! generated gateway configuration and the bind mount directories. Nothing
//! else is persisted.

mod paths;
mod secret;

pub use paths::{StatePaths, BIND_PREFIX, CADDYFILE_NAME, SECRET_FILE_NAME};
pub use secret::{FileSecretStore, SecretStore, SECRET_BYTES};

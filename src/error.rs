//! Error types for airpods.
//!
//! Errors are split by the stage that raises them. Stage errors
//! (configuration, templates, validation, dependencies) abort an invocation
//! before any engine mutation is issued. Per-service failures
//! ([`ServiceFailure`]) are collected into a run report instead, and
//! accelerator detection problems ([`DetectionError`]) always degrade to a
//! fallback decision.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a fully successful run.
pub const EXIT_SUCCESS: u8 = 0;

/// Process exit code for a fatal configuration, dependency or engine error.
pub const EXIT_FATAL: u8 = 1;

/// Process exit code when some requested services failed and others did not.
pub const EXIT_PARTIAL: u8 = 2;

/// The main error type for airpods.
#[derive(Debug, Error)]
pub enum AirpodsError {
    /// Configuration source errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template expansion errors.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Plan validation errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing or unsupported external dependencies.
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),

    /// Container engine errors.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// `clean` was invoked without any resource category.
    #[error("No cleanup targets specified")]
    NoCleanTargets,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while locating, reading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file exists but cannot be read.
    #[error("cannot read {path}: {message}")]
    Unreadable {
        /// Offending file.
        path: PathBuf,
        /// Underlying IO message.
        message: String,
    },

    /// A configuration file exists but is not valid TOML.
    #[error("cannot parse {path}: {message}")]
    Unparsable {
        /// Offending file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The merged document does not satisfy the schema.
    #[error("invalid value at '{field}': {message}")]
    Invalid {
        /// Dotted path of the offending key.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A requested service is not defined.
    #[error("unknown service '{name}' (available: {available})")]
    UnknownService {
        /// Requested name.
        name: String,
        /// Comma separated list of defined services.
        available: String,
    },
}

/// Errors raised while expanding `{{dotted.path}}` placeholders.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The placeholder names a key that does not exist.
    #[error("'{key}' references missing key '{path}'")]
    MissingKey {
        /// Location of the string holding the placeholder.
        key: String,
        /// Referenced path.
        path: String,
    },

    /// The placeholder indexes into a scalar or uses a non-numeric list index.
    #[error("'{key}' references '{path}', but '{segment}' cannot be traversed")]
    NotAContainer {
        /// Location of the string holding the placeholder.
        key: String,
        /// Referenced path.
        path: String,
        /// Segment at which traversal failed.
        segment: String,
    },

    /// The placeholder refers to its own location or one of its ancestors.
    #[error("'{key}' references itself through '{path}'")]
    SelfReference {
        /// Location of the string holding the placeholder.
        key: String,
        /// Referenced path.
        path: String,
    },

    /// The placeholder resolves to a table or array.
    #[error("'{key}' references '{path}', which is not a scalar value")]
    NonScalar {
        /// Location of the string holding the placeholder.
        key: String,
        /// Referenced path.
        path: String,
    },

    /// The placeholder points at a string that is itself a template.
    #[error("'{key}' references '{path}', which holds another placeholder; chains are not expanded")]
    Chained {
        /// Location of the string holding the placeholder.
        key: String,
        /// Referenced path.
        path: String,
    },

    /// A `{{` without a closing `}}`.
    #[error("'{key}' contains an unterminated placeholder")]
    Unterminated {
        /// Location of the string holding the placeholder.
        key: String,
    },
}

/// Errors raised while turning configuration into service specs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Two enabled services bind the same host port.
    #[error("host port {port} is claimed by both '{first}' and '{second}'")]
    PortCollision {
        /// Colliding host port.
        port: u16,
        /// First service claiming the port.
        first: String,
        /// Second service claiming the port.
        second: String,
    },

    /// One service lists the same host port twice.
    #[error("service '{service}' publishes host port {port} more than once")]
    DuplicatePort {
        /// Offending service.
        service: String,
        /// Repeated host port.
        port: u16,
    },

    /// Two services share a pod or container name.
    #[error("duplicate {kind} name '{name}' (services '{first}' and '{second}')")]
    DuplicateName {
        /// Kind of name (pod, container).
        kind: &'static str,
        /// Duplicated name.
        name: String,
        /// First service using the name.
        first: String,
        /// Second service using the name.
        second: String,
    },

    /// A volume target is empty or relative.
    #[error("service '{service}' volume '{volume}' has invalid target '{target}'")]
    InvalidVolumeTarget {
        /// Owning service.
        service: String,
        /// Volume key.
        volume: String,
        /// Offending target.
        target: String,
    },

    /// A service has no image reference.
    #[error("service '{service}' has an empty image reference")]
    EmptyImage {
        /// Offending service.
        service: String,
    },

    /// The shared secret cannot be provisioned.
    #[error("service '{service}' needs a shared secret but {path} is unusable: {message}")]
    SecretUnavailable {
        /// Service that needs the secret.
        service: String,
        /// Secret storage path.
        path: PathBuf,
        /// Underlying problem.
        message: String,
    },
}

/// Missing external tools or unsupported engines.
#[derive(Debug, Error)]
pub enum DependencyError {
    /// A required tool is not on `PATH`.
    #[error("required tool '{name}' was not found on PATH")]
    MissingTool {
        /// Tool name.
        name: String,
        /// How to fix it.
        remediation: String,
    },

    /// The configured engine backend is not implemented.
    #[error("container engine '{engine}' is not supported yet")]
    UnsupportedEngine {
        /// Requested engine.
        engine: String,
    },

    /// The engine binary exists but does not answer.
    #[error("container engine '{engine}' is not usable: {message}")]
    EngineUnavailable {
        /// Engine name.
        engine: String,
        /// Underlying problem.
        message: String,
    },
}

/// Errors returned by the container engine gateway.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine command exited unsuccessfully.
    #[error("'{command}' failed (exit {code:?}): {stderr}")]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The engine binary could not be spawned.
    #[error("failed to run '{program}': {message}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying IO message.
        message: String,
    },

    /// The engine returned output that could not be interpreted.
    #[error("unexpected output from '{command}': {message}")]
    InvalidResponse {
        /// Rendered command line.
        command: String,
        /// Description of the problem.
        message: String,
    },

    /// The engine command did not finish in time.
    #[error("'{command}' timed out after {secs}s")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// Timeout in seconds.
        secs: u64,
    },

    /// The operation was interrupted.
    #[error("operation cancelled")]
    Cancelled,
}

/// Accelerator capability detection problems. Never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    /// The detection tool is not installed.
    #[error("{tool} not found")]
    ToolMissing {
        /// Tool name.
        tool: String,
    },

    /// The detection tool failed.
    #[error("detection command failed: {message}")]
    CommandFailed {
        /// Underlying problem.
        message: String,
    },

    /// The tool ran but reported no devices.
    #[error("no GPU devices reported")]
    NoDevices,

    /// The tool output could not be parsed.
    #[error("cannot parse detection output '{line}'")]
    Unparsable {
        /// Offending line.
        line: String,
    },
}

/// Failure isolated to a single service during a start run.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServiceFailure {
    /// The image pull failed; the service was not launched.
    #[error("pull of {image} failed: {reason}")]
    Pull {
        /// Image reference.
        image: String,
        /// Engine message.
        reason: String,
    },

    /// The image pull was interrupted.
    #[error("pull of {image} was cancelled")]
    PullCancelled {
        /// Image reference.
        image: String,
    },

    /// Creating or starting the container failed.
    #[error("launch failed: {reason}")]
    Launch {
        /// Engine message.
        reason: String,
    },

    /// The health contract was not met before the run deadline.
    #[error("not healthy after {attempts} attempts{}", .last.as_ref().map(|l| format!(" (last: {l})")).unwrap_or_default())]
    HealthTimeout {
        /// Number of probe attempts made.
        attempts: u32,
        /// Last observed status or error.
        last: Option<String>,
        /// Whether the wait was interrupted.
        cancelled: bool,
    },

    /// The container is not running after launch.
    #[error("container is not running (state: {state})")]
    NotRunning {
        /// Observed container state.
        state: String,
    },
}

/// Result type alias for airpods operations.
pub type Result<T> = std::result::Result<T, AirpodsError>;

impl AirpodsError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        EXIT_FATAL
    }

    /// Returns a remediation hint for the operator, if one applies.
    #[must_use]
    pub fn remediation(&self) -> Option<String> {
        match self {
            Self::Dependency(DependencyError::MissingTool { remediation, .. }) => {
                Some(remediation.clone())
            }
            Self::Dependency(DependencyError::UnsupportedEngine { .. }) => Some(String::from(
                "Set runtime.prefer back to 'podman' or 'auto' and try again.",
            )),
            Self::Dependency(DependencyError::EngineUnavailable { .. }) => Some(String::from(
                "Check that rootless podman works: podman info",
            )),
            Self::Config(ConfigError::Unparsable { path, .. }) => Some(format!(
                "Fix the TOML syntax in {} or move it aside to use defaults.",
                path.display()
            )),
            Self::Config(ConfigError::UnknownService { .. }) => {
                Some(String::from("Run 'airpods config show' to list configured services."))
            }
            Self::Validation(ValidationError::PortCollision { port, .. }) => Some(format!(
                "Change services.<name>.ports so only one enabled service binds host port {port}."
            )),
            Self::Validation(ValidationError::DuplicatePort { service, port }) => Some(format!(
                "Remove the repeated host port {port} from services.{service}.ports."
            )),
            Self::NoCleanTargets => Some(String::from(
                "Pass --all or at least one of --pods, --volumes, --images, --network, --configs.",
            )),
            Self::Template(_) => Some(String::from(
                "Check the {{...}} placeholders; paths are dotted and use numeric list indices.",
            )),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates an invalid-value error for a specific field.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl DependencyError {
    /// Creates a missing-tool error with the standard remediation text.
    #[must_use]
    pub fn missing_tool(name: impl Into<String>) -> Self {
        let name = name.into();
        let remediation = match name.as_str() {
            "podman" => String::from("Install Podman: https://podman.io/docs/installation"),
            "nvidia-smi" => String::from("Install the NVIDIA driver utilities or run with --cpu."),
            other => format!("Install {other} or ensure it is on your PATH."),
        };
        Self::MissingTool { name, remediation }
    }
}

impl EngineError {
    /// Creates a command failure from a rendered command line.
    #[must_use]
    pub fn command_failed(command: impl Into<String>, code: Option<i32>, stderr: &str) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stderr: stderr.trim().to_string(),
        }
    }
}

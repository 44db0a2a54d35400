//! Per-service launch decisions.
//!
//! Compares a desired spec with the observed container and decides what
//! the launch phase has to do.

use serde::Serialize;
use std::fmt;

use crate::engine::ContainerInfo;
use crate::planner::{short_hash, ServiceSpec};

/// What launching a service requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum LaunchAction {
    /// No container exists.
    Create,
    /// Running with the current spec.
    Reuse,
    /// Stopped with the current spec.
    Start,
    /// The container was created from a different spec.
    Replace {
        /// Hash label of the existing container.
        previous_hash: Option<String>,
    },
}

impl LaunchAction {
    /// Returns whether the action removes an existing container.
    #[must_use]
    pub const fn is_destructive(&self) -> bool {
        matches!(self, Self::Replace { .. })
    }
}

impl fmt::Display for LaunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Reuse => f.write_str("reuse"),
            Self::Start => f.write_str("start"),
            Self::Replace { previous_hash } => write!(
                f,
                "replace (was {})",
                previous_hash.as_deref().map_or("unlabelled", short_hash)
            ),
        }
    }
}

/// Decides the launch action for `spec` given the observed container.
#[must_use]
pub fn plan_launch(spec: &ServiceSpec, observed: Option<&ContainerInfo>) -> LaunchAction {
    let Some(container) = observed else {
        return LaunchAction::Create;
    };

    if container.spec_hash.as_deref() != Some(spec.spec_hash.as_str()) {
        return LaunchAction::Replace {
            previous_hash: container.spec_hash.clone(),
        };
    }

    if container.state.is_running() {
        LaunchAction::Reuse
    } else {
        LaunchAction::Start
    }
}

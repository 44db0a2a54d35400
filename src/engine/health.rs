//! HTTP readiness probing.
//!
//! A probe session polls one URL until the response status falls in the
//! accepted range, the shared deadline passes, or the run is cancelled.

use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{AirpodsError, Result};
use crate::planner::HealthContract;

/// Connection timeout for a single attempt.
const CONNECT_TIMEOUT_MILLIS: u64 = 1_500;

/// State of a probe session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HealthState {
    /// No attempt made yet.
    Pending,
    /// Attempts in progress.
    Probing,
    /// An attempt was accepted.
    Healthy,
    /// The deadline passed or the session was cancelled.
    TimedOut,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Probing => "probing",
            Self::Healthy => "healthy",
            Self::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Result of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeAttempt {
    /// HTTP status, if a response arrived.
    pub status: Option<u16>,
    /// Transport error, if no response arrived.
    pub error: Option<String>,
    /// The status was in the accepted range.
    pub accepted: bool,
}

impl ProbeAttempt {
    /// Describes the attempt for reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.status, &self.error) {
            (Some(status), _) => format!("HTTP {status}"),
            (None, Some(error)) => error.clone(),
            (None, None) => String::from("no response"),
        }
    }
}

/// Final result of a probe session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthOutcome {
    /// Terminal state.
    pub state: HealthState,
    /// Number of attempts made.
    pub attempts: u32,
    /// Last HTTP status observed.
    pub last_status: Option<u16>,
    /// Last transport error observed.
    pub last_error: Option<String>,
    /// The session was cancelled.
    pub cancelled: bool,
    /// Time spent in the session.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl HealthOutcome {
    /// Returns whether the contract was met.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state == HealthState::Healthy
    }

    /// Returns the last status or error, for reports.
    #[must_use]
    pub fn last_observation(&self) -> Option<String> {
        self.last_status
            .map(|status| format!("HTTP {status}"))
            .or_else(|| self.last_error.clone())
    }
}

/// Polls HTTP endpoints against a [`HealthContract`].
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: Client,
    interval: Duration,
    attempt_timeout: Duration,
}

impl HealthProber {
    /// Creates a prober.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(interval: Duration, attempt_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MILLIS).min(attempt_timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AirpodsError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            interval,
            attempt_timeout,
        })
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Makes one attempt with the given timeout.
    pub async fn probe_once(&self, base_url: &str, contract: &HealthContract, timeout: Duration) -> ProbeAttempt {
        let url = format!("{}{}", base_url.trim_end_matches('/'), contract.path);
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!("Probe {url} -> {status}");
                ProbeAttempt {
                    status: Some(status),
                    error: None,
                    accepted: contract.accepted.contains(status),
                }
            }
            Err(e) => {
                debug!("Probe {url} failed: {e}");
                ProbeAttempt {
                    status: None,
                    error: Some(if e.is_timeout() {
                        String::from("timed out")
                    } else if e.is_connect() {
                        String::from("connection refused")
                    } else {
                        e.to_string()
                    }),
                    accepted: false,
                }
            }
        }
    }

    /// Polls until the contract is met, `deadline` passes, or `cancel` fires.
    pub async fn wait_until_healthy(
        &self,
        base_url: &str,
        contract: &HealthContract,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> HealthOutcome {
        let started = Instant::now();
        let mut outcome = HealthOutcome {
            state: HealthState::Pending,
            attempts: 0,
            last_status: None,
            last_error: None,
            cancelled: false,
            elapsed: Duration::ZERO,
        };

        loop {
            let now = Instant::now();
            if cancel.is_cancelled() || now >= deadline {
                outcome.cancelled = cancel.is_cancelled();
                break;
            }

            outcome.state = HealthState::Probing;
            outcome.attempts += 1;
            let timeout = self.attempt_timeout.min(deadline - now);

            let attempt = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                attempt = self.probe_once(base_url, contract, timeout) => attempt,
            };

            outcome.last_status = attempt.status;
            outcome.last_error = attempt.error;
            if attempt.accepted {
                outcome.state = HealthState::Healthy;
                outcome.elapsed = started.elapsed();
                return outcome;
            }

            let next = (Instant::now() + self.interval).min(deadline);
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                () = tokio::time::sleep_until(next) => {}
            }
        }

        outcome.state = HealthState::TimedOut;
        outcome.elapsed = started.elapsed();
        outcome
    }
}

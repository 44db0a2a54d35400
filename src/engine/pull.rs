//! Bounded-concurrency image pulls.
//!
//! Each job runs in its own task behind a shared semaphore. Jobs report
//! independently: a failed pull only marks the services that need that
//! image. There are no retries.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::planner::ServiceSpec;

use super::gateway::EngineGateway;

/// When to pull an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Only pull images not present locally.
    IfMissing,
    /// Pull every image.
    Always,
}

/// One image to pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullJob {
    /// Image reference.
    pub image: String,
    /// Services that run this image.
    pub services: Vec<String>,
}

/// How a pull ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum PullOutcome {
    /// Downloaded.
    Pulled,
    /// Already present; nothing done.
    AlreadyPresent,
    /// The engine reported an error.
    Failed {
        /// Engine message.
        reason: String,
    },
    /// Interrupted before completion.
    Cancelled,
}

impl PullOutcome {
    /// Returns whether the image is usable afterwards.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Pulled | Self::AlreadyPresent)
    }
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulled => f.write_str("pulled"),
            Self::AlreadyPresent => f.write_str("present"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one pull job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullResult {
    /// The job.
    pub job: PullJob,
    /// Its outcome.
    pub outcome: PullOutcome,
    /// Wall time spent, including waiting for a slot.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Runs pull jobs with at most N in flight.
#[derive(Debug, Clone, Copy)]
pub struct PullScheduler {
    max_concurrent: usize,
}

impl PullScheduler {
    /// Creates a scheduler; `max_concurrent` is clamped to at least 1.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Forces one pull at a time.
    #[must_use]
    pub const fn sequential(self) -> Self {
        Self { max_concurrent: 1 }
    }

    /// Returns the concurrency bound.
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Groups specs into one job per distinct image.
    #[must_use]
    pub fn jobs_for(specs: &[&ServiceSpec]) -> Vec<PullJob> {
        let mut by_image: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for spec in specs {
            by_image
                .entry(spec.image.as_str())
                .or_default()
                .push(spec.name.clone());
        }
        by_image
            .into_iter()
            .map(|(image, services)| PullJob {
                image: image.to_string(),
                services,
            })
            .collect()
    }

    /// Runs the jobs and returns one result per job, sorted by image.
    ///
    /// With [`PullPolicy::IfMissing`], images in `present` are reported as
    /// already present without touching the engine. Cancellation makes
    /// waiting and in-flight jobs report [`PullOutcome::Cancelled`].
    pub async fn run(
        &self,
        gateway: Arc<dyn EngineGateway>,
        jobs: Vec<PullJob>,
        policy: PullPolicy,
        present: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Vec<PullResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut results = Vec::with_capacity(jobs.len());
        let mut pending = Vec::new();

        for job in jobs {
            if policy == PullPolicy::IfMissing && present.contains(&job.image) {
                debug!("Image {} already present", job.image);
                results.push(PullResult {
                    job,
                    outcome: PullOutcome::AlreadyPresent,
                    elapsed: Duration::ZERO,
                });
                continue;
            }

            pending.push(job.clone());
            let gateway = Arc::clone(&gateway);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let started = Instant::now();
                let image = job.image.clone();
                let pull = async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return PullOutcome::Failed {
                            reason: String::from("pull scheduler closed"),
                        };
                    };
                    info!("Pulling {image}");
                    match gateway.pull_image(&image).await {
                        Ok(()) => PullOutcome::Pulled,
                        Err(e) => PullOutcome::Failed {
                            reason: e.to_string(),
                        },
                    }
                };

                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => PullOutcome::Cancelled,
                    outcome = pull => outcome,
                };

                PullResult {
                    job,
                    outcome,
                    elapsed: started.elapsed(),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    match &result.outcome {
                        PullOutcome::Failed { reason } => {
                            warn!("Pull of {} failed: {reason}", result.job.image);
                        }
                        PullOutcome::Pulled => {
                            info!("Pulled {} in {:.1}s", result.job.image, result.elapsed.as_secs_f64());
                        }
                        _ => {}
                    }
                    results.push(result);
                }
                Err(e) => warn!("Pull task ended abnormally: {e}"),
            }
        }

        // Jobs whose task died without reporting still get a result.
        for job in pending {
            if !results.iter().any(|r| r.job.image == job.image) {
                results.push(PullResult {
                    job,
                    outcome: PullOutcome::Failed {
                        reason: String::from("pull task ended without a result"),
                    },
                    elapsed: Duration::ZERO,
                });
            }
        }

        results.sort_by(|a, b| a.job.image.cmp(&b.job.image));
        results
    }
}

//! Status polling for long-running server-side jobs.
//!
//! [`PollingJobRunner::run`] fetches a job's status every
//! [`PollConfig::interval`] until it reaches a terminal state, reporting
//! progress along the way and exactly one terminal outcome to a
//! [`PollObserver`]. The loop stops as soon as its [`CancellationToken`] is
//! triggered (slice reset, cancel succeeded, store shutdown).

use std::sync::Arc;
use std::time::Duration;

use optiboard_core::{job_result, JobApi, JobId, JobStatus, Payload, PollConfig, RequestError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Floor for the tick period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Receives what the runner observes about one job.
pub trait PollObserver: Send + Sync {
    fn on_progress(&self, job_id: &JobId, progress: Option<f64>);
    fn on_succeeded(&self, job_id: &JobId, result: Payload);
    fn on_failed(&self, job_id: &JobId, error: RequestError);
}

/// Why the polling loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed,
    /// The cancellation token fired first. Nothing terminal was reported.
    Stopped,
}

/// Drives status polls of a single job.
pub struct PollingJobRunner {
    api: Arc<dyn JobApi>,
    config: PollConfig,
}

impl PollingJobRunner {
    pub fn new(api: Arc<dyn JobApi>, config: PollConfig) -> Self {
        Self { api, config }
    }

    /// Poll `job_id` until it is terminal or `cancel` fires.
    ///
    /// A status request already in flight is never aborted; its response is
    /// dropped if the token fired in the meantime.
    pub async fn run(
        &self,
        job_id: &JobId,
        observer: &dyn PollObserver,
        cancel: &CancellationToken,
    ) -> PollOutcome {
        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let max_failures = self.config.max_consecutive_failures.max(1);
        let mut consecutive_failures = 0u32;
        let mut attempt = 0u64;

        tracing::debug!(
            job_id = %job_id,
            interval_ms = self.config.interval.as_millis() as u64,
            max_failures,
            "Job polling started",
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return stopped(job_id, attempt),
                _ = ticker.tick() => {}
            }

            attempt += 1;
            let result = self.api.get_status(job_id).await;
            if cancel.is_cancelled() {
                return stopped(job_id, attempt);
            }

            match result {
                Ok(snapshot) => {
                    consecutive_failures = 0;
                    match snapshot.status {
                        JobStatus::Pending | JobStatus::Running => {
                            observer.on_progress(job_id, snapshot.progress);
                        }
                        JobStatus::Succeeded => {
                            tracing::info!(job_id = %job_id, attempt, "Job succeeded");
                            observer.on_succeeded(job_id, job_result(snapshot.result, job_id));
                            return PollOutcome::Succeeded;
                        }
                        JobStatus::Failed => {
                            let error = snapshot.error.unwrap_or_else(|| {
                                RequestError::job_failed(format!("job {job_id} failed"))
                            });
                            tracing::warn!(job_id = %job_id, attempt, error = %error, "Job failed");
                            observer.on_failed(job_id, error);
                            return PollOutcome::Failed;
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= max_failures {
                        tracing::error!(
                            job_id = %job_id,
                            attempt,
                            consecutive_failures,
                            error = %e,
                            "Giving up on job status polling",
                        );
                        observer.on_failed(job_id, e);
                        return PollOutcome::Failed;
                    }
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        consecutive_failures,
                        error = %e,
                        "Status poll failed",
                    );
                }
            }
        }
    }
}

fn stopped(job_id: &JobId, attempt: u64) -> PollOutcome {
    tracing::debug!(job_id = %job_id, attempt, "Job polling stopped");
    PollOutcome::Stopped
}

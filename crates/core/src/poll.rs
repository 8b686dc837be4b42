//! Polled job state and polling configuration.

use std::time::Duration;

use serde::Serialize;

use crate::error::{CoreError, RequestError};
use crate::job::{CancelStart, CancelableJobState, CloseDecision, JobLifecycle};
use crate::request::RequestState;
use crate::types::{Generation, JobId};

/// Default delay between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of consecutive poll failures tolerated before the job is
/// reported as failed.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Tunable parameters for status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between two status requests.
    pub interval: Duration,
    /// Consecutive failed polls that escalate to a job failure.
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }
}

impl PollConfig {
    /// Reject settings a poller cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::Validation(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(CoreError::Validation(
                "poll failure threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PollJobState
// ---------------------------------------------------------------------------

/// A cancelable job whose status is polled until it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollJobState<T> {
    #[serde(flatten)]
    pub job: CancelableJobState<T>,
    /// Fraction complete in `[0, 1]`, `None` while unknown.
    pub progress: Option<f64>,
    /// True while a poller is attached to `job.job_id`.
    pub polling: bool,
}

impl<T> Default for PollJobState<T> {
    fn default() -> Self {
        Self {
            job: CancelableJobState::default(),
            progress: None,
            polling: false,
        }
    }
}

impl<T: Clone> PollJobState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn stopped(job: CancelableJobState<T>) -> Self {
        Self {
            job,
            progress: None,
            polling: false,
        }
    }

    fn with_job(&self, job: CancelableJobState<T>) -> Self {
        Self {
            job,
            progress: self.progress,
            polling: self.polling,
        }
    }

    /// Apply a progress report from the poller.
    ///
    /// Progress never moves backwards for the same job and is clamped to
    /// `[0, 1]`; an unknown report keeps the last known value.
    pub fn record_progress(
        &self,
        generation: Generation,
        job_id: &JobId,
        progress: Option<f64>,
    ) -> Result<Self, CoreError> {
        self.job.request.ensure_current(generation)?;
        if !self.polling || self.job.job_id.as_ref() != Some(job_id) {
            return Err(CoreError::StaleResponse {
                current: self.job.request.generation,
                received: generation,
            });
        }

        let reported = progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 1.0));
        let progress = match (self.progress, reported) {
            (Some(current), Some(new)) => Some(current.max(new)),
            (current, None) => current,
            (None, new) => new,
        };
        Ok(Self {
            progress,
            ..self.clone()
        })
    }

    pub fn invariants_hold(&self) -> bool {
        self.job.invariants_hold()
            && self.progress.map_or(true, |p| (0.0..=1.0).contains(&p))
            && (!self.polling || self.job.job_id.is_some())
    }
}

impl<T: Clone> JobLifecycle for PollJobState<T> {
    type Value = T;

    fn start(&self) -> (Self, Generation) {
        let (job, generation) = self.job.start();
        (Self::stopped(job), generation)
    }

    fn job_created(&self, generation: Generation, job_id: JobId) -> Result<Self, CoreError> {
        let job = self.job.job_created(generation, job_id)?;
        Ok(Self {
            job,
            progress: None,
            polling: true,
        })
    }

    fn succeed(&self, generation: Generation, value: T) -> Result<Self, CoreError> {
        let job = self.job.succeed(generation, value)?;
        Ok(Self {
            job,
            progress: Some(1.0),
            polling: false,
        })
    }

    fn fail(&self, generation: Generation, error: RequestError) -> Result<Self, CoreError> {
        let job = self.job.fail(generation, error)?;
        Ok(Self {
            job,
            progress: self.progress,
            polling: false,
        })
    }

    fn start_cancel(&self) -> Result<CancelStart<Self>, CoreError> {
        Ok(match self.job.start_cancel()? {
            CancelStart::Local(job) => CancelStart::Local(Self::stopped(job)),
            // The job keeps running until the cancel call succeeds.
            remote => remote.map(|job| self.with_job(job)),
        })
    }

    fn cancel_succeed(&self, cancel_generation: Generation) -> Result<(Self, bool), CoreError> {
        let (job, closed) = self.job.cancel_succeed(cancel_generation)?;
        Ok((Self::stopped(job), closed))
    }

    fn cancel_fail(
        &self,
        cancel_generation: Generation,
        error: RequestError,
    ) -> Result<Self, CoreError> {
        let job = self.job.cancel_fail(cancel_generation, error)?;
        Ok(self.with_job(job))
    }

    fn request_close(&self) -> Result<CloseDecision<Self>, CoreError> {
        Ok(match self.job.request_close()? {
            CloseDecision::Immediate(job) => CloseDecision::Immediate(Self::stopped(job)),
            deferred => deferred.map(|job| self.with_job(job)),
        })
    }

    fn reset(&self) -> Self {
        Self::stopped(self.job.reset())
    }

    fn request(&self) -> &RequestState<T> {
        &self.job.request
    }

    fn job_id(&self) -> Option<&JobId> {
        self.job.job_id.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

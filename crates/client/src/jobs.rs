//! Server-side job records and their mapping onto [`JobStatus`].

use optiboard_core::{JobStatus, RequestError};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServerJobStatus
// ---------------------------------------------------------------------------

/// Job status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerJobStatus {
    Pending,
    Started,
    Canceling,
    Completed,
    Canceled,
    Error,
    /// Any status this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl ServerJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerJobStatus::Pending => "pending",
            ServerJobStatus::Started => "started",
            ServerJobStatus::Canceling => "canceling",
            ServerJobStatus::Completed => "completed",
            ServerJobStatus::Canceled => "canceled",
            ServerJobStatus::Error => "error",
            ServerJobStatus::Unknown => "unknown",
        }
    }

    /// Collapse onto the four lifecycle states the store understands.
    ///
    /// A job being torn down still counts as running; a cancelled one is a
    /// failure from the job's point of view.
    pub fn to_job_status(self) -> JobStatus {
        match self {
            ServerJobStatus::Pending | ServerJobStatus::Unknown => JobStatus::Pending,
            ServerJobStatus::Started | ServerJobStatus::Canceling => JobStatus::Running,
            ServerJobStatus::Completed => JobStatus::Succeeded,
            ServerJobStatus::Canceled | ServerJobStatus::Error => JobStatus::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// ServerJob
// ---------------------------------------------------------------------------

/// Step/iteration counters of a running job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// True when the server cannot estimate completion.
    #[serde(default)]
    pub iter_indefinite: bool,
    /// Fraction of the current step already done.
    #[serde(default)]
    pub iter_val: f64,
    #[serde(default)]
    pub num_steps: u32,
    #[serde(default)]
    pub step_index: u32,
}

impl JobProgress {
    /// Overall completion in `[0, 1]`, or `None` when indefinite.
    pub fn fraction(&self) -> Option<f64> {
        if self.iter_indefinite {
            return None;
        }
        let steps = f64::from(self.num_steps.max(1));
        let done = f64::from(self.step_index) + self.iter_val;
        Some((done / steps).clamp(0.0, 1.0))
    }
}

/// A job record as returned under the `job` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerJob {
    pub job_id: String,
    pub status: ServerJobStatus,
    #[serde(default)]
    pub progress: Option<JobProgress>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ServerJob {
    pub fn progress_fraction(&self) -> Option<f64> {
        self.progress.as_ref().and_then(JobProgress::fraction)
    }

    /// Error to surface for a job that ended without success.
    pub fn failure(&self) -> RequestError {
        let message = match (self.status, &self.error) {
            (_, Some(error)) if !error.is_empty() => error.clone(),
            (ServerJobStatus::Canceled, _) => format!("job {} was canceled", self.job_id),
            _ => format!("job {} failed", self.job_id),
        };
        RequestError::job_failed(message).with_code(self.status.as_str())
    }
}

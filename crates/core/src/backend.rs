//! Contracts for the collaborators the store calls out to.
//!
//! The transport lives elsewhere; implementations are responsible for their
//! own per-call timeouts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::status::JobStatus;
use crate::types::{JobId, Payload};

/// Response to a job creation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCreated {
    pub job_id: JobId,
    pub initial_status: JobStatus,
    /// Payload returned with the creation response, if any.
    pub result: Option<Payload>,
}

/// One observation of a job's server-side status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Fraction complete in `[0, 1]`, when the server knows it.
    pub progress: Option<f64>,
    pub result: Option<Payload>,
    pub error: Option<RequestError>,
}

impl JobSnapshot {
    pub fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            progress: None,
            result: None,
            error: None,
        }
    }

    pub fn running(progress: f64) -> Self {
        Self {
            status: JobStatus::Running,
            progress: Some(progress),
            result: None,
            error: None,
        }
    }

    pub fn succeeded(result: Payload) -> Self {
        Self {
            status: JobStatus::Succeeded,
            progress: Some(1.0),
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: RequestError) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            result: None,
            error: Some(error),
        }
    }
}

/// Value committed for a finished job.
///
/// Jobs that report success without a result (or with a JSON `null`) are
/// represented by a reference to the job so a succeeded slice always holds a
/// value.
pub fn job_result(result: Option<Payload>, job_id: &JobId) -> Payload {
    match result {
        Some(value) if !value.is_null() => value,
        _ => serde_json::json!({ "job_id": job_id }),
    }
}

/// Plain fetch backing a request slice.
#[async_trait]
pub trait RequestSource: Send + Sync {
    async fn fetch(&self, params: &Payload) -> Result<Payload, RequestError>;
}

/// Server-side job API backing cancelable and polled slices.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create the job. Fails with network or validation errors.
    async fn create(&self, params: &Payload) -> Result<JobCreated, RequestError>;

    /// Fetch the current status of a job.
    async fn get_status(&self, job_id: &JobId) -> Result<JobSnapshot, RequestError>;

    /// Cancel (and tear down) a job.
    async fn cancel(&self, job_id: &JobId) -> Result<JobStatus, RequestError>;

    /// Called once no slice refers to `job_id` any more (closed, reset,
    /// superseded, or created for an abandoned attempt). Drop any per-job
    /// bookkeeping here.
    async fn release(&self, _job_id: &JobId) {}
}

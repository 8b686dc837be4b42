//! Scripted collaborators shared by the store integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use optiboard_core::{
    JobApi, JobCreated, JobId, JobSnapshot, JobStatus, Payload, PollConfig, RequestError,
    RequestSource,
};
use serde_json::json;
use tokio::sync::Notify;

/// Poll configuration fast enough for tests.
pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(10),
        max_consecutive_failures: 3,
    }
}

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// ScriptedJobApi
// ---------------------------------------------------------------------------

/// `JobApi` that replays a fixed status script.
///
/// Once the script is exhausted the last entry repeats. Created jobs are
/// named `{prefix}` for the first one and `{prefix}-{n}` afterwards.
pub struct ScriptedJobApi {
    prefix: String,
    script: Mutex<VecDeque<Result<JobSnapshot, RequestError>>>,
    last: Mutex<Option<Result<JobSnapshot, RequestError>>>,
    create_delay: Option<Duration>,
    cancel_gate: Option<Arc<Notify>>,
    fail_cancel: AtomicBool,
    pub create_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    status_log: Mutex<Vec<JobId>>,
}

impl ScriptedJobApi {
    pub fn new(prefix: &str, script: Vec<Result<JobSnapshot, RequestError>>) -> Self {
        Self {
            prefix: prefix.to_string(),
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            create_delay: None,
            cancel_gate: None,
            fail_cancel: AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            status_log: Mutex::new(Vec::new()),
        }
    }

    /// Job that stays Running forever.
    pub fn running_forever(prefix: &str) -> Self {
        Self::new(prefix, vec![Ok(JobSnapshot::running(0.5))])
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    /// Block every cancel call until `gate` is notified.
    pub fn with_cancel_gate(mut self, gate: Arc<Notify>) -> Self {
        self.cancel_gate = Some(gate);
        self
    }

    pub fn fail_cancels(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Status calls made for `job_id`.
    pub fn polls_for(&self, job_id: &str) -> usize {
        self.status_log
            .lock()
            .unwrap()
            .iter()
            .filter(|id| id.as_str() == job_id)
            .count()
    }
}

#[async_trait]
impl JobApi for ScriptedJobApi {
    async fn create(&self, _params: &Payload) -> Result<JobCreated, RequestError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        let job_id = if n == 1 {
            self.prefix.clone()
        } else {
            format!("{}-{n}", self.prefix)
        };
        Ok(JobCreated {
            job_id: JobId::new(job_id),
            initial_status: JobStatus::Pending,
            result: None,
        })
    }

    async fn get_status(&self, job_id: &JobId) -> Result<JobSnapshot, RequestError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.status_log.lock().unwrap().push(job_id.clone());

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(entry) => {
                *last = Some(entry.clone());
                entry
            }
            None => last
                .clone()
                .unwrap_or_else(|| Ok(JobSnapshot::pending())),
        }
    }

    async fn cancel(&self, _job_id: &JobId) -> Result<JobStatus, RequestError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.cancel_gate {
            gate.notified().await;
        }
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(RequestError::network("cancel refused"));
        }
        Ok(JobStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// CountingSource
// ---------------------------------------------------------------------------

/// `RequestSource` that echoes `params.tag` after `params.delay_ms`.
///
/// Responds with `{"tag": <tag>, "call": <n>}`. A `fail` param yields a
/// network error instead.
#[derive(Default)]
pub struct CountingSource {
    pub calls: AtomicUsize,
    pub last_params: Mutex<Option<Payload>>,
}

impl CountingSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RequestSource for CountingSource {
    async fn fetch(&self, params: &Payload) -> Result<Payload, RequestError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_params.lock().unwrap() = Some(params.clone());

        if let Some(ms) = params.get("delay_ms").and_then(Payload::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        if params.get("fail").is_some() {
            return Err(RequestError::network("connection refused"));
        }
        Ok(json!({ "tag": params.get("tag").cloned().unwrap_or_default(), "call": call }))
    }
}

//! Integration tests for `PollingJobRunner`.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{fast_poll, ScriptedJobApi};
use optiboard_core::{ErrorKind, JobId, JobSnapshot, JobStatus, Payload, PollConfig, RequestError};
use optiboard_store::{PollObserver, PollOutcome, PollingJobRunner};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Progress(Option<f64>),
    Succeeded(Payload),
    Failed(ErrorKind),
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

impl PollObserver for Recorder {
    fn on_progress(&self, _job_id: &JobId, progress: Option<f64>) {
        self.seen.lock().unwrap().push(Seen::Progress(progress));
    }

    fn on_succeeded(&self, _job_id: &JobId, result: Payload) {
        self.seen.lock().unwrap().push(Seen::Succeeded(result));
    }

    fn on_failed(&self, _job_id: &JobId, error: RequestError) {
        self.seen.lock().unwrap().push(Seen::Failed(error.kind));
    }
}

// ---------------------------------------------------------------------------
// Test: progress is reported until the job succeeds, then polling stops
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reports_progress_then_single_success() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-1",
        vec![
            Ok(JobSnapshot::pending()),
            Ok(JobSnapshot::running(0.3)),
            Ok(JobSnapshot::running(0.7)),
            Ok(JobSnapshot::succeeded(json!({"profile_id": "prof-1"}))),
        ],
    ));
    let runner = PollingJobRunner::new(api.clone(), fast_poll());
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-1"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Succeeded);
    assert_eq!(
        recorder.seen(),
        vec![
            Seen::Progress(None),
            Seen::Progress(Some(0.3)),
            Seen::Progress(Some(0.7)),
            Seen::Succeeded(json!({"profile_id": "prof-1"})),
        ]
    );
    assert_eq!(api.polls(), 4);
}

// ---------------------------------------------------------------------------
// Test: a failed job is reported once with its error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_reports_failure() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-2",
        vec![
            Ok(JobSnapshot::running(0.2)),
            Ok(JobSnapshot::failed(RequestError::job_failed("out of memory"))),
        ],
    ));
    let runner = PollingJobRunner::new(api, fast_poll());
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-2"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Failed);
    assert_eq!(
        recorder.seen(),
        vec![Seen::Progress(Some(0.2)), Seen::Failed(ErrorKind::JobFailed)]
    );
}

// ---------------------------------------------------------------------------
// Test: consecutive poll errors escalate at the threshold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consecutive_errors_escalate_to_failure() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-3",
        vec![Err(RequestError::network("connection reset"))],
    ));
    let runner = PollingJobRunner::new(api.clone(), fast_poll());
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-3"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Failed);
    assert_eq!(recorder.seen(), vec![Seen::Failed(ErrorKind::Network)]);
    assert_eq!(api.polls(), 3);
}

// ---------------------------------------------------------------------------
// Test: a successful poll resets the failure counter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_errors_below_threshold_are_tolerated() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-4",
        vec![
            Err(RequestError::network("timeout")),
            Err(RequestError::network("timeout")),
            Ok(JobSnapshot::running(0.5)),
            Err(RequestError::network("timeout")),
            Err(RequestError::network("timeout")),
            Ok(JobSnapshot::succeeded(json!({"ok": true}))),
        ],
    ));
    let runner = PollingJobRunner::new(api.clone(), fast_poll());
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-4"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Succeeded);
    assert_eq!(
        recorder.seen(),
        vec![Seen::Progress(Some(0.5)), Seen::Succeeded(json!({"ok": true}))]
    );
    assert_eq!(api.polls(), 6);
}

// ---------------------------------------------------------------------------
// Test: a cancelled token stops the loop before any status call
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_token_stops_without_polling() {
    let api = Arc::new(ScriptedJobApi::running_forever("perf-5"));
    let runner = PollingJobRunner::new(api.clone(), fast_poll());
    let recorder = Recorder::default();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = runner.run(&JobId::from("perf-5"), &recorder, &cancel).await;

    assert_eq!(outcome, PollOutcome::Stopped);
    assert!(recorder.seen().is_empty());
    assert_eq!(api.polls(), 0);
}

// ---------------------------------------------------------------------------
// Test: cancelling mid-run stops further status calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_mid_run_stops_polling() {
    let api = Arc::new(ScriptedJobApi::running_forever("perf-6"));
    let runner = PollingJobRunner::new(api.clone(), fast_poll());
    let recorder = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();

    let handle = {
        let cancel = cancel.clone();
        let recorder = recorder.clone();
        tokio::spawn(async move {
            runner
                .run(&JobId::from("perf-6"), recorder.as_ref(), &cancel)
                .await
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(55)).await;
    cancel.cancel();
    let outcome = handle.await.unwrap();
    let polls = api.polls();

    assert_eq!(outcome, PollOutcome::Stopped);
    assert!(polls >= 1);
    assert!(recorder
        .seen()
        .iter()
        .all(|seen| matches!(seen, Seen::Progress(_))));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(api.polls(), polls);
}

// ---------------------------------------------------------------------------
// Test: success without a result still reports a value
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_without_result_reports_job_reference() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-7",
        vec![Ok(JobSnapshot {
            status: JobStatus::Succeeded,
            progress: None,
            result: None,
            error: None,
        })],
    ));
    let runner = PollingJobRunner::new(api, fast_poll());
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-7"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Succeeded);
    assert_eq!(recorder.seen(), vec![Seen::Succeeded(json!({"job_id": "perf-7"}))]);
}

// ---------------------------------------------------------------------------
// Test: a zero interval does not panic the runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_interval_still_polls_to_completion() {
    let api = Arc::new(ScriptedJobApi::new(
        "perf-8",
        vec![
            Ok(JobSnapshot::running(0.5)),
            Ok(JobSnapshot::succeeded(json!({"profile_id": "prof-8"}))),
        ],
    ));
    let config = PollConfig {
        interval: Duration::ZERO,
        max_consecutive_failures: 3,
    };
    let runner = PollingJobRunner::new(api.clone(), config);
    let recorder = Recorder::default();

    let outcome = runner
        .run(&JobId::from("perf-8"), &recorder, &CancellationToken::new())
        .await;

    assert_eq!(outcome, PollOutcome::Succeeded);
    assert_eq!(api.polls(), 2);
}

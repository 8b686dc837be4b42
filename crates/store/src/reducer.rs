//! Pure slice reducer.
//!
//! [`reduce`] maps the current snapshot of a slice plus one message to the
//! next snapshot and the side effects the scheduler must run. It never
//! performs I/O, which keeps every transition testable in isolation.

use optiboard_core::{
    job_result, CancelStart, CloseDecision, CoreError, Generation, JobCreated, JobId, JobLifecycle,
    JobStatus, Payload, PollJobState, RequestError, RequestState, RequestStatus, SliceKind,
    SliceState,
};

// ---------------------------------------------------------------------------
// Messages and effects
// ---------------------------------------------------------------------------

/// Input to a slice: a view action or a backend completion.
#[derive(Debug, Clone, PartialEq)]
pub enum SliceMessage {
    Start {
        params: Payload,
    },
    StartCancel,
    Reset,
    Close,
    Fetched {
        generation: Generation,
        result: Result<Payload, RequestError>,
    },
    JobCreated {
        generation: Generation,
        result: Result<JobCreated, RequestError>,
    },
    Progress {
        generation: Generation,
        job_id: JobId,
        progress: Option<f64>,
    },
    JobFinished {
        generation: Generation,
        job_id: JobId,
        result: Result<Payload, RequestError>,
    },
    CancelFinished {
        cancel_generation: Generation,
        result: Result<(), RequestError>,
    },
}

impl SliceMessage {
    /// Short operation name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            SliceMessage::Start { .. } => "start",
            SliceMessage::StartCancel => "start_cancel",
            SliceMessage::Reset => "reset",
            SliceMessage::Close => "close",
            SliceMessage::Fetched { .. } => "fetched",
            SliceMessage::JobCreated { .. } => "job_created",
            SliceMessage::Progress { .. } => "progress",
            SliceMessage::JobFinished { .. } => "job_finished",
            SliceMessage::CancelFinished { .. } => "cancel_finished",
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call the slice's request source.
    Fetch { generation: Generation, params: Payload },
    /// Call the job API's create.
    Create { generation: Generation, params: Payload },
    /// Call the job API's cancel.
    Cancel {
        cancel_generation: Generation,
        job_id: JobId,
    },
    /// Attach a poller to `job_id`, replacing any previous one.
    StartPolling { generation: Generation, job_id: JobId },
    /// Detach the slice's poller, if any.
    StopPolling,
    /// The slice was closed. `succeeded` is true when the job had completed
    /// successfully before the close.
    Closed { succeeded: bool },
}

/// Next snapshot plus the effects to run after committing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub state: SliceState,
    pub effects: Vec<Effect>,
}

impl Reduced {
    fn new(state: impl Into<SliceState>) -> Self {
        Self {
            state: state.into(),
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Apply `message` to `state`.
///
/// Stale completions come back as [`CoreError::StaleResponse`]; messages a
/// slice kind does not understand as [`CoreError::Unsupported`].
pub fn reduce(state: &SliceState, message: SliceMessage) -> Result<Reduced, CoreError> {
    match state {
        SliceState::Request(s) => reduce_request(s, message),
        SliceState::Cancelable(s) => reduce_job(s, message, SliceKind::Cancelable),
        SliceState::Poll(s) => reduce_poll(s, message),
    }
}

fn reduce_request(
    state: &RequestState<Payload>,
    message: SliceMessage,
) -> Result<Reduced, CoreError> {
    match message {
        SliceMessage::Start { params } => {
            let (next, generation) = state.start();
            Ok(Reduced::new(next).with(Effect::Fetch { generation, params }))
        }
        SliceMessage::Fetched { generation, result } => {
            let next = match result {
                Ok(value) if value.is_null() => {
                    state.fail(generation, RequestError::network("empty response"))?
                }
                Ok(value) => state.succeed(generation, value)?,
                Err(error) => state.fail(generation, error)?,
            };
            Ok(Reduced::new(next))
        }
        SliceMessage::Reset => Ok(Reduced::new(state.reset())),
        SliceMessage::Close => {
            Ok(Reduced::new(state.reset()).with(Effect::Closed { succeeded: false }))
        }
        other => Err(unsupported(&other, SliceKind::Request)),
    }
}

fn reduce_poll(state: &PollJobState<Payload>, message: SliceMessage) -> Result<Reduced, CoreError> {
    match message {
        SliceMessage::Progress {
            generation,
            job_id,
            progress,
        } => Ok(Reduced::new(state.record_progress(
            generation, &job_id, progress,
        )?)),
        other => reduce_job(state, other, SliceKind::Poll),
    }
}

fn reduce_job<S>(state: &S, message: SliceMessage, kind: SliceKind) -> Result<Reduced, CoreError>
where
    S: JobLifecycle<Value = Payload> + Into<SliceState>,
{
    let polled = kind == SliceKind::Poll;
    match message {
        SliceMessage::Start { params } => {
            let (next, generation) = state.start();
            Ok(Reduced::new(next)
                .with(Effect::StopPolling)
                .with(Effect::Create { generation, params }))
        }
        SliceMessage::JobCreated {
            generation,
            result: Err(error),
        } => Ok(Reduced::new(state.fail(generation, error)?)),
        SliceMessage::JobCreated {
            generation,
            result: Ok(created),
        } => {
            let next = state.job_created(generation, created.job_id.clone())?;
            if created.initial_status == JobStatus::Failed {
                let error = RequestError::job_failed(format!(
                    "job {} failed on creation",
                    created.job_id
                ));
                return Ok(Reduced::new(next.fail(generation, error)?));
            }
            if polled {
                return Ok(Reduced::new(next).with(Effect::StartPolling {
                    generation,
                    job_id: created.job_id,
                }));
            }
            let value = job_result(created.result, &created.job_id);
            Ok(Reduced::new(next.succeed(generation, value)?))
        }
        SliceMessage::JobFinished {
            generation,
            job_id,
            result,
        } => {
            if state.job_id() != Some(&job_id) {
                return Err(CoreError::StaleResponse {
                    current: state.request().generation,
                    received: generation,
                });
            }
            let next = match result {
                Ok(value) => state.succeed(generation, job_result(Some(value), &job_id))?,
                Err(error) => state.fail(generation, error)?,
            };
            Ok(Reduced::new(next).with(Effect::StopPolling))
        }
        SliceMessage::StartCancel => match state.start_cancel()? {
            CancelStart::Local(next) => Ok(Reduced::new(next).with(Effect::StopPolling)),
            CancelStart::Remote {
                state: next,
                job_id,
                cancel_generation,
            } => Ok(Reduced::new(next).with(Effect::Cancel {
                cancel_generation,
                job_id,
            })),
        },
        SliceMessage::CancelFinished {
            cancel_generation,
            result: Ok(()),
        } => {
            let (next, closed) = state.cancel_succeed(cancel_generation)?;
            let reduced = Reduced::new(next).with(Effect::StopPolling);
            Ok(if closed {
                reduced.with(Effect::Closed { succeeded: false })
            } else {
                reduced
            })
        }
        SliceMessage::CancelFinished {
            cancel_generation,
            result: Err(error),
        } => Ok(Reduced::new(state.cancel_fail(cancel_generation, error)?)),
        SliceMessage::Close => {
            let succeeded = state.request().status == RequestStatus::Succeeded;
            match state.request_close()? {
                CloseDecision::Immediate(next) => Ok(Reduced::new(next)
                    .with(Effect::StopPolling)
                    .with(Effect::Closed { succeeded })),
                CloseDecision::Deferred { state: next, cancel } => {
                    let reduced = Reduced::new(next);
                    Ok(match cancel {
                        Some((job_id, cancel_generation)) => reduced.with(Effect::Cancel {
                            cancel_generation,
                            job_id,
                        }),
                        None => reduced,
                    })
                }
            }
        }
        SliceMessage::Reset => Ok(Reduced::new(state.reset()).with(Effect::StopPolling)),
        other => Err(unsupported(&other, kind)),
    }
}

fn unsupported(message: &SliceMessage, kind: SliceKind) -> CoreError {
    CoreError::Unsupported {
        op: message.name(),
        kind: kind.as_str(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn apply(state: &SliceState, message: SliceMessage) -> Reduced {
        reduce(state, message).expect("transition should apply")
    }

    fn start(state: &SliceState) -> (SliceState, Generation) {
        let reduced = apply(state, SliceMessage::Start { params: json!({}) });
        let generation = reduced.state.request().generation;
        (reduced.state, generation)
    }

    fn created(job: &str, generation: Generation) -> SliceMessage {
        SliceMessage::JobCreated {
            generation,
            result: Ok(JobCreated {
                job_id: JobId::from(job),
                initial_status: JobStatus::Pending,
                result: None,
            }),
        }
    }

    #[test]
    fn request_start_emits_fetch() {
        let state = SliceState::idle(SliceKind::Request);
        let reduced = apply(&state, SliceMessage::Start { params: json!({"page": 1}) });
        assert_eq!(reduced.state.status(), RequestStatus::Loading);
        assert_matches!(
            reduced.effects.as_slice(),
            [Effect::Fetch { params, .. }] if params == &json!({"page": 1})
        );
    }

    #[test]
    fn request_slice_rejects_cancel() {
        let state = SliceState::idle(SliceKind::Request);
        assert_matches!(
            reduce(&state, SliceMessage::StartCancel),
            Err(CoreError::Unsupported { op: "start_cancel", kind: "request" })
        );
    }

    #[test]
    fn stale_fetch_is_reported_as_stale() {
        let state = SliceState::idle(SliceKind::Request);
        let (state, g1) = start(&state);
        let (state, g2) = start(&state);
        let state = apply(
            &state,
            SliceMessage::Fetched {
                generation: g2,
                result: Ok(json!("new")),
            },
        )
        .state;

        let err = reduce(
            &state,
            SliceMessage::Fetched {
                generation: g1,
                result: Ok(json!("old")),
            },
        )
        .unwrap_err();
        assert!(err.is_stale());
        assert_eq!(state.value(), Some(&json!("new")));
    }

    #[test]
    fn polled_job_created_starts_polling() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let reduced = apply(&state, created("opt-1", g));
        assert_matches!(
            reduced.effects.as_slice(),
            [Effect::StartPolling { job_id, .. }] if job_id == &JobId::from("opt-1")
        );
        assert_eq!(reduced.state.job_id(), Some(&JobId::from("opt-1")));
    }

    #[test]
    fn cancelable_job_created_succeeds_immediately() {
        let state = SliceState::idle(SliceKind::Cancelable);
        let (state, g) = start(&state);
        let reduced = apply(&state, created("optim-3", g));
        assert_eq!(reduced.state.status(), RequestStatus::Succeeded);
        assert_eq!(reduced.state.value(), Some(&json!({"job_id": "optim-3"})));
        assert!(reduced.effects.is_empty());
    }

    #[test]
    fn job_created_with_failed_status_fails() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let reduced = apply(
            &state,
            SliceMessage::JobCreated {
                generation: g,
                result: Ok(JobCreated {
                    job_id: JobId::from("perf-1"),
                    initial_status: JobStatus::Failed,
                    result: None,
                }),
            },
        );
        assert_eq!(reduced.state.status(), RequestStatus::Failed);
        assert!(reduced.effects.is_empty());
    }

    #[test]
    fn cancel_without_job_is_local() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, _) = start(&state);
        let reduced = apply(&state, SliceMessage::StartCancel);
        assert_eq!(reduced.state.status(), RequestStatus::Idle);
        assert_eq!(reduced.effects, vec![Effect::StopPolling]);
    }

    #[test]
    fn finished_for_other_job_is_stale() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let state = apply(&state, created("perf-1", g)).state;
        let err = reduce(
            &state,
            SliceMessage::JobFinished {
                generation: g,
                job_id: JobId::from("perf-0"),
                result: Ok(json!({})),
            },
        )
        .unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn polled_job_finished_without_result_keeps_a_value() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let state = apply(&state, created("perf-4", g)).state;
        let reduced = apply(
            &state,
            SliceMessage::JobFinished {
                generation: g,
                job_id: JobId::from("perf-4"),
                result: Ok(Payload::Null),
            },
        );
        assert_eq!(reduced.state.status(), RequestStatus::Succeeded);
        assert_eq!(reduced.state.value(), Some(&json!({"job_id": "perf-4"})));
        assert!(reduced.state.invariants_hold());
    }

    #[test]
    fn null_fetch_result_fails_the_request() {
        let state = SliceState::idle(SliceKind::Request);
        let (state, g) = start(&state);
        let reduced = apply(
            &state,
            SliceMessage::Fetched {
                generation: g,
                result: Ok(Payload::Null),
            },
        );
        assert_eq!(reduced.state.status(), RequestStatus::Failed);
        assert!(reduced.state.value().is_none());
        assert!(reduced.state.invariants_hold());
    }

    #[test]
    fn close_after_success_requests_refresh() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let state = apply(&state, created("perf-2", g)).state;
        let state = apply(
            &state,
            SliceMessage::JobFinished {
                generation: g,
                job_id: JobId::from("perf-2"),
                result: Ok(json!({"profile_id": "p"})),
            },
        )
        .state;

        let reduced = apply(&state, SliceMessage::Close);
        assert_eq!(reduced.state.status(), RequestStatus::Idle);
        assert!(reduced.effects.contains(&Effect::Closed { succeeded: true }));
    }

    #[test]
    fn deferred_close_completes_once_on_cancel_success() {
        let state = SliceState::idle(SliceKind::Poll);
        let (state, g) = start(&state);
        let state = apply(&state, created("perf-3", g)).state;

        let reduced = apply(&state, SliceMessage::Close);
        let [Effect::Cancel { cancel_generation, .. }] = reduced.effects.as_slice() else {
            panic!("expected a single cancel effect, got {:?}", reduced.effects);
        };
        let cancel_generation = *cancel_generation;
        assert_eq!(reduced.state.status(), RequestStatus::Loading);

        let done = apply(
            &reduced.state,
            SliceMessage::CancelFinished {
                cancel_generation,
                result: Ok(()),
            },
        );
        let closes = done
            .effects
            .iter()
            .filter(|e| matches!(e, Effect::Closed { .. }))
            .count();
        assert_eq!(closes, 1);
        assert!(done.state.job_id().is_none());

        assert!(reduce(
            &done.state,
            SliceMessage::CancelFinished {
                cancel_generation,
                result: Ok(()),
            },
        )
        .is_err());
    }

    #[test]
    fn progress_only_applies_to_polled_slices() {
        let state = SliceState::idle(SliceKind::Cancelable);
        let err = reduce(
            &state,
            SliceMessage::Progress {
                generation: Generation::default(),
                job_id: JobId::from("x"),
                progress: Some(0.5),
            },
        )
        .unwrap_err();
        assert_matches!(err, CoreError::Unsupported { op: "progress", .. });
    }
}

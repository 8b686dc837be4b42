//! Cancelable server-side job tracking.
//!
//! [`CancelableJobState`] embeds a [`RequestState`] for the primary
//! create/run lifecycle and adds a second, independent status track for the
//! cancel/delete call against the same job. It also coordinates closing: a
//! close requested while the job is still running waits for the cancel to
//! settle so the server-side job is never orphaned.

use serde::Serialize;

use crate::error::{CoreError, RequestError};
use crate::request::RequestState;
use crate::status::RequestStatus;
use crate::types::{Generation, JobId};

// ---------------------------------------------------------------------------
// Transition outcomes
// ---------------------------------------------------------------------------

/// Result of asking to cancel a job.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelStart<S> {
    /// No job exists yet: the state was reset locally, no server call.
    Local(S),
    /// A cancel call must be issued for `job_id`, tagged with
    /// `cancel_generation`.
    Remote {
        state: S,
        job_id: JobId,
        cancel_generation: Generation,
    },
}

impl<S> CancelStart<S> {
    pub fn map<U>(self, f: impl FnOnce(S) -> U) -> CancelStart<U> {
        match self {
            CancelStart::Local(s) => CancelStart::Local(f(s)),
            CancelStart::Remote {
                state,
                job_id,
                cancel_generation,
            } => CancelStart::Remote {
                state: f(state),
                job_id,
                cancel_generation,
            },
        }
    }
}

/// Result of asking to close (discard) a job slice.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseDecision<S> {
    /// Closed now. The state is fully reset.
    Immediate(S),
    /// The job is still running. The close completes once the cancel
    /// succeeds; `cancel` is set when a new cancel call must be issued.
    Deferred {
        state: S,
        cancel: Option<(JobId, Generation)>,
    },
}

impl<S> CloseDecision<S> {
    pub fn map<U>(self, f: impl FnOnce(S) -> U) -> CloseDecision<U> {
        match self {
            CloseDecision::Immediate(s) => CloseDecision::Immediate(f(s)),
            CloseDecision::Deferred { state, cancel } => CloseDecision::Deferred {
                state: f(state),
                cancel,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// JobLifecycle
// ---------------------------------------------------------------------------

/// Transitions shared by every cancelable job slice.
///
/// Implemented by [`CancelableJobState`] and by
/// [`PollJobState`](crate::poll::PollJobState) so the store can drive both
/// through one reducer.
pub trait JobLifecycle: Sized {
    type Value;

    fn start(&self) -> (Self, Generation);
    fn job_created(&self, generation: Generation, job_id: JobId) -> Result<Self, CoreError>;
    fn succeed(&self, generation: Generation, value: Self::Value) -> Result<Self, CoreError>;
    fn fail(&self, generation: Generation, error: RequestError) -> Result<Self, CoreError>;
    fn start_cancel(&self) -> Result<CancelStart<Self>, CoreError>;
    /// Returns the next state and whether a pending close executed.
    fn cancel_succeed(&self, cancel_generation: Generation) -> Result<(Self, bool), CoreError>;
    fn cancel_fail(
        &self,
        cancel_generation: Generation,
        error: RequestError,
    ) -> Result<Self, CoreError>;
    fn request_close(&self) -> Result<CloseDecision<Self>, CoreError>;
    fn reset(&self) -> Self;

    fn request(&self) -> &RequestState<Self::Value>;
    fn job_id(&self) -> Option<&JobId>;
}

// ---------------------------------------------------------------------------
// CancelableJobState
// ---------------------------------------------------------------------------

/// Snapshot of a job that can be canceled (or deleted) after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancelableJobState<T> {
    #[serde(flatten)]
    pub request: RequestState<T>,
    /// Set once the create call succeeds.
    pub job_id: Option<JobId>,
    pub canceling_status: RequestStatus,
    pub canceling_error: Option<RequestError>,
    pub cancel_generation: Generation,
    /// A close is waiting for the cancel call to succeed.
    pub close_pending: bool,
}

impl<T> Default for CancelableJobState<T> {
    fn default() -> Self {
        Self {
            request: RequestState::default(),
            job_id: None,
            canceling_status: RequestStatus::Idle,
            canceling_error: None,
            cancel_generation: Generation::default(),
            close_pending: false,
        }
    }
}

impl<T: Clone> CancelableJobState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_request(&self, request: RequestState<T>) -> Self {
        Self {
            request,
            ..self.clone()
        }
    }

    fn ensure_cancel_loading(
        &self,
        cancel_generation: Generation,
        op: &'static str,
    ) -> Result<(), CoreError> {
        if cancel_generation != self.cancel_generation {
            return Err(CoreError::StaleResponse {
                current: self.cancel_generation,
                received: cancel_generation,
            });
        }
        if self.canceling_status != RequestStatus::Loading {
            return Err(CoreError::InvalidTransition {
                op,
                status: self.canceling_status,
            });
        }
        Ok(())
    }

    /// Mark the cancel track as in flight. Caller has checked the job id.
    fn begin_cancel(&self) -> (Self, Generation) {
        let cancel_generation = self.cancel_generation.next();
        let next = Self {
            canceling_status: RequestStatus::Loading,
            canceling_error: None,
            cancel_generation,
            ..self.clone()
        };
        (next, cancel_generation)
    }

    /// `canceling != Idle => job_id`, plus the request invariants.
    pub fn invariants_hold(&self) -> bool {
        self.request.invariants_hold()
            && (self.canceling_status == RequestStatus::Idle || self.job_id.is_some())
    }
}

impl<T: Clone> JobLifecycle for CancelableJobState<T> {
    type Value = T;

    fn start(&self) -> (Self, Generation) {
        let (request, generation) = self.request.start();
        let next = Self {
            request,
            job_id: None,
            canceling_status: RequestStatus::Idle,
            canceling_error: None,
            // Advance so a cancel still in flight for the old job is stale.
            cancel_generation: self.cancel_generation.next(),
            close_pending: false,
        };
        (next, generation)
    }

    fn job_created(&self, generation: Generation, job_id: JobId) -> Result<Self, CoreError> {
        self.request.ensure_current(generation)?;
        if !self.request.is_loading() {
            return Err(CoreError::InvalidTransition {
                op: "record job",
                status: self.request.status,
            });
        }
        Ok(Self {
            job_id: Some(job_id),
            ..self.clone()
        })
    }

    fn succeed(&self, generation: Generation, value: T) -> Result<Self, CoreError> {
        let request = self.request.succeed(generation, value)?;
        Ok(self.with_request(request))
    }

    fn fail(&self, generation: Generation, error: RequestError) -> Result<Self, CoreError> {
        let request = self.request.fail(generation, error)?;
        Ok(self.with_request(request))
    }

    fn start_cancel(&self) -> Result<CancelStart<Self>, CoreError> {
        let Some(job_id) = self.job_id.clone() else {
            return Ok(CancelStart::Local(self.reset()));
        };
        match self.canceling_status {
            RequestStatus::Idle | RequestStatus::Failed => {
                let (state, cancel_generation) = self.begin_cancel();
                Ok(CancelStart::Remote {
                    state,
                    job_id,
                    cancel_generation,
                })
            }
            status => Err(CoreError::InvalidTransition {
                op: "start cancel",
                status,
            }),
        }
    }

    fn cancel_succeed(&self, cancel_generation: Generation) -> Result<(Self, bool), CoreError> {
        self.ensure_cancel_loading(cancel_generation, "complete cancel")?;
        if self.close_pending {
            return Ok((self.reset(), true));
        }
        // The job is torn down server-side; results still in flight are stale.
        let next = Self {
            request: self.request.reset(),
            canceling_status: RequestStatus::Succeeded,
            canceling_error: None,
            ..self.clone()
        };
        Ok((next, false))
    }

    fn cancel_fail(
        &self,
        cancel_generation: Generation,
        error: RequestError,
    ) -> Result<Self, CoreError> {
        self.ensure_cancel_loading(cancel_generation, "fail cancel")?;
        Ok(Self {
            canceling_status: RequestStatus::Failed,
            canceling_error: Some(error),
            ..self.clone()
        })
    }

    fn request_close(&self) -> Result<CloseDecision<Self>, CoreError> {
        if !self.request.is_loading() {
            return Ok(CloseDecision::Immediate(self.reset()));
        }
        let Some(job_id) = self.job_id.clone() else {
            return Ok(CloseDecision::Immediate(self.reset()));
        };

        let pending = Self {
            close_pending: true,
            ..self.clone()
        };
        match self.canceling_status {
            RequestStatus::Loading => Ok(CloseDecision::Deferred {
                state: pending,
                cancel: None,
            }),
            RequestStatus::Idle | RequestStatus::Failed => {
                let (state, cancel_generation) = pending.begin_cancel();
                Ok(CloseDecision::Deferred {
                    state,
                    cancel: Some((job_id, cancel_generation)),
                })
            }
            // A successful cancel resets the primary track, so it cannot
            // still be loading.
            RequestStatus::Succeeded => Ok(CloseDecision::Immediate(self.reset())),
        }
    }

    fn reset(&self) -> Self {
        Self {
            request: self.request.reset(),
            job_id: None,
            canceling_status: RequestStatus::Idle,
            canceling_error: None,
            cancel_generation: self.cancel_generation.next(),
            close_pending: false,
        }
    }

    fn request(&self) -> &RequestState<T> {
        &self.request
    }

    fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    type State = CancelableJobState<&'static str>;

    fn running(job: &str) -> (State, Generation) {
        let (state, g) = State::new().start();
        (state.job_created(g, JobId::from(job)).unwrap(), g)
    }

    #[test]
    fn job_created_records_job_id() {
        let (state, _) = running("perf-1");
        assert_eq!(state.job_id, Some(JobId::from("perf-1")));
        assert_eq!(state.request.status, RequestStatus::Loading);
    }

    #[test]
    fn job_created_for_stale_generation_is_rejected() {
        let (state, g1) = State::new().start();
        let (state, _) = state.start();
        assert!(state.job_created(g1, JobId::from("old")).unwrap_err().is_stale());
    }

    #[test]
    fn start_cancel_without_job_resets_locally() {
        let (state, _) = State::new().start();
        let outcome = state.start_cancel().unwrap();
        assert_matches!(outcome, CancelStart::Local(s) => {
            assert_eq!(s.request.status, RequestStatus::Idle);
            assert_eq!(s.canceling_status, RequestStatus::Idle);
        });
    }

    #[test]
    fn start_cancel_with_job_goes_remote() {
        let (state, _) = running("perf-2");
        assert_matches!(
            state.start_cancel().unwrap(),
            CancelStart::Remote { state, job_id, .. } => {
                assert_eq!(job_id, JobId::from("perf-2"));
                assert_eq!(state.canceling_status, RequestStatus::Loading);
                assert!(state.invariants_hold());
            }
        );
    }

    #[test]
    fn start_cancel_twice_is_invalid() {
        let (state, _) = running("perf-3");
        let CancelStart::Remote { state, .. } = state.start_cancel().unwrap() else {
            panic!("expected remote cancel");
        };
        assert_matches!(
            state.start_cancel(),
            Err(CoreError::InvalidTransition { status: RequestStatus::Loading, .. })
        );
    }

    #[test]
    fn cancel_succeed_tears_down_primary_and_keeps_job_id() {
        let (state, g) = running("perf-4");
        let CancelStart::Remote { state, cancel_generation, .. } = state.start_cancel().unwrap()
        else {
            panic!("expected remote cancel");
        };
        let (state, closed) = state.cancel_succeed(cancel_generation).unwrap();

        assert!(!closed);
        assert_eq!(state.canceling_status, RequestStatus::Succeeded);
        assert_eq!(state.request.status, RequestStatus::Idle);
        assert_eq!(state.job_id, Some(JobId::from("perf-4")));
        assert!(state.succeed(g, "late").unwrap_err().is_stale());
        assert!(state.invariants_hold());
    }

    #[test]
    fn cancel_fail_surfaces_error_without_clearing() {
        let (state, _) = running("perf-5");
        let CancelStart::Remote { state, cancel_generation, .. } = state.start_cancel().unwrap()
        else {
            panic!("expected remote cancel");
        };
        let state = state
            .cancel_fail(cancel_generation, RequestError::network("unreachable"))
            .unwrap();

        assert_eq!(state.canceling_status, RequestStatus::Failed);
        assert_eq!(state.request.status, RequestStatus::Loading);
        assert_eq!(state.job_id, Some(JobId::from("perf-5")));
        assert!(state.canceling_error.is_some());

        // Retry is allowed from Failed.
        assert_matches!(state.start_cancel(), Ok(CancelStart::Remote { .. }));
    }

    #[test]
    fn close_after_terminal_is_immediate() {
        let (state, g) = running("perf-6");
        let state = state.succeed(g, "done").unwrap();
        assert_matches!(
            state.request_close().unwrap(),
            CloseDecision::Immediate(s) => assert_eq!(s.request.status, RequestStatus::Idle)
        );
    }

    #[test]
    fn close_while_creating_without_job_is_immediate() {
        let (state, _) = State::new().start();
        assert_matches!(state.request_close().unwrap(), CloseDecision::Immediate(_));
    }

    #[test]
    fn close_while_running_defers_and_starts_cancel() {
        let (state, _) = running("perf-7");
        let decision = state.request_close().unwrap();
        let CloseDecision::Deferred { state, cancel: Some((job_id, cancel_generation)) } = decision
        else {
            panic!("expected deferred close with cancel");
        };
        assert_eq!(job_id, JobId::from("perf-7"));
        assert!(state.close_pending);

        let (state, closed) = state.cancel_succeed(cancel_generation).unwrap();
        assert!(closed);
        assert!(state.job_id.is_none());
        assert_eq!(state.request.status, RequestStatus::Idle);
        assert_eq!(state.canceling_status, RequestStatus::Idle);
        assert!(!state.close_pending);

        // A duplicate completion cannot close twice.
        assert!(state.cancel_succeed(cancel_generation).unwrap_err().is_stale());
    }

    #[test]
    fn close_while_cancel_in_flight_defers_without_new_cancel() {
        let (state, _) = running("perf-8");
        let CancelStart::Remote { state, .. } = state.start_cancel().unwrap() else {
            panic!("expected remote cancel");
        };
        assert_matches!(
            state.request_close().unwrap(),
            CloseDecision::Deferred { cancel: None, state } => assert!(state.close_pending)
        );
    }

    #[test]
    fn failed_cancel_keeps_close_pending_until_retry_succeeds() {
        let (state, _) = running("perf-9");
        let CloseDecision::Deferred { state, cancel: Some((_, cg)) } =
            state.request_close().unwrap()
        else {
            panic!("expected deferred close");
        };
        let state = state.cancel_fail(cg, RequestError::network("x")).unwrap();
        assert!(state.close_pending);

        let CancelStart::Remote { state, cancel_generation, .. } = state.start_cancel().unwrap()
        else {
            panic!("expected remote retry");
        };
        let (_, closed) = state.cancel_succeed(cancel_generation).unwrap();
        assert!(closed);
    }
}

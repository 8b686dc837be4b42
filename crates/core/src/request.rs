//! Request lifecycle tracking.
//!
//! [`RequestState`] follows one async operation through
//! idle -> loading -> succeeded/failed. Every transition returns a new value
//! instead of mutating in place, and completions are tagged with the
//! [`Generation`] they were started under so a superseded call can never
//! overwrite the outcome of a newer one.

use serde::Serialize;

use crate::error::{CoreError, RequestError};
use crate::status::RequestStatus;
use crate::types::Generation;

/// Snapshot of a tracked request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestState<T> {
    pub status: RequestStatus,
    /// Last successful payload. Retained across later failures.
    pub value: Option<T>,
    /// Last failure. Cleared when a new attempt starts.
    pub error: Option<RequestError>,
    pub generation: Generation,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            status: RequestStatus::Idle,
            value: None,
            error: None,
            generation: Generation::default(),
        }
    }
}

impl<T: Clone> RequestState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new attempt, superseding any attempt still in flight.
    ///
    /// Returns the next state and the generation the caller must tag its
    /// completion with.
    pub fn start(&self) -> (Self, Generation) {
        let generation = self.generation.next();
        let next = Self {
            status: RequestStatus::Loading,
            value: self.value.clone(),
            error: None,
            generation,
        };
        (next, generation)
    }

    /// Complete the current attempt with a value.
    pub fn succeed(&self, generation: Generation, value: T) -> Result<Self, CoreError> {
        self.ensure_loading(generation, "succeed")?;
        Ok(Self {
            status: RequestStatus::Succeeded,
            value: Some(value),
            error: None,
            generation,
        })
    }

    /// Complete the current attempt with an error. The last good value stays.
    pub fn fail(&self, generation: Generation, error: RequestError) -> Result<Self, CoreError> {
        self.ensure_loading(generation, "fail")?;
        Ok(Self {
            status: RequestStatus::Failed,
            value: self.value.clone(),
            error: Some(error),
            generation,
        })
    }

    /// Return to Idle, dropping value and error. Anything still in flight
    /// becomes stale.
    pub fn reset(&self) -> Self {
        Self {
            status: RequestStatus::Idle,
            value: None,
            error: None,
            generation: self.generation.next(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == RequestStatus::Loading
    }

    /// Reject completions that do not belong to the in-flight attempt.
    pub fn ensure_current(&self, generation: Generation) -> Result<(), CoreError> {
        if generation != self.generation {
            return Err(CoreError::StaleResponse {
                current: self.generation,
                received: generation,
            });
        }
        Ok(())
    }

    fn ensure_loading(&self, generation: Generation, op: &'static str) -> Result<(), CoreError> {
        self.ensure_current(generation)?;
        if !self.is_loading() {
            return Err(CoreError::InvalidTransition {
                op,
                status: self.status,
            });
        }
        Ok(())
    }
}

impl<T> RequestState<T> {
    /// `Succeeded => value && !error`, `Failed => error`.
    pub fn invariants_hold(&self) -> bool {
        match self.status {
            RequestStatus::Succeeded => self.value.is_some() && self.error.is_none(),
            RequestStatus::Failed => self.error.is_some(),
            RequestStatus::Idle | RequestStatus::Loading => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    type State = RequestState<&'static str>;

    #[test]
    fn new_state_is_idle_and_empty() {
        let state = State::new();
        assert_eq!(state.status, RequestStatus::Idle);
        assert!(state.value.is_none());
        assert!(state.error.is_none());
    }

    #[test]
    fn start_moves_to_loading_and_advances_generation() {
        let (state, g) = State::new().start();
        assert_eq!(state.status, RequestStatus::Loading);
        assert_eq!(state.generation, g);
        assert!(g > Generation::default());
    }

    #[test]
    fn succeed_stores_value_and_clears_error() {
        let (loading, g) = State::new().start();
        let failed = loading.fail(g, RequestError::network("down")).unwrap();
        let (retry, g2) = failed.start();
        assert!(retry.error.is_none(), "start clears the previous error");

        let done = retry.succeed(g2, "ok").unwrap();
        assert_eq!(done.status, RequestStatus::Succeeded);
        assert_eq!(done.value, Some("ok"));
        assert!(done.error.is_none());
    }

    #[test]
    fn fail_retains_last_good_value() {
        let (loading, g) = State::new().start();
        let done = loading.succeed(g, "first").unwrap();
        let (loading, g2) = done.start();
        let failed = loading.fail(g2, RequestError::network("down")).unwrap();

        assert_eq!(failed.status, RequestStatus::Failed);
        assert_eq!(failed.value, Some("first"));
        assert_eq!(failed.error, Some(RequestError::network("down")));
    }

    #[test]
    fn stale_success_is_rejected() {
        let (first, g1) = State::new().start();
        let (second, g2) = first.start();

        let done = second.succeed(g2, "new").unwrap();
        assert_matches!(
            done.succeed(g1, "old"),
            Err(CoreError::StaleResponse { current, received }) if current == g2 && received == g1
        );
    }

    #[test]
    fn out_of_order_completion_keeps_newest_outcome() {
        let (first, g1) = State::new().start();
        let (second, g2) = first.start();

        // g2 lands first, then the superseded g1.
        let state = second.fail(g2, RequestError::validation("bad")).unwrap();
        let state = match state.succeed(g1, "old") {
            Ok(s) => s,
            Err(e) => {
                assert!(e.is_stale());
                state
            }
        };

        assert_eq!(state.status, RequestStatus::Failed);
        assert!(state.value.is_none());
    }

    #[test]
    fn double_completion_is_invalid() {
        let (loading, g) = State::new().start();
        let done = loading.succeed(g, "ok").unwrap();
        assert_matches!(
            done.fail(g, RequestError::network("late")),
            Err(CoreError::InvalidTransition { op: "fail", status: RequestStatus::Succeeded })
        );
    }

    #[test]
    fn reset_clears_and_makes_in_flight_stale() {
        let (loading, g) = State::new().start();
        let reset = loading.reset();

        assert_eq!(reset.status, RequestStatus::Idle);
        assert!(reset.value.is_none());
        assert!(reset.succeed(g, "late").unwrap_err().is_stale());
    }

    #[test]
    fn invariants_hold_across_mixed_sequences() {
        let mut state = State::new();
        let mut pending = Vec::new();

        for step in 0..24u32 {
            match step % 4 {
                0 | 2 => {
                    let (next, g) = state.start();
                    state = next;
                    pending.push(g);
                }
                1 => {
                    if let Some(g) = pending.first().copied() {
                        if let Ok(next) = state.succeed(g, "v") {
                            state = next;
                        }
                    }
                }
                _ => {
                    if let Some(g) = pending.pop() {
                        if let Ok(next) = state.fail(g, RequestError::network("x")) {
                            state = next;
                        }
                    }
                }
            }
            assert!(state.invariants_hold(), "violated at step {step}: {state:?}");
        }
    }
}

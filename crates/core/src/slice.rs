//! Store slice snapshots and the well-known slice names.

use serde::Serialize;

use crate::error::RequestError;
use crate::job::{CancelableJobState, JobLifecycle};
use crate::poll::PollJobState;
use crate::request::RequestState;
use crate::status::RequestStatus;
use crate::types::{JobId, Payload};

// ---------------------------------------------------------------------------
// Slice names
// ---------------------------------------------------------------------------

/// Paged list of all projects.
pub const SLICE_PROJECTS: &str = "projects";
/// The project currently open.
pub const SLICE_SELECTED_PROJECT: &str = "selectedProject";
/// Optimizations of the open project.
pub const SLICE_SELECTED_OPTIMS: &str = "selectedOptims";
/// Best-estimated optimization settings of the open project.
pub const SLICE_SELECTED_OPTIMS_BEST_ESTIMATED: &str = "selectedOptimsBestEstimated";
/// Performance profiles of the open project.
pub const SLICE_SELECTED_PROFILES_PERF: &str = "selectedProfilesPerf";
/// Loss profiles of the open project.
pub const SLICE_SELECTED_PROFILES_LOSS: &str = "selectedProfilesLoss";
/// Server system info (available engines and instruction sets).
pub const SLICE_SYSTEM_INFO: &str = "systemInfo";
/// Project settings saved from the create-optimization dialog.
pub const SLICE_UPDATE_PROJECT: &str = "updateProject";
/// Project deletion.
pub const SLICE_DELETE_PROJECT: &str = "deleteProject";
/// Pruning settings change for one modifier.
pub const SLICE_CHANGE_MODIFIER_SETTINGS: &str = "changeModifierSettings";
/// Optimization being created from the create dialog.
pub const SLICE_CREATE_OPTIM: &str = "createOptim";
/// Performance profile being created and profiled.
pub const SLICE_CREATE_PERF_PROFILE: &str = "createPerfProfile";

// ---------------------------------------------------------------------------
// SliceKind
// ---------------------------------------------------------------------------

/// Which tracker backs a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SliceKind {
    Request,
    Cancelable,
    Poll,
}

impl SliceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SliceKind::Request => "request",
            SliceKind::Cancelable => "cancelable",
            SliceKind::Poll => "poll",
        }
    }
}

// ---------------------------------------------------------------------------
// SliceState
// ---------------------------------------------------------------------------

/// Read-only snapshot of one slice, as handed to the view layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SliceState {
    Request(RequestState<Payload>),
    Cancelable(CancelableJobState<Payload>),
    Poll(PollJobState<Payload>),
}

impl SliceState {
    /// Fresh Idle state for a slice of the given kind.
    pub fn idle(kind: SliceKind) -> Self {
        match kind {
            SliceKind::Request => SliceState::Request(RequestState::new()),
            SliceKind::Cancelable => SliceState::Cancelable(CancelableJobState::new()),
            SliceKind::Poll => SliceState::Poll(PollJobState::new()),
        }
    }

    pub fn kind(&self) -> SliceKind {
        match self {
            SliceState::Request(_) => SliceKind::Request,
            SliceState::Cancelable(_) => SliceKind::Cancelable,
            SliceState::Poll(_) => SliceKind::Poll,
        }
    }

    /// The primary request lifecycle.
    pub fn request(&self) -> &RequestState<Payload> {
        match self {
            SliceState::Request(s) => s,
            SliceState::Cancelable(s) => s.request(),
            SliceState::Poll(s) => s.request(),
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.request().status
    }

    pub fn value(&self) -> Option<&Payload> {
        self.request().value.as_ref()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.request().error.as_ref()
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            SliceState::Request(_) => None,
            SliceState::Cancelable(s) => s.job_id(),
            SliceState::Poll(s) => s.job_id(),
        }
    }

    /// Status of the cancel track; always Idle for plain request slices.
    pub fn canceling_status(&self) -> RequestStatus {
        match self {
            SliceState::Request(_) => RequestStatus::Idle,
            SliceState::Cancelable(s) => s.canceling_status,
            SliceState::Poll(s) => s.job.canceling_status,
        }
    }

    pub fn canceling_error(&self) -> Option<&RequestError> {
        match self {
            SliceState::Request(_) => None,
            SliceState::Cancelable(s) => s.canceling_error.as_ref(),
            SliceState::Poll(s) => s.job.canceling_error.as_ref(),
        }
    }

    pub fn progress(&self) -> Option<f64> {
        match self {
            SliceState::Poll(s) => s.progress,
            _ => None,
        }
    }

    /// Tracker invariants, plus `Succeeded => value != null` for payloads.
    pub fn invariants_hold(&self) -> bool {
        let tracker = match self {
            SliceState::Request(s) => s.invariants_hold(),
            SliceState::Cancelable(s) => s.invariants_hold(),
            SliceState::Poll(s) => s.invariants_hold(),
        };
        let null_success =
            self.status() == RequestStatus::Succeeded && self.value().is_some_and(Payload::is_null);
        tracker && !null_success
    }
}

impl From<RequestState<Payload>> for SliceState {
    fn from(state: RequestState<Payload>) -> Self {
        SliceState::Request(state)
    }
}

impl From<CancelableJobState<Payload>> for SliceState {
    fn from(state: CancelableJobState<Payload>) -> Self {
        SliceState::Cancelable(state)
    }
}

impl From<PollJobState<Payload>> for SliceState {
    fn from(state: PollJobState<Payload>) -> Self {
        SliceState::Poll(state)
    }
}

//! Actions issued by the view layer.

use optiboard_core::{Payload, SliceKey};
use serde::{Deserialize, Serialize};

use crate::reducer::SliceMessage;

/// A request from the view layer, routed to a slice by `key`.
///
/// Serializes as `{"type": "start", "key": ..., "params": ...}`,
/// `{"type": "startCancel", "key": ...}`, `{"type": "reset", "key": ...}`
/// and `{"type": "close", "key": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Begin (or supersede) the slice's operation.
    Start {
        key: SliceKey,
        #[serde(default)]
        params: Payload,
    },
    /// Cancel the slice's server-side job.
    StartCancel { key: SliceKey },
    /// Discard the slice's state.
    Reset { key: SliceKey },
    /// Close a job slice, cancelling the job first if it is still running.
    Close { key: SliceKey },
}

impl Action {
    pub fn start(key: impl Into<SliceKey>, params: Payload) -> Self {
        Action::Start {
            key: key.into(),
            params,
        }
    }

    pub fn start_cancel(key: impl Into<SliceKey>) -> Self {
        Action::StartCancel { key: key.into() }
    }

    pub fn reset(key: impl Into<SliceKey>) -> Self {
        Action::Reset { key: key.into() }
    }

    pub fn close(key: impl Into<SliceKey>) -> Self {
        Action::Close { key: key.into() }
    }

    pub fn key(&self) -> &SliceKey {
        match self {
            Action::Start { key, .. }
            | Action::StartCancel { key }
            | Action::Reset { key }
            | Action::Close { key } => key,
        }
    }

    pub(crate) fn into_parts(self) -> (SliceKey, SliceMessage) {
        match self {
            Action::Start { key, params } => (key, SliceMessage::Start { params }),
            Action::StartCancel { key } => (key, SliceMessage::StartCancel),
            Action::Reset { key } => (key, SliceMessage::Reset),
            Action::Close { key } => (key, SliceMessage::Close),
        }
    }
}

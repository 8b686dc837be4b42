//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans out every [`StoreEvent`] the store publishes after a
//! slice transition. It is designed to be shared via `Arc<EventBus>`.

use chrono::{DateTime, Utc};
use optiboard_core::{Generation, JobId, RequestStatus, SliceKey, SliceState};
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// StoreEvent
// ---------------------------------------------------------------------------

/// What happened to a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventKind {
    /// The slice moved to a new snapshot.
    Transition,
    /// A job slice was closed and cleared.
    Closed,
}

/// Summary of a slice transition, cheap to clone and fan out.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEvent {
    pub key: SliceKey,
    pub kind: StoreEventKind,
    pub status: RequestStatus,
    pub canceling_status: RequestStatus,
    pub generation: Generation,
    pub job_id: Option<JobId>,
    pub progress: Option<f64>,
    /// When the transition was committed (UTC).
    pub timestamp: DateTime<Utc>,
}

impl StoreEvent {
    /// Summarise `state` as a plain transition of `key`.
    pub fn transition(key: SliceKey, state: &SliceState) -> Self {
        Self {
            key,
            kind: StoreEventKind::Transition,
            status: state.status(),
            canceling_status: state.canceling_status(),
            generation: state.request().generation,
            job_id: state.job_id().cloned(),
            progress: state.progress(),
            timestamp: Utc::now(),
        }
    }

    /// Summarise `state` as the result of a completed close.
    pub fn closed(key: SliceKey, state: &SliceState) -> Self {
        Self {
            kind: StoreEventKind::Closed,
            ..Self::transition(key, state)
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: StoreEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! The store's single writer.
//!
//! [`Scheduler`] owns the write side of the tree. It receives view actions
//! and backend completions on one mpsc channel, runs them through
//! [`reduce`], commits the new snapshot, publishes a [`StoreEvent`] and then
//! executes the requested effects on spawned tasks whose results come back
//! on the same channel.

use std::collections::HashMap;
use std::sync::Arc;

use optiboard_core::{
    Generation, JobApi, JobId, Payload, PollConfig, RequestError, RequestSource, SliceKey,
    SliceKind, SliceState,
};
use optiboard_events::{EventBus, StoreEvent};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::poller::{PollObserver, PollingJobRunner};
use crate::reducer::{reduce, Effect, Reduced, SliceMessage};

/// Every slice snapshot, keyed by slice name.
pub type StoreTree = HashMap<SliceKey, Arc<SliceState>>;

/// Input to the scheduler loop.
pub(crate) enum Message {
    Dispatch(Action),
    Complete { key: SliceKey, message: SliceMessage },
}

/// Collaborator behind a slice.
#[derive(Clone)]
pub(crate) enum Backend {
    Request(Arc<dyn RequestSource>),
    Job(Arc<dyn JobApi>),
}

/// Static configuration of one slice.
#[derive(Clone)]
pub(crate) struct SliceSpec {
    pub kind: SliceKind,
    pub backend: Backend,
    /// Slice re-fetched after this job slice closes following a success.
    pub refresh: Option<SliceKey>,
}

pub(crate) struct Scheduler {
    specs: HashMap<SliceKey, SliceSpec>,
    tree: watch::Sender<StoreTree>,
    bus: Arc<EventBus>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    /// Active poller per slice.
    pollers: HashMap<SliceKey, CancellationToken>,
    /// Parameters of the most recent start per slice.
    last_params: HashMap<SliceKey, Payload>,
    poll_config: PollConfig,
    /// Master token, cancelled on store shutdown.
    cancel: CancellationToken,
}

impl Scheduler {
    pub(crate) fn new(
        specs: HashMap<SliceKey, SliceSpec>,
        tree: watch::Sender<StoreTree>,
        bus: Arc<EventBus>,
        channel: (mpsc::UnboundedSender<Message>, mpsc::UnboundedReceiver<Message>),
        poll_config: PollConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = channel;
        Self {
            specs,
            tree,
            bus,
            tx,
            rx,
            pollers: HashMap::new(),
            last_params: HashMap::new(),
            poll_config,
            cancel,
        }
    }

    /// Process messages until the master token is cancelled.
    pub(crate) async fn run(mut self) {
        tracing::info!(slices = self.specs.len(), "Store scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                message = self.rx.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
            }
        }

        for (key, token) in self.pollers.drain() {
            tracing::debug!(slice = %key, "Stopping poller");
            token.cancel();
        }
        tracing::info!("Store scheduler stopped");
    }

    fn handle(&mut self, message: Message) {
        let (key, message) = match message {
            Message::Dispatch(action) => action.into_parts(),
            Message::Complete { key, message } => (key, message),
        };
        self.apply(key, message);
    }

    fn apply(&mut self, key: SliceKey, message: SliceMessage) {
        let current = self.tree.borrow().get(&key).cloned();
        let Some(current) = current else {
            tracing::warn!(slice = %key, op = message.name(), "Dropping message for unknown slice");
            return;
        };

        if let SliceMessage::Start { params } = &message {
            self.last_params.insert(key.clone(), params.clone());
        }

        let op = message.name();
        let created = match &message {
            SliceMessage::JobCreated {
                result: Ok(created),
                ..
            } => Some(created.job_id.clone()),
            _ => None,
        };
        match reduce(&current, message) {
            Ok(Reduced { state, effects }) => {
                debug_assert!(state.invariants_hold(), "invariant violated: {state:?}");
                tracing::debug!(
                    slice = %key,
                    op,
                    status = %state.status(),
                    canceling = %state.canceling_status(),
                    generation = %state.request().generation,
                    "Slice transition",
                );

                let state = Arc::new(state);
                self.tree.send_modify(|tree| {
                    tree.insert(key.clone(), Arc::clone(&state));
                });
                self.bus.publish(StoreEvent::transition(key.clone(), &state));

                if let Some(previous) = current.job_id() {
                    if state.job_id() != Some(previous) {
                        self.release(&key, previous.clone());
                    }
                }
                for effect in effects {
                    self.execute(&key, &state, effect);
                }
            }
            Err(e) if e.is_stale() => {
                tracing::debug!(slice = %key, op, error = %e, "Discarded stale response");
                if let Some(job_id) = created {
                    self.release(&key, job_id);
                }
            }
            Err(e) => {
                tracing::warn!(slice = %key, op, error = %e, "Rejected slice message");
            }
        }
    }

    fn execute(&mut self, key: &SliceKey, state: &SliceState, effect: Effect) {
        match effect {
            Effect::Fetch { generation, params } => {
                let Some(source) = self.request_source(key) else {
                    return;
                };
                let tx = self.tx.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let result = source.fetch(&params).await;
                    complete(&tx, key, SliceMessage::Fetched { generation, result });
                });
            }

            Effect::Create { generation, params } => {
                let Some(api) = self.job_api(key) else {
                    return;
                };
                let tx = self.tx.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let result = api.create(&params).await;
                    complete(&tx, key, SliceMessage::JobCreated { generation, result });
                });
            }

            Effect::Cancel {
                cancel_generation,
                job_id,
            } => {
                let Some(api) = self.job_api(key) else {
                    return;
                };
                tracing::info!(slice = %key, job_id = %job_id, "Cancelling job");
                let tx = self.tx.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let result = api.cancel(&job_id).await.map(|_| ());
                    complete(
                        &tx,
                        key,
                        SliceMessage::CancelFinished {
                            cancel_generation,
                            result,
                        },
                    );
                });
            }

            Effect::StartPolling { generation, job_id } => {
                let Some(api) = self.job_api(key) else {
                    return;
                };
                self.stop_polling(key);

                let token = self.cancel.child_token();
                self.pollers.insert(key.clone(), token.clone());

                let runner = PollingJobRunner::new(api, self.poll_config);
                let observer = ChannelObserver {
                    key: key.clone(),
                    generation,
                    tx: self.tx.clone(),
                };
                tokio::spawn(async move {
                    runner.run(&job_id, &observer, &token).await;
                });
            }

            Effect::StopPolling => self.stop_polling(key),

            Effect::Closed { succeeded } => {
                tracing::info!(slice = %key, succeeded, "Slice closed");
                self.bus.publish(StoreEvent::closed(key.clone(), state));

                let refresh = self.specs.get(key).and_then(|s| s.refresh.clone());
                if let (true, Some(target)) = (succeeded, refresh) {
                    let params = self.last_params.get(key).cloned().unwrap_or_default();
                    tracing::debug!(slice = %key, target = %target, "Refreshing after close");
                    self.apply(target, SliceMessage::Start { params });
                }
            }
        }
    }

    fn release(&self, key: &SliceKey, job_id: JobId) {
        let Some(api) = self.job_api(key) else {
            return;
        };
        tracing::debug!(slice = %key, job_id = %job_id, "Releasing job");
        tokio::spawn(async move {
            api.release(&job_id).await;
        });
    }

    fn stop_polling(&mut self, key: &SliceKey) {
        if let Some(token) = self.pollers.remove(key) {
            token.cancel();
        }
    }

    fn request_source(&self, key: &SliceKey) -> Option<Arc<dyn RequestSource>> {
        match self.specs.get(key).map(|s| &s.backend) {
            Some(Backend::Request(source)) => Some(Arc::clone(source)),
            _ => {
                tracing::error!(slice = %key, "Slice has no request source");
                None
            }
        }
    }

    fn job_api(&self, key: &SliceKey) -> Option<Arc<dyn JobApi>> {
        match self.specs.get(key).map(|s| &s.backend) {
            Some(Backend::Job(api)) => Some(Arc::clone(api)),
            _ => {
                tracing::error!(slice = %key, "Slice has no job API");
                None
            }
        }
    }
}

fn complete(tx: &mpsc::UnboundedSender<Message>, key: SliceKey, message: SliceMessage) {
    // A closed channel means the store shut down; the result is moot.
    let _ = tx.send(Message::Complete { key, message });
}

/// Feeds poller observations back into the scheduler as slice messages.
struct ChannelObserver {
    key: SliceKey,
    generation: Generation,
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelObserver {
    fn finished(&self, job_id: &JobId, result: Result<Payload, RequestError>) {
        complete(
            &self.tx,
            self.key.clone(),
            SliceMessage::JobFinished {
                generation: self.generation,
                job_id: job_id.clone(),
                result,
            },
        );
    }
}

impl PollObserver for ChannelObserver {
    fn on_progress(&self, job_id: &JobId, progress: Option<f64>) {
        complete(
            &self.tx,
            self.key.clone(),
            SliceMessage::Progress {
                generation: self.generation,
                job_id: job_id.clone(),
                progress,
            },
        );
    }

    fn on_succeeded(&self, job_id: &JobId, result: Payload) {
        self.finished(job_id, Ok(result));
    }

    fn on_failed(&self, job_id: &JobId, error: RequestError) {
        self.finished(job_id, Err(error));
    }
}

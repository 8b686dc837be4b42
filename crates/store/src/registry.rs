//! The store handle and its builder.

use std::collections::HashMap;
use std::sync::Arc;

use optiboard_core::{
    CoreError, JobApi, PollConfig, RequestSource, SliceKey, SliceKind, SliceState,
};
use optiboard_events::{EventBus, StoreEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::action::Action;
use crate::scheduler::{Backend, Message, Scheduler, SliceSpec, StoreTree};

/// Cloneable handle to a running store.
///
/// Reads go through a `watch` snapshot of the whole tree; writes are queued
/// to the scheduler task that owns it. Dropping every handle does not stop
/// the scheduler; call [`Store::shutdown`].
#[derive(Clone)]
pub struct Store {
    tx: mpsc::UnboundedSender<Message>,
    tree: watch::Receiver<StoreTree>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Queue an action. Unknown keys are logged and ignored by the scheduler.
    pub fn dispatch(&self, action: Action) {
        let key = action.key().clone();
        if self.tx.send(Message::Dispatch(action)).is_err() {
            tracing::warn!(slice = %key, "Store is shut down; action dropped");
        }
    }

    /// Current snapshot of one slice.
    ///
    /// The returned `Arc` is pointer-equal across reads until the slice
    /// transitions again.
    pub fn select(&self, key: &str) -> Option<Arc<SliceState>> {
        self.tree.borrow().get(key).cloned()
    }

    /// Current snapshot of every slice.
    pub fn snapshot(&self) -> StoreTree {
        self.tree.borrow().clone()
    }

    /// Receiver notified on every committed transition.
    pub fn subscribe(&self) -> watch::Receiver<StoreTree> {
        self.tree.clone()
    }

    /// Receiver of per-slice transition and close events.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    /// Wait until `predicate` holds for slice `key`.
    ///
    /// Returns `None` if the key is unknown or the store shut down first.
    pub async fn wait_for<F>(&self, key: &str, mut predicate: F) -> Option<Arc<SliceState>>
    where
        F: FnMut(&SliceState) -> bool,
    {
        let mut rx = self.tree.clone();
        loop {
            let current = rx.borrow_and_update().get(key).cloned();
            let current = current?;
            if predicate(&current) {
                return Some(current);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Stop the scheduler and every poller.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Declares the slices of a [`Store`].
#[derive(Default)]
pub struct StoreBuilder {
    slices: Vec<(SliceKey, SliceSpec)>,
    links: Vec<(SliceKey, SliceKey)>,
    poll_config: PollConfig,
}

impl StoreBuilder {
    /// A slice tracking one request at a time against `source`.
    pub fn request_slice(
        mut self,
        key: impl Into<SliceKey>,
        source: Arc<dyn RequestSource>,
    ) -> Self {
        self.push(key.into(), SliceKind::Request, Backend::Request(source));
        self
    }

    /// A cancelable job slice whose job is complete once created.
    pub fn job_slice(mut self, key: impl Into<SliceKey>, api: Arc<dyn JobApi>) -> Self {
        self.push(key.into(), SliceKind::Cancelable, Backend::Job(api));
        self
    }

    /// A cancelable job slice polled until the job is terminal.
    pub fn polled_job_slice(mut self, key: impl Into<SliceKey>, api: Arc<dyn JobApi>) -> Self {
        self.push(key.into(), SliceKind::Poll, Backend::Job(api));
        self
    }

    /// Re-fetch `target` whenever job slice `source` is closed after success.
    pub fn refresh_on_close(
        mut self,
        source: impl Into<SliceKey>,
        target: impl Into<SliceKey>,
    ) -> Self {
        self.links.push((source.into(), target.into()));
        self
    }

    pub fn poll_config(mut self, config: PollConfig) -> Self {
        self.poll_config = config;
        self
    }

    fn push(&mut self, key: SliceKey, kind: SliceKind, backend: Backend) {
        self.slices.push((
            key,
            SliceSpec {
                kind,
                backend,
                refresh: None,
            },
        ));
    }

    /// Validate the declarations and the poll settings, then spawn the
    /// scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Store, CoreError> {
        self.poll_config.validate()?;

        let mut specs: HashMap<SliceKey, SliceSpec> = HashMap::with_capacity(self.slices.len());
        for (key, spec) in self.slices {
            if key.as_str().is_empty() {
                return Err(CoreError::Validation("slice key must not be empty".into()));
            }
            if specs.contains_key(&key) {
                return Err(CoreError::Validation(format!("duplicate slice key '{key}'")));
            }
            specs.insert(key, spec);
        }

        for (source, target) in self.links {
            if !specs.contains_key(&target) {
                return Err(CoreError::UnknownSlice(target.to_string()));
            }
            let spec = specs
                .get_mut(&source)
                .ok_or_else(|| CoreError::UnknownSlice(source.to_string()))?;
            if spec.kind == SliceKind::Request {
                return Err(CoreError::Validation(format!(
                    "slice '{source}' is not a job slice and cannot refresh on close"
                )));
            }
            spec.refresh = Some(target);
        }

        let tree: StoreTree = specs
            .iter()
            .map(|(key, spec)| (key.clone(), Arc::new(SliceState::idle(spec.kind))))
            .collect();
        let (tree_tx, tree_rx) = watch::channel(tree);
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Arc::new(EventBus::default());
        let cancel = CancellationToken::new();

        let scheduler = Scheduler::new(
            specs,
            tree_tx,
            Arc::clone(&bus),
            (tx.clone(), rx),
            self.poll_config,
            cancel.clone(),
        );
        tokio::spawn(scheduler.run());

        Ok(Store {
            tx,
            tree: tree_rx,
            bus,
            cancel,
        })
    }
}

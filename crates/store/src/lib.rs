//! Runtime for the dashboard's slice registry.
//!
//! - [`Store`] / [`StoreBuilder`]: declare slices, dispatch [`Action`]s and
//!   read snapshots.
//! - [`reducer`]: the pure transition function behind every slice.
//! - [`PollingJobRunner`]: status polling for long-running jobs.
//!
//! A single scheduler task owns the tree. Backend calls run on spawned tasks
//! and report back through the scheduler, so every committed snapshot is the
//! result of exactly one message.

pub mod action;
pub mod poller;
pub mod reducer;
pub mod registry;
mod scheduler;

pub use action::Action;
pub use poller::{PollObserver, PollOutcome, PollingJobRunner};
pub use reducer::{reduce, Effect, Reduced, SliceMessage};
pub use registry::{Store, StoreBuilder};
pub use scheduler::StoreTree;

//! Store change notifications.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`StoreEvent`]: summary of one committed slice transition.

pub mod bus;

pub use bus::{EventBus, StoreEvent, StoreEventKind};

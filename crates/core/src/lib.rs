//! State types and transitions for the optimization dashboard.
//!
//! Everything here is pure: trackers return new snapshots and never perform
//! I/O. The store crate drives them from an event loop.
//!
//! - [`request`]: idle/loading/succeeded/failed tracking with generation tags.
//! - [`job`]: cancel track and close coordination for server-side jobs.
//! - [`poll`]: progress tracking for polled jobs and [`PollConfig`].
//! - [`slice`]: the [`SliceState`] union stored in the tree.
//! - [`backend`]: collaborator traits implemented by the transport.

pub mod backend;
pub mod error;
pub mod job;
pub mod poll;
pub mod request;
pub mod slice;
pub mod status;
pub mod types;

pub use backend::{job_result, JobApi, JobCreated, JobSnapshot, RequestSource};
pub use error::{CoreError, ErrorKind, RequestError};
pub use job::{CancelStart, CancelableJobState, CloseDecision, JobLifecycle};
pub use poll::{PollConfig, PollJobState};
pub use request::RequestState;
pub use slice::{SliceKind, SliceState};
pub use status::{JobStatus, RequestStatus};
pub use types::{Generation, JobId, Payload, SliceKey};

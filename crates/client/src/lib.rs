//! HTTP transport for the optimization server.
//!
//! - [`ServerApi`]: thin `reqwest` wrapper over the REST endpoints.
//! - [`params`]: validated request parameters decoded from slice payloads.
//! - [`adapters`]: `RequestSource` / `JobApi` implementations the store
//!   drives.

pub mod adapters;
pub mod api;
pub mod jobs;
pub mod params;

pub use adapters::{OptimJobs, PerfProfileJobs, Resource, ResourceSource};
pub use api::{ApiError, ServerApi, DEFAULT_API_ROOT};
pub use jobs::{JobProgress, ServerJob, ServerJobStatus};

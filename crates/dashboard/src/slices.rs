//! The dashboard's slice layout.

use std::sync::Arc;

use optiboard_client::{OptimJobs, PerfProfileJobs, Resource, ResourceSource, ServerApi};
use optiboard_core::slice::{
    SLICE_CHANGE_MODIFIER_SETTINGS, SLICE_CREATE_OPTIM, SLICE_CREATE_PERF_PROFILE,
    SLICE_DELETE_PROJECT, SLICE_PROJECTS, SLICE_SELECTED_OPTIMS,
    SLICE_SELECTED_OPTIMS_BEST_ESTIMATED, SLICE_SELECTED_PROFILES_LOSS,
    SLICE_SELECTED_PROFILES_PERF, SLICE_SELECTED_PROJECT, SLICE_SYSTEM_INFO, SLICE_UPDATE_PROJECT,
};
use optiboard_core::{CoreError, PollConfig};
use optiboard_store::Store;

/// Build the store with every well-known slice wired to `api`.
///
/// Creating a profile or an optimization refreshes the matching list once
/// the dialog is closed after success.
pub fn build_store(api: Arc<ServerApi>, poll: PollConfig) -> Result<Store, CoreError> {
    let source = |resource| Arc::new(ResourceSource::new(Arc::clone(&api), resource));

    Store::builder()
        .request_slice(SLICE_PROJECTS, source(Resource::Projects))
        .request_slice(SLICE_SELECTED_PROJECT, source(Resource::Project))
        .request_slice(SLICE_SELECTED_OPTIMS, source(Resource::Optims))
        .request_slice(
            SLICE_SELECTED_OPTIMS_BEST_ESTIMATED,
            source(Resource::BestEstimated),
        )
        .request_slice(SLICE_SELECTED_PROFILES_PERF, source(Resource::ProfilesPerf))
        .request_slice(SLICE_SELECTED_PROFILES_LOSS, source(Resource::ProfilesLoss))
        .request_slice(SLICE_SYSTEM_INFO, source(Resource::SystemInfo))
        .request_slice(SLICE_UPDATE_PROJECT, source(Resource::UpdateProject))
        .request_slice(SLICE_DELETE_PROJECT, source(Resource::DeleteProject))
        .request_slice(
            SLICE_CHANGE_MODIFIER_SETTINGS,
            source(Resource::ModifierSettings),
        )
        .job_slice(SLICE_CREATE_OPTIM, Arc::new(OptimJobs::new(Arc::clone(&api))))
        .polled_job_slice(
            SLICE_CREATE_PERF_PROFILE,
            Arc::new(PerfProfileJobs::new(Arc::clone(&api))),
        )
        .refresh_on_close(SLICE_CREATE_PERF_PROFILE, SLICE_SELECTED_PROFILES_PERF)
        .refresh_on_close(SLICE_CREATE_OPTIM, SLICE_SELECTED_OPTIMS)
        .poll_config(poll)
        .build()
}

#[cfg(test)]
mod tests {
    use optiboard_core::{RequestStatus, SliceKind};

    use super::*;

    #[tokio::test]
    async fn every_well_known_slice_starts_idle() {
        let api = Arc::new(ServerApi::with_client(
            Default::default(),
            "http://localhost:5543/api",
        ));
        let store = build_store(api, PollConfig::default()).unwrap();
        let tree = store.snapshot();

        assert_eq!(tree.len(), 12);
        assert!(tree.values().all(|s| s.status() == RequestStatus::Idle));
        assert_eq!(
            store.select(SLICE_CREATE_PERF_PROFILE).unwrap().kind(),
            SliceKind::Poll
        );
        assert_eq!(
            store.select(SLICE_CREATE_OPTIM).unwrap().kind(),
            SliceKind::Cancelable
        );
        store.shutdown();
    }
}

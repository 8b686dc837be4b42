//! Backend collaborators implemented on top of [`ServerApi`].
//!
//! - [`ResourceSource`] backs the plain request slices (lists, detail views,
//!   system info, project and modifier updates).
//! - [`PerfProfileJobs`] backs the polled profile-creation slice: creating a
//!   profile starts a server job, cancelling it also deletes the profile.
//! - [`OptimJobs`] backs the optimization-creation slice, which completes as
//!   soon as the server answers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use optiboard_core::{
    JobApi, JobCreated, JobId, JobSnapshot, JobStatus, Payload, RequestError, RequestSource,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::{field, ApiError, ServerApi};
use crate::jobs::ServerJob;
use crate::params::{
    from_payload, BestEstimatedQuery, CreateOptim, CreatePerfProfile, ModifierSettings, PageQuery,
    ProjectRef, ProjectsQuery, UpdateProject,
};

// ---------------------------------------------------------------------------
// ResourceSource
// ---------------------------------------------------------------------------

/// Which endpoint a [`ResourceSource`] calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Paged project list. Params: [`ProjectsQuery`].
    Projects,
    /// One project. Params: [`ProjectRef`].
    Project,
    /// A project's optimizations. Params: [`PageQuery`].
    Optims,
    /// Best-estimated optimization settings. Params: [`BestEstimatedQuery`].
    BestEstimated,
    /// A project's performance profiles. Params: [`PageQuery`].
    ProfilesPerf,
    /// A project's loss profiles. Params: [`PageQuery`].
    ProfilesLoss,
    /// Server system info. No params.
    SystemInfo,
    /// Save project settings. Params: [`UpdateProject`].
    UpdateProject,
    /// Delete a project. Params: [`ProjectRef`].
    DeleteProject,
    /// Change a modifier's pruning settings. Params: [`ModifierSettings`].
    ModifierSettings,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Projects => "projects",
            Resource::Project => "project",
            Resource::Optims => "optims",
            Resource::BestEstimated => "best_estimated",
            Resource::ProfilesPerf => "profiles_perf",
            Resource::ProfilesLoss => "profiles_loss",
            Resource::SystemInfo => "system_info",
            Resource::UpdateProject => "update_project",
            Resource::DeleteProject => "delete_project",
            Resource::ModifierSettings => "modifier_settings",
        }
    }
}

/// [`RequestSource`] for one endpoint. Slice values are the decoded response
/// bodies.
pub struct ResourceSource {
    api: Arc<ServerApi>,
    resource: Resource,
}

impl ResourceSource {
    pub fn new(api: Arc<ServerApi>, resource: Resource) -> Self {
        Self { api, resource }
    }

    async fn fetch_body(&self, params: &Payload) -> Result<Value, ApiError> {
        match self.resource {
            Resource::Projects => {
                let query: ProjectsQuery = from_payload(params)?;
                self.api.get_projects(&query).await
            }
            Resource::Project => {
                let project: ProjectRef = from_payload(params)?;
                self.api.get_project(&project.project_id).await
            }
            Resource::Optims => {
                let query: PageQuery = from_payload(params)?;
                self.api.get_optims(&query).await
            }
            Resource::BestEstimated => {
                let query: BestEstimatedQuery = from_payload(params)?;
                self.api.get_best_estimated(&query).await
            }
            Resource::ProfilesPerf => {
                let query: PageQuery = from_payload(params)?;
                self.api.get_profiles_perf(&query).await
            }
            Resource::ProfilesLoss => {
                let query: PageQuery = from_payload(params)?;
                self.api.get_profiles_loss(&query).await
            }
            Resource::SystemInfo => self.api.get_system_info().await,
            Resource::UpdateProject => {
                let update: UpdateProject = from_payload(params)?;
                self.api.update_project(&update).await
            }
            Resource::DeleteProject => {
                let project: ProjectRef = from_payload(params)?;
                self.api.delete_project(&project.project_id).await
            }
            Resource::ModifierSettings => {
                let change: ModifierSettings = from_payload(params)?;
                self.api.change_modifier_settings(&change).await
            }
        }
    }
}

#[async_trait]
impl RequestSource for ResourceSource {
    async fn fetch(&self, params: &Payload) -> Result<Payload, RequestError> {
        self.fetch_body(params).await.map_err(|e| {
            tracing::warn!(resource = self.resource.as_str(), error = %e, "Fetch failed");
            e.into()
        })
    }
}

// ---------------------------------------------------------------------------
// PerfProfileJobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct ProfileRef {
    project_id: String,
    profile_id: String,
}

/// [`JobApi`] for performance profiling.
///
/// Remembers which profile each job fills in, so a completed job resolves to
/// the profile record and a cancelled one deletes it.
pub struct PerfProfileJobs {
    api: Arc<ServerApi>,
    profiles: RwLock<HashMap<JobId, ProfileRef>>,
}

impl PerfProfileJobs {
    pub fn new(api: Arc<ServerApi>) -> Self {
        Self {
            api,
            profiles: RwLock::new(HashMap::new()),
        }
    }

    /// Jobs whose profile is still tracked.
    pub async fn tracked_jobs(&self) -> usize {
        self.profiles.read().await.len()
    }

    async fn profile_of(&self, job_id: &JobId) -> Option<ProfileRef> {
        self.profiles.read().await.get(job_id).cloned()
    }

    async fn create_job(&self, params: &Payload) -> Result<JobCreated, ApiError> {
        let create: CreatePerfProfile = from_payload(params)?;
        let body = self.api.create_profile_perf(&create).await?;

        let profile: Value = field(&body, "profile")?;
        let profile_id: String = field(&profile, "profile_id")?;
        let job: ServerJob = field(&body, "job")?;
        let job_id = JobId::new(job.job_id.clone());

        tracing::info!(
            job_id = %job_id,
            project_id = %create.project_id,
            profile_id = %profile_id,
            "Performance profile job created",
        );
        self.profiles.write().await.insert(
            job_id.clone(),
            ProfileRef {
                project_id: create.project_id,
                profile_id,
            },
        );

        Ok(JobCreated {
            job_id,
            initial_status: job.status.to_job_status(),
            result: None,
        })
    }

    async fn job_status(&self, job_id: &JobId) -> Result<JobSnapshot, ApiError> {
        let body = self.api.get_job(job_id.as_str()).await?;
        let job: ServerJob = field(&body, "job")?;
        let status = job.status.to_job_status();

        let snapshot = match status {
            JobStatus::Succeeded => {
                let result = match self.profile_of(job_id).await {
                    Some(p) => {
                        let profile = self
                            .api
                            .get_profile_perf(&p.project_id, &p.profile_id)
                            .await?;
                        self.profiles.write().await.remove(job_id);
                        profile
                    }
                    None => body,
                };
                JobSnapshot::succeeded(result)
            }
            JobStatus::Failed => {
                self.profiles.write().await.remove(job_id);
                JobSnapshot {
                    progress: job.progress_fraction(),
                    ..JobSnapshot::failed(job.failure())
                }
            }
            JobStatus::Pending | JobStatus::Running => JobSnapshot {
                status,
                progress: job.progress_fraction(),
                result: None,
                error: None,
            },
        };
        Ok(snapshot)
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<JobStatus, ApiError> {
        let body = self.api.cancel_job(job_id.as_str()).await?;
        let job: ServerJob = field(&body, "job")?;

        if let Some(p) = self.profile_of(job_id).await {
            self.api
                .delete_profile_perf(&p.project_id, &p.profile_id)
                .await?;
            self.profiles.write().await.remove(job_id);
            tracing::info!(job_id = %job_id, profile_id = %p.profile_id, "Profile deleted");
        }
        Ok(job.status.to_job_status())
    }
}

#[async_trait]
impl JobApi for PerfProfileJobs {
    async fn create(&self, params: &Payload) -> Result<JobCreated, RequestError> {
        Ok(self.create_job(params).await?)
    }

    async fn get_status(&self, job_id: &JobId) -> Result<JobSnapshot, RequestError> {
        Ok(self.job_status(job_id).await?)
    }

    async fn cancel(&self, job_id: &JobId) -> Result<JobStatus, RequestError> {
        self.cancel_job(job_id).await.map_err(|e| {
            tracing::warn!(job_id = %job_id, error = %e, "Cancel failed");
            e.into()
        })
    }

    async fn release(&self, job_id: &JobId) {
        self.profiles.write().await.remove(job_id);
    }
}

// ---------------------------------------------------------------------------
// OptimJobs
// ---------------------------------------------------------------------------

/// [`JobApi`] for creating optimizations.
///
/// The server creates optimizations synchronously, so the "job" is the new
/// optimization itself: it is reported Succeeded on creation and cancelling
/// deletes it.
pub struct OptimJobs {
    api: Arc<ServerApi>,
    projects: RwLock<HashMap<JobId, String>>,
}

impl OptimJobs {
    pub fn new(api: Arc<ServerApi>) -> Self {
        Self {
            api,
            projects: RwLock::new(HashMap::new()),
        }
    }

    /// Optimizations still tracked for cancellation.
    pub async fn tracked_jobs(&self) -> usize {
        self.projects.read().await.len()
    }

    async fn project_of(&self, job_id: &JobId) -> Result<String, ApiError> {
        self.projects
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| ApiError::InvalidParams(format!("unknown optimization {job_id}")))
    }

    async fn create_optim(&self, params: &Payload) -> Result<JobCreated, ApiError> {
        let create: CreateOptim = from_payload(params)?;
        let body = self.api.create_optim(&create).await?;

        let optim: Value = field(&body, "optim")?;
        let optim_id: String = field(&optim, "optim_id")?;
        let job_id = JobId::new(optim_id);

        tracing::info!(job_id = %job_id, project_id = %create.project_id, "Optimization created");
        self.projects
            .write()
            .await
            .insert(job_id.clone(), create.project_id);

        Ok(JobCreated {
            job_id,
            initial_status: JobStatus::Succeeded,
            result: Some(body),
        })
    }
}

#[async_trait]
impl JobApi for OptimJobs {
    async fn create(&self, params: &Payload) -> Result<JobCreated, RequestError> {
        Ok(self.create_optim(params).await?)
    }

    async fn get_status(&self, job_id: &JobId) -> Result<JobSnapshot, RequestError> {
        let project_id = self.project_of(job_id).await?;
        let body = self
            .api
            .get_optim(&project_id, job_id.as_str())
            .await
            .map_err(RequestError::from)?;
        Ok(JobSnapshot::succeeded(body))
    }

    /// Deletes the optimization. Reported as Failed since it no longer
    /// exists.
    async fn cancel(&self, job_id: &JobId) -> Result<JobStatus, RequestError> {
        let project_id = self.project_of(job_id).await?;
        self.api
            .delete_optim(&project_id, job_id.as_str())
            .await
            .map_err(RequestError::from)?;
        self.projects.write().await.remove(job_id);
        tracing::info!(job_id = %job_id, "Optimization deleted");
        Ok(JobStatus::Failed)
    }

    async fn release(&self, job_id: &JobId) {
        self.projects.write().await.remove(job_id);
    }
}

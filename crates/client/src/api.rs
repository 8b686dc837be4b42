//! REST API client for the optimization server.
//!
//! Wraps the server's project, optimization, profile, job and system
//! endpoints using [`reqwest`]. Every method returns the decoded JSON body;
//! the adapters in [`crate::adapters`] turn those into slice payloads.

use std::time::Duration;

use optiboard_core::RequestError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::params::{
    BestEstimatedQuery, CreateOptim, CreatePerfProfile, ModifierSettings, PageQuery, ProjectsQuery,
    UpdateProject,
};

/// Default API root of a locally running server.
pub const DEFAULT_API_ROOT: &str = "http://localhost:5543/api";

/// HTTP client for one optimization server.
#[derive(Clone)]
pub struct ServerApi {
    client: reqwest::Client,
    api_root: String,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Server API error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// `error_message` from the body, or the raw body.
        message: String,
    },

    /// Parameters were rejected before any request was sent.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// A 2xx body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl From<ApiError> for RequestError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Request(e) => {
                let code = e.status().map(|s| s.as_u16().to_string());
                let error = RequestError::network(e.to_string());
                match code {
                    Some(code) => error.with_code(code),
                    None => error,
                }
            }
            ApiError::Server { status, message } if status >= 500 => {
                RequestError::network(message).with_code(status.to_string())
            }
            ApiError::Server { status, message } => {
                RequestError::validation(message).with_code(status.to_string())
            }
            ApiError::InvalidParams(message) => RequestError::validation(message),
            ApiError::Decode(message) => RequestError::network(message),
        }
    }
}

/// Error body shape used by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_message: String,
}

impl ServerApi {
    /// Create a client for the server at `api_root` (e.g.
    /// `http://host:5543/api`) with a per-request timeout.
    pub fn new(api_root: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_root))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_root: impl Into<String>) -> Self {
        let api_root = api_root.into().trim_end_matches('/').to_string();
        Self { client, api_root }
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    // ---- projects ----

    /// `GET /projects` with paging and ordering.
    pub async fn get_projects(&self, query: &ProjectsQuery) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url("/projects"))
            .query(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{project_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `PUT /projects/{id}`. Only fields set on `update` are sent.
    pub async fn update_project(&self, update: &UpdateProject) -> Result<Value, ApiError> {
        let response = self
            .client
            .put(self.url(&format!("/projects/{}", update.project_id)))
            .json(update)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/projects/{project_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- optimizations ----

    pub async fn get_optims(&self, query: &PageQuery) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{}/optim", query.project_id)))
            .query(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn get_optim(&self, project_id: &str, optim_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{project_id}/optim/{optim_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `POST /projects/{id}/optim/`. The trailing slash is what the server
    /// routes on.
    pub async fn create_optim(&self, create: &CreateOptim) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/projects/{}/optim/", create.project_id)))
            .json(create)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn delete_optim(&self, project_id: &str, optim_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/projects/{project_id}/optim/{optim_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Update the pruning settings of one modifier.
    pub async fn change_modifier_settings(
        &self,
        change: &ModifierSettings,
    ) -> Result<Value, ApiError> {
        let path = format!(
            "/projects/{}/optim/{}/modifiers/{}/pruning",
            change.project_id, change.optim_id, change.modifier_id
        );
        let response = self
            .client
            .put(self.url(&path))
            .json(&change.settings)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Best-estimated optimization settings, optionally informed by a
    /// performance and/or loss profile.
    pub async fn get_best_estimated(&self, query: &BestEstimatedQuery) -> Result<Value, ApiError> {
        let path = format!(
            "/projects/{}/optim/modifiers/best-estimated",
            query.project_id
        );
        let response = self.client.get(self.url(&path)).query(query).send().await?;

        Self::parse_response(response).await
    }

    // ---- loss profiles ----

    pub async fn get_profiles_loss(&self, query: &PageQuery) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{}/profiles/loss", query.project_id)))
            .query(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- performance profiles ----

    pub async fn get_profiles_perf(&self, query: &PageQuery) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/projects/{}/profiles/perf", query.project_id)))
            .query(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn get_profile_perf(
        &self,
        project_id: &str,
        profile_id: &str,
    ) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!(
                "/projects/{project_id}/profiles/perf/{profile_id}"
            )))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Create a profile. The server answers with the profile and the job
    /// that fills it in.
    pub async fn create_profile_perf(
        &self,
        create: &CreatePerfProfile,
    ) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/projects/{}/profiles/perf", create.project_id)))
            .json(create)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn delete_profile_perf(
        &self,
        project_id: &str,
        profile_id: &str,
    ) -> Result<Value, ApiError> {
        let response = self
            .client
            .delete(self.url(&format!(
                "/projects/{project_id}/profiles/perf/{profile_id}"
            )))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- jobs and system ----

    pub async fn get_job(&self, job_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/jobs/{job_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<Value, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/jobs/{job_id}/cancel")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Available engines and instruction sets of the server host.
    pub async fn get_system_info(&self) -> Result<Value, ApiError> {
        let response = self.client.get(self.url("/system/info")).send().await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    /// Ensure the response has a success status code, turning anything
    /// else into [`ApiError::Server`] with the body's `error_message` when
    /// it has one.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error_message)
                .unwrap_or(body);
            tracing::debug!(status = status.as_u16(), message = %message, "Server returned error");
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Pull `field` out of a response body, deserialized as `T`.
pub(crate) fn field<T: DeserializeOwned>(body: &Value, field: &str) -> Result<T, ApiError> {
    let value = body
        .get(field)
        .ok_or_else(|| ApiError::Decode(format!("response has no '{field}' field")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| ApiError::Decode(format!("invalid '{field}' field: {e}")))
}

//! Typed request parameters.
//!
//! Slices receive their parameters as untyped JSON from the view layer.
//! [`from_payload`] decodes and validates them before anything is sent.

use optiboard_core::Payload;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::api::ApiError;

fn default_page() -> u32 {
    1
}

fn default_page_length() -> u32 {
    100
}

fn default_order_by() -> String {
    "modified".to_string()
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> u32 {
    1
}

/// Decode slice parameters into `T` and validate them.
///
/// A `null` payload decodes as an empty object so types whose fields all
/// have defaults accept a bare `start`.
pub fn from_payload<T>(params: &Payload) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
{
    let params = match params {
        Payload::Null => Payload::Object(Default::default()),
        other => other.clone(),
    };
    let parsed: T =
        serde_json::from_value(params).map_err(|e| ApiError::InvalidParams(e.to_string()))?;
    parsed
        .validate()
        .map_err(|e| ApiError::InvalidParams(e.to_string()))?;
    Ok(parsed)
}

/// Paging and ordering for the project list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProjectsQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_page_length")]
    #[validate(range(min = 1, max = 1000))]
    pub page_length: u32,
    #[serde(default = "default_order_by")]
    #[validate(length(min = 1))]
    pub order_by: String,
    #[serde(default = "default_true")]
    pub order_desc: bool,
}

impl Default for ProjectsQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_length: default_page_length(),
            order_by: default_order_by(),
            order_desc: true,
        }
    }
}

/// Identifies one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProjectRef {
    #[validate(length(min = 1))]
    pub project_id: String,
}

/// Paging within one project's optimizations or profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PageQuery {
    #[serde(skip_serializing)]
    #[validate(length(min = 1))]
    pub project_id: String,
    #[serde(default = "default_page")]
    #[validate(range(min = 1))]
    pub page: u32,
    #[serde(default = "default_page_length")]
    #[validate(range(min = 1, max = 1000))]
    pub page_length: u32,
}

/// Profiles the best-estimated settings are computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BestEstimatedQuery {
    #[serde(skip_serializing)]
    #[validate(length(min = 1))]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_perf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_loss_id: Option<String>,
}

/// Partial project update; unset fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateProject {
    #[serde(skip_serializing)]
    #[validate(length(min = 1))]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_optimizer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub training_epochs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub training_lr_init: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub training_lr_final: Option<f64>,
}

/// New pruning settings for one modifier of an optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ModifierSettings {
    #[validate(length(min = 1))]
    pub project_id: String,
    #[validate(length(min = 1))]
    pub optim_id: String,
    #[validate(length(min = 1))]
    pub modifier_id: String,
    /// Sent as the request body.
    #[validate(custom(function = "is_object"))]
    pub settings: Value,
}

fn is_object(value: &Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("settings_not_an_object"))
    }
}

/// New optimization for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateOptim {
    #[serde(skip_serializing)]
    #[validate(length(min = 1))]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_pruning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_quantization: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_lr_schedule: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_trainable: Option<bool>,
}

/// New performance profile for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreatePerfProfile {
    #[serde(skip_serializing)]
    #[validate(length(min = 1))]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: u32,
    /// CPU cores to profile with; `None` lets the server use all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub core_count: Option<u32>,
}

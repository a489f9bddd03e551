//! API endpoint aggregate, its tags, environment and owned attachments.
//!
//! # Invariants
//! - `documentation`, `swagger` and `tour` point at attachment rows owned by
//!   this endpoint; an id present before an update stays present after it.
//! - `tags` mirrors the `api_endpoint_tags` join rows, sorted by id.

use crate::model::validation::{require_id, require_langcode, require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ApiEndpointId = Uuid;
pub type ApiTagId = Uuid;
pub type AppEnvironmentId = Uuid;
pub type AttachmentId = Uuid;

/// Scalar attributes of one API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpointFields {
    pub api_name: String,
    pub api_scope: Option<String>,
    pub api_scope_production: Option<String>,
    pub deprecated: bool,
    pub description: Option<String>,
    pub endpoint_urls: Vec<String>,
    pub app_environment: AppEnvironmentId,
    pub api_version: Option<String>,
    pub langcode: String,
    pub sticky: bool,
    pub promote: bool,
    pub url_alias: Option<String>,
    pub published: bool,
}

impl ApiEndpointFields {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("api_name", &self.api_name)?;
        require_langcode(&self.langcode)?;
        require_id("app_environment", self.app_environment)?;
        Ok(())
    }
}

/// Persisted API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub id: ApiEndpointId,
    #[serde(flatten)]
    pub fields: ApiEndpointFields,
    pub documentation: Option<AttachmentId>,
    pub swagger: Option<AttachmentId>,
    pub tour: Option<AttachmentId>,
    pub tags: Vec<ApiTagId>,
    pub created_at: i64,
    pub changed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTag {
    pub id: ApiTagId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEnvironment {
    pub id: AppEnvironmentId,
    pub name: String,
}

/// New content for an owned attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentContent {
    pub file_name: String,
    pub mime_type: Option<String>,
    #[serde(skip_serializing)]
    pub content: Vec<u8>,
}

/// Persisted attachment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
    pub updated_at: i64,
}

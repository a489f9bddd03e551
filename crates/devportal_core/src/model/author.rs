//! Author aggregate: scalar fields plus one owned image attachment.

use crate::model::api_endpoint::AttachmentId;
use crate::model::validation::{require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AuthorId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub image: Option<AttachmentId>,
    pub details: Option<String>,
}

impl Author {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)
    }
}

//! FAQ aggregate and FAQ category model.
//!
//! # Invariants
//! - `FaqFields` is replaced wholesale on update, never merged.
//! - `categories` mirrors the `faq_faq_categories` join rows, sorted by id.

use crate::model::validation::{limit_chars, require_langcode, require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type FaqId = Uuid;
pub type FaqCategoryId = Uuid;

const CATEGORY_NAME_MAX_CHARS: usize = 255;
const CATEGORY_DESCRIPTION_MAX_CHARS: usize = 1000;

/// Scalar attributes of one FAQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqFields {
    pub question: String,
    pub answer: String,
    pub langcode: String,
    /// Published flag.
    pub status: bool,
    /// Display order. Zero is reserved as "unset" and rejected.
    pub faq_order: i32,
}

impl FaqFields {
    /// Checks required fields before any persistence work.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("question", &self.question)?;
        require_text("answer", &self.answer)?;
        require_langcode(&self.langcode)?;
        if self.faq_order == 0 {
            return Err(ValidationError::ZeroFaqOrder);
        }
        Ok(())
    }
}

/// Persisted FAQ with its category association slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub id: FaqId,
    #[serde(flatten)]
    pub fields: FaqFields,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds, refreshed by every committed update.
    pub changed_at: i64,
    pub categories: Vec<FaqCategoryId>,
}

/// Category referenced by FAQs; `name` is its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaqCategory {
    pub id: FaqCategoryId,
    pub name: String,
    pub description: Option<String>,
}

impl FaqCategory {
    /// Checks the column budgets carried over from the category service.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("name", &self.name)?;
        limit_chars("name", Some(&self.name), CATEGORY_NAME_MAX_CHARS)?;
        limit_chars(
            "description",
            self.description.as_deref(),
            CATEGORY_DESCRIPTION_MAX_CHARS,
        )
    }
}

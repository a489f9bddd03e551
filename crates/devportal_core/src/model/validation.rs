//! Field-level validation for aggregate writes.
//!
//! Violations are client-caused and map to the business failure code.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static LANGCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*$").expect("valid langcode regex")
});

/// Validation error for aggregate payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identity is missing or the nil UUID.
    NilId(&'static str),
    /// Required text field is empty after trim.
    BlankField(&'static str),
    /// Required flag or value was not supplied.
    MissingField(&'static str),
    /// FAQ ordering must be non-zero.
    ZeroFaqOrder,
    /// Language code does not look like `en`, `en-US`, `pt_BR`, ...
    InvalidLangcode(String),
    /// Text field exceeds its column budget.
    TooLong { field: &'static str, max_chars: usize },
    /// Natural key already taken by another entity.
    DuplicateName(String),
    /// List page size was explicitly zero.
    ZeroPageLimit,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId(field) => write!(f, "`{field}` must be a non-nil id"),
            Self::BlankField(field) => write!(f, "`{field}` must not be blank"),
            Self::MissingField(field) => write!(f, "`{field}` is required"),
            Self::ZeroFaqOrder => write!(f, "`faq_order` must be non-zero"),
            Self::InvalidLangcode(value) => write!(f, "invalid langcode `{value}`"),
            Self::TooLong { field, max_chars } => {
                write!(f, "`{field}` exceeds {max_chars} characters")
            }
            Self::DuplicateName(name) => write!(f, "name `{name}` is already taken"),
            Self::ZeroPageLimit => write!(f, "`limit` must be greater than zero"),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_id(field: &'static str, id: Uuid) -> Result<Uuid, ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::NilId(field));
    }
    Ok(id)
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(())
}

pub(crate) fn require_flag(
    field: &'static str,
    value: Option<bool>,
) -> Result<bool, ValidationError> {
    value.ok_or(ValidationError::MissingField(field))
}

pub(crate) fn limit_chars(
    field: &'static str,
    value: Option<&str>,
    max_chars: usize,
) -> Result<(), ValidationError> {
    match value {
        Some(text) if text.chars().count() > max_chars => {
            Err(ValidationError::TooLong { field, max_chars })
        }
        _ => Ok(()),
    }
}

pub(crate) fn require_langcode(value: &str) -> Result<(), ValidationError> {
    require_text("langcode", value)?;
    if !LANGCODE_RE.is_match(value.trim()) {
        return Err(ValidationError::InvalidLangcode(value.to_string()));
    }
    Ok(())
}

/// Trims a natural key and rejects blank values.
pub fn normalize_name(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankField(field));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn langcode_accepts_common_shapes() {
        for value in ["en", "EN", "en-US", "pt_BR", "zh-Hant-TW"] {
            assert!(require_langcode(value).is_ok(), "{value} should be accepted");
        }
    }

    #[test]
    fn langcode_rejects_blank_and_garbage() {
        assert_eq!(
            require_langcode("  "),
            Err(ValidationError::BlankField("langcode"))
        );
        assert!(matches!(
            require_langcode("english please"),
            Err(ValidationError::InvalidLangcode(_))
        ));
    }

    #[test]
    fn nil_id_is_rejected() {
        assert_eq!(
            require_id("id", Uuid::nil()),
            Err(ValidationError::NilId("id"))
        );
    }

    #[test]
    fn limit_chars_counts_characters_not_bytes() {
        assert!(limit_chars("name", Some("ééé"), 3).is_ok());
        assert!(limit_chars("name", Some("éééé"), 3).is_err());
        assert!(limit_chars("name", None, 0).is_ok());
    }
}

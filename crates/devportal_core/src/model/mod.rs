//! Domain model for the portal aggregates and the entities they reference.
//!
//! # Responsibility
//! - Define aggregate roots (`Faq`, `ApiEndpoint`, `Author`) and referenced
//!   entities (`FaqCategory`, `ApiTag`, `AppEnvironment`, `Attachment`).
//! - Provide field-level validation shared by create and update paths.
//!
//! # Invariants
//! - Every entity is identified by a stable v4 UUID that is never reused.
//! - Association slots hold identities only; names are resolved before use.

pub mod api_endpoint;
pub mod author;
pub mod faq;
pub mod validation;

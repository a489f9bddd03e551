//! Repository layer: entity store, aggregate repositories and attachments.
//!
//! # Responsibility
//! - Own every SQL statement the core issues.
//! - Hand the orchestrator labelled statements instead of executing writes
//!   directly, so aggregate writes always go through one atomic batch.
//!
//! # Invariants
//! - Reads return `Ok(None)` for absent rows; absence is classified by the
//!   caller, not by the repository.
//! - Only resolver creation and attachment content replacement write outside
//!   a batch.

pub mod attachment_repo;
pub mod author_repo;
pub mod endpoint_repo;
pub mod faq_repo;
pub mod paging;
pub mod store;

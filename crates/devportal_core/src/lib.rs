//! Core domain logic for the developer portal.
//! Every aggregate write goes through the reconciliation engine in this crate.

pub mod db;
pub mod envelope;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use envelope::{execute_safely, Response, ResponseException};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::api_endpoint::{ApiEndpoint, ApiEndpointFields, AttachmentContent};
pub use model::author::Author;
pub use model::faq::{Faq, FaqCategory, FaqFields};
pub use model::validation::ValidationError;
pub use reconcile::error::{FailureKind, ReconcileError, ReconcileResult};
pub use reconcile::orchestrator::{ReconcileConfig, ReconcileStage};
pub use repo::attachment_repo::{AttachmentService, SqliteAttachmentService};
pub use repo::author_repo::{AuthorListQuery, AuthorSortField};
pub use repo::faq_repo::{CategoryListQuery, CategorySortField, FaqListQuery, FaqSortField};
pub use repo::paging::{ListQuery, SortOrder};
pub use repo::store::{EntityStore, RepoError, RepoResult, SqliteStore};
pub use service::author_service::AuthorService;
pub use service::endpoint_service::EndpointService;
pub use service::faq_service::FaqService;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

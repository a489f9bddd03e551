//! Reconciliation failure taxonomy.
//!
//! Business failures are client-caused and carry `DP-422`. Technical
//! failures are data- or server-caused: `DP-404` for a missing aggregate or
//! dependency, `DP-500` for storage, `DP-1001` for anything unclassified.

use crate::model::validation::ValidationError;
use crate::reconcile::orchestrator::ReconcileStage;
use crate::reconcile::resolver::ResolveError;
use crate::repo::attachment_repo::AttachmentError;
use crate::repo::store::{EntityKind, RepoError, StorageFailure};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const CODE_VALIDATION: &str = "DP-422";
pub const CODE_NOT_FOUND: &str = "DP-404";
pub const CODE_STORAGE: &str = "DP-500";
pub const CODE_UNCLASSIFIED: &str = "DP-1001";

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Business,
    Technical,
}

#[derive(Debug)]
pub enum ReconcileError {
    /// Required field missing or malformed.
    Validation(ValidationError),
    /// Aggregate root to update or delete does not exist.
    RootNotFound { entity: EntityKind, id: Uuid },
    /// Referenced entity or owned attachment does not exist.
    DependencyUnresolved { entity: EntityKind, key: String },
    /// Commit batch rolled back.
    Storage(StorageFailure),
    /// Read or resolver-side persistence failure before commit.
    Repo(RepoError),
    /// Lifecycle stages were driven out of order.
    InvalidTransition {
        from: ReconcileStage,
        to: ReconcileStage,
    },
}

impl ReconcileError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Business,
            _ => FailureKind::Technical,
        }
    }

    /// Stable code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => CODE_VALIDATION,
            Self::RootNotFound { .. } | Self::DependencyUnresolved { .. } => CODE_NOT_FOUND,
            Self::Storage(_) | Self::Repo(_) => CODE_STORAGE,
            Self::InvalidTransition { .. } => CODE_UNCLASSIFIED,
        }
    }

    /// Caller-facing description; never includes storage internals.
    pub fn description(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::RootNotFound { entity, .. } => format!("{} not found", entity.label()),
            Self::DependencyUnresolved { .. } => "dependency unresolved".to_string(),
            Self::Storage(_) | Self::Repo(_) => "Technical Error".to_string(),
            Self::InvalidTransition { .. } => {
                "A technical exception has occurred, please contact your system administrator"
                    .to_string()
            }
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "validation failed: {err}"),
            Self::RootNotFound { entity, id } => write!(f, "{} not found: {id}", entity.label()),
            Self::DependencyUnresolved { entity, key } => {
                write!(f, "dependency unresolved: {} {key}", entity.label())
            }
            Self::Storage(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InvalidTransition { from, to } => write!(
                f,
                "invalid reconciliation transition {} -> {}",
                from.as_str(),
                to.as_str()
            ),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for ReconcileError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StorageFailure> for ReconcileError {
    fn from(value: StorageFailure) -> Self {
        Self::Storage(value)
    }
}

impl From<RepoError> for ReconcileError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::DependencyUnresolved {
                entity,
                key: id.to_string(),
            },
            RepoError::DuplicateName(name) => {
                Self::Validation(ValidationError::DuplicateName(name))
            }
            other => Self::Repo(other),
        }
    }
}

impl From<ResolveError> for ReconcileError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::Missing { kind, key } => Self::DependencyUnresolved {
                entity: kind.entity(),
                key: key.to_string(),
            },
            ResolveError::CannotCreateById { kind, id } => Self::DependencyUnresolved {
                entity: kind.entity(),
                key: id.to_string(),
            },
            ResolveError::NotCreatable(kind) => Self::DependencyUnresolved {
                entity: kind.entity(),
                key: "name".to_string(),
            },
            ResolveError::BlankName(_) => {
                Self::Validation(ValidationError::BlankField("name"))
            }
            ResolveError::Repo(err) => Self::Repo(err),
        }
    }
}

impl From<AttachmentError> for ReconcileError {
    fn from(value: AttachmentError) -> Self {
        match value {
            AttachmentError::Missing(id) => Self::DependencyUnresolved {
                entity: EntityKind::Attachment,
                key: id.to_string(),
            },
            AttachmentError::BlankFileName => {
                Self::Validation(ValidationError::BlankField("file_name"))
            }
            AttachmentError::Repo(err) => Self::Repo(err),
        }
    }
}

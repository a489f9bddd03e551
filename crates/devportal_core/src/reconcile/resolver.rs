//! Dependent-entity resolution.
//!
//! # Responsibility
//! - Turn identity or natural-key references into fixed entity ids.
//! - Lazily create referenced entities that may be created on demand.
//!
//! # Invariants
//! - Resolution finishes before any join-table statement is built.
//! - Creation runs outside the reconciliation batch and stays persisted if
//!   the later commit aborts; it is an upsert on the unique `name` column,
//!   so retries and concurrent callers converge on the first-created row.

use crate::model::validation::normalize_name;
use crate::repo::store::{parse_uuid, EntityKind, EntityStore, RepoError, SqliteStore};
use log::{info, warn};
use rusqlite::OptionalExtension;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Entities that may be referenced from an aggregate update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferencedKind {
    FaqCategory,
    ApiTag,
    AppEnvironment,
}

impl ReferencedKind {
    pub fn entity(self) -> EntityKind {
        match self {
            Self::FaqCategory => EntityKind::FaqCategory,
            Self::ApiTag => EntityKind::ApiTag,
            Self::AppEnvironment => EntityKind::AppEnvironment,
        }
    }

    fn find_by_name_sql(self) -> &'static str {
        match self {
            Self::FaqCategory => "SELECT id FROM faq_categories WHERE name = ?1;",
            Self::ApiTag => "SELECT id FROM api_tags WHERE name = ?1;",
            Self::AppEnvironment => "SELECT id FROM app_environments WHERE name = ?1;",
        }
    }

    /// Upsert for kinds that may be created on demand; only tags qualify.
    fn upsert_sql(self) -> Option<&'static str> {
        match self {
            Self::ApiTag => Some(
                "INSERT INTO api_tags (id, name) VALUES (?1, ?2)
                 ON CONFLICT (name) DO NOTHING;",
            ),
            Self::FaqCategory | Self::AppEnvironment => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKey {
    Id(Uuid),
    Name(String),
}

impl Display for ReferenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "`{name}`"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvePolicy {
    /// Missing referenced entity fails the reconciliation.
    MustExist,
    /// Missing referenced entity is created by natural key.
    CreateIfMissing,
}

/// One foreign reference carried by an update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferencedKind,
    pub key: ReferenceKey,
    pub policy: ResolvePolicy,
}

impl Reference {
    pub fn existing(kind: ReferencedKind, id: Uuid) -> Self {
        Self {
            kind,
            key: ReferenceKey::Id(id),
            policy: ResolvePolicy::MustExist,
        }
    }

    pub fn by_name_or_create(kind: ReferencedKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            key: ReferenceKey::Name(name.into()),
            policy: ResolvePolicy::CreateIfMissing,
        }
    }
}

#[derive(Debug)]
pub enum ResolveError {
    /// Referenced entity does not exist and may not be created.
    Missing {
        kind: ReferencedKind,
        key: ReferenceKey,
    },
    /// Natural key is blank after trim.
    BlankName(ReferencedKind),
    /// Identity references cannot be created on demand.
    CannotCreateById { kind: ReferencedKind, id: Uuid },
    /// This kind is never created from a reference.
    NotCreatable(ReferencedKind),
    Repo(RepoError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { kind, key } => {
                write!(f, "dependency unresolved: {} {key}", kind.entity().label())
            }
            Self::BlankName(kind) => {
                write!(f, "{} name must not be blank", kind.entity().label())
            }
            Self::CannotCreateById { kind, id } => write!(
                f,
                "{} {id} cannot be created from an id reference",
                kind.entity().label()
            ),
            Self::NotCreatable(kind) => {
                write!(f, "{} cannot be created on demand", kind.entity().label())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ResolveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<rusqlite::Error> for ResolveError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

/// Resolves references to fixed identities.
pub trait DependentResolver {
    fn resolve(&self, reference: &Reference) -> Result<Uuid, ResolveError>;
}

/// Resolves every reference in order, stopping at the first failure.
///
/// Duplicate references collapse into one identity.
pub fn resolve_all<R: DependentResolver + ?Sized>(
    resolver: &R,
    references: &[Reference],
) -> Result<BTreeSet<Uuid>, ResolveError> {
    references
        .iter()
        .map(|reference| resolver.resolve(reference))
        .collect()
}

impl DependentResolver for SqliteStore<'_> {
    fn resolve(&self, reference: &Reference) -> Result<Uuid, ResolveError> {
        let kind = reference.kind;
        match (&reference.key, reference.policy) {
            (ReferenceKey::Id(id), ResolvePolicy::MustExist) => {
                if self.exists(kind.entity(), *id)? {
                    Ok(*id)
                } else {
                    Err(ResolveError::Missing {
                        kind,
                        key: reference.key.clone(),
                    })
                }
            }
            (ReferenceKey::Id(id), ResolvePolicy::CreateIfMissing) => {
                if self.exists(kind.entity(), *id)? {
                    Ok(*id)
                } else {
                    Err(ResolveError::CannotCreateById { kind, id: *id })
                }
            }
            (ReferenceKey::Name(_), ResolvePolicy::CreateIfMissing)
                if kind.upsert_sql().is_none() =>
            {
                Err(ResolveError::NotCreatable(kind))
            }
            (ReferenceKey::Name(name), policy) => {
                let name =
                    normalize_name("name", name).map_err(|_| ResolveError::BlankName(kind))?;
                if let Some(id) = self.find_by_name(kind, &name)? {
                    return Ok(id);
                }
                match policy {
                    ResolvePolicy::MustExist => Err(ResolveError::Missing {
                        kind,
                        key: ReferenceKey::Name(name),
                    }),
                    ResolvePolicy::CreateIfMissing => self.create_by_name(kind, &name),
                }
            }
        }
    }
}

impl SqliteStore<'_> {
    fn find_by_name(&self, kind: ReferencedKind, name: &str) -> Result<Option<Uuid>, ResolveError> {
        let found: Option<String> = self
            .conn()
            .query_row(kind.find_by_name_sql(), [name], |row| row.get(0))
            .optional()?;
        Ok(found
            .map(|text| parse_uuid(kind.entity().table(), &text))
            .transpose()?)
    }

    fn create_by_name(&self, kind: ReferencedKind, name: &str) -> Result<Uuid, ResolveError> {
        let upsert = kind.upsert_sql().ok_or(ResolveError::NotCreatable(kind))?;
        let candidate = Uuid::new_v4();
        let inserted = self
            .conn()
            .execute(upsert, [candidate.to_string(), name.to_string()])?;

        let Some(id) = self.find_by_name(kind, name)? else {
            warn!(
                "event=dependent_create module=reconcile status=error kind={} error_code=read_back_missing",
                kind.entity().label()
            );
            return Err(ResolveError::Missing {
                kind,
                key: ReferenceKey::Name(name.to_string()),
            });
        };

        info!(
            "event=dependent_create module=reconcile status=ok kind={} created={}",
            kind.entity().label(),
            inserted == 1 && id == candidate
        );
        Ok(id)
    }
}

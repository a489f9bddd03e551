//! Owned attachment storage and the `update_owned` contract.
//!
//! # Responsibility
//! - Store uploaded files referenced by aggregate roots.
//! - Replace attachment content in place so owner references stay valid.
//!
//! # Invariants
//! - `update_owned` never returns a different id for an existing attachment
//!   and never drops an existing id when no new content is supplied.
//! - Content replacement runs outside the owner's commit batch.

use crate::model::api_endpoint::{Attachment, AttachmentContent, AttachmentId};
use crate::repo::store::{id_value, parse_uuid, RepoError, RepoResult, WriteStatement};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum AttachmentError {
    /// Owner references an attachment row that does not exist.
    Missing(AttachmentId),
    BlankFileName,
    Repo(RepoError),
}

impl Display for AttachmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(id) => write!(f, "attachment not found: {id}"),
            Self::BlankFileName => write!(f, "attachment file name must not be blank"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for AttachmentError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<RepoError> for AttachmentError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Child-entity service for attachments owned by aggregate roots.
pub trait AttachmentService {
    /// Reconciles one owned attachment reference.
    ///
    /// | existing | content | result                                   |
    /// |----------|---------|------------------------------------------|
    /// | `Some`   | `Some`  | content replaced, same id returned       |
    /// | `Some`   | `None`  | untouched, same id returned              |
    /// | `None`   | any     | `None`; nothing is created               |
    fn update_owned(
        &self,
        existing: Option<AttachmentId>,
        content: Option<&AttachmentContent>,
    ) -> Result<Option<AttachmentId>, AttachmentError>;

    /// Stores a new attachment and returns its id.
    fn create(&self, content: &AttachmentContent) -> Result<AttachmentId, AttachmentError>;
}

/// SQLite-backed attachment service.
pub struct SqliteAttachmentService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttachmentService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: AttachmentId) -> RepoResult<Option<Attachment>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, file_name, mime_type, content, updated_at
                 FROM attachments
                 WHERE id = ?1;",
                [id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id_text, file_name, mime_type, content, updated_at)| {
            Ok(Attachment {
                id: parse_uuid("attachments.id", &id_text)?,
                file_name,
                mime_type,
                content,
                updated_at,
            })
        })
        .transpose()
    }
}

impl AttachmentService for SqliteAttachmentService<'_> {
    fn update_owned(
        &self,
        existing: Option<AttachmentId>,
        content: Option<&AttachmentContent>,
    ) -> Result<Option<AttachmentId>, AttachmentError> {
        match (existing, content) {
            (Some(id), Some(content)) => {
                let file_name = checked_file_name(content)?;
                let changed = self.conn.execute(
                    "UPDATE attachments
                     SET
                        file_name = ?2,
                        mime_type = ?3,
                        content = ?4,
                        updated_at = (strftime('%s', 'now') * 1000)
                     WHERE id = ?1;",
                    params![
                        id.to_string(),
                        file_name,
                        content.mime_type.as_deref(),
                        content.content.as_slice(),
                    ],
                )?;
                if changed == 0 {
                    return Err(AttachmentError::Missing(id));
                }
                info!(
                    "event=attachment_update module=attachment status=ok bytes={}",
                    content.content.len()
                );
                Ok(Some(id))
            }
            (Some(id), None) => Ok(Some(id)),
            (None, Some(_)) => {
                warn!(
                    "event=attachment_update module=attachment status=skipped reason=no_existing_attachment"
                );
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    fn create(&self, content: &AttachmentContent) -> Result<AttachmentId, AttachmentError> {
        let file_name = checked_file_name(content)?;
        let id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attachments (id, file_name, mime_type, content)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                id.to_string(),
                file_name,
                content.mime_type.as_deref(),
                content.content.as_slice(),
            ],
        )?;
        Ok(id)
    }
}

/// Statement deleting one owned attachment inside its owner's batch.
pub fn delete_attachment_statement(id: AttachmentId) -> WriteStatement {
    WriteStatement::new(
        "attachment_delete",
        "DELETE FROM attachments WHERE id = ?1;",
        vec![id_value(id)],
    )
}

fn checked_file_name(content: &AttachmentContent) -> Result<&str, AttachmentError> {
    let trimmed = content.file_name.trim();
    if trimmed.is_empty() {
        return Err(AttachmentError::BlankFileName);
    }
    Ok(trimmed)
}

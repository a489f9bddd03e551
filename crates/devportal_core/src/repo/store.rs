//! Entity store: point lookups, association set lookups and atomic batches.
//!
//! # Responsibility
//! - Own the join-table layout of every association slot.
//! - Execute write batches with all-or-nothing visibility.
//!
//! # Invariants
//! - A batch runs inside one `BEGIN IMMEDIATE` transaction; any statement
//!   failure, row-count mismatch or expired deadline rolls back every
//!   statement already executed in that batch.
//! - The transaction guard rolls back on drop, so early returns and
//!   unwinding never leave a batch half-applied.
//! - Statements run in the order they were pushed.

use crate::db::DbError;
use log::{debug, error};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Read-side repository error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: EntityKind, id: Uuid },
    /// Unique natural key already taken.
    DuplicateName(String),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.label()),
            Self::DuplicateName(name) => write!(f, "name `{name}` is already taken"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } | Self::DuplicateName(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Every table-backed entity the core addresses by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Faq,
    FaqCategory,
    ApiEndpoint,
    ApiTag,
    AppEnvironment,
    Attachment,
    Author,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::Faq => "faqs",
            Self::FaqCategory => "faq_categories",
            Self::ApiEndpoint => "api_endpoints",
            Self::ApiTag => "api_tags",
            Self::AppEnvironment => "app_environments",
            Self::Attachment => "attachments",
            Self::Author => "authors",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Faq => "faq",
            Self::FaqCategory => "faq_category",
            Self::ApiEndpoint => "api_endpoint",
            Self::ApiTag => "api_tag",
            Self::AppEnvironment => "app_environment",
            Self::Attachment => "attachment",
            Self::Author => "author",
        }
    }
}

/// Many-to-many relationship from an aggregate root to a referenced entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationSlot {
    /// `faqs` ↔ `faq_categories` via `faq_faq_categories`.
    FaqCategories,
    /// `api_endpoints` ↔ `api_tags` via `api_endpoint_tags`.
    EndpointTags,
}

impl AssociationSlot {
    pub fn label(self) -> &'static str {
        match self {
            Self::FaqCategories => "faq_categories",
            Self::EndpointTags => "endpoint_tags",
        }
    }

    pub fn parent(self) -> EntityKind {
        match self {
            Self::FaqCategories => EntityKind::Faq,
            Self::EndpointTags => EntityKind::ApiEndpoint,
        }
    }

    pub fn child(self) -> EntityKind {
        match self {
            Self::FaqCategories => EntityKind::FaqCategory,
            Self::EndpointTags => EntityKind::ApiTag,
        }
    }

    fn select_rows_sql(self) -> &'static str {
        match self {
            Self::FaqCategories => {
                "SELECT id, faq_id, faq_category_id
                 FROM faq_faq_categories
                 WHERE faq_id = ?1
                 ORDER BY faq_category_id ASC;"
            }
            Self::EndpointTags => {
                "SELECT id, api_endpoint_id, api_tag_id
                 FROM api_endpoint_tags
                 WHERE api_endpoint_id = ?1
                 ORDER BY api_tag_id ASC;"
            }
        }
    }

    fn insert_row_sql(self) -> &'static str {
        match self {
            Self::FaqCategories => {
                "INSERT INTO faq_faq_categories (id, faq_id, faq_category_id)
                 VALUES (?1, ?2, ?3);"
            }
            Self::EndpointTags => {
                "INSERT INTO api_endpoint_tags (id, api_endpoint_id, api_tag_id)
                 VALUES (?1, ?2, ?3);"
            }
        }
    }

    fn delete_row_sql(self) -> &'static str {
        match self {
            Self::FaqCategories => {
                "DELETE FROM faq_faq_categories
                 WHERE faq_id = ?1 AND faq_category_id = ?2;"
            }
            Self::EndpointTags => {
                "DELETE FROM api_endpoint_tags
                 WHERE api_endpoint_id = ?1 AND api_tag_id = ?2;"
            }
        }
    }

    fn delete_all_sql(self) -> &'static str {
        match self {
            Self::FaqCategories => "DELETE FROM faq_faq_categories WHERE faq_id = ?1;",
            Self::EndpointTags => "DELETE FROM api_endpoint_tags WHERE api_endpoint_id = ?1;",
        }
    }

    fn detach_child_sql(self) -> &'static str {
        match self {
            Self::FaqCategories => "DELETE FROM faq_faq_categories WHERE faq_category_id = ?1;",
            Self::EndpointTags => "DELETE FROM api_endpoint_tags WHERE api_tag_id = ?1;",
        }
    }

    /// Statement inserting one join row.
    pub fn insert_row(self, row: &AssociationRow) -> WriteStatement {
        WriteStatement::new(
            "association_insert",
            self.insert_row_sql(),
            vec![id_value(row.id), id_value(row.parent_id), id_value(row.child_id)],
        )
        .expect_rows(1)
    }

    /// Statement deleting the live join row for `(parent_id, child_id)`.
    pub fn delete_row(self, parent_id: Uuid, child_id: Uuid) -> WriteStatement {
        WriteStatement::new(
            "association_delete",
            self.delete_row_sql(),
            vec![id_value(parent_id), id_value(child_id)],
        )
        .expect_rows(1)
    }

    /// Statement deleting every join row of one parent.
    pub fn delete_all(self, parent_id: Uuid) -> WriteStatement {
        WriteStatement::new(
            "association_clear",
            self.delete_all_sql(),
            vec![id_value(parent_id)],
        )
    }

    /// Statement deleting every join row that points at one child.
    pub fn detach_child(self, child_id: Uuid) -> WriteStatement {
        WriteStatement::new(
            "association_detach",
            self.detach_child_sql(),
            vec![id_value(child_id)],
        )
    }
}

/// One live join-table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationRow {
    pub id: Uuid,
    pub parent_id: Uuid,
    pub child_id: Uuid,
}

impl AssociationRow {
    /// Builds a row with a freshly generated join-row id.
    pub fn new(parent_id: Uuid, child_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id,
            child_id,
        }
    }
}

/// One labelled, parameterized statement inside a write batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteStatement {
    label: &'static str,
    sql: &'static str,
    params: Vec<Value>,
    expected_rows: Option<usize>,
}

impl WriteStatement {
    pub fn new(label: &'static str, sql: &'static str, params: Vec<Value>) -> Self {
        Self {
            label,
            sql,
            params,
            expected_rows: None,
        }
    }

    /// Aborts the batch unless exactly `rows` rows are affected.
    pub fn expect_rows(mut self, rows: usize) -> Self {
        self.expected_rows = Some(rows);
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn sql(&self) -> &'static str {
        self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Ordered statements committed together or not at all.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBatch {
    name: &'static str,
    statements: Vec<WriteStatement>,
    deadline: Option<Instant>,
}

impl WriteBatch {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            statements: Vec::new(),
            deadline: None,
        }
    }

    pub fn push(&mut self, statement: WriteStatement) {
        self.statements.push(statement);
    }

    pub fn extend(&mut self, statements: impl IntoIterator<Item = WriteStatement>) {
        self.statements.extend(statements);
    }

    /// Sets the instant after which the batch must abort instead of commit.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn statements(&self) -> &[WriteStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Why a batch was rolled back.
#[derive(Debug)]
pub enum AbortCause {
    Begin(rusqlite::Error),
    Statement {
        label: &'static str,
        index: usize,
        error: rusqlite::Error,
    },
    RowCountMismatch {
        label: &'static str,
        index: usize,
        expected: usize,
        actual: usize,
    },
    DeadlineExceeded {
        executed: usize,
    },
    Commit(rusqlite::Error),
}

/// The single failure surfaced by `run_atomic`; nothing of the batch is visible.
#[derive(Debug)]
pub struct StorageFailure {
    pub batch: &'static str,
    pub cause: AbortCause,
}

impl Display for StorageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let batch = self.batch;
        match &self.cause {
            AbortCause::Begin(err) => write!(f, "batch `{batch}` could not begin: {err}"),
            AbortCause::Statement { label, index, error } => write!(
                f,
                "batch `{batch}` aborted at statement {index} (`{label}`): {error}"
            ),
            AbortCause::RowCountMismatch {
                label,
                index,
                expected,
                actual,
            } => write!(
                f,
                "batch `{batch}` aborted at statement {index} (`{label}`): expected {expected} row(s), affected {actual}"
            ),
            AbortCause::DeadlineExceeded { executed } => write!(
                f,
                "batch `{batch}` aborted after {executed} statement(s): deadline exceeded"
            ),
            AbortCause::Commit(err) => write!(f, "batch `{batch}` failed to commit: {err}"),
        }
    }
}

impl Error for StorageFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            AbortCause::Begin(err) | AbortCause::Commit(err) => Some(err),
            AbortCause::Statement { error, .. } => Some(error),
            AbortCause::RowCountMismatch { .. } | AbortCause::DeadlineExceeded { .. } => None,
        }
    }
}

/// Summary of a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    pub statements: usize,
    pub rows_affected: usize,
}

/// Storage contract used by the reconciliation orchestrator.
pub trait EntityStore {
    /// Returns whether a row with `id` exists for `kind`.
    fn exists(&self, kind: EntityKind, id: Uuid) -> RepoResult<bool>;
    /// Returns the child ids currently linked to `parent_id` through `slot`.
    fn list_association_ids(&self, parent_id: Uuid, slot: AssociationSlot)
        -> RepoResult<BTreeSet<Uuid>>;
    /// Executes the batch with all-or-nothing visibility.
    fn run_atomic(&self, batch: &WriteBatch) -> Result<BatchReceipt, StorageFailure>;
}

/// SQLite-backed entity store over a migrated connection.
///
/// The store borrows the connection, so each reconciliation can use its own
/// connection while tests inspect the same database through another handle.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStore<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub(crate) fn conn(&self) -> &'conn Connection {
        self.conn
    }

    /// Lists the live join rows of one parent, ordered by child id.
    pub fn association_rows(
        &self,
        parent_id: Uuid,
        slot: AssociationSlot,
    ) -> RepoResult<Vec<AssociationRow>> {
        let mut stmt = self.conn.prepare(slot.select_rows_sql())?;
        let mut rows = stmt.query([parent_id.to_string()])?;
        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let parent: String = row.get(1)?;
            let child: String = row.get(2)?;
            found.push(AssociationRow {
                id: parse_uuid(slot.label(), &id)?,
                parent_id: parse_uuid(slot.label(), &parent)?,
                child_id: parse_uuid(slot.label(), &child)?,
            });
        }
        Ok(found)
    }

    fn execute_batch(&self, batch: &WriteBatch) -> Result<BatchReceipt, AbortCause> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(AbortCause::Begin)?;

        let mut rows_affected = 0;
        for (index, statement) in batch.statements.iter().enumerate() {
            if batch.deadline_passed() {
                return Err(AbortCause::DeadlineExceeded { executed: index });
            }

            let changed = tx
                .execute(statement.sql, params_from_iter(statement.params.iter()))
                .map_err(|error| AbortCause::Statement {
                    label: statement.label,
                    index,
                    error,
                })?;

            if let Some(expected) = statement.expected_rows {
                if changed != expected {
                    return Err(AbortCause::RowCountMismatch {
                        label: statement.label,
                        index,
                        expected,
                        actual: changed,
                    });
                }
            }
            rows_affected += changed;
        }

        if batch.deadline_passed() {
            return Err(AbortCause::DeadlineExceeded {
                executed: batch.statements.len(),
            });
        }

        tx.commit().map_err(AbortCause::Commit)?;
        Ok(BatchReceipt {
            statements: batch.statements.len(),
            rows_affected,
        })
    }
}

impl EntityStore for SqliteStore<'_> {
    fn exists(&self, kind: EntityKind, id: Uuid) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1);",
                kind.table()
            ),
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_association_ids(
        &self,
        parent_id: Uuid,
        slot: AssociationSlot,
    ) -> RepoResult<BTreeSet<Uuid>> {
        Ok(self
            .association_rows(parent_id, slot)?
            .into_iter()
            .map(|row| row.child_id)
            .collect())
    }

    fn run_atomic(&self, batch: &WriteBatch) -> Result<BatchReceipt, StorageFailure> {
        let started_at = Instant::now();
        match self.execute_batch(batch) {
            Ok(receipt) => {
                debug!(
                    "event=store_batch module=store status=ok batch={} statements={} rows={} duration_ms={}",
                    batch.name,
                    receipt.statements,
                    receipt.rows_affected,
                    started_at.elapsed().as_millis()
                );
                Ok(receipt)
            }
            Err(cause) => {
                let failure = StorageFailure {
                    batch: batch.name,
                    cause,
                };
                error!(
                    "event=store_batch module=store status=rolled_back batch={} statements={} duration_ms={} error={}",
                    batch.name,
                    batch.len(),
                    started_at.elapsed().as_millis(),
                    failure
                );
                Err(failure)
            }
        }
    }
}

/// Maps a `UNIQUE` violation on a natural-key insert or update to
/// `DuplicateName`; every other error passes through.
pub(crate) fn unique_name_error(err: rusqlite::Error, name: &str) -> RepoError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            RepoError::DuplicateName(name.to_string())
        }
        _ => err.into(),
    }
}

pub(crate) fn id_value(id: Uuid) -> Value {
    Value::Text(id.to_string())
}

pub(crate) fn opt_id_value(id: Option<Uuid>) -> Value {
    id.map_or(Value::Null, id_value)
}

pub(crate) fn text_value(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn opt_text_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text_value)
}

pub(crate) fn flag_value(value: bool) -> Value {
    Value::Integer(i64::from(value))
}

pub(crate) fn parse_uuid(column: &str, value: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_opt_uuid(column: &str, value: Option<String>) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(column, &text)).transpose()
}

pub(crate) fn parse_flag(column: &str, value: i64) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;
    use std::time::Duration;

    fn insert_category(conn: &Connection, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        conn.execute(
            "INSERT INTO faq_categories (id, name) VALUES (?1, ?2);",
            [id.to_string(), name.to_string()],
        )
        .unwrap();
        id
    }

    fn count_categories(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM faq_categories;", [], |row| row.get(0))
            .unwrap()
    }

    fn insert_category_statement(name: &str) -> WriteStatement {
        WriteStatement::new(
            "category_insert",
            "INSERT INTO faq_categories (id, name) VALUES (?1, ?2);",
            vec![id_value(Uuid::new_v4()), text_value(name)],
        )
    }

    #[test]
    fn committed_batch_reports_rows() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let mut batch = WriteBatch::new("seed");
        batch.push(insert_category_statement("a"));
        batch.push(insert_category_statement("b"));

        let receipt = store.run_atomic(&batch).unwrap();
        assert_eq!(receipt.statements, 2);
        assert_eq!(receipt.rows_affected, 2);
        assert_eq!(count_categories(&conn), 2);
    }

    #[test]
    fn failing_statement_discards_earlier_statements() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let mut batch = WriteBatch::new("dup");
        batch.push(insert_category_statement("same"));
        batch.push(insert_category_statement("SAME"));

        let failure = store.run_atomic(&batch).unwrap_err();
        assert!(matches!(
            failure.cause,
            AbortCause::Statement { index: 1, .. }
        ));
        assert_eq!(count_categories(&conn), 0);
    }

    #[test]
    fn row_count_mismatch_rolls_back() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let mut batch = WriteBatch::new("mismatch");
        batch.push(insert_category_statement("kept-out"));
        batch.push(AssociationSlot::FaqCategories.delete_row(Uuid::new_v4(), Uuid::new_v4()));

        let failure = store.run_atomic(&batch).unwrap_err();
        assert!(matches!(
            failure.cause,
            AbortCause::RowCountMismatch {
                expected: 1,
                actual: 0,
                ..
            }
        ));
        assert_eq!(count_categories(&conn), 0);
    }

    #[test]
    fn expired_deadline_aborts_without_effect() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let mut batch = WriteBatch::new("late");
        batch.push(insert_category_statement("never"));
        let batch = batch.with_deadline(Some(Instant::now() - Duration::from_millis(1)));

        let failure = store.run_atomic(&batch).unwrap_err();
        assert!(matches!(
            failure.cause,
            AbortCause::DeadlineExceeded { executed: 0 }
        ));
        assert_eq!(count_categories(&conn), 0);
    }

    #[test]
    fn exists_checks_the_kind_table() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        let id = insert_category(&conn, "present");

        assert!(store.exists(EntityKind::FaqCategory, id).unwrap());
        assert!(!store.exists(EntityKind::ApiTag, id).unwrap());
    }
}

//! Author persistence.

use crate::model::api_endpoint::AttachmentId;
use crate::model::author::{Author, AuthorId};
use crate::repo::paging::{ListQuery, SortField};
use crate::repo::store::{
    id_value, opt_id_value, opt_text_value, parse_opt_uuid, parse_uuid, text_value, EntityStore,
    RepoResult, SqliteStore, WriteStatement,
};
use rusqlite::{params, OptionalExtension, Row};

const AUTHOR_SELECT_SQL: &str = "SELECT id, name, image_id, details FROM authors";

/// Columns an author list may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorSortField {
    Name,
    Details,
}

impl SortField for AuthorSortField {
    fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Details => "details",
        }
    }
}

impl AuthorSortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "details" => Some(Self::Details),
            _ => None,
        }
    }
}

/// Author list options. Defaults to `name ASC`.
pub type AuthorListQuery = ListQuery<AuthorSortField>;

/// Repository interface for the author aggregate.
pub trait AuthorRepository: EntityStore {
    fn get_author(&self, id: AuthorId) -> RepoResult<Option<Author>>;
    fn list_authors(&self, query: &AuthorListQuery) -> RepoResult<Vec<Author>>;
}

impl AuthorRepository for SqliteStore<'_> {
    fn get_author(&self, id: AuthorId) -> RepoResult<Option<Author>> {
        let row = self
            .conn()
            .query_row(
                &format!("{AUTHOR_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(read_author_row(row)),
            )
            .optional()?;
        row.transpose()
    }

    fn list_authors(&self, query: &AuthorListQuery) -> RepoResult<Vec<Author>> {
        let sql = format!(
            "{AUTHOR_SELECT_SQL} {} LIMIT ?1 OFFSET ?2;",
            query.order_by(AuthorSortField::Name)
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt.query(params![
            i64::from(query.page_limit()),
            i64::from(query.offset)
        ])?;
        let mut authors = Vec::new();
        while let Some(row) = rows.next()? {
            authors.push(read_author_row(row)?);
        }
        Ok(authors)
    }
}

fn read_author_row(row: &Row<'_>) -> RepoResult<Author> {
    let id_text: String = row.get("id")?;
    Ok(Author {
        id: parse_uuid("authors.id", &id_text)?,
        name: row.get("name")?,
        image: parse_opt_uuid("authors.image_id", row.get("image_id")?)?,
        details: row.get("details")?,
    })
}

pub fn insert_author_statement(author: &Author) -> WriteStatement {
    WriteStatement::new(
        "author_insert",
        "INSERT INTO authors (id, name, image_id, details) VALUES (?1, ?2, ?3, ?4);",
        vec![
            id_value(author.id),
            text_value(author.name.trim()),
            opt_id_value(author.image),
            opt_text_value(author.details.as_deref()),
        ],
    )
    .expect_rows(1)
}

/// Statement rewriting name, details and the image reference.
pub fn update_author_statement(
    id: AuthorId,
    name: &str,
    details: Option<&str>,
    image: Option<AttachmentId>,
) -> WriteStatement {
    WriteStatement::new(
        "author_update",
        "UPDATE authors SET name = ?2, image_id = ?3, details = ?4 WHERE id = ?1;",
        vec![
            id_value(id),
            text_value(name.trim()),
            opt_id_value(image),
            opt_text_value(details),
        ],
    )
    .expect_rows(1)
}

pub fn delete_author_statement(id: AuthorId) -> WriteStatement {
    WriteStatement::new(
        "author_delete",
        "DELETE FROM authors WHERE id = ?1;",
        vec![id_value(id)],
    )
    .expect_rows(1)
}

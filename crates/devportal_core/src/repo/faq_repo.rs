//! FAQ and FAQ category persistence.
//!
//! # Responsibility
//! - Load FAQs together with their category slot.
//! - Build the FAQ root statements used inside reconciliation batches.
//! - Keep list ordering behind an allow-list of sortable columns.
//!
//! # Invariants
//! - Root updates replace every scalar column and refresh `changed_at`.
//! - List queries never interpolate caller text into SQL.

use crate::model::faq::{Faq, FaqCategory, FaqCategoryId, FaqFields, FaqId};
use crate::reconcile::resolver::DependentResolver;
use crate::repo::paging::{ListQuery, SortField};
use crate::repo::store::{
    flag_value, id_value, parse_flag, parse_uuid, text_value, unique_name_error,
    AssociationSlot, EntityStore, RepoError, RepoResult, SqliteStore, WriteStatement,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

const FAQ_SELECT_SQL: &str = "SELECT
    id,
    question,
    answer,
    langcode,
    status,
    faq_order,
    created_at,
    changed_at
FROM faqs";

const CATEGORY_SELECT_SQL: &str = "SELECT id, name, description FROM faq_categories";

/// Columns a FAQ list may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaqSortField {
    Question,
    Langcode,
    FaqOrder,
    CreatedAt,
    ChangedAt,
}

impl SortField for FaqSortField {
    fn column(self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Langcode => "langcode",
            Self::FaqOrder => "faq_order",
            Self::CreatedAt => "created_at",
            Self::ChangedAt => "changed_at",
        }
    }
}

impl FaqSortField {
    /// Maps a caller-supplied field name onto the allow-list.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "question" => Some(Self::Question),
            "langcode" => Some(Self::Langcode),
            "faq_order" | "faqorder" => Some(Self::FaqOrder),
            "created" | "created_at" => Some(Self::CreatedAt),
            "changed" | "changed_at" => Some(Self::ChangedAt),
            _ => None,
        }
    }
}

/// Columns a category list may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategorySortField {
    Name,
    Description,
}

impl SortField for CategorySortField {
    fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
        }
    }
}

impl CategorySortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "description" => Some(Self::Description),
            _ => None,
        }
    }
}

/// FAQ list options. Defaults to `faq_order ASC`.
pub type FaqListQuery = ListQuery<FaqSortField>;

/// Category list options. Defaults to `name ASC`.
pub type CategoryListQuery = ListQuery<CategorySortField>;

/// Repository interface for the FAQ aggregate.
pub trait FaqRepository: EntityStore + DependentResolver {
    /// Loads one FAQ with its current category ids.
    fn get_faq(&self, id: FaqId) -> RepoResult<Option<Faq>>;
    /// Lists FAQs, each with its own category ids.
    fn list_faqs(&self, query: &FaqListQuery) -> RepoResult<Vec<Faq>>;
    /// Inserts one category; a taken name gives `DuplicateName`.
    fn create_faq_category(&self, category: &FaqCategory) -> RepoResult<FaqCategoryId>;
    fn get_faq_category(&self, id: FaqCategoryId) -> RepoResult<Option<FaqCategory>>;
    /// Rewrites name and description; returns `false` when no row matched.
    fn update_faq_category(&self, category: &FaqCategory) -> RepoResult<bool>;
    fn list_faq_categories(&self, query: &CategoryListQuery) -> RepoResult<Vec<FaqCategory>>;
}

impl FaqRepository for SqliteStore<'_> {
    fn get_faq(&self, id: FaqId) -> RepoResult<Option<Faq>> {
        let row = self
            .conn()
            .query_row(
                &format!("{FAQ_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(read_faq_row(row)),
            )
            .optional()?;

        match row {
            Some(parsed) => {
                let mut faq = parsed?;
                faq.categories = self
                    .list_association_ids(faq.id, AssociationSlot::FaqCategories)?
                    .into_iter()
                    .collect();
                Ok(Some(faq))
            }
            None => Ok(None),
        }
    }

    fn list_faqs(&self, query: &FaqListQuery) -> RepoResult<Vec<Faq>> {
        let sql = format!(
            "{FAQ_SELECT_SQL} {} LIMIT ? OFFSET ?;",
            query.order_by(FaqSortField::FaqOrder)
        );
        let bind_values = vec![
            Value::Integer(i64::from(query.page_limit())),
            Value::Integer(i64::from(query.offset)),
        ];

        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut faqs = Vec::new();
        while let Some(row) = rows.next()? {
            faqs.push(read_faq_row(row)?);
        }

        for faq in &mut faqs {
            faq.categories = self
                .list_association_ids(faq.id, AssociationSlot::FaqCategories)?
                .into_iter()
                .collect();
        }
        Ok(faqs)
    }

    fn create_faq_category(&self, category: &FaqCategory) -> RepoResult<FaqCategoryId> {
        self.conn()
            .execute(
                "INSERT INTO faq_categories (id, name, description) VALUES (?1, ?2, ?3);",
                params![
                    category.id.to_string(),
                    category.name.trim(),
                    category.description.as_deref(),
                ],
            )
            .map_err(|err| unique_name_error(err, category.name.trim()))?;
        Ok(category.id)
    }

    fn get_faq_category(&self, id: FaqCategoryId) -> RepoResult<Option<FaqCategory>> {
        let row = self
            .conn()
            .query_row(
                &format!("{CATEGORY_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(read_category_row(row)),
            )
            .optional()?;
        row.transpose()
    }

    fn update_faq_category(&self, category: &FaqCategory) -> RepoResult<bool> {
        let changed = self
            .conn()
            .execute(
                "UPDATE faq_categories SET name = ?2, description = ?3 WHERE id = ?1;",
                params![
                    category.id.to_string(),
                    category.name.trim(),
                    category.description.as_deref(),
                ],
            )
            .map_err(|err| unique_name_error(err, category.name.trim()))?;
        Ok(changed == 1)
    }

    fn list_faq_categories(&self, query: &CategoryListQuery) -> RepoResult<Vec<FaqCategory>> {
        let sql = format!(
            "{CATEGORY_SELECT_SQL} {} LIMIT ?1 OFFSET ?2;",
            query.order_by(CategorySortField::Name)
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let mut rows = stmt.query(params![
            i64::from(query.page_limit()),
            i64::from(query.offset)
        ])?;
        let mut categories = Vec::new();
        while let Some(row) = rows.next()? {
            categories.push(read_category_row(row)?);
        }
        Ok(categories)
    }
}

/// Statement inserting a new FAQ root row.
pub fn insert_faq_statement(id: FaqId, fields: &FaqFields) -> WriteStatement {
    WriteStatement::new(
        "faq_insert",
        "INSERT INTO faqs (id, question, answer, langcode, status, faq_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        vec![
            id_value(id),
            text_value(&fields.question),
            text_value(&fields.answer),
            text_value(fields.langcode.trim()),
            flag_value(fields.status),
            Value::Integer(i64::from(fields.faq_order)),
        ],
    )
    .expect_rows(1)
}

/// Statement replacing every scalar column of one FAQ.
pub fn update_faq_statement(id: FaqId, fields: &FaqFields) -> WriteStatement {
    WriteStatement::new(
        "faq_update",
        "UPDATE faqs
         SET
            question = ?2,
            answer = ?3,
            langcode = ?4,
            status = ?5,
            faq_order = ?6,
            changed_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        vec![
            id_value(id),
            text_value(&fields.question),
            text_value(&fields.answer),
            text_value(fields.langcode.trim()),
            flag_value(fields.status),
            Value::Integer(i64::from(fields.faq_order)),
        ],
    )
    .expect_rows(1)
}

/// Statement deleting one category row.
pub fn delete_faq_category_statement(id: FaqCategoryId) -> WriteStatement {
    WriteStatement::new(
        "faq_category_delete",
        "DELETE FROM faq_categories WHERE id = ?1;",
        vec![id_value(id)],
    )
    .expect_rows(1)
}

/// Statement deleting one FAQ root row.
pub fn delete_faq_statement(id: FaqId) -> WriteStatement {
    WriteStatement::new(
        "faq_delete",
        "DELETE FROM faqs WHERE id = ?1;",
        vec![id_value(id)],
    )
    .expect_rows(1)
}

fn read_category_row(row: &Row<'_>) -> RepoResult<FaqCategory> {
    let id_text: String = row.get("id")?;
    Ok(FaqCategory {
        id: parse_uuid("faq_categories.id", &id_text)?,
        name: row.get("name")?,
        description: row.get("description")?,
    })
}

fn read_faq_row(row: &Row<'_>) -> RepoResult<Faq> {
    let id_text: String = row.get("id")?;
    let faq_order: i64 = row.get("faq_order")?;
    let faq_order = i32::try_from(faq_order).map_err(|_| {
        RepoError::InvalidData(format!(
            "faq_order `{faq_order}` out of range in faqs.faq_order"
        ))
    })?;

    Ok(Faq {
        id: parse_uuid("faqs.id", &id_text)?,
        fields: FaqFields {
            question: row.get("question")?,
            answer: row.get("answer")?,
            langcode: row.get("langcode")?,
            status: parse_flag("faqs.status", row.get("status")?)?,
            faq_order,
        },
        created_at: row.get("created_at")?,
        changed_at: row.get("changed_at")?,
        categories: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;

    fn category(name: &str) -> FaqCategory {
        FaqCategory {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            description: None,
        }
    }

    #[test]
    fn sort_field_parse_rejects_unknown_columns() {
        assert_eq!(FaqSortField::parse("Question"), Some(FaqSortField::Question));
        assert_eq!(FaqSortField::parse("changed"), Some(FaqSortField::ChangedAt));
        assert_eq!(FaqSortField::parse("id; DROP TABLE faqs"), None);
        assert_eq!(CategorySortField::parse("NAME"), Some(CategorySortField::Name));
        assert_eq!(CategorySortField::parse("name desc"), None);
    }

    #[test]
    fn taken_category_name_maps_to_duplicate_name() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        store.create_faq_category(&category("Billing")).unwrap();

        let err = store.create_faq_category(&category("billing")).unwrap_err();
        assert!(matches!(err, RepoError::DuplicateName(ref name) if name == "billing"));

        let other = category("Accounts");
        store.create_faq_category(&other).unwrap();
        let renamed = FaqCategory {
            name: "BILLING".to_string(),
            ..other
        };
        let err = store.update_faq_category(&renamed).unwrap_err();
        assert!(matches!(err, RepoError::DuplicateName(_)));
    }

    #[test]
    fn update_reports_missing_row() {
        let conn = open_db_in_memory().unwrap();
        let store = SqliteStore::new(&conn);
        assert!(!store.update_faq_category(&category("Ghost")).unwrap());
    }
}

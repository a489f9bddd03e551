//! FAQ use-case service.
//!
//! # Responsibility
//! - Create, read, list, update and delete FAQs.
//! - Reconcile the FAQ ↔ category association slot on update.
//! - Create, rename, list and delete FAQ categories under their unique
//!   natural key.
//!
//! # Invariants
//! - Categories are referenced by id and must already exist.
//! - `categories: None` on update leaves the slot untouched; `Some(vec![])`
//!   removes every association.
//! - Deleting a category first detaches it from every FAQ, in the same batch.
//! - Nil ids and an explicit zero page size are client errors.

use crate::model::faq::{Faq, FaqCategory, FaqCategoryId, FaqFields, FaqId};
use crate::model::validation::{normalize_name, require_flag, require_id, ValidationError};
use crate::reconcile::error::{ReconcileError, ReconcileResult};
use crate::reconcile::orchestrator::{ReconcileConfig, ReconcileStage, Reconciliation};
use crate::reconcile::resolver::{
    resolve_all, Reference, ReferenceKey, ReferencedKind, ResolveError, ResolvePolicy,
};
use crate::repo::faq_repo::{
    delete_faq_category_statement, delete_faq_statement, insert_faq_statement,
    update_faq_statement, CategoryListQuery, FaqListQuery, FaqRepository,
};
use crate::repo::store::{
    AssociationRow, AssociationSlot, EntityKind, WriteBatch, WriteStatement,
};
use crate::service::commit_batch;
use log::info;
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Payload for creating one FAQ.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateFaqRequest {
    pub question: String,
    pub answer: String,
    pub langcode: String,
    pub status: Option<bool>,
    pub faq_order: Option<i32>,
    #[serde(default)]
    pub categories: Vec<FaqCategoryId>,
}

/// Payload for updating one FAQ.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateFaqRequest {
    pub id: FaqId,
    pub question: String,
    pub answer: String,
    pub langcode: String,
    pub status: Option<bool>,
    pub faq_order: Option<i32>,
    /// Desired category set; `None` keeps the current associations.
    #[serde(default)]
    pub categories: Option<Vec<FaqCategoryId>>,
}

/// Payload for creating one FAQ category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateFaqCategoryRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Payload for renaming or re-describing one FAQ category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateFaqCategoryRequest {
    pub id: FaqCategoryId,
    pub name: String,
    pub description: Option<String>,
}

/// FAQ service facade over repository implementations.
pub struct FaqService<R: FaqRepository> {
    repo: R,
    config: ReconcileConfig,
}

impl<R: FaqRepository> FaqService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self::with_config(repo, ReconcileConfig::default())
    }

    pub fn with_config(repo: R, config: ReconcileConfig) -> Self {
        Self { repo, config }
    }

    /// Creates one FAQ and links it to existing categories in one batch.
    pub fn create_faq(&self, request: &CreateFaqRequest) -> ReconcileResult<FaqId> {
        let fields = faq_fields(
            &request.question,
            &request.answer,
            &request.langcode,
            request.status,
            request.faq_order,
        )?;
        require_ids("categories", &request.categories)?;
        let categories = self.resolve_categories(&request.categories)?;

        let id = Uuid::new_v4();
        let mut batch = WriteBatch::new("faq_create");
        batch.push(insert_faq_statement(id, &fields));
        batch.extend(categories.iter().map(|category_id| {
            AssociationSlot::FaqCategories.insert_row(&AssociationRow::new(id, *category_id))
        }));
        commit_batch(&self.repo, &self.config, batch, id)?;
        Ok(id)
    }

    /// Gets one FAQ with its category ids.
    pub fn get_faq(&self, id: FaqId) -> ReconcileResult<Faq> {
        require_id("id", id)?;
        self.repo
            .get_faq(id)?
            .ok_or(ReconcileError::RootNotFound {
                entity: EntityKind::Faq,
                id,
            })
    }

    /// Lists one page of FAQs. A page past the end is empty, not an error.
    pub fn list_faqs(&self, query: &FaqListQuery) -> ReconcileResult<Vec<Faq>> {
        query.validate()?;
        Ok(self.repo.list_faqs(query)?)
    }

    /// Reconciles one FAQ against the request and commits atomically.
    pub fn update_faq(&self, request: &UpdateFaqRequest) -> ReconcileResult<FaqId> {
        let mut run = Reconciliation::start(&self.repo, self.config, EntityKind::Faq, request.id);
        let result = self
            .plan(&mut run, request)
            .and_then(|root_update| run.commit(root_update));
        run.finish(result)
    }

    /// Runs every update stage up to `Diffed` and returns the batch that
    /// `update_faq` would commit, without committing it.
    pub fn plan_update(&self, request: &UpdateFaqRequest) -> ReconcileResult<WriteBatch> {
        let mut run = Reconciliation::start(&self.repo, self.config, EntityKind::Faq, request.id);
        let result = self
            .plan(&mut run, request)
            .map(|root_update| run.build_batch(root_update));
        run.finish(result)
    }

    /// Deletes one FAQ and its category associations.
    pub fn delete_faq(&self, id: FaqId) -> ReconcileResult<()> {
        require_id("id", id)?;
        if !self.repo.exists(EntityKind::Faq, id)? {
            return Err(ReconcileError::RootNotFound {
                entity: EntityKind::Faq,
                id,
            });
        }

        let mut batch = WriteBatch::new("faq_delete");
        batch.push(AssociationSlot::FaqCategories.delete_all(id));
        batch.push(delete_faq_statement(id));
        commit_batch(&self.repo, &self.config, batch, id)
    }

    /// Creates one category; names are unique ignoring case.
    pub fn create_category(
        &self,
        request: &CreateFaqCategoryRequest,
    ) -> ReconcileResult<FaqCategoryId> {
        let category = FaqCategory {
            id: Uuid::new_v4(),
            name: normalize_name("name", &request.name)?,
            description: request.description.clone(),
        };
        category.validate()?;

        let lookup = Reference {
            kind: ReferencedKind::FaqCategory,
            key: ReferenceKey::Name(category.name.clone()),
            policy: ResolvePolicy::MustExist,
        };
        match self.repo.resolve(&lookup) {
            Ok(_) => return Err(ValidationError::DuplicateName(category.name).into()),
            Err(ResolveError::Missing { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        Ok(self.repo.create_faq_category(&category)?)
    }

    pub fn get_category(&self, id: FaqCategoryId) -> ReconcileResult<FaqCategory> {
        require_id("id", id)?;
        self.repo
            .get_faq_category(id)?
            .ok_or(ReconcileError::RootNotFound {
                entity: EntityKind::FaqCategory,
                id,
            })
    }

    /// Replaces name and description of one category.
    pub fn update_category(
        &self,
        request: &UpdateFaqCategoryRequest,
    ) -> ReconcileResult<FaqCategoryId> {
        require_id("id", request.id)?;
        let category = FaqCategory {
            id: request.id,
            name: normalize_name("name", &request.name)?,
            description: request.description.clone(),
        };
        category.validate()?;

        let lookup = Reference {
            kind: ReferencedKind::FaqCategory,
            key: ReferenceKey::Name(category.name.clone()),
            policy: ResolvePolicy::MustExist,
        };
        match self.repo.resolve(&lookup) {
            Ok(owner) if owner != category.id => {
                return Err(ValidationError::DuplicateName(category.name).into());
            }
            Ok(_) | Err(ResolveError::Missing { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        if !self.repo.update_faq_category(&category)? {
            return Err(ReconcileError::RootNotFound {
                entity: EntityKind::FaqCategory,
                id: category.id,
            });
        }
        info!(
            "event=faq_category_update module=service status=ok id={}",
            category.id
        );
        Ok(category.id)
    }

    /// Deletes one category after detaching it from every FAQ.
    pub fn delete_category(&self, id: FaqCategoryId) -> ReconcileResult<()> {
        require_id("id", id)?;
        if !self.repo.exists(EntityKind::FaqCategory, id)? {
            return Err(ReconcileError::RootNotFound {
                entity: EntityKind::FaqCategory,
                id,
            });
        }

        let mut batch = WriteBatch::new("faq_category_delete");
        batch.push(AssociationSlot::FaqCategories.detach_child(id));
        batch.push(delete_faq_category_statement(id));
        commit_batch(&self.repo, &self.config, batch, id)
    }

    pub fn list_categories(
        &self,
        query: &CategoryListQuery,
    ) -> ReconcileResult<Vec<FaqCategory>> {
        query.validate()?;
        Ok(self.repo.list_faq_categories(query)?)
    }

    fn plan(
        &self,
        run: &mut Reconciliation<'_, R>,
        request: &UpdateFaqRequest,
    ) -> ReconcileResult<WriteStatement> {
        require_id("id", request.id)?;
        let fields = faq_fields(
            &request.question,
            &request.answer,
            &request.langcode,
            request.status,
            request.faq_order,
        )?;
        if let Some(categories) = &request.categories {
            require_ids("categories", categories)?;
        }
        run.advance(ReconcileStage::Validated)?;

        run.require_root(self.repo.get_faq(request.id)?)?;

        let desired = request
            .categories
            .as_deref()
            .map(|categories| self.resolve_categories(categories))
            .transpose()?;
        run.advance(ReconcileStage::DependentsResolved)?;

        if let Some(desired) = &desired {
            run.diff_slot(AssociationSlot::FaqCategories, desired)?;
        }
        run.advance(ReconcileStage::Diffed)?;

        Ok(update_faq_statement(request.id, &fields))
    }

    fn resolve_categories(&self, ids: &[FaqCategoryId]) -> ReconcileResult<BTreeSet<Uuid>> {
        let references: Vec<Reference> = ids
            .iter()
            .map(|id| Reference::existing(ReferencedKind::FaqCategory, *id))
            .collect();
        Ok(resolve_all(&self.repo, &references)?)
    }
}

fn require_ids(field: &'static str, ids: &[Uuid]) -> Result<(), ValidationError> {
    for id in ids {
        require_id(field, *id)?;
    }
    Ok(())
}

fn faq_fields(
    question: &str,
    answer: &str,
    langcode: &str,
    status: Option<bool>,
    faq_order: Option<i32>,
) -> Result<FaqFields, ValidationError> {
    let fields = FaqFields {
        question: question.to_string(),
        answer: answer.to_string(),
        langcode: langcode.trim().to_string(),
        status: require_flag("status", status)?,
        faq_order: faq_order.ok_or(ValidationError::MissingField("faq_order"))?,
    };
    fields.validate()?;
    Ok(fields)
}

//! Author use-case service.
//!
//! Authors own one optional image attachment and no association slots; an
//! update still walks every reconciliation stage so the image reference is
//! checked and replaced the same way endpoint attachments are.

use crate::model::api_endpoint::AttachmentContent;
use crate::model::author::{Author, AuthorId};
use crate::model::validation::{require_id, require_text};
use crate::reconcile::error::{ReconcileError, ReconcileResult};
use crate::reconcile::orchestrator::{ReconcileConfig, ReconcileStage, Reconciliation};
use crate::repo::attachment_repo::{delete_attachment_statement, AttachmentService};
use crate::repo::author_repo::{
    delete_author_statement, insert_author_statement, update_author_statement, AuthorListQuery,
    AuthorRepository,
};
use crate::repo::store::{EntityKind, WriteBatch, WriteStatement};
use crate::service::commit_batch;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateAuthorRequest {
    pub name: String,
    pub details: Option<String>,
    pub image: Option<AttachmentContent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateAuthorRequest {
    pub id: AuthorId,
    pub name: String,
    pub details: Option<String>,
    /// New content for the existing image attachment.
    pub image: Option<AttachmentContent>,
}

pub struct AuthorService<R: AuthorRepository, A: AttachmentService> {
    repo: R,
    attachments: A,
    config: ReconcileConfig,
}

impl<R: AuthorRepository, A: AttachmentService> AuthorService<R, A> {
    pub fn new(repo: R, attachments: A) -> Self {
        Self::with_config(repo, attachments, ReconcileConfig::default())
    }

    pub fn with_config(repo: R, attachments: A, config: ReconcileConfig) -> Self {
        Self {
            repo,
            attachments,
            config,
        }
    }

    pub fn create_author(&self, request: &CreateAuthorRequest) -> ReconcileResult<AuthorId> {
        require_text("name", &request.name)?;
        if let Some(image) = &request.image {
            require_text("file_name", &image.file_name)?;
        }

        let image = match &request.image {
            Some(content) => Some(self.attachments.create(content)?),
            None => None,
        };
        let author = Author {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            image,
            details: request.details.clone(),
        };
        author.validate()?;

        let mut batch = WriteBatch::new("author_create");
        batch.push(insert_author_statement(&author));
        commit_batch(&self.repo, &self.config, batch, author.id)?;
        Ok(author.id)
    }

    pub fn get_author(&self, id: AuthorId) -> ReconcileResult<Author> {
        require_id("id", id)?;
        self.repo.get_author(id)?.ok_or(ReconcileError::RootNotFound {
            entity: EntityKind::Author,
            id,
        })
    }

    /// Lists one page of authors. A page past the end is empty.
    pub fn list_authors(&self, query: &AuthorListQuery) -> ReconcileResult<Vec<Author>> {
        query.validate()?;
        Ok(self.repo.list_authors(query)?)
    }

    /// Replaces name and details, and the image content when supplied.
    pub fn update_author(&self, request: &UpdateAuthorRequest) -> ReconcileResult<AuthorId> {
        let mut run =
            Reconciliation::start(&self.repo, self.config, EntityKind::Author, request.id);
        let result = self
            .plan(&mut run, request)
            .and_then(|root_update| run.commit(root_update));
        run.finish(result)
    }

    /// Deletes one author, then its image attachment.
    pub fn delete_author(&self, id: AuthorId) -> ReconcileResult<()> {
        let author = self.get_author(id)?;

        let mut batch = WriteBatch::new("author_delete");
        batch.push(delete_author_statement(id));
        if let Some(image) = author.image {
            batch.push(delete_attachment_statement(image));
        }
        commit_batch(&self.repo, &self.config, batch, id)
    }

    fn plan(
        &self,
        run: &mut Reconciliation<'_, R>,
        request: &UpdateAuthorRequest,
    ) -> ReconcileResult<WriteStatement> {
        require_id("id", request.id)?;
        require_text("name", &request.name)?;
        if let Some(image) = &request.image {
            require_text("file_name", &image.file_name)?;
        }
        run.advance(ReconcileStage::Validated)?;

        let existing = run.require_root(self.repo.get_author(request.id)?)?;

        if let Some(image) = existing.image {
            if !self.repo.exists(EntityKind::Attachment, image)? {
                return Err(ReconcileError::DependencyUnresolved {
                    entity: EntityKind::Attachment,
                    key: image.to_string(),
                });
            }
        }
        let image = self
            .attachments
            .update_owned(existing.image, request.image.as_ref())?;
        run.advance(ReconcileStage::DependentsResolved)?;
        run.advance(ReconcileStage::Diffed)?;

        Ok(update_author_statement(
            request.id,
            &request.name,
            request.details.as_deref(),
            image,
        ))
    }
}

//! API endpoint use-case service.
//!
//! # Responsibility
//! - Create, read, update and delete API endpoints.
//! - Reconcile the endpoint ↔ tag slot, resolving tags by name and creating
//!   unknown tags on demand.
//! - Route documentation, swagger and tour content through the attachment
//!   service so existing references keep their ids.
//!
//! # Invariants
//! - The app environment and every referenced attachment row are checked
//!   before any tag is created or attachment content is replaced.
//! - Tag creation and attachment content replacement happen before the commit
//!   batch and persist even if the batch later aborts.

use crate::model::api_endpoint::{
    ApiEndpoint, ApiEndpointFields, ApiEndpointId, ApiTag, ApiTagId, AppEnvironment,
    AppEnvironmentId, AttachmentContent, AttachmentId,
};
use crate::model::validation::{
    normalize_name, require_flag, require_id, require_text, ValidationError,
};
use crate::reconcile::error::{ReconcileError, ReconcileResult};
use crate::reconcile::orchestrator::{ReconcileConfig, ReconcileStage, Reconciliation};
use crate::reconcile::resolver::{
    resolve_all, Reference, ReferenceKey, ReferencedKind, ResolveError, ResolvePolicy,
};
use crate::repo::attachment_repo::{delete_attachment_statement, AttachmentService};
use crate::repo::endpoint_repo::{
    delete_endpoint_statement, insert_endpoint_statement, update_endpoint_statement,
    EndpointAttachments, EndpointRepository,
};
use crate::repo::store::{
    AssociationRow, AssociationSlot, EntityKind, WriteBatch, WriteStatement,
};
use crate::service::commit_batch;
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Scalar endpoint input shared by create and update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointInput {
    pub api_name: String,
    pub api_scope: Option<String>,
    pub api_scope_production: Option<String>,
    pub deprecated: Option<bool>,
    pub description: Option<String>,
    #[serde(default)]
    pub endpoint_urls: Vec<String>,
    pub app_environment: AppEnvironmentId,
    pub api_version: Option<String>,
    pub langcode: String,
    pub sticky: Option<bool>,
    pub promote: Option<bool>,
    pub url_alias: Option<String>,
    pub published: Option<bool>,
}

impl EndpointInput {
    fn to_fields(&self) -> Result<ApiEndpointFields, ValidationError> {
        require_id("app_environment", self.app_environment)?;
        let fields = ApiEndpointFields {
            api_name: self.api_name.trim().to_string(),
            api_scope: self.api_scope.clone(),
            api_scope_production: self.api_scope_production.clone(),
            deprecated: require_flag("deprecated", self.deprecated)?,
            description: self.description.clone(),
            endpoint_urls: self.endpoint_urls.clone(),
            app_environment: self.app_environment,
            api_version: self.api_version.clone(),
            langcode: self.langcode.trim().to_string(),
            sticky: require_flag("sticky", self.sticky)?,
            promote: require_flag("promote", self.promote)?,
            url_alias: self.url_alias.clone(),
            published: require_flag("published", self.published)?,
        };
        fields.validate()?;
        Ok(fields)
    }
}

/// Payload for creating one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateEndpointRequest {
    #[serde(flatten)]
    pub input: EndpointInput,
    /// Tag names; unknown names are created.
    #[serde(default)]
    pub tags: Vec<String>,
    pub documentation: Option<AttachmentContent>,
    pub swagger: Option<AttachmentContent>,
    pub tour: Option<AttachmentContent>,
}

/// Payload for updating one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateEndpointRequest {
    pub id: ApiEndpointId,
    #[serde(flatten)]
    pub input: EndpointInput,
    /// Desired tag names; `None` keeps the current associations.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// New content for an existing documentation attachment.
    pub documentation: Option<AttachmentContent>,
    pub swagger: Option<AttachmentContent>,
    pub tour: Option<AttachmentContent>,
}

/// Endpoint service facade over repository and attachment implementations.
pub struct EndpointService<R: EndpointRepository, A: AttachmentService> {
    repo: R,
    attachments: A,
    config: ReconcileConfig,
}

impl<R: EndpointRepository, A: AttachmentService> EndpointService<R, A> {
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

    /// Creates one endpoint with its tags and uploaded attachments.
    pub fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> ReconcileResult<ApiEndpointId> {
        let fields = request.input.to_fields()?;
        require_tag_names(&request.tags)?;
        require_file_names([&request.documentation, &request.swagger, &request.tour])?;
        self.require_environment(fields.app_environment)?;
        let tags = self.resolve_tags(&request.tags)?;

        let attachments = EndpointAttachments {
            documentation: self.create_attachment(request.documentation.as_ref())?,
            swagger: self.create_attachment(request.swagger.as_ref())?,
            tour: self.create_attachment(request.tour.as_ref())?,
        };

        let id = Uuid::new_v4();
        let mut batch = WriteBatch::new("endpoint_create");
        batch.push(insert_endpoint_statement(id, &fields, attachments)?);
        batch.extend(tags.iter().map(|tag_id| {
            AssociationSlot::EndpointTags.insert_row(&AssociationRow::new(id, *tag_id))
        }));
        commit_batch(&self.repo, &self.config, batch, id)?;
        Ok(id)
    }

    pub fn get_endpoint(&self, id: ApiEndpointId) -> ReconcileResult<ApiEndpoint> {
        require_id("id", id)?;
        self.repo
            .get_endpoint(id)?
            .ok_or(ReconcileError::RootNotFound {
                entity: EntityKind::ApiEndpoint,
                id,
            })
    }

    /// Reconciles one endpoint against the request and commits atomically.
    pub fn update_endpoint(
        &self,
        request: &UpdateEndpointRequest,
    ) -> ReconcileResult<ApiEndpointId> {
        let mut run = Reconciliation::start(
            &self.repo,
            self.config,
            EntityKind::ApiEndpoint,
            request.id,
        );
        let result = self
            .plan(&mut run, request)
            .and_then(|root_update| run.commit(root_update));
        run.finish(result)
    }

    /// Runs every update stage up to `Diffed` and returns the batch that
    /// `update_endpoint` would commit.
    ///
    /// Tag creation and attachment content replacement still take effect.
    pub fn plan_update(&self, request: &UpdateEndpointRequest) -> ReconcileResult<WriteBatch> {
        let mut run = Reconciliation::start(
            &self.repo,
            self.config,
            EntityKind::ApiEndpoint,
            request.id,
        );
        let result = self
            .plan(&mut run, request)
            .map(|root_update| run.build_batch(root_update));
        run.finish(result)
    }

    /// Deletes one endpoint, its tag associations and its owned attachments.
    pub fn delete_endpoint(&self, id: ApiEndpointId) -> ReconcileResult<()> {
        let endpoint = self.get_endpoint(id)?;

        let mut batch = WriteBatch::new("endpoint_delete");
        batch.push(AssociationSlot::EndpointTags.delete_all(id));
        batch.push(delete_endpoint_statement(id));
        batch.extend(
            EndpointAttachments::of(&endpoint)
                .present()
                .into_iter()
                .map(delete_attachment_statement),
        );
        commit_batch(&self.repo, &self.config, batch, id)
    }

    /// Creates one app environment; names are unique ignoring case.
    pub fn create_environment(&self, name: &str) -> ReconcileResult<AppEnvironmentId> {
        let environment = AppEnvironment {
            id: Uuid::new_v4(),
            name: normalize_name("name", name)?,
        };

        let lookup = Reference {
            kind: ReferencedKind::AppEnvironment,
            key: ReferenceKey::Name(environment.name.clone()),
            policy: ResolvePolicy::MustExist,
        };
        match self.repo.resolve(&lookup) {
            Ok(_) => return Err(ValidationError::DuplicateName(environment.name).into()),
            Err(ResolveError::Missing { .. }) => {}
            Err(other) => return Err(other.into()),
        }

        Ok(self.repo.create_app_environment(&environment)?)
    }

    pub fn get_environment(&self, id: AppEnvironmentId) -> ReconcileResult<AppEnvironment> {
        require_id("id", id)?;
        self.repo
            .get_app_environment(id)?
            .ok_or(ReconcileError::RootNotFound {
                entity: EntityKind::AppEnvironment,
                id,
            })
    }

    pub fn get_tag(&self, id: ApiTagId) -> ReconcileResult<ApiTag> {
        require_id("id", id)?;
        self.repo.get_api_tag(id)?.ok_or(ReconcileError::RootNotFound {
            entity: EntityKind::ApiTag,
            id,
        })
    }

    fn plan(
        &self,
        run: &mut Reconciliation<'_, R>,
        request: &UpdateEndpointRequest,
    ) -> ReconcileResult<WriteStatement> {
        require_id("id", request.id)?;
        let fields = request.input.to_fields()?;
        if let Some(tags) = &request.tags {
            require_tag_names(tags)?;
        }
        require_file_names([&request.documentation, &request.swagger, &request.tour])?;
        run.advance(ReconcileStage::Validated)?;

        let existing = run.require_root(self.repo.get_endpoint(request.id)?)?;
        let current = EndpointAttachments::of(&existing);

        self.require_environment(fields.app_environment)?;
        for attachment_id in current.present() {
            if !self.repo.exists(EntityKind::Attachment, attachment_id)? {
                return Err(ReconcileError::DependencyUnresolved {
                    entity: EntityKind::Attachment,
                    key: attachment_id.to_string(),
                });
            }
        }
        let desired_tags = request
            .tags
            .as_deref()
            .map(|names| self.resolve_tags(names))
            .transpose()?;
        let attachments = EndpointAttachments {
            documentation: self
                .attachments
                .update_owned(current.documentation, request.documentation.as_ref())?,
            swagger: self
                .attachments
                .update_owned(current.swagger, request.swagger.as_ref())?,
            tour: self
                .attachments
                .update_owned(current.tour, request.tour.as_ref())?,
        };
        run.advance(ReconcileStage::DependentsResolved)?;

        if let Some(desired) = &desired_tags {
            run.diff_slot(AssociationSlot::EndpointTags, desired)?;
        }
        run.advance(ReconcileStage::Diffed)?;

        Ok(update_endpoint_statement(request.id, &fields, attachments)?)
    }

    fn require_environment(&self, id: AppEnvironmentId) -> ReconcileResult<()> {
        self.repo
            .resolve(&Reference::existing(ReferencedKind::AppEnvironment, id))?;
        Ok(())
    }

    fn resolve_tags(&self, names: &[String]) -> ReconcileResult<BTreeSet<Uuid>> {
        let references: Vec<Reference> = names
            .iter()
            .map(|name| Reference::by_name_or_create(ReferencedKind::ApiTag, name.as_str()))
            .collect();
        Ok(resolve_all(&self.repo, &references)?)
    }

    fn create_attachment(
        &self,
        content: Option<&AttachmentContent>,
    ) -> ReconcileResult<Option<AttachmentId>> {
        content
            .map(|content| self.attachments.create(content))
            .transpose()
            .map_err(ReconcileError::from)
    }
}

fn require_tag_names(names: &[String]) -> Result<(), ValidationError> {
    for name in names {
        require_text("tags", name)?;
    }
    Ok(())
}

fn require_file_names(contents: [&Option<AttachmentContent>; 3]) -> Result<(), ValidationError> {
    for content in contents.into_iter().flatten() {
        require_text("file_name", &content.file_name)?;
    }
    Ok(())
}

//! API endpoint, tag and app environment persistence.
//!
//! # Responsibility
//! - Load endpoints together with their tag slot and attachment references.
//! - Build the endpoint root statements used inside reconciliation batches.
//!
//! # Invariants
//! - `endpoint_urls` is stored as a JSON array of strings.
//! - Root updates rewrite every scalar column and every attachment reference.

use crate::model::api_endpoint::{
    ApiEndpoint, ApiEndpointFields, ApiEndpointId, ApiTag, ApiTagId, AppEnvironment,
    AppEnvironmentId, AttachmentId,
};
use crate::reconcile::resolver::DependentResolver;
use crate::repo::store::{
    flag_value, id_value, opt_id_value, opt_text_value, parse_flag, parse_opt_uuid, parse_uuid,
    text_value, unique_name_error, AssociationSlot, EntityStore, RepoError, RepoResult,
    SqliteStore, WriteStatement,
};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

const ENDPOINT_SELECT_SQL: &str = "SELECT
    id,
    api_name,
    api_scope,
    api_scope_production,
    deprecated,
    description,
    endpoint_urls,
    app_environment_id,
    api_version,
    langcode,
    sticky,
    promote,
    url_alias,
    published,
    documentation_id,
    swagger_id,
    tour_id,
    created_at,
    changed_at
FROM api_endpoints";

/// Attachment references stored on the endpoint root row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointAttachments {
    pub documentation: Option<AttachmentId>,
    pub swagger: Option<AttachmentId>,
    pub tour: Option<AttachmentId>,
}

impl EndpointAttachments {
    pub fn of(endpoint: &ApiEndpoint) -> Self {
        Self {
            documentation: endpoint.documentation,
            swagger: endpoint.swagger,
            tour: endpoint.tour,
        }
    }

    /// Non-null references, in column order.
    pub fn present(&self) -> Vec<AttachmentId> {
        [self.documentation, self.swagger, self.tour]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Repository interface for the API endpoint aggregate.
pub trait EndpointRepository: EntityStore + DependentResolver {
    /// Loads one endpoint with its current tag ids.
    fn get_endpoint(&self, id: ApiEndpointId) -> RepoResult<Option<ApiEndpoint>>;
    fn create_app_environment(&self, environment: &AppEnvironment)
        -> RepoResult<AppEnvironmentId>;
    fn get_app_environment(&self, id: AppEnvironmentId) -> RepoResult<Option<AppEnvironment>>;
    fn get_api_tag(&self, id: ApiTagId) -> RepoResult<Option<ApiTag>>;
}

impl EndpointRepository for SqliteStore<'_> {
    fn get_endpoint(&self, id: ApiEndpointId) -> RepoResult<Option<ApiEndpoint>> {
        let row = self
            .conn()
            .query_row(
                &format!("{ENDPOINT_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(read_endpoint_row(row)),
            )
            .optional()?;

        let Some(parsed) = row else {
            return Ok(None);
        };
        let mut endpoint = parsed?;
        endpoint.tags = self
            .list_association_ids(endpoint.id, AssociationSlot::EndpointTags)?
            .into_iter()
            .collect();
        Ok(Some(endpoint))
    }

    fn create_app_environment(
        &self,
        environment: &AppEnvironment,
    ) -> RepoResult<AppEnvironmentId> {
        self.conn()
            .execute(
                "INSERT INTO app_environments (id, name) VALUES (?1, ?2);",
                params![environment.id.to_string(), environment.name.trim()],
            )
            .map_err(|err| unique_name_error(err, environment.name.trim()))?;
        Ok(environment.id)
    }

    fn get_app_environment(&self, id: AppEnvironmentId) -> RepoResult<Option<AppEnvironment>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, name FROM app_environments WHERE id = ?1;",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(id_text, name)| {
            Ok(AppEnvironment {
                id: parse_uuid("app_environments.id", &id_text)?,
                name,
            })
        })
        .transpose()
    }

    fn get_api_tag(&self, id: ApiTagId) -> RepoResult<Option<ApiTag>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, name FROM api_tags WHERE id = ?1;",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(id_text, name)| {
            Ok(ApiTag {
                id: parse_uuid("api_tags.id", &id_text)?,
                name,
            })
        })
        .transpose()
    }
}

/// Statement inserting a new endpoint root row.
pub fn insert_endpoint_statement(
    id: ApiEndpointId,
    fields: &ApiEndpointFields,
    attachments: EndpointAttachments,
) -> RepoResult<WriteStatement> {
    Ok(WriteStatement::new(
        "endpoint_insert",
        "INSERT INTO api_endpoints (
            id,
            api_name,
            api_scope,
            api_scope_production,
            deprecated,
            description,
            endpoint_urls,
            app_environment_id,
            api_version,
            langcode,
            sticky,
            promote,
            url_alias,
            published,
            documentation_id,
            swagger_id,
            tour_id
         )
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17);",
        endpoint_params(id, fields, attachments)?,
    )
    .expect_rows(1))
}

/// Statement replacing every scalar column and attachment reference of one
/// endpoint.
pub fn update_endpoint_statement(
    id: ApiEndpointId,
    fields: &ApiEndpointFields,
    attachments: EndpointAttachments,
) -> RepoResult<WriteStatement> {
    Ok(WriteStatement::new(
        "endpoint_update",
        "UPDATE api_endpoints
         SET
            api_name = ?2,
            api_scope = ?3,
            api_scope_production = ?4,
            deprecated = ?5,
            description = ?6,
            endpoint_urls = ?7,
            app_environment_id = ?8,
            api_version = ?9,
            langcode = ?10,
            sticky = ?11,
            promote = ?12,
            url_alias = ?13,
            published = ?14,
            documentation_id = ?15,
            swagger_id = ?16,
            tour_id = ?17,
            changed_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1;",
        endpoint_params(id, fields, attachments)?,
    )
    .expect_rows(1))
}

/// Statement deleting one endpoint root row.
pub fn delete_endpoint_statement(id: ApiEndpointId) -> WriteStatement {
    WriteStatement::new(
        "endpoint_delete",
        "DELETE FROM api_endpoints WHERE id = ?1;",
        vec![id_value(id)],
    )
    .expect_rows(1)
}

fn endpoint_params(
    id: ApiEndpointId,
    fields: &ApiEndpointFields,
    attachments: EndpointAttachments,
) -> RepoResult<Vec<Value>> {
    let urls = serde_json::to_string(&fields.endpoint_urls)
        .map_err(|err| RepoError::InvalidData(format!("endpoint_urls: {err}")))?;
    Ok(vec![
        id_value(id),
        text_value(fields.api_name.trim()),
        opt_text_value(fields.api_scope.as_deref()),
        opt_text_value(fields.api_scope_production.as_deref()),
        flag_value(fields.deprecated),
        opt_text_value(fields.description.as_deref()),
        Value::Text(urls),
        id_value(fields.app_environment),
        opt_text_value(fields.api_version.as_deref()),
        text_value(fields.langcode.trim()),
        flag_value(fields.sticky),
        flag_value(fields.promote),
        opt_text_value(fields.url_alias.as_deref()),
        flag_value(fields.published),
        opt_id_value(attachments.documentation),
        opt_id_value(attachments.swagger),
        opt_id_value(attachments.tour),
    ])
}

fn read_endpoint_row(row: &Row<'_>) -> RepoResult<ApiEndpoint> {
    let id_text: String = row.get("id")?;
    let urls_text: String = row.get("endpoint_urls")?;
    let endpoint_urls: Vec<String> = serde_json::from_str(&urls_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid json in api_endpoints.endpoint_urls: {err}"))
    })?;
    let environment_text: String = row.get("app_environment_id")?;

    Ok(ApiEndpoint {
        id: parse_uuid("api_endpoints.id", &id_text)?,
        fields: ApiEndpointFields {
            api_name: row.get("api_name")?,
            api_scope: row.get("api_scope")?,
            api_scope_production: row.get("api_scope_production")?,
            deprecated: parse_flag("api_endpoints.deprecated", row.get("deprecated")?)?,
            description: row.get("description")?,
            endpoint_urls,
            app_environment: parse_uuid("api_endpoints.app_environment_id", &environment_text)?,
            api_version: row.get("api_version")?,
            langcode: row.get("langcode")?,
            sticky: parse_flag("api_endpoints.sticky", row.get("sticky")?)?,
            promote: parse_flag("api_endpoints.promote", row.get("promote")?)?,
            url_alias: row.get("url_alias")?,
            published: parse_flag("api_endpoints.published", row.get("published")?)?,
        },
        documentation: parse_opt_uuid(
            "api_endpoints.documentation_id",
            row.get("documentation_id")?,
        )?,
        swagger: parse_opt_uuid("api_endpoints.swagger_id", row.get("swagger_id")?)?,
        tour: parse_opt_uuid("api_endpoints.tour_id", row.get("tour_id")?)?,
        tags: Vec::new(),
        created_at: row.get("created_at")?,
        changed_at: row.get("changed_at")?,
    })
}

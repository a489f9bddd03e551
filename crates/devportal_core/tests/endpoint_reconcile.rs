use devportal_core::db::open_db_in_memory;
use devportal_core::repo::endpoint_repo::EndpointRepository;
use devportal_core::repo::store::AssociationSlot;
use devportal_core::service::endpoint_service::{
    CreateEndpointRequest, EndpointInput, UpdateEndpointRequest,
};
use devportal_core::{
    AttachmentContent, EndpointService, ReconcileError, SqliteAttachmentService, SqliteStore,
};
use rusqlite::Connection;
use uuid::Uuid;

type Service<'conn> = EndpointService<SqliteStore<'conn>, SqliteAttachmentService<'conn>>;

fn service(conn: &Connection) -> Service<'_> {
    EndpointService::new(SqliteStore::new(conn), SqliteAttachmentService::new(conn))
}

fn input(environment: Uuid) -> EndpointInput {
    EndpointInput {
        api_name: "Payments".to_string(),
        api_scope: Some("payments:write".to_string()),
        api_scope_production: Some("payments:write:prod".to_string()),
        deprecated: Some(false),
        description: Some("Card and ledger payments".to_string()),
        endpoint_urls: vec!["https://sandbox.example.test/payments".to_string()],
        app_environment: environment,
        api_version: Some("v2".to_string()),
        langcode: "en".to_string(),
        sticky: Some(false),
        promote: Some(true),
        url_alias: Some("/apis/payments".to_string()),
        published: Some(true),
    }
}

fn content(file_name: &str, bytes: &[u8]) -> AttachmentContent {
    AttachmentContent {
        file_name: file_name.to_string(),
        mime_type: Some("application/pdf".to_string()),
        content: bytes.to_vec(),
    }
}

fn tags(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn create_request(environment: Uuid, tag_names: &[&str]) -> CreateEndpointRequest {
    CreateEndpointRequest {
        input: input(environment),
        tags: tags(tag_names),
        documentation: None,
        swagger: None,
        tour: None,
    }
}

fn update_request(id: Uuid, environment: Uuid) -> UpdateEndpointRequest {
    UpdateEndpointRequest {
        id,
        input: input(environment),
        tags: None,
        documentation: None,
        swagger: None,
        tour: None,
    }
}

fn tag_names(conn: &Connection, endpoint: Uuid) -> Vec<String> {
    let mut stmt = conn
        .prepare(
            "SELECT t.name
             FROM api_endpoint_tags j
             JOIN api_tags t ON t.id = j.api_tag_id
             WHERE j.api_endpoint_id = ?1
             ORDER BY t.name ASC;",
        )
        .unwrap();
    stmt.query_map([endpoint.to_string()], |row| row.get(0))
        .unwrap()
        .collect::<Result<Vec<String>, _>>()
        .unwrap()
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

#[test]
fn documentation_content_is_replaced_under_the_same_id() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let mut create = create_request(environment, &[]);
    create.documentation = Some(content("guide-v1.pdf", b"v1"));
    let id = service.create_endpoint(&create).unwrap();
    let documentation = service.get_endpoint(id).unwrap().documentation.unwrap();

    let mut update = update_request(id, environment);
    update.documentation = Some(content("guide-v2.pdf", b"v2"));
    assert_eq!(service.update_endpoint(&update).unwrap(), id);

    let endpoint = service.get_endpoint(id).unwrap();
    assert_eq!(endpoint.documentation, Some(documentation));
    assert_eq!(endpoint.swagger, None);
    assert_eq!(endpoint.tour, None);
    let stored = SqliteAttachmentService::new(&conn)
        .get(documentation)
        .unwrap()
        .unwrap();
    assert_eq!(stored.file_name, "guide-v2.pdf");
    assert_eq!(stored.content, b"v2".to_vec());
    assert_eq!(count(&conn, "attachments"), 1);
}

#[test]
fn attachment_reference_survives_update_without_content() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let mut create = create_request(environment, &[]);
    create.swagger = Some(content("openapi.json", b"{}"));
    let id = service.create_endpoint(&create).unwrap();
    let swagger = service.get_endpoint(id).unwrap().swagger;

    service
        .update_endpoint(&update_request(id, environment))
        .unwrap();

    assert_eq!(service.get_endpoint(id).unwrap().swagger, swagger);
}

#[test]
fn content_for_a_null_reference_is_not_attached() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let id = service
        .create_endpoint(&create_request(environment, &[]))
        .unwrap();

    let mut update = update_request(id, environment);
    update.tour = Some(content("tour.mp4", b"frames"));
    service.update_endpoint(&update).unwrap();

    assert_eq!(service.get_endpoint(id).unwrap().tour, None);
    assert_eq!(count(&conn, "attachments"), 0);
}

#[test]
fn tags_are_reconciled_by_name_and_created_on_demand() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let id = service
        .create_endpoint(&create_request(environment, &["payments", "cards"]))
        .unwrap();
    let store = SqliteStore::new(&conn);
    let cards_row = store
        .association_rows(id, AssociationSlot::EndpointTags)
        .unwrap()
        .into_iter()
        .find(|row| {
            service.get_tag(row.child_id).unwrap().name == "cards"
        })
        .unwrap();

    let mut update = update_request(id, environment);
    update.tags = Some(tags(&["Cards", "ledger"]));
    service.update_endpoint(&update).unwrap();

    assert_eq!(tag_names(&conn, id), vec!["cards", "ledger"]);
    let rows = store
        .association_rows(id, AssociationSlot::EndpointTags)
        .unwrap();
    assert!(rows.contains(&cards_row));
    assert_eq!(count(&conn, "api_tags"), 3);
}

#[test]
fn tag_created_before_an_aborted_commit_stays_persisted() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let id = service
        .create_endpoint(&create_request(environment, &["payments"]))
        .unwrap();
    let before = service.get_endpoint(id).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_tag_links
         BEFORE INSERT ON api_endpoint_tags
         BEGIN
            SELECT RAISE(ABORT, 'injected failure');
         END;",
    )
    .unwrap();

    let mut update = update_request(id, environment);
    update.tags = Some(tags(&["fresh"]));
    let err = service.update_endpoint(&update).unwrap_err();

    assert!(matches!(err, ReconcileError::Storage(_)));
    assert_eq!(service.get_endpoint(id).unwrap(), before);
    assert_eq!(tag_names(&conn, id), vec!["payments"]);
    let fresh: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM api_tags WHERE name = 'fresh';",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(fresh, 1);
}

#[test]
fn missing_environment_aborts_before_creating_tags() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let id = service
        .create_endpoint(&create_request(environment, &[]))
        .unwrap();

    let mut update = update_request(id, Uuid::new_v4());
    update.tags = Some(tags(&["never-created"]));
    let err = service.update_endpoint(&update).unwrap_err();

    assert_eq!(err.code(), "DP-404");
    assert_eq!(count(&conn, "api_tags"), 0);
    assert_eq!(
        service.get_endpoint(id).unwrap().fields.app_environment,
        environment
    );
}

#[test]
fn dangling_attachment_reference_aborts_before_side_effects() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let mut create = create_request(environment, &[]);
    create.documentation = Some(content("guide.pdf", b"v1"));
    let id = service.create_endpoint(&create).unwrap();
    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         DELETE FROM attachments;
         PRAGMA foreign_keys = ON;",
    )
    .unwrap();

    let mut update = update_request(id, environment);
    update.tags = Some(tags(&["late"]));
    update.documentation = Some(content("guide.pdf", b"v2"));
    let err = service.update_endpoint(&update).unwrap_err();

    assert!(matches!(err, ReconcileError::DependencyUnresolved { .. }));
    assert_eq!(count(&conn, "api_tags"), 0);
}

#[test]
fn blank_tag_name_is_a_business_failure() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let id = service
        .create_endpoint(&create_request(environment, &["payments"]))
        .unwrap();

    let mut update = update_request(id, environment);
    update.tags = Some(tags(&["ok", "  "]));
    let err = service.update_endpoint(&update).unwrap_err();

    assert_eq!(err.code(), "DP-422");
    assert_eq!(count(&conn, "api_tags"), 1);
}

#[test]
fn missing_required_flag_is_a_business_failure() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let mut create = create_request(environment, &[]);
    create.input.published = None;

    let err = service.create_endpoint(&create).unwrap_err();
    assert_eq!(err.code(), "DP-422");
    assert_eq!(count(&conn, "api_endpoints"), 0);
}

#[test]
fn create_with_missing_environment_stores_nothing() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let mut create = create_request(Uuid::new_v4(), &["payments"]);
    create.documentation = Some(content("guide.pdf", b"v1"));

    let err = service.create_endpoint(&create).unwrap_err();

    assert_eq!(err.code(), "DP-404");
    assert_eq!(count(&conn, "attachments"), 0);
    assert_eq!(count(&conn, "api_tags"), 0);
}

#[test]
fn delete_cascades_to_tag_links_and_owned_attachments() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let environment = service.create_environment("sandbox").unwrap();
    let mut create = create_request(environment, &["payments"]);
    create.documentation = Some(content("guide.pdf", b"doc"));
    create.tour = Some(content("tour.mp4", b"tour"));
    let id = service.create_endpoint(&create).unwrap();

    service.delete_endpoint(id).unwrap();

    assert_eq!(count(&conn, "api_endpoints"), 0);
    assert_eq!(count(&conn, "api_endpoint_tags"), 0);
    assert_eq!(count(&conn, "attachments"), 0);
    assert_eq!(count(&conn, "api_tags"), 1);
    assert!(SqliteStore::new(&conn).get_endpoint(id).unwrap().is_none());
}

#[test]
fn environment_names_are_unique() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);
    let id = service.create_environment(" Sandbox ").unwrap();

    assert_eq!(service.get_environment(id).unwrap().name, "Sandbox");
    assert_eq!(
        service.create_environment("sandbox").unwrap_err().code(),
        "DP-422"
    );
}

#[test]
fn nil_ids_are_business_failures() {
    let conn = open_db_in_memory().unwrap();
    let service = service(&conn);

    assert_eq!(service.get_endpoint(Uuid::nil()).unwrap_err().code(), "DP-422");
    assert_eq!(
        service.delete_endpoint(Uuid::nil()).unwrap_err().code(),
        "DP-422"
    );
    assert_eq!(
        service.get_environment(Uuid::nil()).unwrap_err().code(),
        "DP-422"
    );
    assert_eq!(service.get_tag(Uuid::nil()).unwrap_err().code(), "DP-422");
    assert_eq!(
        service.delete_endpoint(Uuid::new_v4()).unwrap_err().code(),
        "DP-404"
    );
}

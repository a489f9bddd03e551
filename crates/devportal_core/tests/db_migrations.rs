use devportal_core::db::migrations::latest_version;
use devportal_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "faqs",
        "faq_categories",
        "faq_faq_categories",
        "api_endpoints",
        "api_tags",
        "api_endpoint_tags",
        "app_environments",
        "attachments",
        "authors",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn foreign_keys_are_enforced_on_returned_connections() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);

    let err = conn.execute(
        "INSERT INTO faq_faq_categories (id, faq_id, faq_category_id) VALUES ('j', 'f', 'c');",
        [],
    );
    assert!(err.is_err(), "join row without parents must be rejected");
}

#[test]
fn join_tables_reject_duplicate_pairs() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO api_tags (id, name) VALUES ('t1', 'payments');
         INSERT INTO app_environments (id, name) VALUES ('e1', 'sandbox');
         INSERT INTO api_endpoints (
            id, api_name, deprecated, app_environment_id, langcode, sticky, promote, published
         ) VALUES ('a1', 'Payments', 0, 'e1', 'en', 0, 0, 1);
         INSERT INTO api_endpoint_tags (id, api_endpoint_id, api_tag_id) VALUES ('j1', 'a1', 't1');",
    )
    .unwrap();

    let duplicate = conn.execute(
        "INSERT INTO api_endpoint_tags (id, api_endpoint_id, api_tag_id) VALUES ('j2', 'a1', 't1');",
        [],
    );
    assert!(duplicate.is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("devportal.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "faqs");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}

use devportal_core::db::open_db;
use devportal_core::reconcile::resolver::{DependentResolver, Reference, ReferencedKind};
use devportal_core::{EndpointService, SqliteAttachmentService, SqliteStore};
use std::sync::{Arc, Barrier};
use std::thread;
use uuid::Uuid;

#[test]
fn concurrent_creation_of_one_name_converges_on_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolver.db");
    let seed = open_db(&path).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let store = SqliteStore::new(&conn);
                barrier.wait();
                store
                    .resolve(&Reference::by_name_or_create(
                        ReferencedKind::ApiTag,
                        "shared-tag",
                    ))
                    .unwrap()
            })
        })
        .collect();
    let resolved: Vec<Uuid> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    let (rows, stored): (i64, String) = seed
        .query_row(
            "SELECT COUNT(*), MIN(id) FROM api_tags WHERE name = 'shared-tag';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(rows, 1);
    let stored = Uuid::parse_str(&stored).unwrap();
    assert!(resolved.iter().all(|id| *id == stored));
}

#[test]
fn resolving_twice_from_two_connections_returns_the_first_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resolver.db");
    let first_conn = open_db(&path).unwrap();
    let second_conn = open_db(&path).unwrap();

    let first = SqliteStore::new(&first_conn)
        .resolve(&Reference::by_name_or_create(
            ReferencedKind::ApiTag,
            "Billing",
        ))
        .unwrap();
    let second = SqliteStore::new(&second_conn)
        .resolve(&Reference::by_name_or_create(
            ReferencedKind::ApiTag,
            "billing",
        ))
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn concurrent_environment_creates_leave_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("environments.db");
    let seed = open_db(&path).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let service = EndpointService::new(
                    SqliteStore::new(&conn),
                    SqliteAttachmentService::new(&conn),
                );
                barrier.wait();
                service
                    .create_environment("production")
                    .map_err(|err| err.code())
            })
        })
        .collect();
    let outcomes: Vec<Result<Uuid, &'static str>> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|code| *code == "DP-422"));
    let rows: i64 = seed
        .query_row("SELECT COUNT(*) FROM app_environments;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(rows, 1);
}

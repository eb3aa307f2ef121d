//! Integration tests for connections, transactions and the pool
//!
//! Verifies isolation between connections, commit-time conflict detection,
//! retry through `transact` and pool exhaustion.

use kgstore::{
    EntityId, KgError, KgResult, KgStorage, RelationId, StorageError, StoreConfig, TripleStore,
};
use std::thread;
use tempfile::TempDir;

fn e(raw: &str) -> EntityId {
    EntityId::parse(raw).unwrap()
}

fn r(raw: &str) -> RelationId {
    RelationId::parse(raw).unwrap()
}

#[test]
fn test_disjoint_writers_union_visible() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    thread::scope(|scope| {
        let writers = [("Q1", "P1", "Q2"), ("Q3", "P2", "Q4")].map(|(s, rel, o)| {
            let storage = &storage;
            scope.spawn(move || {
                let mut conn = storage.connect().unwrap();
                TripleStore::new(&conn)
                    .add_triple(&e(s), &r(rel), &[e(o)], false)
                    .unwrap();
                conn.commit().unwrap();
            })
        });
        for writer in writers {
            writer.join().unwrap();
        }
    });

    let reader = storage.connect().unwrap();
    let triples = TripleStore::new(&reader);
    assert!(triples.subject().get("Q1", "P1").unwrap().unwrap().contains("Q2"));
    assert!(triples.subject().get("Q3", "P2").unwrap().unwrap().contains("Q4"));
    assert!(triples.relation_object().get("P1", "Q2").unwrap().unwrap().contains("Q1"));
    assert!(triples.relation_object().get("P2", "Q4").unwrap().unwrap().contains("Q3"));
}

#[test]
fn test_writers_sharing_new_ids_conflict_without_retry() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    // disjoint triples, but both register the placeholder label of P1 and Q2
    let mut first = storage.connect().unwrap();
    let mut second = storage.connect().unwrap();
    TripleStore::new(&first)
        .add_triple(&e("Q1"), &r("P1"), &[e("Q2")], false)
        .unwrap();
    TripleStore::new(&second)
        .add_triple(&e("Q3"), &r("P1"), &[e("Q2")], false)
        .unwrap();

    first.commit().unwrap();
    assert!(matches!(second.commit(), Err(StorageError::WriteConflict(_))));
}

#[test]
fn test_transact_writers_sharing_relation_and_object() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    thread::scope(|scope| {
        let writers = ["Q1", "Q3"].map(|s| {
            let storage = &storage;
            scope.spawn(move || {
                storage
                    .transact(|conn| -> KgResult<()> {
                        TripleStore::new(conn).add_triple(&e(s), &r("P1"), &[e("Q2")], false)
                    })
                    .unwrap();
            })
        });
        for writer in writers {
            writer.join().unwrap();
        }
    });

    let reader = storage.connect().unwrap();
    let triples = TripleStore::new(&reader);
    let subjects = triples.object().get("Q2", "P1").unwrap().unwrap();
    assert_eq!(subjects.len(), 2);
    assert!(subjects.contains("Q1"));
    assert!(subjects.contains("Q3"));
    assert!(triples.relation_object().get("P1", "Q2").unwrap().unwrap().contains("Q3"));
    assert!(triples.relation_subject().get("P1", "Q1").unwrap().unwrap().contains("Q2"));
    assert!(triples.relation_subject().get("P1", "Q3").unwrap().unwrap().contains("Q2"));
}

#[test]
fn test_conflicting_writers_one_commit_wins() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    let mut first = storage.connect().unwrap();
    let mut second = storage.connect().unwrap();

    TripleStore::new(&first)
        .add_triple(&e("Q1"), &r("P1"), &[e("Q2")], false)
        .unwrap();
    TripleStore::new(&second)
        .add_triple(&e("Q1"), &r("P1"), &[e("Q3")], false)
        .unwrap();

    first.commit().unwrap();
    let err = second.commit().unwrap_err();
    assert!(matches!(err, StorageError::WriteConflict(_)));

    // the losing connection continues on a fresh transaction
    let triples = TripleStore::new(&second);
    assert_eq!(triples.subject().get("Q1", "P1").unwrap().unwrap().as_slice(), &["Q2"]);
}

#[test]
fn test_uncommitted_writes_are_private() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    let mut writer = storage.connect().unwrap();
    TripleStore::new(&writer)
        .add_triple(&e("Q1"), &r("P1"), &[e("Q2")], false)
        .unwrap();

    let mut reader = storage.connect().unwrap();
    assert!(!TripleStore::new(&reader).subject().contains_primary("Q1").unwrap());

    writer.commit().unwrap();
    // the reader still sees its own snapshot until it starts a new transaction
    assert!(!TripleStore::new(&reader).subject().contains_primary("Q1").unwrap());
    reader.abort().unwrap();
    assert!(TripleStore::new(&reader).subject().contains_primary("Q1").unwrap());
}

#[test]
fn test_abort_and_savepoint_discard_work() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();
    let mut conn = storage.connect().unwrap();

    TripleStore::new(&conn)
        .add_triple(&e("Q1"), &r("P1"), &[e("Q2")], false)
        .unwrap();
    conn.savepoint().unwrap();
    TripleStore::new(&conn)
        .add_triple(&e("Q5"), &r("P1"), &[e("Q6")], false)
        .unwrap();
    conn.rollback_to_savepoint().unwrap();

    let triples = TripleStore::new(&conn);
    assert!(triples.subject().contains_primary("Q1").unwrap());
    assert!(!triples.subject().contains_primary("Q5").unwrap());

    conn.abort().unwrap();
    assert!(!TripleStore::new(&conn).subject().contains_primary("Q1").unwrap());
}

#[test]
fn test_transact_retries_conflict() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();

    let mut attempts = 0;
    storage
        .transact(|conn| -> KgResult<()> {
            attempts += 1;
            TripleStore::new(conn).add_triple(&e("Q1"), &r("P1"), &[e("Q2")], true)?;
            if attempts == 1 {
                let mut other = storage.connect()?;
                TripleStore::new(&other).add_triple(&e("Q1"), &r("P1"), &[e("Q3")], true)?;
                other.commit()?;
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(attempts, 2);

    let conn = storage.connect().unwrap();
    let objects = TripleStore::new(&conn).subject().get("Q1", "P1").unwrap().unwrap();
    assert_eq!(objects.as_slice(), &["Q2"]);
}

#[test]
fn test_transact_gives_up_after_max_attempts() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::at(dir.path());
    config.retry.max_attempts = 2;
    config.retry.backoff_ms = 1;
    let storage = KgStorage::open(config).unwrap();

    let mut attempts = 0;
    let result = storage.transact(|conn| -> KgResult<()> {
        attempts += 1;
        TripleStore::new(conn).add_triple(&e("Q1"), &r("P1"), &[e("Q2")], true)?;
        let mut other = storage.connect()?;
        TripleStore::new(&other).add_triple(&e("Q1"), &r("P1"), &[e("Q3")], true)?;
        other.commit()?;
        Ok(())
    });

    assert!(matches!(result, Err(ref err) if err.is_write_conflict()));
    assert!(matches!(result, Err(KgError::Storage(StorageError::WriteConflict(_)))));
    assert_eq!(attempts, 2);
}

#[test]
fn test_pool_exhaustion_times_out() {
    let dir = TempDir::new().unwrap();
    let mut config = StoreConfig::at(dir.path());
    config.pool_size = 1;
    config.pool_timeout_ms = Some(50);
    let storage = KgStorage::open(config).unwrap();

    let mut held = storage.connect().unwrap();
    assert_eq!(storage.pool().in_use(), 1);
    assert!(matches!(
        storage.connect(),
        Err(StorageError::PoolExhausted { capacity: 1, .. })
    ));

    held.close(false).unwrap();
    assert_eq!(storage.pool().in_use(), 0);
    assert!(storage.connect().is_ok());
}

#[test]
fn test_reopen_after_close() {
    let dir = TempDir::new().unwrap();
    let storage = KgStorage::open_path(dir.path()).unwrap();
    let mut conn = storage.connect().unwrap();

    conn.open().unwrap();
    assert_eq!(storage.pool().in_use(), 1);

    conn.close(true).unwrap();
    assert!(!conn.is_open());
    assert!(matches!(
        TripleStore::new(&conn).subject().contains_primary("Q1"),
        Err(StorageError::ConnectionClosed(_))
    ));

    conn.open().unwrap();
    assert!(conn.is_open());
    assert_eq!(storage.pool().in_use(), 1);
}

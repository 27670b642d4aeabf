//! End-to-end transactional behavior through the database handle
//!
//! Exercises the full stack - handle, commit protocol, timestamp cache,
//! merge rules, storage folding - the way an embedding application drives
//! it: read-your-writes, delta merging, compaction, multi-key atomicity,
//! and thread registration.

use std::sync::{Arc, Barrier};
use std::thread;
use tempo_engine::{
    LookupResult, TempoError, Transaction, TransactionalConfig, TransactionalDb, ValueMerge,
};

/// Additive merge over little-endian u64 payloads.
struct Additive;

impl ValueMerge for Additive {
    fn merge(&self, _key: &[u8], old_payload: &[u8], new_payload: &[u8]) -> Vec<u8> {
        let sum = decode(old_payload) + decode(new_payload);
        sum.to_le_bytes().to_vec()
    }
}

fn decode(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes.try_into().expect("u64 payload"))
}

fn additive_db() -> TransactionalDb {
    let db = TransactionalDb::create_with_merge(
        TransactionalConfig::default().with_tsc_log_slots(8),
        Arc::new(Additive),
    );
    db.register_thread();
    db
}

fn commit_value(db: &TransactionalDb, key: &[u8], value: u64) -> u64 {
    let mut txn = Transaction::new();
    db.begin(&mut txn).unwrap();
    db.insert(&mut txn, key, &value.to_le_bytes()).unwrap();
    db.commit(&mut txn).unwrap()
}

fn read_value(db: &TransactionalDb, key: &[u8]) -> Option<u64> {
    let mut txn = Transaction::new();
    db.begin(&mut txn).unwrap();
    let value = db.get(&mut txn, key).unwrap().map(|v| decode(&v));
    db.abort(&mut txn).unwrap();
    value
}

#[test]
fn read_your_writes_through_updates_and_commit() {
    let db = additive_db();

    let mut txn = Transaction::new();
    let mut result = LookupResult::new();
    db.begin(&mut txn).unwrap();

    db.insert(&mut txn, b"k", &5u64.to_le_bytes()).unwrap();
    db.lookup(&mut txn, b"k", &mut result).unwrap();
    assert_eq!(decode(result.value()), 5, "own insert must be visible");

    db.update(&mut txn, b"k", &3u64.to_le_bytes()).unwrap();
    db.lookup(&mut txn, b"k", &mut result).unwrap();
    assert_eq!(decode(result.value()), 8, "own update must merge into the buffered insert");

    db.commit(&mut txn).unwrap();

    // A later transaction sees the merged value.
    assert_eq!(read_value(&db, b"k"), Some(8));
}

#[test]
fn committed_update_folds_against_stored_base() {
    let db = additive_db();
    commit_value(&db, b"k", 10);

    // A blind delta: no read, installed as an update message the engine
    // folds on lookup and during compaction.
    let mut txn = Transaction::new();
    db.begin(&mut txn).unwrap();
    db.update(&mut txn, b"k", &7u64.to_le_bytes()).unwrap();
    db.commit(&mut txn).unwrap();

    assert_eq!(read_value(&db, b"k"), Some(17));

    // Compaction must not change the observable value.
    db.compact();
    assert_eq!(read_value(&db, b"k"), Some(17));
}

#[test]
fn timestamps_survive_compaction() {
    let db = additive_db();
    let first_ts = commit_value(&db, b"k", 1);

    // Eviction writeback leaves a timestamp refresh stacked on the record;
    // compaction folds it into the base tuple.
    db.compact();

    // A later writer must still order after the compacted version.
    let second_ts = commit_value(&db, b"k", 2);
    assert!(
        second_ts > first_ts,
        "commit {second_ts} must order after {first_ts} across compaction"
    );
    assert_eq!(read_value(&db, b"k"), Some(2));
}

#[test]
fn delete_then_insert_within_one_transaction() {
    let db = additive_db();
    commit_value(&db, b"k", 42);

    let mut txn = Transaction::new();
    let mut result = LookupResult::new();
    db.begin(&mut txn).unwrap();
    db.delete(&mut txn, b"k").unwrap();
    db.lookup(&mut txn, b"k", &mut result).unwrap();
    assert!(!result.found(), "own delete must hide the row");

    db.insert(&mut txn, b"k", &7u64.to_le_bytes()).unwrap();
    db.lookup(&mut txn, b"k", &mut result).unwrap();
    assert_eq!(decode(result.value()), 7, "insert after delete revives the row");
    db.commit(&mut txn).unwrap();

    assert_eq!(read_value(&db, b"k"), Some(7));
}

#[test]
fn update_after_delete_becomes_the_row() {
    let db = additive_db();
    commit_value(&db, b"k", 42);

    let mut txn = Transaction::new();
    db.begin(&mut txn).unwrap();
    db.delete(&mut txn, b"k").unwrap();
    db.update(&mut txn, b"k", &9u64.to_le_bytes()).unwrap();
    db.commit(&mut txn).unwrap();

    assert_eq!(read_value(&db, b"k"), Some(9));
}

#[test]
fn multi_key_commits_are_atomic_to_validating_readers() {
    let db = Arc::new(additive_db());
    commit_value(&db, b"left", 0);
    commit_value(&db, b"right", 0);

    let rounds = 40u64;
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            db.register_thread();
            barrier.wait();
            let mut txn = Transaction::new();
            for i in 1..=rounds {
                db.begin(&mut txn).unwrap();
                db.insert(&mut txn, b"left", &i.to_le_bytes()).unwrap();
                db.insert(&mut txn, b"right", &i.to_le_bytes()).unwrap();
                db.commit(&mut txn).unwrap();
            }
            db.deregister_thread();
        })
    };

    let reader = {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            db.register_thread();
            barrier.wait();
            let mut txn = Transaction::new();
            let mut result = LookupResult::new();
            let mut validated = 0;
            while validated < 30 {
                db.begin(&mut txn).unwrap();
                db.lookup(&mut txn, b"left", &mut result).unwrap();
                let left = decode(result.value());
                db.lookup(&mut txn, b"right", &mut result).unwrap();
                let right = decode(result.value());
                match db.commit(&mut txn) {
                    Ok(_) => {
                        assert_eq!(left, right, "a validated reader saw a torn pair");
                        validated += 1;
                    }
                    Err(e) => assert!(e.is_retryable(), "unexpected failure: {e:?}"),
                }
            }
            db.deregister_thread();
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn unregistered_threads_are_rejected_end_to_end() {
    let db = Arc::new(additive_db());
    commit_value(&db, b"k", 1);

    let db2 = Arc::clone(&db);
    let outcome = thread::spawn(move || {
        let mut txn = Transaction::new();
        db2.begin(&mut txn).unwrap();
        // Buffered writes never touch the engine, so the misuse surfaces
        // at the first operation that does.
        let err = db2.get(&mut txn, b"k").unwrap_err();
        assert_eq!(err, TempoError::ThreadNotRegistered);

        db2.register_thread();
        db2.begin(&mut txn).unwrap();
        let value = db2.get(&mut txn, b"k").unwrap();
        db2.abort(&mut txn).unwrap();
        db2.deregister_thread();
        value
    })
    .join()
    .unwrap();

    assert_eq!(outcome.as_deref(), Some(&1u64.to_le_bytes()[..]));
}

#[test]
fn abort_always_succeeds_and_discards() {
    let db = additive_db();
    commit_value(&db, b"k", 1);

    let mut txn = Transaction::new();
    db.begin(&mut txn).unwrap();
    db.insert(&mut txn, b"k", &99u64.to_le_bytes()).unwrap();
    db.delete(&mut txn, b"other").unwrap();
    db.abort(&mut txn).unwrap();

    assert_eq!(read_value(&db, b"k"), Some(1));
    assert_eq!(read_value(&db, b"other"), None);

    // An aborted transaction handle is immediately reusable.
    db.begin(&mut txn).unwrap();
    db.insert(&mut txn, b"k", &2u64.to_le_bytes()).unwrap();
    db.commit(&mut txn).unwrap();
    assert_eq!(read_value(&db, b"k"), Some(2));
}

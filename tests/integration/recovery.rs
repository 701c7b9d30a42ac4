//! §4.1.4 crash recovery: a prepared-but-not-yet-resolved transaction must
//! survive an RM process restart with its locks and shadow state intact, so
//! the TM can still drive it to a terminal outcome.

use std::collections::BTreeMap;

use tempfile::tempdir;
use travel_core::error::RmError;
use travel_core::rm::page_index::KeySpec;
use travel_core::rm::record::FieldValue;
use travel_core::rm::ResourceManager;

fn fields(pairs: &[(&str, i64)]) -> BTreeMap<String, FieldValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), FieldValue::Int(*v))).collect()
}

#[tokio::test]
async fn a_prepared_transaction_is_replayed_with_locks_held_after_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("committed.sqlite3");
    let journal_path = dir.path().join("prepare.journal.json");

    {
        let rm = ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone())
            .unwrap();
        rm.add("x1", "0001", fields(&[("numAvail", 7)])).await.unwrap();
        rm.prepare("x1").unwrap();
        // Process "crashes" here: rm is dropped without commit or abort.
    }

    let recovered =
        ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone()).unwrap();

    // The lock x1 held at prepare time must still be held post-recovery, so
    // no other xid can race in on the same key (§4.1.4).
    assert_eq!(recovered.lock_owner("0001"), Some("x1".to_string()));

    // The key was never committed, so it still doesn't exist for an
    // unqualified read.
    assert!(matches!(recovered.read_committed("0001"), Err(RmError::KeyNotFound(_))));

    // The TM can still resolve the recovered transaction either way.
    recovered.commit("x1").unwrap();
    assert_eq!(recovered.read_committed("0001").unwrap().get("numAvail"), Some(&FieldValue::Int(7)));
    assert_eq!(recovered.lock_owner("0001"), None);
}

#[tokio::test]
async fn recovered_transaction_can_instead_be_aborted() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("committed.sqlite3");
    let journal_path = dir.path().join("prepare.journal.json");

    {
        let rm = ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone())
            .unwrap();
        rm.add("x1", "0002", fields(&[("numAvail", 3)])).await.unwrap();
        rm.prepare("x1").unwrap();
    }

    let recovered =
        ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone()).unwrap();
    recovered.abort("x1").unwrap();

    assert!(matches!(recovered.read_committed("0002"), Err(RmError::KeyNotFound(_))));
    assert_eq!(recovered.lock_owner("0002"), None);
}

#[tokio::test]
async fn committed_transactions_leave_no_journal_entry_to_replay() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("committed.sqlite3");
    let journal_path = dir.path().join("prepare.journal.json");

    {
        let rm = ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone())
            .unwrap();
        rm.add("x1", "0003", fields(&[("numAvail", 9)])).await.unwrap();
        rm.prepare("x1").unwrap();
        rm.commit("x1").unwrap();
    }

    let recovered =
        ResourceManager::durable(KeySpec::single_column(4), db_path.clone(), 64, journal_path.clone()).unwrap();
    assert_eq!(recovered.lock_owner("0003"), None);
    assert_eq!(recovered.read_committed("0003").unwrap().get("numAvail"), Some(&FieldValue::Int(9)));
}

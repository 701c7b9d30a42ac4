//! §4.1.2/§4.1.6 prepare-phase conflict matrix, exercised directly against
//! `ResourceManager` (no HTTP layer needed for these).

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
async fn concurrent_xids_writing_the_same_key_conflict_at_prepare() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();

    rm.add("x1", "0001", fields(&[("numAvail", 10)])).await.unwrap();
    rm.prepare("x1").unwrap();

    // x2 never touched "0001" so it holds no lock on it yet, but trying to
    // write it now finds x1's effective insert already committed-shadowed
    // under x1; since x1 hasn't committed, "0001" is still absent from the
    // committed pool, so x2's own add succeeds at the RM level...
    rm.add("x2", "0001", fields(&[("numAvail", 5)])).await.unwrap();

    // ...but prepare enforces mutual exclusion: x1 already holds the lock.
    let err = rm.prepare("x2").unwrap_err();
    assert!(matches!(err, RmError::LockConflict(ref k) if k == "0001"));

    rm.commit("x1").unwrap();
    rm.abort("x2").unwrap();
}

#[tokio::test]
async fn version_conflict_when_committed_state_moved_since_start_version() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();

    rm.add("seed", "0002", fields(&[("numAvail", 20)])).await.unwrap();
    rm.prepare("seed").unwrap();
    rm.commit("seed").unwrap();

    // x1 reads at version 1, then a concurrent xid mutates and commits first.
    rm.read("x1", "0002").unwrap();
    rm.update("x2", "0002", fields(&[("numAvail", 19)])).await.unwrap();
    rm.prepare("x2").unwrap();
    rm.commit("x2").unwrap();

    rm.update("x1", "0002", fields(&[("numAvail", 18)])).await.unwrap();
    let err = rm.prepare("x1").unwrap_err();
    assert!(matches!(err, RmError::VersionConflict(ref k) if k == "0002"));
}

#[tokio::test]
async fn prepare_on_an_xid_that_never_wrote_anything_is_a_lockless_no_op() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();
    rm.prepare("ghost").unwrap();
    rm.commit("ghost").unwrap();
}

#[tokio::test]
async fn failed_prepare_releases_any_locks_it_had_acquired() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();

    rm.add("seed", "0003", fields(&[("numAvail", 1)])).await.unwrap();
    rm.add("seed", "0004", fields(&[("numAvail", 1)])).await.unwrap();
    rm.prepare("seed").unwrap();
    rm.commit("seed").unwrap();

    rm.update("x1", "0003", fields(&[("numAvail", 0)])).await.unwrap();
    rm.update("x1", "0004", fields(&[("numAvail", 0)])).await.unwrap();
    rm.prepare("x1").unwrap();

    // x2 only touches "0003", sorted before "0004" — it should conflict on
    // "0003" without ever having taken (and therefore needing to release) a
    // lock on some other key it doesn't hold.
    rm.update("x2", "0003", fields(&[("numAvail", 2)])).await.unwrap();
    assert!(rm.prepare("x2").is_err());
    assert_eq!(rm.lock_owner("0003"), Some("x1".to_string()));
    assert_eq!(rm.lock_owner("0004"), Some("x1".to_string()));

    rm.abort("x1").unwrap();
    assert_eq!(rm.lock_owner("0003"), None);
    assert_eq!(rm.lock_owner("0004"), None);
}

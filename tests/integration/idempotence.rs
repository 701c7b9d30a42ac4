//! §8 "Idempotence": repeated `commit`/`abort` at the TM or RM are no-ops
//! once the first terminal transition has happened, and a terminal state is
//! never overwritten by the other terminal verb.

#[path = "support.rs"]
mod support;

use std::collections::BTreeMap;

use tempfile::tempdir;
use travel_core::config::TmConfig;
use travel_core::rm::page_index::KeySpec;
use travel_core::rm::record::FieldValue;
use travel_core::rm::ResourceManager;
use travel_core::tm::{CommitOutcome, TransactionManager};

fn fields(pairs: &[(&str, i64)]) -> BTreeMap<String, FieldValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), FieldValue::Int(*v))).collect()
}

#[tokio::test]
async fn rm_commit_is_idempotent_after_the_first_call() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();
    rm.add("x1", "0001", fields(&[("numAvail", 4)])).await.unwrap();
    rm.prepare("x1").unwrap();
    rm.commit("x1").unwrap();
    // The shadow set for x1 is gone; a retried commit finds nothing to do.
    rm.commit("x1").unwrap();
    assert_eq!(rm.read_committed("0001").unwrap().get("numAvail"), Some(&FieldValue::Int(4)));
}

#[tokio::test]
async fn rm_abort_is_idempotent_from_any_phase() {
    let dir = tempdir().unwrap();
    let rm = ResourceManager::in_memory(KeySpec::single_column(4), dir.path().join("j.json")).unwrap();
    rm.add("x1", "0002", fields(&[("numAvail", 4)])).await.unwrap();
    rm.abort("x1").unwrap();
    rm.abort("x1").unwrap();
    assert!(rm.read_committed("0002").is_err());
}

#[tokio::test]
async fn tm_commit_is_idempotent_and_returns_the_same_terminal_outcome() {
    let tm = TransactionManager::new(TmConfig::default());
    let xid = tm.start();
    // No participants enlisted: 2PC over an empty participant set commits
    // trivially (§4.2 step 2's vacuous truth over an empty set).
    let first = tm.commit(&xid).await.unwrap();
    assert_eq!(first, CommitOutcome::Committed);
    let second = tm.commit(&xid).await.unwrap();
    assert_eq!(second, CommitOutcome::Committed);
}

#[tokio::test]
async fn tm_abort_after_commit_does_not_flip_the_terminal_state() {
    let tm = TransactionManager::new(TmConfig::default());
    let xid = tm.start();
    let outcome = tm.commit(&xid).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Committed);

    // A subsequent abort call must be a no-op: the transaction already
    // reached a terminal state and "terminal state wins" (§8).
    tm.abort(&xid).await.unwrap();
    assert_eq!(tm.status(&xid).unwrap().as_wire_str(), "COMMITTED");
}

#[tokio::test]
async fn tm_commit_after_abort_does_not_flip_the_terminal_state() {
    let tm = TransactionManager::new(TmConfig::default());
    let xid = tm.start();
    tm.abort(&xid).await.unwrap();
    assert_eq!(tm.status(&xid).unwrap().as_wire_str(), "ABORTED");

    let outcome = tm.commit(&xid).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Aborted);
    assert_eq!(tm.status(&xid).unwrap().as_wire_str(), "ABORTED");
}

#[tokio::test]
async fn tm_commit_drives_rm_commit_idempotently_even_under_a_retried_outer_call() {
    let dir = tempdir().unwrap();
    let tm_url = support::spawn_tm(TmConfig::default()).await;
    let client = support::http_client();

    let start: serde_json::Value =
        client.post(format!("{tm_url}/txn/start")).send().await.unwrap().json().await.unwrap();
    let xid = start["xid"].as_str().unwrap().to_string();

    let rm_url = support::spawn_rm("flights", KeySpec::single_column(4), dir.path(), None).await;
    client
        .post(format!("{rm_url}/records"))
        .json(&serde_json::json!({"xid": xid, "key": "0001", "value": {"numAvail": 5}}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{tm_url}/txn/enlist"))
        .query(&[("xid", xid.clone())])
        .json(&serde_json::json!({"endpoint": rm_url}))
        .send()
        .await
        .unwrap();

    let first = client.post(format!("{tm_url}/txn/commit")).query(&[("xid", xid.clone())]).send().await.unwrap();
    let second = client.post(format!("{tm_url}/txn/commit")).query(&[("xid", xid.clone())]).send().await.unwrap();

    let first_body: serde_json::Value = first.json().await.unwrap();
    let second_body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(first_body["status"], "COMMITTED");
    assert_eq!(second_body["status"], "COMMITTED");

    let record: serde_json::Value =
        client.get(format!("{rm_url}/records/0001")).send().await.unwrap().json().await.unwrap();
    assert_eq!(record["fields"]["numAvail"], 5);
}

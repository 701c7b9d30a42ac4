//! §4.2/§5 two-phase commit across multiple enlisted participants, driven
//! over real HTTP: a unanimous prepare commits everywhere, and a single
//! dissenting participant aborts the whole transaction, including on the
//! participants that already voted to proceed.

#[path = "support.rs"]
mod support;

use tempfile::tempdir;
use travel_core::config::TmConfig;
use travel_core::rm::page_index::KeySpec;

async fn enlist_and_write(
    client: &reqwest::Client,
    tm_url: &str,
    xid: &str,
    rm_url: &str,
    key: &str,
    num_avail: i64,
) {
    client
        .post(format!("{rm_url}/records"))
        .json(&serde_json::json!({"xid": xid, "key": key, "value": {"numAvail": num_avail}}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{tm_url}/txn/enlist"))
        .query(&[("xid", xid)])
        .json(&serde_json::json!({"endpoint": rm_url}))
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn unanimous_prepare_commits_every_participant() {
    let dir = tempdir().unwrap();
    let client = support::http_client();
    let tm_url = support::spawn_tm(TmConfig::default()).await;
    let rm_a = support::spawn_rm("a", KeySpec::single_column(4), dir.path(), None).await;
    let rm_b = support::spawn_rm("b", KeySpec::single_column(4), dir.path(), None).await;

    let start: serde_json::Value =
        client.post(format!("{tm_url}/txn/start")).send().await.unwrap().json().await.unwrap();
    let xid = start["xid"].as_str().unwrap().to_string();

    enlist_and_write(&client, &tm_url, &xid, &rm_a, "0001", 1).await;
    enlist_and_write(&client, &tm_url, &xid, &rm_b, "0002", 2).await;

    let commit: serde_json::Value = client
        .post(format!("{tm_url}/txn/commit"))
        .query(&[("xid", xid.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(commit["status"], "COMMITTED");

    for (rm_url, key, expected) in [(&rm_a, "0001", 1), (&rm_b, "0002", 2)] {
        let record: serde_json::Value =
            client.get(format!("{rm_url}/records/{key}")).send().await.unwrap().json().await.unwrap();
        assert_eq!(record["fields"]["numAvail"], expected);
    }
}

#[tokio::test]
async fn one_participant_rejecting_prepare_aborts_every_participant() {
    let dir = tempdir().unwrap();
    let client = support::http_client();
    let tm_url = support::spawn_tm(TmConfig::default()).await;
    let rm_a = support::spawn_rm("a", KeySpec::single_column(4), dir.path(), None).await;
    let rm_b = support::spawn_rm("b", KeySpec::single_column(4), dir.path(), None).await;

    // Seed "0003" on rm_b and commit it under an unrelated xid, so the
    // upcoming transaction's own update races a prior committer and loses
    // the OCC check at prepare time.
    client
        .post(format!("{rm_b}/records"))
        .json(&serde_json::json!({"xid": "seed", "key": "0003", "value": {"numAvail": 9}}))
        .send()
        .await
        .unwrap();
    client.post(format!("{rm_b}/txn/prepare")).query(&[("xid", "seed")]).send().await.unwrap();
    client.post(format!("{rm_b}/txn/commit")).query(&[("xid", "seed")]).send().await.unwrap();

    let start: serde_json::Value =
        client.post(format!("{tm_url}/txn/start")).send().await.unwrap().json().await.unwrap();
    let xid = start["xid"].as_str().unwrap().to_string();

    enlist_and_write(&client, &tm_url, &xid, &rm_a, "0004", 5).await;

    // Read "0003" under xid (captures the pre-race start_version), then let
    // a concurrent writer commit a change before this xid's own update and
    // prepare.
    client
        .get(format!("{rm_b}/records/0003"))
        .query(&[("xid", xid.as_str())])
        .send()
        .await
        .unwrap();
    client
        .patch(format!("{rm_b}/records/0003"))
        .json(&serde_json::json!({"xid": "racer", "updates": {"numAvail": 8}}))
        .send()
        .await
        .unwrap();
    client.post(format!("{rm_b}/txn/prepare")).query(&[("xid", "racer")]).send().await.unwrap();
    client.post(format!("{rm_b}/txn/commit")).query(&[("xid", "racer")]).send().await.unwrap();

    client
        .patch(format!("{rm_b}/records/0003"))
        .json(&serde_json::json!({"xid": xid, "updates": {"numAvail": 7}}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{tm_url}/txn/enlist"))
        .query(&[("xid", xid.as_str())])
        .json(&serde_json::json!({"endpoint": rm_b}))
        .send()
        .await
        .unwrap();

    let commit: serde_json::Value = client
        .post(format!("{tm_url}/txn/commit"))
        .query(&[("xid", xid.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(commit["status"], "ABORTED");

    // rm_a's write must have been rolled back even though rm_a itself voted
    // to proceed (§4.2 step 3: abort is broadcast to every participant).
    let record_a = client.get(format!("{rm_a}/records/0004")).send().await.unwrap();
    assert_eq!(record_a.status(), reqwest::StatusCode::NOT_FOUND);
}

/// Accepts connections but never reads or writes on them, so any HTTP
/// request sent to it hangs until the caller's own timeout fires.
async fn spawn_black_hole() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let _socket = socket;
                    std::future::pending::<()>().await
                });
            }
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn commit_exceeding_t_commit_surfaces_as_in_doubt() {
    let client = support::http_client();
    // The black-hole participant never answers, so its prepare call only
    // resolves after `T_prepare`; `T_commit` is set much shorter so the
    // coordinator itself gives up first and reports IN_DOUBT (§4.2 step 4)
    // while the drive keeps running in the background.
    let tm_url = support::spawn_tm(TmConfig { t_prepare_ms: 5_000, t_commit_ms: 50, ..TmConfig::default() }).await;
    let black_hole = spawn_black_hole().await;

    let start: serde_json::Value =
        client.post(format!("{tm_url}/txn/start")).send().await.unwrap().json().await.unwrap();
    let xid = start["xid"].as_str().unwrap().to_string();
    client
        .post(format!("{tm_url}/txn/enlist"))
        .query(&[("xid", xid.as_str())])
        .json(&serde_json::json!({"endpoint": black_hole}))
        .send()
        .await
        .unwrap();

    let commit: serde_json::Value = client
        .post(format!("{tm_url}/txn/commit"))
        .query(&[("xid", xid.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(commit["status"], "IN_DOUBT");
    assert!(commit["message"].as_str().unwrap().contains("poll"));
}

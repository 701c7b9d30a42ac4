//! End-to-end §4.3 `reserve` flow and §8 seed scenarios: WC orchestrating a
//! reservation across three RMs, coordinated by a real TM over HTTP.

#[path = "support.rs"]
mod support;

use std::collections::BTreeMap;

use tempfile::tempdir;
use travel_core::config::{TmConfig, WcConfig};
use travel_core::rm::page_index::KeySpec;

async fn seed_full_stack(
    dir: &std::path::Path,
) -> (String, String, String, String, reqwest::Client) {
    let tm_url = support::spawn_tm(TmConfig::default()).await;
    let customers_url =
        support::spawn_rm("customers", KeySpec::single_column(16), dir, Some(&tm_url)).await;
    let flights_url =
        support::spawn_rm("flights", KeySpec::single_column(8), dir, Some(&tm_url)).await;
    let reservations_url =
        support::spawn_rm("reservations", KeySpec::single_column(32), dir, Some(&tm_url)).await;

    let mut rm_endpoints = BTreeMap::new();
    rm_endpoints.insert("customers".to_string(), customers_url.clone());
    rm_endpoints.insert("flights".to_string(), flights_url.clone());
    rm_endpoints.insert("reservations".to_string(), reservations_url.clone());
    let wc_config = WcConfig { tm_endpoint: tm_url.clone(), rm_endpoints, ..WcConfig::default() };
    let wc_url = support::spawn_wc(wc_config).await;

    (tm_url, customers_url, flights_url, wc_url, support::http_client())
}

async fn seed_customer(client: &reqwest::Client, customers_url: &str, name: &str) {
    let xid = client
        .post(format!("{customers_url}/records"))
        .json(&serde_json::json!({"xid": format!("seed-{name}"), "key": name, "value": {"custName": name}}))
        .send()
        .await
        .unwrap();
    assert!(xid.status().is_success());
    client
        .post(format!("{customers_url}/txn/prepare"))
        .query(&[("xid", format!("seed-{name}"))])
        .send()
        .await
        .unwrap();
    client
        .post(format!("{customers_url}/txn/commit"))
        .query(&[("xid", format!("seed-{name}"))])
        .send()
        .await
        .unwrap();
}

async fn seed_flight(client: &reqwest::Client, flights_url: &str, key: &str, num_avail: i64) {
    client
        .post(format!("{flights_url}/records"))
        .json(&serde_json::json!({"xid": format!("seed-{key}"), "key": key, "value": {"numAvail": num_avail}}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{flights_url}/txn/prepare"))
        .query(&[("xid", format!("seed-{key}"))])
        .send()
        .await
        .unwrap();
    client
        .post(format!("{flights_url}/txn/commit"))
        .query(&[("xid", format!("seed-{key}"))])
        .send()
        .await
        .unwrap();
}

#[tokio::test]
async fn reserve_then_commit_decrements_availability_and_creates_reservation() {
    let dir = tempdir().unwrap();
    let (_tm_url, customers_url, flights_url, wc_url, client) = seed_full_stack(dir.path()).await;

    seed_customer(&client, &customers_url, "alice").await;
    seed_flight(&client, &flights_url, "UA100", 3).await;

    let resp = client
        .post(format!("{wc_url}/reserve"))
        .json(&serde_json::json!({"customer_name": "alice", "inventory_key": "UA100", "quantity": 2}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "reserve call failed: {}", resp.status());
    let body: serde_json::Value = resp.json().await.unwrap();
    let xid = body["xid"].as_str().unwrap().to_string();
    assert_eq!(body["reservation_key"], "alice:UA100");

    let commit_resp = client.post(format!("{wc_url}/txn/{xid}/commit")).send().await.unwrap();
    assert!(commit_resp.status().is_success());
    let commit_body: serde_json::Value = commit_resp.json().await.unwrap();
    assert_eq!(commit_body["status"], "COMMITTED");

    let flight: serde_json::Value = client
        .get(format!("{flights_url}/records/UA100"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flight["fields"]["numAvail"], 1);
}

#[tokio::test]
async fn reserve_over_available_quantity_is_rejected_and_auto_aborts() {
    let dir = tempdir().unwrap();
    let (_tm_url, customers_url, flights_url, wc_url, client) = seed_full_stack(dir.path()).await;

    seed_customer(&client, &customers_url, "bob").await;
    seed_flight(&client, &flights_url, "UA200", 1).await;

    let resp = client
        .post(format!("{wc_url}/reserve"))
        .json(&serde_json::json!({"customer_name": "bob", "inventory_key": "UA200", "quantity": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["err"], "INSUFFICIENT_AVAILABILITY");
    assert_eq!(body["transaction_aborted"], true);

    // The flight's availability must be untouched by the aborted attempt.
    let flight: serde_json::Value = client
        .get(format!("{flights_url}/records/UA200"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flight["fields"]["numAvail"], 1);
}

#[tokio::test]
async fn two_concurrent_reservations_never_oversell_inventory() {
    let dir = tempdir().unwrap();
    let (_tm_url, customers_url, flights_url, wc_url, client) = seed_full_stack(dir.path()).await;

    seed_customer(&client, &customers_url, "carol").await;
    seed_customer(&client, &customers_url, "dave").await;
    seed_flight(&client, &flights_url, "UA300", 1).await;

    let reserve_carol = client
        .post(format!("{wc_url}/reserve"))
        .json(&serde_json::json!({"customer_name": "carol", "inventory_key": "UA300", "quantity": 1}));
    let reserve_dave = client
        .post(format!("{wc_url}/reserve"))
        .json(&serde_json::json!({"customer_name": "dave", "inventory_key": "UA300", "quantity": 1}));

    let (carol_resp, dave_resp) = tokio::join!(reserve_carol.send(), reserve_dave.send());
    let carol_resp = carol_resp.unwrap();
    let dave_resp = dave_resp.unwrap();

    let mut commits = Vec::new();
    for resp in [carol_resp, dave_resp] {
        if resp.status().is_success() {
            let body: serde_json::Value = resp.json().await.unwrap();
            let xid = body["xid"].as_str().unwrap().to_string();
            let commit_resp = client.post(format!("{wc_url}/txn/{xid}/commit")).send().await.unwrap();
            let commit_body: serde_json::Value = commit_resp.json().await.unwrap();
            commits.push(commit_body["status"].as_str().unwrap().to_string());
        }
    }

    // Exactly one of the two full reserve-then-commit attempts may land as
    // COMMITTED; prepare's OCC check forces the other to ABORTED (§4.1.2,
    // §8 "no oversell").
    assert_eq!(commits.iter().filter(|s| *s == "COMMITTED").count(), 1);

    let flight: serde_json::Value = client
        .get(format!("{flights_url}/records/UA300"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flight["fields"]["numAvail"], 0);
}

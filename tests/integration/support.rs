//! Shared harness for the in-process HTTP integration tests: spin each
//! component's real router on an ephemeral port inside the test process,
//! talk to it with a plain `reqwest::Client`, exactly as the three binaries
//! would over the wire.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use travel_core::config::{TmConfig, WcConfig};
use travel_core::rm::page_index::KeySpec;
use travel_core::rm::ResourceManager;
use travel_core::tm::TransactionManager;
use travel_core::wc::WorkflowController;

/// Binds an ephemeral localhost port up front, returning it alongside the
/// base URL it will answer on, so callers that need to announce their own
/// address (e.g. an RM self-enlisting with the TM) know it before the
/// router is even built.
async fn bind_ephemeral() -> (tokio::net::TcpListener, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local_addr");
    (listener, format!("http://{addr}"))
}

/// Binds `router` to an ephemeral localhost port, serves it on a detached
/// task for the remainder of the test process, and returns its base URL.
pub async fn spawn(router: axum::Router) -> String {
    let (listener, base_url) = bind_ephemeral().await;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });
    base_url
}

/// Spawns an in-memory RM for `table`, optionally self-enlisting with `tm_base_url`.
/// Binds its listener before constructing the RM so the announced
/// `self_endpoint` is the address it actually serves on.
pub async fn spawn_rm(
    table: &str,
    key_spec: KeySpec,
    journal_dir: &std::path::Path,
    tm_base_url: Option<&str>,
) -> String {
    let journal_path = journal_dir.join(format!("{table}.journal.json"));
    let (listener, base_url) = bind_ephemeral().await;
    let mut rm = ResourceManager::in_memory(key_spec, journal_path).expect("build rm");
    if let Some(tm_url) = tm_base_url {
        rm = rm.with_tm_link(tm_url, base_url.clone(), Duration::from_millis(2_000));
    }
    let state = Arc::new(rm);
    let router = travel_core::rm::server::build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router.into_make_service()).await;
    });
    base_url
}

/// Spawns a durable (sqlite + journal file) RM rooted at `data_dir`.
pub async fn spawn_durable_rm(
    key_spec: KeySpec,
    data_dir: &std::path::Path,
    page_cache_capacity: usize,
) -> (String, Arc<ResourceManager>) {
    let db_path = data_dir.join("committed.sqlite3");
    let journal_path = data_dir.join("prepare.journal.json");
    let rm = ResourceManager::durable(key_spec, db_path, page_cache_capacity, journal_path).expect("build durable rm");
    let state = Arc::new(rm);
    let router = travel_core::rm::server::build_router(state.clone());
    let base_url = spawn(router).await;
    (base_url, state)
}

pub async fn spawn_tm(config: TmConfig) -> String {
    let tm = TransactionManager::new(config);
    let state = Arc::new(tm);
    let router = travel_core::tm::server::build_router(state);
    spawn(router).await
}

pub async fn spawn_wc(config: WcConfig) -> String {
    let wc = WorkflowController::new(config);
    let state = Arc::new(wc);
    let router = travel_core::wc::server::build_router(state);
    spawn(router).await
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::new()
}

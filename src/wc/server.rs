//! WC HTTP layer (spec §4.3, §6 preamble).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::WcError;
use crate::wc::WorkflowController;
use crate::wire::{HealthResponse, ReserveRequest, ReserveResponse};

type AppState = Arc<WorkflowController>;

/// Serves the WC HTTP API at `addr` until a ctrl-c.
pub async fn serve(wc: WorkflowController, addr: SocketAddr) -> std::io::Result<()> {
    let state: AppState = Arc::new(wc);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "wc server listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Builds the router in isolation, for use by in-process integration tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/reserve", post(reserve_handler))
        .route("/txn/:xid/commit", post(commit_handler))
        .route("/admin/reconnect", post(reconnect_handler))
        .route("/admin/die", post(die_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct CommitResponse {
    xid: String,
    status: String,
    in_doubt: bool,
}

async fn reserve_handler(
    State(state): State<AppState>,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, WcError> {
    Ok(Json(state.reserve(req).await?))
}

async fn commit_handler(
    State(state): State<AppState>,
    Path(xid): Path<String>,
) -> Result<Json<CommitResponse>, WcError> {
    let report = state.commit(&xid).await?;
    Ok(Json(CommitResponse { xid, status: report.status, in_doubt: report.in_doubt }))
}

async fn reconnect_handler(State(state): State<AppState>) -> Response {
    let probes = state.reconnect().await;
    Json(serde_json::json!({ "probes": probes })).into_response()
}

async fn die_handler(State(state): State<AppState>) -> StatusCode {
    state.die();
    StatusCode::OK
}

async fn health_handler(State(state): State<AppState>) -> Response {
    // The WC's own health is itself subject to the `die` flag: report 503
    // once marked unavailable, matching the behavior every other endpoint
    // already exhibits through `WcError::Unavailable` (§4.3).
    if state.is_available() {
        Json(HealthResponse { status: "ok", component: "wc" }).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("wc shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for wc shutdown signal"),
    }
}

//! TM HTTP layer (spec §6.1).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::TmError;
use crate::tm::TransactionManager;
use crate::wire::{BeginResponse, HealthResponse, StatusResponse};

type AppState = Arc<TransactionManager>;

/// Serves the TM HTTP API at `addr` until a ctrl-c.
pub async fn serve(tm: TransactionManager, addr: SocketAddr) -> std::io::Result<()> {
    let state: AppState = Arc::new(tm);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tm server listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Builds the router in isolation, for use by in-process integration tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/txn/start", post(start_handler))
        .route("/txn/enlist", post(enlist_handler))
        .route("/txn/commit", post(commit_handler))
        .route("/txn/abort", post(abort_handler))
        .route("/txn/:xid", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct XidQuery {
    xid: String,
}

#[derive(Debug, Deserialize)]
struct EnlistRequest {
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct TerminalResponse {
    xid: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn start_handler(State(state): State<AppState>) -> (StatusCode, Json<BeginResponse>) {
    let xid = state.start();
    (StatusCode::CREATED, Json(BeginResponse { xid }))
}

async fn enlist_handler(
    State(state): State<AppState>,
    Query(q): Query<XidQuery>,
    Json(req): Json<EnlistRequest>,
) -> Result<Json<serde_json::Value>, TmError> {
    state.enlist(&q.xid, &req.endpoint)?;
    Ok(Json(serde_json::json!({"ok": true})))
}

async fn commit_handler(State(state): State<AppState>, Query(q): Query<XidQuery>) -> Response {
    match state.commit(&q.xid).await {
        Ok(outcome) => {
            let message = matches!(outcome, crate::tm::CommitOutcome::InDoubt)
                .then(|| "poll GET /txn/{xid} until a terminal state is observed".to_string());
            Json(TerminalResponse { xid: q.xid, status: outcome.as_wire_str(), message }).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn abort_handler(
    State(state): State<AppState>,
    Query(q): Query<XidQuery>,
) -> Result<Json<TerminalResponse>, TmError> {
    state.abort(&q.xid).await?;
    Ok(Json(TerminalResponse { xid: q.xid, status: "ABORTED", message: None }))
}

async fn status_handler(
    State(state): State<AppState>,
    axum::extract::Path(xid): axum::extract::Path<String>,
) -> Result<Json<StatusResponse>, TmError> {
    let state = state.status(&xid)?;
    Ok(Json(StatusResponse { xid, state: state.as_wire_str().to_string() }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", component: "tm" })
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("tm shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for tm shutdown signal"),
    }
}

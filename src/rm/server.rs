//! RM HTTP layer (spec §6.2), grounded on the teacher's dashboard server
//! shape: a `Router` built from a shared `Arc<State>`, a `TraceLayer`, an
//! `IntoResponse` error type, and a graceful-shutdown `axum::serve`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::error::RmError;
use crate::rm::ResourceManager;
use crate::wire::{
    Ack, AddRecordRequest, HealthResponse, OptionalXid, RecordResponse, UpdateRecordRequest, Xid,
};

type AppState = Arc<ResourceManager>;

/// Serves the RM HTTP API at `addr` until a ctrl-c or the `/shutdown`
/// endpoint is hit.
pub async fn serve(rm: ResourceManager, addr: SocketAddr) -> std::io::Result<()> {
    let state: AppState = Arc::new(rm);
    let app = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "rm server listening");
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(state))
        .await
}

/// Builds the router in isolation, for use by in-process integration tests.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/records/:key", get(read_handler).delete(delete_handler))
        .route("/records/:key", patch(update_handler).put(update_handler))
        .route("/records", post(add_handler))
        .route("/txn/prepare", post(prepare_handler))
        .route("/txn/commit", post(commit_handler))
        .route("/txn/abort", post(abort_handler))
        .route("/health", get(health_handler))
        .route("/shutdown", post(shutdown_handler))
        .route("/die", post(die_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn read_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    OptionalXid(xid): OptionalXid,
) -> Result<Json<RecordResponse>, RmError> {
    let fields = match xid {
        Some(xid) => state.read(&xid, &key)?,
        None => state.read_committed(&key)?,
    };
    Ok(Json(RecordResponse { fields }))
}

async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<AddRecordRequest>,
) -> Result<StatusCode, RmError> {
    state.add(&req.xid, &req.key, req.value).await?;
    Ok(StatusCode::CREATED)
}

async fn update_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<StatusCode, RmError> {
    state.update(&req.xid, &key, req.updates).await?;
    Ok(StatusCode::OK)
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Xid(xid): Xid,
) -> Result<StatusCode, RmError> {
    state.delete(&xid, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn prepare_handler(State(state): State<AppState>, Xid(xid): Xid) -> Response {
    match state.prepare(&xid) {
        Ok(()) => Json(Ack::ok()).into_response(),
        Err(err) => {
            let code = err.code();
            (StatusCode::OK, Json(serde_json::json!({"ok": false, "err": code}))).into_response()
        }
    }
}

async fn commit_handler(
    State(state): State<AppState>,
    Xid(xid): Xid,
) -> Result<Json<Ack>, RmError> {
    state.commit(&xid)?;
    Ok(Json(Ack::ok()))
}

async fn abort_handler(
    State(state): State<AppState>,
    Xid(xid): Xid,
) -> Result<Json<Ack>, RmError> {
    state.abort(&xid)?;
    Ok(Json(Ack::ok()))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    if state.is_available() {
        Json(HealthResponse { status: "ok", component: "rm" }).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

/// §6.2 failure injection: wakes the graceful-shutdown future so the
/// process exits cleanly, matching `sombra::admin`'s posture of real,
/// callable maintenance operations rather than stubs.
async fn shutdown_handler(State(state): State<AppState>) -> Json<Ack> {
    state.request_shutdown();
    Json(Ack::ok())
}

/// §6.2 failure injection: marks this RM unavailable; every CRUD/txn call
/// after this returns `503 UNAVAILABLE` until the process restarts.
async fn die_handler(State(state): State<AppState>) -> StatusCode {
    state.die();
    StatusCode::OK
}

async fn shutdown_signal(state: AppState) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("rm shutdown signal received"),
            Err(err) => tracing::error!(?err, "failed to listen for rm shutdown signal"),
        },
        _ = state.wait_for_shutdown() => {
            tracing::info!("rm shutdown requested via /shutdown");
        }
    }
}

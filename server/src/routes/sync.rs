//! Sync endpoint routes.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use torque_engine::{BatchSummary, DownloadRecord, SyncPayload};

use crate::auth::Caller;
use crate::error::Result;
use crate::handlers::{
    handle_check, handle_download_status, handle_full_sync, handle_ingest_batch,
    handle_ingest_one, handle_record_download, handle_status, ActivitiesRequest, CheckResponse,
    DownloadsResponse, IngestOneResponse, RecordDownloadRequest, StatusResponse, SyncQuery,
};
use crate::AppState;

/// Sync API, mounted under `/sync`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/full", get(full_sync_handler))
        .route("/check", get(check_handler))
        .route("/status", get(status_handler))
        .route(
            "/downloads",
            get(download_status_handler).post(record_download_handler),
        )
        .route("/activities", post(ingest_batch_handler))
        .route("/activity", post(ingest_one_handler))
}

/// GET /sync/full - Delta (or full catalog) for the caller's device.
async fn full_sync_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncPayload>> {
    let payload = handle_full_sync(&state.pool, &caller, query, &state.config).await?;
    Ok(Json(payload))
}

/// GET /sync/check - Lightweight update availability.
async fn check_handler(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<SyncQuery>,
) -> Result<Json<CheckResponse>> {
    let response = handle_check(&state.pool, &caller, query, state.config.sync_overlap).await?;
    Ok(Json(response))
}

/// GET /sync/status - Last checkpoint of the caller's device.
async fn status_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<StatusResponse>> {
    let response = handle_status(&state.pool, &caller).await?;
    Ok(Json(response))
}

/// GET /sync/downloads - Per-module download status.
async fn download_status_handler(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<DownloadsResponse>> {
    let response = handle_download_status(&state.pool, &caller).await?;
    Ok(Json(response))
}

/// POST /sync/downloads - Record a module download.
async fn record_download_handler(
    State(state): State<AppState>,
    caller: Caller,
    body: std::result::Result<Json<RecordDownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadRecord>> {
    let Json(request) = body?;
    let record = handle_record_download(&state.pool, &caller, request).await?;
    Ok(Json(record))
}

/// POST /sync/activities - Partial-success batch ingestion.
async fn ingest_batch_handler(
    State(state): State<AppState>,
    caller: Caller,
    body: std::result::Result<Json<ActivitiesRequest>, JsonRejection>,
) -> Result<Json<BatchSummary>> {
    let Json(request) = body?;
    let summary =
        handle_ingest_batch(&state.pool, &caller, request, state.config.batch_deadline).await?;
    Ok(Json(summary))
}

/// POST /sync/activity - Single event ingestion.
async fn ingest_one_handler(
    State(state): State<AppState>,
    caller: Caller,
    body: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOneResponse>)> {
    let Json(event) = body?;
    let response = handle_ingest_one(&state.pool, &caller, event).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

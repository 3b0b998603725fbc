//! Download ledger handlers.

use crate::auth::Caller;
use crate::db;
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use torque_engine::{DeviceId, DownloadRecord, DownloadStatus, ItemId, Version};

/// Request body for recording a download.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDownloadRequest {
    pub module_id: ItemId,
    /// Version the device stored; defaults to the module's current version
    #[serde(default)]
    pub version: Option<Version>,
}

/// Response for the download status endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadsResponse {
    pub device_id: DeviceId,
    pub downloads: Vec<DownloadStatus>,
}

/// Upsert the caller's download of a module.
pub async fn handle_record_download(
    pool: &PgPool,
    caller: &Caller,
    request: RecordDownloadRequest,
) -> Result<DownloadRecord> {
    if let Some(version) = request.version {
        if version < 1 {
            return Err(AppError::Validation(format!(
                "version must be at least 1, got {}",
                version
            )));
        }
    }

    let record = db::upsert_download(
        pool,
        &caller.identity,
        request.module_id,
        request.version,
        Utc::now(),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("module {}", request.module_id)))?;

    tracing::debug!(
        user_id = %caller.identity.user_id,
        device_id = %caller.identity.device_id,
        module_id = record.module_id,
        version = record.downloaded_version,
        "Recorded download"
    );

    Ok(record)
}

/// Staleness of every module downloaded on the caller's device.
pub async fn handle_download_status(pool: &PgPool, caller: &Caller) -> Result<DownloadsResponse> {
    let downloads = db::fetch_download_status(pool, &caller.identity).await?;
    Ok(DownloadsResponse {
        device_id: caller.identity.device_id.clone(),
        downloads,
    })
}

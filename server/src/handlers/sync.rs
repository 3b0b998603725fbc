//! Sync handlers - delta payloads, update checks and checkpoint status.

use crate::auth::Caller;
use crate::config::Config;
use crate::db;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use torque_engine::{
    parent_ids, ChangeFilter, ContentKind, SyncCheckpoint, SyncDelta, SyncKind, SyncPayload,
    Timestamp, UpdateCheck,
};

/// Query parameters shared by the sync endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuery {
    /// Server time returned by the device's previous sync (omitted on first sync)
    pub last_sync: Option<String>,
}

impl SyncQuery {
    /// Parse `lastSync`; empty means first sync.
    pub fn since(&self) -> Result<Option<Timestamp>> {
        match self.last_sync.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| AppError::Validation(format!("invalid lastSync '{}': {}", raw, e))),
        }
    }
}

/// Response for an update check.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(flatten)]
    pub check: UpdateCheck,
    pub server_time: Timestamp,
}

/// Response for the sync status endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Most recent checkpoint, or null if the device never synced
    pub last_sync: Option<SyncCheckpoint>,
}

/// `serverTime` handed back to the device as its next `lastSync`.
///
/// A content update stamps `updated_at` when its statement runs but only
/// becomes visible at commit, so a read starting at `read_started` can miss
/// rows stamped shortly before it. The resume point is set back by `overlap`
/// so the next incremental sync fetches them; items seen twice carry the
/// same id and version.
pub fn resume_point(read_started: Timestamp, overlap: Duration) -> Result<Timestamp> {
    let overlap = chrono::Duration::from_std(overlap)
        .map_err(|_| AppError::Internal(format!("sync overlap {:?} out of range", overlap)))?;
    read_started
        .checked_sub_signed(overlap)
        .ok_or_else(|| AppError::Internal("sync resume point out of range".into()))
}

/// Update the device registry; failures are logged and ignored.
async fn touch_device(pool: &PgPool, caller: &Caller, now: Timestamp) {
    if let Err(e) = db::touch_device(pool, &caller.seen_at(now)).await {
        tracing::warn!(
            user_id = %caller.identity.user_id,
            device_id = %caller.identity.device_id,
            "Failed to update device registry: {}",
            e
        );
    }
}

/// Compute the delta for the caller's device.
pub async fn handle_full_sync(
    pool: &PgPool,
    caller: &Caller,
    query: SyncQuery,
    config: &Config,
) -> Result<SyncPayload> {
    let since = query.since()?;
    let filter = ChangeFilter::new(since);

    let read_started = Utc::now();
    let server_time = resume_point(read_started, config.sync_overlap)?;
    touch_device(pool, caller, read_started).await;

    let (modules, aids, categories, settings) = tokio::try_join!(
        db::fetch_active_changed_since(pool, ContentKind::Module, since),
        db::fetch_active_changed_since(pool, ContentKind::DiagnosticAid, since),
        db::fetch_active_changed_since(pool, ContentKind::Category, since),
        db::fetch_settings_all(pool),
    )?;
    let steps = db::fetch_steps_bulk(pool, &parent_ids(&aids)).await?;

    let delta = SyncDelta::assemble(&filter, &modules, &aids, steps, &categories, settings);

    let checkpoint = SyncCheckpoint {
        identity: caller.identity.clone(),
        kind: SyncKind::for_since(since),
        item_count: delta.item_count() as u64,
        synced_at: read_started,
    };
    if let Err(e) = db::insert_checkpoint(pool, &checkpoint).await {
        // Checkpoints are informational; the payload is still valid
        tracing::warn!(
            user_id = %checkpoint.identity.user_id,
            device_id = %checkpoint.identity.device_id,
            "Failed to record sync checkpoint: {}",
            e
        );
    }

    tracing::info!(
        user_id = %caller.identity.user_id,
        device_id = %caller.identity.device_id,
        kind = %checkpoint.kind,
        items = checkpoint.item_count,
        "Computed sync delta"
    );

    Ok(SyncPayload::new(
        &filter,
        delta,
        server_time,
        config.sync_interval.as_secs(),
    ))
}

/// Count pending changes without materializing content.
pub async fn handle_check(
    pool: &PgPool,
    caller: &Caller,
    query: SyncQuery,
    overlap: Duration,
) -> Result<CheckResponse> {
    let since = query.since()?;
    let filter = ChangeFilter::new(since);

    let read_started = Utc::now();
    let server_time = resume_point(read_started, overlap)?;
    touch_device(pool, caller, read_started).await;

    let counts = db::count_active_changed_since(pool, since).await?;

    Ok(CheckResponse {
        check: UpdateCheck::evaluate(&filter, counts),
        server_time,
    })
}

/// Most recent checkpoint of the caller's device.
pub async fn handle_status(pool: &PgPool, caller: &Caller) -> Result<StatusResponse> {
    let last_sync = db::latest_checkpoint(pool, &caller.identity).await?;
    Ok(StatusResponse { last_sync })
}

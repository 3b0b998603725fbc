//! Activity ingestion handlers.

use crate::auth::Caller;
use crate::db;
use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use torque_engine::{prepare_batch, prepare_one, AppendOutcome, BatchSummary};

/// Request body for batch ingestion.
#[derive(Debug, Deserialize)]
pub struct ActivitiesRequest {
    /// Kept untyped so one malformed event cannot fail decoding of the batch
    #[serde(default)]
    pub activities: Option<serde_json::Value>,
}

impl ActivitiesRequest {
    /// Batch-level structure check.
    pub fn into_events(self) -> Result<Vec<serde_json::Value>> {
        match self.activities {
            None | Some(serde_json::Value::Null) => {
                Err(AppError::Validation("activities array is required".into()))
            }
            Some(serde_json::Value::Array(events)) => Ok(events),
            Some(_) => Err(AppError::Validation("activities must be an array".into())),
        }
    }
}

/// Response for single-event ingestion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOneResponse {
    pub synced: bool,
    /// The event id had already been stored
    pub duplicate: bool,
}

/// Ingest a batch of offline events with partial success.
///
/// Events are appended one by one; each append is its own atomic insert. An
/// event that fails validation is logged and counted as failed. Every insert
/// runs under the request deadline; once it passes, the rest are skipped.
/// A storage error stops the batch: with nothing committed yet it fails the
/// request, otherwise the unattempted events are reported as skipped.
pub async fn handle_ingest_batch(
    pool: &PgPool,
    caller: &Caller,
    request: ActivitiesRequest,
    deadline: Duration,
) -> Result<BatchSummary> {
    let deadline_at = Instant::now() + deadline;
    let raw = request.into_events()?;
    let prepared = prepare_batch(&caller.identity, raw, Utc::now())?;

    let mut summary = prepared.summary;
    let pending = prepared.events.len();
    let mut committed = 0;

    for (done, (index, event)) in prepared.events.into_iter().enumerate() {
        let remaining = pending - done;
        if Instant::now() >= deadline_at {
            abort_at_deadline(&mut summary, caller, remaining);
            break;
        }

        match timeout_at(deadline_at, db::insert_activity(pool, &event)).await {
            Ok(Ok(_)) => {
                committed += 1;
                summary.accept();
            }
            Ok(Err(e)) if committed == 0 => {
                tracing::error!(
                    user_id = %caller.identity.user_id,
                    device_id = %caller.identity.device_id,
                    index,
                    "Activity batch failed before any insert"
                );
                return Err(AppError::Database(e));
            }
            Ok(Err(e)) => {
                tracing::error!(
                    user_id = %caller.identity.user_id,
                    device_id = %caller.identity.device_id,
                    index,
                    committed,
                    skipped = remaining,
                    "Storage failed mid-batch: {}",
                    e
                );
                summary.skip_remaining(remaining);
                break;
            }
            Err(_) => {
                abort_at_deadline(&mut summary, caller, remaining);
                break;
            }
        }
    }

    for rejection in &summary.rejections {
        tracing::warn!(
            user_id = %caller.identity.user_id,
            device_id = %caller.identity.device_id,
            index = rejection.index,
            "Rejected activity event: {}",
            rejection.reason
        );
    }

    tracing::info!(
        user_id = %caller.identity.user_id,
        device_id = %caller.identity.device_id,
        accepted = summary.accepted,
        failed = summary.failed,
        skipped = summary.skipped,
        total = summary.total,
        "Ingested activity batch"
    );

    Ok(summary)
}

fn abort_at_deadline(summary: &mut BatchSummary, caller: &Caller, remaining: usize) {
    summary.abort_at_deadline(remaining);
    tracing::warn!(
        user_id = %caller.identity.user_id,
        device_id = %caller.identity.device_id,
        skipped = remaining,
        "Activity batch deadline exceeded"
    );
}

/// Ingest one event; any failure fails the request.
pub async fn handle_ingest_one(
    pool: &PgPool,
    caller: &Caller,
    raw: serde_json::Value,
) -> Result<IngestOneResponse> {
    let event = prepare_one(&caller.identity, raw, Utc::now())?;
    let outcome = db::insert_activity(pool, &event).await?;

    Ok(IngestOneResponse {
        synced: true,
        duplicate: outcome == AppendOutcome::Duplicate,
    })
}

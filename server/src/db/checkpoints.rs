//! Database operations for the sync checkpoint log.

use sqlx::{PgPool, Row};
use torque_engine::{Identity, SyncCheckpoint, SyncKind};

/// Append a checkpoint.
pub async fn insert_checkpoint(
    pool: &PgPool,
    checkpoint: &SyncCheckpoint,
) -> Result<i64, sqlx::Error> {
    let result: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO sync_checkpoints (user_id, device_id, sync_kind, item_count, synced_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(&checkpoint.identity.user_id)
    .bind(&checkpoint.identity.device_id)
    .bind(checkpoint.kind.as_str())
    .bind(checkpoint.item_count as i64)
    .bind(checkpoint.synced_at)
    .fetch_one(pool)
    .await?;

    Ok(result.0)
}

/// Most recent checkpoint of a device.
pub async fn latest_checkpoint(
    pool: &PgPool,
    identity: &Identity,
) -> Result<Option<SyncCheckpoint>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT sync_kind, item_count, synced_at
        FROM sync_checkpoints
        WHERE user_id = $1 AND device_id = $2
        ORDER BY synced_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(&identity.user_id)
    .bind(&identity.device_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: String = row.try_get("sync_kind")?;
    let kind = SyncKind::parse(&kind)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown sync kind: {}", kind).into()))?;
    let item_count: i64 = row.try_get("item_count")?;

    Ok(Some(SyncCheckpoint {
        identity: identity.clone(),
        kind,
        item_count: item_count as u64,
        synced_at: row.try_get("synced_at")?,
    }))
}

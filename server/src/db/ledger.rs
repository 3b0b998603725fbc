//! Database operations for the download ledger.

use sqlx::{PgPool, Row};
use torque_engine::{DownloadRecord, DownloadStatus, Identity, ItemId, Timestamp, Version};

/// Upsert the ledger row for a module download.
///
/// The module lookup and the upsert are one statement. `version = None`
/// records the module's current version. Returns `None` when the module does
/// not exist or is inactive, in which case nothing is written.
pub async fn upsert_download(
    pool: &PgPool,
    identity: &Identity,
    module_id: ItemId,
    version: Option<Version>,
    now: Timestamp,
) -> Result<Option<DownloadRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO module_downloads (
            user_id, module_id, device_id, downloaded_version, downloaded_at
        )
        SELECT $1, m.id, $3, COALESCE($4, m.version), $5
        FROM modules m
        WHERE m.id = $2 AND m.is_active
        ON CONFLICT (user_id, module_id, device_id) DO UPDATE SET
            downloaded_version = EXCLUDED.downloaded_version,
            downloaded_at = EXCLUDED.downloaded_at
        RETURNING module_id, downloaded_version, downloaded_at
        "#,
    )
    .bind(&identity.user_id)
    .bind(module_id)
    .bind(&identity.device_id)
    .bind(version)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(DownloadRecord {
            module_id: row.try_get("module_id")?,
            downloaded_version: row.try_get("downloaded_version")?,
            downloaded_at: row.try_get("downloaded_at")?,
        })
    })
    .transpose()
}

/// Ledger rows of a device joined with the current module versions.
pub async fn fetch_download_status(
    pool: &PgPool,
    identity: &Identity,
) -> Result<Vec<DownloadStatus>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT d.module_id, d.downloaded_version, d.downloaded_at,
               m.version AS current_version, m.is_active
        FROM module_downloads d
        JOIN modules m ON m.id = d.module_id
        WHERE d.user_id = $1 AND d.device_id = $2
        ORDER BY d.module_id ASC
        "#,
    )
    .bind(&identity.user_id)
    .bind(&identity.device_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let record = DownloadRecord {
                module_id: row.try_get("module_id")?,
                downloaded_version: row.try_get("downloaded_version")?,
                downloaded_at: row.try_get("downloaded_at")?,
            };
            Ok(DownloadStatus::from_parts(
                &record,
                row.try_get("current_version")?,
                row.try_get("is_active")?,
            ))
        })
        .collect()
}

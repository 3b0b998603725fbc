//! Database operations for the device registry.

use sqlx::PgPool;
use torque_engine::DeviceSeen;

/// Record that a device was seen, reactivating it if needed.
pub async fn touch_device(pool: &PgPool, seen: &DeviceSeen) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_devices (
            user_id, device_id, platform, app_version, last_seen_at, is_active
        )
        VALUES ($1, $2, $3, $4, $5, TRUE)
        ON CONFLICT (user_id, device_id) DO UPDATE SET
            platform = COALESCE(EXCLUDED.platform, user_devices.platform),
            app_version = COALESCE(EXCLUDED.app_version, user_devices.app_version),
            last_seen_at = GREATEST(EXCLUDED.last_seen_at, user_devices.last_seen_at),
            is_active = TRUE
        "#,
    )
    .bind(&seen.identity.user_id)
    .bind(&seen.identity.device_id)
    .bind(&seen.platform)
    .bind(&seen.app_version)
    .bind(seen.seen_at)
    .execute(pool)
    .await?;

    Ok(())
}

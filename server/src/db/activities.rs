//! Database operations for the activity log.

use sqlx::PgPool;
use torque_engine::{AppendOutcome, NewActivity};

/// Append one activity event.
///
/// An event whose `event_id` was already stored for the same device is not
/// inserted again and reports [`AppendOutcome::Duplicate`].
pub async fn insert_activity(
    pool: &PgPool,
    event: &NewActivity,
) -> Result<AppendOutcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO activity_events (
            user_id, device_id, event_id, activity_type, reference_id,
            reference_type, metadata, duration_seconds, client_timestamp,
            occurred_at, received_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (user_id, device_id, event_id) WHERE event_id IS NOT NULL
        DO NOTHING
        "#,
    )
    .bind(&event.identity.user_id)
    .bind(&event.identity.device_id)
    .bind(&event.event_id)
    .bind(&event.activity_type)
    .bind(&event.reference_id)
    .bind(&event.reference_type)
    .bind(&event.metadata)
    .bind(event.duration_seconds)
    .bind(event.client_timestamp)
    .bind(event.occurred_at)
    .bind(event.received_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        Ok(AppendOutcome::Duplicate)
    } else {
        Ok(AppendOutcome::Inserted)
    }
}

//! Read access to the content repository tables.

use sqlx::{PgPool, Row};
use torque_engine::{
    ChangeCounts, ContentItem, ContentKind, DiagnosticStep, ItemId, Setting, Timestamp,
};

/// A stored content row from the database.
#[derive(Debug)]
pub struct StoredContent {
    pub id: i64,
    pub category_id: Option<i64>,
    pub payload: serde_json::Value,
    pub version: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub is_active: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredContent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredContent {
            id: row.try_get("id")?,
            category_id: row.try_get("category_id")?,
            payload: row.try_get("payload")?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl StoredContent {
    /// Convert database row to an engine content item.
    pub fn into_item(self, kind: ContentKind) -> ContentItem {
        ContentItem {
            id: self.id,
            kind,
            category_id: self.category_id,
            payload: self.payload,
            version: self.version,
            updated_at: self.updated_at,
            is_active: self.is_active,
        }
    }
}

/// Column list for a content table; categories have no parent category.
fn content_columns(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Category => {
            "id, NULL::BIGINT AS category_id, payload, version, updated_at, is_active"
        }
        ContentKind::Module | ContentKind::DiagnosticAid => {
            "id, category_id, payload, version, updated_at, is_active"
        }
    }
}

/// Active items of one kind updated strictly after `since` (all active items if `None`).
pub async fn fetch_active_changed_since(
    pool: &PgPool,
    kind: ContentKind,
    since: Option<Timestamp>,
) -> Result<Vec<ContentItem>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {}
        FROM {}
        WHERE is_active AND ($1::timestamptz IS NULL OR updated_at > $1)
        ORDER BY id ASC
        "#,
        content_columns(kind),
        kind.table(),
    );

    let rows = sqlx::query_as::<_, StoredContent>(&sql)
        .bind(since)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|r| r.into_item(kind)).collect())
}

/// Steps of all given aids in a single query.
pub async fn fetch_steps_bulk(
    pool: &PgPool,
    aid_ids: &[ItemId],
) -> Result<Vec<DiagnosticStep>, sqlx::Error> {
    if aid_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT id, aid_id, step_order, payload
        FROM diagnostic_steps
        WHERE aid_id = ANY($1)
        ORDER BY aid_id ASC, step_order ASC, id ASC
        "#,
    )
    .bind(aid_ids)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(DiagnosticStep {
                id: row.try_get("id")?,
                aid_id: row.try_get("aid_id")?,
                step_order: row.try_get("step_order")?,
                payload: row.try_get("payload")?,
            })
        })
        .collect()
}

/// All settings.
pub async fn fetch_settings_all(pool: &PgPool) -> Result<Vec<Setting>, sqlx::Error> {
    let rows: Vec<(String, serde_json::Value)> =
        sqlx::query_as(r#"SELECT key, value FROM settings ORDER BY key ASC"#)
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(key, value)| Setting { key, value })
        .collect())
}

/// Count changed active items per kind without loading them.
pub async fn count_active_changed_since(
    pool: &PgPool,
    since: Option<Timestamp>,
) -> Result<ChangeCounts, sqlx::Error> {
    let (modules, diagnostic_aids, categories): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM modules
             WHERE is_active AND ($1::timestamptz IS NULL OR updated_at > $1)),
            (SELECT COUNT(*) FROM diagnostic_aids
             WHERE is_active AND ($1::timestamptz IS NULL OR updated_at > $1)),
            (SELECT COUNT(*) FROM categories
             WHERE is_active AND ($1::timestamptz IS NULL OR updated_at > $1))
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(ChangeCounts {
        modules: modules as u64,
        diagnostic_aids: diagnostic_aids as u64,
        categories: categories as u64,
    })
}

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::audit::{AuditEntry, AuditFilter, NewAuditEntry};
use crate::store::StoreError;

/// Append an audit entry
pub async fn insert_entry(pool: &PgPool, entry: &NewAuditEntry) -> Result<AuditEntry, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO audit_logs (id, actor, action, resource_type, resource_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, actor, action, resource_type, resource_id, details, timestamp
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.actor)
    .bind(entry.action)
    .bind(entry.resource_type)
    .bind(entry.resource_id.as_deref())
    .bind(entry.details.clone())
    .fetch_one(pool)
    .await?;

    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor: row.try_get("actor")?,
        action: row.try_get("action")?,
        resource_type: row.try_get("resource_type")?,
        resource_id: row.try_get("resource_id")?,
        details: row.try_get("details")?,
        timestamp: row.try_get("timestamp")?,
    })
}

/// Audit entries, newest first
pub async fn list_entries(
    pool: &PgPool,
    filter: &AuditFilter,
) -> Result<Vec<AuditEntry>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, actor, action, resource_type, resource_id, details, timestamp
        FROM audit_logs
        WHERE ($1::text IS NULL OR resource_type = $1)
          AND ($2::text IS NULL OR action = $2)
        ORDER BY timestamp DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(filter.resource_type.as_deref())
    .bind(filter.action.as_deref())
    .bind(filter.limit)
    .bind(filter.skip)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| -> Result<AuditEntry, StoreError> {
            Ok(AuditEntry {
                id: r.try_get("id")?,
                actor: r.try_get("actor")?,
                action: r.try_get("action")?,
                resource_type: r.try_get("resource_type")?,
                resource_id: r.try_get("resource_id")?,
                details: r.try_get("details")?,
                timestamp: r.try_get("timestamp")?,
            })
        })
        .collect()
}

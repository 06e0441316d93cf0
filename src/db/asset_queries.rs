use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::asset::{
    Asset, AssetCondition, AssetFilter, AssetStatus, AssetUpdate, NewAsset,
};
use crate::models::job::DetectedEquipment;
use crate::models::report::AssetStatistics;
use crate::store::StoreError;

const ASSET_COLUMNS: &str = "id, asset_tag, name, item_type, description, location, status, \
     condition, weight, notes, metadata, last_seen, created_at, updated_at";

/// Postgres unique violation
const UNIQUE_VIOLATION: &str = "23505";

fn asset_from_row(row: &PgRow) -> Result<Asset, StoreError> {
    let status: String = row.try_get("status")?;
    let condition: String = row.try_get("condition")?;

    Ok(Asset {
        id: row.try_get("id")?,
        asset_tag: row.try_get("asset_tag")?,
        name: row.try_get("name")?,
        item_type: row.try_get("item_type")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        status: AssetStatus::from_str(&status)
            .map_err(|_| StoreError::Corrupt(format!("unknown asset status '{status}'")))?,
        condition: AssetCondition::from_str(&condition)
            .map_err(|_| StoreError::Corrupt(format!("unknown asset condition '{condition}'")))?,
        weight: row.try_get("weight")?,
        notes: row.try_get("notes")?,
        metadata: row.try_get("metadata")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert an asset; `asset_tag` must already be normalised
pub async fn create_asset(pool: &PgPool, tag: &str, asset: &NewAsset) -> Result<Asset, StoreError> {
    let sql = format!(
        "INSERT INTO assets (id, asset_tag, name, item_type, description, location, status, \
                             condition, weight, notes, metadata, last_seen) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW()) \
         RETURNING {ASSET_COLUMNS}"
    );
    let result = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(tag)
        .bind(asset.name.as_deref())
        .bind(&asset.item_type)
        .bind(asset.description.as_deref())
        .bind(&asset.location)
        .bind(asset.status.to_string())
        .bind(asset.condition.to_string())
        .bind(asset.weight.as_deref())
        .bind(asset.notes.as_deref())
        .bind(asset.metadata.clone())
        .fetch_one(pool)
        .await;

    match result {
        Ok(row) => asset_from_row(&row),
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Err(StoreError::Conflict(format!("Asset with tag '{tag}' already exists")))
        }
        Err(e) => Err(e.into()),
    }
}

/// Get an asset by tag
pub async fn get_asset(pool: &PgPool, tag: &str) -> Result<Option<Asset>, StoreError> {
    let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE asset_tag = $1");
    let row = sqlx::query(&sql).bind(tag).fetch_optional(pool).await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Filtered asset listing, most recently updated first
pub async fn list_assets(pool: &PgPool, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
    let sql = format!(
        "SELECT {ASSET_COLUMNS} FROM assets \
         WHERE ($1::text IS NULL OR status = $1) \
           AND ($2::text IS NULL OR condition = $2) \
           AND ($3::text IS NULL OR item_type = $3) \
           AND ($4::text IS NULL OR location ILIKE '%' || $4 || '%') \
           AND ($5::text IS NULL \
                OR asset_tag ILIKE '%' || $5 || '%' \
                OR name ILIKE '%' || $5 || '%' \
                OR description ILIKE '%' || $5 || '%' \
                OR location ILIKE '%' || $5 || '%') \
         ORDER BY updated_at DESC \
         LIMIT $6 OFFSET $7"
    );
    let rows = sqlx::query(&sql)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.condition.map(|c| c.to_string()))
        .bind(filter.item_type.as_deref())
        .bind(filter.location.as_deref())
        .bind(filter.search.as_deref())
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(pool)
        .await?;

    rows.iter().map(asset_from_row).collect()
}

/// Apply the provided fields of a partial update in one statement
pub async fn update_asset(
    pool: &PgPool,
    tag: &str,
    update: &AssetUpdate,
) -> Result<Option<Asset>, StoreError> {
    let sql = format!(
        "UPDATE assets \
         SET name = COALESCE($2, name), \
             item_type = COALESCE($3, item_type), \
             description = COALESCE($4, description), \
             location = COALESCE($5, location), \
             status = COALESCE($6, status), \
             condition = COALESCE($7, condition), \
             weight = COALESCE($8, weight), \
             notes = COALESCE($9, notes), \
             metadata = COALESCE($10, metadata), \
             updated_at = NOW() \
         WHERE asset_tag = $1 \
         RETURNING {ASSET_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(tag)
        .bind(update.name.as_deref())
        .bind(update.item_type.as_deref())
        .bind(update.description.as_deref())
        .bind(update.location.as_deref())
        .bind(update.status.map(|s| s.to_string()))
        .bind(update.condition.map(|c| c.to_string()))
        .bind(update.weight.as_deref())
        .bind(update.notes.as_deref())
        .bind(update.metadata.clone())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Fold a detection into an asset in one statement: bump `last_seen`, adopt
/// a graded condition, fill weight and description only where empty
pub async fn apply_detection(
    pool: &PgPool,
    tag: &str,
    detected: Option<&DetectedEquipment>,
) -> Result<Option<Asset>, StoreError> {
    let condition = detected
        .and_then(|d| AssetCondition::from_detected(&d.condition))
        .map(|c| c.to_string());
    let weight = detected.and_then(|d| d.estimated_weight.as_deref());
    let description = detected.and_then(|d| d.description.as_deref());

    let sql = format!(
        "UPDATE assets \
         SET condition = COALESCE($2, condition), \
             weight = COALESCE(NULLIF(weight, ''), $3), \
             description = COALESCE(NULLIF(description, ''), $4), \
             last_seen = NOW(), \
             updated_at = NOW() \
         WHERE asset_tag = $1 \
         RETURNING {ASSET_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(tag)
        .bind(condition)
        .bind(weight)
        .bind(description)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Move an asset and mark it as seen
pub async fn update_location(
    pool: &PgPool,
    tag: &str,
    location: &str,
) -> Result<Option<Asset>, StoreError> {
    let sql = format!(
        "UPDATE assets \
         SET location = $2, last_seen = NOW(), updated_at = NOW() \
         WHERE asset_tag = $1 \
         RETURNING {ASSET_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(tag)
        .bind(location)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Delete an asset by tag
pub async fn delete_asset(pool: &PgPool, tag: &str) -> Result<bool, StoreError> {
    let done = sqlx::query("DELETE FROM assets WHERE asset_tag = $1")
        .bind(tag)
        .execute(pool)
        .await?;

    Ok(done.rows_affected() > 0)
}

async fn group_counts(pool: &PgPool, column: &str) -> Result<BTreeMap<String, i64>, StoreError> {
    let sql = format!("SELECT {column} AS key, COUNT(*) AS count FROM assets GROUP BY {column}");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter()
        .map(|r| -> Result<(String, i64), StoreError> {
            Ok((r.try_get("key")?, r.try_get("count")?))
        })
        .collect()
}

/// Asset counts by status, condition, type and location
pub async fn statistics(pool: &PgPool) -> Result<AssetStatistics, StoreError> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM assets")
        .fetch_one(pool)
        .await?
        .try_get("count")?;

    Ok(AssetStatistics {
        total_assets: total,
        by_status: group_counts(pool, "status").await?,
        by_condition: group_counts(pool, "condition").await?,
        by_type: group_counts(pool, "item_type").await?,
        by_location: group_counts(pool, "location").await?,
        last_updated: Utc::now(),
    })
}

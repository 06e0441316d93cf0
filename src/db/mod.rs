use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::asset::{normalize_tag, Asset, AssetFilter, AssetUpdate, NewAsset};
use crate::models::audit::{AuditEntry, AuditFilter, NewAuditEntry};
use crate::models::job::{
    AnalysisJob, DetectedEquipment, HistoryFilter, JobOutcome, NewAnalysisJob, ReprocessOutcome,
};
use crate::models::report::AssetStatistics;
use crate::store::{AssetStore, AuditLog, JobStore, StoreError};

pub mod asset_queries;
pub mod audit_queries;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Postgres-backed implementation of the store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, job: NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
        queries::create_job(&self.pool, &job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn claim_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        queries::claim_job(&self.pool, job_id).await
    }

    async fn record_attempt(&self, job_id: Uuid, attempts: i32) -> Result<(), StoreError> {
        queries::record_attempt(&self.pool, job_id, attempts).await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        processing_time_ms: i64,
    ) -> Result<bool, StoreError> {
        queries::finish_job(&self.pool, job_id, outcome, processing_time_ms).await
    }

    async fn release_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        queries::release_job(&self.pool, job_id).await
    }

    async fn reset_for_reprocess(
        &self,
        job_id: Uuid,
        max_reprocess: i32,
    ) -> Result<ReprocessOutcome, StoreError> {
        queries::reset_for_reprocess(&self.pool, job_id, max_reprocess).await
    }

    async fn list_jobs(&self, filter: &HistoryFilter) -> Result<Vec<AnalysisJob>, StoreError> {
        queries::list_jobs(&self.pool, filter).await
    }

    async fn pending_job_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        queries::get_pending_job_ids(&self.pool, limit).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for PgStore {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, StoreError> {
        let tag = normalize_tag(&asset.asset_tag)
            .ok_or_else(|| StoreError::Conflict("asset tag is blank".to_string()))?;
        asset_queries::create_asset(&self.pool, &tag, &asset).await
    }

    async fn get_asset(&self, asset_tag: &str) -> Result<Option<Asset>, StoreError> {
        match normalize_tag(asset_tag) {
            Some(tag) => asset_queries::get_asset(&self.pool, &tag).await,
            None => Ok(None),
        }
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
        asset_queries::list_assets(&self.pool, filter).await
    }

    async fn update_asset(
        &self,
        asset_tag: &str,
        update: &AssetUpdate,
    ) -> Result<Option<Asset>, StoreError> {
        match normalize_tag(asset_tag) {
            Some(tag) => asset_queries::update_asset(&self.pool, &tag, update).await,
            None => Ok(None),
        }
    }

    async fn update_location(
        &self,
        asset_tag: &str,
        location: &str,
    ) -> Result<Option<Asset>, StoreError> {
        match normalize_tag(asset_tag) {
            Some(tag) => asset_queries::update_location(&self.pool, &tag, location).await,
            None => Ok(None),
        }
    }

    async fn delete_asset(&self, asset_tag: &str) -> Result<bool, StoreError> {
        match normalize_tag(asset_tag) {
            Some(tag) => asset_queries::delete_asset(&self.pool, &tag).await,
            None => Ok(false),
        }
    }

    async fn apply_detection(
        &self,
        asset_tag: &str,
        detected: Option<&DetectedEquipment>,
    ) -> Result<Option<Asset>, StoreError> {
        match normalize_tag(asset_tag) {
            Some(tag) => asset_queries::apply_detection(&self.pool, &tag, detected).await,
            None => Ok(None),
        }
    }

    async fn statistics(&self) -> Result<AssetStatistics, StoreError> {
        asset_queries::statistics(&self.pool).await
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        audit_queries::insert_entry(&self.pool, &entry).await
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        audit_queries::list_entries(&self.pool, filter).await
    }
}

//! Persistence seams for jobs, assets and the audit log.
//!
//! The Postgres implementation lives in [`crate::db`]; [`memory`] backs tests
//! and single-process development runs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::asset::{Asset, AssetFilter, AssetUpdate, NewAsset};
use crate::models::audit::{AuditEntry, AuditFilter, NewAuditEntry};
use crate::models::job::{
    AnalysisJob, DetectedEquipment, HistoryFilter, JobOutcome, NewAnalysisJob, ReprocessOutcome,
};
use crate::models::report::AssetStatistics;

pub mod memory;

/// Authoritative table of analysis jobs. The job manager is its only writer.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Record a new job in `Pending`.
    async fn create_job(&self, job: NewAnalysisJob) -> Result<AnalysisJob, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError>;

    /// Compare-and-set `Pending -> Processing`. Returns the claimed job only
    /// to the single caller that won the transition.
    async fn claim_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError>;

    /// Persist the attempt counter of a job that is still `Processing`.
    async fn record_attempt(&self, job_id: Uuid, attempts: i32) -> Result<(), StoreError>;

    /// Write the terminal outcome. Only applies to a `Processing` job;
    /// returns whether a row was updated.
    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        processing_time_ms: i64,
    ) -> Result<bool, StoreError>;

    /// Hand a `Processing` job whose outcome could not be written back to
    /// `Pending` with a fresh attempt count. Returns whether a row changed.
    async fn release_job(&self, job_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically move a `Failed` job back to `Pending` if its reprocess
    /// count is below `max_reprocess`.
    async fn reset_for_reprocess(
        &self,
        job_id: Uuid,
        max_reprocess: i32,
    ) -> Result<ReprocessOutcome, StoreError>;

    /// Newest first.
    async fn list_jobs(&self, filter: &HistoryFilter) -> Result<Vec<AnalysisJob>, StoreError>;

    /// Oldest first, for the worker sweep.
    async fn pending_job_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if the tag is taken.
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, StoreError>;

    async fn get_asset(&self, asset_tag: &str) -> Result<Option<Asset>, StoreError>;

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError>;

    async fn update_asset(
        &self,
        asset_tag: &str,
        update: &AssetUpdate,
    ) -> Result<Option<Asset>, StoreError>;

    async fn update_location(
        &self,
        asset_tag: &str,
        location: &str,
    ) -> Result<Option<Asset>, StoreError>;

    async fn delete_asset(&self, asset_tag: &str) -> Result<bool, StoreError>;

    /// Fold a detection into the asset: bump `last_seen`, adopt a graded
    /// condition, and fill weight/description only where empty.
    async fn apply_detection(
        &self,
        asset_tag: &str,
        detected: Option<&DetectedEquipment>,
    ) -> Result<Option<Asset>, StoreError>;

    async fn statistics(&self) -> Result<AssetStatistics, StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

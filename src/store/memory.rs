use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AssetStore, AuditLog, JobStore, StoreError};
use crate::models::asset::{normalize_tag, Asset, AssetFilter, AssetUpdate, NewAsset};
use crate::models::audit::{AuditEntry, AuditFilter, NewAuditEntry};
use crate::models::job::{
    AnalysisJob, DetectedEquipment, HistoryFilter, JobOutcome, JobStatus, NewAnalysisJob,
    ReprocessOutcome,
};
use crate::models::report::AssetStatistics;

#[derive(Default)]
struct JobTable {
    rows: HashMap<Uuid, AnalysisJob>,
    /// Insertion order; `created_at` alone can tie.
    order: Vec<Uuid>,
}

/// In-process store implementing every persistence seam.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<JobTable>,
    assets: RwLock<BTreeMap<String, Asset>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.rows.len()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, job: NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
        let mut table = self.jobs.write().await;
        if table.rows.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }

        let now = Utc::now();
        let record = AnalysisJob {
            id: job.id,
            status: JobStatus::Pending,
            image_key: job.image_key,
            asset_tag: job.asset_tag,
            original_filename: job.original_filename,
            result: None,
            error: None,
            retry_count: 0,
            attempts: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            processing_time_ms: None,
        };
        table.rows.insert(record.id, record.clone());
        table.order.push(record.id);
        Ok(record)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        Ok(self.jobs.read().await.rows.get(&job_id).cloned())
    }

    async fn claim_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
        let mut table = self.jobs.write().await;
        match table.rows.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_attempt(&self, job_id: Uuid, attempts: i32) -> Result<(), StoreError> {
        let mut table = self.jobs.write().await;
        if let Some(job) = table.rows.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.attempts = attempts;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        processing_time_ms: i64,
    ) -> Result<bool, StoreError> {
        let mut table = self.jobs.write().await;
        let Some(job) = table.rows.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Processing {
            return Ok(false);
        }

        let now = Utc::now();
        job.status = outcome.status();
        match outcome {
            JobOutcome::Completed(result) => {
                job.result = Some(result.clone());
                job.error = None;
            }
            JobOutcome::Failed(error) => {
                job.result = None;
                job.error = Some(error.clone());
            }
        }
        job.completed_at = Some(now);
        job.updated_at = now;
        job.processing_time_ms = Some(processing_time_ms);
        Ok(true)
    }

    async fn release_job(&self, job_id: Uuid) -> Result<bool, StoreError> {
        let mut table = self.jobs.write().await;
        match table.rows.get_mut(&job_id) {
            Some(job) if job.status == JobStatus::Processing => {
                job.status = JobStatus::Pending;
                job.attempts = 0;
                job.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_for_reprocess(
        &self,
        job_id: Uuid,
        max_reprocess: i32,
    ) -> Result<ReprocessOutcome, StoreError> {
        let mut table = self.jobs.write().await;
        let Some(job) = table.rows.get_mut(&job_id) else {
            return Ok(ReprocessOutcome::NotFound);
        };
        if job.status != JobStatus::Failed {
            return Ok(ReprocessOutcome::WrongState(job.status));
        }
        if job.retry_count >= max_reprocess {
            return Ok(ReprocessOutcome::RetryExceeded {
                retry_count: job.retry_count,
            });
        }

        job.status = JobStatus::Pending;
        job.retry_count += 1;
        job.attempts = 0;
        job.error = None;
        job.result = None;
        job.completed_at = None;
        job.processing_time_ms = None;
        job.updated_at = Utc::now();
        Ok(ReprocessOutcome::Reset(job.clone()))
    }

    async fn list_jobs(&self, filter: &HistoryFilter) -> Result<Vec<AnalysisJob>, StoreError> {
        let table = self.jobs.read().await;
        let jobs = table
            .order
            .iter()
            .rev()
            .filter_map(|id| table.rows.get(id))
            .filter(|job| filter.status.map_or(true, |s| s == job.status))
            .filter(|job| {
                filter
                    .asset_tag
                    .as_deref()
                    .map_or(true, |tag| job.asset_tag.as_deref() == Some(tag))
            })
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok(jobs)
    }

    async fn pending_job_ids(&self, limit: i64) -> Result<Vec<Uuid>, StoreError> {
        let table = self.jobs.read().await;
        Ok(table
            .order
            .iter()
            .filter(|id| {
                table
                    .rows
                    .get(id)
                    .is_some_and(|job| job.status == JobStatus::Pending)
            })
            .take(limit.max(0) as usize)
            .copied()
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn create_asset(&self, asset: NewAsset) -> Result<Asset, StoreError> {
        let tag = normalize_tag(&asset.asset_tag)
            .ok_or_else(|| StoreError::Conflict("asset tag is blank".to_string()))?;
        let mut assets = self.assets.write().await;
        if assets.contains_key(&tag) {
            return Err(StoreError::Conflict(format!(
                "Asset with tag '{tag}' already exists"
            )));
        }

        let now = Utc::now();
        let record = Asset {
            id: Uuid::new_v4(),
            asset_tag: tag.clone(),
            name: asset.name,
            item_type: asset.item_type,
            description: asset.description,
            location: asset.location,
            status: asset.status,
            condition: asset.condition,
            weight: asset.weight,
            notes: asset.notes,
            metadata: asset.metadata,
            last_seen: now,
            created_at: now,
            updated_at: now,
        };
        assets.insert(tag, record.clone());
        Ok(record)
    }

    async fn get_asset(&self, asset_tag: &str) -> Result<Option<Asset>, StoreError> {
        let Some(tag) = normalize_tag(asset_tag) else {
            return Ok(None);
        };
        Ok(self.assets.read().await.get(&tag).cloned())
    }

    async fn list_assets(&self, filter: &AssetFilter) -> Result<Vec<Asset>, StoreError> {
        let assets = self.assets.read().await;
        let mut matching: Vec<Asset> = assets
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matching
            .into_iter()
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn update_asset(
        &self,
        asset_tag: &str,
        update: &AssetUpdate,
    ) -> Result<Option<Asset>, StoreError> {
        let Some(tag) = normalize_tag(asset_tag) else {
            return Ok(None);
        };
        let mut assets = self.assets.write().await;
        Ok(assets.get_mut(&tag).map(|asset| {
            update.apply_to(asset);
            asset.updated_at = Utc::now();
            asset.clone()
        }))
    }

    async fn update_location(
        &self,
        asset_tag: &str,
        location: &str,
    ) -> Result<Option<Asset>, StoreError> {
        let Some(tag) = normalize_tag(asset_tag) else {
            return Ok(None);
        };
        let mut assets = self.assets.write().await;
        Ok(assets.get_mut(&tag).map(|asset| {
            let now = Utc::now();
            asset.location = location.to_string();
            asset.last_seen = now;
            asset.updated_at = now;
            asset.clone()
        }))
    }

    async fn delete_asset(&self, asset_tag: &str) -> Result<bool, StoreError> {
        let Some(tag) = normalize_tag(asset_tag) else {
            return Ok(false);
        };
        Ok(self.assets.write().await.remove(&tag).is_some())
    }

    async fn apply_detection(
        &self,
        asset_tag: &str,
        detected: Option<&DetectedEquipment>,
    ) -> Result<Option<Asset>, StoreError> {
        let Some(tag) = normalize_tag(asset_tag) else {
            return Ok(None);
        };
        let mut assets = self.assets.write().await;
        Ok(assets.get_mut(&tag).map(|asset| {
            asset.absorb_detection(detected, Utc::now());
            asset.clone()
        }))
    }

    async fn statistics(&self) -> Result<AssetStatistics, StoreError> {
        let assets = self.assets.read().await;
        let mut stats = AssetStatistics {
            total_assets: assets.len() as i64,
            last_updated: Utc::now(),
            ..Default::default()
        };
        for asset in assets.values() {
            *stats.by_status.entry(asset.status.to_string()).or_default() += 1;
            *stats.by_condition.entry(asset.condition.to_string()).or_default() += 1;
            *stats.by_type.entry(asset.item_type.clone()).or_default() += 1;
            *stats.by_location.entry(asset.location.clone()).or_default() += 1;
        }
        Ok(stats)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn record(&self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let record = AuditEntry {
            id: Uuid::new_v4(),
            actor: entry.actor,
            action: entry.action.to_string(),
            resource_type: entry.resource_type.to_string(),
            resource_id: entry.resource_id,
            details: entry.details,
            timestamp: Utc::now(),
        };
        self.audit.write().await.push(record.clone());
        Ok(record)
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let audit = self.audit.read().await;
        Ok(audit
            .iter()
            .rev()
            .filter(|e| {
                filter
                    .resource_type
                    .as_deref()
                    .map_or(true, |t| e.resource_type == t)
            })
            .filter(|e| filter.action.as_deref().map_or(true, |a| e.action == a))
            .skip(filter.skip as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::asset::{AssetCondition, AssetStatus};
    use crate::models::job::{FailureKind, JobError};

    fn new_job(tag: Option<&str>) -> NewAnalysisJob {
        let id = Uuid::new_v4();
        NewAnalysisJob {
            id,
            image_key: format!("analysis/{id}.jpg"),
            asset_tag: tag.map(str::to_string),
            original_filename: None,
        }
    }

    fn new_asset(tag: &str) -> NewAsset {
        NewAsset {
            asset_tag: tag.to_string(),
            name: None,
            item_type: "kettlebell".to_string(),
            description: None,
            location: "Functional Zone".to_string(),
            status: AssetStatus::Active,
            condition: AssetCondition::Good,
            weight: None,
            notes: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_claim_is_compare_and_set() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job(None)).await.unwrap();

        let first = store.claim_job(job.id).await.unwrap();
        let second = store.claim_job(job.id).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(
            store.get_job(job.id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_finish_requires_processing() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job(None)).await.unwrap();
        let outcome = JobOutcome::Failed(JobError::new(FailureKind::Permanent, "nope"));

        assert!(!store.finish_job(job.id, &outcome, 5).await.unwrap());
        store.claim_job(job.id).await.unwrap();
        assert!(store.finish_job(job.id, &outcome, 5).await.unwrap());

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.result.is_none());
        assert!(stored.error.is_some());
    }

    #[tokio::test]
    async fn test_reprocess_outcomes() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job(None)).await.unwrap();

        assert!(matches!(
            store.reset_for_reprocess(job.id, 1).await.unwrap(),
            ReprocessOutcome::WrongState(JobStatus::Pending)
        ));
        assert!(matches!(
            store.reset_for_reprocess(Uuid::new_v4(), 1).await.unwrap(),
            ReprocessOutcome::NotFound
        ));

        let outcome = JobOutcome::Failed(JobError::new(FailureKind::Transient, "timeout"));
        store.claim_job(job.id).await.unwrap();
        store.finish_job(job.id, &outcome, 1).await.unwrap();

        let ReprocessOutcome::Reset(reset) = store.reset_for_reprocess(job.id, 1).await.unwrap()
        else {
            panic!("expected reset");
        };
        assert_eq!(reset.retry_count, 1);
        assert!(reset.error.is_none());

        store.claim_job(job.id).await.unwrap();
        store.finish_job(job.id, &outcome, 1).await.unwrap();
        assert!(matches!(
            store.reset_for_reprocess(job.id, 1).await.unwrap(),
            ReprocessOutcome::RetryExceeded { retry_count: 1 }
        ));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_filtered() {
        let store = MemoryStore::new();
        let a = store.create_job(new_job(Some("BB-01"))).await.unwrap();
        let b = store.create_job(new_job(None)).await.unwrap();
        let c = store.create_job(new_job(Some("BB-01"))).await.unwrap();

        let all = store
            .list_jobs(&HistoryFilter::default().normalized())
            .await
            .unwrap();
        let ids: Vec<Uuid> = all.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);

        let tagged = store
            .list_jobs(
                &HistoryFilter {
                    asset_tag: Some("bb-01".to_string()),
                    ..Default::default()
                }
                .normalized(),
            )
            .await
            .unwrap();
        assert_eq!(tagged.len(), 2);

        assert_eq!(store.pending_job_ids(2).await.unwrap(), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_asset_tags_are_unique_and_uppercased() {
        let store = MemoryStore::new();
        let created = store.create_asset(new_asset("kb-16")).await.unwrap();
        assert_eq!(created.asset_tag, "KB-16");

        let dup = store.create_asset(new_asset("KB-16")).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        assert!(store.get_asset("kb-16").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_statistics_group_counts() {
        let store = MemoryStore::new();
        store.create_asset(new_asset("KB-01")).await.unwrap();
        store.create_asset(new_asset("KB-02")).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_assets, 2);
        assert_eq!(stats.by_status.get("Active"), Some(&2));
        assert_eq!(stats.by_type.get("kettlebell"), Some(&2));
    }
}

//! Analysis job lifecycle: submit, process, poll and reprocess.
//!
//! Jobs move `pending -> processing -> completed | failed`, with
//! `failed -> pending` only through [`AnalysisManager::reprocess`]. Every
//! transition goes through a guarded store write, so concurrent workers
//! cannot both drive the same job.

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::models::asset::normalize_tag;
use crate::models::audit::{actions, NewAuditEntry, SYSTEM_ACTOR};
use crate::models::job::{
    AnalysisJob, FailureKind, HistoryFilter, JobError, JobOutcome, NewAnalysisJob,
    ReprocessOutcome,
};
use crate::services::image_store::{image_key, ImageStore, StorageError};
use crate::services::normalize::normalize_response;
use crate::services::preprocess::{preprocess, PreprocessOptions};
use crate::services::queue::{JobQueue, QueuedJob};
use crate::services::vision::VisionAnalyzer;
use crate::store::{AssetStore, AuditLog, JobStore, StoreError};

/// Tries of the terminal job write before the job is released.
const OUTCOME_WRITE_ATTEMPTS: i32 = 3;

/// Exponential backoff between inline retries of a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// `min(base * 2^(attempt-1), max)` for the 1-based attempt that failed.
    pub fn delay(&self, attempt: i32) -> Duration {
        let exponent = attempt.saturating_sub(1).clamp(0, 30) as u32;
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub max_upload_bytes: usize,
    pub preprocess: PreprocessOptions,
    /// Reprocess calls allowed per job
    pub max_reprocess: i32,
    /// Remote calls allowed within one processing run
    pub max_attempts: i32,
    pub backoff: Backoff,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 20 * 1024 * 1024,
            preprocess: PreprocessOptions::default(),
            max_reprocess: 3,
            max_attempts: 3,
            backoff: Backoff {
                base: Duration::from_millis(500),
                max: Duration::from_secs(30),
            },
        }
    }
}

/// An uploaded photo and its optional metadata.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
    pub asset_tag: Option<String>,
}

/// What a call to [`AnalysisManager::process`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job was missing, not pending, or claimed by someone else.
    Skipped,
    Completed,
    Failed(FailureKind),
}

pub struct AnalysisManager {
    jobs: Arc<dyn JobStore>,
    assets: Arc<dyn AssetStore>,
    audit: Arc<dyn AuditLog>,
    images: Arc<dyn ImageStore>,
    vision: Arc<dyn VisionAnalyzer>,
    queue: Arc<dyn JobQueue>,
    settings: AnalysisSettings,
}

impl AnalysisManager {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        assets: Arc<dyn AssetStore>,
        audit: Arc<dyn AuditLog>,
        images: Arc<dyn ImageStore>,
        vision: Arc<dyn VisionAnalyzer>,
        queue: Arc<dyn JobQueue>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            jobs,
            assets,
            audit,
            images,
            vision,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Accept a photo, persist it as a `pending` job and hand it to the
    /// queue. Returns as soon as the job is durable.
    pub async fn submit(
        &self,
        upload: ImageUpload,
        actor: &str,
    ) -> Result<AnalysisJob, AnalysisError> {
        if upload.bytes.is_empty() {
            return Err(AnalysisError::InvalidInput("Image is empty".to_string()));
        }
        if upload.bytes.len() > self.settings.max_upload_bytes {
            return Err(AnalysisError::InvalidInput(format!(
                "Image is {} bytes, the limit is {}",
                upload.bytes.len(),
                self.settings.max_upload_bytes
            )));
        }

        let opts = self.settings.preprocess.clone();
        let bytes = upload.bytes;
        let prepared = tokio::task::spawn_blocking(move || preprocess(&bytes, &opts))
            .await
            .map_err(|e| AnalysisError::Internal(format!("preprocessing task failed: {e}")))??;

        let job_id = Uuid::new_v4();
        let key = image_key(job_id);
        self.images.put(&key, &prepared.bytes).await?;

        let job = self
            .jobs
            .create_job(NewAnalysisJob {
                id: job_id,
                image_key: key,
                asset_tag: upload.asset_tag.as_deref().and_then(normalize_tag),
                original_filename: upload.filename,
            })
            .await?;

        self.audit_quietly(
            NewAuditEntry::analysis(actor, actions::ANALYZE_REQUEST, job_id).with_details(json!({
                "asset_tag": job.asset_tag,
                "filename": job.original_filename,
                "width": prepared.width,
                "height": prepared.height,
            })),
        )
        .await;

        self.enqueue_quietly(job_id).await;
        metrics::counter!("analysis_jobs_submitted_total").increment(1);

        tracing::info!(
            job_id = %job_id,
            asset_tag = ?job.asset_tag,
            width = prepared.width,
            height = prepared.height,
            bytes = prepared.bytes.len(),
            "Analysis job submitted"
        );

        Ok(job)
    }

    /// Current snapshot of a job.
    pub async fn get_result(&self, job_id: Uuid) -> Result<AnalysisJob, AnalysisError> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or(AnalysisError::NotFound(job_id))
    }

    /// Drive one job through the remote analysis. Safe to call from any
    /// number of workers; only the one that wins the claim does any work.
    pub async fn process(&self, job_id: Uuid) -> Result<ProcessOutcome, AnalysisError> {
        let Some(job) = self.jobs.claim_job(job_id).await? else {
            tracing::debug!(job_id = %job_id, "Job not claimable, skipping");
            return Ok(ProcessOutcome::Skipped);
        };

        tracing::info!(job_id = %job_id, retry_count = job.retry_count, "Processing analysis job");
        let started = Instant::now();
        let outcome = self.run_analysis(&job).await;
        let elapsed = started.elapsed();

        let written = match self.write_outcome(job_id, &outcome, elapsed).await {
            Ok(written) => written,
            Err(e) => {
                self.release_unwritten(job_id).await;
                return Err(e.into());
            }
        };
        if !written {
            tracing::warn!(job_id = %job_id, "Job left processing before its outcome was written");
            return Ok(ProcessOutcome::Skipped);
        }

        metrics::histogram!("analysis_processing_seconds").record(elapsed.as_secs_f64());

        match outcome {
            JobOutcome::Completed(result) => {
                metrics::counter!("analysis_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %job_id,
                    tags = result.detected_tags.len(),
                    equipment = result.equipment.len(),
                    confidence = result.confidence_score,
                    duration_ms = elapsed.as_millis() as u64,
                    "Analysis job completed"
                );
                self.audit_quietly(
                    NewAuditEntry::analysis(SYSTEM_ACTOR, actions::ANALYZE_COMPLETE, job_id)
                        .with_details(json!({
                            "detected_tags": result.detected_tags,
                            "equipment_count": result.equipment.len(),
                            "confidence_score": result.confidence_score,
                        })),
                )
                .await;

                if let Some(tag) = job.asset_tag.as_deref() {
                    self.update_asset_from_result(job_id, tag, result.equipment.first())
                        .await;
                }
                Ok(ProcessOutcome::Completed)
            }
            JobOutcome::Failed(error) => {
                metrics::counter!("analysis_jobs_failed_total", "kind" => error.kind.to_string())
                    .increment(1);
                tracing::warn!(
                    job_id = %job_id,
                    kind = %error.kind,
                    error = %error.message,
                    "Analysis job failed"
                );
                self.audit_quietly(
                    NewAuditEntry::analysis(SYSTEM_ACTOR, actions::ANALYZE_FAILED, job_id)
                        .with_details(json!({
                            "kind": error.kind,
                            "message": error.message,
                        })),
                )
                .await;
                Ok(ProcessOutcome::Failed(error.kind))
            }
        }
    }

    /// Terminal write, retried with backoff on store errors.
    async fn write_outcome(
        &self,
        job_id: Uuid,
        outcome: &JobOutcome,
        elapsed: Duration,
    ) -> Result<bool, StoreError> {
        let mut attempt = 1;
        loop {
            match self
                .jobs
                .finish_job(job_id, outcome, elapsed.as_millis() as i64)
                .await
            {
                Ok(written) => return Ok(written),
                Err(e) if attempt < OUTCOME_WRITE_ATTEMPTS => {
                    let delay = self.settings.backoff.delay(attempt);
                    tracing::warn!(
                        job_id = %job_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Failed to write job outcome, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Return a job whose outcome could not be written to `pending` so the
    /// queue or the sweep drives it again.
    async fn release_unwritten(&self, job_id: Uuid) {
        match self.jobs.release_job(job_id).await {
            Ok(true) => {
                tracing::warn!(job_id = %job_id, "Outcome not written, job released to pending");
                self.enqueue_quietly(job_id).await;
            }
            Ok(false) => {
                tracing::debug!(job_id = %job_id, "Job already left processing");
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to release job after outcome write failure");
            }
        }
    }

    /// Load the image and call the vision model, retrying transient
    /// failures inline while the job stays `processing`.
    async fn run_analysis(&self, job: &AnalysisJob) -> JobOutcome {
        let image = match self.images.get(&job.image_key).await {
            Ok(image) => image,
            Err(StorageError::NotFound(_)) => {
                return JobOutcome::Failed(JobError::new(
                    FailureKind::Permanent,
                    "Stored image is missing",
                ));
            }
            Err(e) => {
                return JobOutcome::Failed(JobError::new(
                    FailureKind::Transient,
                    format!("Failed to load stored image: {e}"),
                ));
            }
        };

        let mut attempts = job.attempts;
        loop {
            attempts += 1;
            if let Err(e) = self.jobs.record_attempt(job.id, attempts).await {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to record attempt");
            }

            let err = match self.vision.analyze(&image).await {
                Ok(raw) => {
                    return match normalize_response(&raw) {
                        Ok(result) => JobOutcome::Completed(result),
                        Err(e) => JobOutcome::Failed(JobError::new(
                            FailureKind::MalformedResponse,
                            e.to_string(),
                        )),
                    };
                }
                Err(e) => e,
            };

            let kind = err.failure_kind();
            if !kind.is_retryable() || attempts >= self.settings.max_attempts {
                return JobOutcome::Failed(JobError::new(kind, err.to_string()));
            }

            let delay = self.settings.backoff.delay(attempts);
            metrics::counter!("analysis_remote_retries_total").increment(1);
            tracing::warn!(
                job_id = %job.id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient analysis failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn update_asset_from_result(
        &self,
        job_id: Uuid,
        asset_tag: &str,
        detected: Option<&crate::models::job::DetectedEquipment>,
    ) {
        match self.assets.apply_detection(asset_tag, detected).await {
            Ok(Some(asset)) => {
                tracing::info!(job_id = %job_id, asset_tag = %asset.asset_tag, "Asset updated from analysis");
                self.audit_quietly(
                    NewAuditEntry::asset(
                        SYSTEM_ACTOR,
                        actions::ASSET_AUTO_UPDATE,
                        &asset.asset_tag,
                    )
                    .with_details(json!({ "job_id": job_id })),
                )
                .await;
            }
            Ok(None) => {
                tracing::debug!(job_id = %job_id, asset_tag, "No registered asset for tag");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, asset_tag, error = %e, "Asset auto-update failed");
            }
        }
    }

    /// Send a failed job back through the queue.
    pub async fn reprocess(&self, job_id: Uuid, actor: &str) -> Result<AnalysisJob, AnalysisError> {
        let job = match self
            .jobs
            .reset_for_reprocess(job_id, self.settings.max_reprocess)
            .await?
        {
            ReprocessOutcome::Reset(job) => job,
            ReprocessOutcome::NotFound => return Err(AnalysisError::NotFound(job_id)),
            ReprocessOutcome::WrongState(status) => {
                return Err(AnalysisError::InvalidState { job_id, status });
            }
            ReprocessOutcome::RetryExceeded { retry_count } => {
                return Err(AnalysisError::RetryExceeded {
                    job_id,
                    retry_count,
                });
            }
        };

        self.audit_quietly(
            NewAuditEntry::analysis(actor, actions::ANALYZE_REPROCESS, job_id)
                .with_details(json!({ "retry_count": job.retry_count })),
        )
        .await;
        self.enqueue_quietly(job_id).await;

        tracing::info!(job_id = %job_id, retry_count = job.retry_count, "Analysis job requeued");
        Ok(job)
    }

    /// Newest first.
    pub async fn list_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<AnalysisJob>, AnalysisError> {
        Ok(self.jobs.list_jobs(&filter.normalized()).await?)
    }

    /// Oldest pending jobs, for re-driving jobs whose queue entry was lost.
    pub async fn pending_job_ids(&self, limit: i64) -> Result<Vec<Uuid>, AnalysisError> {
        Ok(self.jobs.pending_job_ids(limit).await?)
    }

    async fn enqueue_quietly(&self, job_id: Uuid) {
        if let Err(e) = self.queue.enqueue(&QueuedJob::new(job_id)).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to enqueue job, sweep will pick it up");
        }
    }

    async fn audit_quietly(&self, entry: NewAuditEntry) {
        let action = entry.action;
        if let Err(e) = self.audit.record(entry).await {
            tracing::warn!(action, error = %e, "Failed to write audit entry");
        }
    }
}

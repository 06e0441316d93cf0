use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{AnalysisJob, AnalysisResult, HistoryFilter, JobError, JobStatus};

/// Response after submitting or reprocessing an analysis.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Caller-facing view of a job.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub asset_tag: Option<String>,
    pub original_filename: Option<String>,
    pub result: Option<AnalysisResult>,
    pub error: Option<JobError>,
    pub retry_count: i32,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: Option<i64>,
}

impl From<AnalysisJob> for JobView {
    fn from(job: AnalysisJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            asset_tag: job.asset_tag,
            original_filename: job.original_filename,
            result: job.result,
            error: job.error,
            retry_count: job.retry_count,
            attempts: job.attempts,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            processing_time_ms: job.processing_time_ms,
        }
    }
}

/// Query string for `GET /api/analysis/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default)]
    pub limit: i64,
    pub status: Option<JobStatus>,
    pub asset_tag: Option<String>,
}

impl From<HistoryQuery> for HistoryFilter {
    fn from(q: HistoryQuery) -> Self {
        HistoryFilter {
            status: q.status,
            asset_tag: q.asset_tag,
            skip: q.skip,
            limit: q.limit,
        }
    }
}

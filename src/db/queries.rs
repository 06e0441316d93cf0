use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::job::{
    AnalysisJob, AnalysisResult, FailureKind, HistoryFilter, JobError, JobOutcome, JobStatus,
    NewAnalysisJob, ReprocessOutcome,
};
use crate::store::StoreError;

const JOB_COLUMNS: &str = "id, status, image_key, asset_tag, original_filename, result, \
     error_kind, error_message, error_retryable, retry_count, attempts, \
     created_at, updated_at, completed_at, processing_time_ms";

fn job_from_row(row: &PgRow) -> Result<AnalysisJob, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|_| StoreError::Corrupt(format!("unknown job status '{status_str}'")))?;

    let result = row
        .try_get::<Option<serde_json::Value>, _>("result")?
        .map(serde_json::from_value::<AnalysisResult>)
        .transpose()?;

    let error = match row.try_get::<Option<String>, _>("error_kind")? {
        Some(kind) => {
            let kind = FailureKind::from_str(&kind)
                .map_err(|_| StoreError::Corrupt(format!("unknown failure kind '{kind}'")))?;
            Some(JobError {
                kind,
                message: row
                    .try_get::<Option<String>, _>("error_message")?
                    .unwrap_or_default(),
                retryable: row
                    .try_get::<Option<bool>, _>("error_retryable")?
                    .unwrap_or_else(|| kind.is_retryable()),
            })
        }
        None => None,
    };

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        status,
        image_key: row.try_get("image_key")?,
        asset_tag: row.try_get("asset_tag")?,
        original_filename: row.try_get("original_filename")?,
        result,
        error,
        retry_count: row.try_get("retry_count")?,
        attempts: row.try_get("attempts")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        processing_time_ms: row.try_get("processing_time_ms")?,
    })
}

/// Insert a new analysis job in `pending`
pub async fn create_job(pool: &PgPool, job: &NewAnalysisJob) -> Result<AnalysisJob, StoreError> {
    let sql = format!(
        "INSERT INTO analysis_jobs (id, status, image_key, asset_tag, original_filename) \
         VALUES ($1, 'pending', $2, $3, $4) \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(job.id)
        .bind(&job.image_key)
        .bind(job.asset_tag.as_deref())
        .bind(job.original_filename.as_deref())
        .fetch_one(pool)
        .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM analysis_jobs WHERE id = $1");
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Move `pending` to `processing`. Only one concurrent caller gets the row back.
pub async fn claim_job(pool: &PgPool, job_id: Uuid) -> Result<Option<AnalysisJob>, StoreError> {
    let sql = format!(
        "UPDATE analysis_jobs \
         SET status = 'processing', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending' \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql).bind(job_id).fetch_optional(pool).await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Persist the remote attempt counter
pub async fn record_attempt(pool: &PgPool, job_id: Uuid, attempts: i32) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET attempts = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(attempts)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the terminal outcome of a `processing` job
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    outcome: &JobOutcome,
    processing_time_ms: i64,
) -> Result<bool, StoreError> {
    let (result, error) = match outcome {
        JobOutcome::Completed(result) => (Some(serde_json::to_value(result)?), None),
        JobOutcome::Failed(error) => (None, Some(error)),
    };

    let done = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = $2,
            result = $3,
            error_kind = $4,
            error_message = $5,
            error_retryable = $6,
            processing_time_ms = $7,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(outcome.status().to_string())
    .bind(result)
    .bind(error.map(|e| e.kind.to_string()))
    .bind(error.map(|e| e.message.as_str()))
    .bind(error.map(|e| e.retryable))
    .bind(processing_time_ms)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// Put a `processing` job back to `pending` after its outcome write failed
pub async fn release_job(pool: &PgPool, job_id: Uuid) -> Result<bool, StoreError> {
    let done = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'pending', attempts = 0, updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// Reset a `failed` job for another run, bounded by `max_reprocess`
pub async fn reset_for_reprocess(
    pool: &PgPool,
    job_id: Uuid,
    max_reprocess: i32,
) -> Result<ReprocessOutcome, StoreError> {
    let sql = format!(
        "UPDATE analysis_jobs \
         SET status = 'pending', \
             retry_count = retry_count + 1, \
             attempts = 0, \
             result = NULL, \
             error_kind = NULL, \
             error_message = NULL, \
             error_retryable = NULL, \
             completed_at = NULL, \
             processing_time_ms = NULL, \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'failed' AND retry_count < $2 \
         RETURNING {JOB_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(job_id)
        .bind(max_reprocess)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = row {
        return Ok(ReprocessOutcome::Reset(job_from_row(&row)?));
    }

    // Nothing updated: report why without changing the row.
    Ok(match get_job(pool, job_id).await? {
        None => ReprocessOutcome::NotFound,
        Some(job) if job.status != JobStatus::Failed => ReprocessOutcome::WrongState(job.status),
        Some(job) => ReprocessOutcome::RetryExceeded {
            retry_count: job.retry_count,
        },
    })
}

/// Job history, newest first
pub async fn list_jobs(
    pool: &PgPool,
    filter: &HistoryFilter,
) -> Result<Vec<AnalysisJob>, StoreError> {
    let sql = format!(
        "SELECT {JOB_COLUMNS} FROM analysis_jobs \
         WHERE ($1::text IS NULL OR status = $1) \
           AND ($2::text IS NULL OR asset_tag = $2) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $3 OFFSET $4"
    );
    let rows = sqlx::query(&sql)
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.asset_tag.as_deref())
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Get pending job ids (for the worker sweep)
pub async fn get_pending_job_ids(pool: &PgPool, limit: i64) -> Result<Vec<Uuid>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id
        FROM analysis_jobs
        WHERE status = 'pending'
        ORDER BY created_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| r.try_get::<Uuid, _>("id").map_err(StoreError::from))
        .collect()
}

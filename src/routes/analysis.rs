use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::ApiAuth;
use crate::error::{ApiError, ApiResult};
use crate::models::analysis::{AnalyzeResponse, HistoryQuery, JobView};
use crate::services::job_manager::ImageUpload;

/// An id that is not a UUID names no job.
fn parse_job_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::NotFound(format!("Analysis job {raw} not found")))
}

/// POST /api/analyze - upload an equipment photo for analysis.
pub async fn submit_analysis(
    State(state): State<AppState>,
    auth: ApiAuth,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AnalyzeResponse>)> {
    let mut upload = ImageUpload::default();
    let mut has_file = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") | Some("image") => {
                upload.filename = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {e}")))?;
                upload.bytes = data.to_vec();
                has_file = true;
            }
            Some("asset_tag") => {
                let tag = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid asset_tag: {e}")))?;
                upload.asset_tag = Some(tag);
            }
            _ => {}
        }
    }

    if !has_file {
        return Err(ApiError::BadRequest(
            "Multipart field 'file' is required".to_string(),
        ));
    }

    let job = state.manager.submit(upload, &auth.actor).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeResponse {
            job_id: job.id,
            status: job.status,
            message: "Analysis job created. Poll the job ID for the result.".to_string(),
        }),
    ))
}

/// GET /api/analyze/{job_id} - current state of a job.
pub async fn get_analysis(
    State(state): State<AppState>,
    _auth: ApiAuth,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobView>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.manager.get_result(job_id).await?;
    Ok(Json(job.into()))
}

/// GET /api/analysis/history - newest jobs first.
pub async fn list_history(
    State(state): State<AppState>,
    _auth: ApiAuth,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<JobView>>> {
    let jobs = state.manager.list_history(query.into()).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

/// POST /api/analysis/reprocess/{job_id} - retry a failed job.
pub async fn reprocess_analysis(
    State(state): State<AppState>,
    auth: ApiAuth,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.manager.reprocess(job_id, &auth.actor).await?;

    Ok(Json(AnalyzeResponse {
        job_id: job.id,
        status: job.status,
        message: format!("Analysis job requeued (reprocess {})", job.retry_count),
    }))
}

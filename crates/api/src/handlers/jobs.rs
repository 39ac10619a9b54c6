use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use courier_domain::entities::{Job, JobType};
use courier_domain::events::BacklogEntry;
use courier_domain::repositories::JobStatusUpdate;
use courier_errors::CourierError;
use serde_json::json;
use tracing::debug;

use crate::{
    dto::JobView,
    error::{ApiError, ApiResult},
    routes::AppState,
    validation::{parse_job_type, validate_payload},
};

/// POST /api/jobs: admit a job. Persist it pending, append to the
/// backlog, fan out `job:new`.
pub async fn create_job(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let job_type = parse_job_type(body.get("type"))?;
    let payload = validate_payload(body.get("payload"))?;

    let job = state.job_repo.create(&Job::new(job_type, payload)).await?;

    // Second, non-atomic write: the backlog is a notification hint, the
    // job row above is the source of truth.
    state
        .queue
        .add_job(&BacklogEntry {
            job_id: job.id,
            job_type,
            payload: job.payload.clone(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "jobId": job.id }))))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let job = state
        .job_repo
        .get_by_id(id)
        .await?
        .ok_or(CourierError::JobNotFound { id })?;

    Ok(Json(json!({ "job": JobView::from(job) })))
}

/// PATCH /api/jobs/{id}: idempotent status setter used by workers.
pub async fn update_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<JobStatusUpdate>,
) -> ApiResult<Json<serde_json::Value>> {
    state.job_repo.update_status(id, &update).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/jobs/next/{type}: claim the oldest pending job of the type.
/// A lost race returns `{"job": null}`, not an error.
pub async fn next_job(
    State(state): State<AppState>,
    Path(raw_type): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_type: JobType = raw_type
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid job type: {raw_type}")))?;

    let claimed = state.job_repo.claim_next_pending(job_type).await?;

    if claimed.is_some() {
        // Drain one backlog hint for the claimed type; divergence here is
        // tolerated and the entry content is not consulted.
        if let Err(e) = state.queue.next_job(job_type).await {
            debug!("backlog drain for {job_type} failed: {e}");
        }
    }

    Ok(Json(json!({ "job": claimed.map(JobView::from) })))
}

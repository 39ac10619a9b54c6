use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use courier_domain::entities::WorkerStatus;
use courier_errors::CourierError;
use serde::Deserialize;
use serde_json::json;

use crate::{
    dto::WorkerView,
    error::{ApiError, ApiResult},
    routes::AppState,
    validation::parse_job_type,
};

#[derive(Debug, Deserialize)]
pub struct UpdateWorkerRequest {
    pub status: WorkerStatus,
}

/// POST /api/workers: register and start a new worker of the given type.
pub async fn create_worker(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let worker_type = parse_job_type(body.get("type"))?;
    let worker_id = state.worker_manager.create_worker(worker_type).await?;
    Ok((StatusCode::CREATED, Json(json!({ "workerId": worker_id }))))
}

/// GET /api/workers/{id}
pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let worker = state
        .worker_repo
        .get_by_id(id)
        .await?
        .ok_or(CourierError::WorkerNotFound { id })?;

    Ok(Json(json!({ "worker": WorkerView::from(worker) })))
}

/// DELETE /api/workers/{id}: graceful stop through the supervisor.
pub async fn stop_worker(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let existed = state.worker_manager.stop_worker(id).await?;
    if !existed {
        return Err(CourierError::WorkerNotFound { id }.into());
    }
    Ok(Json(json!({ "success": true })))
}

/// PATCH /api/workers/{id}: idempotent status setter used by workers.
pub async fn update_worker(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateWorkerRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state.worker_repo.update_status(id, request.status).await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/workers/scale: adjust the pool of one type to `count`.
pub async fn scale_workers(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> ApiResult<Json<serde_json::Value>> {
    let worker_type = parse_job_type(body.get("type"))?;
    let count = body.get("count").and_then(|v| v.as_u64()).ok_or_else(|| {
        ApiError::bad_request("Worker count is required")
    })? as usize;

    if count < 1 || count > state.max_workers_per_type {
        return Err(ApiError::bad_request(format!(
            "Worker count must be between 1 and {}",
            state.max_workers_per_type
        )));
    }

    state
        .worker_manager
        .scale_workers(worker_type, count)
        .await?;
    Ok(Json(json!({ "success": true })))
}

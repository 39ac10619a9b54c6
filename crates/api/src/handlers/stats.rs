use axum::{extract::State, Json};
use serde_json::json;

use crate::{error::ApiResult, routes::AppState};

/// GET /api/stats: aggregate counts per status and per type for jobs and
/// workers. The per-status job counts always sum to the total.
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let jobs = state.job_repo.stats().await?;
    let workers = state.worker_repo.stats().await?;

    Ok(Json(json!({ "jobs": jobs, "workers": workers })))
}

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use courier_domain::messaging::JobQueue;
use courier_domain::repositories::{JobRepository, WorkerRepository};
use courier_domain::services::WorkerManager;

use crate::handlers::{
    health::health_check,
    jobs::{create_job, get_job, next_job, update_job},
    stats::get_stats,
    workers::{create_worker, get_worker, scale_workers, stop_worker, update_worker},
};

#[derive(Clone)]
pub struct AppState {
    pub job_repo: Arc<dyn JobRepository>,
    pub worker_repo: Arc<dyn WorkerRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub worker_manager: Arc<dyn WorkerManager>,
    /// Upper bound accepted by the scale endpoint.
    pub max_workers_per_type: usize,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/next/{type}", get(next_job))
        .route("/api/jobs/{id}", get(get_job).patch(update_job))
        .route("/api/workers", post(create_worker))
        .route("/api/workers/scale", post(scale_workers))
        .route(
            "/api/workers/{id}",
            get(get_worker).patch(update_worker).delete(stop_worker),
        )
        .route("/api/stats", get(get_stats))
        .with_state(state)
}

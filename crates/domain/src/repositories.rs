//! Repository ports.
//!
//! Persistence interfaces for the job store and the worker registry. The
//! coordinator process is the sole writer of the primary store; workers
//! always write indirectly through the coordinator's HTTP API.

use async_trait::async_trait;
use courier_errors::CourierResult;
use serde::{Deserialize, Serialize};

use crate::entities::{Job, JobStatus, JobType, Worker, WorkerStatus};

/// Idempotent status update: last writer wins, None fields keep their
/// previous values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Per-type count used by the stats endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub count: i64,
}

/// Job counters; the per-status counts always sum to `total`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    #[serde(rename = "byType")]
    pub by_type: Vec<TypeCount>,
}

/// Worker counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStats {
    pub total: i64,
    pub idle: i64,
    pub busy: i64,
    #[serde(rename = "byType")]
    pub by_type: Vec<TypeCount>,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a new job and return it with the store-assigned id.
    async fn create(&self, job: &Job) -> CourierResult<Job>;

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Job>>;

    /// Idempotent single-row UPDATE; silently succeeds when the row does
    /// not exist.
    async fn update_status(&self, id: i64, update: &JobStatusUpdate) -> CourierResult<()>;

    /// Claim protocol (compare-and-set): take the oldest pending job of
    /// the type, moving it to processing only if it is still pending.
    /// Losing the race returns None, not an error.
    async fn claim_next_pending(&self, job_type: JobType) -> CourierResult<Option<Job>>;

    async fn stats(&self) -> CourierResult<JobStats>;
}

#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn create(&self, worker: &Worker) -> CourierResult<Worker>;

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Worker>>;

    /// All registered, non-deactivated workers, ascending by id (oldest
    /// first).
    async fn list_active(&self) -> CourierResult<Vec<Worker>>;

    async fn list_active_by_type(&self, worker_type: JobType) -> CourierResult<Vec<Worker>>;

    /// Idempotent status update; also refreshes last_active.
    async fn update_status(&self, id: i64, status: WorkerStatus) -> CourierResult<()>;

    /// Activate or deactivate; deactivated workers are not respawned by
    /// the supervisor.
    async fn set_active(&self, id: i64, active: bool) -> CourierResult<()>;

    async fn stats(&self) -> CourierResult<WorkerStats>;
}

use chrono::{DateTime, Utc};
use courier_domain::entities::{Job, JobStatus, JobType, Worker, WorkerStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub id: i64,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub worker_id: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            payload: job.payload,
            status: job.status,
            worker_id: job.worker_id,
            result: job.result,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    pub id: i64,
    #[serde(rename = "type")]
    pub worker_type: JobType,
    pub status: WorkerStatus,
    pub is_active: bool,
    pub last_active: DateTime<Utc>,
}

impl From<Worker> for WorkerView {
    fn from(worker: Worker) -> Self {
        Self {
            id: worker.id,
            worker_type: worker.worker_type,
            status: worker.status,
            is_active: worker.is_active,
            last_active: worker.last_active,
        }
    }
}

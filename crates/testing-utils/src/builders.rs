//! Entity builders for concise test setup.

use chrono::{DateTime, Utc};
use courier_domain::entities::{Job, JobStatus, JobType, Worker, WorkerStatus};
use serde_json::json;

pub struct JobBuilder {
    id: i64,
    job_type: JobType,
    payload: serde_json::Value,
    status: JobStatus,
    worker_id: Option<i64>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            id: 1,
            job_type: JobType::Sms,
            payload: json!({"to": "+15550100"}),
            status: JobStatus::Pending,
            worker_id: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn worker_id(mut self, worker_id: i64) -> Self {
        self.worker_id = Some(worker_id);
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn build(self) -> Job {
        Job {
            id: self.id,
            job_type: self.job_type,
            payload: self.payload,
            status: self.status,
            worker_id: self.worker_id,
            result: self.result,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WorkerBuilder {
    id: i64,
    worker_type: JobType,
    status: WorkerStatus,
    is_active: bool,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self {
            id: 1,
            worker_type: JobType::Sms,
            status: WorkerStatus::Idle,
            is_active: true,
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn worker_type(mut self, worker_type: JobType) -> Self {
        self.worker_type = worker_type;
        self
    }

    pub fn status(mut self, status: WorkerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn build(self) -> Worker {
        Worker {
            id: self.id,
            worker_type: self.worker_type,
            status: self.status,
            is_active: self.is_active,
            last_active: Utc::now(),
        }
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

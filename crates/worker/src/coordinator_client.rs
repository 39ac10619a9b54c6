use chrono::{DateTime, Utc};
use courier_domain::entities::{Job, JobStatus, JobType, Worker, WorkerStatus};
use courier_domain::repositories::JobStatusUpdate;
use courier_errors::{CourierError, CourierResult};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// HTTP client for the coordinator API, scoped to one worker id.
pub struct CoordinatorClient {
    base_url: String,
    worker_id: i64,
    http: reqwest::Client,
}

// Wire form of the coordinator responses (camelCase, `type` for the
// job/worker type). Kept private to this client; domain entities stay
// transport-agnostic.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobWire {
    id: i64,
    #[serde(rename = "type")]
    job_type: JobType,
    payload: serde_json::Value,
    status: JobStatus,
    worker_id: Option<i64>,
    result: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobWire> for Job {
    fn from(wire: JobWire) -> Self {
        Job {
            id: wire.id,
            job_type: wire.job_type,
            payload: wire.payload,
            status: wire.status,
            worker_id: wire.worker_id,
            result: wire.result,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkerWire {
    id: i64,
    #[serde(rename = "type")]
    worker_type: JobType,
    status: WorkerStatus,
    is_active: bool,
    last_active: DateTime<Utc>,
}

impl From<WorkerWire> for Worker {
    fn from(wire: WorkerWire) -> Self {
        Worker {
            id: wire.id,
            worker_type: wire.worker_type,
            status: wire.status,
            is_active: wire.is_active,
            last_active: wire.last_active,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    job: Option<JobWire>,
}

#[derive(Debug, Deserialize)]
struct WorkerEnvelope {
    worker: WorkerWire,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>, worker_id: i64) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker_id,
            http: reqwest::Client::new(),
        }
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// GET /api/workers/{id}: this worker's own registry record.
    pub async fn get_worker(&self) -> CourierResult<Option<Worker>> {
        let url = format!("{}/api/workers/{}", self.base_url, self.worker_id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("coordinator unreachable: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: WorkerEnvelope = check(response).await?.json().await.map_err(|e| {
            CourierError::Network(format!("malformed worker response: {e}"))
        })?;
        Ok(Some(envelope.worker.into()))
    }

    /// PATCH /api/workers/{id}: idempotent status setter.
    pub async fn update_worker_status(&self, status: WorkerStatus) -> CourierResult<()> {
        let url = format!("{}/api/workers/{}", self.base_url, self.worker_id);
        let response = self
            .http
            .patch(&url)
            .json(&json!({ "status": status }))
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("coordinator unreachable: {e}")))?;
        check(response).await?;
        Ok(())
    }

    /// GET /api/jobs/next/{type}: claim; None means nothing pending or a
    /// lost race, both ordinary outcomes.
    pub async fn next_job(&self, job_type: JobType) -> CourierResult<Option<Job>> {
        let url = format!("{}/api/jobs/next/{}", self.base_url, job_type);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("coordinator unreachable: {e}")))?;

        let envelope: JobEnvelope = check(response).await?.json().await.map_err(|e| {
            CourierError::Network(format!("malformed claim response: {e}"))
        })?;

        if let Some(ref job) = envelope.job {
            debug!("worker {} claimed job {}", self.worker_id, job.id);
        }
        Ok(envelope.job.map(Job::from))
    }

    /// PATCH /api/jobs/{id}: idempotent job status setter.
    pub async fn update_job(&self, job_id: i64, update: &JobStatusUpdate) -> CourierResult<()> {
        let url = format!("{}/api/jobs/{}", self.base_url, job_id);
        let response = self
            .http
            .patch(&url)
            .json(update)
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("coordinator unreachable: {e}")))?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> CourierResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(CourierError::Network(format!(
        "coordinator replied {status}: {body}"
    )))
}

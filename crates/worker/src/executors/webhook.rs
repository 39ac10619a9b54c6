use courier_domain::entities::JobType;
use courier_errors::{CourierError, CourierResult};
use tracing::debug;

/// Delivers SMS/notification payloads to the per-type webhook endpoint.
/// The webhook's JSON reply becomes the job result.
pub struct WebhookAdapter {
    url: String,
    job_type: JobType,
    worker_id: i64,
    http: reqwest::Client,
}

impl WebhookAdapter {
    pub fn new(url: String, job_type: JobType, worker_id: i64) -> Self {
        Self {
            url,
            job_type,
            worker_id,
            http: reqwest::Client::new(),
        }
    }

    pub async fn deliver(&self, payload: &serde_json::Value) -> CourierResult<serde_json::Value> {
        debug!("delivering {} payload to {}", self.job_type, self.url);

        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Job-Type", self.job_type.as_str())
            .header("X-Worker-ID", self.worker_id.to_string())
            .json(payload)
            .send()
            .await
            .map_err(|e| CourierError::adapter(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::adapter(format!(
                "webhook replied {status}: {body}"
            )));
        }

        // Non-JSON replies still count as delivered.
        Ok(response
            .json()
            .await
            .unwrap_or_else(|_| serde_json::json!({ "delivered": true })))
    }
}

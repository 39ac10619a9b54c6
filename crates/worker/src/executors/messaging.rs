use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use courier_config::MessagingConfig;
use courier_errors::{CourierError, CourierResult};
use courier_infrastructure::RateLimiter;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded wait for the secondary gateway's token bucket.
const RATE_LIMIT_ATTEMPTS: u32 = 10;
const RATE_LIMIT_RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
    message: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    delay_ms: Option<u64>,
}

struct SendRequest {
    payload: MessagePayload,
    reply: oneshot::Sender<CourierResult<serde_json::Value>>,
}

/// WhatsApp-style messaging through an HTTP gateway.
///
/// Sends to the same base URL run through a single-consumer FIFO, so they
/// are strictly ordered and never concurrent (upstream sessions cannot
/// tolerate interleaving). Distinct endpoints proceed in parallel. On a
/// primary failure the send falls through to the bearer-credentialed
/// secondary gateway, paced by the shared token bucket.
pub struct MessagingAdapter {
    config: MessagingConfig,
    http: reqwest::Client,
    rate_limiter: Option<Arc<RateLimiter>>,
    endpoints: Mutex<HashMap<String, mpsc::UnboundedSender<SendRequest>>>,
}

impl MessagingAdapter {
    pub fn new(config: MessagingConfig, rate_limiter: Option<RateLimiter>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            rate_limiter: rate_limiter.map(Arc::new),
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    pub async fn send(&self, payload: &serde_json::Value) -> CourierResult<serde_json::Value> {
        let payload: MessagePayload = serde_json::from_value(payload.clone())
            .map_err(|e| CourierError::validation(format!("invalid message payload: {e}")))?;

        let base_url = payload
            .base_url
            .clone()
            .unwrap_or_else(|| self.config.gateway_url.clone())
            .trim_end_matches('/')
            .to_string();

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = SendRequest {
            payload,
            reply: reply_tx,
        };

        self.enqueue(base_url, request).await;

        reply_rx
            .await
            .map_err(|_| CourierError::internal("endpoint worker dropped the send"))?
    }

    /// Append to the endpoint's FIFO, spawning its consumer on first use.
    async fn enqueue(&self, base_url: String, request: SendRequest) {
        let mut endpoints = self.endpoints.lock().await;

        let sender = endpoints.entry(base_url.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker = EndpointWorker {
                base_url,
                http: self.http.clone(),
                config: self.config.clone(),
                rate_limiter: self.rate_limiter.clone(),
                initialized: false,
            };
            tokio::spawn(worker.run(rx));
            tx
        });

        if sender.send(request).is_err() {
            // The consumer only exits when the adapter is dropped.
            warn!("endpoint queue closed, message dropped");
        }
    }
}

/// One consumer per base URL: owns the initialization flag and drains the
/// FIFO one send at a time.
struct EndpointWorker {
    base_url: String,
    http: reqwest::Client,
    config: MessagingConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    initialized: bool,
}

impl EndpointWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SendRequest>) {
        while let Some(request) = rx.recv().await {
            let result = self.perform(&request.payload).await;
            let _ = request.reply.send(result);
        }
        debug!("endpoint worker for {} finished", self.base_url);
    }

    async fn perform(&mut self, payload: &MessagePayload) -> CourierResult<serde_json::Value> {
        validate(payload)?;

        let delay = payload.delay_ms.unwrap_or(self.config.send_delay_ms);
        if delay > 0 {
            sleep(Duration::from_millis(delay)).await;
        }

        let primary_err = if self.ensure_initialized().await.is_ok() {
            match self.primary_send(payload).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            }
        } else {
            // Endpoint never came up; treat like a primary send failure.
            CourierError::adapter(format!("endpoint {} is not ready", self.base_url))
        };

        warn!(
            "primary gateway {} failed ({primary_err}), trying secondary",
            self.base_url
        );
        match self.secondary_send(payload).await {
            Ok(value) => Ok(value),
            Err(secondary_err) => Err(CourierError::adapter(format!(
                "primary gateway: {primary_err}; secondary gateway: {secondary_err}"
            ))),
        }
    }

    /// Probe `/status` once per endpoint; `ready` and `connecting` both
    /// count as usable.
    async fn ensure_initialized(&mut self) -> CourierResult<()> {
        if self.initialized {
            return Ok(());
        }

        let url = format!("{}/status", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("status probe failed: {e}")))?;

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CourierError::Network(format!("malformed status reply: {e}")))?;

        match body.get("status").and_then(|s| s.as_str()) {
            Some("ready") | Some("connecting") => {
                self.initialized = true;
                Ok(())
            }
            other => Err(CourierError::adapter(format!(
                "endpoint {} not ready: {:?}",
                self.base_url, other
            ))),
        }
    }

    async fn primary_send(&self, payload: &MessagePayload) -> CourierResult<serde_json::Value> {
        let (path, body) = match (&payload.number, &payload.group_id) {
            (Some(number), _) => (
                "/send-message",
                json!({ "number": number, "message": payload.message }),
            ),
            (None, Some(group_id)) => (
                "/send-group-message",
                json!({ "groupId": group_id, "message": payload.message }),
            ),
            (None, None) => unreachable!("validated above"),
        };

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::adapter(format!(
                "gateway replied {status}: {body}"
            )));
        }

        Ok(response
            .json()
            .await
            .unwrap_or_else(|_| json!({ "sent": true })))
    }

    async fn secondary_send(&self, payload: &MessagePayload) -> CourierResult<serde_json::Value> {
        let Some(fallback_url) = self.config.fallback_url.clone() else {
            return Err(CourierError::adapter("no secondary gateway configured"));
        };

        self.await_rate_limit().await?;

        let target = payload
            .number
            .clone()
            .or_else(|| payload.group_id.clone())
            .unwrap_or_default();

        let mut request = self
            .http
            .post(&fallback_url)
            .json(&json!({ "target": target, "message": payload.message }));
        if let Some(token) = &self.config.fallback_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CourierError::Network(format!("secondary request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::adapter(format!(
                "secondary replied {status}: {body}"
            )));
        }

        Ok(response
            .json()
            .await
            .unwrap_or_else(|_| json!({ "sent": true, "viaFallback": true })))
    }

    /// The bucket is advisory: Deny means pause and retry, bounded so a
    /// saturated quota eventually surfaces as a send failure.
    async fn await_rate_limit(&self) -> CourierResult<()> {
        let Some(limiter) = &self.rate_limiter else {
            return Ok(());
        };

        for _ in 0..RATE_LIMIT_ATTEMPTS {
            match limiter.check().await {
                Ok(decision) if decision.is_allowed() => return Ok(()),
                Ok(_) => sleep(RATE_LIMIT_RETRY_DELAY).await,
                Err(e) => {
                    // A broken limiter must not block deliveries.
                    warn!("rate limiter unavailable: {e}");
                    return Ok(());
                }
            }
        }

        Err(CourierError::ResourceExhausted(
            "secondary gateway quota exhausted".to_string(),
        ))
    }
}

fn validate(payload: &MessagePayload) -> CourierResult<()> {
    if payload.number.is_none() && payload.group_id.is_none() {
        return Err(CourierError::validation(
            "message payload needs a number or groupId",
        ));
    }
    if payload.message.trim().is_empty() {
        return Err(CourierError::validation("message text must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(number: Option<&str>, group: Option<&str>, message: &str) -> MessagePayload {
        MessagePayload {
            number: number.map(String::from),
            group_id: group.map(String::from),
            message: message.to_string(),
            base_url: None,
            delay_ms: None,
        }
    }

    #[test]
    fn validate_requires_a_target() {
        assert!(validate(&payload(None, None, "hi")).is_err());
        assert!(validate(&payload(Some("+1"), None, "hi")).is_ok());
        assert!(validate(&payload(None, Some("g1"), "hi")).is_ok());
    }

    #[test]
    fn validate_rejects_blank_message() {
        assert!(validate(&payload(Some("+1"), None, "  ")).is_err());
    }

    #[test]
    fn payload_accepts_camel_case_wire_form() {
        let value = json!({
            "groupId": "ops",
            "message": "deploy done",
            "baseUrl": "http://gw.internal:8080",
            "delayMs": 250
        });
        let parsed: MessagePayload = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.group_id.as_deref(), Some("ops"));
        assert_eq!(parsed.base_url.as_deref(), Some("http://gw.internal:8080"));
        assert_eq!(parsed.delay_ms, Some(250));
    }
}

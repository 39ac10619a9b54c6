//! Typed job executors.
//!
//! A closed union over the four adapters; the variant is chosen once at
//! worker boot from the worker's type, never per job.

pub mod email;
pub mod messaging;
pub mod resources;
pub mod script;
pub mod webhook;

use courier_config::AppConfig;
use courier_domain::entities::{Job, JobType};
use courier_errors::{CourierError, CourierResult};
use courier_infrastructure::RateLimiter;

pub use email::EmailAdapter;
pub use messaging::MessagingAdapter;
pub use script::ScriptAdapter;
pub use webhook::WebhookAdapter;

pub enum JobExecutor {
    Email(EmailAdapter),
    Messaging(MessagingAdapter),
    Webhook(WebhookAdapter),
    Script(ScriptAdapter),
}

impl JobExecutor {
    /// Build the executor for a worker's type. SMS and notification
    /// workers deliver to their configured per-type webhook.
    pub async fn for_type(
        worker_id: i64,
        worker_type: JobType,
        config: &AppConfig,
        rate_limiter: Option<RateLimiter>,
    ) -> CourierResult<Self> {
        match worker_type {
            JobType::Email => Ok(Self::Email(EmailAdapter::new(&config.email).await?)),
            JobType::Whatsapp => Ok(Self::Messaging(MessagingAdapter::new(
                config.messaging.clone(),
                rate_limiter,
            ))),
            JobType::Sms => {
                let url = config.webhooks.sms_url.clone().ok_or_else(|| {
                    CourierError::config("SMS_WEBHOOK_URL is not configured")
                })?;
                Ok(Self::Webhook(WebhookAdapter::new(
                    url,
                    JobType::Sms,
                    worker_id,
                )))
            }
            JobType::Notification => {
                let url = config.webhooks.notification_url.clone().ok_or_else(|| {
                    CourierError::config("NOTIFICATION_WEBHOOK_URL is not configured")
                })?;
                Ok(Self::Webhook(WebhookAdapter::new(
                    url,
                    JobType::Notification,
                    worker_id,
                )))
            }
            JobType::Cronjob => Ok(Self::Script(ScriptAdapter::new(&config.scripts).await?)),
        }
    }

    /// Execute one job payload; the returned value becomes the job result.
    pub async fn execute(&self, job: &Job) -> CourierResult<serde_json::Value> {
        match self {
            JobExecutor::Email(adapter) => adapter.send(&job.payload).await,
            JobExecutor::Messaging(adapter) => adapter.send(&job.payload).await,
            JobExecutor::Webhook(adapter) => adapter.deliver(&job.payload).await,
            JobExecutor::Script(adapter) => adapter.run(&job.payload).await,
        }
    }

    /// Periodic health tick. Only the email adapter probes (primary SMTP
    /// recovery while degraded); the rest are connectionless per send.
    pub async fn health_check(&self) {
        if let JobExecutor::Email(adapter) = self {
            adapter.probe_main().await;
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use courier_domain::entities::JobType;
use courier_domain::events::{
    BacklogEntry, JobCompletedEvent, JobFailedEvent, JobNewEvent, QueueEvent, CHANNEL_JOB_COMPLETE,
    CHANNEL_JOB_FAILED, CHANNEL_JOB_NEW,
};
use courier_domain::messaging::JobQueue;
use courier_errors::{CourierError, CourierResult};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::connection_manager::RedisConnectionManager;

/// Redis implementation of `JobQueue`.
///
/// Backlog: the `jobs:<type>` list, LPUSH in and RPOP out (FIFO).
/// Notifications: PUBLISH on the fixed channels; every subscriber holds
/// its own pub/sub connection.
pub struct RedisJobQueue {
    manager: Arc<RedisConnectionManager>,
}

impl RedisJobQueue {
    pub fn new(manager: Arc<RedisConnectionManager>) -> Self {
        Self { manager }
    }

    async fn publish(&self, channel: &str, body: String) -> CourierResult<()> {
        let mut conn = self.manager.connection();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&body)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::queue(format!("publish to {channel} failed: {e}")))?;

        debug!("published to {channel} ({receivers} subscribers)");
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn add_job(&self, entry: &BacklogEntry) -> CourierResult<()> {
        let encoded = serde_json::to_string(entry)?;
        let mut conn = self.manager.connection();

        let _: i64 = redis::cmd("LPUSH")
            .arg(entry.job_type.backlog_key())
            .arg(&encoded)
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::queue(format!("backlog push failed: {e}")))?;

        let event = JobNewEvent {
            job_type: entry.job_type,
        };
        self.publish(CHANNEL_JOB_NEW, serde_json::to_string(&event)?)
            .await
    }

    async fn next_job(&self, job_type: JobType) -> CourierResult<Option<BacklogEntry>> {
        let mut conn = self.manager.connection();
        let raw: Option<String> = redis::cmd("RPOP")
            .arg(job_type.backlog_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| CourierError::queue(format!("backlog pop failed: {e}")))?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn publish_completed(&self, event: &JobCompletedEvent) -> CourierResult<()> {
        self.publish(CHANNEL_JOB_COMPLETE, serde_json::to_string(event)?)
            .await
    }

    async fn publish_failed(&self, event: &JobFailedEvent) -> CourierResult<()> {
        self.publish(CHANNEL_JOB_FAILED, serde_json::to_string(event)?)
            .await
    }

    async fn subscribe(&self, channels: &[&str]) -> CourierResult<mpsc::Receiver<QueueEvent>> {
        let mut pubsub = self.manager.pubsub().await?;
        for channel in channels {
            pubsub
                .subscribe(*channel)
                .await
                .map_err(|e| CourierError::queue(format!("subscribe {channel} failed: {e}")))?;
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let channel = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("dropping non-text message on {channel}: {e}");
                        continue;
                    }
                };

                let Some(event) = QueueEvent::decode(&channel, &payload) else {
                    warn!("dropping undecodable event on {channel}: {payload}");
                    continue;
                };

                // A closed receiver unsubscribes; the connection drops
                // with the task.
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

//! In-memory queue transport.
//!
//! Shares the `JobQueue` port with the Redis implementation: per-type
//! FIFO backlog plus broadcast notifications. Meant for integration
//! tests and single-process embedded runs; nothing survives the process.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use courier_domain::entities::JobType;
use courier_domain::events::{
    BacklogEntry, JobCompletedEvent, JobFailedEvent, JobNewEvent, QueueEvent,
};
use courier_domain::messaging::JobQueue;
use courier_errors::CourierResult;
use tokio::sync::{broadcast, mpsc, RwLock};

pub struct InMemoryJobQueue {
    backlogs: RwLock<HashMap<JobType, VecDeque<BacklogEntry>>>,
    events_tx: broadcast::Sender<QueueEvent>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            backlogs: RwLock::new(HashMap::new()),
            events_tx,
        }
    }

    fn broadcast(&self, event: QueueEvent) {
        // No subscribers is not an error.
        let _ = self.events_tx.send(event);
    }

    pub async fn backlog_len(&self, job_type: JobType) -> usize {
        self.backlogs
            .read()
            .await
            .get(&job_type)
            .map_or(0, VecDeque::len)
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn add_job(&self, entry: &BacklogEntry) -> CourierResult<()> {
        {
            let mut backlogs = self.backlogs.write().await;
            backlogs
                .entry(entry.job_type)
                .or_default()
                .push_front(entry.clone());
        }
        self.broadcast(QueueEvent::JobNew(JobNewEvent {
            job_type: entry.job_type,
        }));
        Ok(())
    }

    async fn next_job(&self, job_type: JobType) -> CourierResult<Option<BacklogEntry>> {
        let mut backlogs = self.backlogs.write().await;
        Ok(backlogs.get_mut(&job_type).and_then(VecDeque::pop_back))
    }

    async fn publish_completed(&self, event: &JobCompletedEvent) -> CourierResult<()> {
        self.broadcast(QueueEvent::JobCompleted(event.clone()));
        Ok(())
    }

    async fn publish_failed(&self, event: &JobFailedEvent) -> CourierResult<()> {
        self.broadcast(QueueEvent::JobFailed(event.clone()));
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> CourierResult<mpsc::Receiver<QueueEvent>> {
        let wanted: HashSet<String> = channels.iter().map(|c| c.to_string()).collect();
        let mut events_rx = self.events_tx.subscribe();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Ok(event) = events_rx.recv().await {
                if !wanted.contains(event.channel()) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

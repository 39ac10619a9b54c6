use std::sync::Arc;

use courier_domain::entities::{JobStatus, WorkerStatus};
use courier_domain::events::{
    JobCompletedEvent, JobFailedEvent, QueueEvent, CHANNEL_JOB_COMPLETE, CHANNEL_JOB_FAILED,
};
use courier_domain::messaging::JobQueue;
use courier_domain::repositories::{JobRepository, JobStatusUpdate, WorkerRepository};
use courier_errors::{CourierError, CourierResult};
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Consumes `worker:job-complete` / `worker:job-failed` and finalizes job
/// and worker state. Handlers are idempotent: the same event applied twice
/// yields the same terminal state, which keeps the system convergent under
/// at-least-once delivery.
pub struct StateListener {
    job_repo: Arc<dyn JobRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    queue: Arc<dyn JobQueue>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
}

impl StateListener {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        worker_repo: Arc<dyn WorkerRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            job_repo,
            worker_repo,
            queue,
            shutdown_tx: RwLock::new(None),
        }
    }

    pub async fn start(&self) -> CourierResult<()> {
        let mut shutdown_slot = self.shutdown_tx.write().await;
        if shutdown_slot.is_some() {
            return Err(CourierError::internal("state listener already running"));
        }

        let mut events = self
            .queue
            .subscribe(&[CHANNEL_JOB_COMPLETE, CHANNEL_JOB_FAILED])
            .await?;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *shutdown_slot = Some(shutdown_tx);

        let job_repo = Arc::clone(&self.job_repo);
        let worker_repo = Arc::clone(&self.worker_repo);

        tokio::spawn(async move {
            info!("state listener started");
            loop {
                tokio::select! {
                    event = events.recv() => {
                        let Some(event) = event else {
                            warn!("completion subscription closed, state listener exiting");
                            break;
                        };
                        let outcome = match event {
                            QueueEvent::JobCompleted(event) => {
                                apply_completed(&job_repo, &worker_repo, &event).await
                            }
                            QueueEvent::JobFailed(event) => {
                                apply_failed(&job_repo, &worker_repo, &event).await
                            }
                            QueueEvent::JobNew(_) => Ok(()),
                        };
                        if let Err(e) = outcome {
                            error!("completion handler failed: {e}");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("state listener stopped");
                        break;
                    }
                }
            }
        });

        Ok(())
    }

    pub async fn stop(&self) -> CourierResult<()> {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.shutdown_tx.read().await.is_some()
    }

    pub async fn handle_completed(&self, event: &JobCompletedEvent) -> CourierResult<()> {
        apply_completed(&self.job_repo, &self.worker_repo, event).await
    }

    pub async fn handle_failed(&self, event: &JobFailedEvent) -> CourierResult<()> {
        apply_failed(&self.job_repo, &self.worker_repo, event).await
    }
}

async fn apply_completed(
    job_repo: &Arc<dyn JobRepository>,
    worker_repo: &Arc<dyn WorkerRepository>,
    event: &JobCompletedEvent,
) -> CourierResult<()> {
    job_repo
        .update_status(
            event.job_id,
            &JobStatusUpdate {
                status: JobStatus::Completed,
                worker_id: Some(event.worker_id),
                result: Some(event.result.clone()),
            },
        )
        .await?;
    worker_repo
        .update_status(event.worker_id, WorkerStatus::Idle)
        .await?;
    info!(
        "job {} completed by worker {}",
        event.job_id, event.worker_id
    );
    Ok(())
}

async fn apply_failed(
    job_repo: &Arc<dyn JobRepository>,
    worker_repo: &Arc<dyn WorkerRepository>,
    event: &JobFailedEvent,
) -> CourierResult<()> {
    job_repo
        .update_status(
            event.job_id,
            &JobStatusUpdate {
                status: JobStatus::Failed,
                worker_id: Some(event.worker_id),
                result: Some(json!({ "error": event.error })),
            },
        )
        .await?;
    worker_repo
        .update_status(event.worker_id, WorkerStatus::Idle)
        .await?;
    warn!(
        "job {} failed on worker {}: {}",
        event.job_id, event.worker_id, event.error
    );
    Ok(())
}

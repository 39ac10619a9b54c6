use std::sync::Arc;
use std::time::Duration;

use courier_domain::entities::{Job, JobStatus, JobType, WorkerStatus};
use courier_domain::events::{JobCompletedEvent, JobFailedEvent, QueueEvent, CHANNEL_JOB_NEW};
use courier_domain::messaging::JobQueue;
use courier_domain::repositories::JobStatusUpdate;
use courier_errors::CourierResult;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::coordinator_client::CoordinatorClient;
use crate::executors::JobExecutor;

/// Per-worker polling loop: one in-flight job, strictly sequential.
///
/// Wakes every poll interval and additionally on every `job:new` event for
/// its own type. All job-state writes go through the coordinator HTTP API;
/// the queue transport is used only for notifications.
pub struct WorkerService {
    worker_id: i64,
    worker_type: JobType,
    client: CoordinatorClient,
    queue: Arc<dyn JobQueue>,
    executor: JobExecutor,
    poll_interval: Duration,
    health_interval: Duration,
}

impl WorkerService {
    pub fn new(
        worker_id: i64,
        worker_type: JobType,
        client: CoordinatorClient,
        queue: Arc<dyn JobQueue>,
        executor: JobExecutor,
        poll_interval: Duration,
        health_interval: Duration,
    ) -> Self {
        Self {
            worker_id,
            worker_type,
            client,
            queue,
            executor,
            poll_interval,
            health_interval,
        }
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> CourierResult<()> {
        let mut events: Option<mpsc::Receiver<QueueEvent>> =
            Some(self.queue.subscribe(&[CHANNEL_JOB_NEW]).await?);

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut health = tokio::time::interval(self.health_interval);
        health.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            "worker {} ({}) polling every {:?}",
            self.worker_id, self.worker_type, self.poll_interval
        );

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_once().await;
                }
                event = recv_event(&mut events), if events.is_some() => {
                    match event {
                        Some(QueueEvent::JobNew(event)) if event.job_type == self.worker_type => {
                            debug!("job:new for {}, polling early", self.worker_type);
                            self.poll_once().await;
                        }
                        Some(_) => {}
                        None => {
                            // Subscription gone: the 1 s poll keeps the
                            // worker alive until the next restart.
                            warn!("job:new subscription closed, continuing on poll only");
                            events = None;
                        }
                    }
                }
                _ = health.tick() => {
                    self.executor.health_check().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("worker {} shutting down", self.worker_id);
                    break;
                }
            }
        }

        Ok(())
    }

    /// One poll tick: skip while busy, re-assert idle, claim, execute.
    /// Transient coordinator failures leave job state untouched.
    pub async fn poll_once(&self) {
        match self.client.get_worker().await {
            Ok(Some(worker)) => {
                if worker.status == WorkerStatus::Busy {
                    return;
                }
                if let Err(e) = self.client.update_worker_status(WorkerStatus::Idle).await {
                    warn!("failed to re-assert idle: {e}");
                }
            }
            Ok(None) => {
                warn!("worker {} is not registered, skipping poll", self.worker_id);
                return;
            }
            Err(e) => {
                warn!("coordinator poll failed: {e}");
                return;
            }
        }

        let job = match self.client.next_job(self.worker_type).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!("claim failed: {e}");
                return;
            }
        };

        if let Err(e) = self.client.update_worker_status(WorkerStatus::Busy).await {
            warn!("failed to mark busy after claim: {e}");
        }
        self.process_job(job).await;
    }

    /// Execute one claimed job. Every PATCH/PUBLISH is individually
    /// logged-and-swallowed: the loop never dies of a network blip, and
    /// the coordinator's completion handlers converge the state from
    /// whichever report (PATCH or event) got through.
    pub async fn process_job(&self, job: Job) {
        info!(
            "worker {} processing job {} ({})",
            self.worker_id, job.id, job.job_type
        );

        report(
            self.client
                .update_job(
                    job.id,
                    &JobStatusUpdate {
                        status: JobStatus::Processing,
                        worker_id: Some(self.worker_id),
                        result: None,
                    },
                )
                .await,
            "mark job processing",
        );
        report(
            self.client.update_worker_status(WorkerStatus::Busy).await,
            "mark worker busy",
        );

        match self.executor.execute(&job).await {
            Ok(result) => {
                report(
                    self.client
                        .update_job(
                            job.id,
                            &JobStatusUpdate {
                                status: JobStatus::Completed,
                                worker_id: Some(self.worker_id),
                                result: Some(result.clone()),
                            },
                        )
                        .await,
                    "mark job completed",
                );
                report(
                    self.client.update_worker_status(WorkerStatus::Idle).await,
                    "mark worker idle",
                );
                report(
                    self.queue
                        .publish_completed(&JobCompletedEvent {
                            job_id: job.id,
                            worker_id: self.worker_id,
                            result,
                        })
                        .await,
                    "publish completion",
                );
            }
            Err(e) => {
                let message = e.to_string();
                warn!("job {} failed: {message}", job.id);

                report(
                    self.client
                        .update_job(
                            job.id,
                            &JobStatusUpdate {
                                status: JobStatus::Failed,
                                worker_id: Some(self.worker_id),
                                result: Some(serde_json::json!({ "error": message })),
                            },
                        )
                        .await,
                    "mark job failed",
                );
                report(
                    self.client.update_worker_status(WorkerStatus::Idle).await,
                    "mark worker idle",
                );
                report(
                    self.queue
                        .publish_failed(&JobFailedEvent {
                            job_id: job.id,
                            worker_id: self.worker_id,
                            error: message,
                        })
                        .await,
                    "publish failure",
                );
            }
        }
    }
}

async fn recv_event(events: &mut Option<mpsc::Receiver<QueueEvent>>) -> Option<QueueEvent> {
    match events {
        Some(receiver) => receiver.recv().await,
        None => None,
    }
}

fn report(outcome: CourierResult<()>, what: &str) {
    if let Err(e) = outcome {
        warn!("{what} failed (will converge via the other report path): {e}");
    }
}

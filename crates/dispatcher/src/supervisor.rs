use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_config::WorkerPoolConfig;
use courier_domain::entities::{JobType, Worker};
use courier_domain::repositories::WorkerRepository;
use courier_domain::services::WorkerManager;
use courier_errors::{CourierError, CourierResult};
use tokio::process::Command;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info, warn};

/// How long a stopped worker gets to exit after SIGTERM before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(5);

struct WorkerHandle {
    worker_type: JobType,
    stop_tx: oneshot::Sender<()>,
}

/// Spawns, monitors, restarts and scales worker processes.
///
/// One monitor task per worker owns the child: exit code zero means the
/// worker chose to stop; any other exit respawns the same id and type
/// immediately (crash-recovery loop, no backoff by observed behavior).
pub struct WorkerSupervisor {
    worker_repo: Arc<dyn WorkerRepository>,
    config: WorkerPoolConfig,
    processes: Arc<RwLock<HashMap<i64, WorkerHandle>>>,
}

impl WorkerSupervisor {
    pub fn new(worker_repo: Arc<dyn WorkerRepository>, config: WorkerPoolConfig) -> Self {
        Self {
            worker_repo,
            config,
            processes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn a process for every registered active worker; seed the
    /// registry first when it is empty (first boot).
    pub async fn init(&self) -> CourierResult<()> {
        let mut workers = self.worker_repo.list_active().await?;

        if workers.is_empty() && self.config.initial_workers_per_type > 0 {
            info!(
                "empty worker registry, seeding {} worker(s) per type",
                self.config.initial_workers_per_type
            );
            for job_type in JobType::ALL {
                for _ in 0..self.config.initial_workers_per_type {
                    let worker = self.worker_repo.create(&Worker::new(job_type)).await?;
                    workers.push(worker);
                }
            }
        }

        for worker in workers {
            self.start_worker(worker.id, worker.worker_type).await?;
        }
        Ok(())
    }

    /// Spawn the worker process and a monitor task owning it.
    pub async fn start_worker(&self, worker_id: i64, worker_type: JobType) -> CourierResult<()> {
        let mut processes = self.processes.write().await;
        if processes.contains_key(&worker_id) {
            return Err(CourierError::internal(format!(
                "worker {worker_id} already has a live process"
            )));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        processes.insert(
            worker_id,
            WorkerHandle {
                worker_type,
                stop_tx,
            },
        );
        drop(processes);

        let binary = self.worker_binary();
        let registry = Arc::clone(&self.processes);
        tokio::spawn(monitor_worker(
            registry, binary, worker_id, worker_type, stop_rx,
        ));
        Ok(())
    }

    pub async fn live_worker_count(&self) -> usize {
        self.processes.read().await.len()
    }

    pub async fn live_workers_of_type(&self, worker_type: JobType) -> usize {
        self.processes
            .read()
            .await
            .values()
            .filter(|handle| handle.worker_type == worker_type)
            .count()
    }

    fn worker_binary(&self) -> PathBuf {
        self.config.worker_binary.clone().unwrap_or_else(|| {
            std::env::current_exe()
                .map(|exe| exe.with_file_name("courier-worker"))
                .unwrap_or_else(|_| PathBuf::from("courier-worker"))
        })
    }

    async fn stop_process(&self, worker_id: i64) -> bool {
        let handle = self.processes.write().await.remove(&worker_id);
        match handle {
            Some(handle) => {
                // The monitor owns the child; it terminates and forgets it.
                let _ = handle.stop_tx.send(());
                true
            }
            None => false,
        }
    }
}

/// Owns the child process for one worker id. Respawns on nonzero exit,
/// forgets on clean exit, terminates on stop signal.
async fn monitor_worker(
    registry: Arc<RwLock<HashMap<i64, WorkerHandle>>>,
    binary: PathBuf,
    worker_id: i64,
    worker_type: JobType,
    mut stop_rx: oneshot::Receiver<()>,
) {
    loop {
        let mut child = match Command::new(&binary)
            .arg("--worker-id")
            .arg(worker_id.to_string())
            .arg("--worker-type")
            .arg(worker_type.as_str())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(
                    "failed to spawn worker {worker_id} ({worker_type}) from {}: {e}",
                    binary.display()
                );
                break;
            }
        };
        info!(
            "worker {worker_id} ({worker_type}) running, pid {:?}",
            child.id()
        );

        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) if status.success() => {
                        info!("worker {worker_id} exited cleanly");
                        break;
                    }
                    Ok(status) => {
                        warn!(
                            "worker {worker_id} exited with {:?}, respawning",
                            status.code()
                        );
                        continue;
                    }
                    Err(e) => {
                        error!("waiting on worker {worker_id} failed: {e}");
                        break;
                    }
                }
            }
            _ = &mut stop_rx => {
                if let Some(pid) = child.id() {
                    // SIGTERM first so the worker can close its connections
                    // and exit zero; escalate after the grace period.
                    let _ = std::process::Command::new("kill")
                        .arg(pid.to_string())
                        .output();
                }
                if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
                    warn!("worker {worker_id} ignored SIGTERM, killing");
                    let _ = child.kill().await;
                }
                info!("worker {worker_id} stopped");
                break;
            }
        }
    }

    registry.write().await.remove(&worker_id);
}

#[async_trait]
impl WorkerManager for WorkerSupervisor {
    async fn create_worker(&self, worker_type: JobType) -> CourierResult<i64> {
        let worker = self.worker_repo.create(&Worker::new(worker_type)).await?;
        self.start_worker(worker.id, worker.worker_type).await?;
        Ok(worker.id)
    }

    async fn stop_worker(&self, worker_id: i64) -> CourierResult<bool> {
        let had_process = self.stop_process(worker_id).await;

        // A worker whose process already exited can still be deregistered.
        let known = match self.worker_repo.get_by_id(worker_id).await? {
            Some(worker) if worker.is_active => {
                self.worker_repo.set_active(worker_id, false).await?;
                true
            }
            _ => false,
        };

        Ok(had_process || known)
    }

    async fn scale_workers(&self, worker_type: JobType, desired: usize) -> CourierResult<()> {
        let current = self.worker_repo.list_active_by_type(worker_type).await?;

        if current.len() < desired {
            let missing = desired - current.len();
            info!("scaling {worker_type} up by {missing}");
            for _ in 0..missing {
                self.create_worker(worker_type).await?;
            }
        } else if current.len() > desired {
            let surplus = current.len() - desired;
            info!("scaling {worker_type} down by {surplus}");
            // Oldest first, by registration order.
            for worker in current.into_iter().take(surplus) {
                self.stop_worker(worker.id).await?;
            }
        }

        Ok(())
    }

    async fn shutdown(&self) -> CourierResult<()> {
        let ids: Vec<i64> = self.processes.read().await.keys().copied().collect();
        info!("supervisor shutting down {} worker(s)", ids.len());
        for id in ids {
            self.stop_process(id).await;
        }
        Ok(())
    }
}

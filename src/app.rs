use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use courier_api::{create_routes, AppState};
use courier_config::AppConfig;
use courier_dispatcher::{StateListener, WorkerSupervisor};
use courier_domain::entities::JobType;
use courier_domain::messaging::JobQueue;
use courier_domain::services::WorkerManager;
use courier_infrastructure::{
    create_pool, RateLimiter, RedisConnectionManager, RedisJobQueue, SqliteJobRepository,
    SqliteWorkerRepository,
};
use courier_worker::{CoordinatorClient, JobExecutor, WorkerService};
use tokio::net::TcpListener;
use tracing::info;

use crate::shutdown::ShutdownManager;

/// Application run mode.
#[derive(Debug, Clone)]
pub enum AppMode {
    /// Coordinator: HTTP API, state listener and worker supervisor.
    Coordinator,
    /// A single worker process, spawned by the supervisor with its id
    /// and type as arguments.
    Worker { worker_id: i64, worker_type: JobType },
}

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, mode: AppMode, shutdown: ShutdownManager) -> Result<()> {
        match mode {
            AppMode::Coordinator => self.run_coordinator(shutdown).await,
            AppMode::Worker {
                worker_id,
                worker_type,
            } => self.run_worker(worker_id, worker_type, shutdown).await,
        }
    }

    async fn run_coordinator(&self, shutdown: ShutdownManager) -> Result<()> {
        let config = &self.config;

        // Only the coordinator process opens the primary store; workers
        // go through HTTP.
        let pool = create_pool(&config.database.path)
            .await
            .context("opening primary store")?;
        let job_repo = Arc::new(SqliteJobRepository::new(pool.clone()));
        let worker_repo = Arc::new(SqliteWorkerRepository::new(pool.clone()));

        let redis = Arc::new(
            RedisConnectionManager::new(config.redis.clone())
                .await
                .context("connecting to redis")?,
        );
        let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis));

        let state_listener = Arc::new(StateListener::new(
            job_repo.clone() as Arc<dyn courier_domain::repositories::JobRepository>,
            worker_repo.clone() as Arc<dyn courier_domain::repositories::WorkerRepository>,
            Arc::clone(&queue),
        ));
        state_listener
            .start()
            .await
            .context("starting state listener")?;

        let supervisor = Arc::new(WorkerSupervisor::new(
            worker_repo.clone() as Arc<dyn courier_domain::repositories::WorkerRepository>,
            config.workers.clone(),
        ));
        supervisor.init().await.context("starting worker pool")?;

        let state = AppState {
            job_repo,
            worker_repo,
            queue,
            worker_manager: Arc::clone(&supervisor) as Arc<dyn WorkerManager>,
            max_workers_per_type: config.workers.max_workers_per_type,
        };
        let app = create_routes(state);

        let listener = TcpListener::bind(config.server.bind_addr())
            .await
            .with_context(|| format!("binding {}", config.server.bind_addr()))?;
        info!("coordinator listening on {}", config.server.bind_addr());

        let mut shutdown_rx = shutdown.subscribe().await;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("http server")?;

        // Shutdown order: children first, then the listener, then the
        // store.
        supervisor.shutdown().await?;
        state_listener.stop().await?;
        pool.close().await;
        info!("coordinator stopped");
        Ok(())
    }

    async fn run_worker(
        &self,
        worker_id: i64,
        worker_type: JobType,
        shutdown: ShutdownManager,
    ) -> Result<()> {
        let config = &self.config;

        let redis = Arc::new(
            RedisConnectionManager::new(config.redis.clone())
                .await
                .context("connecting to redis")?,
        );

        // The secondary gateway quota is governed by the shared token
        // bucket; only messaging workers need it.
        let rate_limiter = (worker_type == JobType::Whatsapp).then(|| {
            RateLimiter::new(
                Arc::clone(&redis),
                config.messaging.rate_limit_bucket.clone(),
                config.messaging.rate_limit_max_tokens,
                config.messaging.rate_limit_refill_per_sec,
                config.messaging.rate_limit_key_expiry_secs,
            )
        });

        let queue: Arc<dyn JobQueue> = Arc::new(RedisJobQueue::new(redis));
        let executor = JobExecutor::for_type(worker_id, worker_type, config, rate_limiter)
            .await
            .context("building executor")?;

        let client = CoordinatorClient::new(config.workers.coordinator_url.clone(), worker_id);
        let service = WorkerService::new(
            worker_id,
            worker_type,
            client,
            queue,
            executor,
            Duration::from_millis(config.workers.poll_interval_ms),
            Duration::from_millis(config.workers.health_check_interval_ms),
        );

        let shutdown_rx = shutdown.subscribe().await;
        service.run(shutdown_rx).await?;
        info!("worker {worker_id} stopped");
        Ok(())
    }
}

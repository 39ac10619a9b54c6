use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use courier_config::WorkerPoolConfig;
use courier_dispatcher::WorkerSupervisor;
use courier_domain::entities::JobType;
use courier_domain::repositories::WorkerRepository;
use courier_domain::services::WorkerManager;
use courier_testing_utils::mocks::MockWorkerRepository;

/// `true` ignores its arguments and exits zero immediately, so spawned
/// "workers" come and go without leaving processes behind.
fn test_config() -> WorkerPoolConfig {
    WorkerPoolConfig {
        worker_binary: Some(PathBuf::from("true")),
        initial_workers_per_type: 1,
        ..WorkerPoolConfig::default()
    }
}

fn supervisor_with(repo: MockWorkerRepository) -> WorkerSupervisor {
    WorkerSupervisor::new(Arc::new(repo), test_config())
}

#[tokio::test]
async fn create_worker_registers_and_spawns() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo.clone());

    let id = supervisor.create_worker(JobType::Email).await.unwrap();
    assert!(id > 0);

    let worker = repo.get(id).unwrap();
    assert_eq!(worker.worker_type, JobType::Email);
    assert!(worker.is_active);
}

#[tokio::test]
async fn init_seeds_empty_registry_one_per_type() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo.clone());

    supervisor.init().await.unwrap();

    let active = repo.list_active().await.unwrap();
    assert_eq!(active.len(), JobType::ALL.len());
    for job_type in JobType::ALL {
        assert_eq!(
            active.iter().filter(|w| w.worker_type == job_type).count(),
            1
        );
    }

    // Re-init with a populated registry must not seed again.
    let supervisor2 = supervisor_with(repo.clone());
    supervisor2.init().await.unwrap();
    assert_eq!(repo.list_active().await.unwrap().len(), JobType::ALL.len());
}

#[tokio::test]
async fn stop_worker_reports_whether_known() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo.clone());

    let id = supervisor.create_worker(JobType::Sms).await.unwrap();
    assert!(supervisor.stop_worker(id).await.unwrap());
    assert!(!repo.get(id).unwrap().is_active);

    // Unknown id: nothing to stop.
    assert!(!supervisor.stop_worker(4242).await.unwrap());
    // Already stopped: no process, no active row.
    assert!(!supervisor.stop_worker(id).await.unwrap());
}

#[tokio::test]
async fn scale_up_creates_missing_workers() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo.clone());

    supervisor
        .scale_workers(JobType::Whatsapp, 3)
        .await
        .unwrap();
    assert_eq!(
        repo.list_active_by_type(JobType::Whatsapp)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn scale_down_stops_oldest_first() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo.clone());

    supervisor.scale_workers(JobType::Cronjob, 3).await.unwrap();
    let before = repo.list_active_by_type(JobType::Cronjob).await.unwrap();
    assert_eq!(before.len(), 3);

    supervisor.scale_workers(JobType::Cronjob, 1).await.unwrap();
    let after = repo.list_active_by_type(JobType::Cronjob).await.unwrap();
    assert_eq!(after.len(), 1);
    // The survivor is the newest registration.
    assert_eq!(after[0].id, before[2].id);
}

#[tokio::test]
async fn crashing_worker_is_respawned_until_stopped() {
    // `false` exits nonzero every time: the monitor keeps respawning the
    // same id, so the handle must stay registered.
    let repo = MockWorkerRepository::new();
    let config = WorkerPoolConfig {
        worker_binary: Some(PathBuf::from("false")),
        ..WorkerPoolConfig::default()
    };
    let supervisor = WorkerSupervisor::new(Arc::new(repo), config);

    let id = supervisor.create_worker(JobType::Sms).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(supervisor.live_worker_count().await, 1);

    // Stopping ends the crash-recovery loop and releases the handle.
    assert!(supervisor.stop_worker(id).await.unwrap());
    for _ in 0..50 {
        if supervisor.live_worker_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.live_worker_count().await, 0);
}

#[tokio::test]
async fn shutdown_clears_live_processes() {
    let repo = MockWorkerRepository::new();
    let supervisor = supervisor_with(repo);

    supervisor.create_worker(JobType::Email).await.unwrap();
    supervisor.create_worker(JobType::Sms).await.unwrap();
    supervisor.shutdown().await.unwrap();

    // Monitors drop their handles once the children are gone.
    for _ in 0..50 {
        if supervisor.live_worker_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(supervisor.live_worker_count().await, 0);
    assert_eq!(supervisor.live_workers_of_type(JobType::Email).await, 0);
}

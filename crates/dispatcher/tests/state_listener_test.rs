use std::sync::Arc;

use courier_dispatcher::StateListener;
use courier_domain::entities::{JobStatus, JobType, WorkerStatus};
use courier_domain::events::{JobCompletedEvent, JobFailedEvent, QueueEvent};
use courier_testing_utils::builders::{JobBuilder, WorkerBuilder};
use courier_testing_utils::mocks::{MockJobQueue, MockJobRepository, MockWorkerRepository};
use serde_json::json;

fn listener_with(
    job_repo: MockJobRepository,
    worker_repo: MockWorkerRepository,
    queue: Arc<MockJobQueue>,
) -> StateListener {
    StateListener::new(
        Arc::new(job_repo),
        Arc::new(worker_repo),
        queue as Arc<dyn courier_domain::messaging::JobQueue>,
    )
}

#[tokio::test]
async fn start_and_stop() {
    let listener = listener_with(
        MockJobRepository::new(),
        MockWorkerRepository::new(),
        Arc::new(MockJobQueue::new()),
    );

    assert!(!listener.is_running().await);
    listener.start().await.unwrap();
    assert!(listener.is_running().await);
    // A second start while running is refused.
    assert!(listener.start().await.is_err());

    listener.stop().await.unwrap();
    assert!(!listener.is_running().await);
    // Stopping twice is harmless.
    listener.stop().await.unwrap();
}

#[tokio::test]
async fn completed_event_finalizes_job_and_frees_worker() {
    let job_repo = MockJobRepository::with_jobs(vec![JobBuilder::new()
        .id(1)
        .job_type(JobType::Sms)
        .status(JobStatus::Processing)
        .build()]);
    let worker_repo = MockWorkerRepository::with_workers(vec![WorkerBuilder::new()
        .id(2)
        .status(WorkerStatus::Busy)
        .build()]);
    let listener = listener_with(
        job_repo.clone(),
        worker_repo.clone(),
        Arc::new(MockJobQueue::new()),
    );

    let event = JobCompletedEvent {
        job_id: 1,
        worker_id: 2,
        result: json!({"ok": true}),
    };
    listener.handle_completed(&event).await.unwrap();

    let job = job_repo.get(1).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.worker_id, Some(2));
    assert_eq!(job.result, Some(json!({"ok": true})));
    assert_eq!(worker_repo.get(2).unwrap().status, WorkerStatus::Idle);

    // Idempotent: replaying the event leaves the same terminal state.
    listener.handle_completed(&event).await.unwrap();
    let job = job_repo.get(1).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result, Some(json!({"ok": true})));
}

#[tokio::test]
async fn failed_event_records_error_and_frees_worker() {
    let job_repo = MockJobRepository::with_jobs(vec![JobBuilder::new()
        .id(3)
        .status(JobStatus::Processing)
        .build()]);
    let worker_repo = MockWorkerRepository::with_workers(vec![WorkerBuilder::new()
        .id(4)
        .status(WorkerStatus::Busy)
        .build()]);
    let listener = listener_with(
        job_repo.clone(),
        worker_repo.clone(),
        Arc::new(MockJobQueue::new()),
    );

    let event = JobFailedEvent {
        job_id: 3,
        worker_id: 4,
        error: "gateway unreachable".to_string(),
    };
    listener.handle_failed(&event).await.unwrap();
    listener.handle_failed(&event).await.unwrap();

    let job = job_repo.get(3).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.result, Some(json!({"error": "gateway unreachable"})));
    assert_eq!(worker_repo.get(4).unwrap().status, WorkerStatus::Idle);
}

#[tokio::test]
async fn running_listener_applies_published_events() {
    let job_repo = MockJobRepository::with_jobs(vec![JobBuilder::new()
        .id(9)
        .status(JobStatus::Processing)
        .build()]);
    let worker_repo = MockWorkerRepository::with_workers(vec![WorkerBuilder::new()
        .id(1)
        .status(WorkerStatus::Busy)
        .build()]);
    let queue = Arc::new(MockJobQueue::new());
    let listener = listener_with(job_repo.clone(), worker_repo.clone(), Arc::clone(&queue));

    listener.start().await.unwrap();
    // Give the subscription task a tick to attach before emitting.
    tokio::task::yield_now().await;

    queue.emit(QueueEvent::JobCompleted(JobCompletedEvent {
        job_id: 9,
        worker_id: 1,
        result: json!({"delivered": true}),
    }));

    // The listener consumes asynchronously; poll until applied.
    for _ in 0..50 {
        if job_repo.get(9).unwrap().status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(job_repo.get(9).unwrap().status, JobStatus::Completed);
    assert_eq!(worker_repo.get(1).unwrap().status, WorkerStatus::Idle);

    listener.stop().await.unwrap();
}

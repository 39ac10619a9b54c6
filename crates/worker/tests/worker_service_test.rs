use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use courier_domain::entities::JobType;
use courier_testing_utils::builders::JobBuilder;
use courier_testing_utils::mocks::MockJobQueue;
use courier_worker::executors::{JobExecutor, WebhookAdapter};
use courier_worker::{CoordinatorClient, WorkerService};
use serde_json::{json, Value};

/// Records every PATCH the worker makes against the coordinator.
#[derive(Clone, Default)]
struct Coordinator {
    job_patches: Arc<Mutex<Vec<(i64, Value)>>>,
    worker_patches: Arc<Mutex<Vec<Value>>>,
}

fn coordinator_router(state: Coordinator) -> Router {
    Router::new()
        .route(
            "/api/workers/{id}",
            get(|Path(id): Path<i64>| async move {
                Json(json!({"worker": {
                    "id": id,
                    "type": "sms",
                    "status": "idle",
                    "isActive": true,
                    "lastActive": "2026-08-01T00:00:00Z"
                }}))
            })
            .patch(
                |State(state): State<Coordinator>, Json(body): Json<Value>| async move {
                    state.worker_patches.lock().unwrap().push(body);
                    Json(json!({"success": true}))
                },
            ),
        )
        .route(
            "/api/jobs/{id}",
            patch(
                |State(state): State<Coordinator>, Path(id): Path<i64>, Json(body): Json<Value>| async move {
                    state.job_patches.lock().unwrap().push((id, body));
                    Json(json!({"success": true}))
                },
            ),
        )
        .with_state(state)
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn service(
    coordinator_url: &str,
    webhook_url: String,
    queue: Arc<MockJobQueue>,
) -> WorkerService {
    let worker_id = 7;
    WorkerService::new(
        worker_id,
        JobType::Sms,
        CoordinatorClient::new(coordinator_url, worker_id),
        queue,
        JobExecutor::Webhook(WebhookAdapter::new(webhook_url, JobType::Sms, worker_id)),
        Duration::from_millis(1000),
        Duration::from_secs(30),
    )
}

#[tokio::test]
async fn process_job_reports_success_on_both_paths() {
    let coordinator = Coordinator::default();
    let coordinator_url = serve(coordinator_router(coordinator.clone())).await;

    let webhook = Router::new().route("/hook", post(|| async { Json(json!({"ok": true})) }));
    let webhook_url = format!("{}/hook", serve(webhook).await);

    let queue = Arc::new(MockJobQueue::new());
    let service = service(&coordinator_url, webhook_url, Arc::clone(&queue));

    let job = JobBuilder::new()
        .id(12)
        .job_type(JobType::Sms)
        .payload(json!({"to": "+1"}))
        .build();
    service.process_job(job).await;

    // PATCH path: processing with the worker id, then completed with the
    // webhook's reply as result.
    let patches = coordinator.job_patches.lock().unwrap();
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].0, 12);
    assert_eq!(patches[0].1["status"], "processing");
    assert_eq!(patches[0].1["workerId"], 7);
    assert_eq!(patches[1].1["status"], "completed");
    assert_eq!(patches[1].1["result"]["ok"], true);

    // Worker returns to idle after the terminal transition.
    let worker_patches = coordinator.worker_patches.lock().unwrap();
    assert_eq!(
        worker_patches.last().unwrap()["status"],
        "idle"
    );

    // PUBLISH path: the completion event carries the same result.
    let events = queue.completed_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, 12);
    assert_eq!(events[0].worker_id, 7);
    assert_eq!(events[0].result, json!({"ok": true}));
    assert!(queue.failed_events().is_empty());
}

#[tokio::test]
async fn process_job_reports_failure_with_error_result() {
    let coordinator = Coordinator::default();
    let coordinator_url = serve(coordinator_router(coordinator.clone())).await;

    let webhook = Router::new().route(
        "/hook",
        post(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
    );
    let webhook_url = format!("{}/hook", serve(webhook).await);

    let queue = Arc::new(MockJobQueue::new());
    let service = service(&coordinator_url, webhook_url, Arc::clone(&queue));

    let job = JobBuilder::new().id(13).job_type(JobType::Sms).build();
    service.process_job(job).await;

    let patches = coordinator.job_patches.lock().unwrap();
    assert_eq!(patches[1].1["status"], "failed");
    let error = patches[1].1["result"]["error"].as_str().unwrap();
    assert!(error.contains("503"), "got: {error}");

    let events = queue.failed_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, 13);
    assert!(queue.completed_events().is_empty());
}

#[tokio::test]
async fn coordinator_outage_never_panics_the_job_boundary() {
    // Nothing is listening on this port: every PATCH/PUBLISH fails, and
    // process_job must still return normally.
    let queue = Arc::new(MockJobQueue::new());
    let service = service(
        "http://127.0.0.1:9",
        "http://127.0.0.1:9/hook".to_string(),
        Arc::clone(&queue),
    );

    let job = JobBuilder::new().id(14).job_type(JobType::Sms).build();
    service.process_job(job).await;

    // The failure event still made it out through the queue transport.
    assert_eq!(queue.failed_events().len(), 1);
}

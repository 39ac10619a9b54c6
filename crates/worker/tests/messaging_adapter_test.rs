use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use courier_config::MessagingConfig;
use courier_worker::executors::MessagingAdapter;
use serde_json::{json, Value};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(gateway_url: String) -> MessagingConfig {
    MessagingConfig {
        gateway_url,
        send_delay_ms: 0,
        ..MessagingConfig::default()
    }
}

#[derive(Clone, Default)]
struct Gateway {
    sent: Arc<Mutex<Vec<String>>>,
}

fn gateway_router(state: Gateway) -> Router {
    Router::new()
        .route("/status", get(|| async { Json(json!({"status": "ready"})) }))
        .route(
            "/send-message",
            post(
                |State(state): State<Gateway>, Json(body): Json<Value>| async move {
                    let message = body["message"].as_str().unwrap_or_default().to_string();
                    // The first submission stalls; with per-endpoint
                    // serialization the second must still arrive after it.
                    if message == "first" {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                    }
                    state.sent.lock().unwrap().push(message);
                    Json(json!({"ok": true}))
                },
            ),
        )
        .with_state(state)
}

#[tokio::test]
async fn sends_to_one_endpoint_stay_in_submission_order() {
    let gateway = Gateway::default();
    let base = serve(gateway_router(gateway.clone())).await;
    let adapter = MessagingAdapter::new(config(base), None);

    let first_payload = json!({"number": "+1", "message": "first"});
    let second_payload = json!({"number": "+1", "message": "second"});
    let first = adapter.send(&first_payload);
    let second = adapter.send(&second_payload);
    let (first, second) = tokio::join!(first, second);
    first.unwrap();
    second.unwrap();

    assert_eq!(*gateway.sent.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn group_messages_use_group_route() {
    let received = Arc::new(Mutex::new(Vec::<Value>::new()));
    let recorder = Arc::clone(&received);
    let router = Router::new()
        .route("/status", get(|| async { Json(json!({"status": "connecting"})) }))
        .route(
            "/send-group-message",
            post(move |Json(body): Json<Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    recorder.lock().unwrap().push(body);
                    Json(json!({"ok": true}))
                }
            }),
        );
    let base = serve(router).await;
    let adapter = MessagingAdapter::new(config(base), None);

    adapter
        .send(&json!({"groupId": "ops", "message": "deploy done"}))
        .await
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["groupId"], "ops");
}

#[tokio::test]
async fn primary_failure_falls_through_to_secondary() {
    let secondary_calls = Arc::new(Mutex::new(Vec::<(Option<String>, Value)>::new()));
    let recorder = Arc::clone(&secondary_calls);

    let primary = Router::new()
        .route("/status", get(|| async { Json(json!({"status": "ready"})) }))
        .route(
            "/send-message",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "session lost"})),
                )
            }),
        );
    let secondary = Router::new().route(
        "/",
        post(move |headers: axum::http::HeaderMap, Json(body): Json<Value>| {
            let recorder = Arc::clone(&recorder);
            async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                recorder.lock().unwrap().push((auth, body));
                Json(json!({"ok": true, "viaFallback": true}))
            }
        }),
    );

    let primary_base = serve(primary).await;
    let secondary_base = serve(secondary).await;

    let adapter = MessagingAdapter::new(
        MessagingConfig {
            gateway_url: primary_base,
            send_delay_ms: 0,
            fallback_url: Some(format!("{secondary_base}/")),
            fallback_token: Some("sekrit-token".to_string()),
            ..MessagingConfig::default()
        },
        None,
    );

    let result = adapter
        .send(&json!({"number": "+31600000001", "message": "hello"}))
        .await
        .unwrap();
    assert_eq!(result["viaFallback"], true);

    let calls = secondary_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (auth, body) = &calls[0];
    assert_eq!(auth.as_deref(), Some("Bearer sekrit-token"));
    assert_eq!(body["target"], "+31600000001");
}

#[tokio::test]
async fn both_gateways_failing_yields_combined_error() {
    let primary = Router::new()
        .route("/status", get(|| async { Json(json!({"status": "ready"})) }))
        .route(
            "/send-message",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "primary down") }),
        );
    let secondary = Router::new().route(
        "/",
        post(|| async { (axum::http::StatusCode::FORBIDDEN, "bad token") }),
    );

    let primary_base = serve(primary).await;
    let secondary_base = serve(secondary).await;

    let adapter = MessagingAdapter::new(
        MessagingConfig {
            gateway_url: primary_base,
            send_delay_ms: 0,
            fallback_url: Some(format!("{secondary_base}/")),
            fallback_token: None,
            ..MessagingConfig::default()
        },
        None,
    );

    let err = adapter
        .send(&json!({"number": "+1", "message": "hello"}))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("primary gateway"), "got: {message}");
    assert!(message.contains("secondary gateway"), "got: {message}");
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_any_request() {
    let adapter = MessagingAdapter::new(config("http://127.0.0.1:9".to_string()), None);

    let err = adapter.send(&json!({"message": "no target"})).await.unwrap_err();
    assert!(err.to_string().contains("number or groupId"));

    let err = adapter
        .send(&json!({"number": "+1", "message": "   "}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
}

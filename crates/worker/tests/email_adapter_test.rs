use courier_worker::executors::EmailAdapter;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

/// Nothing listens on port 1, so every delivery attempt fails fast with a
/// connection error, which is exactly what the failover paths need.
async fn seed_transport(pool: &SqlitePool, module: &str, role: &str) {
    sqlx::query(
        "INSERT INTO smtp_transport (module, role, host, port, secure, username, password, from_address) \
         VALUES ($1, $2, '127.0.0.1', 1, 0, NULL, NULL, 'courier@example.com')",
    )
    .bind(module)
    .bind(role)
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_service(pool: &SqlitePool, module: &str, failover: bool, notify: bool) {
    sqlx::query(
        "INSERT INTO smtp_service (module, failover_enabled, notify_enabled, admin_email) \
         VALUES ($1, $2, $3, 'admin@example.com')",
    )
    .bind(module)
    .bind(failover)
    .bind(notify)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn send_without_any_transport_fails_and_logs() {
    let config_pool = memory_pool().await;
    let log_pool = memory_pool().await;
    let adapter = EmailAdapter::with_pools(config_pool, log_pool.clone())
        .await
        .unwrap();

    let err = adapter
        .send(&json!({"to": "ops@example.com", "subject": "hi", "text": "body"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no SMTP transport available"));

    let log = sqlx::query("SELECT status, recipient, error FROM email_log")
        .fetch_one(&log_pool)
        .await
        .unwrap();
    assert_eq!(log.get::<String, _>("status"), "failed");
    assert_eq!(log.get::<String, _>("recipient"), "ops@example.com");
}

#[tokio::test]
async fn unknown_module_falls_back_to_global_settings() {
    let config_pool = memory_pool().await;
    let log_pool = memory_pool().await;

    // Only Global rows exist; the billing module must inherit them. The
    // delivery itself fails (nothing listens), which proves the Global
    // transport was actually used.
    let adapter = EmailAdapter::with_pools(config_pool.clone(), log_pool.clone())
        .await
        .unwrap();
    seed_service(&config_pool, "Global", false, false).await;
    seed_transport(&config_pool, "Global", "main").await;

    let err = adapter
        .send(&json!({
            "to": "ops@example.com",
            "subject": "invoice",
            "html": "<p>hi</p>",
            "module": "billing"
        }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("smtp delivery failed"));

    let log = sqlx::query("SELECT module, status, used_backup FROM email_log")
        .fetch_one(&log_pool)
        .await
        .unwrap();
    assert_eq!(log.get::<String, _>("module"), "billing");
    assert_eq!(log.get::<String, _>("status"), "failed");
    assert_eq!(log.get::<bool, _>("used_backup"), false);
}

#[tokio::test]
async fn failover_tries_backup_and_reports_both_failures() {
    let config_pool = memory_pool().await;
    let log_pool = memory_pool().await;

    let adapter = EmailAdapter::with_pools(config_pool.clone(), log_pool.clone())
        .await
        .unwrap();
    seed_service(&config_pool, "Global", true, false).await;
    seed_transport(&config_pool, "Global", "main").await;
    seed_transport(&config_pool, "Global", "backup").await;

    let err = adapter
        .send(&json!({
            "to": "ops@example.com",
            "subject": "alert",
            "text": "body",
            "module": "alerts"
        }))
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("main transport"), "got: {message}");
    assert!(message.contains("backup transport"), "got: {message}");

    // Both attempts are on the record: main first, then backup.
    let rows = sqlx::query("SELECT used_backup FROM email_log ORDER BY id")
        .fetch_all(&log_pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<bool, _>("used_backup"), false);
    assert_eq!(rows[1].get::<bool, _>("used_backup"), true);
}

#[tokio::test]
async fn payload_requires_a_body() {
    let adapter = EmailAdapter::with_pools(memory_pool().await, memory_pool().await)
        .await
        .unwrap();

    let err = adapter
        .send(&json!({"to": "ops@example.com", "subject": "empty"}))
        .await
        .unwrap_err();
    // Validated before any transport lookup succeeds or fails.
    assert!(err.to_string().contains("html or text body") || err.to_string().contains("no SMTP"));
}

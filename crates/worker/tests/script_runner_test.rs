use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use courier_config::ScriptConfig;
use courier_errors::CourierError;
use courier_worker::executors::ScriptAdapter;
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

fn write_script(dir: &std::path::Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn temp_scripts_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("courier-scripts-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_config(scripts_dir: &std::path::Path) -> ScriptConfig {
    ScriptConfig {
        scripts_dir: scripts_dir.to_string_lossy().into_owned(),
        // Generous thresholds so a loaded CI host never trips the gate.
        cpu_threshold_percent: 10_000.0,
        memory_threshold_percent: 10_000.0,
        resource_check_interval_ms: 10,
        resource_check_retries: 2,
        ..ScriptConfig::default()
    }
}

async fn seed_task(pool: &SqlitePool, id: i64) {
    sqlx::query("INSERT INTO tasks (id, name) VALUES ($1, 'nightly')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn runs_script_and_finalizes_log() {
    let dir = temp_scripts_dir("ok");
    write_script(&dir, "hello.sh", "#!/bin/sh\necho hello-from-script\n");

    let pool = memory_pool().await;
    let adapter = ScriptAdapter::with_pool(test_config(&dir), pool.clone())
        .await
        .unwrap();
    seed_task(&pool, 1).await;

    let result = adapter
        .run(&json!({"script": "hello.sh", "taskId": 1}))
        .await
        .unwrap();

    assert_eq!(result["exitCode"], 0);
    assert!(result["output"]
        .as_str()
        .unwrap()
        .contains("hello-from-script"));

    let log = sqlx::query("SELECT status, output, end_time FROM task_logs WHERE task_id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(log.get::<String, _>("status"), "success");
    assert!(log.get::<String, _>("output").contains("hello-from-script"));
    assert!(log.get::<Option<String>, _>("end_time").is_some());

    let task = sqlx::query("SELECT is_running, pid FROM tasks WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(task.get::<i64, _>("is_running"), 0);
    assert!(task.get::<Option<i64>, _>("pid").is_none());
}

#[tokio::test]
async fn nonzero_exit_fails_the_job_and_the_log() {
    let dir = temp_scripts_dir("fail");
    write_script(&dir, "broken.sh", "#!/bin/sh\necho oops >&2\nexit 3\n");

    let pool = memory_pool().await;
    let adapter = ScriptAdapter::with_pool(test_config(&dir), pool.clone())
        .await
        .unwrap();
    seed_task(&pool, 2).await;

    let err = adapter
        .run(&json!({"script": "broken.sh", "taskId": 2}))
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::JobExecution(_)));
    assert!(err.to_string().contains("oops"));

    let log = sqlx::query("SELECT status FROM task_logs WHERE task_id = 2")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(log.get::<String, _>("status"), "failed");
}

#[tokio::test]
async fn resource_gate_exhaustion_marks_task_failed() {
    let dir = temp_scripts_dir("gate");
    write_script(&dir, "never.sh", "#!/bin/sh\necho unreachable\n");

    let pool = memory_pool().await;
    let mut config = test_config(&dir);
    // Impossible thresholds: every probe is over budget.
    config.cpu_threshold_percent = -1.0;
    config.memory_threshold_percent = -1.0;
    config.resource_check_retries = 2;
    config.resource_check_interval_ms = 1;

    let adapter = ScriptAdapter::with_pool(config, pool.clone()).await.unwrap();
    seed_task(&pool, 3).await;

    let err = adapter
        .run(&json!({"script": "never.sh", "taskId": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, CourierError::ResourceExhausted(_)));

    let log = sqlx::query("SELECT status FROM task_logs WHERE task_id = 3")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(log.get::<String, _>("status"), "failed");
}

#[tokio::test]
async fn script_without_task_id_skips_bookkeeping() {
    let dir = temp_scripts_dir("anon");
    write_script(&dir, "anon.sh", "#!/bin/sh\necho anonymous\n");

    let pool = memory_pool().await;
    let adapter = ScriptAdapter::with_pool(test_config(&dir), pool.clone())
        .await
        .unwrap();

    let result = adapter.run(&json!({"script": "anon.sh"})).await.unwrap();
    assert_eq!(result["exitCode"], 0);

    let logs = sqlx::query("SELECT COUNT(*) AS count FROM task_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(logs.get::<i64, _>("count"), 0);
}

#[tokio::test]
async fn rejects_payload_without_script() {
    let dir = temp_scripts_dir("bad");
    let adapter = ScriptAdapter::with_pool(test_config(&dir), memory_pool().await)
        .await
        .unwrap();

    let err = adapter.run(&json!({"taskId": 1})).await.unwrap_err();
    assert!(matches!(err, CourierError::Validation(_)));
}

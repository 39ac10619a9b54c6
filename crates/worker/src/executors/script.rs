use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use courier_config::ScriptConfig;
use courier_errors::{CourierError, CourierResult};
use serde::Deserialize;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

use super::resources;

/// Cap per captured stream; long-running scripts can be chatty.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const TASK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id            INTEGER PRIMARY KEY,
    name          TEXT,
    is_running    INTEGER NOT NULL DEFAULT 0,
    start_running TEXT,
    pid           INTEGER
);
CREATE TABLE IF NOT EXISTS task_logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id    INTEGER NOT NULL,
    start_time TEXT    NOT NULL,
    end_time   TEXT,
    status     TEXT    NOT NULL,
    output     TEXT
);
"#;

#[derive(Debug, Deserialize)]
struct ScriptPayload {
    script: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(rename = "taskId")]
    task_id: Option<i64>,
}

/// Runs named scripts as child processes, gated by host resource
/// availability, with an audit trail in the external task-scheduler DB.
pub struct ScriptAdapter {
    config: ScriptConfig,
    task_db: SqlitePool,
}

impl ScriptAdapter {
    pub async fn new(config: &ScriptConfig) -> CourierResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.scheduler_db_path)
            .create_if_missing(true);
        let task_db = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;
        Self::with_pool(config.clone(), task_db).await
    }

    pub async fn with_pool(config: ScriptConfig, task_db: SqlitePool) -> CourierResult<Self> {
        sqlx::raw_sql(TASK_SCHEMA).execute(&task_db).await?;
        Ok(Self { config, task_db })
    }

    pub async fn run(&self, payload: &serde_json::Value) -> CourierResult<serde_json::Value> {
        let payload: ScriptPayload = serde_json::from_value(payload.clone())
            .map_err(|e| CourierError::validation(format!("invalid cronjob payload: {e}")))?;

        let path = self.resolve_script(&payload.script)?;
        let log_id = match payload.task_id {
            Some(task_id) => Some(self.open_log(task_id).await?),
            None => None,
        };

        if let Err(e) = self.acquire_resources(payload.task_id, log_id).await {
            if let (Some(task_id), Some(log_id)) = (payload.task_id, log_id) {
                self.finalize(task_id, log_id, "failed", &e.to_string()).await;
            }
            return Err(e);
        }

        match self
            .spawn_and_capture(&path, &payload.args, payload.task_id)
            .await
        {
            Ok((exit_code, output, error)) => {
                let success = exit_code == Some(0);
                if let (Some(task_id), Some(log_id)) = (payload.task_id, log_id) {
                    let status = if success { "success" } else { "failed" };
                    let trail = if error.is_empty() { &output } else { &error };
                    self.finalize(task_id, log_id, status, trail).await;
                }

                if success {
                    Ok(json!({
                        "exitCode": 0,
                        "output": output,
                        "error": error,
                    }))
                } else {
                    Err(CourierError::JobExecution(format!(
                        "script {} exited with {:?}: {}",
                        payload.script,
                        exit_code,
                        truncate(&error, 512)
                    )))
                }
            }
            Err(e) => {
                if let (Some(task_id), Some(log_id)) = (payload.task_id, log_id) {
                    self.finalize(task_id, log_id, "failed", &e.to_string()).await;
                }
                Err(e)
            }
        }
    }

    fn resolve_script(&self, script: &str) -> CourierResult<PathBuf> {
        resolve_script(&self.config.scripts_dir, script)
    }

    /// Admission gate: wait for CPU and memory headroom, bounded by the
    /// configured retry budget. Each wait is recorded on the task log.
    async fn acquire_resources(&self, task_id: Option<i64>, log_id: Option<i64>) -> CourierResult<()> {
        let interval = Duration::from_millis(self.config.resource_check_interval_ms);

        for attempt in 0..=self.config.resource_check_retries {
            let usage = resources::current_usage().await?;
            if !usage.exceeds(
                self.config.cpu_threshold_percent,
                self.config.memory_threshold_percent,
            ) {
                return Ok(());
            }

            if attempt == self.config.resource_check_retries {
                break;
            }

            let note = format!(
                "waiting for resources (cpu {:.1}%, mem {:.1}%), attempt {}/{}",
                usage.cpu_percent,
                usage.memory_percent,
                attempt + 1,
                self.config.resource_check_retries
            );
            warn!("{note}");
            if let (Some(task_id), Some(log_id)) = (task_id, log_id) {
                self.append_waiting_note(task_id, log_id, &note).await;
            }
            sleep(interval).await;
        }

        Err(CourierError::ResourceExhausted(format!(
            "host stayed above cpu {:.0}% / mem {:.0}% for {} checks",
            self.config.cpu_threshold_percent,
            self.config.memory_threshold_percent,
            self.config.resource_check_retries
        )))
    }

    async fn spawn_and_capture(
        &self,
        path: &Path,
        args: &[String],
        task_id: Option<i64>,
    ) -> CourierResult<(Option<i32>, String, String)> {
        // `.js` scripts go to the interpreter, everything else through the
        // shell (matches how operators invoke them by hand).
        let mut command = if path.extension().is_some_and(|ext| ext == "js") {
            let mut command = Command::new("node");
            command.arg(path);
            command.args(args);
            command
        } else {
            let mut line = shell_quote(&path.to_string_lossy());
            for arg in args {
                line.push(' ');
                line.push_str(&shell_quote(arg));
            }
            let mut command = Command::new("sh");
            command.arg("-c").arg(line);
            command
        };

        let mut child = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CourierError::JobExecution(format!("failed to spawn script: {e}")))?;

        if let (Some(task_id), Some(pid)) = (task_id, child.id()) {
            // While running, the task row carries the pid so external
            // tooling can inspect or kill the child.
            self.mark_running(task_id, pid).await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CourierError::internal("script stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CourierError::internal("script stderr not captured"))?;

        let stdout_task = read_bounded(stdout);
        let stderr_task = read_bounded(stderr);
        let (output, error) = tokio::join!(stdout_task, stderr_task);

        let status = child
            .wait()
            .await
            .map_err(|e| CourierError::JobExecution(format!("waiting on script failed: {e}")))?;

        if let Some(task_id) = task_id {
            self.clear_running(task_id).await;
        }

        info!(
            "script {} finished with {:?}",
            path.display(),
            status.code()
        );
        Ok((status.code(), output, error))
    }

    async fn mark_running(&self, task_id: i64, pid: u32) {
        let result = sqlx::query(
            "UPDATE tasks SET is_running = 1, start_running = $2, pid = $3 WHERE id = $1",
        )
        .bind(task_id)
        .bind(Utc::now())
        .bind(pid as i64)
        .execute(&self.task_db)
        .await;
        if let Err(e) = result {
            warn!("failed to mark task {task_id} running: {e}");
        }
    }

    async fn clear_running(&self, task_id: i64) {
        let result = sqlx::query(
            "UPDATE tasks SET is_running = 0, start_running = NULL, pid = NULL WHERE id = $1",
        )
        .bind(task_id)
        .execute(&self.task_db)
        .await;
        if let Err(e) = result {
            warn!("failed to clear task {task_id}: {e}");
        }
    }

    async fn open_log(&self, task_id: i64) -> CourierResult<i64> {
        let result = sqlx::query(
            "INSERT INTO task_logs (task_id, start_time, status) VALUES ($1, $2, 'running')",
        )
        .bind(task_id)
        .bind(Utc::now())
        .execute(&self.task_db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn append_waiting_note(&self, task_id: i64, log_id: i64, note: &str) {
        let result = sqlx::query("UPDATE task_logs SET output = $2 WHERE id = $1 AND task_id = $3")
            .bind(log_id)
            .bind(note)
            .bind(task_id)
            .execute(&self.task_db)
            .await;
        if let Err(e) = result {
            warn!("failed to record waiting note for task {task_id}: {e}");
        }
    }

    async fn finalize(&self, task_id: i64, log_id: i64, status: &str, output: &str) {
        let result = sqlx::query(
            "UPDATE task_logs SET status = $2, output = $3, end_time = $4 \
             WHERE id = $1 AND task_id = $5",
        )
        .bind(log_id)
        .bind(status)
        .bind(truncate(output, MAX_OUTPUT_BYTES))
        .bind(Utc::now())
        .bind(task_id)
        .execute(&self.task_db)
        .await;
        if let Err(e) = result {
            warn!("failed to finalize task log {log_id}: {e}");
        }
    }
}

fn resolve_script(scripts_dir: &str, script: &str) -> CourierResult<PathBuf> {
    let raw = Path::new(script);
    if raw.is_absolute() {
        return Ok(raw.to_path_buf());
    }
    if raw.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(CourierError::validation(format!(
            "script path may not leave the scripts directory: {script}"
        )));
    }
    Ok(Path::new(scripts_dir).join(raw))
}

async fn read_bounded<R: tokio::io::AsyncRead + Unpin>(reader: R) -> String {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if collected.len() + line.len() + 1 > MAX_OUTPUT_BYTES {
            collected.push_str("\n[output truncated]");
            // Keep draining so the child never blocks on a full pipe.
            while let Ok(Some(_)) = lines.next_line().await {}
            break;
        }
        if !collected.is_empty() {
            collected.push('\n');
        }
        collected.push_str(&line);
    }
    collected
}

fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

fn truncate(raw: &str, max: usize) -> &str {
    if raw.len() <= max {
        raw
    } else {
        let mut end = max;
        while !raw.is_char_boundary(end) {
            end -= 1;
        }
        &raw[..end]
    }
}

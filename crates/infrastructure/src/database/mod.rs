//! Primary store (SQLite) connection and schema bootstrap.
//!
//! The jobs and workers tables are created on startup when missing. The
//! coordinator process is the only writer, so the pool stays small.

pub mod sqlite;

use courier_errors::CourierResult;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type    TEXT    NOT NULL,
    payload     TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'pending',
    worker_id   INTEGER,
    result      TEXT,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_status_type ON jobs (status, job_type);

CREATE TABLE IF NOT EXISTS workers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_type TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'idle',
    is_active   INTEGER NOT NULL DEFAULT 1,
    last_active TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_workers_active_type ON workers (is_active, worker_type);
"#;

/// Open (creating if missing) the SQLite store at `path` and bootstrap
/// the schema.
pub async fn create_pool(path: &str) -> CourierResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    create_pool_with_options(options).await
}

pub async fn create_pool_with_options(options: SqliteConnectOptions) -> CourierResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> CourierResult<()> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("primary store schema ready");
    Ok(())
}

use async_trait::async_trait;
use chrono::Utc;
use courier_domain::entities::{JobType, Worker, WorkerStatus};
use courier_domain::repositories::{TypeCount, WorkerRepository, WorkerStats};
use courier_errors::CourierResult;
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteWorkerRepository {
    pool: SqlitePool,
}

impl SqliteWorkerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_worker(row: &sqlx::sqlite::SqliteRow) -> CourierResult<Worker> {
        Ok(Worker {
            id: row.try_get("id")?,
            worker_type: row.try_get("worker_type")?,
            status: row.try_get("status")?,
            is_active: row.try_get("is_active")?,
            last_active: row.try_get("last_active")?,
        })
    }
}

const WORKER_COLUMNS: &str = "id, worker_type, status, is_active, last_active";

#[async_trait]
impl WorkerRepository for SqliteWorkerRepository {
    async fn create(&self, worker: &Worker) -> CourierResult<Worker> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO workers (worker_type, status, is_active, last_active) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(worker.worker_type)
        .bind(worker.status)
        .bind(worker.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let mut created = worker.clone();
        created.id = result.last_insert_rowid();
        created.last_active = now;

        debug!(
            "registered worker {} ({})",
            created.id, created.worker_type
        );
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Worker>> {
        let row = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_worker(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_active(&self) -> CourierResult<Vec<Worker>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn list_active_by_type(&self, worker_type: JobType) -> CourierResult<Vec<Worker>> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKER_COLUMNS} FROM workers \
             WHERE is_active = 1 AND worker_type = $1 ORDER BY id"
        ))
        .bind(worker_type)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_worker).collect()
    }

    async fn update_status(&self, id: i64, status: WorkerStatus) -> CourierResult<()> {
        sqlx::query("UPDATE workers SET status = $2, last_active = $3 WHERE id = $1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> CourierResult<()> {
        sqlx::query("UPDATE workers SET is_active = $2, last_active = $3 WHERE id = $1")
            .bind(id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn stats(&self) -> CourierResult<WorkerStats> {
        let mut stats = WorkerStats::default();

        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS count FROM workers WHERE is_active = 1 GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            let status: WorkerStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.total += count;
            match status {
                WorkerStatus::Idle => stats.idle = count,
                WorkerStatus::Busy => stats.busy = count,
            }
        }

        let rows = sqlx::query(
            "SELECT worker_type, COUNT(*) AS count FROM workers \
             WHERE is_active = 1 GROUP BY worker_type ORDER BY worker_type",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in rows {
            stats.by_type.push(TypeCount {
                job_type: row.try_get("worker_type")?,
                count: row.try_get("count")?,
            });
        }

        Ok(stats)
    }
}

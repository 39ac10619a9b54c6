use async_trait::async_trait;
use chrono::Utc;
use courier_domain::entities::{Job, JobStatus, JobType};
use courier_domain::repositories::{JobRepository, JobStats, JobStatusUpdate, TypeCount};
use courier_errors::{CourierError, CourierResult};
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> CourierResult<Job> {
        let payload: String = row.try_get("payload")?;
        let payload = serde_json::from_str(&payload)
            .map_err(|e| CourierError::Serialization(format!("corrupt job payload: {e}")))?;

        let result: Option<String> = row.try_get("result")?;
        let result = match result {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| CourierError::Serialization(format!("corrupt job result: {e}")))?,
            ),
            None => None,
        };

        Ok(Job {
            id: row.try_get("id")?,
            job_type: row.try_get("job_type")?,
            payload,
            status: row.try_get("status")?,
            worker_id: row.try_get("worker_id")?,
            result,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, job_type, payload, status, worker_id, result, created_at, updated_at";

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create(&self, job: &Job) -> CourierResult<Job> {
        let payload = serde_json::to_string(&job.payload)?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_type, payload, status, worker_id, result, created_at, updated_at)
            VALUES ($1, $2, $3, NULL, NULL, $4, $4)
            "#,
        )
        .bind(job.job_type)
        .bind(payload)
        .bind(JobStatus::Pending)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let mut created = job.clone();
        created.id = result.last_insert_rowid();
        created.status = JobStatus::Pending;
        created.created_at = now;
        created.updated_at = now;

        debug!("created job {} ({})", created.id, created.job_type);
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: i64, update: &JobStatusUpdate) -> CourierResult<()> {
        let result = match &update.result {
            Some(value) => Some(serde_json::to_string(value)?),
            None => None,
        };

        // Idempotent setter: last writer wins, absent fields keep their
        // previous values.
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                worker_id = COALESCE($3, worker_id),
                result = COALESCE($4, result),
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.status)
        .bind(update.worker_id)
        .bind(result)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim_next_pending(&self, job_type: JobType) -> CourierResult<Option<Job>> {
        // Step one: oldest pending candidate.
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = $1 AND job_type = $2 ORDER BY id LIMIT 1"
        ))
        .bind(JobStatus::Pending)
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut job = Self::row_to_job(&row)?;

        // Step two: move to processing only if still pending
        // (compare-and-set).
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE jobs SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(job.id)
        .bind(JobStatus::Processing)
        .bind(now)
        .bind(JobStatus::Pending)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            // Lost the race: another worker already claimed it. Not an
            // error.
            debug!("lost claim race for job {}", job.id);
            return Ok(None);
        }

        job.status = JobStatus::Processing;
        job.updated_at = now;
        Ok(Some(job))
    }

    async fn stats(&self) -> CourierResult<JobStats> {
        let mut stats = JobStats::default();

        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        for row in rows {
            let status: JobStatus = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            stats.total += count;
            match status {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }

        let rows =
            sqlx::query("SELECT job_type, COUNT(*) AS count FROM jobs GROUP BY job_type ORDER BY job_type")
                .fetch_all(&self.pool)
                .await?;
        for row in rows {
            stats.by_type.push(TypeCount {
                job_type: row.try_get("job_type")?,
                count: row.try_get("count")?,
            });
        }

        Ok(stats)
    }
}

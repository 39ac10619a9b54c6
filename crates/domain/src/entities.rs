//! Domain entities.
//!
//! The core business model: jobs and worker nodes. Producers submit jobs
//! over HTTP and type-dedicated workers execute them; the entities
//! themselves carry no knowledge of storage or transport.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use courier_errors::CourierError;
use serde::{Deserialize, Serialize};

/// Job type (closed set).
///
/// A worker handles exactly one type for life. Wire and storage form are
/// the same lowercase strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobType {
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "whatsapp")]
    Whatsapp,
    #[serde(rename = "sms")]
    Sms,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "cronjob")]
    Cronjob,
}

impl JobType {
    pub const ALL: [JobType; 5] = [
        JobType::Email,
        JobType::Whatsapp,
        JobType::Sms,
        JobType::Notification,
        JobType::Cronjob,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Email => "email",
            JobType::Whatsapp => "whatsapp",
            JobType::Sms => "sms",
            JobType::Notification => "notification",
            JobType::Cronjob => "cronjob",
        }
    }

    /// Backlog list key for this type.
    pub fn backlog_key(&self) -> String {
        format!("jobs:{}", self.as_str())
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(JobType::Email),
            "whatsapp" => Ok(JobType::Whatsapp),
            "sms" => Ok(JobType::Sms),
            "notification" => Ok(JobType::Notification),
            "cronjob" => Ok(JobType::Cronjob),
            other => Err(CourierError::UnknownJobType(other.to_string())),
        }
    }
}

/// Job status.
///
/// The state machine is one-way: pending, then processing, then completed
/// or failed. Retrying a failed job is the producer's concern; the core
/// never moves failed back to pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker status: idle at rest, busy only while holding a claimed job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    #[serde(rename = "idle")]
    Idle,
    #[serde(rename = "busy")]
    Busy,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
        }
    }
}

impl FromStr for WorkerStatus {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            other => Err(CourierError::validation(format!(
                "Invalid worker status: {other}"
            ))),
        }
    }
}

// SQLx column codecs; the stored form matches the wire form.
impl sqlx::Type<sqlx::Sqlite> for JobType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<JobType>()
            .map_err(|_| format!("Invalid job type: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Sqlite> for JobStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for JobStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!("Invalid job status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for JobStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl sqlx::Type<sqlx::Sqlite> for WorkerStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <&str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for WorkerStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            _ => Err(format!("Invalid worker status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for WorkerStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// Job.
///
/// - `id`: assigned monotonically by the store, stable for life
/// - `payload`: non-empty JSON object from the producer, opaque to the core
/// - `result`: non-null only in the terminal states
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub worker_id: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New job awaiting admission; the store assigns the id.
    pub fn new(job_type: JobType, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            job_type,
            payload,
            status: JobStatus::Pending,
            worker_id: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, JobStatus::Pending)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Worker registry record.
///
/// The process handle is runtime state owned by the supervisor and is
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: i64,
    pub worker_type: JobType,
    pub status: WorkerStatus,
    pub is_active: bool,
    pub last_active: DateTime<Utc>,
}

impl Worker {
    /// New registration; the store assigns the id.
    pub fn new(worker_type: JobType) -> Self {
        Self {
            id: 0,
            worker_type,
            status: WorkerStatus::Idle,
            is_active: true,
            last_active: Utc::now(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.status, WorkerStatus::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_type_round_trips_through_str() {
        for t in JobType::ALL {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), t);
        }
    }

    #[test]
    fn job_type_rejects_unknown() {
        let err = "telegram".parse::<JobType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown job type: telegram");
    }

    #[test]
    fn job_type_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobType::Whatsapp).unwrap(),
            "\"whatsapp\""
        );
        let parsed: JobType = serde_json::from_str("\"sms\"").unwrap();
        assert_eq!(parsed, JobType::Sms);
    }

    #[test]
    fn backlog_key_is_per_type() {
        assert_eq!(JobType::Email.backlog_key(), "jobs:email");
        assert_eq!(JobType::Cronjob.backlog_key(), "jobs:cronjob");
    }

    #[test]
    fn new_job_starts_pending_without_result() {
        let job = Job::new(JobType::Sms, json!({"to": "+1"}));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.worker_id.is_none());
        assert!(job.result.is_none());
        assert!(!job.is_finished());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn new_worker_is_idle_and_active() {
        let worker = Worker::new(JobType::Whatsapp);
        assert!(worker.is_idle());
        assert!(worker.is_active);
        assert_eq!(worker.worker_type, JobType::Whatsapp);
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("job not found: {id}")]
    JobNotFound { id: i64 },
    #[error("worker not found: {id}")]
    WorkerNotFound { id: i64 },
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("{0}")]
    Validation(String),
    #[error("queue error: {0}")]
    Queue(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("send failed: {0}")]
    AdapterFailure(String),
    #[error("resource exhaustion: {0}")]
    ResourceExhausted(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("job execution error: {0}")]
    JobExecution(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type CourierResult<T> = Result<T, CourierError>;

impl CourierError {
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn worker_not_found(id: i64) -> Self {
        Self::WorkerNotFound { id }
    }
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn adapter<S: Into<String>>(msg: S) -> Self {
        Self::AdapterFailure(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Transient: log it and keep polling; job state is untouched.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Database(_) | CourierError::Queue(_) | CourierError::Network(_)
        )
    }

    /// Fatal: the worker process should exit nonzero and let the
    /// supervisor restart it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CourierError::Configuration(_) | CourierError::Internal(_)
        )
    }
}

impl From<serde_json::Error> for CourierError {
    fn from(err: serde_json::Error) -> Self {
        CourierError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for CourierError {
    fn from(err: anyhow::Error) -> Self {
        CourierError::Internal(err.to_string())
    }
}

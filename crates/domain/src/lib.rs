//! Domain layer.
//!
//! Core business model and ports of the job queue: entities, events,
//! repository interfaces and the queue transport interface. Nothing in
//! here depends on a concrete storage or messaging implementation.

pub mod entities;
pub mod events;
pub mod messaging;
pub mod repositories;
pub mod services;

pub use entities::{Job, JobStatus, JobType, Worker, WorkerStatus};
pub use events::{
    BacklogEntry, JobCompletedEvent, JobFailedEvent, JobNewEvent, QueueEvent, CHANNEL_JOB_COMPLETE,
    CHANNEL_JOB_FAILED, CHANNEL_JOB_NEW,
};
pub use messaging::JobQueue;
pub use repositories::{
    JobRepository, JobStats, JobStatusUpdate, TypeCount, WorkerRepository, WorkerStats,
};
pub use services::WorkerManager;

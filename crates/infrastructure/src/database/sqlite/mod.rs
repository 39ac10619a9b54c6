mod sqlite_job_repository;
mod sqlite_worker_repository;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_worker_repository::SqliteWorkerRepository;

//! Service ports.
//!
//! The coordinator's HTTP layer drives the worker supervisor through this
//! interface so the API crate never depends on process management; the
//! two sides share only this port and the repositories.

use async_trait::async_trait;
use courier_errors::CourierResult;

use crate::entities::JobType;

#[async_trait]
pub trait WorkerManager: Send + Sync {
    /// Register and start a new worker process, returning its id.
    async fn create_worker(&self, worker_type: JobType) -> CourierResult<i64>;

    /// Terminate a worker; returns whether a live process or registered
    /// record existed.
    async fn stop_worker(&self, worker_id: i64) -> CourierResult<bool>;

    /// Bring the pool of one type to `desired`: create the shortfall, or
    /// stop the surplus oldest-first. Not atomic with concurrent
    /// create/stop calls; callers serialize.
    async fn scale_workers(&self, worker_type: JobType, desired: usize) -> CourierResult<()>;

    /// Stop every known worker (called on process exit).
    async fn shutdown(&self) -> CourierResult<()>;
}

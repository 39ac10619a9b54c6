//! Queue transport port.
//!
//! Durable backlog (per-type FIFO list) plus pub/sub notification. The
//! backlog and the job store are two non-atomic writes; the system
//! tolerates transient divergence and the job store stays authoritative
//! for the lifecycle.

use async_trait::async_trait;
use courier_errors::CourierResult;
use tokio::sync::mpsc;

use crate::entities::JobType;
use crate::events::{BacklogEntry, JobCompletedEvent, JobFailedEvent, QueueEvent};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push onto `jobs:<type>` and publish a `job:new` notification for
    /// the type.
    async fn add_job(&self, entry: &BacklogEntry) -> CourierResult<()>;

    /// Pop the oldest entry of `jobs:<type>` (FIFO).
    async fn next_job(&self, job_type: JobType) -> CourierResult<Option<BacklogEntry>>;

    async fn publish_completed(&self, event: &JobCompletedEvent) -> CourierResult<()>;

    async fn publish_failed(&self, event: &JobFailedEvent) -> CourierResult<()>;

    /// Subscribe to the given channels; decoded events are pushed into
    /// the returned receiver. Implementations dedicate a subscription
    /// connection; dropping the receiver unsubscribes.
    async fn subscribe(&self, channels: &[&str]) -> CourierResult<mpsc::Receiver<QueueEvent>>;
}

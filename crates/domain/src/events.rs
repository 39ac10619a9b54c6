//! Queue events.
//!
//! Pub/sub channel names and event bodies. Bodies are camelCase JSON,
//! matching the coordinator's HTTP wire form.

use serde::{Deserialize, Serialize};

use crate::entities::JobType;

/// New-job notification channel (fanned out per type).
pub const CHANNEL_JOB_NEW: &str = "job:new";
/// Channel workers report successful completions on.
pub const CHANNEL_JOB_COMPLETE: &str = "worker:job-complete";
/// Channel workers report execution failures on.
pub const CHANNEL_JOB_FAILED: &str = "worker:job-failed";

/// `job:new` body: only the type travels; the job itself is claimed from
/// the job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobNewEvent {
    #[serde(rename = "type")]
    pub job_type: JobType,
}

/// `worker:job-complete` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedEvent {
    pub job_id: i64,
    pub worker_id: i64,
    pub result: serde_json::Value,
}

/// `worker:job-failed` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JobFailedEvent {
    pub job_id: i64,
    pub worker_id: i64,
    pub error: String,
}

/// An event as seen by a subscriber, already decoded per channel.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    JobNew(JobNewEvent),
    JobCompleted(JobCompletedEvent),
    JobFailed(JobFailedEvent),
}

impl QueueEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            QueueEvent::JobNew(_) => CHANNEL_JOB_NEW,
            QueueEvent::JobCompleted(_) => CHANNEL_JOB_COMPLETE,
            QueueEvent::JobFailed(_) => CHANNEL_JOB_FAILED,
        }
    }

    /// Decode an event from its channel name and raw JSON payload.
    /// Unknown channels yield None.
    pub fn decode(channel: &str, payload: &str) -> Option<QueueEvent> {
        match channel {
            CHANNEL_JOB_NEW => serde_json::from_str(payload).ok().map(QueueEvent::JobNew),
            CHANNEL_JOB_COMPLETE => serde_json::from_str(payload)
                .ok()
                .map(QueueEvent::JobCompleted),
            CHANNEL_JOB_FAILED => serde_json::from_str(payload)
                .ok()
                .map(QueueEvent::JobFailed),
            _ => None,
        }
    }
}

/// Backlog entry: one JSON-encoded element of the `jobs:<type>` list.
///
/// Only a hint that drives notification; the job store stays the source
/// of truth for the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacklogEntry {
    pub job_id: i64,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub payload: serde_json::Value,
}

//! Mock implementations of the domain ports.
//!
//! Plain `std::sync::Mutex` state: the critical sections never await, and
//! tests stay free of database or Redis dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use courier_domain::entities::{Job, JobStatus, JobType, Worker, WorkerStatus};
use courier_domain::events::{
    BacklogEntry, JobCompletedEvent, JobFailedEvent, JobNewEvent, QueueEvent,
};
use courier_domain::messaging::JobQueue;
use courier_domain::repositories::{
    JobRepository, JobStats, JobStatusUpdate, TypeCount, WorkerRepository, WorkerStats,
};
use courier_domain::services::WorkerManager;
use courier_errors::{CourierError, CourierResult};
use tokio::sync::{broadcast, mpsc};

#[derive(Clone)]
pub struct MockJobRepository {
    jobs: Arc<Mutex<HashMap<i64, Job>>>,
    next_id: Arc<Mutex<i64>>,
    fail_next: Arc<Mutex<bool>>,
}

impl MockJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            fail_next: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        let mock = Self::new();
        {
            let mut map = mock.jobs.lock().unwrap();
            let mut next_id = mock.next_id.lock().unwrap();
            for job in jobs {
                *next_id = (*next_id).max(job.id + 1);
                map.insert(job.id, job);
            }
        }
        mock
    }

    /// Make the next repository call return a database-flavored error.
    pub fn fail_next_call(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    fn check_failure(&self) -> CourierResult<()> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(CourierError::internal("injected repository failure"));
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn get(&self, id: i64) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }
}

impl Default for MockJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MockJobRepository {
    async fn create(&self, job: &Job) -> CourierResult<Job> {
        self.check_failure()?;
        let mut jobs = self.jobs.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = job.clone();
        created.id = *next_id;
        *next_id += 1;
        jobs.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Job>> {
        self.check_failure()?;
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn update_status(&self, id: i64, update: &JobStatusUpdate) -> CourierResult<()> {
        self.check_failure()?;
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.get_mut(&id) {
            job.status = update.status;
            if let Some(worker_id) = update.worker_id {
                job.worker_id = Some(worker_id);
            }
            if let Some(result) = &update.result {
                job.result = Some(result.clone());
            }
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn claim_next_pending(&self, job_type: JobType) -> CourierResult<Option<Job>> {
        self.check_failure()?;
        let mut jobs = self.jobs.lock().unwrap();
        let candidate = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.job_type == job_type)
            .min_by_key(|j| j.id)
            .map(|j| j.id);

        Ok(candidate.map(|id| {
            let job = jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Processing;
            job.updated_at = Utc::now();
            job.clone()
        }))
    }

    async fn stats(&self) -> CourierResult<JobStats> {
        self.check_failure()?;
        let jobs = self.jobs.lock().unwrap();
        let mut stats = JobStats {
            total: jobs.len() as i64,
            ..JobStats::default()
        };
        let mut by_type: HashMap<JobType, i64> = HashMap::new();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            *by_type.entry(job.job_type).or_default() += 1;
        }
        stats.by_type = JobType::ALL
            .iter()
            .filter_map(|t| {
                by_type.get(t).map(|count| TypeCount {
                    job_type: *t,
                    count: *count,
                })
            })
            .collect();
        Ok(stats)
    }
}

#[derive(Clone)]
pub struct MockWorkerRepository {
    workers: Arc<Mutex<HashMap<i64, Worker>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockWorkerRepository {
    pub fn new() -> Self {
        Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    pub fn with_workers(workers: Vec<Worker>) -> Self {
        let mock = Self::new();
        {
            let mut map = mock.workers.lock().unwrap();
            let mut next_id = mock.next_id.lock().unwrap();
            for worker in workers {
                *next_id = (*next_id).max(worker.id + 1);
                map.insert(worker.id, worker);
            }
        }
        mock
    }

    pub fn get(&self, id: i64) -> Option<Worker> {
        self.workers.lock().unwrap().get(&id).cloned()
    }
}

impl Default for MockWorkerRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkerRepository for MockWorkerRepository {
    async fn create(&self, worker: &Worker) -> CourierResult<Worker> {
        let mut workers = self.workers.lock().unwrap();
        let mut next_id = self.next_id.lock().unwrap();

        let mut created = worker.clone();
        created.id = *next_id;
        *next_id += 1;
        workers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> CourierResult<Option<Worker>> {
        Ok(self.workers.lock().unwrap().get(&id).cloned())
    }

    async fn list_active(&self) -> CourierResult<Vec<Worker>> {
        let mut active: Vec<Worker> = self
            .workers
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|w| w.id);
        Ok(active)
    }

    async fn list_active_by_type(&self, worker_type: JobType) -> CourierResult<Vec<Worker>> {
        Ok(self
            .list_active()
            .await?
            .into_iter()
            .filter(|w| w.worker_type == worker_type)
            .collect())
    }

    async fn update_status(&self, id: i64, status: WorkerStatus) -> CourierResult<()> {
        let mut workers = self.workers.lock().unwrap();
        if let Some(worker) = workers.get_mut(&id) {
            worker.status = status;
            worker.last_active = Utc::now();
        }
        Ok(())
    }

    async fn set_active(&self, id: i64, active: bool) -> CourierResult<()> {
        let mut workers = self.workers.lock().unwrap();
        if let Some(worker) = workers.get_mut(&id) {
            worker.is_active = active;
            worker.last_active = Utc::now();
        }
        Ok(())
    }

    async fn stats(&self) -> CourierResult<WorkerStats> {
        let workers = self.workers.lock().unwrap();
        let mut stats = WorkerStats::default();
        let mut by_type: HashMap<JobType, i64> = HashMap::new();
        for worker in workers.values().filter(|w| w.is_active) {
            stats.total += 1;
            match worker.status {
                WorkerStatus::Idle => stats.idle += 1,
                WorkerStatus::Busy => stats.busy += 1,
            }
            *by_type.entry(worker.worker_type).or_default() += 1;
        }
        stats.by_type = by_type
            .into_iter()
            .map(|(job_type, count)| TypeCount { job_type, count })
            .collect();
        Ok(stats)
    }
}

/// Queue double: records backlog pushes and published events, and lets a
/// test inject events toward subscribers.
pub struct MockJobQueue {
    added: Mutex<Vec<BacklogEntry>>,
    backlogs: Mutex<HashMap<JobType, Vec<BacklogEntry>>>,
    completed: Mutex<Vec<JobCompletedEvent>>,
    failed: Mutex<Vec<JobFailedEvent>>,
    events_tx: broadcast::Sender<QueueEvent>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            added: Mutex::new(Vec::new()),
            backlogs: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            failed: Mutex::new(Vec::new()),
            events_tx,
        }
    }

    pub fn added_entries(&self) -> Vec<BacklogEntry> {
        self.added.lock().unwrap().clone()
    }

    pub fn completed_events(&self) -> Vec<JobCompletedEvent> {
        self.completed.lock().unwrap().clone()
    }

    pub fn failed_events(&self) -> Vec<JobFailedEvent> {
        self.failed.lock().unwrap().clone()
    }

    /// Push an event to current subscribers, as if it arrived over pub/sub.
    pub fn emit(&self, event: QueueEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Default for MockJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for MockJobQueue {
    async fn add_job(&self, entry: &BacklogEntry) -> CourierResult<()> {
        self.added.lock().unwrap().push(entry.clone());
        self.backlogs
            .lock()
            .unwrap()
            .entry(entry.job_type)
            .or_default()
            .push(entry.clone());
        let _ = self.events_tx.send(QueueEvent::JobNew(JobNewEvent {
            job_type: entry.job_type,
        }));
        Ok(())
    }

    async fn next_job(&self, job_type: JobType) -> CourierResult<Option<BacklogEntry>> {
        let mut backlogs = self.backlogs.lock().unwrap();
        Ok(backlogs.get_mut(&job_type).and_then(|entries| {
            if entries.is_empty() {
                None
            } else {
                Some(entries.remove(0))
            }
        }))
    }

    async fn publish_completed(&self, event: &JobCompletedEvent) -> CourierResult<()> {
        self.completed.lock().unwrap().push(event.clone());
        let _ = self.events_tx.send(QueueEvent::JobCompleted(event.clone()));
        Ok(())
    }

    async fn publish_failed(&self, event: &JobFailedEvent) -> CourierResult<()> {
        self.failed.lock().unwrap().push(event.clone());
        let _ = self.events_tx.send(QueueEvent::JobFailed(event.clone()));
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> CourierResult<mpsc::Receiver<QueueEvent>> {
        let wanted: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        let mut events_rx = self.events_tx.subscribe();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Ok(event) = events_rx.recv().await {
                if !wanted.iter().any(|c| c == event.channel()) {
                    continue;
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}

/// Worker manager double for API handler tests.
#[derive(Default)]
pub struct MockWorkerManager {
    next_id: AtomicI64,
    created: Mutex<Vec<JobType>>,
    stopped: Mutex<Vec<i64>>,
    scaled: Mutex<Vec<(JobType, usize)>>,
    known_workers: Mutex<Vec<i64>>,
}

impl MockWorkerManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Ids `stop_worker` will report as known.
    pub fn with_known_workers(ids: Vec<i64>) -> Self {
        let manager = Self::new();
        *manager.known_workers.lock().unwrap() = ids;
        manager
    }

    pub fn created_types(&self) -> Vec<JobType> {
        self.created.lock().unwrap().clone()
    }

    pub fn stopped_ids(&self) -> Vec<i64> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn scale_calls(&self) -> Vec<(JobType, usize)> {
        self.scaled.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerManager for MockWorkerManager {
    async fn create_worker(&self, worker_type: JobType) -> CourierResult<i64> {
        self.created.lock().unwrap().push(worker_type);
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn stop_worker(&self, worker_id: i64) -> CourierResult<bool> {
        self.stopped.lock().unwrap().push(worker_id);
        Ok(self.known_workers.lock().unwrap().contains(&worker_id))
    }

    async fn scale_workers(&self, worker_type: JobType, desired: usize) -> CourierResult<()> {
        self.scaled.lock().unwrap().push((worker_type, desired));
        Ok(())
    }

    async fn shutdown(&self) -> CourierResult<()> {
        Ok(())
    }
}

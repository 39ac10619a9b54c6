//! Worker runtime: a per-process polling loop dedicated to one job type,
//! with a closed union of typed executors (email, messaging, webhook,
//! script). Workers reach the coordinator only over its HTTP API and the
//! queue transport: no shared code paths.

pub mod coordinator_client;
pub mod executors;
pub mod service;

pub use coordinator_client::CoordinatorClient;
pub use executors::JobExecutor;
pub use service::WorkerService;

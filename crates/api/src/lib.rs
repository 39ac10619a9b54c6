//! HTTP surface of the dispatch coordinator.
//!
//! JSON in, JSON out. Producers create jobs, workers claim and report
//! through the same API; the registry and scaling endpoints delegate to
//! the worker supervisor behind the `WorkerManager` port.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod validation;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

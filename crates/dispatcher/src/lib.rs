//! Coordinator-side lifecycle services: the completion-event state
//! listener and the worker process supervisor. Workers never link this
//! crate; both sides meet only at the queue transport and the HTTP API.

pub mod state_listener;
pub mod supervisor;

pub use state_listener::StateListener;
pub use supervisor::WorkerSupervisor;

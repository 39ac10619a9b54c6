//! courier: a persistent multi-type job queue.
//!
//! The root crate only assembles: configuration loading, CLI, signal
//! handling, graceful shutdown, and the component wiring for the
//! coordinator and worker run modes.

pub mod app;
pub mod common;
pub mod shutdown;

pub use app::{AppMode, Application};
pub use shutdown::ShutdownManager;

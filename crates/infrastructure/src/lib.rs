//! Infrastructure layer.
//!
//! Concrete implementations of the domain ports: SQLite repositories,
//! the Redis queue transport and rate-limiter script, and an in-memory
//! queue for tests and embedded deployments.

pub mod database;
pub mod in_memory_queue;
pub mod redis_queue;

pub use database::sqlite::{SqliteJobRepository, SqliteWorkerRepository};
pub use database::{create_pool, create_pool_with_options, init_schema};
pub use in_memory_queue::InMemoryJobQueue;
pub use redis_queue::{RateDecision, RateLimiter, RedisConnectionManager, RedisJobQueue};

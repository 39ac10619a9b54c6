//! Application configuration.
//!
//! Typed sections with defaults, overridable from the environment. Reading
//! happens once at startup; components receive the sections they own.

mod models;

pub use models::{
    AppConfig, DatabaseConfig, EmailConfig, MessagingConfig, RedisConfig, ScriptConfig,
    ServerConfig, WebhookConfig, WorkerPoolConfig,
};

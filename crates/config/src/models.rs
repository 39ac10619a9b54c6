use std::env;
use std::path::PathBuf;

use courier_errors::{CourierError, CourierResult};
use serde::{Deserialize, Serialize};

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Primary SQLite store (jobs + workers tables). Written only by the
    /// coordinator process.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "courier.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub connect_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            connect_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl RedisConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/", password, self.host, self.port),
            None => format!("redis://{}:{}/", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Seeded per type when the registry is empty at supervisor init.
    pub initial_workers_per_type: usize,
    /// Upper bound accepted by the scale endpoint.
    pub max_workers_per_type: usize,
    pub poll_interval_ms: u64,
    /// Worker executable spawned by the supervisor. Defaults to a
    /// `courier-worker` sibling of the current executable.
    pub worker_binary: Option<PathBuf>,
    /// Coordinator base URL used by worker processes.
    pub coordinator_url: String,
    /// Email health probe cadence while degraded.
    pub health_check_interval_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            initial_workers_per_type: 1,
            max_workers_per_type: 10,
            poll_interval_ms: 1000,
            worker_binary: None,
            coordinator_url: "http://127.0.0.1:3000".to_string(),
            health_check_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub sms_url: Option<String>,
    pub notification_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// External SMTP settings DB, keyed by module with a Global fallback.
    pub config_db_path: String,
    /// External SMTP send-log DB.
    pub log_db_path: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            config_db_path: "smtp-config.db".to_string(),
            log_db_path: "smtp-log.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Primary HTTP gateway base URL.
    pub gateway_url: String,
    /// Pause before each send, overridable per job.
    pub send_delay_ms: u64,
    /// Bearer-credentialed secondary gateway.
    pub fallback_url: Option<String>,
    pub fallback_token: Option<String>,
    /// Token bucket guarding the secondary gateway quota.
    pub rate_limit_bucket: String,
    pub rate_limit_max_tokens: i64,
    pub rate_limit_refill_per_sec: f64,
    pub rate_limit_key_expiry_secs: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8080".to_string(),
            send_delay_ms: 500,
            fallback_url: None,
            fallback_token: None,
            rate_limit_bucket: "messaging:fallback".to_string(),
            rate_limit_max_tokens: 10,
            rate_limit_refill_per_sec: 5.0,
            rate_limit_key_expiry_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Fixed directory for named scripts; absolute payload paths bypass it.
    pub scripts_dir: String,
    /// External task-scheduler DB maintained by the script runner.
    pub scheduler_db_path: String,
    pub cpu_threshold_percent: f64,
    pub memory_threshold_percent: f64,
    pub resource_check_interval_ms: u64,
    pub resource_check_retries: u32,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            scripts_dir: "scripts".to_string(),
            scheduler_db_path: "task-scheduler.db".to_string(),
            cpu_threshold_percent: 80.0,
            memory_threshold_percent: 85.0,
            resource_check_interval_ms: 5000,
            resource_check_retries: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub workers: WorkerPoolConfig,
    pub webhooks: WebhookConfig,
    pub email: EmailConfig,
    pub messaging: MessagingConfig,
    pub scripts: ScriptConfig,
}

impl AppConfig {
    /// Defaults overridden by the environment. Loading mechanics beyond
    /// plain variables (dotfiles, secret stores) are an operator concern.
    pub fn from_env() -> CourierResult<Self> {
        let config = Self {
            server: ServerConfig {
                host: env_string("SERVER_HOST", "0.0.0.0"),
                port: env_parse("SERVER_PORT", 3000),
            },
            database: DatabaseConfig {
                path: env_string("COURIER_DB_PATH", "courier.db"),
            },
            redis: RedisConfig {
                host: env_string("REDIS_HOST", "127.0.0.1"),
                port: env_parse("REDIS_PORT", 6379),
                password: env_opt("REDIS_PASSWORD"),
                ..RedisConfig::default()
            },
            workers: WorkerPoolConfig {
                initial_workers_per_type: env_parse("INITIAL_WORKERS_PER_TYPE", 1),
                max_workers_per_type: env_parse("MAX_WORKERS_PER_TYPE", 10),
                poll_interval_ms: env_parse("WORKER_POLL_INTERVAL_MS", 1000),
                worker_binary: env_opt("WORKER_BINARY").map(PathBuf::from),
                coordinator_url: env_string("COORDINATOR_URL", "http://127.0.0.1:3000"),
                health_check_interval_ms: env_parse("HEALTH_CHECK_INTERVAL_MS", 30_000),
            },
            webhooks: WebhookConfig {
                sms_url: env_opt("SMS_WEBHOOK_URL"),
                notification_url: env_opt("NOTIFICATION_WEBHOOK_URL"),
            },
            email: EmailConfig {
                config_db_path: env_string("SMTP_CONFIG_DB_PATH", "smtp-config.db"),
                log_db_path: env_string("SMTP_LOG_DB_PATH", "smtp-log.db"),
            },
            messaging: MessagingConfig {
                gateway_url: env_string("MESSAGING_GATEWAY_URL", "http://127.0.0.1:8080"),
                send_delay_ms: env_parse("MESSAGING_SEND_DELAY_MS", 500),
                fallback_url: env_opt("MESSAGING_FALLBACK_URL"),
                fallback_token: env_opt("MESSAGING_FALLBACK_TOKEN"),
                ..MessagingConfig::default()
            },
            scripts: ScriptConfig {
                scripts_dir: env_string("SCRIPTS_DIR", "scripts"),
                scheduler_db_path: env_string("TASK_SCHEDULER_DB_PATH", "task-scheduler.db"),
                cpu_threshold_percent: env_parse("CPU_THRESHOLD_PERCENT", 80.0),
                memory_threshold_percent: env_parse("MEMORY_THRESHOLD_PERCENT", 85.0),
                resource_check_interval_ms: env_parse("RESOURCE_CHECK_INTERVAL_MS", 5000),
                resource_check_retries: env_parse("RESOURCE_CHECK_RETRIES", 10),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CourierResult<()> {
        if self.server.port == 0 {
            return Err(CourierError::config("server port must be non-zero"));
        }
        if self.database.path.trim().is_empty() {
            return Err(CourierError::config("database path must not be empty"));
        }
        if self.workers.max_workers_per_type == 0 {
            return Err(CourierError::config("max workers per type must be >= 1"));
        }
        if self.workers.initial_workers_per_type > self.workers.max_workers_per_type {
            return Err(CourierError::config(
                "initial workers per type exceeds the per-type maximum",
            ));
        }
        if self.messaging.rate_limit_max_tokens <= 0 {
            return Err(CourierError::config("rate limit capacity must be positive"));
        }
        if !(0.0..=100.0).contains(&self.scripts.cpu_threshold_percent)
            || !(0.0..=100.0).contains(&self.scripts.memory_threshold_percent)
        {
            return Err(CourierError::config(
                "resource thresholds are percentages in [0, 100]",
            ));
        }
        Ok(())
    }
}

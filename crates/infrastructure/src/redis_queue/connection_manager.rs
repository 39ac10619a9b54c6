use std::time::Duration;

use courier_config::RedisConfig;
use courier_errors::{CourierError, CourierResult};
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Redis connection manager.
///
/// Holds the client and one multiplexed command connection; subscribers
/// open their own dedicated connection on demand.
pub struct RedisConnectionManager {
    client: Client,
    connection: MultiplexedConnection,
    config: RedisConfig,
}

impl RedisConnectionManager {
    pub async fn new(config: RedisConfig) -> CourierResult<Self> {
        let client = Client::open(config.connection_url())
            .map_err(|e| CourierError::queue(format!("failed to create redis client: {e}")))?;

        let connection = Self::connect_with_retry(&client, &config).await?;
        debug!("connected to redis at {}:{}", config.host, config.port);

        Ok(Self {
            client,
            connection,
            config,
        })
    }

    async fn connect_with_retry(
        client: &Client,
        config: &RedisConfig,
    ) -> CourierResult<MultiplexedConnection> {
        let mut last_error = None;

        for attempt in 0..config.connect_retries {
            match client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    if attempt > 0 {
                        debug!("connected to redis after {} attempts", attempt + 1);
                    }
                    return Ok(conn);
                }
                Err(e) => {
                    if attempt < config.connect_retries - 1 {
                        warn!(
                            "redis connect failed (attempt {}/{}): {e}; retrying in {}ms",
                            attempt + 1,
                            config.connect_retries,
                            config.retry_delay_ms
                        );
                        sleep(Duration::from_millis(config.retry_delay_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(CourierError::queue(format!(
            "failed to connect to redis after {} attempts: {}",
            config.connect_retries,
            last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string())
        )))
    }

    /// Command connection; cheap to clone, each caller keeps its own.
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// Open a dedicated pub/sub connection for a subscriber.
    pub async fn pubsub(&self) -> CourierResult<redis::aio::PubSub> {
        self.client
            .get_async_pubsub()
            .await
            .map_err(|e| CourierError::queue(format!("failed to open pub/sub connection: {e}")))
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}

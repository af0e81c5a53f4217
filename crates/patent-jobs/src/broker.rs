//! Message broker seam and its Redis reliable-queue implementation.
//!
//! Producers `LPUSH` job bodies onto the consume queue. A consumer moves each
//! body atomically into its own processing list (`BRPOPLPUSH`) so that a crash
//! between receive and acknowledgement leaves the message recoverable.
//! Acknowledging removes it from the processing list; a requeueing nack moves
//! it back to the tail of the consume queue so it is delivered next.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use patent_core::{defaults, Error, Result};

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Local identifier for log correlation; not part of the message.
    pub id: Uuid,
    pub body: Vec<u8>,
}

impl Delivery {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7(),
            body,
        }
    }
}

/// At-least-once message transport used by the upload worker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Wait up to `wait` for the next delivery.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>>;

    /// Settle a delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Settle a delivery as failed, returning it to the queue when `requeue`.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Publish a message on the outbound queue.
    async fn publish(&self, body: &[u8]) -> Result<()>;
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub url: String,
    pub consume_queue: String,
    pub publish_queue: String,
    /// Names this consumer's processing list.
    pub consumer_id: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: defaults::BROKER_URL.to_string(),
            consume_queue: defaults::BROKER_CONSUME_QUEUE.to_string(),
            publish_queue: defaults::BROKER_PUBLISH_QUEUE.to_string(),
            consumer_id: defaults::BROKER_CONSUMER_ID.to_string(),
        }
    }
}

impl BrokerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `BROKER_URL` | `redis://localhost:6379` | Redis URL |
    /// | `BROKER_CONSUME_QUEUE` | `patent:upload` | Inbound job queue |
    /// | `BROKER_PUBLISH_QUEUE` | `patent:upload:done` | Completion queue |
    /// | `BROKER_CONSUMER_ID` | `patent-upload` | Processing list suffix |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("BROKER_URL").unwrap_or(defaults.url),
            consume_queue: std::env::var("BROKER_CONSUME_QUEUE").unwrap_or(defaults.consume_queue),
            publish_queue: std::env::var("BROKER_PUBLISH_QUEUE").unwrap_or(defaults.publish_queue),
            consumer_id: std::env::var("BROKER_CONSUMER_ID").unwrap_or(defaults.consumer_id),
        }
    }

    /// List holding this consumer's unacknowledged deliveries.
    pub fn processing_list(&self) -> String {
        format!("{}:processing:{}", self.consume_queue, self.consumer_id)
    }
}

fn broker_error(context: &str, e: RedisError) -> Error {
    Error::Broker(format!("{}: {}", context, e))
}

/// Redis-backed [`MessageBroker`].
///
/// Blocking receives run on their own connection so they never stall
/// acknowledgements and publishes multiplexed on the other.
#[derive(Clone)]
pub struct RedisBroker {
    config: BrokerConfig,
    processing: String,
    receiver: ConnectionManager,
    commands: ConnectionManager,
}

impl RedisBroker {
    /// Connect and return any deliveries a previous run left unacknowledged
    /// to the consume queue.
    pub async fn connect(config: BrokerConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| Error::Config(format!("invalid BROKER_URL: {}", e)))?;
        let receiver = client
            .get_connection_manager()
            .await
            .map_err(|e| broker_error("connect", e))?;
        let commands = client
            .get_connection_manager()
            .await
            .map_err(|e| broker_error("connect", e))?;

        let broker = Self {
            processing: config.processing_list(),
            config,
            receiver,
            commands,
        };

        let recovered = broker.recover().await?;
        info!(
            subsystem = "jobs",
            component = "broker",
            consume_queue = %broker.config.consume_queue,
            publish_queue = %broker.config.publish_queue,
            recovered,
            "Connected to broker"
        );
        Ok(broker)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Move every entry of the processing list back onto the consume queue.
    pub async fn recover(&self) -> Result<usize> {
        let mut conn = self.commands.clone();
        let mut moved = 0;
        loop {
            let entry: Option<Vec<u8>> = redis::cmd("RPOPLPUSH")
                .arg(&self.processing)
                .arg(&self.config.consume_queue)
                .query_async(&mut conn)
                .await
                .map_err(|e| broker_error("recover", e))?;
            if entry.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            warn!(
                subsystem = "jobs",
                component = "broker",
                result_count = moved,
                "Requeued unacknowledged deliveries from previous run"
            );
        }
        Ok(moved)
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>> {
        let mut conn = self.receiver.clone();
        let body: Option<Vec<u8>> = redis::cmd("BRPOPLPUSH")
            .arg(&self.config.consume_queue)
            .arg(&self.processing)
            .arg(wait.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_error("receive", e))?;

        Ok(body.map(|body| {
            let delivery = Delivery::new(body);
            debug!(delivery_id = %delivery.id, bytes = delivery.body.len(), "Received delivery");
            delivery
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut conn = self.commands.clone();
        let _: () = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(delivery.body.as_slice())
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_error("ack", e))?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let mut conn = self.commands.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(delivery.body.as_slice())
            .ignore();
        if requeue {
            pipe.cmd("RPUSH")
                .arg(&self.config.consume_queue)
                .arg(delivery.body.as_slice())
                .ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_error("nack", e))?;
        Ok(())
    }

    async fn publish(&self, body: &[u8]) -> Result<()> {
        let mut conn = self.commands.clone();
        let _: () = redis::cmd("LPUSH")
            .arg(&self.config.publish_queue)
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| broker_error("publish", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_config_default() {
        let config = BrokerConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.consume_queue, "patent:upload");
        assert_eq!(config.publish_queue, "patent:upload:done");
    }

    #[test]
    fn test_processing_list_name() {
        let config = BrokerConfig {
            consumer_id: "worker-a".into(),
            ..Default::default()
        };
        assert_eq!(config.processing_list(), "patent:upload:processing:worker-a");
    }

    #[test]
    fn test_delivery_ids_unique() {
        let a = Delivery::new(b"x".to_vec());
        let b = Delivery::new(b"x".to_vec());
        assert_ne!(a.id, b.id);
        assert_eq!(a.body, b.body);
    }
}

//! # Notification Bus
//!
//! Thin at-most-once publish/subscribe fan-out that decouples "something happened" from
//! "an email must be sent".
//!
//! - [`NotificationBus::publish`] serializes with `serde_json` and logs, never returns, errors.
//! - [`NotificationBus::subscribe`] spawns a listener that invokes a [`BusHandler`] once per
//!   message. No acknowledgement, no redelivery; a message published while nobody listens is
//!   lost.
//!
//! ## Transports
//!
//! - [`RedisTransport`]: Redis pub/sub, with a reconnecting subscriber task.
//! - [`LocalTransport`]: in-process broadcast, used without Redis and in tests.

mod email;
mod local;
mod redis_transport;


pub use email::EmailRelay;
pub use local::LocalTransport;
pub use redis_transport::RedisTransport;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Per-subscription buffer between the transport and the handler task.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus transport error: {0}")]
    Transport(String),

    #[error("bus serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for BusError {
    fn from(err: redis::RedisError) -> Self {
        BusError::Transport(err.to_string())
    }
}

/// Broker connection used by the bus.
#[async_trait]
pub trait BusTransport: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError>;

    /// Start receiving raw payloads for `topic`. Delivery stops when the receiver is dropped.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, BusError>;
}

/// Consumer of one topic's messages.
#[async_trait]
pub trait BusHandler<T>: Send + Sync {
    async fn handle(&self, message: T) -> Result<(), String>;
}

#[derive(Clone)]
pub struct NotificationBus {
    transport: Arc<dyn BusTransport>,
}

impl NotificationBus {
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self { transport }
    }

    /// In-process bus.
    pub fn local() -> Self {
        Self::new(Arc::new(LocalTransport::new()))
    }

    /// Redis pub/sub when a URL is configured, otherwise the in-process transport.
    pub async fn connect(redis_url: Option<&str>) -> Result<Self, BusError> {
        match redis_url {
            Some(url) => {
                let client = redis::Client::open(url)?;
                let transport = RedisTransport::connect(client).await?;
                tracing::info!("[BUS] Using Redis pub/sub");
                Ok(Self::new(Arc::new(transport)))
            }
            None => {
                tracing::warn!("[BUS] REDIS_URL not set, using in-process bus");
                Ok(Self::local())
            }
        }
    }

    /// Fire-and-forget publish. Returns whether the broker accepted the message.
    pub async fn publish<T: Serialize>(&self, topic: &str, payload: &T) -> bool {
        let payload = match serde_json::to_string(payload) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(topic, error = %e, "[BUS] Failed to serialize payload");
                return false;
            }
        };

        match self.transport.publish(topic, payload).await {
            Ok(()) => {
                tracing::debug!(topic, "[BUS] Published");
                true
            }
            Err(e) => {
                tracing::error!(topic, error = %e, "[BUS] Failed to publish");
                false
            }
        }
    }

    /// Spawn a listener invoking `handler` once per message on `topic`.
    ///
    /// Malformed payloads and handler errors are logged and skipped.
    pub async fn subscribe<T>(
        &self,
        topic: &str,
        handler: Arc<dyn BusHandler<T>>,
    ) -> Result<JoinHandle<()>, BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut rx = self.transport.subscribe(topic).await?;
        let topic = topic.to_string();
        tracing::info!(topic = %topic, "[BUS] Subscribed");

        Ok(tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let message: T = match serde_json::from_str(&raw) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(topic = %topic, error = %e, "[BUS] Dropping malformed message");
                        continue;
                    }
                };
                if let Err(e) = handler.handle(message).await {
                    tracing::error!(topic = %topic, error = %e, "[BUS] Handler failed");
                }
            }
            tracing::info!(topic = %topic, "[BUS] Subscription closed");
        }))
    }
}

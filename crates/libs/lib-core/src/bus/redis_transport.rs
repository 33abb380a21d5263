use super::{BusError, BusTransport, SUBSCRIPTION_BUFFER};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use tokio::sync::mpsc;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Redis pub/sub transport. Publishing shares a managed connection; every subscription
/// owns a dedicated pub/sub connection and reconnects on failure.
#[derive(Clone)]
pub struct RedisTransport {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisTransport {
    pub async fn connect(client: redis::Client) -> Result<Self, BusError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl BusTransport for RedisTransport {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let client = self.client.clone();
        let topic = topic.to_string();

        tokio::spawn(async move {
            while !tx.is_closed() {
                let mut pubsub = match client.get_async_pubsub().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "[BUS] Pub/Sub connection failed, retrying in 5s");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        continue;
                    }
                };

                if let Err(e) = pubsub.subscribe(topic.as_str()).await {
                    tracing::error!(error = %e, topic = %topic, "[BUS] Subscribe failed, retrying in 5s");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }

                let mut stream = pubsub.on_message();
                while let Some(msg) = stream.next().await {
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(error = %e, "[BUS] Unreadable payload");
                            continue;
                        }
                    };
                    // At-most-once: a slow handler loses messages instead of stalling Redis.
                    match tx.try_send(payload) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!(topic = %topic, "[BUS] Subscriber buffer full, message dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }

                tracing::warn!(topic = %topic, "[BUS] Pub/Sub stream ended, reconnecting");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        Ok(rx)
    }
}

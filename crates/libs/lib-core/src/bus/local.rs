use super::{BusError, BusTransport, SUBSCRIPTION_BUFFER};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};

/// In-process transport: one broadcast channel per topic.
#[derive(Default)]
pub struct LocalTransport {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl BusTransport for LocalTransport {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), BusError> {
        // No subscribers is not an error: the message is simply lost.
        let _ = self.sender(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<String>, BusError> {
        let mut source = self.sender(topic).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "[BUS] Local subscriber lagged, messages lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}

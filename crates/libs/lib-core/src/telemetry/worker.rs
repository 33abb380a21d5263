use super::{TelemetryReceiver, TelemetryRecord, TelemetryStats};
use crate::model::kv::StoreError;
use crate::model::store::models::LogProxyForCreate;
use crate::model::store::{DbPool, TelemetryRepository};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Durable destination for telemetry rows.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn persist(&self, row: LogProxyForCreate) -> Result<(), StoreError>;
}

/// `log_proxies` table in the gateway database.
pub struct SqliteTelemetryStore {
    pool: DbPool,
}

impl SqliteTelemetryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for SqliteTelemetryStore {
    async fn persist(&self, row: LogProxyForCreate) -> Result<(), StoreError> {
        TelemetryRepository::insert(&self.pool, &row)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

/// Single consumer of the telemetry queue.
pub struct TelemetryWorker {
    receiver: TelemetryReceiver,
    store: Arc<dyn TelemetryStore>,
}

impl TelemetryWorker {
    pub fn new(receiver: TelemetryReceiver, store: Arc<dyn TelemetryStore>) -> Self {
        Self { receiver, store }
    }

    /// Consume until `shutdown` becomes `true` (or its sender is dropped), or until every
    /// sink is dropped. On shutdown the queue is closed and records already buffered are
    /// still persisted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let TelemetryWorker { mut receiver, store } = self;
        let stats = receiver.stats.clone();
        tracing::info!("[TELEMETRY] Worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = receiver.rx.recv() => match next {
                    Some(record) => persist(store.as_ref(), &stats, record).await,
                    None => {
                        tracing::info!("[TELEMETRY] All sinks dropped, worker exiting");
                        return;
                    }
                },
            }
        }

        receiver.rx.close();
        let mut drained = 0usize;
        while let Some(record) = receiver.rx.recv().await {
            persist(store.as_ref(), &stats, record).await;
            drained += 1;
        }
        tracing::info!(drained, "[TELEMETRY] Worker stopped");
    }
}

async fn persist(store: &dyn TelemetryStore, stats: &TelemetryStats, record: TelemetryRecord) {
    let path = record.path.clone();
    match store.persist(record.into_row()).await {
        Ok(()) => stats.record_written(),
        Err(e) => {
            stats.record_failed();
            tracing::error!(error = %e, path = %path, "[TELEMETRY] Failed to persist record, discarding");
        }
    }
}

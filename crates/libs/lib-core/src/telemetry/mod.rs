//! # Telemetry Sink
//!
//! Best-effort, non-blocking pipeline that persists one [`TelemetryRecord`] per proxied or
//! rejected request.
//!
//! ## Flow
//!
//! ```text
//! request task ──try_send──▶ bounded queue ──▶ TelemetryWorker ──▶ TelemetryStore (SQLite)
//!                 (drop when full)              (single consumer)
//! ```
//!
//! - [`TelemetrySink::write`] never awaits. A full queue drops the record and bumps a counter.
//! - One [`TelemetryWorker`] drains the queue, so records are persisted in arrival order.
//! - Store failures are logged and the record is discarded (no retry).
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use lib_core::telemetry::*;
//! # async fn example(store: std::sync::Arc<dyn TelemetryStore>) {
//! let (sink, receiver) = TelemetrySink::channel(1000);
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let worker = tokio::spawn(TelemetryWorker::new(receiver, store).run(shutdown_rx));
//!
//! sink.write(TelemetryRecord::new("GET", "/svc/items"));
//!
//! let _ = shutdown_tx.send(true);
//! let _ = worker.await;
//! # }
//! ```

mod record;
mod worker;


pub use record::{binary_marker, truncate_body, Level, TelemetryRecord};
pub use worker::{SqliteTelemetryStore, TelemetryStore, TelemetryWorker};

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// region: --- Stats

#[derive(Debug, Default)]
pub struct TelemetryStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub enqueued: u64,
    pub dropped: u64,
    pub written: u64,
    pub failed: u64,
}

impl TelemetryStats {
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

// endregion: --- Stats

// region: --- Sink

/// Producer side. Cheap to clone; one per request task is fine.
#[derive(Clone)]
pub struct TelemetrySink {
    tx: mpsc::Sender<TelemetryRecord>,
    stats: Arc<TelemetryStats>,
}

/// Consumer side, owned by the [`TelemetryWorker`].
pub struct TelemetryReceiver {
    rx: mpsc::Receiver<TelemetryRecord>,
    stats: Arc<TelemetryStats>,
}

impl TelemetrySink {
    /// Create a bounded queue of `capacity` records (minimum 1).
    pub fn channel(capacity: usize) -> (TelemetrySink, TelemetryReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(TelemetryStats::default());
        (
            TelemetrySink {
                tx,
                stats: stats.clone(),
            },
            TelemetryReceiver { rx, stats },
        )
    }

    /// Enqueue without waiting. Returns `false` when the record was dropped.
    pub fn write(&self, record: TelemetryRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::warn!(dropped, path = %record.path, "[TELEMETRY] Queue full, dropping records");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> TelemetrySnapshot {
        self.stats.snapshot()
    }
}

// endregion: --- Sink

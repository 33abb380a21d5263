//! Dispatcher counters, exposed on `/metrics`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DispatchCounters {
    total: AtomicU64,
    forwarded: AtomicU64,
    rejected: AtomicU64,
    unmatched: AtomicU64,
    upstream_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub total: u64,
    pub forwarded: u64,
    pub rejected: u64,
    pub unmatched: u64,
    pub upstream_failures: u64,
}

/// How one dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forwarded,
    Rejected,
    Unmatched,
    UpstreamFailure,
}

impl DispatchCounters {
    pub fn record(&self, outcome: Outcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Forwarded => &self.forwarded,
            Outcome::Rejected => &self.rejected,
            Outcome::Unmatched => &self.unmatched,
            Outcome::UpstreamFailure => &self.upstream_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            total: self.total.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_add_up_to_total() {
        let counters = DispatchCounters::default();
        counters.record(Outcome::Forwarded);
        counters.record(Outcome::Forwarded);
        counters.record(Outcome::Rejected);
        counters.record(Outcome::UpstreamFailure);

        let snap = counters.snapshot();
        assert_eq!(snap.total, 4);
        assert_eq!(snap.forwarded, 2);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.unmatched, 0);
        assert_eq!(snap.upstream_failures, 1);
    }
}

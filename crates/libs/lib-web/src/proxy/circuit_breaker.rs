//! # Circuit Breaker
//!
//! Per-upstream circuit breaker. Stops sending requests to an upstream that keeps failing.
//!
//! States:
//! - Closed: normal operation, requests pass through
//! - Open: upstream is failing, requests are rejected immediately
//! - Half-Open: the open period elapsed, requests pass to test recovery
//!
//! Transport errors, timeouts and 5xx responses count as failures.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,
    /// Successes in half-open needed to close the circuit again.
    pub success_threshold: u32,
    /// Time an open circuit rejects requests before trying half-open.
    pub open_duration: Duration,
}

#[derive(Debug, Error)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open")]
    CircuitOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker for one upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Ok` when the request may proceed. An open circuit whose period elapsed moves to
    /// half-open here.
    pub fn allow_request(&self) -> Result<(), CircuitBreakerError> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed());
                if elapsed.is_some_and(|e| e >= self.config.open_duration) {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!("[CIRCUIT] Transitioning to half-open");
                    Ok(())
                } else {
                    Err(CircuitBreakerError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.opened_at = None;
                    tracing::info!("[CIRCUIT] Closed after successful recovery");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "[CIRCUIT] Opened due to failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.success_count = 0;
                tracing::warn!("[CIRCUIT] Reopened after failure in half-open state");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}

// region: --- Registry

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub upstream: String,
    pub state: CircuitState,
    pub failures: u32,
}

/// One breaker per upstream base URL, created on first use.
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, upstream: &str) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
            if let Some(breaker) = breakers.get(upstream) {
                return breaker.clone();
            }
        }

        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers
            .entry(upstream.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config)))
            .clone()
    }

    /// Drop breakers for upstreams no longer in `live`.
    pub fn retain_live(&self, live: &HashSet<&str>) {
        let mut breakers = self.breakers.write().unwrap_or_else(|p| p.into_inner());
        breakers.retain(|upstream, _| live.contains(upstream.as_str()));
    }

    /// State of every known upstream, sorted by URL.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(|p| p.into_inner());
        let mut out: Vec<CircuitSnapshot> = breakers
            .iter()
            .map(|(upstream, breaker)| CircuitSnapshot {
                upstream: upstream.clone(),
                state: breaker.state(),
                failures: breaker.failure_count(),
            })
            .collect();
        out.sort_by(|a, b| a.upstream.cmp(&b.upstream));
        out
    }
}

// endregion: --- Registry

#[cfg(test)]
mod tests {
    use super::*;

    fn config(open_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            open_duration: Duration::from_millis(open_ms),
        }
    }

    #[test]
    fn test_opens_after_threshold_and_fails_fast() {
        let breaker = CircuitBreaker::new(config(60_000));
        for _ in 0..2 {
            breaker.record_failure();
            assert!(breaker.allow_request().is_ok());
        }
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow_request().is_err());
    }

    #[test]
    fn test_success_resets_failure_count_when_closed() {
        let breaker = CircuitBreaker::new(config(60_000));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[test]
    fn test_half_open_recovers_after_successes() {
        let breaker = CircuitBreaker::new(config(10));
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(20));

        assert!(breaker.allow_request().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(10));
        for _ in 0..3 {
            breaker.record_failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow_request().is_ok());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow_request().is_err());
    }

    #[test]
    fn test_registry_shares_breaker_per_upstream() {
        let breakers = CircuitBreakers::new(config(60_000));
        let a = breakers.get("http://a");
        for _ in 0..3 {
            a.record_failure();
        }
        assert_eq!(breakers.get("http://a").state(), CircuitState::Open);
        assert_eq!(breakers.get("http://b").state(), CircuitState::Closed);

        let snapshot = breakers.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].upstream, "http://a");
        assert_eq!(snapshot[0].state, CircuitState::Open);
    }

    #[test]
    fn test_retain_live_drops_retired_upstreams() {
        let breakers = CircuitBreakers::new(config(60_000));
        breakers.get("http://a");
        breakers.get("http://b");

        breakers.retain_live(&HashSet::from(["http://b"]));

        let snapshot = breakers.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].upstream, "http://b");
    }
}

//! Out-of-band upstream health probe.

use super::RouteTableHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Periodically `GET`s every upstream base URL and records the result in
/// `last_health_status`. The flag is advisory; dispatching never reads it.
pub struct HealthProbe {
    handle: Arc<RouteTableHandle>,
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new(handle: Arc<RouteTableHandle>, client: reqwest::Client) -> Self {
        Self { handle, client }
    }

    /// Probe every entry of the current snapshot once.
    ///
    /// Returns `false` when a reload happened meanwhile and the results were discarded.
    pub async fn probe_once(&self) -> bool {
        let snapshot = self.handle.current();

        let mut statuses = Vec::with_capacity(snapshot.len());
        for entry in snapshot.entries() {
            let healthy = match self
                .client
                .get(&entry.upstream_base_url)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) => !resp.status().is_server_error(),
                Err(_) => false,
            };
            if !healthy {
                tracing::warn!(path = %entry.path_prefix, url = %entry.upstream_base_url, "[ROUTES] Upstream unhealthy");
            }
            statuses.push(healthy);
        }

        self.handle.apply_health(snapshot.version(), &statuses)
    }

    /// Run until `shutdown` flips to `true`.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !self.probe_once().await {
                            tracing::debug!("[ROUTES] Health results discarded, table changed during probe");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("[ROUTES] Health probe stopped");
        })
    }
}

//! # Reverse Proxy
//!
//! Every request that no gateway endpoint claims lands in [`dispatch`]:
//!
//! ```text
//! match route ──▶ guard chain ──▶ capture body ──▶ forward (deadline, circuit) ──▶ relay
//!      │               │                                   │
//!      └── 400/404     └── 401/403                         └── 502
//! ```
//!
//! Each outcome, including rejections and unmatched paths, produces exactly one telemetry
//! record once the response is ready. A client that disconnects first drops the request
//! future and no record is written.

mod circuit_breaker;
mod metrics;
mod upstream;


pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakers, CircuitSnapshot, CircuitState,
};
pub use metrics::{DispatchCounters, DispatchSnapshot, Outcome};
pub use upstream::{capture_request, Forwarded, Payload, UpstreamClient, UpstreamError};

use crate::middleware::{Guards, RequestStamp};
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use lib_core::telemetry::{TelemetryRecord, TelemetrySink};
use lib_core::routes::has_dot_segment;
use lib_core::{AppError, RouteTableHandle};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Dispatcher {
    routes: Arc<RouteTableHandle>,
    guards: Guards,
    upstream: UpstreamClient,
    telemetry: TelemetrySink,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTableHandle>,
        guards: Guards,
        upstream: UpstreamClient,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            routes,
            guards,
            upstream,
            telemetry,
            counters: DispatchCounters::default(),
        }
    }

    pub fn counters(&self) -> DispatchSnapshot {
        self.counters.snapshot()
    }

    /// Breaker state for upstreams in the current route table. Breakers of upstreams removed
    /// by a reload are dropped here.
    pub fn circuits(&self) -> Vec<CircuitSnapshot> {
        let table = self.routes.current();
        let live: HashSet<&str> = table
            .entries()
            .iter()
            .map(|entry| entry.upstream_base_url.as_str())
            .collect();
        let breakers = self.upstream.breakers();
        breakers.retain_live(&live);
        breakers.snapshot()
    }

    pub async fn handle(&self, stamp: RequestStamp, req: Request) -> Response {
        let start = Instant::now();
        let path = req.uri().path().to_string();

        let mut record = TelemetryRecord::new(req.method().as_str(), &path);
        record.request_id = Some(stamp.id.clone());

        // Dot segments are resolved by the URL parser after matching, escaping the route.
        if has_dot_segment(&path) {
            let err = AppError::InvalidInput("invalid path".to_string());
            record.error = Some("dot segment in path".to_string());
            return self.finish(record, start, Outcome::Rejected, err.into_response());
        }

        let Some(entry) = self.routes.match_path(&path) else {
            let err = AppError::NotFound("Not Found Services".to_string());
            record.error = Some("no matching route".to_string());
            return self.finish(record, start, Outcome::Unmatched, err.into_response());
        };
        record.service = entry.upstream_base_url.clone();

        let (parts, body) = req.into_parts();

        let principal = match self.guards.check(&entry, &parts.method, &parts.headers).await {
            Ok(principal) => principal,
            Err(err) => {
                record.error = Some(err.to_string());
                return self.finish(record, start, Outcome::Rejected, err.into_response());
            }
        };
        record.principal = principal.map(|p| p.id_account);

        let payload = match capture_request(&parts.headers, body, self.upstream.body_limit()).await {
            Ok((payload, summary)) => {
                record.request_body = summary;
                payload
            }
            Err(err) => {
                record.error = Some(err.to_string());
                return self.finish(record, start, Outcome::Rejected, err.into_response());
            }
        };

        match self.upstream.forward(&entry, &parts, payload, &stamp).await {
            Ok(mut forwarded) => {
                record.response_body = std::mem::take(&mut forwarded.body_summary);
                record.content_type = forwarded.content_type.take();
                info!(
                    request_id = %stamp.id,
                    upstream = %entry.upstream_base_url,
                    status = forwarded.status.as_u16(),
                    "[PROXY] {} {} forwarded",
                    parts.method,
                    path
                );
                self.finish(record, start, Outcome::Forwarded, forwarded.into_response())
            }
            Err(err) => {
                warn!(
                    request_id = %stamp.id,
                    upstream = %entry.upstream_base_url,
                    error = %err,
                    "[PROXY] {} {} failed",
                    parts.method,
                    path
                );
                record.error = Some(err.to_string());
                let err = AppError::from(err);
                self.finish(record, start, Outcome::UpstreamFailure, err.into_response())
            }
        }
    }

    fn finish(
        &self,
        mut record: TelemetryRecord,
        start: Instant,
        outcome: Outcome,
        response: Response,
    ) -> Response {
        record = record.status(response.status().as_u16());
        record.duration = start.elapsed();
        self.counters.record(outcome);
        self.telemetry.write(record);
        response
    }
}

/// Fallback handler: proxy anything the gateway itself does not serve.
pub async fn dispatch(
    State(dispatcher): State<Arc<Dispatcher>>,
    stamp: RequestStamp,
    req: Request,
) -> Response {
    dispatcher.handle(stamp, req).await
}

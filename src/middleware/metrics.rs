//! Prometheus HTTP metrics per request.
//!
//! Labels use the matched route template (`/v1/me`), never the raw path.
//! Infrastructure paths (`/health`, `/metrics`) are not recorded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::{self, Next},
    response::Response,
};
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

pub const DEFAULT_SKIP_PATHS: &[&str] = &["/health", "/metrics"];

const LABELS: &[&str] = &["method", "path", "status"];
const DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Clone)]
pub struct HttpMetrics {
    requests_total: IntCounterVec,
    request_duration: HistogramVec,
    in_flight: IntGauge,
    errors_total: IntCounterVec,
    skip_paths: Arc<HashSet<String>>,
}

impl HttpMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            LABELS,
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            LABELS,
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let in_flight = IntGauge::new(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
        )?;
        registry.register(Box::new(in_flight.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("http_errors_total", "Total number of HTTP errors (4xx and 5xx)"),
            &["method", "path", "status", "error_type"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        Ok(Self {
            requests_total,
            request_duration,
            in_flight,
            errors_total,
            skip_paths: Arc::new(DEFAULT_SKIP_PATHS.iter().map(|p| p.to_string()).collect()),
        })
    }

    fn record(&self, method: &str, path: &str, status: u16, elapsed_secs: f64) {
        let status_label = status.to_string();
        let labels = [method, path, status_label.as_str()];

        self.requests_total.with_label_values(&labels).inc();
        self.request_duration
            .with_label_values(&labels)
            .observe(elapsed_secs);

        if status >= 400 {
            self.errors_total
                .with_label_values(&[method, path, status_label.as_str(), error_type(status)])
                .inc();
        }
    }
}

fn error_type(status: u16) -> &'static str {
    match status {
        500..=u16::MAX => "server_error",
        404 => "not_found",
        401 => "unauthorized",
        403 => "forbidden",
        400 => "bad_request",
        429 => "rate_limited",
        _ => "client_error",
    }
}

/// Record metrics for every route of `router`. Apply outside the access
/// middleware so rejected requests are counted too.
pub fn apply<S>(router: Router<S>, metrics: HttpMetrics) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(metrics, track))
}

async fn track(State(metrics): State<HttpMetrics>, req: Request<Body>, next: Next) -> Response {
    if metrics.skip_paths.contains(req.uri().path()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    metrics.in_flight.inc();
    let started = Instant::now();
    let res = next.run(req).await;
    metrics.in_flight.dec();

    metrics.record(
        &method,
        &path,
        res.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_error_statuses() {
        assert_eq!(error_type(503), "server_error");
        assert_eq!(error_type(401), "unauthorized");
        assert_eq!(error_type(403), "forbidden");
        assert_eq!(error_type(422), "client_error");
    }

    #[test]
    fn records_requests_and_errors() {
        let registry = Registry::new();
        let metrics = HttpMetrics::new(&registry).unwrap();

        metrics.record("GET", "/v1/me", 200, 0.01);
        metrics.record("GET", "/v1/me", 401, 0.002);

        assert_eq!(
            metrics
                .requests_total
                .with_label_values(&["GET", "/v1/me", "200"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .errors_total
                .with_label_values(&["GET", "/v1/me", "401", "unauthorized"])
                .get(),
            1
        );
        assert_eq!(metrics.in_flight.get(), 0);
    }
}

/*
 * Responsibility
 * - Own the Prometheus registry (HTTP metrics + auth metrics)
 * - Render the text exposition format for GET /metrics
 */
use std::sync::Arc;

use prometheus::{Encoder, Registry, TextEncoder};

use crate::middleware::metrics::HttpMetrics;
use crate::services::auth::{AuthClient, AuthMetrics};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    http: HttpMetrics,
}

impl Metrics {
    pub fn new(auth: Arc<AuthClient>) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let http = HttpMetrics::new(&registry)?;
        registry.register(Box::new(AuthMetrics::new(auth)?))?;

        Ok(Self { registry, http })
    }

    pub fn http(&self) -> HttpMetrics {
        self.http.clone()
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

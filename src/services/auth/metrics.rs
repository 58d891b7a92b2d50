//! Prometheus view of `AuthStats` and the circuit breaker.
//!
//! Values are read from the client at scrape time, so `AuthStats` stays the
//! single source of truth for `/health` and `/metrics`.
use std::collections::HashMap;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, IntGauge, Opts};

use crate::services::auth::AuthClient;
use crate::services::auth::breaker::CircuitState;
use crate::services::auth::stats::AuthStatsSnapshot;

pub const NAMESPACE: &str = "edugo_mobile";

const COUNTERS: &[(&str, &str)] = &[
    ("auth_cache_hits_total", "Token verdicts served from cache"),
    ("auth_cache_misses_total", "Token cache lookups that missed"),
    ("auth_local_validations_total", "Tokens validated with the shared secret"),
    ("auth_remote_calls_total", "Calls made to the identity service"),
    ("auth_remote_failures_total", "Identity service calls that failed transiently"),
    ("auth_breaker_rejections_total", "Remote validations refused by the circuit breaker"),
];

const BREAKER_STATE: (&str, &str) = (
    "auth_circuit_breaker_state",
    "Circuit breaker state (0=closed, 1=open, 2=half_open)",
);

fn counter_values(s: &AuthStatsSnapshot) -> [u64; 6] {
    [
        s.cache_hits,
        s.cache_misses,
        s.local_validations,
        s.remote_calls,
        s.remote_failures,
        s.breaker_rejections,
    ]
}

fn state_value(state: CircuitState) -> i64 {
    match state {
        CircuitState::Closed => 0,
        CircuitState::Open => 1,
        CircuitState::HalfOpen => 2,
    }
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE)
}

pub struct AuthMetrics {
    client: Arc<AuthClient>,
    descs: Vec<Desc>,
}

impl AuthMetrics {
    pub fn new(client: Arc<AuthClient>) -> Result<Self, prometheus::Error> {
        let descs = COUNTERS
            .iter()
            .chain(std::iter::once(&BREAKER_STATE))
            .map(|(name, help)| {
                Desc::new(
                    format!("{NAMESPACE}_{name}"),
                    help.to_string(),
                    Vec::new(),
                    HashMap::new(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { client, descs })
    }

    fn families(&self) -> Result<Vec<MetricFamily>, prometheus::Error> {
        let snapshot = self.client.stats().snapshot();
        let mut families = Vec::with_capacity(self.descs.len());

        for ((name, help), value) in COUNTERS.iter().zip(counter_values(&snapshot)) {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value);
            families.extend(counter.collect());
        }

        let (name, help) = BREAKER_STATE;
        let gauge = IntGauge::with_opts(opts(name, help))?;
        gauge.set(state_value(self.client.circuit_state()));
        families.extend(gauge.collect());

        Ok(families)
    }
}

impl Collector for AuthMetrics {
    fn desc(&self) -> Vec<&Desc> {
        self.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.families().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to collect auth metrics");
            Vec::new()
        })
    }
}

pub mod breaker;
pub mod cache;
pub mod client;
pub mod factory;
pub mod local;
pub mod metrics;
pub mod principal;
pub mod remote;
pub mod stats;

pub use breaker::{BreakerError, BreakerSettings, CircuitBreaker, CircuitState, TripPolicy};
pub use cache::{TokenCache, fingerprint};
pub use client::{AuthClient, AuthClientConfig, TokenValidator, ValidationError};
pub use factory::build_auth_client;
pub use local::LocalValidator;
pub use metrics::AuthMetrics;
pub use principal::{ActiveContext, FailureKind, Principal};
pub use remote::{RemoteError, RemoteValidator};
pub use stats::{AuthStats, AuthStatsSnapshot};

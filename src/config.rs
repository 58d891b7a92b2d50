/*
 * Responsibility
 * - Load settings from the environment (listen address, CORS, auth client, cache backend)
 * - Validate values (fail startup on anything missing or malformed)
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::services::auth::{AuthClientConfig, BreakerSettings, TripPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Where validated tokens are cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Valkey { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,

    pub auth: AuthClientConfig,
    pub cache_backend: CacheBackend,
    /// Paths the access middleware lets through without a token.
    pub skip_paths: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match get("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 8080,
        };
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(get("APP_ENV"));

        let cors_allowed_origins = split_list(get("CORS_ALLOWED_ORIGINS"));
        let request_timeout =
            duration_var(&get, "HTTP_REQUEST_TIMEOUT", Duration::from_secs(30))?;

        let defaults = AuthClientConfig::default();
        let breaker_defaults = BreakerSettings::default();

        let jwt_secret = get("AUTH_JWT_SECRET")
            .or_else(|| get("JWT_SECRET"))
            .unwrap_or_default();
        let jwt_issuer = get("AUTH_JWT_ISSUER").unwrap_or(defaults.jwt_issuer);

        let base_url = get("AUTH_API_ADMIN_BASE_URL").unwrap_or_default();
        if !base_url.is_empty() {
            url::Url::parse(&base_url)
                .map_err(|_| ConfigError::Invalid("AUTH_API_ADMIN_BASE_URL"))?;
        }

        let remote_enabled = bool_var(&get, "AUTH_API_ADMIN_REMOTE_ENABLED", false)?;
        let fallback_enabled = bool_var(&get, "AUTH_API_ADMIN_FALLBACK_ENABLED", false)?;
        let cache_enabled = bool_var(&get, "AUTH_API_ADMIN_CACHE_ENABLED", false)?;
        let timeout = duration_var(&get, "AUTH_API_ADMIN_TIMEOUT", defaults.timeout)?;
        let cache_ttl = duration_var(&get, "AUTH_API_ADMIN_CACHE_TTL", defaults.cache_ttl)?;

        let max_requests = match get("AUTH_CIRCUIT_BREAKER_MAX_REQUESTS") {
            Some(v) => match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid("AUTH_CIRCUIT_BREAKER_MAX_REQUESTS")),
            },
            None => breaker_defaults.max_requests,
        };
        let interval = duration_var(
            &get,
            "AUTH_CIRCUIT_BREAKER_INTERVAL",
            breaker_defaults.interval,
        )?;
        let breaker_timeout = duration_var(
            &get,
            "AUTH_CIRCUIT_BREAKER_TIMEOUT",
            breaker_defaults.timeout,
        )?;
        let failure_threshold = match get("AUTH_CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
            Some(v) => match v.parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::Invalid("AUTH_CIRCUIT_BREAKER_FAILURE_THRESHOLD")),
            },
            None => 5,
        };
        let trip_policy = match get("AUTH_CIRCUIT_BREAKER_TRIP_POLICY")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("consecutive") => TripPolicy::ConsecutiveFailures(failure_threshold),
            Some("ratio") => TripPolicy::ratio_default(),
            Some(_) => return Err(ConfigError::Invalid("AUTH_CIRCUIT_BREAKER_TRIP_POLICY")),
        };

        let cache_backend = match get("AUTH_CACHE_BACKEND")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("memory") => CacheBackend::Memory,
            Some("valkey") | Some("redis") => CacheBackend::Valkey {
                url: get("VALKEY_URL").ok_or(ConfigError::Missing("VALKEY_URL"))?,
            },
            Some(_) => return Err(ConfigError::Invalid("AUTH_CACHE_BACKEND")),
        };

        let skip_paths = match get("AUTH_SKIP_PATHS") {
            Some(v) => split_list(Some(v)),
            None => vec!["/health".to_string(), "/metrics".to_string()],
        };

        let auth = AuthClientConfig {
            jwt_secret,
            jwt_issuer,
            base_url,
            remote_enabled,
            fallback_enabled,
            timeout,
            cache_enabled,
            cache_ttl,
            circuit_breaker: BreakerSettings {
                name: breaker_defaults.name,
                max_requests,
                interval,
                timeout: breaker_timeout,
                trip_policy,
            },
        };

        let has_validator =
            !auth.jwt_secret.is_empty() || (auth.remote_enabled && !auth.base_url.is_empty());
        if app_env.is_production() && !has_validator {
            return Err(ConfigError::Missing("AUTH_JWT_SECRET"));
        }

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            request_timeout,
            auth,
            cache_backend,
            skip_paths,
        })
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn bool_var<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key)),
    }
}

fn duration_var<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => parse_duration(&v)
            .filter(|d| !d.is_zero())
            .ok_or(ConfigError::Invalid(key)),
    }
}

/// Human-readable duration (`500ms`, `5s`, `1m30s`, `1h`); a bare number is seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok().map(Duration::from_secs);
    }
    humantime::parse_duration(value).ok()
}

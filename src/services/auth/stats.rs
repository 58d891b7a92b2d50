use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide validation counters. Writers are the `AuthClient` only;
/// everyone else reads through `snapshot()`.
#[derive(Debug, Default)]
pub struct AuthStats {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    local_validations: AtomicU64,
    remote_calls: AtomicU64,
    remote_failures: AtomicU64,
    breaker_rejections: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuthStatsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub local_validations: u64,
    pub remote_calls: u64,
    pub remote_failures: u64,
    pub breaker_rejections: u64,
}

impl AuthStats {
    pub(crate) fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn local_validation(&self) {
        self.local_validations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remote_call(&self) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn breaker_rejection(&self) {
        self.breaker_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AuthStatsSnapshot {
        AuthStatsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            local_validations: self.local_validations.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            breaker_rejections: self.breaker_rejections.load(Ordering::Relaxed),
        }
    }
}

//! Three-state circuit breaker guarding the remote validator.
//!
//! State and counters live behind one mutex that is never held across an
//! `.await`. Each closed interval or state change starts a new generation;
//! results reported for an older generation are ignored.

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }
}

/// When a closed breaker opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TripPolicy {
    /// Open after this many consecutive failures.
    ConsecutiveFailures(u32),
    /// Open once `requests >= min_requests` and `failures / requests >= ratio`.
    FailureRatio { min_requests: u32, ratio: f64 },
}

impl TripPolicy {
    pub fn ratio_default() -> Self {
        Self::FailureRatio {
            min_requests: 3,
            ratio: 0.6,
        }
    }

    fn ready_to_trip(&self, counts: &Counts) -> bool {
        match *self {
            Self::ConsecutiveFailures(threshold) => counts.consecutive_failures >= threshold.max(1),
            Self::FailureRatio {
                min_requests,
                ratio,
            } => {
                counts.requests >= min_requests
                    && counts.requests > 0
                    && f64::from(counts.total_failures) / f64::from(counts.requests) >= ratio
            }
        }
    }
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self::ConsecutiveFailures(5)
    }
}

#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub name: String,
    /// Probe calls admitted while half-open.
    pub max_requests: u32,
    /// Counter reset window while closed. Zero never resets.
    pub interval: Duration,
    /// Open -> half-open delay.
    pub timeout: Duration,
    pub trip_policy: TripPolicy,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            name: "auth-service".to_string(),
            max_requests: 3,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            trip_policy: TripPolicy::default(),
        }
    }
}

/// Errors from `CircuitBreaker::execute`.
///
/// `Open` and `TooManyRequests` are produced by the breaker itself and mean
/// the guarded call never ran.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit-open")]
    Open,
    #[error("too-many-requests")]
    TooManyRequests,
    #[error("{0}")]
    Call(E),
}

impl<E> BreakerError<E> {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Open | Self::TooManyRequests)
    }
}

pub type StateChangeFn = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

type Transition = (CircuitState, CircuitState);

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    on_state_change: Option<StateChangeFn>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    pub fn new(mut settings: BreakerSettings) -> Self {
        let defaults = BreakerSettings::default();
        if settings.max_requests == 0 {
            settings.max_requests = defaults.max_requests;
        }
        if settings.timeout.is_zero() {
            settings.timeout = defaults.timeout;
        }

        let now = Instant::now();
        let expiry = (!settings.interval.is_zero()).then(|| now + settings.interval);

        Self {
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry,
            }),
            on_state_change: None,
        }
    }

    /// Register a callback fired on every transition, after the internal lock
    /// is released. It must return quickly.
    pub fn with_state_change(mut self, callback: StateChangeFn) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    pub fn state(&self) -> CircuitState {
        let (state, transitions) = {
            let mut inner = self.inner.lock();
            let mut transitions = Vec::new();
            let state = self.current_state(&mut inner, Instant::now(), &mut transitions);
            (state, transitions)
        };
        self.notify(transitions);
        state
    }

    pub fn counts(&self) -> Counts {
        let mut inner = self.inner.lock();
        let mut transitions = Vec::new();
        self.current_state(&mut inner, Instant::now(), &mut transitions);
        let counts = inner.counts;
        drop(inner);
        self.notify(transitions);
        counts
    }

    /// Run `f` unless the breaker rejects it.
    ///
    /// `Ok` results count as successes and `Err` results as failures. A call
    /// whose future is dropped before completing counts as a failure.
    pub async fn execute<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let generation = self.before_request::<E>()?;
        let mut guard = CallGuard {
            breaker: self,
            generation,
            done: false,
        };

        let result = f().await;
        guard.done = true;
        self.after_request(generation, result.is_ok());

        result.map_err(BreakerError::Call)
    }

    fn before_request<E>(&self) -> Result<u64, BreakerError<E>> {
        let mut transitions = Vec::new();
        let outcome = {
            let mut inner = self.inner.lock();
            let state = self.current_state(&mut inner, Instant::now(), &mut transitions);

            match state {
                CircuitState::Open => Err(BreakerError::Open),
                CircuitState::HalfOpen if inner.counts.requests >= self.settings.max_requests => {
                    Err(BreakerError::TooManyRequests)
                }
                _ => {
                    inner.counts.on_request();
                    Ok(inner.generation)
                }
            }
        };
        self.notify(transitions);
        outcome
    }

    fn after_request(&self, before: u64, success: bool) {
        let mut transitions = Vec::new();
        {
            let mut inner = self.inner.lock();
            let now = Instant::now();
            let state = self.current_state(&mut inner, now, &mut transitions);
            if inner.generation != before {
                drop(inner);
                self.notify(transitions);
                return;
            }

            if success {
                inner.counts.on_success();
                if state == CircuitState::HalfOpen {
                    self.set_state(&mut inner, CircuitState::Closed, now, &mut transitions);
                }
            } else {
                inner.counts.on_failure();
                match state {
                    CircuitState::Closed => {
                        if self.settings.trip_policy.ready_to_trip(&inner.counts) {
                            self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                        }
                    }
                    CircuitState::HalfOpen => {
                        self.set_state(&mut inner, CircuitState::Open, now, &mut transitions);
                    }
                    CircuitState::Open => {}
                }
            }
        }
        self.notify(transitions);
    }

    fn current_state(
        &self,
        inner: &mut Inner,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) -> CircuitState {
        match inner.state {
            CircuitState::Closed => {
                if matches!(inner.expiry, Some(expiry) if expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            CircuitState::Open => {
                if matches!(inner.expiry, Some(expiry) if expiry <= now) {
                    self.set_state(inner, CircuitState::HalfOpen, now, transitions);
                }
            }
            CircuitState::HalfOpen => {}
        }
        inner.state
    }

    fn set_state(
        &self,
        inner: &mut Inner,
        to: CircuitState,
        now: Instant,
        transitions: &mut Vec<Transition>,
    ) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        self.new_generation(inner, now);
        transitions.push((from, to));
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation = inner.generation.wrapping_add(1);
        inner.counts = Counts::default();
        inner.expiry = match inner.state {
            CircuitState::Closed => {
                (!self.settings.interval.is_zero()).then(|| now + self.settings.interval)
            }
            CircuitState::Open => Some(now + self.settings.timeout),
            CircuitState::HalfOpen => None,
        };
    }

    fn notify(&self, transitions: Vec<Transition>) {
        for (from, to) in transitions {
            if let Some(callback) = &self.on_state_change {
                callback(&self.settings.name, from, to);
            }
        }
    }
}

/// Records a failure when a guarded call is dropped mid-flight.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    done: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker.after_request(self.generation, false);
        }
    }
}

/// Default state-change callback: log the transition.
pub fn log_state_change() -> StateChangeFn {
    Arc::new(|name: &str, from: CircuitState, to: CircuitState| {
        tracing::warn!(circuit = %name, %from, %to, "circuit breaker state changed");
    })
}

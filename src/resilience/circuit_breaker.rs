//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: backend assumed down, calls fail fast
//! - Half-Open: a limited number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: on the first call after reset_timeout has elapsed
//! Half-Open → Closed: max_half_open_probes successful probes
//! Half-Open → Open: any probe fails (reset_timeout restarts)
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), one mutex per breaker
//! - Half-open admission counts probes admitted since entering Half-Open;
//!   calls beyond the budget are rejected like Open
//! - Outcomes of calls admitted under an earlier state are discarded
//! - Cancelled and locally rejected calls neither succeed nor fail; a
//!   probe that ends that way returns its slot

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::schema::CircuitBreakerConfig;
use crate::error::{RefineError, RefineResult};
use crate::observability::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a breaker, for operators and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub backend_id: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub half_open_probe_count: u32,
    pub last_failure_at: Option<Instant>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    half_open_probe_count: u32,
    last_failure_at: Option<Instant>,
    /// Bumped on every transition so stale outcomes can be recognized.
    generation: u64,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_probe_count: 0,
            last_failure_at: None,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
    probe: bool,
}

enum Outcome {
    Success,
    Failure,
    Neutral,
}

/// A single backend's circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend_id: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// A zero threshold or probe budget is raised to one; a half-open breaker
    /// with no probe slots could never leave half-open.
    pub fn new(backend_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let config = CircuitBreakerConfig {
            failure_threshold: config.failure_threshold.max(1),
            max_half_open_probes: config.max_half_open_probes.max(1),
            ..config
        };
        Self {
            backend_id: backend_id.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Stored state. An Open breaker whose timeout elapsed still reports Open
    /// until the next call moves it to Half-Open.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            backend_id: self.backend_id.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            half_open_probe_count: inner.half_open_probe_count,
            last_failure_at: inner.last_failure_at,
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        self.transition(&mut inner, BreakerState::Closed);
        inner.last_failure_at = None;
        tracing::info!(backend_id = %self.backend_id, from = %previous, "Circuit breaker manually reset");
    }

    /// Run `operation` if the breaker admits it, recording the outcome.
    ///
    /// Rejections return [`RefineError::CircuitOpen`] without invoking
    /// `operation`. Only [`RefineError::Backend`] counts as a failure.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> RefineResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefineResult<T>>,
    {
        let admission = self.try_acquire()?;
        let mut guard = AdmissionGuard {
            breaker: self,
            admission: Some(admission),
        };

        let result = operation().await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.counts_as_backend_failure() => Outcome::Failure,
            Err(_) => Outcome::Neutral,
        };
        if let Some(admission) = guard.admission.take() {
            self.record(admission, outcome);
        }
        result
    }

    fn try_acquire(&self) -> RefineResult<Admission> {
        let mut inner = self.lock();

        if inner.state == BreakerState::Open {
            let elapsed = inner
                .last_failure_at
                .map(|at| Instant::now().saturating_duration_since(at))
                .unwrap_or_default();
            if elapsed >= self.config.reset_timeout() {
                self.transition(&mut inner, BreakerState::HalfOpen);
            }
        }

        let state = inner.state;
        match state {
            BreakerState::Closed => Ok(Admission {
                generation: inner.generation,
                probe: false,
            }),
            BreakerState::HalfOpen if inner.half_open_probe_count < self.config.max_half_open_probes => {
                inner.half_open_probe_count += 1;
                tracing::debug!(
                    backend_id = %self.backend_id,
                    probe = inner.half_open_probe_count,
                    "Circuit breaker admitting half-open probe"
                );
                Ok(Admission {
                    generation: inner.generation,
                    probe: true,
                })
            }
            state => {
                metrics::record_breaker_rejection(&self.backend_id);
                tracing::debug!(backend_id = %self.backend_id, state = %state, "Circuit breaker rejected call");
                Err(RefineError::CircuitOpen {
                    backend_id: self.backend_id.clone(),
                    state,
                })
            }
        }
    }

    fn record(&self, admission: Admission, outcome: Outcome) {
        let mut inner = self.lock();
        if admission.generation != inner.generation {
            return;
        }

        match (inner.state, outcome) {
            (BreakerState::Closed, Outcome::Success) => inner.failure_count = 0,
            (BreakerState::Closed, Outcome::Failure) => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.open(&mut inner);
                }
            }
            (BreakerState::HalfOpen, Outcome::Success) => {
                inner.success_count += 1;
                if inner.success_count >= self.config.max_half_open_probes {
                    self.transition(&mut inner, BreakerState::Closed);
                }
            }
            (BreakerState::HalfOpen, Outcome::Failure) => self.open(&mut inner),
            (BreakerState::HalfOpen, Outcome::Neutral) if admission.probe => {
                inner.half_open_probe_count = inner.half_open_probe_count.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn open(&self, inner: &mut BreakerInner) {
        let failures = inner.failure_count;
        self.transition(inner, BreakerState::Open);
        inner.last_failure_at = Some(Instant::now());
        tracing::warn!(
            backend_id = %self.backend_id,
            failures,
            reset_timeout_secs = self.config.reset_timeout_secs,
            "Circuit breaker opened"
        );
    }

    fn transition(&self, inner: &mut BreakerInner, to: BreakerState) {
        let from = inner.state;
        inner.state = to;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_probe_count = 0;
        inner.generation += 1;
        if from != to {
            metrics::record_breaker_transition(&self.backend_id, to.as_str());
            tracing::info!(backend_id = %self.backend_id, from = %from, to = %to, "Circuit breaker state change");
        }
    }
}

/// Returns the admission's probe slot if the call never reports an outcome
/// (its future was dropped mid-flight).
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.breaker.record(admission, Outcome::Neutral);
        }
    }
}

/// One breaker per backend id, created on first access.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `backend_id`, creating it if needed.
    pub fn get(&self, backend_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(backend_id) {
            return existing.value().clone();
        }
        self.breakers
            .entry(backend_id.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(backend_id, self.config.clone())))
            .value()
            .clone()
    }

    /// Breaker for `backend_id` only if one was already created.
    pub fn existing(&self, backend_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(backend_id).map(|b| b.value().clone())
    }

    /// Reset one breaker. Returns false if none exists for the id.
    pub fn reset(&self, backend_id: &str) -> bool {
        match self.existing(backend_id) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for breaker in self.breakers.iter() {
            breaker.value().reset();
        }
    }

    /// Snapshots of every breaker, sorted by backend id.
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.backend_id.cmp(&b.backend_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

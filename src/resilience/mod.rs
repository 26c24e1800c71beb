//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Backend call:
//!     → circuit_breaker.rs (admit or reject; record the final outcome)
//!         → retries.rs (attempt loop, classify failures, back off)
//!             → backoff.rs (exponential delay with ±25% jitter)
//!             → timeouts.rs (deadline per attempt)
//!                 → backend
//! ```
//!
//! # Design Decisions
//! - The retry loop runs inside the breaker: a rejection is never retried,
//!   and only the exhausted result of a whole retry run counts as one failure
//! - Every wait honours the caller's cancellation token
//! - Breakers are per backend and live in an explicit registry, not a global

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerRegistry, BreakerSnapshot, BreakerState, CircuitBreaker};
pub use retries::{with_retry, RetryPolicy};

//! Refinement orchestration.
//!
//! # Data Flow
//! ```text
//! refine(text, cancel, options)
//!     → validate input
//!     → cache key {backendId, modelId, strict, template, text}
//!         hit  → result returned, no backend call
//!     → template load (before any backend budget is spent)
//!     → CircuitBreaker::execute
//!         → with_retry
//!             → with_timeout(backend.refine) raced against cancellation
//!     → cache store → optional validation → RefinementResult
//! ```
//!
//! # Design Decisions
//! - Cancellation is checked before every suspension point and races each one
//! - A cancelled call stores nothing and leaves breaker counters untouched
//! - Failover is caller-driven and bounded by the number of registered backends

pub mod feedback;
pub mod refiner;
pub mod types;

pub use refiner::Refiner;
pub use types::{RefineOptions, RefinementResult};

//! Resilient text refinement over interchangeable LLM backends.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller ──refine(text, cancel, options)──▶ orchestrator::Refiner
//!                                                   │
//!              ┌────────────────────────────────────┼─────────────────────┐
//!              ▼                                    ▼                     ▼
//!        cache::ResultCache              backend::BackendRegistry   templates
//!        (TTL + LRU, keyed by            (lazy handle per id,       (prompt content)
//!         canonical fingerprint)          offline fallback)
//!                                                   │
//!                                                   ▼
//!                              resilience::CircuitBreaker (per backend id)
//!                                                   │
//!                                                   ▼
//!                              resilience::with_retry (backoff + jitter)
//!                                                   │
//!                                                   ▼
//!                              RefineBackend::refine (external service)
//!
//!     Cross-cutting: config (TOML, hot reload), observability (tracing,
//!     metrics), lifecycle (shutdown), error (RefineError taxonomy)
//! ```

// Core subsystems
pub mod backend;
pub mod cache;
pub mod orchestrator;
pub mod resilience;

// Collaborator seams
pub mod templates;
pub mod validator;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use backend::{BackendRegistry, RefineBackend};
pub use config::schema::RefinerConfig;
pub use error::{RefineError, RefineResult};
pub use lifecycle::Shutdown;
pub use orchestrator::{RefineOptions, RefinementResult, Refiner};

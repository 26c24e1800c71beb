//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! cache / resilience / orchestrator produce:
//!     → logging.rs (structured tracing events, one span per refine call)
//!     → metrics.rs (counters and gauges through the `metrics` facade)
//!
//! Consumers:
//!     → tracing-subscriber (stdout, pretty or JSON)
//!     → whatever `metrics` recorder the host process installs
//! ```
//!
//! # Design Decisions
//! - Every refine call carries a request ID through its span
//! - Metrics are no-ops until a recorder is installed
//! - Cancellation is logged at debug, never as a failure

pub mod logging;
pub mod metrics;

//! Backend subsystem.
//!
//! # Data Flow
//! ```text
//! refine request
//!     → registry.rs (resolve configured id → lazily built handle,
//!                    offline.rs when the id is unknown or unbuildable)
//!     → RefineBackend::refine (external service behind the trait)
//! ```
//!
//! # Design Decisions
//! - One capability trait; one implementing type per backend
//! - The registry maps ids to factory closures instead of matching on ids
//! - At most one live handle per id per registry

use async_trait::async_trait;
use thiserror::Error;

pub mod offline;
pub mod registry;

pub use offline::OfflineBackend;
pub use registry::{ActiveBackend, BackendFactory, BackendRegistry};

/// Per-call options passed to a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendOptions {
    /// Ask for a conservative rewrite.
    pub strict: Option<bool>,
    /// Sampling temperature, if the backend supports one.
    pub temperature: Option<f32>,
    /// Model identifier from configuration.
    pub model: Option<String>,
}

/// Failure reported by a backend. Its shape is owned by the backend, so the
/// message is the only thing the resilience layer inspects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// The refine capability every backend implements.
#[async_trait]
pub trait RefineBackend: Send + Sync {
    /// Stable identifier, used for breaker and cache keys.
    fn id(&self) -> &str;

    /// Rewrite `text` following the `template` system prompt.
    async fn refine(
        &self,
        text: &str,
        template: &str,
        options: &BackendOptions,
    ) -> Result<String, BackendError>;

    /// Release long-lived resources (connections, sessions). Called by the
    /// registry when it is cleared.
    fn close(&self) {}
}

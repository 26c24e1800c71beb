//! Error taxonomy for the refinement layer.
//!
//! # Kinds
//! - `InvalidInput`: rejected locally, never retried
//! - `Cancelled`: caller gave up; not a failure, never counted by a breaker
//! - `Backend`: the external backend failed (transient or permanent)
//! - `CircuitOpen`: the backend's breaker rejected the call before it ran
//! - `TemplateLoad`: prompt template I/O failed before any backend call
//!
//! Every error that reaches the caller carries enough structure (kind,
//! backend id) to drive a recovery action, see [`RefineError::recovery`].

use thiserror::Error;

use crate::resilience::circuit_breaker::BreakerState;

/// Errors surfaced by the refinement layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefineError {
    /// Input text failed local validation.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The caller cancelled the operation.
    #[error("Refinement cancelled")]
    Cancelled,

    /// The backend call failed. `attempts` counts every attempt made.
    #[error("Backend '{backend_id}' failed after {attempts} attempt(s): {message}")]
    Backend {
        backend_id: String,
        message: String,
        attempts: u32,
    },

    /// The backend's circuit breaker rejected the call.
    #[error("Circuit breaker for backend '{backend_id}' is {state}")]
    CircuitOpen {
        backend_id: String,
        state: BreakerState,
    },

    /// The prompt template could not be loaded.
    #[error("Failed to load template '{template_id}': {message}")]
    TemplateLoad {
        template_id: String,
        message: String,
    },
}

/// Result type for refinement operations.
pub type RefineResult<T> = Result<T, RefineError>;

/// Fieldless tag for [`RefineError`], used for metrics labels and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Cancelled,
    Backend,
    CircuitOpen,
    TemplateLoad,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Backend => "backend",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::TemplateLoad => "template_load",
        }
    }
}

/// What a caller can offer the user after a failed refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Pick a different backend; `from` is the one that is unavailable.
    SwitchBackend { from: String },
    /// Re-run against the designated fallback backend.
    UseFallback { fallback_id: String },
    /// Try the same request again later.
    Retry,
    /// The input has to change before a retry can succeed.
    EditInput,
    /// Nothing to offer (e.g. the user cancelled).
    None,
}

impl RefineError {
    /// Build a single-attempt backend failure.
    pub fn backend(backend_id: impl Into<String>, message: impl Into<String>) -> Self {
        RefineError::Backend {
            backend_id: backend_id.into(),
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        RefineError::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RefineError::InvalidInput { .. } => ErrorKind::InvalidInput,
            RefineError::Cancelled => ErrorKind::Cancelled,
            RefineError::Backend { .. } => ErrorKind::Backend,
            RefineError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            RefineError::TemplateLoad { .. } => ErrorKind::TemplateLoad,
        }
    }

    /// Backend the error is attributed to, if any.
    pub fn backend_id(&self) -> Option<&str> {
        match self {
            RefineError::Backend { backend_id, .. }
            | RefineError::CircuitOpen { backend_id, .. } => Some(backend_id),
            _ => None,
        }
    }

    /// Whether a circuit breaker should record this outcome as a failure.
    ///
    /// Local errors say nothing about backend health.
    pub fn counts_as_backend_failure(&self) -> bool {
        matches!(self, RefineError::Backend { .. })
    }

    /// Re-annotate a backend failure with the total number of attempts.
    pub fn with_attempts(self, attempts: u32) -> Self {
        match self {
            RefineError::Backend {
                backend_id,
                message,
                ..
            } => RefineError::Backend {
                backend_id,
                message,
                attempts,
            },
            other => other,
        }
    }

    /// Recovery action to present, given the configured fallback backend.
    pub fn recovery(&self, fallback_id: &str) -> RecoveryAction {
        match self {
            RefineError::CircuitOpen { backend_id, .. } if backend_id != fallback_id => {
                RecoveryAction::UseFallback {
                    fallback_id: fallback_id.to_string(),
                }
            }
            RefineError::CircuitOpen { backend_id, .. } => RecoveryAction::SwitchBackend {
                from: backend_id.clone(),
            },
            RefineError::Backend { backend_id, .. } => RecoveryAction::SwitchBackend {
                from: backend_id.clone(),
            },
            RefineError::InvalidInput { .. } => RecoveryAction::EditInput,
            RefineError::TemplateLoad { .. } => RecoveryAction::Retry,
            RefineError::Cancelled => RecoveryAction::None,
        }
    }
}

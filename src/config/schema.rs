//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the refiner.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of the always-available offline backend.
pub const OFFLINE_BACKEND_ID: &str = "offline";

/// Identifier of the built-in prompt template.
pub const DEFAULT_TEMPLATE_ID: &str = "default";

/// Root configuration for the refinement layer.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RefinerConfig {
    /// Backend selection (active backend, model, strict mode).
    pub backend: BackendSettings,

    /// Result cache sizing and expiry.
    pub cache: CacheConfig,

    /// Per-backend circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy for backend calls.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Input limits.
    pub input: InputConfig,

    /// Prompt templates.
    pub templates: TemplateConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Which backend refines text, and how.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    /// Identifier of the backend used for new requests.
    pub active: String,

    /// Model identifier passed along to the backend.
    pub model: String,

    /// Ask backends for strict (conservative) rewrites.
    pub strict: bool,

    /// Backend offered when the active one is unavailable.
    pub fallback: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            active: OFFLINE_BACKEND_ID.to_string(),
            model: "default".to_string(),
            strict: true,
            fallback: OFFLINE_BACKEND_ID.to_string(),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable result caching.
    pub enabled: bool,

    /// Maximum number of cached results.
    pub max_entries: usize,

    /// Time-to-live of a cached result in seconds.
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 50,
            ttl_secs: 3600,
        }
    }
}

/// Circuit breaker configuration, applied to every backend.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before probing.
    pub reset_timeout_secs: u64,

    /// Probe calls admitted while half-open; this many successes close it.
    pub max_half_open_probes: u32,
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            reset_timeout_secs: 30,
            max_half_open_probes: 2,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Case-insensitive substrings marking a backend error as transient.
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            retryable_patterns: default_retryable_patterns(),
        }
    }
}

fn default_retryable_patterns() -> Vec<String> {
    [
        "timeout",
        "timed out",
        "rate limit",
        "429",
        "500",
        "502",
        "503",
        "504",
        "econnreset",
        "etimedout",
        "socket hang up",
        "network",
        "overloaded",
        "temporarily unavailable",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single backend attempt in seconds.
    pub request_secs: u64,
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Limits applied to input text before anything else runs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Maximum input length in characters.
    pub max_length: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { max_length: 50_000 }
    }
}

/// Prompt template configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template used when a request names none.
    pub default: String,

    /// Additional templates by id. Overrides the built-in default if it
    /// reuses its id.
    pub entries: HashMap<String, String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            default: DEFAULT_TEMPLATE_ID.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the pretty format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

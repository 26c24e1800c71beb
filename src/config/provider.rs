//! Live configuration access.
//!
//! # Responsibilities
//! - Expose the settings the refiner reads per request (`SettingsProvider`)
//! - Hold the current snapshot and swap it atomically on reload
//!
//! # Design Decisions
//! - Readers never block writers: `ArcSwap` hands out the current `Arc`
//! - A request reads each setting once; a concurrent reload affects only
//!   requests that start afterwards

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::RefinerConfig;

/// Settings the refinement layer consults on every request.
pub trait SettingsProvider: Send + Sync {
    /// Identifier of the backend new requests should use.
    fn active_backend_id(&self) -> String;

    /// Model identifier passed to the backend.
    fn model_id(&self) -> String;

    /// Whether backends should produce strict rewrites.
    fn is_strict_mode(&self) -> bool;

    /// Backend offered when the active one is unavailable.
    fn fallback_backend_id(&self) -> String;
}

/// Hot-swappable configuration snapshot.
#[derive(Debug)]
pub struct SharedConfig {
    current: ArcSwap<RefinerConfig>,
}

impl SharedConfig {
    pub fn new(config: RefinerConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<RefinerConfig> {
        self.current.load_full()
    }

    /// Replace the snapshot.
    pub fn store(&self, config: RefinerConfig) {
        self.current.store(Arc::new(config));
    }

    /// Switch the active backend, keeping every other setting.
    pub fn set_active_backend(&self, backend_id: &str) {
        self.current.rcu(|current| {
            let mut next = RefinerConfig::clone(current);
            next.backend.active = backend_id.to_string();
            next
        });
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(RefinerConfig::default())
    }
}

impl SettingsProvider for SharedConfig {
    fn active_backend_id(&self) -> String {
        self.current.load().backend.active.clone()
    }

    fn model_id(&self) -> String {
        self.current.load().backend.model.clone()
    }

    fn is_strict_mode(&self) -> bool {
        self.current.load().backend.strict
    }

    fn fallback_backend_id(&self) -> String {
        self.current.load().backend.fallback.clone()
    }
}

//! Backend registry.
//!
//! # Responsibilities
//! - Map backend ids to factories
//! - Build each handle on first use and reuse it afterwards
//! - Resolve the configured backend, falling back to the offline backend
//! - Release every live handle on `clear`

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::{BackendError, OfflineBackend, RefineBackend};
use crate::config::provider::SettingsProvider;
use crate::config::schema::OFFLINE_BACKEND_ID;
use crate::observability::metrics;

/// Builds a backend handle. Called at most once per id while the handle lives.
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Arc<dyn RefineBackend>, BackendError> + Send + Sync>;

/// The backend a request will use.
#[derive(Clone)]
pub struct ActiveBackend {
    /// Id the handle was resolved under.
    pub id: String,
    pub handle: Arc<dyn RefineBackend>,
    /// True if the configured id could not be used.
    pub fell_back: bool,
}

impl std::fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBackend")
            .field("id", &self.id)
            .field("fell_back", &self.fell_back)
            .finish()
    }
}

/// Lazily instantiated backend handles, keyed by id.
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    instances: DashMap<String, Arc<dyn RefineBackend>>,
    settings: Arc<dyn SettingsProvider>,
}

impl BackendRegistry {
    /// Create a registry with the offline backend registered.
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            instances: DashMap::new(),
            settings,
        };
        registry.register(OFFLINE_BACKEND_ID, || {
            Ok(Arc::new(OfflineBackend::new()) as Arc<dyn RefineBackend>)
        });
        registry
    }

    /// Register (or replace) the factory for `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Arc<dyn RefineBackend>, BackendError> + Send + Sync + 'static,
    {
        let id = id.into();
        if let Some((_, old)) = self.instances.remove(&id) {
            old.close();
        }
        self.factories.insert(id, Arc::new(factory));
    }

    /// Registered ids, sorted.
    pub fn backend_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Handle for `id`, building it on first use.
    ///
    /// Returns `None` for unknown ids or when the factory fails.
    pub fn get(&self, id: &str) -> Option<Arc<dyn RefineBackend>> {
        if let Some(existing) = self.instances.get(id) {
            return Some(existing.value().clone());
        }

        let factory = self.factories.get(id)?;
        // The shard lock is released before `len()` reads every shard.
        let built = self
            .instances
            .entry(id.to_string())
            .or_try_insert_with(|| {
                let handle = factory()?;
                tracing::info!(backend_id = %id, "Backend instantiated");
                Ok::<_, BackendError>(handle)
            })
            .map(|entry| entry.value().clone());

        match built {
            Ok(handle) => {
                metrics::record_backend_instances(self.instances.len());
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(backend_id = %id, error = %e, "Failed to instantiate backend");
                None
            }
        }
    }

    /// Id the configured backend resolves to without building its handle:
    /// the configured id if registered, otherwise the offline backend.
    pub fn active_backend_id(&self) -> String {
        let configured = self.settings.active_backend_id();
        if self.is_registered(&configured) {
            configured
        } else {
            OFFLINE_BACKEND_ID.to_string()
        }
    }

    /// Resolve the configured backend. Never fails: an unknown or unbuildable
    /// id resolves to the offline backend.
    pub fn get_active_backend(&self) -> ActiveBackend {
        let configured = self.settings.active_backend_id();
        if let Some(handle) = self.get(&configured) {
            return ActiveBackend {
                id: configured,
                handle,
                fell_back: false,
            };
        }

        tracing::warn!(
            backend_id = %configured,
            fallback = OFFLINE_BACKEND_ID,
            "Configured backend unavailable, using offline backend"
        );
        ActiveBackend {
            id: OFFLINE_BACKEND_ID.to_string(),
            handle: self.offline(),
            fell_back: true,
        }
    }

    fn offline(&self) -> Arc<dyn RefineBackend> {
        if let Some(handle) = self.get(OFFLINE_BACKEND_ID) {
            return handle;
        }
        // Only reachable if the offline factory was replaced by a failing one.
        self.instances
            .entry(OFFLINE_BACKEND_ID.to_string())
            .or_insert_with(|| Arc::new(OfflineBackend::new()))
            .value()
            .clone()
    }

    /// Build the handle for `id` ahead of the first request.
    /// Returns false if the id is unknown or the factory failed.
    pub fn preload(&self, id: &str) -> bool {
        let loaded = self.get(id).is_some();
        if loaded {
            tracing::debug!(backend_id = %id, "Backend preloaded");
        }
        loaded
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.instances.contains_key(id)
    }

    /// Number of live handles.
    pub fn loaded_count(&self) -> usize {
        self.instances.len()
    }

    /// Close and drop every live handle. Factories stay registered, so the
    /// next lookup builds a fresh handle.
    pub fn clear(&self) {
        let ids: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.instances.remove(&id) {
                handle.close();
                tracing::debug!(backend_id = %id, "Backend released");
            }
        }
        metrics::record_backend_instances(0);
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("registered", &self.backend_ids())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use refine_guard::backend::{BackendError, BackendOptions, RefineBackend};
use refine_guard::config::SharedConfig;
use refine_guard::templates::{InMemoryTemplates, TemplateError, TemplateProvider};
use refine_guard::{BackendRegistry, Refiner, RefinerConfig};

/// What a scripted backend does on one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Succeed with `prefix` prepended to the input.
    Refine(&'static str),
    /// Fail with this message.
    Fail(&'static str),
    /// Never answer.
    Hang,
}

/// Backend that plays back a script, then repeats its default reply.
pub struct ScriptedBackend {
    id: String,
    script: Mutex<VecDeque<Reply>>,
    default: Reply,
    calls: AtomicU32,
    closed: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(id: &str, default: Reply) -> Arc<Self> {
        Self::with_script(id, [], default)
    }

    pub fn with_script(
        id: &str,
        script: impl IntoIterator<Item = Reply>,
        default: Reply,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            script: Mutex::new(script.into_iter().collect()),
            default,
            calls: AtomicU32::new(0),
            closed: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap();
        script.pop_front().unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl RefineBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn refine(
        &self,
        text: &str,
        _template: &str,
        _options: &BackendOptions,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_reply() {
            Reply::Refine(prefix) => Ok(format!("{prefix}{text}")),
            Reply::Fail(message) => Err(BackendError::new(message)),
            Reply::Hang => std::future::pending().await,
        }
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Template provider that counts loads and can be told to fail.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LoadMode {
    Normal,
    Fail,
    Hang,
}

pub struct CountingTemplates {
    inner: InMemoryTemplates,
    loads: AtomicU32,
    mode: LoadMode,
}

impl CountingTemplates {
    fn with_mode(mode: LoadMode) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryTemplates::default(),
            loads: AtomicU32::new(0),
            mode,
        })
    }

    pub fn new() -> Arc<Self> {
        Self::with_mode(LoadMode::Normal)
    }

    pub fn failing() -> Arc<Self> {
        Self::with_mode(LoadMode::Fail)
    }

    /// Loads never complete.
    pub fn hanging() -> Arc<Self> {
        Self::with_mode(LoadMode::Hang)
    }

    pub fn loads(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateProvider for CountingTemplates {
    fn default_id(&self) -> &str {
        self.inner.default_id()
    }

    async fn load_template(&self, id: Option<&str>) -> Result<String, TemplateError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            LoadMode::Fail => Err(TemplateError::Io("permission denied".into())),
            LoadMode::Hang => std::future::pending().await,
            LoadMode::Normal => self.inner.load_template(id).await,
        }
    }
}

/// Config with the given active backend and model, and no retries unless a
/// test asks for them.
pub fn test_config(active: &str, model: &str) -> RefinerConfig {
    let mut config = RefinerConfig::default();
    config.backend.active = active.to_string();
    config.backend.model = model.to_string();
    config.retries.max_retries = 0;
    config
}

pub struct Harness {
    pub refiner: Refiner,
    pub settings: Arc<SharedConfig>,
    pub templates: Arc<CountingTemplates>,
}

/// Build a refiner with every scripted backend registered under its id.
pub fn harness(
    config: RefinerConfig,
    backends: &[Arc<ScriptedBackend>],
    templates: Arc<CountingTemplates>,
) -> Harness {
    let settings = Arc::new(SharedConfig::new(config.clone()));
    let mut registry = BackendRegistry::new(settings.clone());
    for backend in backends {
        let handle = backend.clone();
        registry.register(backend.id().to_string(), move || {
            Ok(handle.clone() as Arc<dyn RefineBackend>)
        });
    }

    let refiner = Refiner::new(&config, settings.clone(), registry, templates.clone());
    Harness {
        refiner,
        settings,
        templates,
    }
}

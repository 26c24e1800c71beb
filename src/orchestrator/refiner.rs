//! The refiner: composes cache, breakers, retries and backends around a
//! single refine request.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::backend::{BackendOptions, BackendRegistry, RefineBackend};
use crate::cache::{cache_key, ResultCache};
use crate::config::provider::SettingsProvider;
use crate::config::schema::RefinerConfig;
use crate::error::{RefineError, RefineResult};
use crate::observability::metrics;
use crate::orchestrator::feedback::compose_feedback_input;
use crate::orchestrator::types::{RefineOptions, RefinementResult};
use crate::resilience::timeouts::with_timeout;
use crate::resilience::{with_retry, BreakerRegistry, RetryPolicy};
use crate::templates::TemplateProvider;
use crate::validator::{OutputValidator, ValidationReport};

/// Refines text through the configured backend with caching, circuit
/// breaking and retries.
///
/// Backend selection, model and strict mode are read from the settings
/// provider on every call. Cache, breaker, retry and limit settings are fixed
/// when the refiner is built.
pub struct Refiner {
    settings: Arc<dyn SettingsProvider>,
    backends: BackendRegistry,
    breakers: BreakerRegistry,
    cache: Option<ResultCache>,
    templates: Arc<dyn TemplateProvider>,
    validator: Option<Arc<dyn OutputValidator>>,
    retry_policy: RetryPolicy,
    request_timeout: Duration,
    max_input_length: usize,
}

impl Refiner {
    pub fn new(
        config: &RefinerConfig,
        settings: Arc<dyn SettingsProvider>,
        backends: BackendRegistry,
        templates: Arc<dyn TemplateProvider>,
    ) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| ResultCache::new(config.cache.max_entries, config.cache.ttl()));

        Self {
            settings,
            backends,
            breakers: BreakerRegistry::new(config.circuit_breaker.clone()),
            cache,
            templates,
            validator: None,
            retry_policy: RetryPolicy::from_config(&config.retries),
            request_timeout: config.timeouts.request(),
            max_input_length: config.input.max_length,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn OutputValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// `None` when caching is disabled.
    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Refine `text`.
    ///
    /// Fails with [`RefineError::CircuitOpen`] when the backend's breaker
    /// rejects the call; see [`RefineError::recovery`] for what to offer the
    /// user, or use [`Refiner::refine_with_failover`].
    pub async fn refine(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
        options: &RefineOptions,
    ) -> RefineResult<RefinementResult> {
        self.run(text, cancel, options, self.max_input_length).await
    }

    /// Span and outcome metric around one request. `max_length` bounds the
    /// text handed to the backend.
    async fn run(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
        options: &RefineOptions,
        max_length: usize,
    ) -> RefineResult<RefinementResult> {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("refine", request_id = %request_id);

        let result = self
            .refine_inner(text, cancel, options, max_length)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(r) if r.from_cache => "cache_hit",
            Ok(_) => "success",
            Err(e) => e.kind().as_str(),
        };
        metrics::record_refine_outcome(outcome);
        result
    }

    async fn refine_inner(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
        options: &RefineOptions,
        max_length: usize,
    ) -> RefineResult<RefinementResult> {
        let uncancellable = CancellationToken::new();
        let cancel = cancel.unwrap_or(&uncancellable);

        validate_input(text, max_length)?;
        ensure_not_cancelled(cancel, "before start")?;

        let mut backend_id = self.resolve_backend_id(options)?;
        let model = self.settings.model_id();
        let strict = self.settings.is_strict_mode();
        let template_id = options
            .template_id
            .clone()
            .unwrap_or_else(|| self.templates.default_id().to_string());
        let iteration = options.iteration.unwrap_or(1);

        let key_for = |backend_id: &str| {
            cache_key([
                ("backendId", Value::from(backend_id)),
                ("modelId", Value::from(model.as_str())),
                ("strict", Value::from(strict)),
                ("template", Value::from(template_id.as_str())),
                ("text", Value::from(text)),
            ])
        };
        let mut key = key_for(&backend_id);

        if let Some(refined) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            tracing::debug!(backend_id = %backend_id, "Cache hit");
            return Ok(self.cached_result(
                refined, backend_id, template_id, iteration, strict, options,
            ));
        }

        let template = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled during template load");
                return Err(RefineError::Cancelled);
            }
            loaded = self.templates.load_template(Some(template_id.as_str())) => {
                loaded.map_err(|e| RefineError::TemplateLoad {
                    template_id: template_id.clone(),
                    message: e.to_string(),
                })?
            }
        };

        ensure_not_cancelled(cancel, "before backend call")?;

        let (resolved_id, handle) = self.acquire_backend(&backend_id, options)?;
        if resolved_id != backend_id {
            // The configured factory failed; key on the backend actually used.
            backend_id = resolved_id;
            key = key_for(&backend_id);
            if let Some(refined) = self.cache.as_ref().and_then(|c| c.get(&key)) {
                tracing::debug!(backend_id = %backend_id, "Cache hit");
                return Ok(self.cached_result(
                refined, backend_id, template_id, iteration, strict, options,
            ));
            }
        }

        let backend_options = BackendOptions {
            strict: Some(strict),
            temperature: options.temperature,
            model: Some(model),
        };
        let refined = self
            .call_backend(&backend_id, &handle, text, &template, &backend_options, cancel)
            .await
            .inspect_err(|e| self.log_failure(e))?;

        if let Some(cache) = &self.cache {
            cache.set(key, refined.clone());
        }

        let validation = self.validate_output(&refined, strict, options);
        tracing::info!(
            backend_id = %backend_id,
            template = %template_id,
            iteration,
            "Refinement complete"
        );

        Ok(RefinementResult {
            refined_text: refined,
            template_used: template_id,
            iteration,
            validation,
            backend_id,
            from_cache: false,
        })
    }

    fn cached_result(
        &self,
        refined: String,
        backend_id: String,
        template_id: String,
        iteration: u32,
        strict: bool,
        options: &RefineOptions,
    ) -> RefinementResult {
        let validation = self.validate_output(&refined, strict, options);
        RefinementResult {
            refined_text: refined,
            template_used: template_id,
            iteration,
            validation,
            backend_id,
            from_cache: true,
        }
    }

    async fn call_backend(
        &self,
        backend_id: &str,
        handle: &Arc<dyn RefineBackend>,
        text: &str,
        template: &str,
        options: &BackendOptions,
        cancel: &CancellationToken,
    ) -> RefineResult<String> {
        let limit = self.request_timeout;
        let breaker = self.breakers.get(backend_id);

        breaker
            .execute(|| {
                with_retry(&self.retry_policy, cancel, move |attempt| async move {
                    tracing::debug!(backend_id = %backend_id, attempt, "Calling backend");
                    let call = async {
                        handle
                            .refine(text, template, options)
                            .await
                            .map_err(|e| RefineError::backend(backend_id, e.message))
                    };

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(RefineError::Cancelled),
                        result = with_timeout(backend_id, limit, call) => result,
                    }
                })
            })
            .await
    }

    /// Refine, and on a breaker rejection try the fallback backend and then
    /// every other registered backend not tried yet.
    pub async fn refine_with_failover(
        &self,
        text: &str,
        cancel: Option<&CancellationToken>,
        options: &RefineOptions,
    ) -> RefineResult<RefinementResult> {
        let mut options = options.clone();
        let mut tried: Vec<String> = Vec::new();

        loop {
            let err = match self.refine(text, cancel, &options).await {
                Err(err @ RefineError::CircuitOpen { .. }) => err,
                other => return other,
            };

            if let Some(id) = err.backend_id() {
                tried.push(id.to_string());
            }
            let Some(next) = self.next_failover_candidate(&tried) else {
                tracing::warn!(tried = ?tried, "No backend left to fail over to");
                return Err(err);
            };

            tracing::info!(from = ?err.backend_id(), to = %next, "Failing over to another backend");
            options.backend_id = Some(next);
        }
    }

    fn next_failover_candidate(&self, tried: &[String]) -> Option<String> {
        let fallback = self.settings.fallback_backend_id();
        std::iter::once(fallback)
            .chain(self.backends.backend_ids())
            .find(|id| self.backends.is_registered(id) && !tried.contains(id))
    }

    /// Refine again using feedback on a previous result. The template of the
    /// previous result is reused unless `options` names another.
    pub async fn re_refine(
        &self,
        original: &str,
        previous: &RefinementResult,
        feedback: &str,
        cancel: Option<&CancellationToken>,
        options: &RefineOptions,
    ) -> RefineResult<RefinementResult> {
        // Limits apply to what the caller typed, not the composed prompt.
        validate_input(original, self.max_input_length)?;
        if feedback.trim().is_empty() {
            return Err(RefineError::invalid_input("feedback is empty"));
        }
        let length = feedback.chars().count();
        if length > self.max_input_length {
            return Err(RefineError::invalid_input(format!(
                "feedback is {length} characters, maximum is {}",
                self.max_input_length
            )));
        }

        let input = compose_feedback_input(original, &previous.refined_text, feedback);
        let mut options = options.clone();
        options.iteration = Some(previous.iteration.saturating_add(1));
        if options.template_id.is_none() {
            options.template_id = Some(previous.template_used.clone());
        }

        self.run(&input, cancel, &options, usize::MAX).await
    }

    /// Release every backend handle. The refiner stays usable; the next call
    /// builds fresh handles.
    pub fn shutdown(&self) {
        let released = self.backends.loaded_count();
        self.backends.clear();
        tracing::info!(released, "Refiner shut down");
    }

    /// Backend id for the request, checked against the registry but not built.
    fn resolve_backend_id(&self, options: &RefineOptions) -> RefineResult<String> {
        match &options.backend_id {
            Some(id) if self.backends.is_registered(id) => Ok(id.clone()),
            Some(id) => Err(RefineError::invalid_input(format!("unknown backend '{id}'"))),
            None => Ok(self.backends.active_backend_id()),
        }
    }

    /// Build (or reuse) the handle for a resolved id. The configured backend
    /// may still fall back to offline here if its factory fails.
    fn acquire_backend(
        &self,
        backend_id: &str,
        options: &RefineOptions,
    ) -> RefineResult<(String, Arc<dyn RefineBackend>)> {
        if options.backend_id.is_some() {
            let handle = self.backends.get(backend_id).ok_or_else(|| {
                RefineError::invalid_input(format!("backend '{backend_id}' is unavailable"))
            })?;
            return Ok((backend_id.to_string(), handle));
        }
        let active = self.backends.get_active_backend();
        Ok((active.id, active.handle))
    }

    fn validate_output(
        &self,
        text: &str,
        strict: bool,
        options: &RefineOptions,
    ) -> Option<ValidationReport> {
        if !options.validate_output {
            return None;
        }
        let validator = self.validator.as_ref()?;
        let report = validator.validate(text, strict);
        if !report.valid {
            tracing::debug!(issues = ?report.issues, score = report.score, "Refined text failed validation");
        }
        Some(report)
    }

    fn log_failure(&self, error: &RefineError) {
        match error {
            RefineError::Cancelled => tracing::debug!("Refinement cancelled"),
            RefineError::CircuitOpen { .. } => {
                let recovery = error.recovery(&self.settings.fallback_backend_id());
                tracing::warn!(error = %error, recovery = ?recovery, "Backend unavailable");
            }
            _ => tracing::warn!(error = %error, "Refinement failed"),
        }
    }
}

fn validate_input(text: &str, max_length: usize) -> RefineResult<()> {
    if text.trim().is_empty() {
        return Err(RefineError::invalid_input("text is empty"));
    }
    let length = text.chars().count();
    if length > max_length {
        return Err(RefineError::invalid_input(format!(
            "text is {length} characters, maximum is {max_length}"
        )));
    }
    Ok(())
}

fn ensure_not_cancelled(cancel: &CancellationToken, stage: &'static str) -> RefineResult<()> {
    if cancel.is_cancelled() {
        tracing::debug!(stage, "Refinement cancelled");
        return Err(RefineError::Cancelled);
    }
    Ok(())
}

impl std::fmt::Debug for Refiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refiner")
            .field("backends", &self.backends)
            .field("cache", &self.cache)
            .field("retry_policy", &self.retry_policy)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

//! Prompt templates.
//!
//! # Responsibilities
//! - Resolve a template id (or the configured default) to its content
//!
//! # Design Decisions
//! - Loading is async so file- or network-backed providers fit the same seam
//! - Template failures are reported before any backend call is made

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::schema::{TemplateConfig, DEFAULT_TEMPLATE_ID};

/// Built-in system prompt used when no template overrides the default id.
pub const BUILTIN_DEFAULT_TEMPLATE: &str = "You are an editor. Rewrite the user's text so it is \
clear, concise and well structured. Keep the original meaning and language. \
Return only the rewritten text.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Io(String),
}

/// Source of prompt templates.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    /// Id used when a request names no template.
    fn default_id(&self) -> &str;

    /// Load the content of `id`, or of the default template when `None`.
    async fn load_template(&self, id: Option<&str>) -> Result<String, TemplateError>;
}

/// Templates held in memory, built from configuration.
#[derive(Debug, Clone)]
pub struct InMemoryTemplates {
    default_id: String,
    entries: HashMap<String, String>,
}

impl InMemoryTemplates {
    pub fn new(default_id: impl Into<String>) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            DEFAULT_TEMPLATE_ID.to_string(),
            BUILTIN_DEFAULT_TEMPLATE.to_string(),
        );
        Self {
            default_id: default_id.into(),
            entries,
        }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        let mut templates = Self::new(config.default.clone());
        for (id, content) in &config.entries {
            templates.insert(id.clone(), content.clone());
        }
        templates
    }

    pub fn insert(&mut self, id: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(id.into(), content.into());
    }
}

impl Default for InMemoryTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_ID)
    }
}

#[async_trait]
impl TemplateProvider for InMemoryTemplates {
    fn default_id(&self) -> &str {
        &self.default_id
    }

    async fn load_template(&self, id: Option<&str>) -> Result<String, TemplateError> {
        let id = id.unwrap_or(&self.default_id);
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }
}

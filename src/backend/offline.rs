//! Offline backend.
//!
//! Always available: rewrites text locally with deterministic clean-ups and
//! never fails. The prompt template is ignored since there is no model.
//!
//! - whitespace runs collapse to one space, lines are trimmed
//! - more than one blank line collapses to one
//! - sentences start with a capital letter
//! - the text ends with terminal punctuation
//! - strict mode keeps line breaks; otherwise lines of a paragraph are joined

use async_trait::async_trait;

use crate::backend::{BackendError, BackendOptions, RefineBackend};
use crate::config::schema::OFFLINE_BACKEND_ID;

#[derive(Debug, Default)]
pub struct OfflineBackend;

impl OfflineBackend {
    pub fn new() -> Self {
        Self
    }

    /// The rewrite itself, exposed for callers that need it synchronously.
    pub fn rewrite(&self, text: &str, strict: bool) -> String {
        let paragraphs = split_paragraphs(text);
        let separator = if strict { "\n" } else { " " };
        let rewritten: Vec<String> = paragraphs
            .iter()
            .map(|lines| capitalize_sentences(&lines.join(separator)))
            .collect();

        let mut out = rewritten.join("\n\n");
        if out.chars().last().is_some_and(|c| c.is_alphanumeric()) {
            out.push('.');
        }
        out
    }
}

fn split_paragraphs(text: &str) -> Vec<Vec<String>> {
    let mut paragraphs = Vec::new();
    let mut current = Vec::new();

    for line in text.lines() {
        let normalized = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(normalized);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    paragraphs
}

fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_sentence_start = true;

    for c in text.chars() {
        if at_sentence_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            at_sentence_start = false;
            continue;
        }
        if matches!(c, '.' | '!' | '?') {
            at_sentence_start = true;
        } else if !c.is_whitespace() {
            at_sentence_start = false;
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl RefineBackend for OfflineBackend {
    fn id(&self) -> &str {
        OFFLINE_BACKEND_ID
    }

    async fn refine(
        &self,
        text: &str,
        _template: &str,
        options: &BackendOptions,
    ) -> Result<String, BackendError> {
        Ok(self.rewrite(text, options.strict.unwrap_or(true)))
    }
}

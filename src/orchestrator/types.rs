//! Request and result types for the refiner.

use crate::validator::ValidationReport;

/// Per-call options for [`Refiner::refine`](super::Refiner::refine).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefineOptions {
    /// Template to use instead of the provider's default.
    pub template_id: Option<String>,
    /// Run the output validator on the refined text.
    pub validate_output: bool,
    /// Iteration number reported in the result. Defaults to 1.
    pub iteration: Option<u32>,
    /// Use this backend instead of the configured one.
    pub backend_id: Option<String>,
    /// Sampling temperature forwarded to the backend.
    pub temperature: Option<f32>,
}

impl RefineOptions {
    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_id = Some(backend_id.into());
        self
    }

    pub fn with_validation(mut self) -> Self {
        self.validate_output = true;
        self
    }
}

/// A successful refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementResult {
    pub refined_text: String,
    /// Template id the text was refined with.
    pub template_used: String,
    pub iteration: u32,
    /// Present only when validation was requested and a validator is set.
    pub validation: Option<ValidationReport>,
    /// Backend that produced (or originally produced, on a cache hit) the text.
    pub backend_id: String,
    pub from_cache: bool,
}

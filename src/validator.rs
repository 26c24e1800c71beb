//! Output validation seam.
//!
//! The refiner never judges output quality itself; it hands refined text to
//! an [`OutputValidator`] when the caller asks for it and attaches the report.

/// Outcome of validating refined text.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    /// 0.0 (unusable) to 1.0 (no issues found).
    pub score: f32,
    pub issues: Vec<String>,
}

impl ValidationReport {
    pub fn passed() -> Self {
        Self {
            valid: true,
            score: 1.0,
            issues: Vec::new(),
        }
    }
}

/// Checks refined text. Implementations must be cheap and side-effect free.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, text: &str, strict: bool) -> ValidationReport;
}

/// Minimal structural checks: non-empty output and, in strict mode, no
/// leftover template markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicValidator;

impl OutputValidator for BasicValidator {
    fn validate(&self, text: &str, strict: bool) -> ValidationReport {
        let mut issues = Vec::new();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            issues.push("output is empty".to_string());
        }
        if strict && (trimmed.contains("{{") || trimmed.contains("}}")) {
            issues.push("output contains unresolved template markers".to_string());
        }

        let score = 1.0 - 0.5 * issues.len() as f32;
        ValidationReport {
            valid: issues.is_empty(),
            score: score.max(0.0),
            issues,
        }
    }
}

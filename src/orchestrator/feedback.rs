//! Input composition for follow-up refinements.

/// Build the text sent on a re-refinement: the original request, the previous
/// answer and the user's feedback on it.
pub fn compose_feedback_input(original: &str, previous: &str, feedback: &str) -> String {
    format!(
        "Original text:\n{}\n\nPrevious refinement:\n{}\n\nFeedback:\n{}\n\n\
         Refine the original text again, applying the feedback to the previous refinement.",
        original.trim(),
        previous.trim(),
        feedback.trim()
    )
}

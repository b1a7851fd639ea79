/// Aggregated view of attempt progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub current_index: usize,
    pub is_submitted: bool,
}

impl ExamProgress {
    /// Share of answered questions in `[0, 100]`; `0` for an empty attempt.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.answered as f64 / self.total as f64 * 100.0
    }
}

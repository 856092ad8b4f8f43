use training_core::model::ModuleStatus;

/// Per-page row for an index control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOverview {
    pub index: usize,
    pub title: String,
    pub has_quiz: bool,
    pub completed: bool,
    pub unlocked: bool,
    pub score: Option<u8>,
}

/// Aggregated view of module progression, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressOverview {
    pub status: ModuleStatus,
    pub total_pages: usize,
    pub completed_pages: usize,
    pub remaining: usize,
    pub overall_score: Option<u8>,
    pub pages: Vec<PageOverview>,
}

impl ProgressOverview {
    /// Completion percentage, rounded half-up.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        if self.total_pages == 0 {
            return 0;
        }
        ((200 * self.completed_pages + self.total_pages) / (2 * self.total_pages)) as u8
    }
}

use training_core::model::{LearnerId, ModuleId};

/// Optional observer for gating changes.
///
/// Purely informational: no progression logic depends on whether anyone
/// listens. Implementations must be cheap and non-blocking; they run inline
/// with the mutating operation.
pub trait NotificationSink: Send + Sync {
    /// A page moved from locked to unlocked for this learner.
    fn page_unlocked(&self, learner_id: LearnerId, module_id: ModuleId, page_index: usize);
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn page_unlocked(&self, _learner_id: LearnerId, _module_id: ModuleId, _page_index: usize) {}
}

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::ids::{LearnerId, ModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("page {page} score {score} exceeds 100")]
    ScoreOutOfRange { page: usize, score: u8 },

    #[error("overall score {0} exceeds 100")]
    OverallScoreOutOfRange(u8),

    #[error("completed progress is missing its overall score")]
    MissingOverallScore,

    #[error("completed progress is missing its completion time")]
    MissingCompletionTime,

    #[error("non-completed progress carries completion data")]
    UnexpectedCompletionData,

    #[error("completed_at is before started_at")]
    InvalidTimeRange,
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a learner's progress through one module.
///
/// `Completed` is terminal: once reached it is never left, even if quiz
/// pages are retaken afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    NotStarted,
    InProgress,
    Completed,
}

//
// ─── PROGRESS STATE ────────────────────────────────────────────────────────────
//

/// Mutable per-(learner, module) progression state.
///
/// Owns the set of completed page ordinals, the last quiz score per page,
/// and the lifecycle status. Invariant: `status == Completed` exactly when
/// `completed_pages` covers every page of the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    learner_id: LearnerId,
    module_id: ModuleId,
    status: ModuleStatus,
    completed_pages: BTreeSet<usize>,
    page_scores: BTreeMap<usize, u8>,
    overall_score: Option<u8>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    /// Creates fresh progress for a learner opening a module for the first
    /// time.
    #[must_use]
    pub fn new(learner_id: LearnerId, module_id: ModuleId, started_at: DateTime<Utc>) -> Self {
        Self {
            learner_id,
            module_id,
            status: ModuleStatus::NotStarted,
            completed_pages: BTreeSet::new(),
            page_scores: BTreeMap::new(),
            overall_score: None,
            started_at,
            completed_at: None,
        }
    }

    /// Rehydrate progress from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if scores exceed 100, or if completion data
    /// (overall score, completion time) is inconsistent with the status.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        learner_id: LearnerId,
        module_id: ModuleId,
        status: ModuleStatus,
        completed_pages: BTreeSet<usize>,
        page_scores: BTreeMap<usize, u8>,
        overall_score: Option<u8>,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        for (&page, &score) in &page_scores {
            if score > 100 {
                return Err(ProgressError::ScoreOutOfRange { page, score });
            }
        }
        if let Some(score) = overall_score {
            if score > 100 {
                return Err(ProgressError::OverallScoreOutOfRange(score));
            }
        }

        match status {
            ModuleStatus::Completed => {
                if overall_score.is_none() {
                    return Err(ProgressError::MissingOverallScore);
                }
                let Some(completed_at) = completed_at else {
                    return Err(ProgressError::MissingCompletionTime);
                };
                if completed_at < started_at {
                    return Err(ProgressError::InvalidTimeRange);
                }
            }
            ModuleStatus::NotStarted | ModuleStatus::InProgress => {
                if overall_score.is_some() || completed_at.is_some() {
                    return Err(ProgressError::UnexpectedCompletionData);
                }
            }
        }

        Ok(Self {
            learner_id,
            module_id,
            status,
            completed_pages,
            page_scores,
            overall_score,
            started_at,
            completed_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn learner_id(&self) -> LearnerId {
        self.learner_id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    #[must_use]
    pub fn completed_pages(&self) -> &BTreeSet<usize> {
        &self.completed_pages
    }

    #[must_use]
    pub fn page_scores(&self) -> &BTreeMap<usize, u8> {
        &self.page_scores
    }

    #[must_use]
    pub fn score_for(&self, page: usize) -> Option<u8> {
        self.page_scores.get(&page).copied()
    }

    #[must_use]
    pub fn overall_score(&self) -> Option<u8> {
        self.overall_score
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn is_page_complete(&self, page: usize) -> bool {
        self.completed_pages.contains(&page)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == ModuleStatus::Completed
    }

    /// Moves freshly created progress into `InProgress`.
    ///
    /// A completed module stays completed; re-opening never rewinds state.
    pub fn start(&mut self) {
        if self.status == ModuleStatus::NotStarted {
            self.status = ModuleStatus::InProgress;
        }
    }

    /// Drops state the module cannot account for and re-derives the status.
    ///
    /// The remote store may hold progress written against an older revision
    /// of the module (pages removed, module shortened). Ordinals and scores
    /// beyond `page_count` are discarded. A stored `Completed` is terminal
    /// and kept even if the page set no longer covers the module.
    pub fn reconcile(&mut self, page_count: usize) {
        self.completed_pages.retain(|&page| page < page_count);
        self.page_scores.retain(|&page, _| page < page_count);

        if self.status != ModuleStatus::Completed
            && self.completed_pages.len() == page_count
            && page_count > 0
        {
            // The store already held every page; finish the transition it
            // never recorded.
            self.status = ModuleStatus::Completed;
            self.overall_score = Some(mean_score(&self.page_scores));
            self.completed_at.get_or_insert(self.started_at);
        }
    }

    /// Records the latest quiz score for a page, replacing any previous
    /// attempt's score.
    pub fn record_score(&mut self, page: usize, score: u8) {
        self.page_scores.insert(page, score.min(100));
    }

    /// Marks a page complete; returns true if this call completed the whole
    /// module.
    ///
    /// Idempotent: re-completing a page changes nothing, and the completion
    /// transition fires at most once; the aggregate score is never
    /// recomputed afterwards.
    pub fn complete_page(&mut self, page: usize, page_count: usize, now: DateTime<Utc>) -> bool {
        self.completed_pages.insert(page);

        if self.status != ModuleStatus::Completed && self.completed_pages.len() == page_count {
            self.status = ModuleStatus::Completed;
            self.overall_score = Some(mean_score(&self.page_scores));
            self.completed_at = Some(now);
            return true;
        }

        false
    }
}

/// Arithmetic mean of recorded scores, rounded half-up; 0 when no quiz was
/// ever taken.
fn mean_score(scores: &BTreeMap<usize, u8>) -> u8 {
    if scores.is_empty() {
        return 0;
    }
    let sum: u32 = scores.values().map(|&s| u32::from(s)).sum();
    let count = scores.len() as u32;
    u8::try_from((2 * sum + count) / (2 * count)).unwrap_or(100)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn fresh() -> ProgressState {
        ProgressState::new(LearnerId::new(7), ModuleId::new(1), fixed_now())
    }

    #[test]
    fn new_progress_is_not_started() {
        let progress = fresh();
        assert_eq!(progress.status(), ModuleStatus::NotStarted);
        assert!(progress.completed_pages().is_empty());
        assert!(progress.overall_score().is_none());
    }

    #[test]
    fn start_moves_to_in_progress_once() {
        let mut progress = fresh();
        progress.start();
        assert_eq!(progress.status(), ModuleStatus::InProgress);
        progress.start();
        assert_eq!(progress.status(), ModuleStatus::InProgress);
    }

    #[test]
    fn completing_all_pages_completes_module() {
        let mut progress = fresh();
        progress.start();

        assert!(!progress.complete_page(0, 2, fixed_now()));
        assert_eq!(progress.status(), ModuleStatus::InProgress);

        assert!(progress.complete_page(1, 2, fixed_now()));
        assert_eq!(progress.status(), ModuleStatus::Completed);
        assert_eq!(progress.completed_at(), Some(fixed_now()));
    }

    #[test]
    fn overall_score_is_mean_of_quiz_scores() {
        let mut progress = fresh();
        progress.start();
        progress.record_score(0, 100);
        progress.record_score(1, 90);
        progress.complete_page(0, 3, fixed_now());
        progress.complete_page(1, 3, fixed_now());
        progress.complete_page(2, 3, fixed_now());

        assert_eq!(progress.overall_score(), Some(95));
    }

    #[test]
    fn overall_score_is_zero_without_quizzes() {
        let mut progress = fresh();
        progress.start();
        progress.complete_page(0, 1, fixed_now());
        assert_eq!(progress.overall_score(), Some(0));
    }

    #[test]
    fn overall_score_rounds_half_up() {
        let mut progress = fresh();
        progress.start();
        progress.record_score(0, 90);
        progress.record_score(1, 85);
        progress.complete_page(0, 2, fixed_now());
        progress.complete_page(1, 2, fixed_now());

        // (90 + 85) / 2 = 87.5 -> 88
        assert_eq!(progress.overall_score(), Some(88));
    }

    #[test]
    fn complete_page_is_idempotent() {
        let mut progress = fresh();
        progress.start();
        progress.complete_page(0, 2, fixed_now());
        let snapshot = progress.clone();

        progress.complete_page(0, 2, fixed_now());
        assert_eq!(progress, snapshot);
    }

    #[test]
    fn completion_transition_fires_once() {
        let mut progress = fresh();
        progress.start();
        progress.record_score(0, 80);
        progress.complete_page(0, 1, fixed_now());
        assert_eq!(progress.overall_score(), Some(80));

        // a retake after completion updates the page score but never the
        // stored aggregate
        progress.record_score(0, 100);
        let completed_again = progress.complete_page(0, 1, fixed_now());
        assert!(!completed_again);
        assert_eq!(progress.overall_score(), Some(80));
        assert_eq!(progress.score_for(0), Some(100));
    }

    #[test]
    fn from_persisted_rejects_inconsistent_completion() {
        let err = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::Completed,
            BTreeSet::from([0]),
            BTreeMap::new(),
            None,
            fixed_now(),
            Some(fixed_now()),
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::MissingOverallScore);

        let err = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::InProgress,
            BTreeSet::from([0]),
            BTreeMap::new(),
            Some(90),
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::UnexpectedCompletionData);
    }

    #[test]
    fn from_persisted_rejects_score_over_100() {
        let err = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::InProgress,
            BTreeSet::new(),
            BTreeMap::from([(0, 101)]),
            None,
            fixed_now(),
            None,
        )
        .unwrap_err();
        assert_eq!(err, ProgressError::ScoreOutOfRange { page: 0, score: 101 });
    }

    #[test]
    fn reconcile_drops_out_of_range_pages() {
        let mut progress = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::InProgress,
            BTreeSet::from([0, 1, 5]),
            BTreeMap::from([(0, 90), (5, 70)]),
            None,
            fixed_now(),
            None,
        )
        .unwrap();

        progress.reconcile(3);

        assert_eq!(progress.completed_pages(), &BTreeSet::from([0, 1]));
        assert_eq!(progress.score_for(5), None);
        assert_eq!(progress.status(), ModuleStatus::InProgress);
    }

    #[test]
    fn reconcile_finishes_an_unrecorded_completion() {
        let mut progress = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::InProgress,
            BTreeSet::from([0, 1]),
            BTreeMap::from([(0, 90)]),
            None,
            fixed_now(),
            None,
        )
        .unwrap();

        progress.reconcile(2);

        assert_eq!(progress.status(), ModuleStatus::Completed);
        assert_eq!(progress.overall_score(), Some(90));
        assert!(progress.completed_at().is_some());
    }

    #[test]
    fn reconcile_keeps_completed_terminal() {
        let mut progress = ProgressState::from_persisted(
            LearnerId::new(1),
            ModuleId::new(1),
            ModuleStatus::Completed,
            BTreeSet::from([0, 1, 2]),
            BTreeMap::from([(0, 85)]),
            Some(85),
            fixed_now(),
            Some(fixed_now()),
        )
        .unwrap();

        // module shrank to 2 pages; completion is still honored
        progress.reconcile(2);

        assert_eq!(progress.status(), ModuleStatus::Completed);
        assert_eq!(progress.overall_score(), Some(85));
    }
}

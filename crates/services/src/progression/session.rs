use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;

use training_core::access::{can_access, unlocked_pages};
use training_core::evaluator::{self, PASS_THRESHOLD, QuizOutcome};
use training_core::model::{Module, Page, ProgressState};

use super::view::{PageOverview, ProgressOverview};
use crate::error::ProgressionError;

//
// ─── OPERATION OUTCOMES ────────────────────────────────────────────────────────
//

/// Result of an accepted navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub from: usize,
    pub to: usize,
    /// Quiz-free page implicitly completed by advancing past it.
    pub completed_page: Option<usize>,
    pub module_completed: bool,
}

/// Result of completing a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub page: usize,
    pub module_completed: bool,
    /// The aggregate score, present once the module is completed.
    pub overall_score: Option<u8>,
}

/// Result of submitting quiz answers for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSubmission {
    pub page: usize,
    pub outcome: QuizOutcome,
    pub page_completed: bool,
    pub module_completed: bool,
}

//
// ─── LEARNER SESSION ───────────────────────────────────────────────────────────
//

/// In-memory progression state machine for one learner working one module.
///
/// Owns the immutable module content, the mutable `ProgressState` and the
/// page cursor. Every transition consults the access resolver first; all
/// operations are synchronous; persistence is layered on top by
/// `ProgressionService`.
pub struct LearnerSession {
    module: Module,
    progress: ProgressState,
    current: usize,
}

impl LearnerSession {
    pub(crate) fn new(module: Module, progress: ProgressState) -> Self {
        Self {
            module,
            progress,
            current: 0,
        }
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    #[must_use]
    pub fn current_page_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_page(&self) -> &Page {
        &self.module.pages()[self.current]
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress.is_complete()
    }

    /// Whether `target` is currently reachable from the cursor.
    #[must_use]
    pub fn can_access(&self, target: usize) -> bool {
        can_access(
            target,
            self.module.pages(),
            self.progress.completed_pages(),
            self.current,
        )
    }

    /// All page ordinals currently reachable from the cursor.
    #[must_use]
    pub fn unlocked_pages(&self) -> BTreeSet<usize> {
        unlocked_pages(
            self.module.pages(),
            self.progress.completed_pages(),
            self.current,
        )
    }

    /// Move the cursor to `target`.
    ///
    /// Advancing past a quiz-free page that was never explicitly finished
    /// marks it complete as a side effect, before the cursor moves.
    ///
    /// `now` should come from the services layer clock.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::PageOutOfRange` for targets beyond the
    /// module and `ProgressionError::AccessDenied` when the target is
    /// locked; state is untouched in both cases.
    pub fn navigate(
        &mut self,
        target: usize,
        now: DateTime<Utc>,
    ) -> Result<NavigationOutcome, ProgressionError> {
        let page_count = self.module.page_count();
        if target >= page_count {
            return Err(ProgressionError::PageOutOfRange {
                index: target,
                pages: page_count,
            });
        }
        if !self.can_access(target) {
            return Err(ProgressionError::AccessDenied(target));
        }

        let from = self.current;
        let mut completed_page = None;
        let mut module_completed = false;

        if target > from {
            let page = &self.module.pages()[from];
            if !page.requires_quiz() && !self.progress.is_page_complete(from) {
                module_completed = self.progress.complete_page(from, page_count, now);
                completed_page = Some(from);
            }
        }

        self.current = target;
        Ok(NavigationOutcome {
            from,
            to: target,
            completed_page,
            module_completed,
        })
    }

    /// Explicitly mark a page complete (the "finish" action on quiz-free
    /// pages, typically the last one).
    ///
    /// `now` should come from the services layer clock.
    ///
    /// # Errors
    ///
    /// Returns `PageOutOfRange`/`AccessDenied` as `navigate` does, and
    /// `QuizRequired` when the page carries a quiz without a recorded
    /// passing score, so the gate cannot be completed around.
    pub fn complete_page(
        &mut self,
        page: usize,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, ProgressionError> {
        let page_count = self.module.page_count();
        if page >= page_count {
            return Err(ProgressionError::PageOutOfRange {
                index: page,
                pages: page_count,
            });
        }
        if !self.can_access(page) {
            return Err(ProgressionError::AccessDenied(page));
        }
        if self.module.pages()[page].requires_quiz() {
            let passing = self
                .progress
                .score_for(page)
                .is_some_and(|score| score >= PASS_THRESHOLD);
            if !passing {
                return Err(ProgressionError::QuizRequired(page));
            }
        }

        let module_completed = self.progress.complete_page(page, page_count, now);
        Ok(CompletionOutcome {
            page,
            module_completed,
            overall_score: self.progress.overall_score(),
        })
    }

    /// Score a quiz submission for a page.
    ///
    /// The attempt's score is recorded unconditionally: the most recent
    /// attempt is always the value of record. A passing attempt also
    /// completes the page; a failing one changes nothing else and the
    /// learner stays where they are.
    ///
    /// `now` should come from the services layer clock.
    ///
    /// # Errors
    ///
    /// Returns `NoQuiz` for quiz-free pages, `PageOutOfRange`/`AccessDenied`
    /// for unreachable ones, and propagates evaluator errors (malformed
    /// answers) with state untouched.
    pub fn submit_quiz(
        &mut self,
        page: usize,
        answers: &[Option<usize>],
        now: DateTime<Utc>,
    ) -> Result<QuizSubmission, ProgressionError> {
        let page_count = self.module.page_count();
        if page >= page_count {
            return Err(ProgressionError::PageOutOfRange {
                index: page,
                pages: page_count,
            });
        }
        if !self.can_access(page) {
            return Err(ProgressionError::AccessDenied(page));
        }
        let Some(quiz) = self.module.pages()[page].quiz() else {
            return Err(ProgressionError::NoQuiz(page));
        };

        let outcome = evaluator::evaluate(quiz.questions(), answers)?;
        self.progress.record_score(page, outcome.score);

        let mut page_completed = false;
        let mut module_completed = false;
        if outcome.passed {
            let completion = self.complete_page(page, now)?;
            page_completed = true;
            module_completed = completion.module_completed;
        }

        Ok(QuizSubmission {
            page,
            outcome,
            page_completed,
            module_completed,
        })
    }

    /// Summary of the current progression, useful for UI.
    #[must_use]
    pub fn overview(&self) -> ProgressOverview {
        let unlocked = self.unlocked_pages();
        let pages = self
            .module
            .pages()
            .iter()
            .enumerate()
            .map(|(index, page)| PageOverview {
                index,
                title: page.title().to_owned(),
                has_quiz: page.requires_quiz(),
                completed: self.progress.is_page_complete(index),
                unlocked: unlocked.contains(&index),
                score: self.progress.score_for(index),
            })
            .collect();

        let total = self.module.page_count();
        let completed = self.progress.completed_pages().len();
        ProgressOverview {
            status: self.progress.status(),
            total_pages: total,
            completed_pages: completed,
            remaining: total.saturating_sub(completed),
            overall_score: self.progress.overall_score(),
            pages,
        }
    }

}

impl fmt::Debug for LearnerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LearnerSession")
            .field("module_id", &self.module.id())
            .field("learner_id", &self.progress.learner_id())
            .field("current", &self.current)
            .field("status", &self.progress.status())
            .field("completed", &self.progress.completed_pages().len())
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use training_core::model::{
        LearnerId, Module, ModuleId, ModuleStatus, Page, Quiz, QuizQuestion,
    };
    use training_core::time::fixed_now;

    fn quiz_page(title: &str) -> Page {
        // two questions, correct answers are options 1 and 0
        let q0 = QuizQuestion::new("Q1", vec!["a".into(), "b".into()], 1).unwrap();
        let q1 = QuizQuestion::new("Q2", vec!["a".into(), "b".into()], 0).unwrap();
        Page::new(title, Some(Quiz::new(vec![q0, q1]).unwrap())).unwrap()
    }

    fn plain_page(title: &str) -> Page {
        Page::new(title, None).unwrap()
    }

    fn build_session(pages: Vec<Page>) -> LearnerSession {
        let module = Module::new(
            ModuleId::new(1),
            "Test Module",
            None,
            None,
            pages,
            fixed_now(),
        )
        .unwrap();
        let mut progress = ProgressState::new(LearnerId::new(7), module.id(), fixed_now());
        progress.start();
        LearnerSession::new(module, progress)
    }

    const ALL_CORRECT: [Option<usize>; 2] = [Some(1), Some(0)];
    const ALL_WRONG: [Option<usize>; 2] = [Some(0), Some(1)];

    #[test]
    fn navigate_to_locked_page_is_denied_without_state_change() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);

        let err = session.navigate(1, fixed_now()).unwrap_err();
        assert!(matches!(err, ProgressionError::AccessDenied(1)));
        assert_eq!(session.current_page_index(), 0);
        assert!(session.progress().completed_pages().is_empty());
    }

    #[test]
    fn navigate_out_of_range_is_rejected() {
        let mut session = build_session(vec![plain_page("p0")]);
        let err = session.navigate(3, fixed_now()).unwrap_err();
        assert!(matches!(
            err,
            ProgressionError::PageOutOfRange { index: 3, pages: 1 }
        ));
    }

    #[test]
    fn advancing_past_quiz_free_page_completes_it() {
        let mut session = build_session(vec![plain_page("p0"), plain_page("p1"), plain_page("p2")]);

        let outcome = session.navigate(1, fixed_now()).unwrap();
        assert_eq!(outcome.completed_page, Some(0));
        assert!(session.progress().is_page_complete(0));
        assert_eq!(session.current_page_index(), 1);
    }

    #[test]
    fn navigating_backwards_completes_nothing() {
        let mut session = build_session(vec![plain_page("p0"), plain_page("p1")]);
        session.navigate(1, fixed_now()).unwrap();

        let outcome = session.navigate(0, fixed_now()).unwrap();
        assert_eq!(outcome.completed_page, None);
        assert!(!session.progress().is_page_complete(1));
    }

    #[test]
    fn failed_quiz_records_score_but_completes_nothing() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);

        let submission = session.submit_quiz(0, &ALL_WRONG, fixed_now()).unwrap();
        assert!(!submission.outcome.passed);
        assert_eq!(submission.outcome.score, 0);
        assert!(!submission.page_completed);
        assert_eq!(session.progress().score_for(0), Some(0));
        assert!(!session.progress().is_page_complete(0));
        assert_eq!(session.current_page_index(), 0);
    }

    #[test]
    fn retake_after_failure_replaces_score_and_unlocks() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);

        // one of two correct: 50, fail
        let failed = session
            .submit_quiz(0, &[Some(1), Some(1)], fixed_now())
            .unwrap();
        assert_eq!(failed.outcome.score, 50);
        assert!(!session.can_access(1));

        let passed = session.submit_quiz(0, &ALL_CORRECT, fixed_now()).unwrap();
        assert!(passed.outcome.passed);
        assert!(passed.page_completed);
        assert_eq!(session.progress().score_for(0), Some(100));
        assert!(session.can_access(1));
    }

    #[test]
    fn malformed_answers_leave_state_untouched() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);

        let err = session.submit_quiz(0, &[Some(1)], fixed_now()).unwrap_err();
        assert!(matches!(err, ProgressionError::Evaluate(_)));
        assert!(session.progress().page_scores().is_empty());
    }

    #[test]
    fn submit_quiz_on_quiz_free_page_is_invalid() {
        let mut session = build_session(vec![plain_page("p0")]);
        let err = session.submit_quiz(0, &[], fixed_now()).unwrap_err();
        assert!(matches!(err, ProgressionError::NoQuiz(0)));
    }

    #[test]
    fn completing_quiz_page_directly_requires_passing_score() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);

        let err = session.complete_page(0, fixed_now()).unwrap_err();
        assert!(matches!(err, ProgressionError::QuizRequired(0)));

        session.submit_quiz(0, &ALL_CORRECT, fixed_now()).unwrap();
        // already completed by the passing submission; re-completing is a
        // no-op
        let outcome = session.complete_page(0, fixed_now()).unwrap();
        assert!(!outcome.module_completed);
    }

    #[test]
    fn full_module_walk_completes_with_aggregate_score() {
        let mut session = build_session(vec![
            quiz_page("p0"),
            quiz_page("p1"),
            plain_page("p2"),
        ]);

        let s0 = session.submit_quiz(0, &ALL_CORRECT, fixed_now()).unwrap();
        assert_eq!(s0.outcome.score, 100);
        session.navigate(1, fixed_now()).unwrap();

        let s1 = session.submit_quiz(1, &ALL_CORRECT, fixed_now()).unwrap();
        assert!(s1.outcome.passed);
        session.navigate(2, fixed_now()).unwrap();

        let finish = session.complete_page(2, fixed_now()).unwrap();
        assert!(finish.module_completed);
        assert_eq!(session.progress().status(), ModuleStatus::Completed);
        assert_eq!(finish.overall_score, Some(100));
    }

    #[test]
    fn overview_reports_per_page_state() {
        let mut session = build_session(vec![quiz_page("p0"), plain_page("p1")]);
        session.submit_quiz(0, &ALL_CORRECT, fixed_now()).unwrap();

        let overview = session.overview();
        assert_eq!(overview.total_pages, 2);
        assert_eq!(overview.completed_pages, 1);
        assert_eq!(overview.remaining, 1);
        assert_eq!(overview.status, ModuleStatus::InProgress);
        assert!(overview.pages[0].completed);
        assert_eq!(overview.pages[0].score, Some(100));
        assert!(overview.pages[1].unlocked);
        assert!(!overview.pages[1].has_quiz);
    }
}

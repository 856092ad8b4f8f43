use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use storage::repository::{AttemptRepository, ModuleRepository, ProgressRepository};
use training_core::Clock;
use training_core::model::{LearnerId, ModuleId, ProgressState, QuizAttempt};

use super::notify::NotificationSink;
use super::session::{CompletionOutcome, LearnerSession, NavigationOutcome, QuizSubmission};
use crate::error::ProgressionError;

/// Orchestrates module opening and persisted progression.
///
/// Every mutating call applies the in-memory transition first and persists
/// afterwards (optimistic update): a failed save surfaces as
/// `ProgressionError::Storage` while the session keeps the new state, so
/// callers retry the save rather than recompute.
#[derive(Clone)]
pub struct ProgressionService {
    clock: Clock,
    modules: Arc<dyn ModuleRepository>,
    progress: Arc<dyn ProgressRepository>,
    attempts: Arc<dyn AttemptRepository>,
    sink: Option<Arc<dyn NotificationSink>>,
}

impl ProgressionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        modules: Arc<dyn ModuleRepository>,
        progress: Arc<dyn ProgressRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            modules,
            progress,
            attempts,
            sink: None,
        }
    }

    #[must_use]
    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Open a module for a learner, creating or resuming progress.
    ///
    /// First-time opens create progress and move it straight to
    /// `InProgress`; resumed progress is reconciled against the module's
    /// current page count. Completed modules stay viewable and completed.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::ModuleNotFound` for unknown modules and
    /// `ProgressionError::Storage` for load/save failures.
    pub async fn open(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<LearnerSession, ProgressionError> {
        let module = self
            .modules
            .get_module(module_id)
            .await?
            .ok_or(ProgressionError::ModuleNotFound(module_id))?;

        let now = self.clock.now();
        let progress = match self.progress.load(learner_id, module_id).await? {
            Some(mut progress) => {
                progress.reconcile(module.page_count());
                progress.start();
                progress
            }
            None => {
                let mut progress = ProgressState::new(learner_id, module_id, now);
                progress.start();
                progress
            }
        };

        debug!(%learner_id, %module_id, status = ?progress.status(), "module opened");
        self.progress.save(&progress).await?;
        Ok(LearnerSession::new(module, progress))
    }

    /// Navigate the session and persist the result.
    ///
    /// # Errors
    ///
    /// Propagates session errors with state untouched; a failed save
    /// surfaces as `ProgressionError::Storage` with the in-memory move kept.
    pub async fn navigate(
        &self,
        session: &mut LearnerSession,
        target: usize,
    ) -> Result<NavigationOutcome, ProgressionError> {
        let before = self.unlocked_before(session);
        let now = self.clock.now();
        let outcome = session.navigate(target, now)?;

        debug!(
            learner_id = %session.progress().learner_id(),
            module_id = %session.module().id(),
            from = outcome.from,
            to = outcome.to,
            "navigated"
        );
        self.emit_unlocks(session, before);
        self.save(session).await?;
        Ok(outcome)
    }

    /// Explicitly complete a page and persist the result.
    ///
    /// # Errors
    ///
    /// Propagates session errors with state untouched; a failed save
    /// surfaces as `ProgressionError::Storage` with the completion kept.
    pub async fn complete_page(
        &self,
        session: &mut LearnerSession,
        page: usize,
    ) -> Result<CompletionOutcome, ProgressionError> {
        let before = self.unlocked_before(session);
        let now = self.clock.now();
        let outcome = session.complete_page(page, now)?;

        if outcome.module_completed {
            debug!(
                learner_id = %session.progress().learner_id(),
                module_id = %session.module().id(),
                overall_score = outcome.overall_score,
                "module completed"
            );
        }
        self.emit_unlocks(session, before);
        self.save(session).await?;
        Ok(outcome)
    }

    /// Score a quiz submission, persist progress and append the attempt to
    /// the history log.
    ///
    /// # Errors
    ///
    /// Propagates evaluator/session errors with state untouched; a failed
    /// save surfaces as `ProgressionError::Storage` with the recorded score
    /// (and any completion) kept in memory.
    pub async fn submit_quiz(
        &self,
        session: &mut LearnerSession,
        page: usize,
        answers: &[Option<usize>],
    ) -> Result<QuizSubmission, ProgressionError> {
        let before = self.unlocked_before(session);
        let now = self.clock.now();
        let submission = session.submit_quiz(page, answers, now)?;

        debug!(
            learner_id = %session.progress().learner_id(),
            module_id = %session.module().id(),
            page,
            score = submission.outcome.score,
            passed = submission.outcome.passed,
            "quiz submitted"
        );
        self.emit_unlocks(session, before);

        let attempt = QuizAttempt::new(
            page,
            submission.outcome.score,
            submission.outcome.passed,
            now,
        );
        self.save(session).await?;
        self.attempts
            .append_attempt(
                session.progress().learner_id(),
                session.module().id(),
                &attempt,
            )
            .await?;

        Ok(submission)
    }

    /// Re-persist the session after a failed save.
    ///
    /// The in-memory state is authoritative; this pushes it to the store
    /// again (e.g. after a transient storage error).
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::Storage` if persistence fails again.
    pub async fn retry_save(&self, session: &LearnerSession) -> Result<(), ProgressionError> {
        self.save(session).await
    }

    /// Quiz attempt history for the session's learner and module.
    ///
    /// # Errors
    ///
    /// Returns `ProgressionError::Storage` on read failures.
    pub async fn attempt_history(
        &self,
        session: &LearnerSession,
    ) -> Result<Vec<QuizAttempt>, ProgressionError> {
        Ok(self
            .attempts
            .list_attempts(session.progress().learner_id(), session.module().id())
            .await?)
    }

    async fn save(&self, session: &LearnerSession) -> Result<(), ProgressionError> {
        if let Err(err) = self.progress.save(session.progress()).await {
            warn!(
                learner_id = %session.progress().learner_id(),
                module_id = %session.module().id(),
                error = %err,
                "progress save failed; in-memory state kept"
            );
            return Err(err.into());
        }
        Ok(())
    }

    // Diffing is only worth the work when someone listens.
    fn unlocked_before(&self, session: &LearnerSession) -> Option<BTreeSet<usize>> {
        self.sink.as_ref().map(|_| session.unlocked_pages())
    }

    fn emit_unlocks(&self, session: &LearnerSession, before: Option<BTreeSet<usize>>) {
        let (Some(sink), Some(before)) = (&self.sink, before) else {
            return;
        };
        let learner_id = session.progress().learner_id();
        let module_id = session.module().id();
        for &page in session.unlocked_pages().difference(&before) {
            sink.page_unlocked(learner_id, module_id, page);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storage::repository::{InMemoryRepository, StorageError};
    use training_core::model::{Module, Page, Quiz, QuizQuestion};
    use training_core::time::{fixed_clock, fixed_now};

    fn build_module() -> Module {
        let question = QuizQuestion::new("Q", vec!["a".into(), "b".into()], 0).unwrap();
        let pages = vec![
            Page::new("Basics", Some(Quiz::new(vec![question]).unwrap())).unwrap(),
            Page::new("Summary", None).unwrap(),
        ];
        Module::new(ModuleId::new(1), "Module", None, None, pages, fixed_now()).unwrap()
    }

    fn service_over(repo: &InMemoryRepository) -> ProgressionService {
        ProgressionService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    #[tokio::test]
    async fn open_creates_and_persists_in_progress_state() {
        let repo = InMemoryRepository::new();
        repo.upsert_module(&build_module()).await.unwrap();
        let service = service_over(&repo);

        let session = service
            .open(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap();
        assert_eq!(
            session.progress().status(),
            training_core::model::ModuleStatus::InProgress
        );

        let stored = repo
            .load(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, *session.progress());
    }

    #[tokio::test]
    async fn open_unknown_module_fails() {
        let repo = InMemoryRepository::new();
        let service = service_over(&repo);

        let err = service
            .open(LearnerId::new(7), ModuleId::new(9))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::ModuleNotFound(id) if id == ModuleId::new(9)));
    }

    #[tokio::test]
    async fn submit_quiz_appends_attempt_history() {
        let repo = InMemoryRepository::new();
        repo.upsert_module(&build_module()).await.unwrap();
        let service = service_over(&repo);

        let mut session = service
            .open(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap();
        service
            .submit_quiz(&mut session, 0, &[Some(1)])
            .await
            .unwrap();
        service
            .submit_quiz(&mut session, 0, &[Some(0)])
            .await
            .unwrap();

        let history = service.attempt_history(&session).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(!history[0].passed);
        assert!(history[1].passed);
    }

    #[derive(Default)]
    struct RecordingSink {
        unlocked: Mutex<Vec<usize>>,
    }

    impl NotificationSink for RecordingSink {
        fn page_unlocked(&self, _learner: LearnerId, _module: ModuleId, page_index: usize) {
            self.unlocked.lock().unwrap().push(page_index);
        }
    }

    #[tokio::test]
    async fn passing_quiz_emits_unlock_notification() {
        let repo = InMemoryRepository::new();
        repo.upsert_module(&build_module()).await.unwrap();
        let sink = Arc::new(RecordingSink::default());
        let service = service_over(&repo).with_notifications(sink.clone());

        let mut session = service
            .open(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap();
        service
            .submit_quiz(&mut session, 0, &[Some(0)])
            .await
            .unwrap();

        assert_eq!(*sink.unlocked.lock().unwrap(), vec![1]);
    }

    /// Progress repository that accepts loads but refuses every save.
    struct FailingSaves {
        inner: InMemoryRepository,
        fail: Mutex<bool>,
    }

    #[async_trait]
    impl ProgressRepository for FailingSaves {
        async fn load(
            &self,
            learner_id: LearnerId,
            module_id: ModuleId,
        ) -> Result<Option<ProgressState>, StorageError> {
            self.inner.load(learner_id, module_id).await
        }

        async fn save(&self, progress: &ProgressState) -> Result<(), StorageError> {
            if *self.fail.lock().unwrap() {
                return Err(StorageError::Connection("store offline".into()));
            }
            self.inner.save(progress).await
        }
    }

    #[tokio::test]
    async fn failed_save_keeps_optimistic_state_and_retries() {
        let repo = InMemoryRepository::new();
        repo.upsert_module(&build_module()).await.unwrap();
        let failing = Arc::new(FailingSaves {
            inner: repo.clone(),
            fail: Mutex::new(false),
        });
        let service = ProgressionService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            failing.clone(),
            Arc::new(repo.clone()),
        );

        let mut session = service
            .open(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap();

        *failing.fail.lock().unwrap() = true;
        let err = service
            .submit_quiz(&mut session, 0, &[Some(0)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressionError::Storage(_)));
        // the in-memory state advanced despite the failed save
        assert!(session.progress().is_page_complete(0));

        *failing.fail.lock().unwrap() = false;
        service.retry_save(&session).await.unwrap();
        let stored = repo
            .load(LearnerId::new(7), ModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_page_complete(0));
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use training_core::model::{
    LearnerId, Module, ModuleId, ModuleStatus, ProgressError, ProgressState, QuizAttempt,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for learner progress.
///
/// This mirrors the domain `ProgressState` so adapters can
/// serialize/deserialize without leaking storage concerns into the domain
/// layer. Loosely-shaped store data is validated here, at the boundary,
/// instead of being trusted downstream.
#[derive(Debug, Clone)]
pub struct ProgressRecord {
    pub learner_id: LearnerId,
    pub module_id: ModuleId,
    pub status: ModuleStatus,
    pub completed_pages: BTreeSet<usize>,
    pub page_scores: BTreeMap<usize, u8>,
    pub overall_score: Option<u8>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    #[must_use]
    pub fn from_progress(progress: &ProgressState) -> Self {
        Self {
            learner_id: progress.learner_id(),
            module_id: progress.module_id(),
            status: progress.status(),
            completed_pages: progress.completed_pages().clone(),
            page_scores: progress.page_scores().clone(),
            overall_score: progress.overall_score(),
            started_at: progress.started_at(),
            completed_at: progress.completed_at(),
        }
    }

    /// Convert the record back into domain `ProgressState`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if scores are out of range or completion data
    /// is inconsistent with the stored status.
    pub fn into_progress(self) -> Result<ProgressState, ProgressError> {
        ProgressState::from_persisted(
            self.learner_id,
            self.module_id,
            self.status,
            self.completed_pages,
            self.page_scores,
            self.overall_score,
            self.started_at,
            self.completed_at,
        )
    }
}

/// Content provider contract: immutable module data the core only reads.
#[async_trait]
pub trait ModuleRepository: Send + Sync {
    /// Persist or update a module with its pages and quizzes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError>;

    /// Fetch a module by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError>;

    /// List modules ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn list_modules(&self, limit: u32) -> Result<Vec<Module>, StorageError>;
}

/// Progress store contract.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Load progress for a (learner, module) pair, if any exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection failures or when stored data
    /// fails boundary validation.
    async fn load(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Option<ProgressState>, StorageError>;

    /// Persist the full progress state, replacing any previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn save(&self, progress: &ProgressState) -> Result<(), StorageError>;
}

/// Append-only quiz attempt history.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append one attempt record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn append_attempt(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError>;

    /// List attempts for a (learner, module) pair in submission order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or mapping failures.
    async fn list_attempts(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Vec<QuizAttempt>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    modules: Arc<Mutex<HashMap<ModuleId, Module>>>,
    progress: Arc<Mutex<HashMap<(LearnerId, ModuleId), ProgressState>>>,
    attempts: Arc<Mutex<HashMap<(LearnerId, ModuleId), Vec<QuizAttempt>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModuleRepository for InMemoryRepository {
    async fn upsert_module(&self, module: &Module) -> Result<(), StorageError> {
        let mut guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(module.id(), module.clone());
        Ok(())
    }

    async fn get_module(&self, id: ModuleId) -> Result<Option<Module>, StorageError> {
        let guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_modules(&self, limit: u32) -> Result<Vec<Module>, StorageError> {
        let guard = self
            .modules
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut modules: Vec<Module> = guard.values().cloned().collect();
        modules.sort_by_key(Module::id);
        modules.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(modules)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Option<ProgressState>, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&(learner_id, module_id)).cloned())
    }

    async fn save(&self, progress: &ProgressState) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(
            (progress.learner_id(), progress.module_id()),
            progress.clone(),
        );
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
        attempt: &QuizAttempt,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .entry((learner_id, module_id))
            .or_default()
            .push(attempt.clone());
        Ok(())
    }

    async fn list_attempts(
        &self,
        learner_id: LearnerId,
        module_id: ModuleId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&(learner_id, module_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// Aggregates the repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub modules: Arc<dyn ModuleRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let modules: Arc<dyn ModuleRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self {
            modules,
            progress,
            attempts,
        }
    }
}

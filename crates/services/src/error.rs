//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use training_core::evaluator::EvaluateError;
use training_core::model::{ModuleId, ProgressError};

/// Errors emitted by the progression services.
///
/// Three recoverable classes: access denials (`AccessDenied`,
/// `QuizRequired`) leave state untouched; invalid input (`PageOutOfRange`,
/// `NoQuiz`, `Evaluate`) leaves state untouched; persistence failures
/// (`Storage`) surface after the in-memory transition has already been
/// applied.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressionError {
    #[error("module {0} not found")]
    ModuleNotFound(ModuleId),

    #[error("page {0} is locked")]
    AccessDenied(usize),

    #[error("page {0} requires a passed quiz before completion")]
    QuizRequired(usize),

    #[error("page {index} out of range for module with {pages} pages")]
    PageOutOfRange { index: usize, pages: usize },

    #[error("page {0} has no quiz")]
    NoQuiz(usize),

    #[error(transparent)]
    Evaluate(#[from] EvaluateError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

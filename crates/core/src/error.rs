use thiserror::Error;

use crate::evaluator::EvaluateError;
use crate::model::{ModuleError, PageError, ProgressError, QuizError};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),
}

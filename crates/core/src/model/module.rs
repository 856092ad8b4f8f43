use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::{ModuleId, TrainingPathId};
use crate::model::page::Page;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("module title cannot be empty")]
    EmptyTitle,

    #[error("module must contain at least one page")]
    NoPages,
}

//
// ─── MODULE ────────────────────────────────────────────────────────────────────
//

/// A named unit of training content composed of ordered pages.
///
/// Modules are owned by the content store; the progression core only reads
/// them. A page's ordinal is its index in `pages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    id: ModuleId,
    title: String,
    description: Option<String>,
    training_path: Option<TrainingPathId>,
    pages: Vec<Page>,
    created_at: DateTime<Utc>,
}

impl Module {
    /// Creates a new Module.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyTitle` if the title is empty or
    /// whitespace-only, `ModuleError::NoPages` if the page list is empty.
    pub fn new(
        id: ModuleId,
        title: impl Into<String>,
        description: Option<String>,
        training_path: Option<TrainingPathId>,
        pages: Vec<Page>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ModuleError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ModuleError::EmptyTitle);
        }
        if pages.is_empty() {
            return Err(ModuleError::NoPages);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(Self {
            id,
            title: title.trim().to_owned(),
            description,
            training_path,
            pages,
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn training_path(&self) -> Option<TrainingPathId> {
        self.training_path
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

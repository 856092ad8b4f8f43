use thiserror::Error;

use crate::model::quiz::Quiz;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PageError {
    #[error("page title cannot be empty")]
    EmptyTitle,
}

//
// ─── PAGE ──────────────────────────────────────────────────────────────────────
//

/// One screen of content within a module, optionally carrying a mandatory
/// quiz. Pages are immutable once loaded and owned by their `Module`; the
/// ordinal position is the index in the module's page list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    title: String,
    quiz: Option<Quiz>,
}

impl Page {
    /// Creates a new page.
    ///
    /// # Errors
    ///
    /// Returns `PageError::EmptyTitle` if the title is empty or
    /// whitespace-only.
    pub fn new(title: impl Into<String>, quiz: Option<Quiz>) -> Result<Self, PageError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(PageError::EmptyTitle);
        }

        Ok(Self {
            title: title.trim().to_owned(),
            quiz,
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    /// True when the page gates progression behind a passed quiz.
    #[must_use]
    pub fn requires_quiz(&self) -> bool {
        self.quiz.is_some()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

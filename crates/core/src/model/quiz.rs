use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least two answer options, got {0}")]
    TooFewOptions(usize),

    #[error("answer option cannot be empty")]
    EmptyOption,

    #[error("correct option index {index} out of range for {options} options")]
    CorrectOptionOutOfRange { index: usize, options: usize },

    #[error("quiz must contain at least one question")]
    NoQuestions,
}

//
// ─── QUIZ QUESTION ─────────────────────────────────────────────────────────────
//

/// A single multiple-choice question: prompt, ordered answer options, and
/// the index of the correct option. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizQuestion {
    prompt: String,
    options: Vec<String>,
    correct_option: usize,
}

impl QuizQuestion {
    /// Creates a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuizError` if the prompt or any option is empty, fewer than
    /// two options are given, or `correct_option` is out of range.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
    ) -> Result<Self, QuizError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuizError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuizError::TooFewOptions(options.len()));
        }
        if options.iter().any(|o| o.trim().is_empty()) {
            return Err(QuizError::EmptyOption);
        }
        if correct_option >= options.len() {
            return Err(QuizError::CorrectOptionOutOfRange {
                index: correct_option,
                options: options.len(),
            });
        }

        Ok(Self {
            prompt: prompt.trim().to_owned(),
            options,
            correct_option,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> usize {
        self.correct_option
    }

    /// Returns true if the given selection picks the correct option.
    ///
    /// `None` is the "no selection" sentinel and never matches.
    #[must_use]
    pub fn is_correct(&self, selected: Option<usize>) -> bool {
        selected == Some(self.correct_option)
    }
}

//
// ─── QUIZ ──────────────────────────────────────────────────────────────────────
//

/// An ordered, non-empty set of questions attached to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    questions: Vec<QuizQuestion>,
}

impl Quiz {
    /// Creates a quiz from an ordered question list.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoQuestions` if the list is empty.
    pub fn new(questions: Vec<QuizQuestion>) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        Ok(Self { questions })
    }

    #[must_use]
    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

//
// ─── QUIZ ATTEMPT ──────────────────────────────────────────────────────────────
//

/// Record of a single quiz submission, kept for history/audit.
///
/// Core logic never reads attempts back; the last score of record lives in
/// `ProgressState::page_scores`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub page_index: usize,
    pub score: u8,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(page_index: usize, score: u8, passed: bool, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_index,
            score,
            passed,
            submitted_at,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#![forbid(unsafe_code)]

pub mod error;
pub mod progression;

pub use training_core::Clock;

pub use error::ProgressionError;

pub use progression::{
    CompletionOutcome, LearnerSession, NavigationOutcome, NotificationSink, NullSink,
    PageOverview, ProgressOverview, ProgressionService, QuizSubmission,
};

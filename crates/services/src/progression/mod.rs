mod notify;
mod session;
mod view;
mod workflow;

// Public API of the progression subsystem.
pub use crate::error::ProgressionError;
pub use notify::{NotificationSink, NullSink};
pub use session::{CompletionOutcome, LearnerSession, NavigationOutcome, QuizSubmission};
pub use view::{PageOverview, ProgressOverview};
pub use workflow::ProgressionService;

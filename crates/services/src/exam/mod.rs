mod progress;
mod session;
mod workflow;

// Public API of the exam subsystem.
pub use crate::error::SessionError;
pub use progress::ExamProgress;
pub use session::{ExamSession, Finalization, Mutation, SaveState, TickOutcome};
pub use workflow::{ExamLoopService, SubmitOutcome};

mod attempt;
mod ids;
mod question;
mod result;
mod settings;
mod user;

pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, TestId, UserId};

pub use attempt::{AttemptStatus, IntegrityViolation, SubmitTrigger};
pub use question::{AnswerOption, Question, QuestionError, QuestionKind};
pub use result::{AttemptResult, AttemptStamp, QuestionOutcome, ResultError};
pub use settings::{ExamSettings, SettingsError};
pub use test::{Test, TestError};
pub use user::UserIdentity;

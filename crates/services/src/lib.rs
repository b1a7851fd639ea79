#![forbid(unsafe_code)]

pub mod error;
pub mod exam;
pub mod identity;

pub use cbt_core::Clock;

pub use error::SessionError;
pub use exam::{
    ExamLoopService, ExamProgress, ExamSession, Finalization, Mutation, SaveState,
    SubmitOutcome, TickOutcome,
};
pub use identity::{IdentityProvider, StaticIdentity};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one attempt. Both `Submitted` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Abandoned,
}

impl AttemptStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

/// What caused an attempt to be finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    TimeExpired,
}

impl SubmitTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::TimeExpired => "time_expired",
        }
    }
}

/// A logged loss of visibility during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityViolation {
    pub occurred_at: DateTime<Utc>,
    /// 1-based, strictly increasing within the attempt.
    pub sequence: u32,
}

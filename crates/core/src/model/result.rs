use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::attempt::SubmitTrigger;
use crate::model::ids::{AttemptId, OptionId, QuestionId, TestId, UserId};
use crate::scoring::ScoreSheet;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("completed_at is before started_at")]
    InvalidTimeRange,

    #[error("too many questions for a single result: {len}")]
    TooManyQuestions { len: usize },

    #[error("correct answers ({correct}) do not match the breakdown ({counted})")]
    CountMismatch { correct: u32, counted: u32 },

    #[error("total questions ({total}) do not match the breakdown ({counted})")]
    TotalMismatch { total: u32, counted: u32 },
}

/// Correctness of a single presented question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question_id: QuestionId,
    /// Selection as captured at finalize, ascending by id.
    pub selected: Vec<OptionId>,
    pub correct: bool,
}

/// Identity and timing of the attempt a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStamp {
    pub attempt_id: AttemptId,
    pub test_id: TestId,
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub trigger: SubmitTrigger,
}

/// Scored outcome of a finished attempt, handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    attempt_id: AttemptId,
    test_id: TestId,
    user_id: UserId,
    trigger: SubmitTrigger,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
    total_questions: u32,
    correct_answers: u32,
    score: f64,
    outcomes: Vec<QuestionOutcome>,
    violation_count: u32,
}

impl AttemptResult {
    /// Assemble a result from a freshly computed score sheet.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::InvalidTimeRange` if `completed_at` is before `started_at`.
    pub fn from_score(
        stamp: AttemptStamp,
        sheet: ScoreSheet,
        violation_count: u32,
    ) -> Result<Self, ResultError> {
        if stamp.completed_at < stamp.started_at {
            return Err(ResultError::InvalidTimeRange);
        }
        Ok(Self {
            attempt_id: stamp.attempt_id,
            test_id: stamp.test_id,
            user_id: stamp.user_id,
            trigger: stamp.trigger,
            started_at: stamp.started_at,
            completed_at: stamp.completed_at,
            total_questions: sheet.total_questions,
            correct_answers: sheet.correct_answers,
            score: sheet.score,
            outcomes: sheet.outcomes,
            violation_count,
        })
    }

    /// Rehydrate a result from persisted storage.
    ///
    /// The score is recomputed from the counts so a stored row can never carry a
    /// value that disagrees with its breakdown.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if timestamps or counts are inconsistent.
    pub fn from_persisted(
        stamp: AttemptStamp,
        outcomes: Vec<QuestionOutcome>,
        total_questions: u32,
        correct_answers: u32,
        violation_count: u32,
    ) -> Result<Self, ResultError> {
        let counted = u32::try_from(outcomes.len()).map_err(|_| ResultError::TooManyQuestions {
            len: outcomes.len(),
        })?;
        if counted != total_questions {
            return Err(ResultError::TotalMismatch {
                total: total_questions,
                counted,
            });
        }
        let counted_correct = outcomes.iter().filter(|o| o.correct).count();
        let counted_correct = u32::try_from(counted_correct).unwrap_or(u32::MAX);
        if counted_correct != correct_answers {
            return Err(ResultError::CountMismatch {
                correct: correct_answers,
                counted: counted_correct,
            });
        }

        let sheet = ScoreSheet::from_outcomes(outcomes);
        Self::from_score(stamp, sheet, violation_count)
    }

    #[must_use]
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn trigger(&self) -> SubmitTrigger {
        self.trigger
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn correct_answers(&self) -> u32 {
        self.correct_answers
    }

    /// Percentage in `[0, 100]`, possibly fractional.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn outcomes(&self) -> &[QuestionOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn violation_count(&self) -> u32 {
        self.violation_count
    }

    /// Wall-clock time spent between start and finalize.
    #[must_use]
    pub fn time_spent(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }

    #[must_use]
    pub fn stamp(&self) -> AttemptStamp {
        AttemptStamp {
            attempt_id: self.attempt_id,
            test_id: self.test_id,
            user_id: self.user_id,
            started_at: self.started_at,
            completed_at: self.completed_at,
            trigger: self.trigger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn stamp(minutes: i64) -> AttemptStamp {
        AttemptStamp {
            attempt_id: AttemptId::generate(),
            test_id: TestId::new(1),
            user_id: UserId::new(2),
            started_at: fixed_now(),
            completed_at: fixed_now() + chrono::Duration::minutes(minutes),
            trigger: SubmitTrigger::Manual,
        }
    }

    fn outcome(id: u64, correct: bool) -> QuestionOutcome {
        QuestionOutcome {
            question_id: QuestionId::new(id),
            selected: vec![OptionId::new(id * 10)],
            correct,
        }
    }

    #[test]
    fn rejects_inverted_time_range() {
        let sheet = ScoreSheet::from_outcomes(vec![outcome(1, true)]);
        let err = AttemptResult::from_score(stamp(-1), sheet, 0).unwrap_err();
        assert_eq!(err, ResultError::InvalidTimeRange);
    }

    #[test]
    fn persisted_counts_must_match_breakdown() {
        let err = AttemptResult::from_persisted(
            stamp(5),
            vec![outcome(1, true), outcome(2, false)],
            2,
            2,
            0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResultError::CountMismatch {
                correct: 2,
                counted: 1
            }
        );

        let err =
            AttemptResult::from_persisted(stamp(5), vec![outcome(1, true)], 3, 1, 0).unwrap_err();
        assert_eq!(err, ResultError::TotalMismatch { total: 3, counted: 1 });
    }

    #[test]
    fn persisted_result_recomputes_score() {
        let result = AttemptResult::from_persisted(
            stamp(12),
            vec![outcome(1, true), outcome(2, false), outcome(3, true), outcome(4, true)],
            4,
            3,
            2,
        )
        .unwrap();
        assert!((result.score() - 75.0).abs() < f64::EPSILON);
        assert_eq!(result.violation_count(), 2);
        assert_eq!(result.time_spent(), chrono::Duration::minutes(12));
    }
}

//! Per-attempt record of the options a student has selected.

use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use crate::model::{OptionId, QuestionId};

/// Options selected for one question. Empty means unanswered.
pub type Selection = BTreeSet<OptionId>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("answers are frozen once the attempt is submitted")]
    Sealed,
    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),
}

/// Mutable answer map owned by a single attempt.
///
/// Writes replace the whole selection for a question, so repeating a write is
/// idempotent and the last write for a question wins. Option ids are stored as
/// given; checking them against the question is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerLedger {
    entries: HashMap<QuestionId, Selection>,
    sealed: bool,
}

impl AnswerLedger {
    /// Creates one empty entry per question id.
    #[must_use]
    pub fn initialize(question_ids: impl IntoIterator<Item = QuestionId>) -> Self {
        Self {
            entries: question_ids
                .into_iter()
                .map(|id| (id, Selection::new()))
                .collect(),
            sealed: false,
        }
    }

    /// Replaces the selection for `question_id` with exactly `selected`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Sealed` after [`AnswerLedger::seal`] was called, and
    /// `LedgerError::UnknownQuestion` for an id the ledger was not initialized with.
    pub fn record(
        &mut self,
        question_id: QuestionId,
        selected: impl IntoIterator<Item = OptionId>,
    ) -> Result<(), LedgerError> {
        if self.sealed {
            return Err(LedgerError::Sealed);
        }
        let entry = self
            .entries
            .get_mut(&question_id)
            .ok_or(LedgerError::UnknownQuestion(question_id))?;
        *entry = selected.into_iter().collect();
        Ok(())
    }

    /// Freezes the ledger. Irreversible.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn selection(&self, question_id: QuestionId) -> Option<&Selection> {
        self.entries.get(&question_id)
    }

    /// Number of the given questions that have a non-empty selection.
    #[must_use]
    pub fn answered_among(&self, question_ids: &[QuestionId]) -> usize {
        question_ids
            .iter()
            .filter(|id| self.entries.get(id).is_some_and(|s| !s.is_empty()))
            .count()
    }

    /// Read-only copy of the current answers.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            entries: self.entries.clone(),
        }
    }
}

/// Immutable view of a ledger at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    entries: HashMap<QuestionId, Selection>,
}

impl LedgerSnapshot {
    #[must_use]
    pub fn get(&self, question_id: QuestionId) -> Option<&Selection> {
        self.entries.get(&question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QuestionId, &Selection)> {
        self.entries.iter()
    }
}

impl FromIterator<(QuestionId, Selection)> for LedgerSnapshot {
    fn from_iter<T: IntoIterator<Item = (QuestionId, Selection)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: u64) -> QuestionId {
        QuestionId::new(id)
    }

    fn o(id: u64) -> OptionId {
        OptionId::new(id)
    }

    #[test]
    fn initialize_prepopulates_empty_entries() {
        let ledger = AnswerLedger::initialize([q(1), q(2), q(3)]);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().all(|(_, s)| s.is_empty()));
    }

    #[test]
    fn last_write_wins_for_same_question() {
        let mut ledger = AnswerLedger::initialize([q(1)]);
        ledger.record(q(1), [o(1)]).unwrap();
        ledger.record(q(1), [o(2), o(3)]).unwrap();
        ledger.record(q(1), [o(4)]).unwrap();

        let expected: Selection = [o(4)].into_iter().collect();
        assert_eq!(ledger.snapshot().get(q(1)), Some(&expected));
    }

    #[test]
    fn repeated_write_is_idempotent() {
        let mut once = AnswerLedger::initialize([q(1), q(2)]);
        once.record(q(1), [o(1)]).unwrap();

        let mut twice = AnswerLedger::initialize([q(1), q(2)]);
        twice.record(q(1), [o(1)]).unwrap();
        twice.record(q(1), [o(1)]).unwrap();

        assert_eq!(once.snapshot(), twice.snapshot());
    }

    #[test]
    fn writes_to_different_questions_commute() {
        let mut a = AnswerLedger::initialize([q(1), q(2)]);
        a.record(q(1), [o(1)]).unwrap();
        a.record(q(2), [o(5)]).unwrap();

        let mut b = AnswerLedger::initialize([q(1), q(2)]);
        b.record(q(2), [o(5)]).unwrap();
        b.record(q(1), [o(1)]).unwrap();

        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn stores_foreign_option_ids_without_checking() {
        let mut ledger = AnswerLedger::initialize([q(1)]);
        ledger.record(q(1), [o(999)]).unwrap();
        assert!(ledger.selection(q(1)).unwrap().contains(&o(999)));
    }

    #[test]
    fn rejects_questions_outside_the_attempt() {
        let mut ledger = AnswerLedger::initialize([q(1), q(2)]);
        assert_eq!(
            ledger.record(q(99), [o(5)]),
            Err(LedgerError::UnknownQuestion(q(99)))
        );
        assert_eq!(ledger.snapshot().len(), 2);
        assert_eq!(ledger.selection(q(99)), None);
    }

    #[test]
    fn sealed_ledger_rejects_writes() {
        let mut ledger = AnswerLedger::initialize([q(1)]);
        ledger.record(q(1), [o(1)]).unwrap();
        ledger.seal();

        assert_eq!(ledger.record(q(1), [o(2)]), Err(LedgerError::Sealed));
        assert!(ledger.selection(q(1)).unwrap().contains(&o(1)));
    }

    #[test]
    fn answered_among_ignores_empty_selections() {
        let mut ledger = AnswerLedger::initialize([q(1), q(2), q(3)]);
        ledger.record(q(1), [o(1)]).unwrap();
        ledger.record(q(2), [o(2)]).unwrap();
        ledger.record(q(2), []).unwrap();
        assert_eq!(ledger.answered_among(&[q(1), q(2), q(3)]), 1);
    }
}

//! Deterministic all-or-nothing scoring.
//!
//! A question counts as correct only when the selection matches its correct
//! options exactly; there is no partial credit. Time and integrity data never
//! enter the computation.

use crate::ledger::{LedgerSnapshot, Selection};
use crate::model::{Question, QuestionKind, QuestionOutcome};

/// Per-question breakdown plus aggregate counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreSheet {
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Percentage in `[0, 100]`. Defined as `0.0` when there are no questions.
    pub score: f64,
    pub outcomes: Vec<QuestionOutcome>,
}

impl ScoreSheet {
    /// Aggregates an already evaluated breakdown.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<QuestionOutcome>) -> Self {
        let total = u32::try_from(outcomes.len()).unwrap_or(u32::MAX);
        let correct = u32::try_from(outcomes.iter().filter(|o| o.correct).count()).unwrap_or(u32::MAX);
        Self {
            total_questions: total,
            correct_answers: correct,
            score: percentage(correct, total),
            outcomes,
        }
    }
}

/// Scores `questions` in presentation order against a ledger snapshot.
///
/// Questions missing from the snapshot are scored as unanswered.
#[must_use]
pub fn score(questions: &[Question], answers: &LedgerSnapshot) -> ScoreSheet {
    let empty = Selection::new();
    let outcomes = questions
        .iter()
        .map(|question| {
            let selection = answers.get(question.id()).unwrap_or(&empty);
            QuestionOutcome {
                question_id: question.id(),
                selected: selection.iter().copied().collect(),
                correct: is_correct(question, selection),
            }
        })
        .collect();
    ScoreSheet::from_outcomes(outcomes)
}

/// Applies the per-kind correctness rule to one question.
#[must_use]
pub fn is_correct(question: &Question, selection: &Selection) -> bool {
    let correct = question.correct_option_ids();
    match question.kind() {
        QuestionKind::Single => {
            selection.len() == 1 && selection.iter().all(|id| correct.contains(id))
        }
        QuestionKind::Multiple => *selection == correct,
    }
}

fn percentage(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * (f64::from(correct) / f64::from(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, OptionId, QuestionId};

    fn o(id: u64) -> OptionId {
        OptionId::new(id)
    }

    fn single(id: u64, options: &[(u64, bool)]) -> Question {
        build(id, QuestionKind::Single, options)
    }

    fn multiple(id: u64, options: &[(u64, bool)]) -> Question {
        build(id, QuestionKind::Multiple, options)
    }

    fn build(id: u64, kind: QuestionKind, options: &[(u64, bool)]) -> Question {
        let options = options
            .iter()
            .map(|(oid, correct)| AnswerOption::new(o(*oid), format!("o{oid}"), *correct))
            .collect();
        Question::new(QuestionId::new(id), format!("Q{id}"), kind, options).unwrap()
    }

    fn sel(ids: &[u64]) -> Selection {
        ids.iter().copied().map(o).collect()
    }

    fn snapshot(entries: &[(u64, &[u64])]) -> LedgerSnapshot {
        entries
            .iter()
            .map(|(q, ids)| (QuestionId::new(*q), sel(ids)))
            .collect()
    }

    #[test]
    fn single_needs_exactly_the_correct_option() {
        let q = single(1, &[(1, true), (2, false)]);
        assert!(is_correct(&q, &sel(&[1])));
        assert!(!is_correct(&q, &sel(&[2])));
        assert!(!is_correct(&q, &sel(&[1, 2])));
        assert!(!is_correct(&q, &sel(&[])));
    }

    #[test]
    fn multiple_rejects_subset_and_superset() {
        let q = multiple(1, &[(1, true), (2, true), (3, false)]);
        assert!(is_correct(&q, &sel(&[1, 2])));
        assert!(!is_correct(&q, &sel(&[1])));
        assert!(!is_correct(&q, &sel(&[1, 2, 3])));
        assert!(!is_correct(&q, &sel(&[3])));
    }

    #[test]
    fn all_correct_scores_one_hundred() {
        let questions = vec![
            single(1, &[(1, true), (2, false)]),
            multiple(2, &[(3, true), (4, true), (5, false)]),
            single(3, &[(6, false), (7, true)]),
        ];
        let answers = snapshot(&[(1, &[1]), (2, &[3, 4]), (3, &[7])]);

        let sheet = score(&questions, &answers);
        assert_eq!(sheet.correct_answers, sheet.total_questions);
        assert!((sheet.score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn half_correct_scores_fifty() {
        let questions = vec![
            single(1, &[(1, true), (2, false)]),
            single(2, &[(3, true), (4, false)]),
        ];
        let answers = snapshot(&[(1, &[1]), (2, &[4])]);

        let sheet = score(&questions, &answers);
        assert_eq!(sheet.correct_answers, 1);
        assert!((sheet.score - 50.0).abs() < f64::EPSILON);
        assert!(sheet.outcomes[0].correct);
        assert!(!sheet.outcomes[1].correct);
        assert_eq!(sheet.outcomes[1].selected, vec![o(4)]);
    }

    #[test]
    fn fractional_scores_are_kept() {
        let questions = vec![
            single(1, &[(1, true), (2, false)]),
            single(2, &[(3, true), (4, false)]),
            single(3, &[(5, true), (6, false)]),
        ];
        let answers = snapshot(&[(1, &[1]), (2, &[]), (3, &[])]);
        let sheet = score(&questions, &answers);
        assert!((sheet.score - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn missing_entry_counts_as_unanswered() {
        let questions = vec![single(1, &[(1, true), (2, false)])];
        let sheet = score(&questions, &LedgerSnapshot::default());
        assert_eq!(sheet.correct_answers, 0);
        assert!(sheet.outcomes[0].selected.is_empty());
    }

    #[test]
    fn zero_questions_scores_zero_not_nan() {
        let sheet = score(&[], &LedgerSnapshot::default());
        assert_eq!(sheet.total_questions, 0);
        assert_eq!(sheet.score, 0.0);
    }

    #[test]
    fn scoring_is_repeatable() {
        let questions = vec![multiple(1, &[(1, true), (2, true), (3, false)])];
        let answers = snapshot(&[(1, &[1, 3])]);
        assert_eq!(score(&questions, &answers), score(&questions, &answers));
    }
}

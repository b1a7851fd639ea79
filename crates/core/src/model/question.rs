use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least 2 options, got {count}")]
    TooFewOptions { count: usize },

    #[error("option {0} appears more than once")]
    DuplicateOption(OptionId),

    #[error("single-answer question needs exactly one correct option, got {count}")]
    SingleNeedsOneCorrect { count: usize },

    #[error("multiple-answer question needs at least one correct option")]
    MultipleNeedsCorrect,
}

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

/// Whether a question accepts one selection or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Single,
    Multiple,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::Single => "single",
            QuestionKind::Multiple => "multiple",
        }
    }
}

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    id: OptionId,
    text: String,
    is_correct: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: OptionId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into(),
            is_correct,
        }
    }

    #[must_use]
    pub fn id(&self) -> OptionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

/// An authored question. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    kind: QuestionKind,
    options: Vec<AnswerOption>,
}

impl Question {
    /// Builds a question, enforcing the option invariants for its kind.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, fewer than two options are
    /// given, option ids repeat, or the number of correct options does not fit `kind`.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        kind: QuestionKind,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: options.len(),
            });
        }

        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(option.id) {
                return Err(QuestionError::DuplicateOption(option.id));
            }
        }

        let correct = options.iter().filter(|o| o.is_correct).count();
        match kind {
            QuestionKind::Single if correct != 1 => {
                return Err(QuestionError::SingleNeedsOneCorrect { count: correct });
            }
            QuestionKind::Multiple if correct == 0 => {
                return Err(QuestionError::MultipleNeedsCorrect);
            }
            _ => {}
        }

        Ok(Self {
            id,
            prompt,
            kind,
            options,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    /// Ids of every option flagged correct.
    #[must_use]
    pub fn correct_option_ids(&self) -> BTreeSet<OptionId> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(AnswerOption::id)
            .collect()
    }
}

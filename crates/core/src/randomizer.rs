use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::model::Question;

/// Produces the attempt-specific question order.
///
/// `randomize` consumes the randomizer, so one randomizer yields exactly one
/// order. Callers keep that order for navigation, ledger keys and scoring.
#[derive(Debug, Clone)]
pub struct QuestionRandomizer {
    rng: StdRng,
}

impl QuestionRandomizer {
    /// Randomizer seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic randomizer for tests and reproducible audits.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniformly shuffles `questions` (Fisher-Yates).
    #[must_use]
    pub fn randomize(mut self, questions: &[Question]) -> Vec<Question> {
        let mut order = questions.to_vec();
        order.shuffle(&mut self.rng);
        order
    }
}

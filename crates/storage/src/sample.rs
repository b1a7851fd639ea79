//! Built-in demo catalog used by the seed binary and tests.

use chrono::{DateTime, Utc};

use cbt_core::model::{
    AnswerOption, OptionId, Question, QuestionId, QuestionKind, Test, TestId, UserId,
};

const CS_TOPICS: [&str; 15] = [
    "an algorithm",
    "a data structure",
    "a variable",
    "a function",
    "a loop",
    "a conditional statement",
    "a class",
    "an object",
    "inheritance",
    "polymorphism",
    "encapsulation",
    "abstraction",
    "a compiler",
    "an interpreter",
    "a program",
];

struct SampleTest {
    id: u64,
    title: &'static str,
    description: &'static str,
    duration_minutes: u32,
    questions: u64,
    multiple_every: u64,
}

const SAMPLES: [SampleTest; 3] = [
    SampleTest {
        id: 1,
        title: "Introduction to Computer Science",
        description: "Basic concepts of computer science, algorithms, and data structures.",
        duration_minutes: 60,
        questions: 15,
        multiple_every: 3,
    },
    SampleTest {
        id: 2,
        title: "Advanced Mathematics",
        description: "Calculus, linear algebra, and differential equations for advanced students.",
        duration_minutes: 90,
        questions: 20,
        multiple_every: 5,
    },
    SampleTest {
        id: 3,
        title: "English Literature",
        description: "Analysis of classic literary works and writing techniques.",
        duration_minutes: 120,
        questions: 18,
        multiple_every: 6,
    },
];

/// Question ids are `test * 1000 + index`; option ids are `question * 10 + slot`.
fn sample_question(sample: &SampleTest, index: u64) -> Result<Question, cbt_core::Error> {
    let question_id = sample.id * 1000 + index;
    let prompt = if sample.id == 1 {
        let topic = usize::try_from(index)
            .ok()
            .and_then(|i| CS_TOPICS.get(i))
            .copied()
            .unwrap_or("a program");
        format!("What is the correct definition of {topic}?")
    } else {
        format!("Sample question {}", index + 1)
    };
    let kind = if index % sample.multiple_every == 0 {
        QuestionKind::Multiple
    } else {
        QuestionKind::Single
    };
    let options = ["A", "B", "C", "D"]
        .iter()
        .zip(0_u64..)
        .map(|(label, slot)| {
            AnswerOption::new(
                OptionId::new(question_id * 10 + slot + 1),
                format!("Option {label}"),
                index % 4 == slot,
            )
        })
        .collect();

    Ok(Question::new(QuestionId::new(question_id), prompt, kind, options)?)
}

/// Three published demo tests authored by user 1.
///
/// # Errors
///
/// Returns `cbt_core::Error` if a generated question or test fails validation.
pub fn sample_catalog(now: DateTime<Utc>) -> Result<Vec<Test>, cbt_core::Error> {
    let mut tests = Vec::with_capacity(SAMPLES.len());
    for sample in &SAMPLES {
        let questions = (0..sample.questions)
            .map(|i| sample_question(sample, i))
            .collect::<Result<Vec<_>, _>>()?;
        tests.push(Test::new(
            TestId::new(sample.id),
            sample.title,
            Some(sample.description.to_string()),
            sample.duration_minutes,
            questions,
            true,
            UserId::new(1),
            now,
        )?);
    }
    Ok(tests)
}

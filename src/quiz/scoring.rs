// src/quiz/scoring.rs

//! Per-question grading. Pure functions: no state, no I/O, no errors.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{
    attempt::QuestionOutcome,
    question::{AnswerKey, Question, SubmittedAnswer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    pub correct: bool,
    pub points_awarded: i64,
}

impl Grade {
    const WRONG: Grade = Grade {
        correct: false,
        points_awarded: 0,
    };
}

/// Totals for a whole answer map against a quiz's questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorecard {
    pub total_questions: i64,
    pub answered_questions: i64,
    pub correct_answers: i64,
    pub score: i64,
    pub max_score: i64,
    /// In question presentation order.
    pub breakdown: Vec<QuestionOutcome>,
}

/// Grades one answer. A missing or malformed answer is simply incorrect.
pub fn grade(question: &Question, answer: Option<&SubmittedAnswer>) -> Grade {
    let Some(SubmittedAnswer(value)) = answer else {
        return Grade::WRONG;
    };

    let correct = match &question.key {
        AnswerKey::MultipleChoice { correct } => as_text(value).is_some_and(|s| &s == correct),
        AnswerKey::TrueFalse { correct } => {
            as_text(value).is_some_and(|s| s.to_lowercase() == correct.to_lowercase())
        }
        AnswerKey::GapFill { blanks } => as_blanks(value).is_some_and(|given| {
            given.len() == blanks.len()
                && given
                    .iter()
                    .zip(blanks)
                    .all(|(g, expected)| normalize(g) == normalize(expected))
        }),
        AnswerKey::ShortAnswer { correct, accepted } => as_text(value).is_some_and(|s| {
            let given = normalize(&s);
            if accepted.is_empty() {
                given == normalize(correct)
            } else {
                accepted.iter().any(|a| normalize(a) == given)
            }
        }),
    };

    if correct {
        Grade {
            correct: true,
            points_awarded: question.points,
        }
    } else {
        Grade::WRONG
    }
}

/// Grades every question of a quiz. Answers keyed by ids outside `questions`
/// are ignored.
pub fn grade_all(questions: &[Question], answers: &HashMap<i64, SubmittedAnswer>) -> Scorecard {
    let mut card = Scorecard {
        total_questions: questions.len() as i64,
        answered_questions: 0,
        correct_answers: 0,
        score: 0,
        max_score: 0,
        breakdown: Vec::with_capacity(questions.len()),
    };

    for question in questions {
        let answer = answers.get(&question.id);
        let outcome = grade(question, answer);

        card.max_score += question.points;
        if answer.is_some() {
            card.answered_questions += 1;
        }
        if outcome.correct {
            card.correct_answers += 1;
            card.score += outcome.points_awarded;
        }
        card.breakdown.push(QuestionOutcome {
            question_id: question.id,
            correct: outcome.correct,
            points_awarded: outcome.points_awarded,
        });
    }

    card
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A single string counts as a one-blank sequence.
fn as_blanks(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned))
            .collect(),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

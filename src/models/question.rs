// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

use crate::error::QuizError;

/// Closed set of question kinds a quiz can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    GapFill,
    ShortAnswer,
}

impl QuestionType {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::GapFill => "gap_fill",
            QuestionType::ShortAnswer => "short_answer",
        }
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "true_false" => Ok(QuestionType::TrueFalse),
            "gap_fill" => Ok(QuestionType::GapFill),
            "short_answer" => Ok(QuestionType::ShortAnswer),
            other => Err(format!("unknown question type '{other}'")),
        }
    }
}

/// The correct answer, one shape per question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerKey {
    /// Option key, compared exactly.
    MultipleChoice { correct: String },
    TrueFalse { correct: String },
    /// One entry per blank, in order.
    GapFill { blanks: Vec<String> },
    /// `accepted` may be empty, in which case `correct` is the only accepted answer.
    ShortAnswer { correct: String, accepted: Vec<String> },
}

impl AnswerKey {
    pub fn question_type(&self) -> QuestionType {
        match self {
            AnswerKey::MultipleChoice { .. } => QuestionType::MultipleChoice,
            AnswerKey::TrueFalse { .. } => QuestionType::TrueFalse,
            AnswerKey::GapFill { .. } => QuestionType::GapFill,
            AnswerKey::ShortAnswer { .. } => QuestionType::ShortAnswer,
        }
    }

    /// Parses the stored `answer_key` column for the given type.
    pub fn from_stored(kind: QuestionType, raw: &serde_json::Value) -> Result<Self, String> {
        use serde_json::Value;

        let single = |v: &Value| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(format!("expected a string answer, got {other}")),
        };

        match kind {
            QuestionType::MultipleChoice => Ok(AnswerKey::MultipleChoice {
                correct: single(raw)?,
            }),
            QuestionType::TrueFalse => Ok(AnswerKey::TrueFalse {
                correct: single(raw)?,
            }),
            QuestionType::GapFill => {
                let blanks: Vec<String> = serde_json::from_value(raw.clone())
                    .map_err(|e| format!("gap_fill key must be a list of strings: {e}"))?;
                if blanks.is_empty() {
                    return Err("gap_fill key has no blanks".to_string());
                }
                Ok(AnswerKey::GapFill { blanks })
            }
            QuestionType::ShortAnswer => match raw {
                Value::Object(map) => {
                    let correct = map
                        .get("correct")
                        .map(single)
                        .transpose()?
                        .ok_or_else(|| "short_answer key is missing 'correct'".to_string())?;
                    let accepted = match map.get("accepted") {
                        Some(list) => serde_json::from_value(list.clone())
                            .map_err(|e| format!("'accepted' must be a list of strings: {e}"))?,
                        None => Vec::new(),
                    };
                    Ok(AnswerKey::ShortAnswer { correct, accepted })
                }
                other => Ok(AnswerKey::ShortAnswer {
                    correct: single(other)?,
                    accepted: Vec::new(),
                }),
            },
        }
    }
}

/// A question as supplied by the question bank, answer key included.
/// Never serialized to learners; see `PublicQuestion`.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub prompt: String,
    pub options: Vec<String>,
    pub key: AnswerKey,
    pub points: i64,
    pub position: i64,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        self.key.question_type()
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub quiz_id: i64,
    pub question_type: String,
    pub prompt: String,
    pub options: Json<Vec<String>>,
    pub answer_key: Json<serde_json::Value>,
    pub points: i64,
    pub position: i64,
}

impl TryFrom<QuestionRow> for Question {
    type Error = QuizError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let invalid = |reason: String| QuizError::InvalidQuestion { id: row.id, reason };

        let kind: QuestionType = row.question_type.parse().map_err(invalid)?;
        let key = AnswerKey::from_stored(kind, &row.answer_key.0).map_err(invalid)?;
        if row.points < 0 {
            return Err(invalid("points must not be negative".to_string()));
        }

        Ok(Question {
            id: row.id,
            quiz_id: row.quiz_id,
            prompt: row.prompt,
            options: row.options.0,
            key,
            points: row.points,
            position: row.position,
        })
    }
}

/// DTO for sending question to client (excludes the answer key).
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Vec<String>,
    pub points: i64,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
            points: q.points,
        }
    }
}

/// Whatever the learner sent for one question.
///
/// Kept as raw JSON: interpretation happens during grading, where anything
/// that does not fit the question type is simply wrong.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmittedAnswer(pub serde_json::Value);

impl From<&str> for SubmittedAnswer {
    fn from(s: &str) -> Self {
        SubmittedAnswer(serde_json::Value::String(s.to_string()))
    }
}

impl From<Vec<&str>> for SubmittedAnswer {
    fn from(blanks: Vec<&str>) -> Self {
        SubmittedAnswer(serde_json::Value::Array(
            blanks
                .into_iter()
                .map(|b| serde_json::Value::String(b.to_string()))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(question_type: &str, key: serde_json::Value) -> QuestionRow {
        QuestionRow {
            id: 7,
            quiz_id: 1,
            question_type: question_type.to_string(),
            prompt: "?".to_string(),
            options: Json(vec![]),
            answer_key: Json(key),
            points: 5,
            position: 0,
        }
    }

    #[test]
    fn stored_keys_parse_per_type() {
        let q = Question::try_from(row("multiple_choice", json!("b"))).unwrap();
        assert_eq!(q.key, AnswerKey::MultipleChoice { correct: "b".into() });

        let q = Question::try_from(row("true_false", json!(true))).unwrap();
        assert_eq!(q.key, AnswerKey::TrueFalse { correct: "true".into() });

        let q = Question::try_from(row("gap_fill", json!(["x", "y"]))).unwrap();
        assert_eq!(q.key, AnswerKey::GapFill { blanks: vec!["x".into(), "y".into()] });

        let q = Question::try_from(row(
            "short_answer",
            json!({"correct": "Rust", "accepted": ["rust-lang"]}),
        ))
        .unwrap();
        assert_eq!(
            q.key,
            AnswerKey::ShortAnswer { correct: "Rust".into(), accepted: vec!["rust-lang".into()] }
        );

        let q = Question::try_from(row("short_answer", json!("Rust"))).unwrap();
        assert_eq!(q.key, AnswerKey::ShortAnswer { correct: "Rust".into(), accepted: vec![] });
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let err = Question::try_from(row("essay", json!("x"))).unwrap_err();
        assert!(matches!(err, QuizError::InvalidQuestion { id: 7, .. }));

        let err = Question::try_from(row("gap_fill", json!("x"))).unwrap_err();
        assert!(matches!(err, QuizError::InvalidQuestion { .. }));

        let err = Question::try_from(row("gap_fill", json!([]))).unwrap_err();
        assert!(matches!(err, QuizError::InvalidQuestion { .. }));
    }

    #[test]
    fn public_question_hides_the_key() {
        let q = Question::try_from(row("multiple_choice", json!("secret-key"))).unwrap();
        let body = serde_json::to_string(&PublicQuestion::from(&q)).unwrap();
        assert!(!body.contains("secret-key"));
        assert!(body.contains("\"type\":\"multiple_choice\""));
    }
}

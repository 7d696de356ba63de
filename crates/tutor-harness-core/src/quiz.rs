//! Quiz and grade schemas, strict decoding of model output, and the
//! deterministic string-matching grader used when a grade cannot be decoded.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TutorError;
use crate::models::ScoredChunk;

/// Short answers at or above this overlap count as correct.
pub const SHORT_ANSWER_PASS: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "MCQ")]
    Mcq,
    ShortAnswer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: String,
    pub difficulty: Difficulty,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub quiz_topic: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub question_id: u32,
    pub score: f64,
    pub max_score: f64,
    pub is_correct: bool,
    pub feedback: String,
    #[serde(default)]
    pub hint: Option<String>,
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub results: Vec<GradeResult>,
    pub total_score: f64,
    pub max_total: f64,
    pub overall_feedback: String,
}

/// Outcome of decoding model output that has a deterministic substitute.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Parsed(T),
    Fallback(T),
}

impl<T> Decoded<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Decoded::Fallback(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Decoded::Parsed(v) | Decoded::Fallback(v) => v,
        }
    }
}

struct FencePatterns {
    open: Regex,
    close: Regex,
}

fn fence_patterns() -> &'static FencePatterns {
    static PATTERNS: OnceLock<FencePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FencePatterns {
        open: Regex::new(r"^```(?:json)?\s*").expect("static fence pattern compiles"),
        close: Regex::new(r"\s*```$").expect("static fence pattern compiles"),
    })
}

/// Remove a leading ```` ```json ```` (or bare ```` ``` ````) fence and a
/// trailing ```` ``` ```` fence.
pub fn strip_fences(raw: &str) -> String {
    let p = fence_patterns();
    let trimmed = raw.trim();
    let opened = p.open.replace(trimmed, "");
    p.close.replace(&opened, "").into_owned()
}

/// Strictly decode model output after stripping markdown fences.
pub fn decode_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, TutorError> {
    serde_json::from_str(&strip_fences(raw)).map_err(|e| TutorError::Parse(e.to_string()))
}

/// Decode a grade report, substituting [`fallback_grading`] when the
/// model output does not match the schema.
pub fn decode_grade_or_fallback(
    raw: &str,
    questions: &[QuizQuestion],
    answers: &[String],
) -> Decoded<GradeReport> {
    match decode_model_json::<GradeReport>(raw) {
        Ok(report) => Decoded::Parsed(report),
        Err(_) => Decoded::Fallback(fallback_grading(questions, answers)),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn first_two(s: &str) -> &str {
    match s.char_indices().nth(2) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn mcq_matches(user: &str, correct: &str) -> bool {
    if user.is_empty() {
        return false;
    }
    user == correct || user.starts_with(first_two(correct)) || correct.starts_with(first_two(user))
}

/// Grade answers by string matching.
///
/// MCQ answers score 1 when they equal the reference or share its first
/// two characters (so `"b"` and `"B) Osmosis"` match). Short answers
/// score the fraction of reference words present in the answer, rounded
/// to two decimals. Answers pair with questions by position.
pub fn fallback_grading(questions: &[QuizQuestion], answers: &[String]) -> GradeReport {
    let mut results = Vec::with_capacity(questions.len());
    let mut total = 0.0;

    for (i, (q, answer)) in questions.iter().zip(answers).enumerate() {
        let correct = q.correct_answer.trim().to_lowercase();
        let user = answer.trim().to_lowercase();

        let (score, is_correct) = match q.kind {
            QuestionType::Mcq => {
                let ok = mcq_matches(&user, &correct);
                (if ok { 1.0 } else { 0.0 }, ok)
            }
            QuestionType::ShortAnswer => {
                let reference: HashSet<&str> = correct.split_whitespace().collect();
                let given: HashSet<&str> = user.split_whitespace().collect();
                let score = if reference.is_empty() {
                    0.0
                } else {
                    let overlap = reference.intersection(&given).count() as f64;
                    round2((overlap / reference.len() as f64).min(1.0))
                };
                (score, score >= SHORT_ANSWER_PASS)
            }
        };

        total += score;
        results.push(GradeResult {
            question_id: i as u32 + 1,
            score,
            max_score: 1.0,
            is_correct,
            feedback: if is_correct {
                "Correct!".to_string()
            } else {
                "Not quite right.".to_string()
            },
            hint: (!is_correct).then(|| "Review the relevant section in your notes.".to_string()),
            correct_answer: q.correct_answer.clone(),
        });
    }

    GradeReport {
        results,
        total_score: round2(total),
        max_total: questions.len() as f64,
        overall_feedback: "Graded using basic matching (model grading unavailable).".to_string(),
    }
}

/// Context block for quiz generation: `[source, p.page] content` per
/// chunk, separated by blank lines.
pub fn quiz_context(chunks: &[ScoredChunk]) -> Result<String, TutorError> {
    let context = chunks
        .iter()
        .map(|c| format!("[{}, p.{}] {}", c.metadata.source, c.metadata.page, c.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    if context.trim().is_empty() {
        return Err(TutorError::EmptyContext(
            "no context available to generate quiz questions".into(),
        ));
    }
    Ok(context)
}

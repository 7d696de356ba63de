//! Learner profile: concepts asked, quiz history and weak-concept flags.
//!
//! A concept becomes *weak* once it has at least two recorded quiz attempts
//! below 50%. The flag is monotonic: later good scores never clear it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::TutorError;

/// Attempts below this percentage count towards a weak-concept flag.
pub const WEAK_PERCENTAGE: f64 = 50.0;
/// Number of low attempts that flags a concept as weak.
pub const WEAK_ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkillLevel::Beginner => "Beginner",
            SkillLevel::Intermediate => "Intermediate",
            SkillLevel::Advanced => "Advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for SkillLevel {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            other => Err(TutorError::Validation(format!(
                "unknown skill level '{}' (expected Beginner, Intermediate or Advanced)",
                other
            ))),
        }
    }
}

/// One graded quiz attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizScore {
    pub concept: String,
    pub score: f64,
    pub max_score: f64,
    /// `round(100 * score / max_score, 1)`, or 0 when `max_score` is 0.
    pub percentage: f64,
    pub timestamp: DateTime<Local>,
}

/// Percentage of `score` out of `max_score`, rounded to one decimal.
pub fn percentage(score: f64, max_score: f64) -> f64 {
    if max_score > 0.0 {
        (score / max_score * 1000.0).round() / 10.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub name: String,
    pub course: String,
    pub skill_level: SkillLevel,
    pub goals: String,
    /// Distinct concepts in first-seen order.
    pub concepts_asked: Vec<String>,
    pub quiz_scores: Vec<QuizScore>,
    /// Flagged concepts in flag order. Never shrinks.
    pub weak_concepts: Vec<String>,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self::new(
            "Learner",
            "General",
            SkillLevel::Intermediate,
            "Learn and understand the material",
        )
    }
}

impl LearnerProfile {
    pub fn new(
        name: impl Into<String>,
        course: impl Into<String>,
        skill_level: SkillLevel,
        goals: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            course: course.into(),
            skill_level,
            goals: goals.into(),
            concepts_asked: Vec::new(),
            quiz_scores: Vec::new(),
            weak_concepts: Vec::new(),
        }
    }

    /// Remember a concept the learner asked about. Repeats and empty
    /// strings are ignored.
    pub fn record_concept(&mut self, concept: &str) {
        if concept.is_empty() || self.concepts_asked.iter().any(|c| c == concept) {
            return;
        }
        self.concepts_asked.push(concept.to_string());
    }

    /// Record a quiz result and flag the concept as weak once it has
    /// [`WEAK_ATTEMPTS`] attempts below [`WEAK_PERCENTAGE`].
    pub fn record_quiz_score(&mut self, concept: &str, score: f64, max_score: f64) {
        self.record_quiz_score_at(concept, score, max_score, Local::now());
    }

    /// [`record_quiz_score`](Self::record_quiz_score) with an explicit timestamp.
    pub fn record_quiz_score_at(
        &mut self,
        concept: &str,
        score: f64,
        max_score: f64,
        timestamp: DateTime<Local>,
    ) {
        self.quiz_scores.push(QuizScore {
            concept: concept.to_string(),
            score,
            max_score,
            percentage: percentage(score, max_score),
            timestamp,
        });

        let low_attempts = self
            .quiz_scores
            .iter()
            .filter(|s| s.concept == concept && s.percentage < WEAK_PERCENTAGE)
            .count();
        if low_attempts >= WEAK_ATTEMPTS && !self.is_weak(concept) {
            self.weak_concepts.push(concept.to_string());
        }
    }

    pub fn is_weak(&self, concept: &str) -> bool {
        self.weak_concepts.iter().any(|c| c == concept)
    }

    /// Quiz history sorted by timestamp; ties keep insertion order.
    pub fn get_quiz_trend(&self) -> Vec<QuizScore> {
        let mut trend = self.quiz_scores.clone();
        trend.sort_by_key(|s| s.timestamp);
        trend
    }

    /// Occurrences of each concept in `concepts_asked`.
    ///
    /// `concepts_asked` holds each concept once, so every count is 1.
    pub fn get_concept_frequency(&self) -> BTreeMap<String, usize> {
        let mut freq = BTreeMap::new();
        for concept in &self.concepts_asked {
            *freq.entry(concept.clone()).or_insert(0) += 1;
        }
        freq
    }

    /// Extra instruction for the generator naming the three most recently
    /// flagged weak concepts. Empty when nothing is flagged.
    pub fn reinforcement_note(&self) -> String {
        if self.weak_concepts.is_empty() {
            return String::new();
        }
        let start = self.weak_concepts.len().saturating_sub(3);
        format!(
            "Reinforcement needed: the learner has struggled with: {}. \
             If the current question relates to any of these concepts, provide extra \
             explanation, a different analogy, and a quick check-for-understanding question.",
            self.weak_concepts[start..].join(", ")
        )
    }
}

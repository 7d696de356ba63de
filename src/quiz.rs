//! `tutor quiz` and `tutor grade`.
//!
//! `quiz` writes a generated quiz as JSON. `grade` reads that file plus a
//! JSON array of answers (one per question, in order), prints per-question
//! feedback and attaches the score to the most recent persisted
//! interaction.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use tutor_harness_core::quiz::Quiz;

use crate::ask::open_session;
use crate::config::Config;
use crate::export;
use crate::session::{GradeOutcome, TutorSession};

/// Generate a quiz and print it, or write it to `output`.
pub async fn run_quiz(
    config: &Config,
    topic: Option<&str>,
    num_questions: usize,
    output: Option<&Path>,
) -> Result<()> {
    let (mut session, pool) = open_session(config, None).await?;
    let quiz = session.generate_quiz(topic, num_questions).await?;
    let rendered = serde_json::to_string_pretty(&quiz)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &rendered)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!(
                "Wrote {} questions on \"{}\" to {}",
                quiz.questions.len(),
                quiz.quiz_topic,
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    pool.close().await;
    Ok(())
}

/// Grade answers to a saved quiz and record the score.
pub async fn run_grade(
    config: &Config,
    quiz_path: &Path,
    answers_path: &Path,
    concept: Option<&str>,
) -> Result<()> {
    let quiz: Quiz = read_json(quiz_path)?;
    let answers: Vec<String> = read_json(answers_path)?;
    let concept = concept.unwrap_or(&quiz.quiz_topic).to_string();

    let (mut session, pool) = open_session(config, None).await?;
    let (outcome, attached) =
        grade_and_record(&mut session, &pool, &concept, &quiz, &answers).await?;

    for result in &outcome.report.results {
        println!(
            "Q{} [{}/{}] {}: {}",
            result.question_id,
            result.score,
            result.max_score,
            if result.is_correct { "correct" } else { "incorrect" },
            result.feedback
        );
        if let Some(hint) = &result.hint {
            println!("    hint: {}", hint);
        }
    }
    println!(
        "total: {} / {}",
        outcome.report.total_score, outcome.report.max_total
    );
    println!("{}", outcome.report.overall_feedback);
    if outcome.fallback {
        println!("(graded by basic matching)");
    }
    if !attached {
        eprintln!("No logged interaction to attach the quiz score to.");
    }

    pool.close().await;
    Ok(())
}

/// Grade through the session, then attach the score to the latest
/// persisted log entry. Returns whether an entry received it.
pub async fn grade_and_record(
    session: &mut TutorSession,
    pool: &SqlitePool,
    concept: &str,
    quiz: &Quiz,
    answers: &[String],
) -> Result<(GradeOutcome, bool)> {
    let outcome = session.grade(concept, &quiz.questions, answers).await?;
    let attached = export::attach_quiz_score(
        pool,
        outcome.report.total_score,
        outcome.report.max_total,
    )
    .await?;
    Ok((outcome, attached))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use crate::session::Collaborators;
    use async_trait::async_trait;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;
    use tutor_harness_core::embedding::TokenEmbedder;
    use tutor_harness_core::evallog::create_log_entry;
    use tutor_harness_core::generation::AnswerProvider;
    use tutor_harness_core::profile::LearnerProfile;
    use tutor_harness_core::quiz::{Difficulty, QuestionType, QuizQuestion};
    use tutor_harness_core::retrieve::RetrievalParams;
    use tutor_harness_core::store::memory::InMemoryIndex;

    /// A grader that never returns JSON, forcing the matching fallback.
    struct Unhelpful;

    #[async_trait]
    impl AnswerProvider for Unhelpful {
        fn model_name(&self) -> &str {
            "unhelpful"
        }
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("I would rather not grade this.".to_string())
        }
    }

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::apply(&pool).await.unwrap();
        pool
    }

    fn session() -> TutorSession {
        TutorSession::new(
            LearnerProfile::default(),
            Collaborators {
                embedder: Arc::new(TokenEmbedder::new(64)),
                generator: Arc::new(Unhelpful),
                index: Arc::new(InMemoryIndex::new()),
                params: RetrievalParams::default(),
            },
        )
    }

    fn osmosis_quiz() -> Quiz {
        Quiz {
            quiz_topic: "Osmosis".into(),
            questions: vec![QuizQuestion {
                id: 1,
                kind: QuestionType::ShortAnswer,
                question: "What moves across the membrane in osmosis?".into(),
                options: None,
                correct_answer: "water".into(),
                difficulty: Difficulty::Easy,
                explanation: String::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_grade_attaches_score_to_latest_persisted_entry() {
        let pool = memory_pool().await;
        let entry = create_log_entry("what is osmosis?", "water moves", &[0.6], 0.4, 0.2, true);
        export::save_entry(&pool, &entry).await.unwrap();

        let mut session = session();
        let (outcome, attached) = grade_and_record(
            &mut session,
            &pool,
            "osmosis",
            &osmosis_quiz(),
            &["water".to_string()],
        )
        .await
        .unwrap();

        assert!(outcome.fallback);
        assert!(attached);
        assert_eq!(session.profile().quiz_scores[0].concept, "osmosis");

        let saved = export::load_entries(&pool).await.unwrap();
        assert_eq!(saved[0].quiz_score, Some(outcome.report.total_score));
        assert_eq!(saved[0].quiz_max, Some(1.0));
    }

    #[tokio::test]
    async fn test_grade_without_logged_interaction() {
        let pool = memory_pool().await;
        let mut session = session();
        let (_, attached) = grade_and_record(
            &mut session,
            &pool,
            "osmosis",
            &osmosis_quiz(),
            &["salt".to_string()],
        )
        .await
        .unwrap();
        assert!(!attached);
        assert!(export::load_entries(&pool).await.unwrap().is_empty());
    }
}

//! Tutoring session orchestration.
//!
//! A [`TutorSession`] owns one learner's profile and evaluation log and
//! borrows the shared index and providers. It drives the three learner
//! interactions:
//!
//! - [`TutorSession::ask`]: retrieve → generate → score → log.
//! - [`TutorSession::generate_quiz`]: retrieve → generate → decode.
//! - [`TutorSession::grade`]: generate → decode (or fallback) → record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tutor_harness_core::context::{build_context, citations, reference_text, Citation};
use tutor_harness_core::embedding::EmbeddingProvider;
use tutor_harness_core::evallog::{create_log_entry, EvalLog, LogEntry};
use tutor_harness_core::generation::AnswerProvider;
use tutor_harness_core::ingest::as_provider_error;
use tutor_harness_core::metrics::{compute_bleu, compute_rouge_l};
use tutor_harness_core::models::RetrievalResult;
use tutor_harness_core::profile::LearnerProfile;
use tutor_harness_core::quiz::{
    decode_grade_or_fallback, decode_model_json, quiz_context, GradeReport, Quiz, QuizQuestion,
};
use tutor_harness_core::retrieve::{retrieve, RetrievalParams};
use tutor_harness_core::store::VectorIndex;
use tutor_harness_core::TutorError;

/// Upper bound on questions per generated quiz.
pub const MAX_QUIZ_QUESTIONS: usize = 20;

const LOW_CONFIDENCE_NOTE: &str = "The retrieved notes are only weakly related to this question. \
Say so plainly, answer only what the notes support, and do not invent facts.";

/// The outcome of one chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub answer: String,
    pub retrieval: RetrievalResult,
    pub citations: Vec<Citation>,
    pub rouge_l: f64,
    pub bleu: f64,
    pub log_entry: LogEntry,
}

/// A graded quiz, flagged when the string-matching fallback was used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeOutcome {
    #[serde(flatten)]
    pub report: GradeReport,
    pub fallback: bool,
}

/// Shared collaborators for every session.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn AnswerProvider>,
    pub index: Arc<dyn VectorIndex>,
    pub params: RetrievalParams,
}

pub struct TutorSession {
    profile: LearnerProfile,
    log: EvalLog,
    deps: Collaborators,
}

impl TutorSession {
    pub fn new(profile: LearnerProfile, deps: Collaborators) -> Self {
        Self {
            profile,
            log: EvalLog::new(),
            deps,
        }
    }

    pub fn profile(&self) -> &LearnerProfile {
        &self.profile
    }

    pub fn log(&self) -> &EvalLog {
        &self.log
    }

    /// Retrieve with the session's parameters, optionally overriding `top_k`.
    pub async fn retrieve(&self, query: &str, top_k: Option<usize>) -> Result<RetrievalResult> {
        let mut params = self.deps.params;
        if let Some(k) = top_k {
            params.top_k = k;
        }
        retrieve(
            query,
            self.deps.embedder.as_ref(),
            self.deps.index.as_ref(),
            &params,
        )
        .await
    }

    /// Answer a learner question from the indexed material.
    pub async fn ask(&mut self, query: &str) -> Result<ChatTurn> {
        let query = query.trim();
        if query.is_empty() {
            return Err(TutorError::Validation("query must not be empty".into()).into());
        }
        self.profile.record_concept(query);

        let retrieval = self.retrieve(query, None).await?;
        let system = system_prompt(&self.profile, &retrieval);
        let user = format!(
            "Context from the learner's notes:\n{}\n\nQuestion: {}",
            build_context(&retrieval.chunks),
            query
        );
        let answer = self
            .deps
            .generator
            .generate(&system, &user)
            .await
            .map_err(as_provider_error)
            .context("generating answer")?;

        let reference = reference_text(&retrieval);
        let rouge_l = compute_rouge_l(&answer, &reference).f1;
        let bleu = compute_bleu(&answer, &reference).bleu;
        let log_entry = create_log_entry(
            query,
            &answer,
            &retrieval.scores(),
            rouge_l,
            bleu,
            retrieval.is_confident,
        );
        self.log.push(log_entry.clone());

        Ok(ChatTurn {
            citations: citations(&retrieval),
            answer,
            retrieval,
            rouge_l,
            bleu,
            log_entry,
        })
    }

    /// Generate a quiz over the material most relevant to `topic`, or the
    /// last concept the learner asked about when no topic is given.
    pub async fn generate_quiz(&mut self, topic: Option<&str>, num_questions: usize) -> Result<Quiz> {
        if num_questions == 0 || num_questions > MAX_QUIZ_QUESTIONS {
            return Err(TutorError::Validation(format!(
                "num_questions must be between 1 and {}",
                MAX_QUIZ_QUESTIONS
            ))
            .into());
        }
        let topic = topic
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| self.profile.concepts_asked.last().cloned())
            .unwrap_or_else(|| self.profile.course.clone());

        let retrieval = self.retrieve(&topic, None).await?;
        let context = quiz_context(&retrieval.chunks)?;

        let system = format!(
            "You write quizzes for a {} learner. Reply with JSON only, matching \
             {{\"quiz_topic\": str, \"questions\": [{{\"id\": int, \"type\": \"MCQ\"|\"ShortAnswer\", \
             \"question\": str, \"options\": [str]?, \"correct_answer\": str, \
             \"difficulty\": \"Easy\"|\"Medium\"|\"Hard\", \"explanation\": str}}]}}.",
            self.profile.skill_level
        );
        let user = format!(
            "Write {} questions about \"{}\" using only this material:\n\n{}",
            num_questions, topic, context
        );
        let raw = self
            .deps
            .generator
            .generate(&system, &user)
            .await
            .map_err(as_provider_error)
            .context("generating quiz")?;

        Ok(decode_model_json::<Quiz>(&raw)?)
    }

    /// Grade `answers` (paired with `questions` by position), record the
    /// score on the profile and attach it to the latest log entry.
    pub async fn grade(
        &mut self,
        concept: &str,
        questions: &[QuizQuestion],
        answers: &[String],
    ) -> Result<GradeOutcome> {
        if questions.is_empty() {
            return Err(TutorError::Validation("no questions to grade".into()).into());
        }
        if answers.len() != questions.len() {
            return Err(TutorError::Validation(format!(
                "expected {} answers, got {}",
                questions.len(),
                answers.len()
            ))
            .into());
        }

        let system = "You grade quiz answers. Reply with JSON only, matching \
            {\"results\": [{\"question_id\": int, \"score\": number, \"max_score\": number, \
            \"is_correct\": bool, \"feedback\": str, \"hint\": str?, \"correct_answer\": str}], \
            \"total_score\": number, \"max_total\": number, \"overall_feedback\": str}.";
        let pairs = serde_json::json!({ "questions": questions, "answers": answers });
        let raw = self
            .deps
            .generator
            .generate(system, &pairs.to_string())
            .await
            .map_err(as_provider_error)
            .context("grading quiz")?;

        let decoded = decode_grade_or_fallback(&raw, questions, answers);
        let fallback = decoded.is_fallback();
        let report = decoded.into_inner();

        self.profile
            .record_quiz_score(concept, report.total_score, report.max_total);
        self.log
            .attach_quiz_score(report.total_score, report.max_total);

        Ok(GradeOutcome { report, fallback })
    }
}

fn system_prompt(profile: &LearnerProfile, retrieval: &RetrievalResult) -> String {
    let mut prompt = format!(
        "You are a patient tutor for {} ({} level) studying {}. Their goal: {}. \
         Answer from the provided context and cite sources as (Source, Page).",
        profile.name, profile.skill_level, profile.course, profile.goals
    );
    if !retrieval.is_confident {
        prompt.push(' ');
        prompt.push_str(LOW_CONFIDENCE_NOTE);
    }
    let note = profile.reinforcement_note();
    if !note.is_empty() {
        prompt.push(' ');
        prompt.push_str(&note);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tutor_harness_core::embedding::TokenEmbedder;
    use tutor_harness_core::ingest::{ingest, IngestContext, IngestOptions, NoopObserver, PlainTextExtractor};
    use tutor_harness_core::models::SourceFile;
    use tutor_harness_core::quiz::{Difficulty, QuestionType};
    use tutor_harness_core::store::memory::{InMemoryHashStore, InMemoryIndex};

    /// Replies with canned responses in order and records each prompt.
    struct Scripted {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnswerProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn generate(&self, system: &str, user: &str) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| TutorError::Provider("no scripted reply left".into()).into())
        }
    }

    const NOTES: &str = "Photosynthesis converts light energy into chemical energy in chloroplasts.\n\n\
        Mitochondria release energy from glucose during cellular respiration.";

    async fn session_with(generator: Arc<Scripted>, ingest_notes: bool) -> TutorSession {
        let embedder = Arc::new(TokenEmbedder::new(512));
        let index = Arc::new(InMemoryIndex::new());
        if ingest_notes {
            let hashes = InMemoryHashStore::new();
            let ctx = IngestContext {
                extractor: &PlainTextExtractor,
                embedder: embedder.as_ref(),
                index: index.as_ref(),
                hashes: &hashes,
                observer: &NoopObserver,
            };
            let mut options = IngestOptions::default();
            options.chunking.chunk_size = 80;
            options.chunking.chunk_overlap = 0;
            ingest(&[SourceFile::new("cell_notes.txt", NOTES)], &ctx, &options)
                .await
                .unwrap();
        }
        TutorSession::new(
            LearnerProfile::default(),
            Collaborators {
                embedder,
                generator,
                index,
                params: RetrievalParams::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_ask_logs_turn_and_cites_sources() {
        let generator = Scripted::new(&["Photosynthesis converts light energy into chemical energy."]);
        let mut session = session_with(generator.clone(), true).await;

        let turn = session.ask("  How does photosynthesis convert light energy?  ").await.unwrap();
        assert!(turn.retrieval.is_confident);
        assert_eq!(turn.citations[0].source, "cell_notes.txt");
        assert_eq!(turn.citations[0].title, "Cell Notes");
        assert!(turn.rouge_l > 0.0);
        assert_eq!(session.log().len(), 1);
        assert_eq!(turn.log_entry.query, "How does photosynthesis convert light energy?");
        assert!(!turn.log_entry.hallucination_risk);
        assert_eq!(
            session.profile().concepts_asked,
            vec!["How does photosynthesis convert light energy?".to_string()]
        );

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].1.contains("--- Chunk 1 (Source: cell_notes.txt"));
        assert!(!prompts[0].0.contains("weakly related"));
    }

    #[tokio::test]
    async fn test_ask_on_empty_index_hedges() {
        let generator = Scripted::new(&["I could not find this in your notes."]);
        let mut session = session_with(generator.clone(), false).await;

        let turn = session.ask("What is a ribosome?").await.unwrap();
        assert!(!turn.retrieval.is_confident);
        assert!(turn.citations.is_empty());
        assert!(turn.log_entry.hallucination_risk);
        assert_eq!(turn.log_entry.hit_rate, 0.0);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].0.contains("weakly related"));
        assert!(prompts[0].1.contains("(No relevant context found.)"));
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_query() {
        let mut session = session_with(Scripted::new(&[]), true).await;
        let err = session.ask("   ").await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Validation(_))));
        assert!(session.profile().concepts_asked.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_leaves_log_untouched() {
        let mut session = session_with(Scripted::new(&[]), true).await;
        let err = session.ask("photosynthesis").await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Provider(_))));
        assert!(session.log().is_empty());
        assert_eq!(session.profile().concepts_asked.len(), 1);
    }

    #[tokio::test]
    async fn test_quiz_requires_context() {
        let mut session = session_with(Scripted::new(&[]), false).await;
        let err = session.generate_quiz(Some("cells"), 3).await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::EmptyContext(_))));
    }

    #[tokio::test]
    async fn test_quiz_parses_fenced_json_and_rejects_garbage() {
        let quiz_json = "```json\n{\"quiz_topic\": \"Energy\", \"questions\": [\
            {\"id\": 1, \"type\": \"ShortAnswer\", \"question\": \"Where does photosynthesis happen?\", \
            \"correct_answer\": \"chloroplasts\", \"difficulty\": \"Easy\", \"explanation\": \"See notes.\"}]}\n```";
        let mut session = session_with(Scripted::new(&[quiz_json, "not json"]), true).await;

        let quiz = session.generate_quiz(Some("photosynthesis"), 1).await.unwrap();
        assert_eq!(quiz.quiz_topic, "Energy");
        assert_eq!(quiz.questions[0].kind, QuestionType::ShortAnswer);

        let err = session.generate_quiz(Some("photosynthesis"), 1).await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Parse(_))));
    }

    #[tokio::test]
    async fn test_grade_fallback_records_score() {
        let generator = Scripted::new(&["Mitochondria release energy.", "Sorry, I cannot grade."]);
        let mut session = session_with(generator, true).await;
        session.ask("mitochondria").await.unwrap();

        let questions = vec![
            QuizQuestion {
                id: 1,
                kind: QuestionType::Mcq,
                question: "Powerhouse?".into(),
                options: Some(vec!["A) Nucleus".into(), "B) Mitochondria".into()]),
                correct_answer: "B) Mitochondria".into(),
                difficulty: Difficulty::Easy,
                explanation: String::new(),
            },
            QuizQuestion {
                id: 2,
                kind: QuestionType::ShortAnswer,
                question: "Where does photosynthesis happen?".into(),
                options: None,
                correct_answer: "in chloroplasts".into(),
                difficulty: Difficulty::Medium,
                explanation: String::new(),
            },
        ];
        let answers = vec!["b) mitochondria".to_string(), "nucleus".to_string()];

        let outcome = session.grade("cells", &questions, &answers).await.unwrap();
        assert!(outcome.fallback);
        assert_eq!(outcome.report.total_score, 1.0);
        assert_eq!(outcome.report.max_total, 2.0);

        let score = &session.profile().quiz_scores[0];
        assert_eq!(score.percentage, 50.0);
        assert!(!session.profile().is_weak("cells"));
        let last = session.log().entries().last().unwrap();
        assert_eq!(last.quiz_score, Some(1.0));
        assert_eq!(last.quiz_max, Some(2.0));
    }

    #[tokio::test]
    async fn test_grade_rejects_mismatched_answers() {
        let mut session = session_with(Scripted::new(&[]), true).await;
        let q = QuizQuestion {
            id: 1,
            kind: QuestionType::Mcq,
            question: "?".into(),
            options: None,
            correct_answer: "A".into(),
            difficulty: Difficulty::Easy,
            explanation: String::new(),
        };
        let err = session.grade("x", &[q], &[]).await.unwrap_err();
        assert!(matches!(TutorError::find(&err), Some(TutorError::Validation(_))));
    }
}

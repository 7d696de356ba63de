//! Tutoring HTTP server.
//!
//! Exposes tutoring sessions, retrieval and ingestion as a JSON HTTP API.
//! Each session is an explicit state object keyed by a UUID; all sessions
//! share the configured index and providers. Ingestion requests are
//! serialized so concurrent uploads cannot both miss the file-hash record.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/sessions` | Create a session, optional profile fields |
//! | `DELETE` | `/sessions/{id}` | Drop a session and its in-memory log |
//! | `POST` | `/sessions/{id}/ask` | One chat turn |
//! | `POST` | `/sessions/{id}/quiz` | Generate a quiz |
//! | `POST` | `/sessions/{id}/grade` | Grade quiz answers |
//! | `GET`  | `/sessions/{id}/profile` | Profile, quiz trend, concept frequency |
//! | `GET`  | `/sessions/{id}/logs.csv` | Session log as CSV |
//! | `GET`  | `/sessions/{id}/logs.json` | Session log as JSON |
//! | `POST` | `/retrieve` | Retrieval only |
//! | `POST` | `/ingest` | Ingest text documents |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `empty_context` (422),
//! `parse_error` (502), `provider_error` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use tutor_harness_core::evallog::{export_csv, export_json};
use tutor_harness_core::ingest::{ingest, IngestContext, NoopObserver, PlainTextExtractor};
use tutor_harness_core::models::{IngestSummary, RetrievalResult, SourceFile};
use tutor_harness_core::profile::{LearnerProfile, QuizScore, SkillLevel};
use tutor_harness_core::quiz::{Quiz, QuizQuestion};
use tutor_harness_core::TutorError;

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::generation;
use crate::session::{ChatTurn, Collaborators, GradeOutcome, TutorSession};
use crate::sqlite_store::{SqliteHashStore, SqliteIndex};

type SessionMap = HashMap<Uuid, Arc<Mutex<TutorSession>>>;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    deps: Collaborators,
    hashes: Arc<SqliteHashStore>,
    sessions: Arc<Mutex<SessionMap>>,
    /// Held for the whole of every index write.
    ingest_lock: Arc<Mutex<()>>,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and registers all
/// route handlers. The server runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = build_state(config).await?;
    let app = router(state);

    println!("Tutor server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the database and providers named in `config`.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::open(config).await?;
    Ok(AppState {
        config: Arc::new(config.clone()),
        deps: Collaborators {
            embedder: embedding::create_provider(&config.embedding)?,
            generator: generation::create_generator(&config.generation)?,
            index: Arc::new(SqliteIndex::new(pool.clone())),
            params: config.retrieval_params(),
        },
        hashes: Arc::new(SqliteHashStore::new(pool)),
        sessions: Arc::new(Mutex::new(HashMap::new())),
        ingest_lock: Arc::new(Mutex::new(())),
    })
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sessions", post(handle_create_session))
        .route("/sessions/{id}", delete(handle_delete_session))
        .route("/sessions/{id}/ask", post(handle_ask))
        .route("/sessions/{id}/quiz", post(handle_quiz))
        .route("/sessions/{id}/grade", post(handle_grade))
        .route("/sessions/{id}/profile", get(handle_profile))
        .route("/sessions/{id}/logs.csv", get(handle_logs_csv))
        .route("/sessions/{id}/logs.json", get(handle_logs_json))
        .route("/retrieve", post(handle_retrieve))
        .route("/ingest", post(handle_ingest))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"empty_context"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Classify an error by the [`TutorError`] in its chain.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        match TutorError::find(&err) {
            Some(kind) => {
                let status = match kind {
                    TutorError::Validation(_) => StatusCode::BAD_REQUEST,
                    TutorError::EmptyContext(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    TutorError::Parse(_) | TutorError::Provider(_) => StatusCode::BAD_GATEWAY,
                    TutorError::ScoresUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let code = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    "internal"
                } else {
                    kind.code()
                };
                AppError {
                    status,
                    code: code.to_string(),
                    message,
                }
            }
            None => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal".to_string(),
                message,
            },
        }
    }
}

async fn session(state: &AppState, id: &str) -> Result<Arc<Mutex<TutorSession>>, AppError> {
    let uuid = Uuid::parse_str(id).map_err(|_| not_found(format!("no session: {}", id)))?;
    state
        .sessions
        .lock()
        .await
        .get(&uuid)
        .cloned()
        .ok_or_else(|| not_found(format!("no session: {}", id)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sessions ============

/// Optional profile fields; missing ones come from `[learner]`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
    pub course: Option<String>,
    pub skill_level: Option<String>,
    pub goals: Option<String>,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: Uuid,
}

async fn handle_create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let req: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            anyhow::Error::from(TutorError::Validation(format!("invalid session body: {}", e)))
        })?
    };
    let learner = &state.config.learner;
    let skill: SkillLevel = req
        .skill_level
        .as_deref()
        .unwrap_or(&learner.skill_level)
        .parse()
        .map_err(anyhow::Error::from)?;
    let profile = LearnerProfile::new(
        req.name.unwrap_or_else(|| learner.name.clone()),
        req.course.unwrap_or_else(|| learner.course.clone()),
        skill,
        req.goals.unwrap_or_else(|| learner.goals.clone()),
    );

    let id = Uuid::new_v4();
    let session = TutorSession::new(profile, state.deps.clone());
    state
        .sessions
        .lock()
        .await
        .insert(id, Arc::new(Mutex::new(session)));

    Ok(Json(CreateSessionResponse { session_id: id }))
}

// ============ DELETE /sessions/{id} ============

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let removed = match Uuid::parse_str(&id) {
        Ok(uuid) => state.sessions.lock().await.remove(&uuid),
        Err(_) => None,
    };
    match removed {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found(format!("no session: {}", id))),
    }
}

// ============ POST /sessions/{id}/ask ============

#[derive(Deserialize)]
pub struct AskRequest {
    pub query: String,
}

async fn handle_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ChatTurn>, AppError> {
    let session = session(&state, &id).await?;
    let turn = session.lock().await.ask(&req.query).await?;
    Ok(Json(turn))
}

// ============ POST /sessions/{id}/quiz ============

#[derive(Deserialize)]
pub struct QuizRequest {
    pub query: Option<String>,
    pub num_questions: Option<usize>,
}

async fn handle_quiz(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<QuizRequest>,
) -> Result<Json<Quiz>, AppError> {
    let session = session(&state, &id).await?;
    let quiz = session
        .lock()
        .await
        .generate_quiz(req.query.as_deref(), req.num_questions.unwrap_or(5))
        .await?;
    Ok(Json(quiz))
}

// ============ POST /sessions/{id}/grade ============

#[derive(Deserialize)]
pub struct GradeRequest {
    pub concept: String,
    pub questions: Vec<QuizQuestion>,
    pub answers: Vec<String>,
}

async fn handle_grade(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<GradeOutcome>, AppError> {
    let session = session(&state, &id).await?;
    let outcome = session
        .lock()
        .await
        .grade(&req.concept, &req.questions, &req.answers)
        .await?;
    Ok(Json(outcome))
}

// ============ GET /sessions/{id}/profile ============

#[derive(Debug, Serialize)]
struct ProfileResponse {
    profile: LearnerProfile,
    trend: Vec<QuizScore>,
    concept_frequency: BTreeMap<String, usize>,
}

async fn handle_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let session = session(&state, &id).await?;
    let session = session.lock().await;
    let profile = session.profile();
    Ok(Json(ProfileResponse {
        trend: profile.get_quiz_trend(),
        concept_frequency: profile.get_concept_frequency(),
        profile: profile.clone(),
    }))
}

// ============ GET /sessions/{id}/logs.{csv,json} ============

async fn handle_logs_csv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let session = session(&state, &id).await?;
    let body = export_csv(session.lock().await.log().entries())?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body).into_response())
}

async fn handle_logs_json(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let session = session(&state, &id).await?;
    let body = export_json(session.lock().await.log().entries())?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// ============ POST /retrieve ============

#[derive(Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrievalResult>, AppError> {
    if req.query.trim().is_empty() {
        return Err(anyhow::Error::from(TutorError::Validation(
            "query must not be empty".into(),
        ))
        .into());
    }
    let mut params = state.deps.params;
    if let Some(k) = req.top_k {
        params.top_k = k;
    }
    let result = tutor_harness_core::retrieve::retrieve(
        &req.query,
        state.deps.embedder.as_ref(),
        state.deps.index.as_ref(),
        &params,
    )
    .await?;
    Ok(Json(result))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
pub struct IngestFile {
    pub name: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct IngestRequest {
    pub files: Vec<IngestFile>,
    pub course_id: Option<String>,
    pub uploaded_by: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestSummary>, AppError> {
    let files: Vec<SourceFile> = req
        .files
        .into_iter()
        .map(|f| SourceFile::new(f.name, f.text.into_bytes()))
        .collect();
    let ctx = IngestContext {
        extractor: &PlainTextExtractor,
        embedder: state.deps.embedder.as_ref(),
        index: state.deps.index.as_ref(),
        hashes: state.hashes.as_ref(),
        observer: &NoopObserver,
    };
    let options = state
        .config
        .ingest_options(req.course_id.as_deref(), req.uploaded_by.as_deref());
    let _guard = state.ingest_lock.lock().await;
    let summary = ingest(&files, &ctx, &options).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tutor_harness_core::store::VectorIndex;

    #[test]
    fn test_error_mapping() {
        let cases = [
            (TutorError::Validation("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (TutorError::EmptyContext("x".into()), StatusCode::UNPROCESSABLE_ENTITY, "empty_context"),
            (TutorError::Parse("x".into()), StatusCode::BAD_GATEWAY, "parse_error"),
            (TutorError::Provider("x".into()), StatusCode::BAD_GATEWAY, "provider_error"),
        ];
        for (kind, status, code) in cases {
            let err = AppError::from(anyhow::Error::from(kind).context("handling request"));
            assert_eq!(err.status, status);
            assert_eq!(err.code, code);
        }
        let err = AppError::from(anyhow::anyhow!("disk full"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = not_found("no session: abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"]["code"], "not_found");
        assert_eq!(json["error"]["message"], "no session: abc");
    }

    async fn test_state(dir: &tempfile::TempDir) -> AppState {
        let toml = format!(
            "[db]\npath = \"{}\"\n\n[embedding]\nprovider = \"token\"\nmodel = \"token-hash\"\ndims = 256\n",
            dir.path().join("tutor.sqlite").display()
        );
        let config = crate::config::parse_config(&toml).unwrap();
        build_state(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_session_flow_with_disabled_generator() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let Json(summary) = handle_ingest(
            State(state.clone()),
            Json(IngestRequest {
                files: vec![IngestFile {
                    name: "osmosis.md".into(),
                    text: "Osmosis moves water across a membrane.".into(),
                }],
                course_id: Some("bio".into()),
                uploaded_by: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(summary.ingested, 1);

        let Json(created) = handle_create_session(State(state.clone()), Bytes::new()).await.unwrap();
        let id = created.session_id.to_string();

        let err = handle_ask(
            State(state.clone()),
            Path(id.clone()),
            Json(AskRequest {
                query: "What is osmosis?".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.code, "provider_error");

        let Json(profile) = handle_profile(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(profile.profile.concepts_asked, vec!["What is osmosis?".to_string()]);
        assert_eq!(profile.concept_frequency.get("What is osmosis?"), Some(&1));

        let Json(result) = handle_retrieve(
            State(state.clone()),
            Json(RetrieveRequest {
                query: "osmosis water membrane".into(),
                top_k: Some(1),
            }),
        )
        .await
        .unwrap();
        assert!(result.is_confident);
        assert_eq!(result.chunks[0].metadata.course_id, "bio");

        let missing = handle_profile(State(state), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_err();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    fn osmosis_upload() -> IngestRequest {
        IngestRequest {
            files: vec![IngestFile {
                name: "osmosis.md".into(),
                text: "Osmosis moves water across a membrane.".into(),
            }],
            course_id: None,
            uploaded_by: None,
        }
    }

    #[tokio::test]
    async fn test_concurrent_ingest_of_same_file_stores_it_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let (a, b) = tokio::join!(
            handle_ingest(State(state.clone()), Json(osmosis_upload())),
            handle_ingest(State(state.clone()), Json(osmosis_upload())),
        );
        let (Json(a), Json(b)) = (a.unwrap(), b.unwrap());
        assert_eq!(a.ingested + b.ingested, 1);
        assert_eq!(a.skipped + b.skipped, 1);
        assert_eq!(state.deps.index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = test_state(&dir).await;

        let Json(created) = handle_create_session(State(state.clone()), Bytes::new()).await.unwrap();
        let id = created.session_id.to_string();

        let status = handle_delete_session(State(state.clone()), Path(id.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.sessions.lock().await.is_empty());

        let again = handle_delete_session(State(state.clone()), Path(id.clone()))
            .await
            .unwrap_err();
        assert_eq!(again.status, StatusCode::NOT_FOUND);
        let gone = handle_profile(State(state), Path(id)).await.unwrap_err();
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }
}

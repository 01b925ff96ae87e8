//! REST endpoints for intake sessions, entry points and reviews.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use chrono::Local;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::IntakeConfig;
use crate::error::{IntakeError, StoreError};
use crate::intake::answers::{AnswerUpdate, catalog};
use crate::intake::completion::{CompletionConfig, CompletionOrchestrator};
use crate::intake::controller::{
    ControllerConfig, IntakeController, IntakeEvent, IntakeSnapshot, Transition,
};
use crate::intake::entry::{EntryHandler, EntryOutcome, EntryPoint, EntryQuery};
use crate::intake::persistence::ProgressSaver;
use crate::intake::stage::IntakeStage;
use crate::reading::{GeminiGenerator, ReadingGenerator};
use crate::reviews::{Review, bundled_reviews, daily_reviews};
use crate::store::{FileStorage, LibSqlRecordStore, LocalStorage, MemoryStorage, RecordStore};

/// Where each session's local storage lives.
#[derive(Debug, Clone)]
pub enum SessionStorage {
    /// One JSON file per session under this directory.
    Directory(PathBuf),
    /// Process memory; lost on restart.
    InMemory,
}

impl SessionStorage {
    fn open(&self, session_id: &str) -> Arc<dyn LocalStorage> {
        match self {
            Self::Directory(root) => Arc::new(FileStorage::new(root, session_id)),
            Self::InMemory => Arc::new(MemoryStorage::new()),
        }
    }
}

struct Session {
    controller: Arc<IntakeController>,
    local: Arc<dyn LocalStorage>,
}

type SessionMap = Arc<RwLock<HashMap<Uuid, Session>>>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    sessions: SessionMap,
    store: Arc<dyn RecordStore>,
    generator: Arc<dyn ReadingGenerator>,
    storage: SessionStorage,
    completion: CompletionConfig,
    controller: ControllerConfig,
    entry: Arc<EntryHandler>,
    reviews: Arc<Vec<Review>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        generator: Arc<dyn ReadingGenerator>,
        storage: SessionStorage,
        completion: CompletionConfig,
        controller: ControllerConfig,
        reviews: Vec<Review>,
    ) -> Self {
        let entry = Arc::new(EntryHandler::new(
            Arc::clone(&store),
            Arc::clone(&generator),
            completion.generation_timeout,
        ));
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            store,
            generator,
            storage,
            completion,
            controller,
            entry,
            reviews: Arc::new(reviews),
        }
    }

    /// Production wiring: libsql record store, Gemini generator, one storage
    /// file per session and the bundled reviews.
    pub async fn from_config(config: &IntakeConfig) -> crate::error::Result<Self> {
        let store = Arc::new(LibSqlRecordStore::new_local(&config.db_path).await?);
        let generator = Arc::new(GeminiGenerator::new(config.gemini.clone())?);
        let reviews = bundled_reviews().map_err(StoreError::from)?;
        Ok(Self::new(
            store,
            generator,
            SessionStorage::Directory(config.storage_dir.clone()),
            config.completion.clone(),
            config.controller.clone(),
            reviews,
        ))
    }

    /// Register a fresh session at the first stage.
    ///
    /// The session leaves the registry on its own once it completes or
    /// exits to the landing page.
    pub async fn open_session(&self) -> (Uuid, Arc<IntakeController>) {
        let id = Uuid::new_v4();
        let local = self.storage.open(&id.to_string());
        let saver = ProgressSaver::spawn(Arc::clone(&self.store), Arc::clone(&local));
        let completion = CompletionOrchestrator::new(
            saver.clone(),
            Arc::clone(&self.generator),
            self.completion.clone(),
        );
        let controller = Arc::new(IntakeController::new(
            saver,
            completion,
            self.controller.clone(),
        ));

        spawn_eviction(Arc::clone(&self.sessions), id, controller.subscribe());
        self.sessions.write().await.insert(
            id,
            Session {
                controller: Arc::clone(&controller),
                local,
            },
        );
        info!(session_id = %id, "Intake session created");
        (id, controller)
    }

    /// Number of sessions still in progress.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn controller(&self, id: Uuid) -> Option<Arc<IntakeController>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .map(|s| Arc::clone(&s.controller))
    }

    /// Local storage for a returning session: the live one if the session is
    /// still registered, otherwise whatever the storage root still holds.
    async fn local_storage(&self, session: &str) -> Option<Arc<dyn LocalStorage>> {
        if let Ok(id) = Uuid::parse_str(session) {
            if let Some(s) = self.sessions.read().await.get(&id) {
                return Some(Arc::clone(&s.local));
            }
        }
        match self.storage {
            SessionStorage::Directory(_) => Some(self.storage.open(session)),
            SessionStorage::InMemory => None,
        }
    }
}

/// Drop a session from the registry once it reaches a terminal event.
///
/// Dropping the last controller handle also stops the session's save worker
/// after it drains its queue.
fn spawn_eviction(sessions: SessionMap, id: Uuid, mut events: broadcast::Receiver<IntakeEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(IntakeEvent::Completed { .. } | IntakeEvent::ExitedToLanding) => {
                    sessions.write().await.remove(&id);
                    info!(session_id = %id, "Intake session closed");
                    break;
                }
                Ok(IntakeEvent::StageChanged { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Build the intake REST routes.
pub fn intake_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/intake/sessions", post(create_session))
        .route("/api/intake/sessions/{id}", get(get_session))
        .route("/api/intake/sessions/{id}/answers", patch(update_answers))
        .route("/api/intake/sessions/{id}/advance", post(advance))
        .route("/api/intake/sessions/{id}/retreat", post(retreat))
        .route("/api/intake/sessions/{id}/partner", post(choose_partner))
        .route("/api/intake/sessions/{id}/jump", post(jump))
        .route("/api/entry", get(entry))
        .route("/api/reviews", get(reviews))
        .layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "reading-intake",
        "sessions": state.session_count().await,
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

fn session_body(id: Uuid, snapshot: &IntakeSnapshot) -> Value {
    json!({
        "session_id": id,
        "stage": snapshot.stage,
        "progress_percent": snapshot.progress_percent,
        "answers": snapshot.answers,
    })
}

fn catalogs() -> Value {
    json!({
        "love_reading_types": catalog::LOVE_READING_TYPES,
        "career_statuses": catalog::CAREER_STATUSES,
        "general_focuses": catalog::GENERAL_FOCUSES,
        "card_piles": catalog::CARD_PILES,
        "card_pile_focus_areas": catalog::CARD_PILE_FOCUS_AREAS,
        "stages": IntakeStage::ALL,
    })
}

fn parse_session_id(id: &str) -> Result<Uuid, (StatusCode, Json<Value>)> {
    Uuid::parse_str(id).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid session ID"})),
        )
    })
}

async fn find_session(
    state: &AppState,
    id: &str,
) -> Result<(Uuid, Arc<IntakeController>), (StatusCode, Json<Value>)> {
    let id = parse_session_id(id)?;
    match state.controller(id).await {
        Some(controller) => Ok((id, controller)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Session not found"})),
        )),
    }
}

fn intake_error(err: IntakeError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        IntakeError::Incomplete { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        IntakeError::TransitionInProgress | IntakeError::NotAtPartnerQuery { .. } => {
            StatusCode::CONFLICT
        }
    };
    let body = match &err {
        IntakeError::Incomplete { stage, source } => json!({
            "error": err.to_string(),
            "stage": stage,
            "reason": source.to_string(),
        }),
        _ => json!({"error": err.to_string()}),
    };
    (status, Json(body))
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let (id, controller) = state.open_session().await;
    let snapshot = controller.snapshot().await;

    let mut body = session_body(id, &snapshot);
    body["catalogs"] = catalogs();
    (StatusCode::CREATED, Json(body))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let snapshot = controller.snapshot().await;
            (StatusCode::OK, Json(session_body(id, &snapshot)))
        }
        Err(resp) => resp,
    }
}

async fn update_answers(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<AnswerUpdate>,
) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let snapshot = controller.update_answers(update).await;
            (StatusCode::OK, Json(session_body(id, &snapshot)))
        }
        Err(resp) => resp,
    }
}

async fn transition_response(
    id: Uuid,
    controller: &IntakeController,
    result: Result<Transition, IntakeError>,
) -> (StatusCode, Json<Value>) {
    match result {
        Ok(transition) => {
            let snapshot = controller.snapshot().await;
            let mut body = session_body(id, &snapshot);
            body["result"] = json!(transition);
            (StatusCode::OK, Json(body))
        }
        Err(e) => intake_error(e),
    }
}

async fn advance(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let result = controller.advance().await;
            transition_response(id, &controller, result).await
        }
        Err(resp) => resp,
    }
}

async fn retreat(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let result = controller.retreat().await;
            transition_response(id, &controller, result).await
        }
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct PartnerRequest {
    has_partner: bool,
}

async fn choose_partner(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PartnerRequest>,
) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let result = controller.choose_partner(req.has_partner).await;
            transition_response(id, &controller, result).await
        }
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct JumpRequest {
    stage: IntakeStage,
}

async fn jump(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JumpRequest>,
) -> impl IntoResponse {
    match find_session(&state, &id).await {
        Ok((id, controller)) => {
            let result = controller.jump_to(req.stage).await;
            transition_response(id, &controller, result).await
        }
        Err(resp) => resp,
    }
}

// ── Entry points ────────────────────────────────────────────────────────

async fn entry(State(state): State<AppState>, Query(query): Query<EntryQuery>) -> impl IntoResponse {
    let entry = EntryPoint::resolve(&query);

    // A direct view on a live session moves that session as well, or reports
    // why it could not.
    if let (EntryPoint::DirectView(stage), Some(session)) = (&entry, query.session.as_deref()) {
        let live = match Uuid::parse_str(session) {
            Ok(id) => state.controller(id).await.map(|c| (id, c)),
            Err(_) => None,
        };
        if let Some((id, controller)) = live {
            if let Err(e) = controller.jump_to(*stage).await {
                warn!(session_id = %id, error = %e, "Direct view jump rejected");
                return intake_error(e);
            }
        }
    }

    let local = match (&entry, query.session.as_deref()) {
        (EntryPoint::PaymentReturn { .. }, Some(session)) => state.local_storage(session).await,
        _ => None,
    };
    let outcome: EntryOutcome = state.entry.open(entry, local.as_deref()).await;
    (StatusCode::OK, Json(json!(outcome)))
}

// ── Reviews ─────────────────────────────────────────────────────────────

async fn reviews(State(state): State<AppState>) -> impl IntoResponse {
    Json(daily_reviews(&state.reviews, Local::now().date_naive()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::intake::persistence::test_support::CountingStore;
    use crate::reading::test_support::ScriptedGenerator;

    fn state(transition_delay: Duration) -> AppState {
        AppState::new(
            CountingStore::new(),
            Arc::new(ScriptedGenerator::new(true, true)),
            SessionStorage::InMemory,
            CompletionConfig::default(),
            ControllerConfig {
                transition_delay,
                ..Default::default()
            },
            Vec::new(),
        )
    }

    async fn wait_for_sessions(state: &AppState, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.session_count().await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session registry never reached the expected size");
    }

    #[tokio::test]
    async fn exit_and_completion_remove_sessions() {
        let state = state(Duration::ZERO);
        let mut sessions = Vec::new();
        for _ in 0..50 {
            sessions.push(state.open_session().await);
        }
        assert_eq!(state.session_count().await, 50);

        // Back from the first stage leaves the funnel.
        let (exited, controller) = &sessions[0];
        assert_eq!(controller.retreat().await.unwrap(), Transition::ExitedToLanding);

        // A non-bypass email completes with a redirect.
        let (completed, controller) = &sessions[1];
        controller
            .update_answers(AnswerUpdate {
                name: Some("Alex".to_string()),
                email: Some("alex@real.com".to_string()),
                ..Default::default()
            })
            .await;
        controller.jump_to(IntakeStage::DeliveryInfo).await.unwrap();
        assert!(matches!(
            controller.advance().await.unwrap(),
            Transition::Completed { .. }
        ));

        wait_for_sessions(&state, 48).await;
        assert!(state.controller(*exited).await.is_none());
        assert!(state.controller(*completed).await.is_none());
        assert!(state.controller(sessions[2].0).await.is_some());
    }

    #[tokio::test]
    async fn ordinary_transitions_keep_session_registered() {
        let state = state(Duration::ZERO);
        let (id, controller) = state.open_session().await;
        controller
            .update_answers(AnswerUpdate {
                name: Some("Alex".to_string()),
                ..Default::default()
            })
            .await;
        controller.advance().await.unwrap();
        controller.retreat().await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.controller(id).await.is_some());
    }

    #[tokio::test]
    async fn direct_view_during_transition_reports_conflict() {
        let state = state(Duration::from_millis(300));
        let (id, controller) = state.open_session().await;
        controller
            .update_answers(AnswerUpdate {
                name: Some("Alex".to_string()),
                ..Default::default()
            })
            .await;

        let moving = Arc::clone(&controller);
        let pending = tokio::spawn(async move { moving.advance().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let query = EntryQuery {
            view: Some("email".to_string()),
            session: Some(id.to_string()),
            ..Default::default()
        };
        let response = entry(State(state.clone()), Query(query))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        pending.await.unwrap().unwrap();
        assert_eq!(controller.current_stage().await, IntakeStage::Birthdate);
    }

    #[tokio::test]
    async fn direct_view_moves_idle_session() {
        let state = state(Duration::ZERO);
        let (id, controller) = state.open_session().await;

        let query = EntryQuery {
            view: Some("email".to_string()),
            session: Some(id.to_string()),
            ..Default::default()
        };
        let response = entry(State(state.clone()), Query(query))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(controller.current_stage().await, IntakeStage::Email);
    }
}

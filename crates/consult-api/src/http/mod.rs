use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use shared::config::AssistantConfig;
use shared::pipeline::ConsultPipeline;
use shared::session::ConsultSession;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

mod documents;
mod errors;
mod health;
mod messages;
mod sessions;

/// One lock per session, so a session only serves one request at a time
/// while different sessions proceed in parallel.
pub(super) type SharedSession = Arc<Mutex<ConsultSession>>;

#[derive(Clone)]
pub struct AppState {
    pipeline: ConsultPipeline,
    config: Arc<AssistantConfig>,
    sessions: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
}

impl AppState {
    pub fn new(pipeline: ConsultPipeline, config: AssistantConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn session(&self, session_id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Returns false when the session limit is reached.
    async fn register(&self, session: ConsultSession) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            return false;
        }
        sessions.insert(session.session_id(), Arc::new(Mutex::new(session)));
        true
    }

    async fn remove(&self, session_id: Uuid) -> bool {
        self.sessions.write().await.remove(&session_id).is_some()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/v1/sessions", post(sessions::create_session))
        .route("/v1/sessions/{session_id}", delete(sessions::delete_session))
        .route(
            "/v1/sessions/{session_id}/messages",
            post(messages::send_message).get(messages::list_messages),
        )
        .route(
            "/v1/sessions/{session_id}/documents",
            post(documents::ingest_documents),
        )
        .with_state(app_state)
}

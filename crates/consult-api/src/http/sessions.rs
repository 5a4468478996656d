use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use shared::models::{CreateSessionRequest, CreateSessionResponse, OkResponse};
use shared::profile::AssistantDomain;
use shared::session::ConsultSession;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, session_limit_response, session_not_found_response};

pub(super) async fn create_session(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Response {
    apply_default_domain(&mut body, state.config.default_domain);
    let req = match serde_json::from_value::<CreateSessionRequest>(body) {
        Ok(req) => req,
        Err(err) => return bad_request_response("invalid_request", &err.to_string()),
    };
    let profile = match req.profile.validate() {
        Ok(profile) => profile,
        Err(err) => return bad_request_response("invalid_profile", &err.to_string()),
    };

    let session = ConsultSession::new(profile);
    let response = CreateSessionResponse {
        session_id: session.session_id(),
        domain: session.profile().domain,
        created_at: session.created_at(),
    };
    if !state.register(session).await {
        return session_limit_response();
    }

    info!(
        session_id = %response.session_id,
        domain = response.domain.as_str(),
        "consultation session created"
    );
    (StatusCode::CREATED, Json(response)).into_response()
}

pub(super) async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    if !state.remove(session_id).await {
        return session_not_found_response();
    }

    info!(session_id = %session_id, "consultation session ended");
    (StatusCode::OK, Json(OkResponse { ok: true })).into_response()
}

fn apply_default_domain(body: &mut Value, default_domain: AssistantDomain) {
    if let Some(profile) = body.get_mut("profile").and_then(Value::as_object_mut)
        && profile.get("domain").is_none_or(Value::is_null)
    {
        profile.insert("domain".to_string(), json!(default_domain.as_str()));
    }
}

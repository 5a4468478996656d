use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{
    ConversationEntry, ListMessagesResponse, SendMessageRequest, SendMessageResponse,
};
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, session_not_found_response};

pub(super) async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let max_chars = state.config.max_message_chars;
    if req.message.chars().count() > max_chars {
        return bad_request_response(
            "message_too_long",
            &format!("Message must be at most {max_chars} characters"),
        );
    }

    let Some(session) = state.session(session_id).await else {
        return session_not_found_response();
    };
    let mut session = session.lock().await;
    let outcome = state.pipeline.handle(&mut session, &req.message).await;

    (StatusCode::OK, Json(SendMessageResponse::from(&outcome))).into_response()
}

pub(super) async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Response {
    let Some(session) = state.session(session_id).await else {
        return session_not_found_response();
    };
    let session = session.lock().await;

    (
        StatusCode::OK,
        Json(ListMessagesResponse {
            session_id,
            items: session
                .log()
                .entries()
                .iter()
                .map(ConversationEntry::from)
                .collect(),
        }),
    )
        .into_response()
}

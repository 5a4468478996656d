use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{ErrorBody, ErrorResponse};

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

pub(super) fn bad_request_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, code, message)
}

pub(super) fn session_not_found_response() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "session_not_found",
        "Session does not exist or has ended",
    )
}

pub(super) fn conflict_response(code: &str, message: &str) -> Response {
    error_response(StatusCode::CONFLICT, code, message)
}

pub(super) fn session_limit_response() -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "session_limit_reached",
        "Too many active sessions; retry later",
    )
}

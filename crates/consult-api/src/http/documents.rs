use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shared::models::{IngestDocumentsRequest, IngestDocumentsResponse};
use shared::profile::AssistantDomain;
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::errors::{bad_request_response, conflict_response, session_not_found_response};

pub(super) async fn ingest_documents(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<IngestDocumentsRequest>,
) -> Response {
    if req.documents.is_empty() {
        return bad_request_response("no_documents", "At least one document is required");
    }

    let Some(session) = state.session(session_id).await else {
        return session_not_found_response();
    };
    let session = session.lock().await;
    if session.profile().domain != AssistantDomain::Documents {
        return conflict_response(
            "documents_not_supported",
            "Documents can only be added to a documents session",
        );
    }

    match session
        .documents()
        .ingest(&req.documents, state.config.knowledge_max_chunk_chars)
    {
        Ok(report) => {
            info!(
                session_id = %session_id,
                documents = report.documents,
                chunks_indexed = report.chunks_indexed,
                chunks_skipped = report.chunks_skipped,
                "documents ingested"
            );
            (StatusCode::OK, Json(IngestDocumentsResponse::from(report))).into_response()
        }
        Err(err) => bad_request_response("invalid_document", &err.to_string()),
    }
}

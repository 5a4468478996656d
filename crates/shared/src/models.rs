use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::knowledge::{IngestReport, SourceDocument};
use crate::llm::StructuredResult;
use crate::pipeline::{ConsultOutcome, TerminalState};
use crate::presentation::render_outcome;
use crate::profile::{AssistantDomain, UserProfile};
use crate::routing::RouteSource;
use crate::session::{LogEntry, LogRole};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub domain: AssistantDomain,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub request_id: String,
    pub terminal_state: TerminalState,
    #[serde(default)]
    pub specialist: Option<String>,
    #[serde(default)]
    pub route_source: Option<RouteSource>,
    pub badge: String,
    pub display_text: String,
    #[serde(default)]
    pub result: Option<StructuredResult>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl From<&ConsultOutcome> for SendMessageResponse {
    fn from(outcome: &ConsultOutcome) -> Self {
        let rendered = render_outcome(outcome);
        Self {
            request_id: outcome.request_id.clone(),
            terminal_state: outcome.terminal_state,
            specialist: outcome.specialist().map(|specialist| specialist.as_str().to_string()),
            route_source: outcome.route.map(|route| route.source),
            badge: rendered.badge,
            display_text: rendered.body,
            result: outcome.result.clone(),
            rejection_reason: outcome.rejection_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: LogRole,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<&LogEntry> for ConversationEntry {
    fn from(entry: &LogEntry) -> Self {
        Self {
            role: entry.role,
            text: entry.text.clone(),
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    pub session_id: Uuid,
    pub items: Vec<ConversationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDocumentsRequest {
    pub documents: Vec<SourceDocument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDocumentsResponse {
    pub documents: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
}

impl From<IngestReport> for IngestDocumentsResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            documents: report.documents,
            chunks_indexed: report.chunks_indexed,
            chunks_skipped: report.chunks_skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::knowledge::{DocumentIndex, InMemoryDocumentIndex};
use crate::llm::StructuredResult;
use crate::profile::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub role: LogRole,
    pub text: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only record of one session's exchanges, kept for redisplay only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationLog {
    entries: Vec<LogEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: LogRole, text: impl Into<String>) {
        self.append_at(role, text, Utc::now());
    }

    pub fn append_at(&mut self, role: LogRole, text: impl Into<String>, recorded_at: DateTime<Utc>) {
        self.entries.push(LogEntry {
            role,
            text: text.into(),
            recorded_at,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// State for one conversation. Requests take it by `&mut`, so a session is
/// only ever driven by one request at a time.
pub struct ConsultSession {
    session_id: Uuid,
    profile: Arc<UserProfile>,
    log: ConversationLog,
    last_result: Option<StructuredResult>,
    documents: Arc<dyn DocumentIndex>,
    created_at: DateTime<Utc>,
}

impl ConsultSession {
    pub fn new(profile: UserProfile) -> Self {
        Self::with_index(profile, Arc::new(InMemoryDocumentIndex::new()))
    }

    pub fn with_index(profile: UserProfile, documents: Arc<dyn DocumentIndex>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            profile: Arc::new(profile),
            log: ConversationLog::new(),
            last_result: None,
            documents,
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn profile(&self) -> &Arc<UserProfile> {
        &self.profile
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut ConversationLog {
        &mut self.log
    }

    pub fn last_result(&self) -> Option<&StructuredResult> {
        self.last_result.as_ref()
    }

    pub(crate) fn set_last_result(&mut self, result: StructuredResult) {
        self.last_result = Some(result);
    }

    pub fn documents(&self) -> &dyn DocumentIndex {
        self.documents.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Debug for ConsultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsultSession")
            .field("session_id", &self.session_id)
            .field("domain", &self.profile.domain)
            .field("log_entries", &self.log.len())
            .field("indexed_chunks", &self.documents.chunk_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{ConsultSession, ConversationLog, LogRole};
    use crate::profile::{AssistantDomain, UserProfile};

    #[test]
    fn log_keeps_append_order() {
        let mut log = ConversationLog::new();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("valid time");
        log.append_at(LogRole::User, "hello", at);
        log.append_at(LogRole::Assistant, "hi there", at);

        let roles = log.entries().iter().map(|entry| entry.role).collect::<Vec<_>>();
        assert_eq!(roles, vec![LogRole::User, LogRole::Assistant]);
        assert_eq!(log.entries()[1].text, "hi there");
    }

    #[test]
    fn new_sessions_start_empty_with_distinct_ids() {
        let first = ConsultSession::new(UserProfile::new("a", AssistantDomain::Fitness));
        let second = ConsultSession::new(UserProfile::new("b", AssistantDomain::Fitness));

        assert_ne!(first.session_id(), second.session_id());
        assert!(first.log().is_empty());
        assert!(first.last_result().is_none());
        assert_eq!(first.documents().chunk_count(), 0);
    }
}

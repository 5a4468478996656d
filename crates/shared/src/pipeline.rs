use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::guardrails::{
    GateFailurePolicy, InputGateDecision, OutputGateDecision, OutputRejection, review_input,
    review_output,
};
use crate::knowledge::{DocumentIndex, RetrievedChunk};
use crate::llm::{
    LlmGateway, LlmGatewayRequest, StructuredResult, UserMessage, generate_with_telemetry,
    log_telemetry, sanitize_context_payload, validate_output_value,
};
use crate::presentation::render_outcome;
use crate::profile::UserProfile;
use crate::routing::{RouteDecision, Specialist, resolve_route};
use crate::session::{ConsultSession, LogRole};

pub const DEFAULT_KNOWLEDGE_TOP_K: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    InputChecked,
    Rejected,
    Dispatched,
    OutputChecked,
    Delivered,
    FallbackDelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Rejected,
    Delivered,
    FallbackDelivered,
}

impl TerminalState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::Delivered => "delivered",
            Self::FallbackDelivered => "fallback_delivered",
        }
    }

    const fn stage(self) -> RequestStage {
        match self {
            Self::Rejected => RequestStage::Rejected,
            Self::Delivered => RequestStage::Delivered,
            Self::FallbackDelivered => RequestStage::FallbackDelivered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultOutcome {
    pub request_id: String,
    pub trace: Vec<RequestStage>,
    pub terminal_state: TerminalState,
    pub route: Option<RouteDecision>,
    pub result: Option<StructuredResult>,
    pub rejection_reason: Option<String>,
    pub output_rejection: Option<OutputRejection>,
    pub input_failed_open: bool,
}

impl ConsultOutcome {
    pub fn specialist(&self) -> Option<Specialist> {
        self.route.map(|route| route.specialist)
    }

    pub fn reached(&self, stage: RequestStage) -> bool {
        self.trace.contains(&stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub input_failure_policy: GateFailurePolicy,
    pub knowledge_top_k: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            input_failure_policy: GateFailurePolicy::Allow,
            knowledge_top_k: DEFAULT_KNOWLEDGE_TOP_K,
        }
    }
}

/// Runs one request through input gate, router, specialist and output gate.
/// Calls are strictly sequential and no gateway error escapes.
#[derive(Clone)]
pub struct ConsultPipeline {
    gateway: Arc<dyn LlmGateway>,
    settings: PipelineSettings,
}

impl ConsultPipeline {
    pub fn new(gateway: Arc<dyn LlmGateway>, settings: PipelineSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub async fn handle(&self, session: &mut ConsultSession, message: &str) -> ConsultOutcome {
        let request_id = Uuid::new_v4().to_string();
        let session_id = session.session_id();
        let profile = Arc::clone(session.profile());
        let gateway = self.gateway.as_ref();
        let mut trace = vec![RequestStage::Received];

        info!(
            session_id = %session_id,
            request_id = %request_id,
            domain = profile.domain.as_str(),
            stage = "received",
            "consultation request received"
        );
        session.log_mut().append(LogRole::User, message);

        let input_decision = review_input(
            gateway,
            &request_id,
            message,
            &profile,
            self.settings.input_failure_policy,
        )
        .await;
        trace.push(RequestStage::InputChecked);

        let input_failed_open = match input_decision {
            InputGateDecision::Rejected { reasoning } => {
                return finish(
                    session,
                    ConsultOutcome {
                        request_id,
                        trace,
                        terminal_state: TerminalState::Rejected,
                        route: None,
                        result: None,
                        rejection_reason: Some(reasoning),
                        output_rejection: None,
                        input_failed_open: false,
                    },
                );
            }
            InputGateDecision::Accepted { failed_open, .. } => failed_open,
        };

        let route = resolve_route(gateway, &request_id, profile.domain, message).await;
        trace.push(RequestStage::Dispatched);
        info!(
            session_id = %session_id,
            request_id = %request_id,
            stage = "dispatched",
            specialist = route.specialist.as_str(),
            route_source = route.source.as_str(),
            "request dispatched to specialist"
        );

        let specialist_output = run_specialist(
            gateway,
            &request_id,
            route.specialist,
            message,
            &profile,
            session.documents(),
            self.settings.knowledge_top_k,
        )
        .await;

        let output_decision =
            review_output(gateway, &request_id, message, &profile, specialist_output).await;
        trace.push(RequestStage::OutputChecked);

        let (terminal_state, result, output_rejection) = match output_decision {
            OutputGateDecision::Approved { result, .. } => (TerminalState::Delivered, result, None),
            OutputGateDecision::Fallback { result, rejection } => {
                (TerminalState::FallbackDelivered, result, Some(rejection))
            }
        };

        finish(
            session,
            ConsultOutcome {
                request_id,
                trace,
                terminal_state,
                route: Some(route),
                result: Some(result),
                rejection_reason: None,
                output_rejection,
                input_failed_open,
            },
        )
    }
}

fn finish(session: &mut ConsultSession, mut outcome: ConsultOutcome) -> ConsultOutcome {
    outcome.trace.push(outcome.terminal_state.stage());

    let rendered = render_outcome(&outcome);
    session
        .log_mut()
        .append(LogRole::Assistant, format!("[{}] {}", rendered.badge, rendered.body));
    if let Some(result) = &outcome.result {
        session.set_last_result(result.clone());
    }

    info!(
        session_id = %session.session_id(),
        request_id = %outcome.request_id,
        stage = outcome.terminal_state.as_str(),
        specialist = outcome.specialist().map(Specialist::as_str),
        result_kind = outcome.result.as_ref().map(StructuredResult::kind),
        "consultation request finished"
    );
    outcome
}

async fn run_specialist(
    gateway: &dyn LlmGateway,
    request_id: &str,
    specialist: Specialist,
    message: &str,
    profile: &UserProfile,
    documents: &dyn DocumentIndex,
    top_k: usize,
) -> Result<StructuredResult, String> {
    let task = specialist.task();
    let user_message = UserMessage::inspect(message);
    let mut context_payload = json!({
        "message": user_message.text,
        "suspected_injection": user_message.suspected_injection,
        "profile": profile.context_payload(),
    });

    let retrieved = if specialist == Specialist::DocumentAnalyst {
        let retrieved = documents.search(message, top_k);
        if let Value::Object(entries) = &mut context_payload {
            entries.insert(
                "documents_available".to_string(),
                json!(documents.chunk_count() > 0),
            );
            entries.insert("excerpts".to_string(), excerpts_payload(&retrieved));
        }
        retrieved
    } else {
        Vec::new()
    };

    let request = LlmGatewayRequest::for_task(task, context_payload).for_request(request_id);
    let (llm_result, telemetry) = generate_with_telemetry(gateway, request).await;
    log_telemetry(request_id, &telemetry);

    let response = llm_result.map_err(|err| {
        warn!(
            request_id,
            specialist = specialist.as_str(),
            "specialist provider request failed: {err}"
        );
        err.to_string()
    })?;

    let contract = validate_output_value(task, &response.output).map_err(|err| {
        warn!(
            request_id,
            specialist = specialist.as_str(),
            "specialist output failed validation: {err}"
        );
        err.to_string()
    })?;

    let result = contract
        .into_structured_result()
        .ok_or_else(|| format!("{} returned a non-result contract", specialist.as_str()))?;
    Ok(restrict_sources(result, &retrieved))
}

fn excerpts_payload(retrieved: &[RetrievedChunk]) -> Value {
    let excerpts = retrieved
        .iter()
        .map(|hit| {
            json!({
                "chunk_id": hit.chunk.chunk_id,
                "document": hit.chunk.document_name,
                "text": hit.chunk.text,
            })
        })
        .collect::<Vec<_>>();
    sanitize_context_payload(&Value::Array(excerpts))
}

/// Document answers may only cite chunks that were actually retrieved.
fn restrict_sources(result: StructuredResult, retrieved: &[RetrievedChunk]) -> StructuredResult {
    match result {
        StructuredResult::DocumentAnswer(mut answer) => {
            let mut cited = HashSet::new();
            answer.sources.retain(|source| {
                retrieved.iter().any(|hit| hit.chunk.chunk_id == *source)
                    && cited.insert(source.clone())
            });
            StructuredResult::DocumentAnswer(answer)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::{RequestStage, TerminalState, restrict_sources};
    use crate::knowledge::{DocumentChunk, RetrievedChunk};
    use crate::llm::{DocumentAnswerOutput, StructuredResult};

    #[test]
    fn terminal_states_map_to_their_final_stage() {
        assert_eq!(TerminalState::Rejected.stage(), RequestStage::Rejected);
        assert_eq!(TerminalState::FallbackDelivered.as_str(), "fallback_delivered");
    }

    #[test]
    fn unretrieved_sources_are_dropped() {
        let retrieved = vec![RetrievedChunk {
            chunk: DocumentChunk {
                chunk_id: "abc123".to_string(),
                document_name: "report.pdf".to_string(),
                text: "Owned by Jane Doe.".to_string(),
            },
            score: 0.9,
        }];
        let result = restrict_sources(
            StructuredResult::DocumentAnswer(DocumentAnswerOutput {
                answer: "According to the uploaded document, Jane Doe.".to_string(),
                sources: vec!["abc123".to_string(), "made-up".to_string()],
            }),
            &retrieved,
        );

        let StructuredResult::DocumentAnswer(answer) = result else {
            panic!("expected a document answer");
        };
        assert_eq!(answer.sources, vec!["abc123".to_string()]);
    }

    #[test]
    fn repeated_citations_collapse_to_first_mention() {
        let retrieved = ["chunk-a", "chunk-b"]
            .into_iter()
            .map(|chunk_id| RetrievedChunk {
                chunk: DocumentChunk {
                    chunk_id: chunk_id.to_string(),
                    document_name: "lease.pdf".to_string(),
                    text: "Rent is due on the first.".to_string(),
                },
                score: 0.5,
            })
            .collect::<Vec<_>>();
        let result = restrict_sources(
            StructuredResult::DocumentAnswer(DocumentAnswerOutput {
                answer: "According to the uploaded document, rent is due on the first.".to_string(),
                sources: ["chunk-a", "chunk-b", "chunk-a", "chunk-b"]
                    .into_iter()
                    .map(ToString::to_string)
                    .collect(),
            }),
            &retrieved,
        );

        let StructuredResult::DocumentAnswer(answer) = result else {
            panic!("expected a document answer");
        };
        assert_eq!(answer.sources, vec!["chunk-a".to_string(), "chunk-b".to_string()]);
    }
}

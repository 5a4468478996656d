use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::llm::{
    FallbackKind, LlmGateway, LlmGatewayError, LlmGatewayRequest, LlmOutputContract, LlmTask,
    SafetyVerdict, StructuredResult, UserMessage, fallback_result, generate_with_telemetry,
    log_telemetry, policy_violation, validate_output_value,
};
use crate::profile::UserProfile;

pub const DEFAULT_REJECTION_REASON: &str = "Unsafe request detected.";
pub const EMPTY_MESSAGE_REASON: &str = "Please enter a question or describe your concern.";
pub const REVIEW_UNAVAILABLE_REASON: &str =
    "The safety review is unavailable right now. Please try again later.";

/// What the input gate does when the reviewer call itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateFailurePolicy {
    /// Treat the message as safe and continue (fail-open).
    Allow,
    /// Reject the message (fail-closed).
    Block,
}

impl GateFailurePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" | "open" | "fail_open" => Some(Self::Allow),
            "block" | "closed" | "fail_closed" => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputGateDecision {
    Accepted {
        verdict: SafetyVerdict,
        failed_open: bool,
    },
    Rejected {
        reasoning: String,
    },
}

pub async fn review_input(
    gateway: &dyn LlmGateway,
    request_id: &str,
    message: &str,
    profile: &UserProfile,
    on_failure: GateFailurePolicy,
) -> InputGateDecision {
    if message.trim().is_empty() {
        return InputGateDecision::Rejected {
            reasoning: EMPTY_MESSAGE_REASON.to_string(),
        };
    }

    let user_message = UserMessage::inspect(message);
    if user_message.suspected_injection {
        warn!(
            request_id,
            gate = "input",
            "message contains injection-like wording, flagging it for the reviewer"
        );
    }
    let payload = json!({
        "message": user_message.text,
        "suspected_injection": user_message.suspected_injection,
        "profile": profile.context_payload(),
    });

    match request_verdict(gateway, request_id, LlmTask::InputSafetyReview, payload).await {
        Ok(verdict) if verdict.is_safe => {
            info!(request_id, gate = "input", verdict = "safe", "input gate accepted message");
            InputGateDecision::Accepted {
                verdict,
                failed_open: false,
            }
        }
        Ok(verdict) => {
            info!(request_id, gate = "input", verdict = "unsafe", "input gate rejected message");
            InputGateDecision::Rejected {
                reasoning: visible_reasoning(&verdict.reasoning),
            }
        }
        Err(err) => match on_failure {
            GateFailurePolicy::Allow => {
                warn!(
                    request_id,
                    gate = "input",
                    "input safety review failed, continuing without a verdict: {err}"
                );
                InputGateDecision::Accepted {
                    verdict: SafetyVerdict {
                        is_safe: true,
                        reasoning: format!("Guardrail error: {err}"),
                    },
                    failed_open: true,
                }
            }
            GateFailurePolicy::Block => {
                warn!(
                    request_id,
                    gate = "input",
                    "input safety review failed, rejecting message: {err}"
                );
                InputGateDecision::Rejected {
                    reasoning: REVIEW_UNAVAILABLE_REASON.to_string(),
                }
            }
        },
    }
}

/// Why the output gate replaced a specialist result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputRejection {
    SpecialistFailed(String),
    PolicyViolation(String),
    ReviewerRejected(String),
    ReviewFailed(String),
}

impl OutputRejection {
    pub const fn fallback_kind(&self) -> FallbackKind {
        match self {
            Self::SpecialistFailed(_) => FallbackKind::ServiceFailure,
            Self::PolicyViolation(_) | Self::ReviewerRejected(_) | Self::ReviewFailed(_) => {
                FallbackKind::UnsafeOutput
            }
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::SpecialistFailed(_) => "specialist_failed",
            Self::PolicyViolation(_) => "policy_violation",
            Self::ReviewerRejected(_) => "reviewer_rejected",
            Self::ReviewFailed(_) => "review_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputGateDecision {
    Approved {
        result: StructuredResult,
        verdict: SafetyVerdict,
    },
    Fallback {
        result: StructuredResult,
        rejection: OutputRejection,
    },
}

impl OutputGateDecision {
    pub fn result(&self) -> &StructuredResult {
        match self {
            Self::Approved { result, .. } | Self::Fallback { result, .. } => result,
        }
    }
}

/// Reviews a specialist result. Any failure along the way, including a
/// missing result, resolves to the domain's static fallback.
pub async fn review_output(
    gateway: &dyn LlmGateway,
    request_id: &str,
    message: &str,
    profile: &UserProfile,
    specialist_output: Result<StructuredResult, String>,
) -> OutputGateDecision {
    let candidate = match specialist_output {
        Ok(candidate) => candidate,
        Err(reason) => return fallback(request_id, profile, OutputRejection::SpecialistFailed(reason)),
    };

    if let Some(rule) = policy_violation(profile, &candidate) {
        return fallback(request_id, profile, OutputRejection::PolicyViolation(rule));
    }

    let proposed_answer = match serde_json::to_value(&candidate) {
        Ok(value) => value,
        Err(err) => {
            return fallback(
                request_id,
                profile,
                OutputRejection::ReviewFailed(format!("result serialization failed: {err}")),
            );
        }
    };
    let user_message = UserMessage::inspect(message);
    let payload = json!({
        "message": user_message.text,
        "suspected_injection": user_message.suspected_injection,
        "profile": profile.context_payload(),
        "proposed_answer": proposed_answer,
    });

    match request_verdict(gateway, request_id, LlmTask::OutputSafetyReview, payload).await {
        Ok(verdict) if verdict.is_safe => {
            info!(
                request_id,
                gate = "output",
                verdict = "safe",
                result_kind = candidate.kind(),
                "output gate approved specialist result"
            );
            OutputGateDecision::Approved {
                result: candidate,
                verdict,
            }
        }
        Ok(verdict) => fallback(
            request_id,
            profile,
            OutputRejection::ReviewerRejected(visible_reasoning(&verdict.reasoning)),
        ),
        Err(err) => fallback(request_id, profile, OutputRejection::ReviewFailed(err.to_string())),
    }
}

fn fallback(request_id: &str, profile: &UserProfile, rejection: OutputRejection) -> OutputGateDecision {
    let detail = match &rejection {
        OutputRejection::SpecialistFailed(detail)
        | OutputRejection::PolicyViolation(detail)
        | OutputRejection::ReviewerRejected(detail)
        | OutputRejection::ReviewFailed(detail) => detail.as_str(),
    };
    warn!(
        request_id,
        gate = "output",
        rejection = rejection.label(),
        "specialist result replaced by fallback: {detail}"
    );

    OutputGateDecision::Fallback {
        result: fallback_result(profile.domain, rejection.fallback_kind()),
        rejection,
    }
}

async fn request_verdict(
    gateway: &dyn LlmGateway,
    request_id: &str,
    task: LlmTask,
    payload: Value,
) -> Result<SafetyVerdict, LlmGatewayError> {
    let request = LlmGatewayRequest::for_task(task, payload).for_request(request_id);
    let (result, telemetry) = generate_with_telemetry(gateway, request).await;
    log_telemetry(request_id, &telemetry);

    let contract = validate_output_value(task, &result?.output)
        .map_err(|err| LlmGatewayError::InvalidProviderPayload(err.to_string()))?;
    match contract {
        LlmOutputContract::SafetyReview(contract) => Ok(contract.output),
        _ => Err(LlmGatewayError::InvalidProviderPayload(
            "safety review contract type mismatch".to_string(),
        )),
    }
}

fn visible_reasoning(reasoning: &str) -> String {
    let trimmed = reasoning.trim();
    if trimmed.is_empty() {
        DEFAULT_REJECTION_REASON.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{GateFailurePolicy, OutputRejection, visible_reasoning};
    use crate::llm::FallbackKind;

    #[test]
    fn blank_reasoning_gets_default_explanation() {
        assert_eq!(visible_reasoning("   "), "Unsafe request detected.");
        assert_eq!(visible_reasoning(" drug seeking "), "drug seeking");
    }

    #[test]
    fn only_specialist_failures_use_the_service_fallback() {
        assert_eq!(
            OutputRejection::SpecialistFailed("timeout".to_string()).fallback_kind(),
            FallbackKind::ServiceFailure
        );
        for rejection in [
            OutputRejection::PolicyViolation("x".to_string()),
            OutputRejection::ReviewerRejected("x".to_string()),
            OutputRejection::ReviewFailed("x".to_string()),
        ] {
            assert_eq!(rejection.fallback_kind(), FallbackKind::UnsafeOutput);
        }
    }

    #[test]
    fn failure_policy_parse_accepts_aliases() {
        assert_eq!(GateFailurePolicy::parse("fail_open"), Some(GateFailurePolicy::Allow));
        assert_eq!(GateFailurePolicy::parse(" BLOCK "), Some(GateFailurePolicy::Block));
        assert_eq!(GateFailurePolicy::parse("maybe"), None);
    }
}

use shared::llm::{LlmTask, fallback_result, policy_violation};
use shared::pipeline::{ConsultOutcome, RequestStage, TerminalState};
use shared::profile::UserProfile;

const MAX_DELEGATED_CALLS: usize = 4;

/// Properties every outcome must satisfy, whatever the fixture expects.
pub fn check_invariants(
    profile: &UserProfile,
    outcome: &ConsultOutcome,
    seen_tasks: Option<&[LlmTask]>,
) -> Vec<String> {
    let mut issues = Vec::new();

    if outcome.trace.first() != Some(&RequestStage::Received)
        || outcome.trace.get(1) != Some(&RequestStage::InputChecked)
    {
        issues.push(format!("trace must start received -> input_checked, got {:?}", outcome.trace));
    }

    match outcome.terminal_state {
        TerminalState::Rejected => {
            if outcome.result.is_some() {
                issues.push("rejected request exposed a result".to_string());
            }
            if outcome
                .rejection_reason
                .as_deref()
                .is_none_or(|reason| reason.trim().is_empty())
            {
                issues.push("rejected request has no visible reasoning".to_string());
            }
            if outcome.reached(RequestStage::Dispatched) {
                issues.push("rejected request was dispatched".to_string());
            }
            if let Some(tasks) = seen_tasks
                && tasks.iter().any(|task| !task.is_safety_review())
            {
                issues.push(format!("rejected request invoked non-review tasks: {tasks:?}"));
            }
        }
        TerminalState::FallbackDelivered => match &outcome.output_rejection {
            Some(rejection) => {
                let expected = fallback_result(profile.domain, rejection.fallback_kind());
                if outcome.result.as_ref() != Some(&expected) {
                    issues.push(format!(
                        "fallback for {} is not the fixed fallback value",
                        rejection.label()
                    ));
                }
            }
            None => issues.push("fallback delivered without an output rejection".to_string()),
        },
        TerminalState::Delivered => match &outcome.result {
            Some(result) => {
                if let Some(rule) = policy_violation(profile, result) {
                    issues.push(format!("delivered result violates policy: {rule}"));
                }
            }
            None => issues.push("delivered request has no result".to_string()),
        },
    }

    if let Some(tasks) = seen_tasks
        && tasks.len() > MAX_DELEGATED_CALLS
    {
        issues.push(format!(
            "request made {} delegated calls; at most {MAX_DELEGATED_CALLS} are allowed",
            tasks.len()
        ));
    }

    issues
}

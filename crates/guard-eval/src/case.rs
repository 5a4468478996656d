use serde::Deserialize;
use serde_json::Value;
use shared::guardrails::GateFailurePolicy;
use shared::knowledge::SourceDocument;
use shared::llm::{LlmGatewayError, LlmTask, ScriptedGateway};
use shared::pipeline::TerminalState;
use shared::profile::UserProfile;
use shared::routing::{RouteSource, Specialist};

#[derive(Debug, Clone, Deserialize)]
pub struct EvalCaseFixture {
    pub case_id: String,
    pub description: String,
    pub profile: UserProfile,
    pub message: String,
    #[serde(default)]
    pub documents: Vec<SourceDocument>,
    #[serde(default)]
    pub input_gate_on_error: Option<GateFailurePolicy>,
    #[serde(default)]
    pub include_in_live_smoke: bool,
    #[serde(default)]
    pub mocked_gateway: MockedGatewayScript,
    pub expectations: EvalExpectations,
}

/// Stub replies for mocked mode. `always_fail` makes every delegated call
/// fail with that message; `replies` override it per task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MockedGatewayScript {
    #[serde(default)]
    pub always_fail: Option<String>,
    #[serde(default)]
    pub replies: Vec<MockedReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockedReply {
    pub task: LlmTask,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MockedGatewayScript {
    pub fn build(&self) -> ScriptedGateway {
        let gateway = match &self.always_fail {
            Some(reason) => ScriptedGateway::failing(LlmGatewayError::ProviderFailure(reason.clone())),
            None => ScriptedGateway::new(),
        };

        self.replies
            .iter()
            .fold(gateway, |gateway, reply| match (&reply.output, &reply.error) {
                (_, Some(error)) => {
                    gateway.with_error(reply.task, LlmGatewayError::ProviderFailure(error.clone()))
                }
                (Some(output), None) => gateway.with_output(reply.task, output.clone()),
                (None, None) => gateway.with_error(
                    reply.task,
                    LlmGatewayError::InvalidProviderPayload("empty scripted reply".to_string()),
                ),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvalExpectations {
    pub terminal_state: TerminalState,
    #[serde(default)]
    pub specialist: Option<Specialist>,
    #[serde(default)]
    pub route_source: Option<RouteSource>,
    #[serde(default)]
    pub reached_dispatch: Option<bool>,
    #[serde(default)]
    pub result_kind: Option<String>,
    #[serde(default)]
    pub output_rejection: Option<String>,
    /// Medications that must never appear in a delivered prescription.
    #[serde(default)]
    pub forbidden_medications: Vec<String>,
    /// Exact delegated call sequence; checked in mocked mode only.
    #[serde(default)]
    pub delegated_tasks: Option<Vec<LlmTask>>,
}

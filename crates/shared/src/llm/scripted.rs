use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use super::contracts::{LlmTask, OUTPUT_CONTRACT_VERSION_V1};
use super::gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
};

pub const SCRIPTED_MODEL: &str = "scripted/deterministic";

/// Deterministic stand-in for the delegated model. Each task answers with a
/// fixed reply, so replaying a request always yields the same outcome. Every
/// request is recorded for later inspection.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    replies: HashMap<LlmTask, Result<Value, LlmGatewayError>>,
    default_reply: Option<LlmGatewayError>,
    seen: Arc<Mutex<Vec<LlmGatewayRequest>>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task fails with `error`.
    pub fn failing(error: LlmGatewayError) -> Self {
        Self {
            default_reply: Some(error),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, task: LlmTask, output: Value) -> Self {
        self.replies.insert(task, Ok(wrap_contract(output)));
        self
    }

    /// Reply with `payload` exactly as given, without the contract envelope.
    pub fn with_raw_output(mut self, task: LlmTask, payload: Value) -> Self {
        self.replies.insert(task, Ok(payload));
        self
    }

    pub fn with_error(mut self, task: LlmTask, error: LlmGatewayError) -> Self {
        self.replies.insert(task, Err(error));
        self
    }

    pub fn with_verdict(self, task: LlmTask, is_safe: bool, reasoning: &str) -> Self {
        self.with_output(task, json!({ "is_safe": is_safe, "reasoning": reasoning }))
    }

    pub fn seen_requests(&self) -> Vec<LlmGatewayRequest> {
        self.lock_seen().clone()
    }

    pub fn seen_tasks(&self) -> Vec<LlmTask> {
        self.lock_seen().iter().map(|request| request.task).collect()
    }

    fn lock_seen(&self) -> std::sync::MutexGuard<'_, Vec<LlmGatewayRequest>> {
        match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LlmGateway for ScriptedGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            let task = request.task;
            self.lock_seen().push(request);

            let reply = match self.replies.get(&task) {
                Some(reply) => reply.clone(),
                None => Err(self.default_reply.clone().unwrap_or_else(|| {
                    LlmGatewayError::ProviderFailure(format!(
                        "no scripted reply for {}",
                        task.as_str()
                    ))
                })),
            };

            reply.map(|output| LlmGatewayResponse {
                model: SCRIPTED_MODEL.to_string(),
                provider_request_id: None,
                output,
                usage: None,
            })
        })
    }
}

fn wrap_contract(output: Value) -> Value {
    json!({
        "version": OUTPUT_CONTRACT_VERSION_V1,
        "output": output,
    })
}

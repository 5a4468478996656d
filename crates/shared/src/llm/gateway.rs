use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::contracts::LlmTask;
use super::prompts::{PromptTemplate, template_for_task};

pub type LlmGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<LlmGatewayResponse, LlmGatewayError>> + Send + 'a>>;

/// One delegated call. The prompts, contract version and output schema all
/// come from the task's template; callers only supply the context.
#[derive(Debug, Clone)]
pub struct LlmGatewayRequest {
    pub task: LlmTask,
    /// Pipeline request id; providers receive it as the end-user id.
    pub request_id: Option<String>,
    pub contract_version: &'static str,
    pub system_prompt: &'static str,
    pub context_prompt: &'static str,
    pub output_schema: Value,
    pub context_payload: Value,
}

impl LlmGatewayRequest {
    pub fn for_task(task: LlmTask, context_payload: Value) -> Self {
        let PromptTemplate {
            task,
            contract_version,
            system_prompt,
            context_prompt,
            output_schema,
        } = template_for_task(task);

        Self {
            task,
            request_id: None,
            contract_version,
            system_prompt,
            context_prompt,
            output_schema,
            context_payload,
        }
    }

    /// Blank ids are dropped rather than forwarded.
    pub fn for_request(mut self, request_id: &str) -> Self {
        let request_id = request_id.trim();
        self.request_id = (!request_id.is_empty()).then(|| request_id.to_string());
        self
    }

    pub const fn label(&self) -> &'static str {
        self.task.as_str()
    }

    /// The user-turn content: everything the model needs besides the system
    /// prompt, as one JSON document.
    pub fn user_prompt(&self) -> Value {
        json!({
            "task": self.label(),
            "instruction": self.context_prompt,
            "contract_version": self.contract_version,
            "output_schema": self.output_schema,
            "context_payload": self.context_payload,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmTokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmGatewayResponse {
    pub model: String,
    pub provider_request_id: Option<String>,
    /// Raw `{version, output}` envelope, not yet validated.
    pub output: Value,
    pub usage: Option<LlmTokenUsage>,
}

#[derive(Debug, Clone, Error)]
pub enum LlmGatewayError {
    #[error("delegated call timed out")]
    Timeout,
    #[error("delegated call failed: {0}")]
    ProviderFailure(String),
    #[error("delegated call returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

/// The delegated model call. Implementations must not panic on provider
/// failures; every failure is reported as an [`LlmGatewayError`].
pub trait LlmGateway: Send + Sync {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a>;
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use super::gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage,
};

const DEFAULT_CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;
// Delegated calls are not retried unless explicitly configured.
const DEFAULT_MAX_RETRIES: u32 = 0;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 250;
const DEFAULT_PRIMARY_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenRouterModelRoute {
    pub primary_model: String,
    pub fallback_model: Option<String>,
}

impl OpenRouterModelRoute {
    pub fn single(model: impl Into<String>) -> Self {
        Self {
            primary_model: model.into(),
            fallback_model: None,
        }
    }

    fn candidate_models(&self) -> Vec<&str> {
        let mut candidates = Vec::new();
        if !self.primary_model.is_empty() {
            candidates.push(self.primary_model.as_str());
        }

        if let Some(fallback_model) = self.fallback_model.as_deref()
            && !fallback_model.is_empty()
            && fallback_model != self.primary_model
        {
            candidates.push(fallback_model);
        }

        candidates
    }
}

#[derive(Debug, Clone)]
pub struct OpenRouterGatewayConfig {
    pub chat_completions_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_backoff_ms: u64,
    pub model_route: OpenRouterModelRoute,
}

impl OpenRouterGatewayConfig {
    pub fn from_env() -> Result<Self, OpenRouterConfigError> {
        let api_key = optional_trimmed_env("OPENROUTER_API_KEY")
            .ok_or_else(|| OpenRouterConfigError::MissingVar("OPENROUTER_API_KEY".to_string()))?;
        let chat_completions_url = optional_trimmed_env("OPENROUTER_CHAT_COMPLETIONS_URL")
            .unwrap_or_else(|| DEFAULT_CHAT_COMPLETIONS_URL.to_string());
        if !chat_completions_url.starts_with("http://")
            && !chat_completions_url.starts_with("https://")
        {
            return Err(OpenRouterConfigError::InvalidConfiguration(
                "OPENROUTER_CHAT_COMPLETIONS_URL must start with http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            chat_completions_url,
            api_key,
            timeout_ms: parse_env("OPENROUTER_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
            max_retries: parse_env("OPENROUTER_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_base_backoff_ms: parse_env(
                "OPENROUTER_RETRY_BASE_BACKOFF_MS",
                DEFAULT_RETRY_BASE_BACKOFF_MS,
            )?,
            model_route: OpenRouterModelRoute {
                primary_model: optional_trimmed_env("OPENROUTER_MODEL_PRIMARY")
                    .or_else(|| optional_trimmed_env("LLM_MODEL_NAME"))
                    .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string()),
                fallback_model: optional_trimmed_env("OPENROUTER_MODEL_FALLBACK"),
            },
        })
    }
}

#[derive(Debug, Error)]
pub enum OpenRouterConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid number in env var {key}: {value}")]
    ParseNumber { key: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("failed to build OpenRouter http client: {0}")]
    HttpClient(String),
}

#[derive(Clone)]
pub struct OpenRouterGateway {
    client: reqwest::Client,
    config: OpenRouterGatewayConfig,
}

impl OpenRouterGateway {
    pub fn new(config: OpenRouterGatewayConfig) -> Result<Self, OpenRouterConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| OpenRouterConfigError::HttpClient(err.to_string()))?;

        Ok(Self { client, config })
    }

    async fn generate_for_model(
        &self,
        model: &str,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, AttemptError> {
        let mut attempt = 0_u32;

        loop {
            match self.send_once(model, request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.retryable && attempt < self.config.max_retries => {
                    let backoff_ms = self
                        .config
                        .retry_base_backoff_ms
                        .saturating_mul(2_u64.saturating_pow(attempt));
                    debug!(
                        model,
                        task = request.label(),
                        attempt,
                        backoff_ms,
                        "retrying delegated model call: {}",
                        err.error
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(
        &self,
        model: &str,
        request: &LlmGatewayRequest,
    ) -> Result<LlmGatewayResponse, AttemptError> {
        let response = self
            .client
            .post(&self.config.chat_completions_url)
            .bearer_auth(&self.config.api_key)
            .json(&chat_completion_body(model, request))
            .send()
            .await
            .map_err(|err| {
                let error = if err.is_timeout() {
                    LlmGatewayError::Timeout
                } else {
                    LlmGatewayError::ProviderFailure("request_unavailable".to_string())
                };
                AttemptError::retryable(error)
            })?;

        let status = response.status();
        let header_request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response.text().await.map_err(|_| {
            AttemptError::invalid_payload("response_body_read_failed")
        })?;

        if !status.is_success() {
            return Err(AttemptError {
                error: LlmGatewayError::ProviderFailure(format!(
                    "status={} code={}",
                    status.as_u16(),
                    parse_provider_error_code(&body)
                )),
                retryable: is_retryable_status(status),
                fallback_allowed: status != StatusCode::UNAUTHORIZED
                    && status != StatusCode::FORBIDDEN,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|_| AttemptError::invalid_payload("response_json_parse_failed"))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AttemptError::invalid_payload("missing_choice"))?
            .message
            .content;

        let output = match content {
            Value::String(raw) => serde_json::from_str::<Value>(strip_code_fence(&raw))
                .map_err(|_| AttemptError::invalid_payload("content_not_json"))?,
            value @ Value::Object(_) => value,
            _ => return Err(AttemptError::invalid_payload("unsupported_content_shape")),
        };

        Ok(LlmGatewayResponse {
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            provider_request_id: header_request_id.or(parsed.id),
            output,
            usage: parsed.usage.map(|usage| LlmTokenUsage {
                prompt_tokens: clamp_to_u32(usage.prompt_tokens.unwrap_or(0)),
                completion_tokens: clamp_to_u32(usage.completion_tokens.unwrap_or(0)),
                total_tokens: clamp_to_u32(usage.total_tokens.unwrap_or(0)),
            }),
        })
    }
}

impl LlmGateway for OpenRouterGateway {
    fn generate<'a>(&'a self, request: LlmGatewayRequest) -> LlmGatewayFuture<'a> {
        Box::pin(async move {
            let candidate_models = self.config.model_route.candidate_models();
            let mut last_error = None;

            for model in candidate_models {
                match self.generate_for_model(model, &request).await {
                    Ok(response) => return Ok(response),
                    Err(err) if err.fallback_allowed => last_error = Some(err.error),
                    Err(err) => return Err(err.error),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                LlmGatewayError::ProviderFailure("no_model_candidates".to_string())
            }))
        })
    }
}

fn chat_completion_body(model: &str, request: &LlmGatewayRequest) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system_prompt },
            { "role": "user", "content": request.user_prompt().to_string() }
        ],
        "response_format": { "type": "json_object" },
        "temperature": 0
    });
    if let (Some(request_id), Value::Object(entries)) = (request.request_id.as_deref(), &mut body) {
        entries.insert("user".to_string(), json!(request_id));
    }
    body
}

#[derive(Debug)]
struct AttemptError {
    error: LlmGatewayError,
    retryable: bool,
    fallback_allowed: bool,
}

impl AttemptError {
    fn retryable(error: LlmGatewayError) -> Self {
        Self {
            error,
            retryable: true,
            fallback_allowed: true,
        }
    }

    fn invalid_payload(reason: &str) -> Self {
        Self {
            error: LlmGatewayError::InvalidProviderPayload(reason.to_string()),
            retryable: false,
            fallback_allowed: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<ChatCompletionChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, OpenRouterConfigError> {
    match optional_trimmed_env(key) {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| OpenRouterConfigError::ParseNumber {
                key: key.to_string(),
                value,
            }),
        None => Ok(default),
    }
}

fn optional_trimmed_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn parse_provider_error_code(body: &str) -> String {
    #[derive(Deserialize)]
    struct ProviderErrorEnvelope {
        error: Option<ProviderErrorDetails>,
    }

    #[derive(Deserialize)]
    struct ProviderErrorDetails {
        code: Option<Value>,
    }

    let code = serde_json::from_str::<ProviderErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|details| details.code);

    match code {
        Some(Value::String(code)) => code,
        Some(Value::Number(code)) => code.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Some models wrap JSON content in a markdown fence despite `json_object`.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn clamp_to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

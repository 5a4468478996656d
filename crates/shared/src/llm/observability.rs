use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{LlmGateway, LlmGatewayError, LlmGatewayRequest, LlmGatewayResponse, LlmTask};

#[derive(Debug, Clone)]
pub struct LlmTelemetryEvent {
    pub task: &'static str,
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub provider: String,
    pub model: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub estimated_cost_usd: Option<f64>,
    pub error_type: Option<&'static str>,
}

pub async fn generate_with_telemetry(
    llm_gateway: &dyn LlmGateway,
    request: LlmGatewayRequest,
) -> (
    Result<LlmGatewayResponse, LlmGatewayError>,
    LlmTelemetryEvent,
) {
    let task = request.task;
    let started_at = Instant::now();
    let result = llm_gateway.generate(request).await;
    let telemetry = telemetry_for_result(task, started_at.elapsed(), &result);
    (result, telemetry)
}

pub fn log_telemetry(request_id: &str, telemetry: &LlmTelemetryEvent) {
    match telemetry.error_type {
        None => info!(
            request_id,
            task = telemetry.task,
            outcome = telemetry.outcome,
            latency_ms = telemetry.latency_ms,
            provider = %telemetry.provider,
            model = ?telemetry.model,
            prompt_tokens = ?telemetry.prompt_tokens,
            completion_tokens = ?telemetry.completion_tokens,
            total_tokens = ?telemetry.total_tokens,
            estimated_cost_usd = ?telemetry.estimated_cost_usd,
            "delegated model call completed"
        ),
        Some(error_type) => warn!(
            request_id,
            task = telemetry.task,
            outcome = telemetry.outcome,
            latency_ms = telemetry.latency_ms,
            error_type,
            "delegated model call failed"
        ),
    }
}

fn telemetry_for_result(
    task: LlmTask,
    latency: Duration,
    result: &Result<LlmGatewayResponse, LlmGatewayError>,
) -> LlmTelemetryEvent {
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
    match result {
        Ok(response) => {
            let usage = response.usage.as_ref();
            LlmTelemetryEvent {
                task: task.as_str(),
                outcome: "success",
                latency_ms,
                provider: provider_from_model(&response.model),
                model: Some(response.model.clone()),
                prompt_tokens: usage.map(|usage| usage.prompt_tokens),
                completion_tokens: usage.map(|usage| usage.completion_tokens),
                total_tokens: usage.map(|usage| usage.total_tokens),
                estimated_cost_usd: usage.and_then(|usage| {
                    estimate_cost_usd(
                        &response.model,
                        usage.prompt_tokens,
                        usage.completion_tokens,
                    )
                }),
                error_type: None,
            }
        }
        Err(err) => LlmTelemetryEvent {
            task: task.as_str(),
            outcome: "failure",
            latency_ms,
            provider: "openrouter".to_string(),
            model: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            estimated_cost_usd: None,
            error_type: Some(error_type(err)),
        },
    }
}

fn provider_from_model(model: &str) -> String {
    model
        .split('/')
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("openrouter")
        .to_string()
}

pub fn error_type(error: &LlmGatewayError) -> &'static str {
    match error {
        LlmGatewayError::Timeout => "timeout",
        LlmGatewayError::ProviderFailure(_) => "provider_failure",
        LlmGatewayError::InvalidProviderPayload(_) => "invalid_provider_payload",
    }
}

fn estimate_cost_usd(model: &str, prompt_tokens: u32, completion_tokens: u32) -> Option<f64> {
    let (input_per_million, output_per_million) = pricing_for_model(model)?;
    let total = (f64::from(prompt_tokens) * input_per_million
        + f64::from(completion_tokens) * output_per_million)
        / 1_000_000.0;
    Some((total * 1_000_000.0).round() / 1_000_000.0)
}

fn pricing_for_model(model: &str) -> Option<(f64, f64)> {
    let normalized = model.trim().to_ascii_lowercase();
    if normalized.starts_with("openai/gpt-4o-mini") {
        return Some((0.15, 0.60));
    }
    if normalized.starts_with("openai/gpt-4o") {
        return Some((2.50, 10.00));
    }
    None
}

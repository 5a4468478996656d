pub mod contracts;
pub mod gateway;
pub mod observability;
pub mod openrouter;
pub mod prompts;
pub mod safety;
pub mod scripted;
pub mod validation;

pub use contracts::{
    ContractError, DocumentAnswerOutput, GeneralAdviceOutput, LlmOutputContract, LlmTask, Meal,
    MealPlanOutput, OUTPUT_CONTRACT_VERSION_V1, PrescriptionOutput, SafetyVerdict,
    StructuredResult, WorkoutPlanOutput, WorkoutSession, output_schema,
};
pub use gateway::{
    LlmGateway, LlmGatewayError, LlmGatewayFuture, LlmGatewayRequest, LlmGatewayResponse,
    LlmTokenUsage,
};
pub use observability::{LlmTelemetryEvent, generate_with_telemetry, log_telemetry};
pub use openrouter::{
    OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig, OpenRouterModelRoute,
};
pub use prompts::{PromptTemplate, template_for_task};
pub use safety::{
    FallbackKind, UserMessage, fallback_result, policy_violation, sanitize_context_payload,
};
pub use scripted::{SCRIPTED_MODEL, ScriptedGateway};
pub use validation::{OutputValidationError, validate_output_json, validate_output_value};

use jsonschema::JSONSchema;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use super::contracts::{ContractError, LlmOutputContract, LlmTask, output_schema, parse_contract};

#[derive(Debug, Error)]
pub enum OutputValidationError {
    #[error("model output is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("output schema for {task:?} failed to compile: {message}")]
    SchemaCompile { task: LlmTask, message: String },
    #[error("model output failed schema validation for {task:?}: {errors:?}")]
    SchemaViolation { task: LlmTask, errors: Vec<String> },
    #[error(transparent)]
    Contract(#[from] ContractError),
}

pub fn validate_output_json(
    task: LlmTask,
    raw_json: &str,
) -> Result<LlmOutputContract, OutputValidationError> {
    let payload: Value = serde_json::from_str(raw_json)?;
    validate_output_value(task, &payload)
}

pub fn validate_output_value(
    task: LlmTask,
    payload: &Value,
) -> Result<LlmOutputContract, OutputValidationError> {
    let validator = validator_for_task(task)?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(OutputValidationError::SchemaViolation { task, errors });
    }

    parse_contract(task, payload.clone()).map_err(OutputValidationError::from)
}

static SAFETY_REVIEW_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::InputSafetyReview)).map_err(|err| err.to_string())
});

static SPECIALIST_ROUTING_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::SpecialistRouting)).map_err(|err| err.to_string())
});

static PRESCRIPTION_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::Prescription)).map_err(|err| err.to_string())
});

static GENERAL_ADVICE_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::GeneralAdvice)).map_err(|err| err.to_string())
});

static WORKOUT_PLAN_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::WorkoutPlan)).map_err(|err| err.to_string())
});

static MEAL_PLAN_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::MealPlan)).map_err(|err| err.to_string())
});

static DOCUMENT_ANSWER_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&output_schema(LlmTask::DocumentAnswer)).map_err(|err| err.to_string())
});

fn validator_for_task(task: LlmTask) -> Result<&'static JSONSchema, OutputValidationError> {
    let validator_result = match task {
        LlmTask::InputSafetyReview | LlmTask::OutputSafetyReview => &*SAFETY_REVIEW_VALIDATOR,
        LlmTask::SpecialistRouting => &*SPECIALIST_ROUTING_VALIDATOR,
        LlmTask::Prescription => &*PRESCRIPTION_VALIDATOR,
        LlmTask::GeneralAdvice => &*GENERAL_ADVICE_VALIDATOR,
        LlmTask::WorkoutPlan => &*WORKOUT_PLAN_VALIDATOR,
        LlmTask::MealPlan => &*MEAL_PLAN_VALIDATOR,
        LlmTask::DocumentAnswer => &*DOCUMENT_ANSWER_VALIDATOR,
    };

    validator_result
        .as_ref()
        .map_err(|message| OutputValidationError::SchemaCompile {
            task,
            message: message.clone(),
        })
}

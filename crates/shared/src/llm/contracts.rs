use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const OUTPUT_CONTRACT_VERSION_V1: &str = "2026-10-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    InputSafetyReview,
    OutputSafetyReview,
    SpecialistRouting,
    Prescription,
    GeneralAdvice,
    WorkoutPlan,
    MealPlan,
    DocumentAnswer,
}

impl LlmTask {
    pub const fn contract_version(self) -> &'static str {
        OUTPUT_CONTRACT_VERSION_V1
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputSafetyReview => "input_safety_review",
            Self::OutputSafetyReview => "output_safety_review",
            Self::SpecialistRouting => "specialist_routing",
            Self::Prescription => "prescription",
            Self::GeneralAdvice => "general_advice",
            Self::WorkoutPlan => "workout_plan",
            Self::MealPlan => "meal_plan",
            Self::DocumentAnswer => "document_answer",
        }
    }

    pub const fn is_safety_review(self) -> bool {
        matches!(self, Self::InputSafetyReview | Self::OutputSafetyReview)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SafetyReviewContract {
    pub version: String,
    pub output: SafetyVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SpecialistRoutingContract {
    pub version: String,
    pub output: SpecialistRoutingOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PrescriptionContract {
    pub version: String,
    pub output: PrescriptionOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GeneralAdviceContract {
    pub version: String,
    pub output: GeneralAdviceOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkoutPlanContract {
    pub version: String,
    pub output: WorkoutPlanOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MealPlanContract {
    pub version: String,
    pub output: MealPlanOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DocumentAnswerContract {
    pub version: String,
    pub output: DocumentAnswerOutput,
}

/// Reviewer judgment returned by both safety gates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SpecialistRoutingOutput {
    pub specialist: String,
    pub reasoning: String,
}

/// Medication, instruction and quantity lists are parallel: entry `i` of each
/// describes the same medication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PrescriptionOutput {
    pub medications: Vec<String>,
    pub instructions: Vec<String>,
    pub quantities: Vec<String>,
    pub refill_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GeneralAdviceOutput {
    pub advice: String,
    pub follow_up: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkoutPlanOutput {
    pub title: String,
    pub sessions: Vec<WorkoutSession>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct WorkoutSession {
    pub day: String,
    pub focus: String,
    pub exercises: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MealPlanOutput {
    pub daily_calories: u32,
    pub meals: Vec<Meal>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Meal {
    pub name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DocumentAnswerOutput {
    pub answer: String,
    pub sources: Vec<String>,
}

/// The single answer shape a specialist produces for one accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum StructuredResult {
    Prescription(PrescriptionOutput),
    Advice(GeneralAdviceOutput),
    WorkoutPlan(WorkoutPlanOutput),
    MealPlan(MealPlanOutput),
    DocumentAnswer(DocumentAnswerOutput),
}

impl StructuredResult {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Prescription(_) => "prescription",
            Self::Advice(_) => "advice",
            Self::WorkoutPlan(_) => "workout_plan",
            Self::MealPlan(_) => "meal_plan",
            Self::DocumentAnswer(_) => "document_answer",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LlmOutputContract {
    SafetyReview(SafetyReviewContract),
    SpecialistRouting(SpecialistRoutingContract),
    Prescription(PrescriptionContract),
    GeneralAdvice(GeneralAdviceContract),
    WorkoutPlan(WorkoutPlanContract),
    MealPlan(MealPlanContract),
    DocumentAnswer(DocumentAnswerContract),
}

impl LlmOutputContract {
    pub fn into_structured_result(self) -> Option<StructuredResult> {
        match self {
            Self::Prescription(contract) => Some(StructuredResult::Prescription(contract.output)),
            Self::GeneralAdvice(contract) => Some(StructuredResult::Advice(contract.output)),
            Self::WorkoutPlan(contract) => Some(StructuredResult::WorkoutPlan(contract.output)),
            Self::MealPlan(contract) => Some(StructuredResult::MealPlan(contract.output)),
            Self::DocumentAnswer(contract) => Some(StructuredResult::DocumentAnswer(contract.output)),
            Self::SafetyReview(_) | Self::SpecialistRouting(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("output contract payload is invalid: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("output contract version mismatch for {task:?}: expected={expected}, actual={actual}")]
    VersionMismatch {
        task: LlmTask,
        expected: String,
        actual: String,
    },
    #[error("prescription lists are not parallel: medications={medications}, instructions={instructions}, quantities={quantities}")]
    UnalignedPrescription {
        medications: usize,
        instructions: usize,
        quantities: usize,
    },
}

pub fn output_schema(task: LlmTask) -> Value {
    match task {
        LlmTask::InputSafetyReview | LlmTask::OutputSafetyReview => {
            serde_json::to_value(schema_for!(SafetyReviewContract))
                .expect("safety review schema should be serializable")
        }
        LlmTask::SpecialistRouting => serde_json::to_value(schema_for!(SpecialistRoutingContract))
            .expect("specialist routing schema should be serializable"),
        LlmTask::Prescription => serde_json::to_value(schema_for!(PrescriptionContract))
            .expect("prescription schema should be serializable"),
        LlmTask::GeneralAdvice => serde_json::to_value(schema_for!(GeneralAdviceContract))
            .expect("general advice schema should be serializable"),
        LlmTask::WorkoutPlan => serde_json::to_value(schema_for!(WorkoutPlanContract))
            .expect("workout plan schema should be serializable"),
        LlmTask::MealPlan => serde_json::to_value(schema_for!(MealPlanContract))
            .expect("meal plan schema should be serializable"),
        LlmTask::DocumentAnswer => serde_json::to_value(schema_for!(DocumentAnswerContract))
            .expect("document answer schema should be serializable"),
    }
}

pub fn parse_contract(task: LlmTask, payload: Value) -> Result<LlmOutputContract, ContractError> {
    let contract = match task {
        LlmTask::InputSafetyReview | LlmTask::OutputSafetyReview => {
            let contract: SafetyReviewContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::SafetyReview(contract)
        }
        LlmTask::SpecialistRouting => {
            let contract: SpecialistRoutingContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::SpecialistRouting(contract)
        }
        LlmTask::Prescription => {
            let contract: PrescriptionContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            ensure_parallel_prescription(&contract.output)?;
            LlmOutputContract::Prescription(contract)
        }
        LlmTask::GeneralAdvice => {
            let contract: GeneralAdviceContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::GeneralAdvice(contract)
        }
        LlmTask::WorkoutPlan => {
            let contract: WorkoutPlanContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::WorkoutPlan(contract)
        }
        LlmTask::MealPlan => {
            let contract: MealPlanContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::MealPlan(contract)
        }
        LlmTask::DocumentAnswer => {
            let contract: DocumentAnswerContract = serde_json::from_value(payload)?;
            ensure_version(task, &contract.version)?;
            LlmOutputContract::DocumentAnswer(contract)
        }
    };

    Ok(contract)
}

fn ensure_version(task: LlmTask, actual: &str) -> Result<(), ContractError> {
    let expected = task.contract_version();
    if actual != expected {
        return Err(ContractError::VersionMismatch {
            task,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn ensure_parallel_prescription(output: &PrescriptionOutput) -> Result<(), ContractError> {
    let medications = output.medications.len();
    if output.instructions.len() != medications || output.quantities.len() != medications {
        return Err(ContractError::UnalignedPrescription {
            medications,
            instructions: output.instructions.len(),
            quantities: output.quantities.len(),
        });
    }
    Ok(())
}

use std::sync::Arc;

use shared::guardrails::GateFailurePolicy;
use shared::llm::{
    LlmGateway, LlmTask, OpenRouterConfigError, OpenRouterGateway, OpenRouterGatewayConfig,
    ScriptedGateway, StructuredResult,
};
use shared::pipeline::{ConsultOutcome, ConsultPipeline, PipelineSettings, RequestStage};
use shared::routing::{Classification, classify_message};
use shared::session::ConsultSession;
use thiserror::Error;
use tracing::debug;

use crate::case::EvalCaseFixture;
use crate::cli::{CliOptions, EvalMode};
use crate::fixture_io::{FixtureIoError, load_cases, load_routing_cases};
use crate::invariants::check_invariants;
use crate::routing_case::RoutingEvalCaseFixture;

const DOCUMENT_CHUNK_CHARS: usize = 600;

#[derive(Debug)]
pub struct EvalSummary {
    mode: EvalMode,
    results: Vec<CaseResult>,
}

impl EvalSummary {
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| !result.failures.is_empty())
    }

    pub fn print(&self) {
        println!("Guardrail Eval Harness ({})", self.mode.as_str());

        let mut passed = 0usize;
        for result in &self.results {
            if result.failures.is_empty() {
                passed += 1;
                println!("[PASS] {}: {}", result.case_id, result.description);
            } else {
                println!("[FAIL] {}: {}", result.case_id, result.description);
                for failure in &result.failures {
                    println!("  - {failure}");
                }
            }

            for note in &result.notes {
                println!("  * {note}");
            }
        }

        let total = self.results.len();
        let failed = total.saturating_sub(passed);
        println!("Summary: {total} total, {passed} passed, {failed} failed");
    }
}

#[derive(Debug)]
struct CaseResult {
    case_id: String,
    description: String,
    failures: Vec<String>,
    notes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Fixtures(#[from] FixtureIoError),
    #[error("failed to initialize OpenRouter in live mode: {0}")]
    OpenRouterConfig(#[from] OpenRouterConfigError),
    #[error("live mode requires at least one fixture with include_in_live_smoke=true")]
    NoLiveCases,
    #[error("no fixture matches --case {0}")]
    UnknownCase(String),
}

pub async fn run_eval(options: &CliOptions) -> Result<EvalSummary, EvalError> {
    let mut cases = load_cases()?;
    cases.sort_by(|left, right| left.case_id.cmp(&right.case_id));
    let mut routing_cases = load_routing_cases()?;
    routing_cases.sort_by(|left, right| left.case_id.cmp(&right.case_id));

    if let Some(case_id) = options.case_filter.as_deref() {
        cases.retain(|case| case.case_id == case_id);
        routing_cases.retain(|case| case.case_id == case_id);
        if cases.is_empty() && routing_cases.is_empty() {
            return Err(EvalError::UnknownCase(case_id.to_string()));
        }
    }

    if options.mode == EvalMode::Live {
        cases.retain(|case| case.include_in_live_smoke);
        if cases.is_empty() {
            return Err(EvalError::NoLiveCases);
        }
    }

    let live_gateway: Option<Arc<dyn LlmGateway>> = if options.mode == EvalMode::Live {
        Some(Arc::new(OpenRouterGateway::new(
            OpenRouterGatewayConfig::from_env()?,
        )?))
    } else {
        None
    };

    let mut results = Vec::with_capacity(cases.len() + routing_cases.len());
    for case in &cases {
        results.push(run_case(case, options.mode, live_gateway.clone()).await);
    }
    for case in &routing_cases {
        results.push(run_routing_case(case));
    }

    Ok(EvalSummary {
        mode: options.mode,
        results,
    })
}

async fn run_case(
    case: &EvalCaseFixture,
    mode: EvalMode,
    live_gateway: Option<Arc<dyn LlmGateway>>,
) -> CaseResult {
    let mut failures = Vec::new();
    let mut notes = Vec::new();

    let profile = match case.profile.clone().validate() {
        Ok(profile) => profile,
        Err(err) => {
            failures.push(format!("profile: {err}"));
            return CaseResult {
                case_id: case.case_id.clone(),
                description: case.description.clone(),
                failures,
                notes,
            };
        }
    };

    let (gateway, scripted): (Arc<dyn LlmGateway>, Option<ScriptedGateway>) = match live_gateway {
        Some(gateway) => (gateway, None),
        None => {
            let scripted = case.mocked_gateway.build();
            (Arc::new(scripted.clone()) as Arc<dyn LlmGateway>, Some(scripted))
        }
    };
    let pipeline = ConsultPipeline::new(
        gateway,
        PipelineSettings {
            input_failure_policy: case.input_gate_on_error.unwrap_or(GateFailurePolicy::Allow),
            ..PipelineSettings::default()
        },
    );

    let mut session = ConsultSession::new(profile.clone());
    if !case.documents.is_empty()
        && let Err(err) = session
            .documents()
            .ingest(&case.documents, DOCUMENT_CHUNK_CHARS)
    {
        failures.push(format!("documents: {err}"));
    }

    let outcome = pipeline.handle(&mut session, &case.message).await;
    debug!(case_id = %case.case_id, ?outcome, "case finished");
    let seen_tasks = scripted.as_ref().map(ScriptedGateway::seen_tasks);

    compare_expectations(case, mode, &outcome, seen_tasks.as_deref(), &mut failures);
    for issue in check_invariants(&profile, &outcome, seen_tasks.as_deref()) {
        failures.push(format!("invariant: {issue}"));
    }

    notes.push(format!(
        "terminal_state={} trace={}",
        outcome.terminal_state.as_str(),
        outcome
            .trace
            .iter()
            .map(|stage| format!("{stage:?}"))
            .collect::<Vec<_>>()
            .join(">")
    ));
    if let Some(reason) = &outcome.rejection_reason {
        notes.push(format!("rejection_reason={reason}"));
    }
    if outcome.input_failed_open {
        notes.push("input gate failed open".to_string());
    }

    CaseResult {
        case_id: case.case_id.clone(),
        description: case.description.clone(),
        failures,
        notes,
    }
}

fn compare_expectations(
    case: &EvalCaseFixture,
    mode: EvalMode,
    outcome: &ConsultOutcome,
    seen_tasks: Option<&[LlmTask]>,
    failures: &mut Vec<String>,
) {
    let expected = &case.expectations;

    if outcome.terminal_state != expected.terminal_state {
        failures.push(format!(
            "terminal_state: expected={}, actual={}",
            expected.terminal_state.as_str(),
            outcome.terminal_state.as_str()
        ));
    }

    if let Some(reached) = expected.reached_dispatch
        && outcome.reached(RequestStage::Dispatched) != reached
    {
        failures.push(format!(
            "reached_dispatch: expected={reached}, actual={}",
            !reached
        ));
    }

    if let Some(specialist) = expected.specialist
        && outcome.specialist() != Some(specialist)
    {
        failures.push(format!(
            "specialist: expected={}, actual={}",
            specialist.as_str(),
            outcome.specialist().map_or("none", |actual| actual.as_str())
        ));
    }

    if let Some(source) = expected.route_source
        && outcome.route.map(|route| route.source) != Some(source)
    {
        failures.push(format!(
            "route_source: expected={}, actual={}",
            source.as_str(),
            outcome.route.map_or("none", |route| route.source.as_str())
        ));
    }

    if let Some(kind) = expected.result_kind.as_deref() {
        let actual = outcome.result.as_ref().map_or("none", StructuredResult::kind);
        if actual != kind {
            failures.push(format!("result_kind: expected={kind}, actual={actual}"));
        }
    }

    if let Some(label) = expected.output_rejection.as_deref() {
        let actual = outcome
            .output_rejection
            .as_ref()
            .map_or("none", |rejection| rejection.label());
        if actual != label {
            failures.push(format!("output_rejection: expected={label}, actual={actual}"));
        }
    }

    if let Some(StructuredResult::Prescription(prescription)) = &outcome.result {
        for medication in &prescription.medications {
            let lowered = medication.to_ascii_lowercase();
            if let Some(forbidden) = expected
                .forbidden_medications
                .iter()
                .find(|forbidden| lowered.contains(&forbidden.to_ascii_lowercase()))
            {
                failures.push(format!(
                    "forbidden_medications: '{medication}' matches '{forbidden}'"
                ));
            }
        }
    }

    if mode == EvalMode::Mocked
        && let (Some(expected_tasks), Some(actual_tasks)) =
            (expected.delegated_tasks.as_deref(), seen_tasks)
        && expected_tasks != actual_tasks
    {
        failures.push(format!(
            "delegated_tasks: expected={expected_tasks:?}, actual={actual_tasks:?}"
        ));
    }
}

fn run_routing_case(case: &RoutingEvalCaseFixture) -> CaseResult {
    let mut failures = Vec::new();
    let classification = classify_message(case.domain, &case.message);

    match (&classification, &case.expectations.decided, &case.expectations.ambiguous) {
        (Classification::Decided(decision), Some(specialist), _) => {
            if decision.specialist != *specialist {
                failures.push(format!(
                    "decided: expected={}, actual={}",
                    specialist.as_str(),
                    decision.specialist.as_str()
                ));
            }
            if let Some(source) = case.expectations.source
                && decision.source != source
            {
                failures.push(format!(
                    "source: expected={}, actual={}",
                    source.as_str(),
                    decision.source.as_str()
                ));
            }
        }
        (Classification::Ambiguous(candidates), _, Some(expected)) => {
            if candidates != expected {
                failures.push(format!(
                    "ambiguous: expected={expected:?}, actual={candidates:?}"
                ));
            }
        }
        (actual, _, _) => failures.push(format!(
            "classification: expected decided={:?} ambiguous={:?}, actual={actual:?}",
            case.expectations.decided, case.expectations.ambiguous
        )),
    }

    CaseResult {
        case_id: case.case_id.clone(),
        description: case.description.clone(),
        failures,
        notes: Vec::new(),
    }
}

use serde_json::Value;

use super::contracts::{GeneralAdviceOutput, StructuredResult};
use crate::profile::{AssistantDomain, UserProfile};

const REDACTED_UNTRUSTED_TEXT: &str = "[redacted untrusted instruction]";

const CONTROLLED_SUBSTANCES: &[&str] = &[
    "oxycodone",
    "oxycontin",
    "percocet",
    "hydrocodone",
    "vicodin",
    "morphine",
    "fentanyl",
    "codeine",
    "tramadol",
    "methadone",
    "buprenorphine",
    "alprazolam",
    "xanax",
    "diazepam",
    "valium",
    "lorazepam",
    "ativan",
    "clonazepam",
    "klonopin",
    "adderall",
    "amphetamine",
    "methylphenidate",
    "ritalin",
    "modafinil",
    "phentermine",
    "zolpidem",
];

/// Allergy names that stand for a whole drug class.
const ALLERGY_CLASSES: &[(&str, &[&str])] = &[
    (
        "penicillin",
        &[
            "penicillin",
            "amoxicillin",
            "ampicillin",
            "augmentin",
            "dicloxacillin",
            "nafcillin",
            "oxacillin",
            "piperacillin",
        ],
    ),
    ("sulfa", &["sulfamethoxazole", "bactrim", "sulfasalazine", "sulfadiazine"]),
    (
        "nsaid",
        &["ibuprofen", "naproxen", "aspirin", "diclofenac", "celecoxib", "ketorolac"],
    ),
    ("aspirin", &["aspirin", "acetylsalicylic"]),
    ("cephalosporin", &["cephalexin", "cefuroxime", "ceftriaxone", "cefdinir"]),
];

/// Which static fallback replaced a specialist result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    UnsafeOutput,
    ServiceFailure,
}

pub fn fallback_result(domain: AssistantDomain, kind: FallbackKind) -> StructuredResult {
    let (advice, follow_up) = match (domain, kind) {
        (AssistantDomain::Medical, FallbackKind::UnsafeOutput) => (
            "I'm sorry, but I cannot provide specific medical advice or prescriptions that may be unsafe or \
require in-person evaluation. Your health is my priority. Please consult a licensed physician in person for \
proper diagnosis and treatment.",
            "Seek immediate care if symptoms worsen or include chest pain, difficulty breathing, severe bleeding, \
or confusion.",
        ),
        (AssistantDomain::Medical, FallbackKind::ServiceFailure) => (
            "Due to a system issue, I cannot provide detailed advice at this time. Please see a doctor in person.",
            "Contact a healthcare provider as soon as possible.",
        ),
        (AssistantDomain::Fitness, FallbackKind::UnsafeOutput) => (
            "I'm sorry, but I cannot recommend that plan safely. Please consult a certified trainer or your \
physician in person before starting a new program.",
            "Stop exercising and seek medical care if you feel chest pain, dizziness, or shortness of breath.",
        ),
        (AssistantDomain::Fitness, FallbackKind::ServiceFailure) => (
            "Due to a system issue, I cannot build a plan right now. Please check with a certified trainer in \
person.",
            "Try again later or book a session with a qualified coach.",
        ),
        (AssistantDomain::Documents, FallbackKind::UnsafeOutput) => (
            "I'm sorry, but I cannot share that answer. Please review the source documents directly or consult a \
qualified professional.",
            "Contact the document owner or a qualified professional for clarification.",
        ),
        (AssistantDomain::Documents, FallbackKind::ServiceFailure) => (
            "Due to a system issue, I cannot answer from your documents at this time.",
            "Try again later or review the documents directly.",
        ),
    };

    StructuredResult::Advice(GeneralAdviceOutput {
        advice: advice.to_string(),
        follow_up: follow_up.to_string(),
    })
}

/// Deterministic contraindication check run before the delegated reviewer.
/// Returns the violated rule, if any.
pub fn policy_violation(profile: &UserProfile, result: &StructuredResult) -> Option<String> {
    match result {
        StructuredResult::Prescription(prescription) => {
            prescription.medications.iter().find_map(|medication| {
                let normalized = medication.to_ascii_lowercase();
                if let Some(substance) = CONTROLLED_SUBSTANCES
                    .iter()
                    .find(|substance| normalized.contains(*substance))
                {
                    return Some(format!("controlled substance prescribed: {substance}"));
                }
                profile
                    .allergies
                    .iter()
                    .find(|allergy| allergy_matches(allergy, &normalized))
                    .map(|allergy| format!("medication '{medication}' conflicts with allergy '{allergy}'"))
            })
        }
        StructuredResult::MealPlan(plan) => plan
            .meals
            .iter()
            .flat_map(|meal| meal.items.iter())
            .find_map(|item| {
                let normalized = item.to_ascii_lowercase();
                profile
                    .allergies
                    .iter()
                    .find(|allergy| allergy_matches(allergy, &normalized))
                    .map(|allergy| format!("meal item '{item}' conflicts with allergy '{allergy}'"))
            }),
        StructuredResult::Advice(_)
        | StructuredResult::WorkoutPlan(_)
        | StructuredResult::DocumentAnswer(_) => None,
    }
}

fn allergy_matches(allergy: &str, normalized_text: &str) -> bool {
    let allergy = allergy.trim().to_ascii_lowercase();
    if allergy.is_empty() {
        return false;
    }
    if normalized_text.contains(allergy.as_str()) {
        return true;
    }

    ALLERGY_CLASSES
        .iter()
        .filter(|(class, _)| allergy.contains(class))
        .flat_map(|(_, members)| members.iter())
        .any(|member| normalized_text.contains(member))
}

/// The user's message as every gate and specialist receives it: whitespace
/// compacted, never redacted. Injection-like wording is flagged so the
/// reviewers can weigh it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub text: String,
    pub suspected_injection: bool,
}

impl UserMessage {
    pub fn inspect(raw: &str) -> Self {
        let text = compact_whitespace(raw);
        let suspected_injection = looks_like_prompt_injection(&text);
        Self {
            text,
            suspected_injection,
        }
    }
}

/// Redacts injection-like strings inside profile fields and document
/// excerpts. Never applied to the user's message.
pub fn sanitize_context_payload(payload: &Value) -> Value {
    match payload {
        Value::String(raw) => Value::String(sanitize_untrusted_text(raw)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_context_payload).collect()),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), sanitize_context_payload(value)))
                .collect(),
        ),
        _ => payload.clone(),
    }
}

fn sanitize_untrusted_text(value: &str) -> String {
    let compact = compact_whitespace(value);
    if looks_like_prompt_injection(&compact) {
        return REDACTED_UNTRUSTED_TEXT.to_string();
    }
    compact
}

fn compact_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_prompt_injection(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    let words = lower
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    let has_word = |candidates: &[&str]| words.iter().any(|word| candidates.contains(word));
    let has_phrase = |phrase: &[&str]| words.windows(phrase.len()).any(|window| window == phrase);

    let ignore_or_override_instruction = has_word(&["ignore", "disregard", "override"])
        && (has_word(&["instruction", "instructions"])
            || has_phrase(&["system", "prompt"])
            || has_phrase(&["developer", "message"]));
    let role_takeover = has_phrase(&["you", "are", "now"])
        || has_phrase(&["act", "as"])
        || has_phrase(&["pretend", "to", "be"]);
    let verdict_forgery = lower.contains("is_safe") || has_phrase(&["mark", "this", "as", "safe"]);
    let secret_exfiltration = (has_phrase(&["api", "key"])
        || has_word(&["password", "passwords", "secret", "secrets"]))
        && (has_word(&["reveal", "dump"]) || has_phrase(&["send", "me"]));

    ignore_or_override_instruction || role_takeover || verdict_forgery || secret_exfiltration
}

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::llm::{
    LlmGateway, LlmGatewayError, LlmGatewayRequest, LlmOutputContract, LlmTask,
    UserMessage, generate_with_telemetry, log_telemetry, validate_output_value,
};
use crate::profile::AssistantDomain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialist {
    Prescriber,
    Advisor,
    WorkoutCoach,
    Nutritionist,
    DocumentAnalyst,
}

impl Specialist {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prescriber => "prescriber",
            Self::Advisor => "advisor",
            Self::WorkoutCoach => "workout_coach",
            Self::Nutritionist => "nutritionist",
            Self::DocumentAnalyst => "document_analyst",
        }
    }

    pub const fn task(self) -> LlmTask {
        match self {
            Self::Prescriber => LlmTask::Prescription,
            Self::Advisor => LlmTask::GeneralAdvice,
            Self::WorkoutCoach => LlmTask::WorkoutPlan,
            Self::Nutritionist => LlmTask::MealPlan,
            Self::DocumentAnalyst => LlmTask::DocumentAnswer,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        [
            Self::Prescriber,
            Self::Advisor,
            Self::WorkoutCoach,
            Self::Nutritionist,
            Self::DocumentAnalyst,
        ]
        .into_iter()
        .find(|specialist| specialist.as_str() == normalized)
    }

    pub const fn remit(self) -> &'static str {
        match self {
            Self::Prescriber => "requests for medication, prescriptions, refills or dosing",
            Self::Advisor => "symptoms, health concerns and general medical questions",
            Self::WorkoutCoach => "exercise, training plans, activity and recovery",
            Self::Nutritionist => "meals, diet, calories and eating habits",
            Self::DocumentAnalyst => "questions about the uploaded documents",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Prescriber => &[
                "prescribe",
                "prescription",
                "medication",
                "medicine",
                "meds",
                "drug",
                "pill",
                "dosage",
                "dose",
                "refill",
                "can i take",
            ],
            Self::Advisor => &[
                "symptom",
                "pain",
                "headache",
                "fever",
                "cough",
                "sick",
                "hurt",
                "rash",
                "worried",
                "what should i do",
                "diagnos",
                "cancer",
            ],
            Self::WorkoutCoach => &[
                "workout",
                "exercise",
                "training",
                "gym",
                "run",
                "cardio",
                "strength",
                "lift",
                "muscle",
                "routine",
                "reps",
                "stretch",
            ],
            Self::Nutritionist => &[
                "meal",
                "diet",
                "nutrition",
                "eat",
                "food",
                "calorie",
                "protein",
                "recipe",
                "breakfast",
                "lunch",
                "dinner",
                "snack",
            ],
            Self::DocumentAnalyst => &[],
        }
    }
}

pub const fn registered_specialists(domain: AssistantDomain) -> &'static [Specialist] {
    match domain {
        AssistantDomain::Medical => &[Specialist::Prescriber, Specialist::Advisor],
        AssistantDomain::Fitness => &[Specialist::WorkoutCoach, Specialist::Nutritionist],
        AssistantDomain::Documents => &[Specialist::DocumentAnalyst],
    }
}

pub const fn default_specialist(domain: AssistantDomain) -> Specialist {
    match domain {
        AssistantDomain::Medical => Specialist::Advisor,
        AssistantDomain::Fitness => Specialist::WorkoutCoach,
        AssistantDomain::Documents => Specialist::DocumentAnalyst,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    Keyword,
    Sole,
    Delegated,
    DefaultFallback,
}

impl RouteSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Sole => "sole",
            Self::Delegated => "delegated",
            Self::DefaultFallback => "default_fallback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub specialist: Specialist,
    pub source: RouteSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Decided(RouteDecision),
    /// No single specialist won; the candidates are the tied top scorers, or
    /// every registered specialist when nothing matched.
    Ambiguous(Vec<Specialist>),
}

/// Keyword classification. Deterministic and free of delegated calls.
pub fn classify_message(domain: AssistantDomain, message: &str) -> Classification {
    let registered = registered_specialists(domain);
    if let [only] = registered {
        return Classification::Decided(RouteDecision {
            specialist: *only,
            source: RouteSource::Sole,
        });
    }

    let tokens = tokenize(message);
    let phrase = tokens.join(" ");
    let scored = registered
        .iter()
        .map(|specialist| (*specialist, keyword_score(*specialist, &tokens, &phrase)))
        .collect::<Vec<_>>();
    let best = scored.iter().map(|(_, score)| *score).max().unwrap_or(0);
    if best == 0 {
        return Classification::Ambiguous(registered.to_vec());
    }

    let leaders = scored
        .into_iter()
        .filter(|(_, score)| *score == best)
        .map(|(specialist, _)| specialist)
        .collect::<Vec<_>>();
    match leaders.as_slice() {
        [winner] => Classification::Decided(RouteDecision {
            specialist: *winner,
            source: RouteSource::Keyword,
        }),
        _ => Classification::Ambiguous(leaders),
    }
}

/// Keyword classification first; the delegated model only breaks ties.
pub async fn resolve_route(
    gateway: &dyn LlmGateway,
    request_id: &str,
    domain: AssistantDomain,
    message: &str,
) -> RouteDecision {
    let candidates = match classify_message(domain, message) {
        Classification::Decided(decision) => return decision,
        Classification::Ambiguous(candidates) => candidates,
    };

    let request = LlmGatewayRequest::for_task(
        LlmTask::SpecialistRouting,
        tie_breaker_payload(message, &candidates),
    )
    .for_request(request_id);
    let (result, telemetry) = generate_with_telemetry(gateway, request).await;
    log_telemetry(request_id, &telemetry);

    match result
        .and_then(|response| parse_routing_choice(&response.output, &candidates))
    {
        Ok(specialist) => {
            info!(
                request_id,
                specialist = specialist.as_str(),
                "delegated tie-breaker selected specialist"
            );
            RouteDecision {
                specialist,
                source: RouteSource::Delegated,
            }
        }
        Err(err) => {
            let specialist = default_specialist(domain);
            warn!(
                request_id,
                specialist = specialist.as_str(),
                "delegated tie-breaker unavailable, using default specialist: {err}"
            );
            RouteDecision {
                specialist,
                source: RouteSource::DefaultFallback,
            }
        }
    }
}

/// Only the tied candidates are offered, each with what it handles, so the
/// guidance never names a specialist outside the session's domain.
fn tie_breaker_payload(message: &str, candidates: &[Specialist]) -> Value {
    let user_message = UserMessage::inspect(message);
    json!({
        "message": user_message.text,
        "suspected_injection": user_message.suspected_injection,
        "candidates": candidates
            .iter()
            .map(|candidate| json!({ "name": candidate.as_str(), "handles": candidate.remit() }))
            .collect::<Vec<_>>(),
    })
}

fn parse_routing_choice(
    payload: &serde_json::Value,
    candidates: &[Specialist],
) -> Result<Specialist, LlmGatewayError> {
    let contract = validate_output_value(LlmTask::SpecialistRouting, payload)
        .map_err(|err| LlmGatewayError::InvalidProviderPayload(err.to_string()))?;
    let LlmOutputContract::SpecialistRouting(contract) = contract else {
        return Err(LlmGatewayError::InvalidProviderPayload(
            "routing contract type mismatch".to_string(),
        ));
    };

    Specialist::parse(&contract.output.specialist)
        .filter(|specialist| candidates.contains(specialist))
        .ok_or_else(|| {
            LlmGatewayError::InvalidProviderPayload(format!(
                "unregistered specialist '{}'",
                contract.output.specialist
            ))
        })
}

fn keyword_score(specialist: Specialist, tokens: &[String], phrase: &str) -> usize {
    specialist
        .keywords()
        .iter()
        .filter(|keyword| {
            if keyword.contains(' ') {
                phrase.contains(*keyword)
            } else {
                tokens.iter().any(|token| token.starts_with(*keyword))
            }
        })
        .count()
}

fn tokenize(message: &str) -> Vec<String> {
    message
        .to_ascii_lowercase()
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        Classification, RouteDecision, RouteSource, Specialist, classify_message,
        registered_specialists,
    };
    use crate::profile::AssistantDomain;

    fn decided(specialist: Specialist) -> Classification {
        Classification::Decided(RouteDecision {
            specialist,
            source: RouteSource::Keyword,
        })
    }

    #[test]
    fn medication_requests_go_to_the_prescriber() {
        assert_eq!(
            classify_message(AssistantDomain::Medical, "Can I take ibuprofen with my albuterol?"),
            decided(Specialist::Prescriber)
        );
        assert_eq!(
            classify_message(AssistantDomain::Medical, "Please prescribe me OxyContin"),
            decided(Specialist::Prescriber)
        );
    }

    #[test]
    fn symptom_descriptions_go_to_the_advisor() {
        assert_eq!(
            classify_message(
                AssistantDomain::Medical,
                "I've had a headache and fever for 2 days. What can I take?"
            ),
            decided(Specialist::Advisor)
        );
    }

    #[test]
    fn unmatched_messages_are_ambiguous_across_all_specialists() {
        assert_eq!(
            classify_message(AssistantDomain::Fitness, "hello there"),
            Classification::Ambiguous(registered_specialists(AssistantDomain::Fitness).to_vec())
        );
    }

    #[test]
    fn ties_are_ambiguous_between_leaders() {
        assert_eq!(
            classify_message(AssistantDomain::Fitness, "workout and meal ideas"),
            Classification::Ambiguous(vec![Specialist::WorkoutCoach, Specialist::Nutritionist])
        );
    }

    #[test]
    fn documents_domain_has_a_sole_specialist() {
        assert_eq!(
            classify_message(AssistantDomain::Documents, "who owns the company?"),
            Classification::Decided(RouteDecision {
                specialist: Specialist::DocumentAnalyst,
                source: RouteSource::Sole,
            })
        );
    }

    #[test]
    fn specialist_parse_normalizes_model_spelling() {
        assert_eq!(Specialist::parse("Workout Coach"), Some(Specialist::WorkoutCoach));
        assert_eq!(Specialist::parse("surgeon"), None);
    }
}

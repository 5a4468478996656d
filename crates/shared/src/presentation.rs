use serde::{Deserialize, Serialize};

use crate::llm::StructuredResult;
use crate::pipeline::{ConsultOutcome, TerminalState};

pub const REJECTION_BADGE: &str = "REQUEST BLOCKED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedReply {
    pub badge: String,
    pub body: String,
}

/// Picks a display template from the outcome's shape. Decides nothing.
pub fn render_outcome(outcome: &ConsultOutcome) -> RenderedReply {
    match (&outcome.terminal_state, &outcome.result) {
        (TerminalState::Rejected, _) | (_, None) => RenderedReply {
            badge: REJECTION_BADGE.to_string(),
            body: format!(
                "Reason: {}",
                outcome.rejection_reason.as_deref().unwrap_or_default()
            ),
        },
        (_, Some(result)) => render_result(result),
    }
}

pub fn render_result(result: &StructuredResult) -> RenderedReply {
    match result {
        StructuredResult::Prescription(prescription) => {
            let lines = prescription
                .medications
                .iter()
                .zip(&prescription.instructions)
                .zip(&prescription.quantities)
                .map(|((medication, instruction), quantity)| {
                    format!("- {medication} ({quantity}): {instruction}")
                })
                .collect::<Vec<_>>();
            let refill = if prescription.refill_allowed {
                "Refill allowed."
            } else {
                "No refills."
            };
            reply("PRESCRIPTION ISSUED", format!("{}\n{refill}", lines.join("\n")))
        }
        StructuredResult::Advice(advice) => reply(
            "DOCTOR'S ADVICE",
            format!("{}\n\nFollow-up: {}", advice.advice, advice.follow_up),
        ),
        StructuredResult::WorkoutPlan(plan) => {
            let mut body = plan.title.clone();
            for session in &plan.sessions {
                body.push_str(&format!(
                    "\n\n{} | {}\n- {}",
                    session.day,
                    session.focus,
                    session.exercises.join("\n- ")
                ));
            }
            if !plan.notes.is_empty() {
                body.push_str(&format!("\n\nNotes: {}", plan.notes));
            }
            reply("WORKOUT PLAN", body)
        }
        StructuredResult::MealPlan(plan) => {
            let mut body = format!("Daily calories: {}", plan.daily_calories);
            for meal in &plan.meals {
                body.push_str(&format!("\n\n{}: {}", meal.name, meal.items.join(", ")));
            }
            if !plan.notes.is_empty() {
                body.push_str(&format!("\n\nNotes: {}", plan.notes));
            }
            reply("MEAL PLAN", body)
        }
        StructuredResult::DocumentAnswer(answer) => {
            let body = if answer.sources.is_empty() {
                answer.answer.clone()
            } else {
                format!("{}\n\nSources: {}", answer.answer, answer.sources.join(", "))
            };
            reply("DOCUMENT ANSWER", body)
        }
    }
}

fn reply(badge: &str, body: String) -> RenderedReply {
    RenderedReply {
        badge: badge.to_string(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::render_result;
    use crate::llm::{GeneralAdviceOutput, PrescriptionOutput, StructuredResult};

    #[test]
    fn prescription_rows_follow_the_parallel_lists() {
        let rendered = render_result(&StructuredResult::Prescription(PrescriptionOutput {
            medications: vec!["Ibuprofen".to_string(), "Loratadine".to_string()],
            instructions: vec!["Take with food".to_string(), "Once daily".to_string()],
            quantities: vec!["200mg x 20".to_string(), "10mg x 14".to_string()],
            refill_allowed: false,
        }));

        assert_eq!(rendered.badge, "PRESCRIPTION ISSUED");
        assert_eq!(
            rendered.body,
            "- Ibuprofen (200mg x 20): Take with food\n- Loratadine (10mg x 14): Once daily\nNo refills."
        );
    }

    #[test]
    fn advice_shows_follow_up() {
        let rendered = render_result(&StructuredResult::Advice(GeneralAdviceOutput {
            advice: "Rest and hydrate.".to_string(),
            follow_up: "See a doctor if fever passes 39C.".to_string(),
        }));

        assert_eq!(rendered.badge, "DOCTOR'S ADVICE");
        assert!(rendered.body.ends_with("Follow-up: See a doctor if fever passes 39C."));
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::llm::sanitize_context_payload;

const MAX_PLAUSIBLE_AGE: u32 = 130;
const MAX_LIST_ITEMS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantDomain {
    Medical,
    Fitness,
    Documents,
}

impl AssistantDomain {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medical => "medical",
            Self::Fitness => "fitness",
            Self::Documents => "documents",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "medical" | "doctor" => Some(Self::Medical),
            "fitness" | "coach" => Some(Self::Fitness),
            "documents" | "pdf" => Some(Self::Documents),
            _ => None,
        }
    }
}

/// Caller-supplied attributes for one session. Built once, then shared
/// read-only by every request in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub profile_id: String,
    pub domain: AssistantDomain,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub fitness_level: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub current_medications: Vec<String>,
    #[serde(default)]
    pub equipment: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("profile_id must not be empty")]
    MissingProfileId,
    #[error("age {0} is outside the supported range")]
    ImplausibleAge(u32),
    #[error("{field} has {count} entries; at most {max} are allowed", max = MAX_LIST_ITEMS)]
    TooManyEntries { field: &'static str, count: usize },
}

impl UserProfile {
    pub fn new(profile_id: impl Into<String>, domain: AssistantDomain) -> Self {
        Self {
            profile_id: profile_id.into(),
            domain,
            age: None,
            gender: None,
            fitness_level: None,
            goal: None,
            symptoms: Vec::new(),
            medical_history: Vec::new(),
            allergies: Vec::new(),
            current_medications: Vec::new(),
            equipment: Vec::new(),
            dietary_restrictions: Vec::new(),
        }
    }

    /// Trims every field, drops blank list entries, and rejects profiles the
    /// gates cannot reason about.
    pub fn validate(mut self) -> Result<Self, ProfileError> {
        self.profile_id = self.profile_id.trim().to_string();
        if self.profile_id.is_empty() {
            return Err(ProfileError::MissingProfileId);
        }
        if let Some(age) = self.age
            && age > MAX_PLAUSIBLE_AGE
        {
            return Err(ProfileError::ImplausibleAge(age));
        }

        for text in [&mut self.gender, &mut self.fitness_level, &mut self.goal] {
            *text = text
                .take()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());
        }

        for (field, list) in [
            ("symptoms", &mut self.symptoms),
            ("medical_history", &mut self.medical_history),
            ("allergies", &mut self.allergies),
            ("current_medications", &mut self.current_medications),
            ("equipment", &mut self.equipment),
            ("dietary_restrictions", &mut self.dietary_restrictions),
        ] {
            normalize_list(list);
            if list.len() > MAX_LIST_ITEMS {
                return Err(ProfileError::TooManyEntries {
                    field,
                    count: list.len(),
                });
            }
        }

        Ok(self)
    }

    /// Prompt-ready view of the profile with untrusted text sanitized.
    pub fn context_payload(&self) -> Value {
        sanitize_context_payload(&json!({
            "domain": self.domain.as_str(),
            "age": self.age,
            "gender": self.gender,
            "fitness_level": self.fitness_level,
            "goal": self.goal,
            "symptoms": self.symptoms,
            "medical_history": self.medical_history,
            "allergies": self.allergies,
            "current_medications": self.current_medications,
            "equipment": self.equipment,
            "dietary_restrictions": self.dietary_restrictions,
        }))
    }
}

fn normalize_list(list: &mut Vec<String>) {
    let normalized = list
        .drain(..)
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    *list = normalized;
}

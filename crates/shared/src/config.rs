use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::config_env::{optional_trimmed, parse_choice, parse_positive, string_or};
use crate::guardrails::GateFailurePolicy;
use crate::pipeline::{DEFAULT_KNOWLEDGE_TOP_K, PipelineSettings};
use crate::profile::AssistantDomain;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantConfig {
    pub bind_addr: String,
    pub default_domain: AssistantDomain,
    pub input_gate_on_error: GateFailurePolicy,
    pub max_message_chars: usize,
    pub knowledge_top_k: usize,
    pub knowledge_max_chunk_chars: usize,
    pub max_sessions: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid integer in env var {0}")]
    ParseInt(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl AssistantConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = string_or(&lookup, "CONSULT_API_BIND_ADDR", "127.0.0.1:8080");
        if bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "CONSULT_API_BIND_ADDR '{bind_addr}' is not a socket address"
            )));
        }

        Ok(Self {
            bind_addr,
            default_domain: parse_choice(
                &lookup,
                "CONSULT_DEFAULT_DOMAIN",
                AssistantDomain::Medical,
                AssistantDomain::parse,
            )?,
            input_gate_on_error: parse_choice(
                &lookup,
                "CONSULT_INPUT_GATE_ON_ERROR",
                GateFailurePolicy::Allow,
                GateFailurePolicy::parse,
            )?,
            max_message_chars: parse_positive(&lookup, "CONSULT_MAX_MESSAGE_CHARS", 4000)?,
            knowledge_top_k: parse_positive(
                &lookup,
                "CONSULT_KNOWLEDGE_TOP_K",
                DEFAULT_KNOWLEDGE_TOP_K,
            )?,
            knowledge_max_chunk_chars: parse_positive(
                &lookup,
                "CONSULT_KNOWLEDGE_MAX_CHUNK_CHARS",
                600,
            )?,
            max_sessions: parse_positive(&lookup, "CONSULT_MAX_SESSIONS", 1000)?,
        })
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            input_failure_policy: self.input_gate_on_error,
            knowledge_top_k: self.knowledge_top_k,
        }
    }
}

/// Loads `CONSULT_ENV_FILE` when set, else `./.env` if present. Variables
/// already in the environment win.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    match optional_trimmed(&|key: &str| env::var(key).ok(), "CONSULT_ENV_FILE") {
        Some(path) => dotenvy::from_path(&path)
            .map(|()| Some(PathBuf::from(&path)))
            .map_err(|err| {
                ConfigError::InvalidConfiguration(format!(
                    "CONSULT_ENV_FILE '{path}' could not be loaded: {err}"
                ))
            }),
        None => match dotenvy::dotenv() {
            Ok(path) => Ok(Some(path)),
            Err(err) if err.not_found() => Ok(None),
            Err(err) => Err(ConfigError::InvalidConfiguration(format!(
                ".env could not be loaded: {err}"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{AssistantConfig, ConfigError};
    use crate::guardrails::GateFailurePolicy;
    use crate::profile::AssistantDomain;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AssistantConfig::from_lookup(lookup(&[])).expect("defaults should load");

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.default_domain, AssistantDomain::Medical);
        assert_eq!(config.input_gate_on_error, GateFailurePolicy::Allow);
        assert_eq!(config.max_message_chars, 4000);
        assert_eq!(config.knowledge_top_k, 4);
        assert_eq!(config.knowledge_max_chunk_chars, 600);
        assert_eq!(config.max_sessions, 1000);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AssistantConfig::from_lookup(lookup(&[
            ("CONSULT_DEFAULT_DOMAIN", "coach"),
            ("CONSULT_INPUT_GATE_ON_ERROR", "block"),
            ("CONSULT_KNOWLEDGE_TOP_K", " 2 "),
        ]))
        .expect("overrides should load");

        assert_eq!(config.default_domain, AssistantDomain::Fitness);
        assert_eq!(config.pipeline_settings().input_failure_policy, GateFailurePolicy::Block);
        assert_eq!(config.pipeline_settings().knowledge_top_k, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            AssistantConfig::from_lookup(lookup(&[("CONSULT_MAX_SESSIONS", "many")])),
            Err(ConfigError::ParseInt("CONSULT_MAX_SESSIONS".to_string()))
        );
        assert!(matches!(
            AssistantConfig::from_lookup(lookup(&[("CONSULT_KNOWLEDGE_TOP_K", "0")])),
            Err(ConfigError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            AssistantConfig::from_lookup(lookup(&[("CONSULT_INPUT_GATE_ON_ERROR", "shrug")])),
            Err(ConfigError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            AssistantConfig::from_lookup(lookup(&[("CONSULT_API_BIND_ADDR", "not-an-addr")])),
            Err(ConfigError::InvalidConfiguration(_))
        ));
    }
}

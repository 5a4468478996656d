pub mod config;
mod config_env;
pub mod guardrails;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod presentation;
pub mod profile;
pub mod routing;
pub mod session;

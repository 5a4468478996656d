use std::str::FromStr;

use crate::config::ConfigError;

/// Reads one variable by key. `std::env::var(..).ok()` in production, a map
/// in tests.
pub(crate) trait EnvLookup: Fn(&str) -> Option<String> {}

impl<F> EnvLookup for F where F: Fn(&str) -> Option<String> {}

pub(crate) fn optional_trimmed(lookup: &impl EnvLookup, key: &str) -> Option<String> {
    lookup(key).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

pub(crate) fn string_or(lookup: &impl EnvLookup, key: &str, default: &str) -> String {
    optional_trimmed(lookup, key).unwrap_or_else(|| default.to_string())
}

pub(crate) fn parse_number<T: FromStr>(
    lookup: &impl EnvLookup,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match optional_trimmed(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::ParseInt(key.to_string())),
        None => Ok(default),
    }
}

pub(crate) fn parse_positive(
    lookup: &impl EnvLookup,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value = parse_number(lookup, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(value)
}

pub(crate) fn parse_choice<T>(
    lookup: &impl EnvLookup,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match optional_trimmed(lookup, key) {
        Some(raw) => parse(&raw).ok_or_else(|| {
            ConfigError::InvalidConfiguration(format!("{key} has unsupported value '{raw}'"))
        }),
        None => Ok(default),
    }
}

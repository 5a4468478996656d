use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::case::EvalCaseFixture;
use crate::routing_case::RoutingEvalCaseFixture;

#[derive(Debug, Error)]
pub enum FixtureIoError {
    #[error("failed to read fixtures directory {path}: {source}")]
    ReadDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read fixture file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fixture file {path} is not valid JSON: {source}")]
    ParseJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate case_id {case_id} in {path}")]
    DuplicateCaseId { case_id: String, path: String },
}

pub fn load_cases() -> Result<Vec<EvalCaseFixture>, FixtureIoError> {
    let cases = load_directory::<EvalCaseFixture>(&fixture_root().join("cases"))?;
    reject_duplicates(cases.iter().map(|(path, case)| (path, case.case_id.as_str())))?;
    Ok(cases.into_iter().map(|(_, case)| case).collect())
}

pub fn load_routing_cases() -> Result<Vec<RoutingEvalCaseFixture>, FixtureIoError> {
    let cases = load_directory::<RoutingEvalCaseFixture>(&fixture_root().join("routing_cases"))?;
    reject_duplicates(cases.iter().map(|(path, case)| (path, case.case_id.as_str())))?;
    Ok(cases.into_iter().map(|(_, case)| case).collect())
}

fn load_directory<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(PathBuf, T)>, FixtureIoError> {
    let mut files = list_json_files(dir)?;
    files.sort();

    let mut fixtures = Vec::with_capacity(files.len());
    for file in files {
        let raw = fs::read_to_string(&file).map_err(|source| FixtureIoError::ReadFile {
            path: file.display().to_string(),
            source,
        })?;
        let fixture = serde_json::from_str::<T>(&raw).map_err(|source| FixtureIoError::ParseJson {
            path: file.display().to_string(),
            source,
        })?;
        fixtures.push((file, fixture));
    }

    Ok(fixtures)
}

fn reject_duplicates<'a>(
    entries: impl Iterator<Item = (&'a PathBuf, &'a str)>,
) -> Result<(), FixtureIoError> {
    let mut seen = std::collections::HashSet::new();
    for (path, case_id) in entries {
        if !seen.insert(case_id) {
            return Err(FixtureIoError::DuplicateCaseId {
                case_id: case_id.to_string(),
                path: path.display().to_string(),
            });
        }
    }
    Ok(())
}

fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, FixtureIoError> {
    let entries = fs::read_dir(dir).map_err(|source| FixtureIoError::ReadDir {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FixtureIoError::ReadDir {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }

    Ok(files)
}

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

#[cfg(test)]
mod tests {
    use super::{load_cases, load_routing_cases};

    #[test]
    fn bundled_fixtures_parse() {
        let cases = load_cases().expect("case fixtures should load");
        assert!(cases.iter().any(|case| case.case_id == "input_rejects_oxycontin"));
        assert!(cases.iter().any(|case| case.include_in_live_smoke));

        let routing = load_routing_cases().expect("routing fixtures should load");
        assert!(!routing.is_empty());
    }
}

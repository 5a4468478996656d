use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Mocked,
    Live,
}

impl EvalMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mocked => "mocked",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub mode: EvalMode,
    pub case_filter: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("missing value for argument: {0}")]
    MissingValue(String),
    #[error("invalid --mode value: {0}")]
    InvalidMode(String),
    #[error("help requested")]
    HelpRequested,
}

impl CliOptions {
    pub fn parse<I>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut mode = EvalMode::Mocked;
        let mut case_filter = None;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--mode" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    mode = parse_mode(&value)?;
                }
                "--case" => {
                    let value = iter.next().ok_or(CliError::MissingValue(arg.clone()))?;
                    case_filter = Some(value.trim().to_string());
                }
                unknown => return Err(CliError::UnknownArgument(unknown.to_string())),
            }
        }

        Ok(Self { mode, case_filter })
    }
}

fn parse_mode(value: &str) -> Result<EvalMode, CliError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "mocked" => Ok(EvalMode::Mocked),
        "live" => Ok(EvalMode::Live),
        _ => Err(CliError::InvalidMode(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{CliError, CliOptions, EvalMode};

    fn parse(args: &[&str]) -> Result<CliOptions, CliError> {
        CliOptions::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_to_mocked_mode_for_every_case() {
        assert_eq!(
            parse(&[]),
            Ok(CliOptions {
                mode: EvalMode::Mocked,
                case_filter: None,
            })
        );
    }

    #[test]
    fn parses_mode_and_case_filter() {
        assert_eq!(
            parse(&["--mode", "LIVE", "--case", "input_rejects_oxycontin"]),
            Ok(CliOptions {
                mode: EvalMode::Live,
                case_filter: Some("input_rejects_oxycontin".to_string()),
            })
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            parse(&["--mode", "replay"]),
            Err(CliError::InvalidMode("replay".to_string()))
        );
        assert_eq!(parse(&["--case"]), Err(CliError::MissingValue("--case".to_string())));
        assert_eq!(
            parse(&["--update-goldens"]),
            Err(CliError::UnknownArgument("--update-goldens".to_string()))
        );
    }
}

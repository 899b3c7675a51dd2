use std::path::PathBuf;
use thiserror::Error;

/// Rule set could not be loaded or is malformed. Fatal to the run.
#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("failed to read rules file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write rules file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse rules JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse rules TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize rules TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },
}

/// A single condition could not be evaluated against a single email. The
/// condition counts as not matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("cannot parse date '{value}': {reason}")]
    Parse { value: String, reason: String },
    #[error("expected an integer day count, got '{0}'")]
    Value(String),
    #[error("predicate '{predicate}' is not valid for field '{field}'")]
    InvalidPairing {
        field: &'static str,
        predicate: &'static str,
    },
}

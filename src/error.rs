//! Error types
//!
//! Only mapping loading can fail hard. Strategy failures are recovered inside
//! the resolver and reported through diagnostics.

use std::path::PathBuf;

/// Failure to obtain or validate a portal mapping.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("no mapping named '{0}'")]
    NotFound(String),
    #[error("failed to read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse mapping: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid scriptRegEx in field '{field}': {source}")]
    InvalidRegex {
        field: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid mapping: {0}")]
    Invalid(String),
}

/// Failure inside a single extraction strategy.
///
/// Never escapes the resolver; a failed strategy counts as "no value".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("malformed JSON in {context}: {reason}")]
    MalformedJson { context: String, reason: String },
    #[error("invalid source URL '{0}'")]
    InvalidUrl(String),
}

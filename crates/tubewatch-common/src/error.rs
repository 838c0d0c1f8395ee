//! Error types shared across Tubewatch crates

use thiserror::Error;

/// Result type alias for Tubewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Base error type for Tubewatch
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Configuration error naming the offending environment variable
    pub fn invalid_env(key: &str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::Config(format!("{key}={value:?} is invalid: {reason}"))
    }

    /// Configuration error for a variable that must be present
    pub fn missing_env(key: &str) -> Self {
        Self::Config(format!("{key} must be set"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_env_message() {
        let err = Error::invalid_env("YOUTUBE_PAGE_SIZE", "abc", "not a number");
        assert_eq!(
            err.to_string(),
            "Configuration error: YOUTUBE_PAGE_SIZE=\"abc\" is invalid: not a number"
        );
    }

    #[test]
    fn test_serialization_from() {
        let parse_err = serde_json::from_str::<Vec<u8>>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}

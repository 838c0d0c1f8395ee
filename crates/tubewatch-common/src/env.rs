//! Typed access to environment variables
//!
//! Configuration in Tubewatch is plain `KEY=value` pairs, optionally loaded
//! from a `.env` file. These helpers keep the defaults next to the call site
//! and turn malformed values into [`Error::Config`] instead of silently
//! falling back.

use std::str::FromStr;

use crate::error::{Error, Result};

/// Read `key`, returning `None` when it is unset or blank.
pub fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read `key` or fall back to `default`.
pub fn string_or(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

/// Read a required variable.
pub fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| Error::missing_env(key))
}

/// Parse `key` into `T`, or return `default` when unset.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::invalid_env(key, &raw, e)),
        None => Ok(default),
    }
}

/// Split a comma-separated variable into trimmed, non-empty entries.
pub fn list(key: &str) -> Vec<String> {
    optional(key)
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

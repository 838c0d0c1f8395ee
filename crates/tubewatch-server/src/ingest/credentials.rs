//! API key rotation
//!
//! The pool is fixed at startup. The active index starts at 0 on every
//! process start and only moves forward when the active key reports quota
//! exhaustion.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What to do once every key in the pool has been exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Report exhaustion; the process is expected to stop.
    #[default]
    FailFast,
    /// Start over from the first key.
    WrapAround,
}

impl std::str::FromStr for ExhaustionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(Self::FailFast),
            "wrap_around" => Ok(Self::WrapAround),
            other => Err(format!(
                "unknown key exhaustion policy {other:?} (expected fail_fast or wrap_around)"
            )),
        }
    }
}

impl std::fmt::Display for ExhaustionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailFast => f.write_str("fail_fast"),
            Self::WrapAround => f.write_str("wrap_around"),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CredentialError {
    #[error("At least one API key is required")]
    EmptyPool,
    #[error("API key at index {0} is blank")]
    BlankKey(usize),
}

/// The key to use for the next request.
#[derive(Clone, PartialEq, Eq)]
pub struct ActiveCredential {
    pub index: usize,
    pub key: String,
}

impl std::fmt::Debug for ActiveCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveCredential")
            .field("index", &self.index)
            .field("key", &redact(&self.key))
            .finish()
    }
}

/// Result of reporting an exhausted key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// Try again with the key at `index`.
    Retry { index: usize },
    /// No usable key is left.
    Exhausted,
}

pub struct CredentialRotator {
    keys: Vec<String>,
    active: Mutex<usize>,
    policy: ExhaustionPolicy,
}

impl CredentialRotator {
    pub fn new(keys: Vec<String>, policy: ExhaustionPolicy) -> Result<Self, CredentialError> {
        if keys.is_empty() {
            return Err(CredentialError::EmptyPool);
        }
        if let Some(index) = keys.iter().position(|k| k.trim().is_empty()) {
            return Err(CredentialError::BlankKey(index));
        }

        Ok(Self {
            keys,
            active: Mutex::new(0),
            policy,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn policy(&self) -> ExhaustionPolicy {
        self.policy
    }

    pub fn active(&self) -> ActiveCredential {
        let index = *self.active.lock().unwrap_or_else(PoisonError::into_inner);
        ActiveCredential {
            index,
            key: self.keys[index].clone(),
        }
    }

    /// Report that the key at `failing` hit its quota.
    ///
    /// A stale report (someone already rotated away from `failing`) is a
    /// no-op that returns `Retry` with the current key.
    pub fn advance(&self, failing: usize) -> Rotation {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        if *active != failing {
            return Rotation::Retry { index: *active };
        }

        let next = failing + 1;
        if next < self.keys.len() {
            *active = next;
            tracing::warn!(from = failing, to = next, "API key quota exhausted, rotating");
            return Rotation::Retry { index: next };
        }

        match self.policy {
            ExhaustionPolicy::FailFast => {
                tracing::error!(pool_size = self.keys.len(), "All API keys exhausted");
                Rotation::Exhausted
            },
            ExhaustionPolicy::WrapAround => {
                *active = 0;
                tracing::warn!(from = failing, "All API keys exhausted, wrapping to first key");
                Rotation::Retry { index: 0 }
            },
        }
    }
}

impl std::fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.keys.iter().map(|k| redact(k)).collect();
        f.debug_struct("CredentialRotator")
            .field("keys", &keys)
            .field("active", &self.active().index)
            .field("policy", &self.policy)
            .finish()
    }
}

fn redact(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

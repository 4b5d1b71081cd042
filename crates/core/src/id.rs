//! Job identifiers.

use core::str::FromStr;
use std::borrow::Borrow;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Longest identifier accepted from callers.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Identifier of a tracked job.
///
/// Ids are opaque strings so that collaborators may supply their own
/// (e.g. `job_1`). Generated ids are `job_` followed by a UUIDv7 and are
/// therefore time-ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(format!("job_{}", Uuid::now_v7().simple()))
    }

    /// Parse a caller-supplied identifier.
    ///
    /// Accepts 1..=128 characters from `[A-Za-z0-9_.:-]`.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::invalid_id("job id must not be empty"));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(DomainError::invalid_id(format!(
                "job id longer than {MAX_JOB_ID_LEN} characters"
            )));
        }
        if let Some(c) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
        {
            return Err(DomainError::invalid_id(format!(
                "job id contains illegal character {c:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

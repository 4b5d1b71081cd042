//! Job record model: status lifecycle and the durable record shape.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;
use crate::id::JobId;

/// Parameter key carrying the external worker's own identifier.
pub const REMOTE_JOB_ID_KEY: &str = "remoteJobId";

/// Job lifecycle status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, not yet picked up by the external worker
    Pending,
    /// External worker reported progress
    Running,
    /// Finished with output
    Completed,
    /// Finished with an error
    Failed,
    /// Marked cancelled locally
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses for which `completedAt` must be present.
    pub fn records_completion(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Allowed-transition table.
    ///
    /// Re-delivering the current status is always allowed so that retried
    /// callbacks stay idempotent. Terminal statuses accept nothing else.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            JobStatus::Pending => true,
            JobStatus::Running => next != JobStatus::Pending,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(vec![crate::FieldViolation::new(
                    "status",
                    format!("unknown status '{s}'"),
                )])
            })
    }
}

/// How status changes coming from outside are checked.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Enforce [`JobStatus::can_transition_to`].
    #[default]
    Strict,
    /// Overwrite status unconditionally.
    Permissive,
}

impl TransitionPolicy {
    pub fn allows(self, from: JobStatus, to: JobStatus) -> bool {
        match self {
            TransitionPolicy::Strict => from.can_transition_to(to),
            TransitionPolicy::Permissive => true,
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "permissive" => Ok(TransitionPolicy::Permissive),
            other => Err(format!(
                "unknown transition policy '{other}' (expected strict or permissive)"
            )),
        }
    }
}

/// Validated creation request supplied by the submitting collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    /// Caller-chosen id; generated when absent.
    pub id: Option<JobId>,
    pub job_type: String,
    pub name: String,
    pub project: Option<String>,
    pub parameters: Map<String, Value>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            job_type: job_type.into(),
            name: name.into(),
            project: None,
            parameters: Map::new(),
        }
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Durable record of one unit of delegated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub name: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds, reported by the external worker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Job {
    /// Build a fresh `pending` record.
    pub fn new(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: new.id.unwrap_or_else(JobId::generate),
            job_type: new.job_type,
            name: new.name,
            status: JobStatus::Pending,
            project: new.project,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration: None,
            progress: 0.0,
            result: None,
            error: None,
            parameters: new.parameters,
        }
    }

    /// External worker correlation id, if the collaborator recorded one.
    ///
    /// Strings are returned as-is; numbers are rendered. `null` counts as absent.
    pub fn remote_job_id(&self) -> Option<String> {
        match self.parameters.get(REMOTE_JOB_ID_KEY)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

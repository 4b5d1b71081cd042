//! Inbound status update ("callback") from the external worker.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::job::JobStatus;

/// A validated, sparse status update.
///
/// `None` always means "absent from the payload, leave the stored field
/// alone". Explicit `null` is only meaningful for the clearable fields:
/// `result` (carried as `Some(Value::Null)`) and `error` (`Some(None)`).
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackUpdate {
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub result: Option<Value>,
    pub error: Option<Option<String>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration: Option<f64>,
}

impl CallbackUpdate {
    /// An update that only sets the status.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            result: None,
            error: None,
            completed_at: None,
            duration: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }
}

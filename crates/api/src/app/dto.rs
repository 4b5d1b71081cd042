use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobtrack_core::{FieldViolation, Job, JobStatus, TransitionPolicy};
use jobtrack_infra::jobs::{JobFilter, JobSummary};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub project: Option<String>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> Result<JobFilter, Vec<FieldViolation>> {
        let status = match self.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<JobStatus>().map_err(|_| {
                vec![FieldViolation::new(
                    "status",
                    "must be one of pending, running, completed, failed, cancelled",
                )]
            })?),
        };
        Ok(JobFilter {
            status,
            project: self.project.filter(|p| !p.is_empty()),
        })
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct CallbackAck {
    pub success: bool,
    pub job: Job,
}

#[derive(Debug, Serialize)]
pub struct GenericCallbackAck {
    pub received: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub uptime_secs: u64,
    pub store: &'static str,
    pub transition_policy: TransitionPolicy,
}

/// Body of `GET /debug/jobs`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub timestamp: DateTime<Utc>,
    pub process: ProcessInfo,
    #[serde(flatten)]
    pub summary: JobSummary,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

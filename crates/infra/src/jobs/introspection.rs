//! Read-only operational view over the job store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use jobtrack_core::{Job, JobId, JobStatus, NewJob};

use super::store::{JobStore, JobStoreError};

/// Job type used for synthetic self-test records.
pub const SELF_TEST_JOB_TYPE: &str = "self_test";

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobStats {
    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// Per-job line of the summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDigest {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub has_remote_job_id: bool,
    pub remote_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobDigest {
    fn from(job: &Job) -> Self {
        let remote_job_id = job.remote_job_id();
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            status: job.status,
            has_remote_job_id: remote_job_id.is_some(),
            remote_job_id,
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub total_jobs: usize,
    /// Jobs correlated with an external worker id.
    pub external_jobs: usize,
    pub stats: JobStats,
    pub jobs: Vec<JobDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfTestReport {
    pub job_id: JobId,
    pub created: bool,
    pub retrieved: bool,
    pub total_after: usize,
}

/// Aggregations used by the debug endpoints.
pub struct Introspector<S> {
    store: S,
}

impl<S: JobStore> Introspector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Snapshot of every record, oldest first.
    pub fn summarize(&self) -> Result<JobSummary, JobStoreError> {
        let mut jobs = self.store.get_all()?;
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let mut stats = JobStats::default();
        let digests: Vec<JobDigest> = jobs
            .iter()
            .inspect(|j| stats.record(j.status))
            .map(JobDigest::from)
            .collect();

        Ok(JobSummary {
            total_jobs: digests.len(),
            external_jobs: digests.iter().filter(|d| d.has_remote_job_id).count(),
            stats,
            jobs: digests,
        })
    }

    /// Write a throwaway record and read it straight back.
    ///
    /// The record stays in the store (typed `self_test`).
    pub fn self_test(&self) -> Result<SelfTestReport, JobStoreError> {
        let job = Job::new(
            NewJob::new(SELF_TEST_JOB_TYPE, "store self-test")
                .with_parameter("selfTest", json!(true)),
            Utc::now(),
        );
        let job_id = job.id.clone();

        let created = match self.store.set(job.clone()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "self-test write failed");
                false
            }
        };
        let retrieved = created && self.store.get(&job_id)?.as_ref() == Some(&job);

        Ok(SelfTestReport {
            job_id,
            created,
            retrieved,
            total_after: self.store.len()?,
        })
    }
}

//! Job lifecycle facade: creation, queries, callbacks, cancellation, deletion.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use jobtrack_core::{CallbackUpdate, Job, JobId, JobStatus, NewJob, TransitionPolicy};

use super::callback::{CallbackError, CallbackProcessor};
use super::introspection::{Introspector, JobStats, JobSummary, SelfTestReport};
use super::locks::KeyedLocks;
use super::store::{JobStore, JobStoreError};

/// Filters for [`JobTracker::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub project: Option<String>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self
                .project
                .as_deref()
                .is_none_or(|p| job.project.as_deref() == Some(p))
    }
}

/// Owns the store and wires the callback processor and introspection to it.
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    locks: Arc<KeyedLocks>,
    callbacks: CallbackProcessor<Arc<dyn JobStore>>,
    introspector: Introspector<Arc<dyn JobStore>>,
    /// Ids deleted during this process lifetime; never handed out again.
    retired: Mutex<HashSet<JobId>>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>, policy: TransitionPolicy) -> Self {
        let locks = Arc::new(KeyedLocks::new());
        Self {
            callbacks: CallbackProcessor::new(store.clone(), locks.clone(), policy),
            introspector: Introspector::new(store.clone()),
            store,
            locks,
            retired: Mutex::new(HashSet::new()),
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.callbacks.policy()
    }

    /// Register a new `pending` job.
    pub fn create(&self, new: NewJob) -> Result<Job, JobStoreError> {
        let job = Job::new(new, Utc::now());
        let id = job.id.clone();

        self.locks.with_lock(&id, || -> Result<Job, JobStoreError> {
            if self.is_retired(&id) || self.store.get(&id)?.is_some() {
                return Err(JobStoreError::AlreadyExists(id.clone()));
            }
            self.store.set(job.clone())?;
            info!(job_id = %id, job_type = %job.job_type, "job created");
            Ok(job)
        })
    }

    pub fn get(&self, id: &JobId) -> Result<Option<Job>, JobStoreError> {
        self.store.get(id)
    }

    /// Matching jobs, oldest first.
    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobStoreError> {
        let mut jobs: Vec<Job> = self
            .store
            .get_all()?
            .into_iter()
            .filter(|j| filter.matches(j))
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    pub fn stats(&self) -> Result<JobStats, JobStoreError> {
        Ok(self.introspector.summarize()?.stats)
    }

    /// Validate and apply a raw callback body.
    pub fn handle_callback(&self, id: &JobId, body: &Value) -> Result<Job, CallbackError> {
        self.callbacks.process(id, body)
    }

    pub fn apply_update(&self, id: &JobId, update: &CallbackUpdate) -> Result<Job, CallbackError> {
        self.callbacks.apply(id, update)
    }

    pub fn cancel(&self, id: &JobId) -> Result<Job, CallbackError> {
        self.callbacks.cancel(id)
    }

    /// Delete a job. The id is retired for the rest of the process lifetime.
    pub fn delete(&self, id: &JobId) -> Result<bool, JobStoreError> {
        self.locks.with_lock(id, || -> Result<bool, JobStoreError> {
            let existed = self.store.delete(id)?;
            if existed {
                self.retired_ids().insert(id.clone());
                info!(job_id = %id, "job deleted");
            }
            Ok(existed)
        })
    }

    /// Remove every job (administrative). Cleared ids are retired too.
    ///
    /// Waits for in-flight creates, callbacks, cancels and deletes, and holds
    /// new ones off until the store is empty.
    pub fn clear(&self) -> Result<usize, JobStoreError> {
        self.locks.with_all_locked(|| -> Result<usize, JobStoreError> {
            let ids: Vec<JobId> = self.store.get_all()?.into_iter().map(|j| j.id).collect();
            self.store.clear()?;
            let count = ids.len();
            self.retired_ids().extend(ids);
            info!(count, "job store cleared");
            Ok(count)
        })
    }

    pub fn summarize(&self) -> Result<JobSummary, JobStoreError> {
        self.introspector.summarize()
    }

    pub fn self_test(&self) -> Result<SelfTestReport, JobStoreError> {
        self.introspector.self_test()
    }

    fn is_retired(&self, id: &JobId) -> bool {
        self.retired_ids().contains(id)
    }

    fn retired_ids(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.retired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jobtrack_core::{Job, JobId};

/// Keyed storage of job records.
///
/// Implementations are authoritative for the current process: a successful
/// `set` must be visible to the next `get` on any thread. Ordering of
/// `get_all` is unspecified.
pub trait JobStore: Send + Sync {
    /// Get a job by ID.
    fn get(&self, id: &JobId) -> Result<Option<Job>, JobStoreError>;

    /// Insert or fully replace the record keyed by `job.id`. Not a merge.
    fn set(&self, job: Job) -> Result<(), JobStoreError>;

    /// Remove a record. Returns whether it existed.
    fn delete(&self, id: &JobId) -> Result<bool, JobStoreError>;

    /// All records, in no particular order.
    fn get_all(&self) -> Result<Vec<Job>, JobStoreError>;

    /// Remove every record (administrative/test use).
    fn clear(&self) -> Result<(), JobStoreError>;

    /// Number of records.
    fn len(&self) -> Result<usize, JobStoreError> {
        Ok(self.get_all()?.len())
    }
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Storage("job map lock poisoned".to_string())
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn get(&self, id: &JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(id)
    }

    fn set(&self, job: Job) -> Result<(), JobStoreError> {
        (**self).set(job)
    }

    fn delete(&self, id: &JobId) -> Result<bool, JobStoreError> {
        (**self).delete(id)
    }

    fn get_all(&self) -> Result<Vec<Job>, JobStoreError> {
        (**self).get_all()
    }

    fn clear(&self) -> Result<(), JobStoreError> {
        (**self).clear()
    }

    fn len(&self) -> Result<usize, JobStoreError> {
        (**self).len()
    }
}

/// In-memory job store for tests/dev, and the authoritative map behind
/// [`PersistentJobStore`](super::persistent::PersistentJobStore).
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Build a store pre-populated with `jobs` (later duplicates win).
    pub fn from_jobs(jobs: impl IntoIterator<Item = Job>) -> Self {
        let map = jobs.into_iter().map(|j| (j.id.clone(), j)).collect();
        Self {
            jobs: RwLock::new(map),
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn get(&self, id: &JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::poisoned())?;
        Ok(jobs.get(id).cloned())
    }

    fn set(&self, job: Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::poisoned())?;
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn delete(&self, id: &JobId) -> Result<bool, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::poisoned())?;
        Ok(jobs.remove(id).is_some())
    }

    fn get_all(&self) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::poisoned())?;
        Ok(jobs.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| JobStoreError::poisoned())?;
        jobs.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| JobStoreError::poisoned())?;
        Ok(jobs.len())
    }
}

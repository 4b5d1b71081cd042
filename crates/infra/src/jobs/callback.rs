//! Applies external status updates to stored job records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use jobtrack_core::{
    CallbackUpdate, FieldViolation, Job, JobId, JobStatus, TransitionPolicy, validate_callback,
};

use super::locks::KeyedLocks;
use super::store::{JobStore, JobStoreError};

/// Callback processing error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallbackError {
    #[error("invalid callback payload")]
    Validation(Vec<FieldViolation>),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<JobStoreError> for CallbackError {
    fn from(e: JobStoreError) -> Self {
        CallbackError::Internal(e.to_string())
    }
}

/// Validates callbacks and merges them into stored records.
///
/// Every read-merge-write runs under the per-id lock, so two callbacks for the
/// same job apply one after the other and never interleave fields.
pub struct CallbackProcessor<S> {
    store: S,
    locks: Arc<KeyedLocks>,
    policy: TransitionPolicy,
}

impl<S: JobStore> CallbackProcessor<S> {
    pub fn new(store: S, locks: Arc<KeyedLocks>, policy: TransitionPolicy) -> Self {
        Self {
            store,
            locks,
            policy,
        }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Validate a raw callback body and apply it.
    pub fn process(&self, id: &JobId, body: &Value) -> Result<Job, CallbackError> {
        let update = validate_callback(body).map_err(CallbackError::Validation)?;
        self.apply(id, &update)
    }

    /// Apply an already-validated update.
    pub fn apply(&self, id: &JobId, update: &CallbackUpdate) -> Result<Job, CallbackError> {
        self.locks.with_lock(id, || -> Result<Job, CallbackError> {
            let mut job = self
                .store
                .get(id)?
                .ok_or_else(|| CallbackError::NotFound(id.clone()))?;

            let from = job.status;
            self.check_transition(id, from, update.status)?;

            apply_sparse_patch(&mut job, update, Utc::now());
            self.store.set(job.clone())?;

            debug!(job_id = %id, from = %from, to = %job.status, progress = job.progress, "callback applied");
            Ok(job)
        })
    }

    /// Mark a job cancelled. Local bookkeeping only.
    pub fn cancel(&self, id: &JobId) -> Result<Job, CallbackError> {
        self.locks.with_lock(id, || -> Result<Job, CallbackError> {
            let mut job = self
                .store
                .get(id)?
                .ok_or_else(|| CallbackError::NotFound(id.clone()))?;

            if job.status == JobStatus::Cancelled {
                return Ok(job);
            }
            let from = job.status;
            self.check_transition(id, from, JobStatus::Cancelled)?;

            job.status = JobStatus::Cancelled;
            job.completed_at = None;
            self.store.set(job.clone())?;

            // The external worker has no cancellation protocol; it keeps running.
            warn!(job_id = %id, from = %from, "job marked cancelled locally; external worker not notified");
            Ok(job)
        })
    }

    fn check_transition(&self, id: &JobId, from: JobStatus, to: JobStatus) -> Result<(), CallbackError> {
        if self.policy.allows(from, to) {
            if !from.can_transition_to(to) {
                warn!(job_id = %id, from = %from, to = %to, "status regression accepted (permissive policy)");
            }
            return Ok(());
        }
        info!(job_id = %id, from = %from, to = %to, "rejected illegal status transition");
        Err(CallbackError::InvalidTransition { from, to })
    }
}

/// Merge `update` into `job`. Fields absent from the update are left as they are.
///
/// - `status` is always overwritten.
/// - `progress`, `result`, `error`, `duration` only when present; an explicit
///   `null` result or error clears the field.
/// - `completedAt` is taken verbatim when supplied, otherwise stamped with
///   `now` the first time the job becomes completed or failed. Any other
///   resulting status drops it, supplied or stored.
/// - `startedAt` is stamped with `now` the first time the job becomes running.
pub fn apply_sparse_patch(job: &mut Job, update: &CallbackUpdate, now: DateTime<Utc>) {
    job.status = update.status;

    if let Some(progress) = update.progress {
        job.progress = progress;
    }
    if let Some(result) = &update.result {
        job.result = (!result.is_null()).then(|| result.clone());
    }
    if let Some(error) = &update.error {
        job.error = error.clone();
    }
    if let Some(duration) = update.duration {
        job.duration = Some(duration);
    }

    if job.status.records_completion() {
        match update.completed_at {
            Some(at) => job.completed_at = Some(at),
            None if job.completed_at.is_none() => job.completed_at = Some(now),
            None => {}
        }
    } else {
        // Only completed and failed records carry a completion time.
        job.completed_at = None;
    }

    if job.status == JobStatus::Running && job.started_at.is_none() {
        job.started_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use chrono::Duration;
    use jobtrack_core::NewJob;
    use proptest::prelude::*;
    use serde_json::json;
    use std::thread;

    fn id(s: &str) -> JobId {
        JobId::parse(s).unwrap()
    }

    fn processor(policy: TransitionPolicy) -> CallbackProcessor<Arc<InMemoryJobStore>> {
        CallbackProcessor::new(InMemoryJobStore::arc(), Arc::new(KeyedLocks::new()), policy)
    }

    fn seed(p: &CallbackProcessor<Arc<InMemoryJobStore>>, raw_id: &str) -> Job {
        let job = Job::new(NewJob::new("ocr", "scan.pdf").with_id(id(raw_id)), Utc::now());
        p.store.set(job.clone()).unwrap();
        job
    }

    #[test]
    fn end_to_end_pending_running_completed() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");

        let running = p
            .process(&id("job_1"), &json!({"status": "running", "progress": 40}))
            .unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.progress, 40.0);
        assert!(running.completed_at.is_none());
        assert!(running.started_at.is_some());

        let before = Utc::now();
        let done = p
            .process(&id("job_1"), &json!({"status": "completed", "result": {"pages": 12}}))
            .unwrap();
        let after = Utc::now();

        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 40.0);
        assert_eq!(done.result, Some(json!({"pages": 12})));
        let completed_at = done.completed_at.unwrap();
        assert!(completed_at >= before && completed_at <= after);
        assert_eq!(done.started_at, running.started_at);

        assert_eq!(p.store.get(&id("job_1")).unwrap(), Some(done));
    }

    #[test]
    fn out_of_range_progress_leaves_record_untouched() {
        let p = processor(TransitionPolicy::Strict);
        let original = seed(&p, "job_1");

        let err = p
            .process(&id("job_1"), &json!({"status": "running", "progress": 150}))
            .unwrap_err();

        match err {
            CallbackError::Validation(v) => assert_eq!(v[0].field, "progress"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(p.store.get(&id("job_1")).unwrap(), Some(original));
    }

    #[test]
    fn unknown_job_is_not_created() {
        let p = processor(TransitionPolicy::Strict);

        let err = p.process(&id("ghost"), &json!({"status": "running"})).unwrap_err();

        assert!(matches!(err, CallbackError::NotFound(ref missing) if missing.as_str() == "ghost"));
        assert_eq!(p.store.len().unwrap(), 0);
    }

    #[test]
    fn supplied_completed_at_is_used_verbatim() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");

        let job = p
            .process(
                &id("job_1"),
                &json!({"status": "failed", "error": "boom", "completedAt": "2024-01-02T03:04:05Z", "duration": 12.5}),
            )
            .unwrap();

        assert_eq!(job.completed_at.unwrap().to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert_eq!(job.error.as_deref(), Some("boom"));
        assert_eq!(job.duration, Some(12.5));
    }

    #[test]
    fn existing_completed_at_is_kept_on_redelivery() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");

        let first = p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Completed)).unwrap();
        let again = p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Completed)).unwrap();

        assert_eq!(first.completed_at, again.completed_at);
    }

    #[test]
    fn strict_policy_rejects_regression() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");
        let done = p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Completed)).unwrap();

        let err = p
            .apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Running).with_progress(10.0))
            .unwrap_err();

        assert!(matches!(
            err,
            CallbackError::InvalidTransition { from: JobStatus::Completed, to: JobStatus::Running }
        ));
        assert_eq!(p.store.get(&id("job_1")).unwrap(), Some(done));
    }

    #[test]
    fn permissive_policy_overwrites_status() {
        let p = processor(TransitionPolicy::Permissive);
        seed(&p, "job_1");
        p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Completed)).unwrap();

        let job = p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Running)).unwrap();

        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());

        p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Failed)).unwrap();
        let cancelled = p.cancel(&id("job_1")).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_none());
    }

    #[test]
    fn completed_at_is_dropped_for_non_terminal_outcomes() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");
        seed(&p, "job_2");

        let running = p
            .process(&id("job_1"), &json!({"status": "running", "completedAt": "2024-01-01T00:00:00Z"}))
            .unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(running.completed_at.is_none());

        let cancelled = p
            .process(&id("job_2"), &json!({"status": "cancelled", "completedAt": "2024-01-01T00:00:00Z"}))
            .unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_none());
        assert_eq!(p.store.get(&id("job_2")).unwrap(), Some(cancelled));
    }

    #[test]
    fn cancel_is_idempotent_and_never_sets_completed_at() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");

        let cancelled = p.cancel(&id("job_1")).unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);
        assert!(cancelled.completed_at.is_none());
        assert_eq!(p.cancel(&id("job_1")).unwrap(), cancelled);

        assert!(matches!(p.cancel(&id("nope")), Err(CallbackError::NotFound(_))));
    }

    #[test]
    fn cancel_after_completion_is_rejected_when_strict() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");
        p.apply(&id("job_1"), &CallbackUpdate::status(JobStatus::Completed)).unwrap();

        assert!(matches!(
            p.cancel(&id("job_1")),
            Err(CallbackError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn explicit_null_clears_result_and_error() {
        let p = processor(TransitionPolicy::Strict);
        seed(&p, "job_1");
        p.process(&id("job_1"), &json!({"status": "running", "result": {"partial": true}, "error": "retrying"}))
            .unwrap();

        let job = p
            .process(&id("job_1"), &json!({"status": "running", "result": null, "error": null}))
            .unwrap();

        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn concurrent_callbacks_for_distinct_ids_do_not_interfere() {
        let p = Arc::new(processor(TransitionPolicy::Strict));
        for i in 0..16 {
            seed(&p, &format!("job_{i}"));
        }

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let p = p.clone();
                thread::spawn(move || {
                    let jid = id(&format!("job_{i}"));
                    for step in 0..=10 {
                        let update = CallbackUpdate::status(JobStatus::Running)
                            .with_progress(f64::from(step * 10))
                            .with_result(json!({"owner": i, "step": step}));
                        p.apply(&jid, &update).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..16 {
            let job = p.store.get(&id(&format!("job_{i}"))).unwrap().unwrap();
            assert_eq!(job.progress, 100.0);
            assert_eq!(job.result, Some(json!({"owner": i, "step": 10})));
        }
    }

    #[test]
    fn concurrent_callbacks_for_same_id_never_tear() {
        let p = Arc::new(processor(TransitionPolicy::Strict));
        seed(&p, "job_1");

        let handles: Vec<_> = (0..8u32)
            .map(|writer| {
                let p = p.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        // Each writer's progress, result and error all carry its own tag.
                        let update = CallbackUpdate::status(JobStatus::Running)
                            .with_progress(f64::from(writer))
                            .with_result(json!({"writer": writer}))
                            .with_error(format!("writer-{writer}"));
                        p.apply(&id("job_1"), &update).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let job = p.store.get(&id("job_1")).unwrap().unwrap();
        let writer = job.progress as u32;
        assert_eq!(job.result, Some(json!({"writer": writer})));
        assert_eq!(job.error, Some(format!("writer-{writer}")));
    }

    fn status_strategy() -> impl Strategy<Value = JobStatus> {
        prop::sample::select(JobStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: fields absent from the update keep their stored values.
        #[test]
        fn absent_fields_are_never_reset(
            stored_progress in 0.0f64..=100.0,
            status in status_strategy(),
            new_progress in prop::option::of(0.0f64..=100.0),
            with_result in any::<bool>(),
            with_error in any::<bool>(),
        ) {
            let now = Utc::now();
            let mut job = Job::new(NewJob::new("ocr", "a"), now - Duration::minutes(5));
            job.progress = stored_progress;
            job.result = Some(json!({"old": true}));
            job.error = Some("old".to_string());
            job.duration = Some(7.0);
            let before = job.clone();

            let mut update = CallbackUpdate::status(status);
            update.progress = new_progress;
            if with_result {
                update = update.with_result(json!({"new": true}));
            }
            if with_error {
                update = update.with_error("new");
            }

            apply_sparse_patch(&mut job, &update, now);

            prop_assert_eq!(job.status, status);
            prop_assert_eq!(job.progress, new_progress.unwrap_or(before.progress));
            prop_assert_eq!(job.duration, before.duration);
            prop_assert_eq!(job.created_at, before.created_at);
            if !with_result {
                prop_assert_eq!(&job.result, &before.result);
            }
            if !with_error {
                prop_assert_eq!(&job.error, &before.error);
            }
            prop_assert_eq!(job.completed_at.is_some(), status.records_completion());
        }
    }
}

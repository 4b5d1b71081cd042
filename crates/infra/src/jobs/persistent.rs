//! Snapshot-backed job store with a coalescing write-behind flusher.
//!
//! The in-memory map is authoritative; mutations return as soon as the map is
//! updated. Each mutation marks the snapshot dirty and a background thread
//! writes the full record set at most once per flush interval. Write failures
//! are logged and never reach callers.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use jobtrack_core::{Job, JobId};
use tracing::{debug, error, info, warn};

use super::snapshot::{SnapshotError, SnapshotSink};
use super::store::{InMemoryJobStore, JobStore, JobStoreError};

/// Default coalescing window for snapshot writes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

enum FlushSignal {
    Dirty,
    Flush(mpsc::Sender<Result<(), SnapshotError>>),
    Shutdown,
}

/// Job store persisted through a [`SnapshotSink`].
pub struct PersistentJobStore {
    memory: Arc<InMemoryJobStore>,
    signal: mpsc::Sender<FlushSignal>,
    flusher: Mutex<Option<thread::JoinHandle<()>>>,
    sink_name: String,
}

impl std::fmt::Debug for PersistentJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentJobStore")
            .field("sink", &self.sink_name)
            .finish_non_exhaustive()
    }
}

impl PersistentJobStore {
    /// Rehydrate from `sink` and start the flusher thread.
    ///
    /// A missing snapshot starts empty. So does a corrupt one, which the sink
    /// has already moved aside. Any other load failure (I/O, redis) fails the
    /// open: starting empty would overwrite an intact snapshot on first flush.
    pub fn open<S: SnapshotSink>(sink: S, flush_interval: Duration) -> Result<Self, JobStoreError> {
        let sink_name = sink.describe();
        let jobs = match sink.load() {
            Ok(Some(jobs)) => {
                info!(sink = %sink_name, count = jobs.len(), "rehydrated job snapshot");
                jobs
            }
            Ok(None) => {
                info!(sink = %sink_name, "no job snapshot found; starting empty");
                Vec::new()
            }
            Err(SnapshotError::Corrupt(reason)) => {
                warn!(sink = %sink_name, error = %reason, "job snapshot corrupt; starting empty");
                Vec::new()
            }
            Err(e) => {
                error!(sink = %sink_name, error = %e, "failed to load job snapshot");
                return Err(JobStoreError::Storage(format!(
                    "failed to load snapshot from {sink_name}: {e}"
                )));
            }
        };

        let memory = Arc::new(InMemoryJobStore::from_jobs(jobs));
        let (signal, rx) = mpsc::channel::<FlushSignal>();

        let join = {
            let memory = memory.clone();
            thread::Builder::new()
                .name("job-snapshot-flusher".to_string())
                .spawn(move || flusher_loop(memory, sink, rx, flush_interval))
                .map_err(|e| JobStoreError::Storage(format!("failed to spawn flusher: {e}")))?
        };

        Ok(Self {
            memory,
            signal,
            flusher: Mutex::new(Some(join)),
            sink_name,
        })
    }

    /// Write the current record set now and wait for the result.
    pub fn flush(&self) -> Result<(), SnapshotError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.signal
            .send(FlushSignal::Flush(reply_tx))
            .map_err(|_| SnapshotError::FlusherStopped)?;
        reply_rx.recv().map_err(|_| SnapshotError::FlusherStopped)?
    }

    /// Stop the flusher after a final write of any pending changes.
    pub fn shutdown(&self) {
        let join = match self.flusher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(join) = join {
            let _ = self.signal.send(FlushSignal::Shutdown);
            if join.join().is_err() {
                error!(sink = %self.sink_name, "job snapshot flusher panicked");
            }
        }
    }

    fn mark_dirty(&self) {
        if self.signal.send(FlushSignal::Dirty).is_err() {
            warn!(sink = %self.sink_name, "job snapshot flusher stopped; change not persisted");
        }
    }
}

impl Drop for PersistentJobStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl JobStore for PersistentJobStore {
    fn get(&self, id: &JobId) -> Result<Option<Job>, JobStoreError> {
        self.memory.get(id)
    }

    fn set(&self, job: Job) -> Result<(), JobStoreError> {
        self.memory.set(job)?;
        self.mark_dirty();
        Ok(())
    }

    fn delete(&self, id: &JobId) -> Result<bool, JobStoreError> {
        let existed = self.memory.delete(id)?;
        if existed {
            self.mark_dirty();
        }
        Ok(existed)
    }

    fn get_all(&self) -> Result<Vec<Job>, JobStoreError> {
        self.memory.get_all()
    }

    fn clear(&self) -> Result<(), JobStoreError> {
        self.memory.clear()?;
        self.mark_dirty();
        Ok(())
    }

    fn len(&self) -> Result<usize, JobStoreError> {
        self.memory.len()
    }
}

fn flusher_loop<S: SnapshotSink>(
    memory: Arc<InMemoryJobStore>,
    sink: S,
    rx: mpsc::Receiver<FlushSignal>,
    interval: Duration,
) {
    // Set when the first unflushed change arrives; later changes do not push it back.
    let mut deadline: Option<Instant> = None;

    loop {
        let signal = match deadline {
            None => match rx.recv() {
                Ok(s) => s,
                Err(_) => return,
            },
            Some(at) => match rx.recv_timeout(at.saturating_duration_since(Instant::now())) {
                Ok(s) => s,
                Err(RecvTimeoutError::Timeout) => {
                    log_write(&sink, write_snapshot(&memory, &sink));
                    deadline = None;
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log_write(&sink, write_snapshot(&memory, &sink));
                    return;
                }
            },
        };

        match signal {
            FlushSignal::Dirty => {
                deadline.get_or_insert_with(|| Instant::now() + interval);
            }
            FlushSignal::Flush(reply) => {
                let result = write_snapshot(&memory, &sink);
                deadline = None;
                if let Err(e) = &result {
                    warn!(sink = %sink.describe(), error = %e, "explicit job snapshot flush failed");
                }
                let _ = reply.send(result);
            }
            FlushSignal::Shutdown => {
                if deadline.is_some() {
                    log_write(&sink, write_snapshot(&memory, &sink));
                }
                debug!(sink = %sink.describe(), "job snapshot flusher stopped");
                return;
            }
        }
    }
}

fn write_snapshot<S: SnapshotSink>(memory: &InMemoryJobStore, sink: &S) -> Result<(), SnapshotError> {
    let mut jobs = memory
        .get_all()
        .map_err(|e| SnapshotError::Source(e.to_string()))?;
    // Sorted so consecutive snapshots diff cleanly.
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    sink.write(&jobs)
}

fn log_write<S: SnapshotSink>(sink: &S, result: Result<(), SnapshotError>) {
    match result {
        Ok(()) => debug!(sink = %sink.describe(), "job snapshot written"),
        Err(e) => warn!(sink = %sink.describe(), error = %e, "job snapshot write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::snapshot::FileSnapshot;
    use chrono::Utc;
    use jobtrack_core::{JobStatus, NewJob};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job(id: &str) -> Job {
        Job::new(
            NewJob::new("ocr", "a.pdf").with_id(JobId::parse(id).unwrap()),
            Utc::now(),
        )
    }

    /// Sink that counts writes and can be told to fail.
    #[derive(Default)]
    struct CountingSink {
        writes: Arc<AtomicUsize>,
        fail: bool,
        last: Arc<Mutex<Vec<Job>>>,
    }

    impl SnapshotSink for CountingSink {
        fn load(&self) -> Result<Option<Vec<Job>>, SnapshotError> {
            Ok(None)
        }

        fn write(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SnapshotError::Redis("unavailable".into()));
            }
            *self.last.lock().unwrap() = jobs.to_vec();
            Ok(())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn reopen_rehydrates_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        {
            let store = PersistentJobStore::open(FileSnapshot::new(&path), DEFAULT_FLUSH_INTERVAL).unwrap();
            store.set(job("job_1")).unwrap();
            let mut j2 = job("job_2");
            j2.status = JobStatus::Running;
            store.set(j2).unwrap();
            store.delete(&JobId::parse("job_1").unwrap()).unwrap();
            // Dropping performs the final flush.
        }

        let store = PersistentJobStore::open(FileSnapshot::new(&path), DEFAULT_FLUSH_INTERVAL).unwrap();
        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_str(), "job_2");
        assert_eq!(all[0].status, JobStatus::Running);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, b"[{\"id\": ").unwrap();

        let store = PersistentJobStore::open(FileSnapshot::new(&path), DEFAULT_FLUSH_INTERVAL).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    /// Sink whose backend is unreachable on load; records every write.
    #[derive(Default)]
    struct UnreachableSink {
        written: Arc<Mutex<Vec<usize>>>,
    }

    impl SnapshotSink for UnreachableSink {
        fn load(&self) -> Result<Option<Vec<Job>>, SnapshotError> {
            Err(SnapshotError::Redis("connection refused".into()))
        }

        fn write(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
            self.written.lock().unwrap().push(jobs.len());
            Ok(())
        }

        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    #[test]
    fn load_failure_fails_open_and_never_writes() {
        let sink = UnreachableSink::default();
        let written = sink.written.clone();

        let err = PersistentJobStore::open(sink, Duration::from_millis(10)).unwrap_err();

        match err {
            JobStoreError::Storage(msg) => assert!(msg.contains("connection refused"), "{msg}"),
            other => panic!("expected storage error, got {other:?}"),
        }
        std::thread::sleep(Duration::from_millis(50));
        assert!(written.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_snapshot_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the snapshot file should be: read fails, but not with NotFound.
        let path = dir.path().join("jobs.json");
        std::fs::create_dir(&path).unwrap();

        assert!(PersistentJobStore::open(FileSnapshot::new(&path), DEFAULT_FLUSH_INTERVAL).is_err());
        assert!(path.is_dir());
    }

    #[test]
    fn bursts_are_coalesced_into_one_write() {
        let sink = CountingSink::default();
        let writes = sink.writes.clone();
        let last = sink.last.clone();
        let store = PersistentJobStore::open(sink, Duration::from_millis(200)).unwrap();

        for i in 0..50 {
            store.set(job(&format!("job_{i}"))).unwrap();
        }
        // Visible immediately, before any write.
        assert_eq!(store.len().unwrap(), 50);

        std::thread::sleep(Duration::from_millis(600));
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(last.lock().unwrap().len(), 50);
    }

    #[test]
    fn explicit_flush_writes_immediately() {
        let sink = CountingSink::default();
        let writes = sink.writes.clone();
        let store = PersistentJobStore::open(sink, Duration::from_secs(60)).unwrap();

        store.set(job("job_1")).unwrap();
        store.flush().unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn write_failures_do_not_affect_memory() {
        let sink = CountingSink {
            fail: true,
            ..Default::default()
        };
        let store = PersistentJobStore::open(sink, Duration::from_millis(10)).unwrap();

        store.set(job("job_1")).unwrap();
        assert!(store.flush().is_err());
        assert!(store.get(&JobId::parse("job_1").unwrap()).unwrap().is_some());
    }
}

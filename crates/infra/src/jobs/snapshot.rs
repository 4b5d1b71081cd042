//! Snapshot persistence: the full record set serialized as one JSON array.
//!
//! A snapshot is always written in full and loaded in full. Backends only
//! need to store one opaque blob.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use jobtrack_core::Job;
use tracing::warn;

/// Persistence failure. Never rolls back in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("snapshot is corrupt: {0}")]
    Corrupt(String),
    #[error("redis error: {0}")]
    Redis(String),
    #[error("failed to read job records: {0}")]
    Source(String),
    #[error("snapshot flusher is not running")]
    FlusherStopped,
}

/// Durable medium for job snapshots.
pub trait SnapshotSink: Send + Sync + 'static {
    /// Read the last snapshot. `Ok(None)` when nothing was ever written.
    fn load(&self) -> Result<Option<Vec<Job>>, SnapshotError>;

    /// Replace the stored snapshot with `jobs`.
    fn write(&self, jobs: &[Job]) -> Result<(), SnapshotError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// `.corrupt-<utc timestamp>`, appended to the name of a quarantined snapshot.
fn corrupt_suffix() -> String {
    format!(".corrupt-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))
}

/// JSON file snapshot, replaced atomically via write-to-temp + rename.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    path: PathBuf,
}

impl FileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "jobs.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Move an unreadable snapshot aside so the next write does not destroy it.
    fn quarantine(&self) -> Result<(), SnapshotError> {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(corrupt_suffix());
        let target = PathBuf::from(name);
        fs::rename(&self.path, &target).map_err(|e| self.io_error(&target, e))?;
        warn!(path = %target.display(), "corrupt job snapshot moved aside");
        Ok(())
    }
}

impl SnapshotSink for FileSnapshot {
    fn load(&self) -> Result<Option<Vec<Job>>, SnapshotError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        match serde_json::from_slice::<Vec<Job>>(&bytes) {
            Ok(jobs) => Ok(Some(jobs)),
            Err(e) => {
                // Corrupt is only reported once the original is safe.
                self.quarantine()?;
                Err(SnapshotError::Corrupt(e.to_string()))
            }
        }
    }

    fn write(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;
        }

        let payload = serde_json::to_vec_pretty(jobs)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, payload).map_err(|e| self.io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(&self.path, e))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Redis-backed snapshot (optional): the JSON array stored under one key.
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisSnapshot {
    client: redis::Client,
    key: String,
}

#[cfg(feature = "redis")]
impl RedisSnapshot {
    pub fn new(redis_url: impl AsRef<str>, key: impl Into<String>) -> Result<Self, SnapshotError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| SnapshotError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            key: key.into(),
        })
    }

    fn connection(&self) -> Result<redis::Connection, SnapshotError> {
        self.client
            .get_connection()
            .map_err(|e| SnapshotError::Redis(e.to_string()))
    }
}

#[cfg(feature = "redis")]
impl SnapshotSink for RedisSnapshot {
    fn load(&self) -> Result<Option<Vec<Job>>, SnapshotError> {
        use redis::Commands;

        let mut conn = self.connection()?;
        let raw: Option<String> = conn
            .get(&self.key)
            .map_err(|e| SnapshotError::Redis(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(jobs) => Ok(Some(jobs)),
            Err(e) => {
                let target = format!("{}{}", self.key, corrupt_suffix());
                let _: () = conn
                    .set(&target, &raw)
                    .map_err(|err| SnapshotError::Redis(err.to_string()))?;
                warn!(key = %target, "corrupt job snapshot copied aside");
                Err(SnapshotError::Corrupt(e.to_string()))
            }
        }
    }

    fn write(&self, jobs: &[Job]) -> Result<(), SnapshotError> {
        use redis::Commands;

        let payload = serde_json::to_string(jobs)?;
        let mut conn = self.connection()?;
        let _: () = conn
            .set(&self.key, payload)
            .map_err(|e| SnapshotError::Redis(e.to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("redis:{}", self.key)
    }
}

//! Infrastructure layer: job storage, persistence, callback processing.

pub mod jobs;

pub use jobs::{
    CallbackError, FileSnapshot, InMemoryJobStore, JobFilter, JobStore, JobStoreError,
    JobTracker, PersistentJobStore, SnapshotError,
};

//! Job lifecycle tracking.
//!
//! ## Design
//!
//! - Job records live in a `JobStore`; the in-memory map is authoritative
//! - Snapshot persistence is write-behind and best-effort
//! - Callbacks are sparse patches applied under a per-id lock
//! - Introspection is read-only apart from the self-test record
//!
//! ## Components
//!
//! - `JobStore`: keyed storage (in-memory or snapshot-persisted)
//! - `SnapshotSink`: durable medium for full snapshots (file, redis)
//! - `CallbackProcessor`: validates and merges external status updates
//! - `Introspector`: counts, correlation and self-test for debugging
//! - `JobTracker`: facade wiring the above together

pub mod callback;
pub mod introspection;
pub mod locks;
pub mod persistent;
pub mod snapshot;
pub mod store;
pub mod tracker;

pub use callback::{CallbackError, CallbackProcessor, apply_sparse_patch};
pub use introspection::{Introspector, JobDigest, JobStats, JobSummary, SelfTestReport};
pub use locks::KeyedLocks;
pub use persistent::{DEFAULT_FLUSH_INTERVAL, PersistentJobStore};
#[cfg(feature = "redis")]
pub use snapshot::RedisSnapshot;
pub use snapshot::{FileSnapshot, SnapshotError, SnapshotSink};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use tracker::{JobFilter, JobTracker};

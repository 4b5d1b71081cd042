//! Job record model and validation for `jobtrack`.
//!
//! This crate is **pure**: no storage, no clocks beyond timestamps handed in
//! by callers, no I/O.

pub mod error;
pub mod id;
pub mod job;
pub mod update;
pub mod validation;

pub use error::{DomainError, DomainResult, FieldViolation};
pub use id::JobId;
pub use job::{Job, JobStatus, NewJob, REMOTE_JOB_ID_KEY, TransitionPolicy};
pub use update::CallbackUpdate;
pub use validation::{validate_callback, validate_new_job};

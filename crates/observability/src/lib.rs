//! Process-wide log setup for the job tracker binaries.

/// Install the subscriber chosen by `LOG_FORMAT` (JSON unless `pretty`).
///
/// Later calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber construction (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;

use std::sync::Arc;
use std::time::{Duration, Instant};

use jobtrack_core::TransitionPolicy;
use jobtrack_infra::jobs::{
    FileSnapshot, InMemoryJobStore, JobStore, JobStoreError, JobTracker, PersistentJobStore,
};

use crate::config::{AppConfig, StoreBackend};

/// Shared state handed to every handler via `Extension`.
pub struct AppServices {
    pub tracker: JobTracker,
    /// Present for the snapshot-backed stores; flushed on shutdown.
    persistent: Option<Arc<PersistentJobStore>>,
    backend: &'static str,
    started_at: Instant,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices")
            .field("backend", &self.backend)
            .field("policy", &self.tracker.policy())
            .finish_non_exhaustive()
    }
}

impl AppServices {
    /// Volatile services, nothing touches disk.
    pub fn in_memory(policy: TransitionPolicy) -> Self {
        Self::with_store(
            InMemoryJobStore::arc(),
            None,
            StoreBackend::Memory.name(),
            policy,
        )
    }

    fn with_store(
        store: Arc<dyn JobStore>,
        persistent: Option<Arc<PersistentJobStore>>,
        backend: &'static str,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            tracker: JobTracker::new(store, policy),
            persistent,
            backend,
            started_at: Instant::now(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Run a tracker call on the blocking pool, so per-id lock waits never
    /// park an async worker.
    pub async fn blocking<R, F>(self: Arc<Self>, f: F) -> Result<R, tokio::task::JoinError>
    where
        F: FnOnce(&JobTracker) -> R + Send + 'static,
        R: Send + 'static,
    {
        tokio::task::spawn_blocking(move || f(&self.tracker)).await
    }

    /// Write out pending changes and stop the flusher.
    pub fn shutdown(&self) {
        if let Some(store) = &self.persistent {
            store.shutdown();
        }
    }
}

/// Wire the store selected by `config`, loading any existing snapshot.
pub fn build_services(config: &AppConfig) -> Result<AppServices, JobStoreError> {
    let policy = config.transitions;
    let services = match &config.store {
        StoreBackend::Memory => AppServices::in_memory(policy),
        StoreBackend::File { path } => {
            let store = Arc::new(PersistentJobStore::open(
                FileSnapshot::new(path.clone()),
                config.flush_interval,
            )?);
            tracing::info!(path = %path.display(), "using file snapshot store");
            AppServices::with_store(store.clone(), Some(store), config.store.name(), policy)
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis { url, key } => {
            let sink = jobtrack_infra::jobs::RedisSnapshot::new(url, key.clone())
                .map_err(|e| JobStoreError::Storage(e.to_string()))?;
            let store = Arc::new(PersistentJobStore::open(sink, config.flush_interval)?);
            tracing::info!(key = %key, "using redis snapshot store");
            AppServices::with_store(store.clone(), Some(store), config.store.name(), policy)
        }
    };

    tracing::info!(
        backend = services.backend(),
        policy = ?policy,
        jobs = services.tracker.summarize()?.total_jobs,
        "job services ready"
    );
    Ok(services)
}

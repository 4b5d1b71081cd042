//! Per-job mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use jobtrack_core::JobId;

/// Hands out one mutex per job id.
///
/// Read-modify-write sequences on the same id run one at a time; different ids
/// only share the brief map lookup. Slots are dropped once no holder or
/// waiter remains, so the map stays proportional to in-flight work.
///
/// Whole-store operations go through [`KeyedLocks::with_all_locked`], which
/// waits for every per-id holder to finish and blocks new ones meanwhile.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
    /// Shared by per-id holders, exclusive for whole-store operations.
    gate: RwLock<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `id`.
    pub fn with_lock<R>(&self, id: &JobId, f: impl FnOnce() -> R) -> R {
        let _shared = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(id.clone()).or_default().clone()
        };

        let result = {
            // A panic under another holder leaves `()` behind; nothing to repair.
            let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        // Map + this handle: nobody else is holding or waiting.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(id);
        }
        result
    }

    /// Run `f` with every id locked. Must not be called from inside `with_lock`.
    pub fn with_all_locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _exclusive = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Number of ids with a live slot.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

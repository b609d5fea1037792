use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::flag::{FlagDefinition, FlagSet};

/// `FlagStore` holds the current [`FlagSet`] snapshot and allows concurrent access for readers
/// and writers.
///
/// Readers get an `Arc` to an immutable snapshot, so a resolution never observes a half-updated
/// flag even if a new snapshot is installed while it runs.
pub struct FlagStore {
    state: RwLock<StoreState>,
}

struct StoreState {
    flags: Arc<FlagSet>,
    updated_at: Option<DateTime<Utc>>,
}

impl FlagStore {
    /// Create a store holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                flags: Arc::new(FlagSet::default()),
                updated_at: None,
            }),
        }
    }

    /// Current snapshot. Hold on to it for the duration of one evaluation.
    pub fn snapshot(&self) -> Arc<FlagSet> {
        // The lock is poisoned only if a writer panicked while holding it. Writers only swap an
        // Arc, so the state is still consistent and safe to read.
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        state.flags.clone()
    }

    pub fn lookup(&self, flag_key: &str) -> Option<Arc<FlagDefinition>> {
        self.snapshot().get(flag_key).cloned()
    }

    /// Install a new snapshot, returning the previous one.
    pub fn set_flags(&self, flags: FlagSet) -> Arc<FlagSet> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(flags);
        let now = Utc::now();

        let mut state = self.state.write().unwrap_or_else(|err| err.into_inner());
        state.updated_at = Some(now);
        std::mem::replace(&mut state.flags, new_value)
    }

    /// When the current snapshot was installed. `None` until the first [`set_flags`](Self::set_flags).
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        let state = self.state.read().unwrap_or_else(|err| err.into_inner());
        state.updated_at
    }
}

impl Default for FlagStore {
    fn default() -> Self {
        Self::new()
    }
}

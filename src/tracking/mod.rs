pub mod autosave;
pub mod reconciler;
pub mod sampler;
pub mod stats;
pub mod tracker;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a holder panicked. Every critical
/// section in this module is a plain field read or write.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

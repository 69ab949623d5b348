use std::sync::{LockResult, Mutex, MutexGuard};

use tracing::warn;

/// Acquire a cache mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    store: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    recover(lock.lock(), store, op)
}

fn recover<G>(result: LockResult<G>, store: &'static str, op: &'static str) -> G {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                store,
                result = "poisoned_recovered",
                hint = "entries may be stale until their ttl elapses",
                "Recovered from poisoned cache lock"
            );
            poisoned.into_inner()
        }
    }
}

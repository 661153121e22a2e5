//! Per-reference mutual exclusion for synchronization attempts.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracker::Reference;

/// Keyed mutual-exclusion table.
///
/// Attempts for different references run concurrently; attempts for the
/// same reference serialize on its entry. The table is process-scoped and
/// grows with the set of distinct references seen; guards release on drop,
/// so a cancelled attempt never wedges its reference.
#[derive(Default)]
pub struct ReferenceLocks {
    locks: Mutex<HashMap<Reference, Arc<Mutex<()>>>>,
}

impl ReferenceLocks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusion scope for `reference`, waiting behind any
    /// attempt already holding it.
    pub async fn acquire(&self, reference: &Reference) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(reference.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_reference_waits() {
        let locks = Arc::new(ReferenceLocks::new());
        let reference = Reference::code("X");

        let guard = locks.acquire(&reference).await;

        let waiter = {
            let locks = locks.clone();
            let reference = reference.clone();
            tokio::spawn(async move {
                locks.acquire(&reference).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn different_references_do_not_wait() {
        let locks = ReferenceLocks::new();
        let _first = locks.acquire(&Reference::code("X")).await;
        // completes immediately despite the held guard above
        let _second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&Reference::code("Y")),
        )
        .await
        .expect("unrelated reference must not block");
    }
}

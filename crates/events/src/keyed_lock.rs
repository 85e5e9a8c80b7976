//! Per-key async mutual exclusion.
//!
//! Work for one key runs strictly one at a time; a second caller for the same
//! key waits for the first to finish and then runs its own work. Different
//! keys never block each other. Entries are dropped once nobody holds or waits
//! on them, so the map only ever contains in-flight keys.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Callers holding or waiting on this key.
    users: usize,
}

type Slots<K> = Arc<Mutex<HashMap<K, Slot>>>;

#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and hold it for the life of the guard.
    ///
    /// Cancel-safe: dropping the future while it waits gives up the caller's
    /// claim on the key.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let (lease, lock) = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            let lease = Lease {
                slots: self.slots.clone(),
                key,
            };
            (lease, slot.lock.clone())
        };

        let guard = lock.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Keys currently held or waited on.
    pub fn in_flight(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One caller's claim on a key; the entry goes away with the last claim.
#[derive(Debug)]
struct Lease<K>
where
    K: Eq + Hash,
{
    slots: Slots<K>,
    key: K,
}

impl<K> Drop for Lease<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Releases the key on drop.
#[derive(Debug)]
pub struct KeyedGuard<K>
where
    K: Eq + Hash,
{
    // Field order matters: the mutex is released before the claim is dropped.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<K>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_runs_one_at_a_time() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let active = active.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = locks.lock("invoice-1").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(1u32).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2u32)).await;
        assert!(b.is_ok());
        assert_eq!(locks.in_flight(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiters_leave_no_entry_behind() {
        let locks = KeyedLocks::new();

        let held = locks.lock("order-7").await;
        let timed_out = tokio::time::timeout(Duration::from_millis(5), locks.lock("order-7")).await;
        assert!(timed_out.is_err());
        drop(held);
        assert_eq!(locks.in_flight(), 0);

        // Waiter registered, holder leaves, then the waiter is dropped unpolled.
        let held = locks.lock("order-8").await;
        let mut waiter = Box::pin(locks.lock("order-8"));
        assert!(tokio::time::timeout(Duration::from_millis(5), &mut waiter).await.is_err());
        drop(held);
        drop(waiter);
        assert_eq!(locks.in_flight(), 0);

        let _again = locks.lock("order-8").await;
        assert_eq!(locks.in_flight(), 1);
    }
}

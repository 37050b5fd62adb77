// libs/appointment-cell/src/services/locks.rs
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;
use tracing::{debug, warn};

use availability_cell::models::SlotKey;

use crate::models::AppointmentError;

const DEFAULT_SHARDS: usize = 64;

type Shard = Mutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>;

/// Per-slot exclusive locks, sharded so unrelated slots never contend on
/// the same map. An entry lives only while someone holds or waits for it.
pub struct SlotLockTable {
    shards: Box<[Shard]>,
    wait: Duration,
}

impl SlotLockTable {
    pub fn new(wait: Duration) -> Self {
        Self::with_shards(DEFAULT_SHARDS, wait)
    }

    pub fn with_shards(shards: usize, wait: Duration) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Mutex::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self { shards, wait }
    }

    /// Waits at most the configured duration for exclusive access to `key`.
    pub async fn acquire(&self, key: SlotKey) -> Result<SlotLockGuard<'_>, AppointmentError> {
        let entry = {
            let mut shard = self.shard(&key);
            let mutex = shard
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone();
            PendingEntry {
                table: self,
                key,
                mutex: Some(mutex),
            }
        };

        let waited = timeout(self.wait, entry.handle().lock_owned()).await;
        match waited {
            Ok(guard) => {
                debug!("Acquired slot lock {}", key);
                Ok(SlotLockGuard {
                    table: self,
                    key,
                    guard: Some(guard),
                })
            }
            Err(_) => {
                warn!("Timed out after {:?} waiting for slot lock {}", self.wait, key);
                Err(AppointmentError::BookingTimeout(key))
            }
        }
    }

    /// Number of slots currently locked or waited on.
    pub fn active_entries(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    fn shard(&self, key: &SlotKey) -> MutexGuard<'_, HashMap<SlotKey, Arc<AsyncMutex<()>>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();

        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clones of the entry are only taken under the shard lock, so a count
    /// of one means nobody else holds or waits for it.
    fn release_entry(&self, key: &SlotKey) {
        let mut shard = self.shard(key);
        if shard
            .get(key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            shard.remove(key);
        }
    }
}

/// A waiter's reference to a table entry. Dropping it, whether the wait
/// succeeded, timed out or was abandoned, gives the entry back to the table.
struct PendingEntry<'a> {
    table: &'a SlotLockTable,
    key: SlotKey,
    mutex: Option<Arc<AsyncMutex<()>>>,
}

impl PendingEntry<'_> {
    fn handle(&self) -> Arc<AsyncMutex<()>> {
        self.mutex.clone().unwrap_or_default()
    }
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        drop(self.mutex.take());
        self.table.release_entry(&self.key);
    }
}

/// Exclusive hold on one slot; released on drop.
pub struct SlotLockGuard<'a> {
    table: &'a SlotLockTable,
    key: SlotKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SlotLockGuard<'_> {
    pub fn key(&self) -> &SlotKey {
        &self.key
    }
}

impl fmt::Debug for SlotLockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLockGuard").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Drop for SlotLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.table.release_entry(&self.key);
        debug!("Released slot lock {}", self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn key(hour: u32) -> SlotKey {
        SlotKey::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn second_holder_times_out() {
        let table = SlotLockTable::new(Duration::from_millis(20));
        let slot = key(10);

        let _held = table.acquire(slot).await.unwrap();
        assert_matches!(table.acquire(slot).await, Err(AppointmentError::BookingTimeout(k)) if k == slot);
    }

    #[tokio::test]
    async fn distinct_slots_do_not_contend() {
        let table = SlotLockTable::new(Duration::from_millis(20));

        let _a = table.acquire(key(10)).await.unwrap();
        let _b = table.acquire(key(11)).await.unwrap();
        assert_eq!(table.active_entries(), 2);
    }

    #[tokio::test]
    async fn entries_are_removed_after_release() {
        let table = SlotLockTable::with_shards(1, Duration::from_millis(20));
        let slot = key(10);

        {
            let guard = table.acquire(slot).await.unwrap();
            assert_eq!(guard.key(), &slot);
            assert_eq!(table.active_entries(), 1);
        }
        assert_eq!(table.active_entries(), 0);

        let _held = table.acquire(slot).await.unwrap();
        let _ = table.acquire(slot).await;
        assert_eq!(table.active_entries(), 1);
    }

    #[tokio::test]
    async fn waiter_gets_lock_once_released() {
        let table = Arc::new(SlotLockTable::new(Duration::from_secs(2)));
        let slot = key(10);

        let held = table.acquire(slot).await.unwrap();
        let waiter = {
            let table = table.clone();
            tokio::spawn(async move { table.acquire(slot).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(table.active_entries(), 0);
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_no_entry_behind() {
        let table = SlotLockTable::with_shards(1, Duration::from_secs(2));
        let slot = key(10);

        let held = table.acquire(slot).await.unwrap();
        let mut waiter = Box::pin(table.acquire(slot));
        assert!(futures::poll!(&mut waiter).is_pending());

        // Released while the waiter is queued, then the waiter is dropped unpolled.
        drop(held);
        drop(waiter);

        assert_eq!(table.active_entries(), 0);
    }
}

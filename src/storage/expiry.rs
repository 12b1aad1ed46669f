//! Per-Key Expiration Scheduler
//!
//! Every key with a TTL owns exactly one timer task. The task sleeps until
//! an absolute deadline and then evicts the key through an [`ExpiryTarget`]
//! (the region provider). This is "active" expiry; reads additionally treat
//! past-deadline entries as absent ("lazy" expiry) so a late timer is never
//! observable.
//!
//! ## Design
//!
//! ```text
//!   schedule/cancel                         timer task (tokio)
//!         │                                        │
//!         ▼                                        ▼
//! ┌───────────────────────────────────┐   sleep_until(deadline)
//! │ DashMap<KeyWrapper, Arc<Mutex<_>>>│            │
//! │  shard lock: lookup only          │            │
//! │  key mutex:  per-key section      │◄── take(id matches) ── FIRING
//! └───────────────────────────────────┘            │
//!                                                  ▼
//!                                target.remove_key(key, type, false)
//! ```
//!
//! The table's shard lock is held only long enough to fetch or insert a
//! key's cell; all work on the slot happens under that key's own mutex, so
//! a slow operation on one key never stalls another.
//!
//! State per key is NONE → SCHEDULED → (FIRING →) NONE. A fired task first
//! takes itself out of its slot, so a cancel arriving afterwards sees
//! [`Cancellation::NotPending`] and must assume an eviction is in flight.
//! Rescheduling replaces the slot's task under the same lock and aborts
//! the old one; deadlines are always recomputed from "now".

use crate::error::Result;
use crate::storage::{DataType, KeyWrapper};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default number of shards in the scheduler's task table.
pub const DEFAULT_SCHEDULER_SHARDS: usize = 64;

/// Deadline used when a TTL is too large to represent.
pub(crate) fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86400 * 365 * 30)
}

/// The component that performs evictions when a timer fires.
pub trait ExpiryTarget: Send + Sync {
    /// Removes `key` from the region for `data_type`.
    ///
    /// Fired timers always call this with `notify_only = false`.
    fn remove_key(&self, key: &KeyWrapper, data_type: DataType, notify_only: bool)
        -> Result<bool>;
}

/// Outcome of a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// A pending task was removed before it fired.
    Canceled,
    /// Nothing was pending: either no TTL was set, or the timer already
    /// started firing and the key is being (or has been) evicted.
    NotPending,
}

impl Cancellation {
    pub fn was_canceled(&self) -> bool {
        matches!(self, Cancellation::Canceled)
    }
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryStats {
    /// Tasks currently waiting to fire
    pub pending: usize,
    /// Total tasks created
    pub scheduled: u64,
    /// Tasks replaced by a newer deadline
    pub rescheduled: u64,
    /// Tasks canceled before firing
    pub canceled: u64,
    /// Tasks that fired and attempted an eviction
    pub fired: u64,
    /// Fired tasks whose eviction returned an error
    pub failed: u64,
}

struct ScheduledExpiration {
    id: u64,
    data_type: DataType,
    deadline: Instant,
    handle: JoinHandle<()>,
}

type Slot = Option<ScheduledExpiration>;
type SlotCell = Arc<Mutex<Slot>>;

/// State shared with running timer tasks.
struct Inner {
    tasks: DashMap<KeyWrapper, SlotCell>,
    target: Weak<dyn ExpiryTarget>,
    pending: AtomicUsize,
    scheduled: AtomicU64,
    rescheduled: AtomicU64,
    canceled: AtomicU64,
    fired: AtomicU64,
    failed: AtomicU64,
}

impl Inner {
    fn cell(&self, key: &KeyWrapper) -> Option<SlotCell> {
        self.tasks.get(key).map(|cell| Arc::clone(cell.value()))
    }

    fn cell_or_insert(&self, key: &KeyWrapper) -> SlotCell {
        Arc::clone(self.tasks.entry(key.clone()).or_default().value())
    }

    /// Drops a handle to `key`'s cell and unlinks the cell once no other
    /// handle exists and nothing is pending in it. Handles are only cloned
    /// under the shard lock, so the count cannot grow during the check.
    fn release(&self, key: &KeyWrapper, cell: SlotCell) {
        drop(cell);
        self.tasks.remove_if(key, |_, cell| {
            Arc::strong_count(cell) == 1 && cell.try_lock().is_some_and(|slot| slot.is_none())
        });
    }

    fn peek<R>(&self, key: &KeyWrapper, f: impl FnOnce(&Slot) -> R) -> Option<R> {
        let cell = self.cell(key)?;
        let result = f(&*cell.lock());
        self.release(key, cell);
        Some(result)
    }

    /// Runs when a timer elapses. Taking the task out of its slot is the
    /// point of no return; a task that finds its slot replaced or empty
    /// does nothing.
    fn fire(&self, key: &KeyWrapper, data_type: DataType, id: u64) {
        let claimed = self.cell(key).and_then(|cell| {
            let claimed = {
                let mut slot = cell.lock();
                if slot.as_ref().is_some_and(|task| task.id == id) {
                    slot.take()
                } else {
                    None
                }
            };
            self.release(key, cell);
            claimed
        });

        if claimed.is_none() {
            trace!(key = %key, "Stale expiration timer ignored");
            return;
        }

        self.pending.fetch_sub(1, Ordering::Relaxed);
        self.fired.fetch_add(1, Ordering::Relaxed);

        let Some(target) = self.target.upgrade() else {
            trace!(key = %key, "Expiry target dropped before eviction");
            return;
        };

        match target.remove_key(key, data_type, false) {
            Ok(removed) => {
                debug!(key = %key, data_type = %data_type, removed, "Key expired");
            }
            Err(e) => {
                // The task is already out of the table and is not re-armed;
                // the stored value may outlive its TTL until touched again.
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, data_type = %data_type, error = %e, "Eviction of expired key failed");
            }
        }
    }
}

/// Owns one cancelable timer per key that currently has a TTL.
pub struct ExpirationScheduler {
    inner: Arc<Inner>,
    runtime: Handle,
    next_id: AtomicU64,
}

impl fmt::Debug for ExpirationScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationScheduler")
            .field("pending", &self.inner.pending.load(Ordering::Relaxed))
            .field("fired", &self.inner.fired.load(Ordering::Relaxed))
            .finish()
    }
}

impl ExpirationScheduler {
    /// Creates a scheduler whose timers run on `runtime` and evict through
    /// `target`. `shards` must be a power of two greater than one.
    pub fn new(target: Weak<dyn ExpiryTarget>, runtime: Handle, shards: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                tasks: DashMap::with_shard_amount(shards),
                target,
                pending: AtomicUsize::new(0),
                scheduled: AtomicU64::new(0),
                rescheduled: AtomicU64::new(0),
                canceled: AtomicU64::new(0),
                fired: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
            runtime,
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedules (or reschedules) eviction of `key` after `ttl`.
    ///
    /// Returns the absolute deadline. A `ttl` too large to represent is
    /// clamped to a deadline decades away.
    pub fn schedule(&self, key: &KeyWrapper, data_type: DataType, ttl: Duration) -> Instant {
        self.with_slot(key, |slot| {
            let now = Instant::now();
            let deadline = now.checked_add(ttl).unwrap_or_else(|| far_future(now));
            slot.schedule(data_type, deadline);
            deadline
        })
    }

    /// Cancels the pending eviction of `key`, if any.
    pub fn cancel(&self, key: &KeyWrapper) -> Cancellation {
        self.with_slot(key, |slot| slot.cancel())
    }

    /// Runs `f` with exclusive access to `key`'s slot.
    ///
    /// Only callers on the same key are serialized. `f` must not call back
    /// into this scheduler for the same key.
    pub fn with_slot<R>(&self, key: &KeyWrapper, f: impl FnOnce(&mut KeySlot<'_>) -> R) -> R {
        let cell = self.inner.cell_or_insert(key);
        let result = {
            let mut guard = cell.lock();
            let mut slot = KeySlot {
                key,
                pending: &mut *guard,
                scheduler: self,
            };
            f(&mut slot)
        };
        self.inner.release(key, cell);
        result
    }

    /// Returns true if a timer is pending for `key`.
    pub fn is_scheduled(&self, key: &KeyWrapper) -> bool {
        self.inner
            .peek(key, |slot| slot.is_some())
            .unwrap_or(false)
    }

    /// The pending deadline and captured type for `key`.
    pub fn pending_for(&self, key: &KeyWrapper) -> Option<(DataType, Instant)> {
        self.inner
            .peek(key, |slot| slot.as_ref().map(|t| (t.data_type, t.deadline)))
            .flatten()
    }

    /// Keys that currently hold a slot, pending or not.
    pub fn scheduled_keys(&self) -> Vec<KeyWrapper> {
        self.inner.tasks.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Relaxed)
    }

    /// Cancels every pending timer, returning how many were canceled.
    ///
    /// Each slot is taken under its own lock; a key armed after its slot
    /// was visited keeps its timer.
    pub fn cancel_all(&self) -> usize {
        let cells: Vec<(KeyWrapper, SlotCell)> = self
            .inner
            .tasks
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut canceled = 0;
        for (key, cell) in cells {
            let task = cell.lock().take();
            if let Some(task) = task {
                task.handle.abort();
                canceled += 1;
            }
            self.inner.release(&key, cell);
        }

        self.inner.pending.fetch_sub(canceled, Ordering::Relaxed);
        self.inner
            .canceled
            .fetch_add(canceled as u64, Ordering::Relaxed);
        canceled
    }

    pub fn stats(&self) -> ExpiryStats {
        ExpiryStats {
            pending: self.inner.pending.load(Ordering::Relaxed),
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            rescheduled: self.inner.rescheduled.load(Ordering::Relaxed),
            canceled: self.inner.canceled.load(Ordering::Relaxed),
            fired: self.inner.fired.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    fn spawn_timer(&self, key: KeyWrapper, data_type: DataType, deadline: Instant) -> ScheduledExpiration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::downgrade(&self.inner);

        let handle = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire(&key, data_type, id);
            }
        });

        ScheduledExpiration {
            id,
            data_type,
            deadline,
            handle,
        }
    }
}

impl Drop for ExpirationScheduler {
    fn drop(&mut self) {
        let canceled = self.cancel_all();
        if canceled > 0 {
            debug!(canceled, "Expiration scheduler stopped");
        }
    }
}

/// Exclusive view of one key's scheduler slot, handed out by
/// [`ExpirationScheduler::with_slot`].
pub struct KeySlot<'a> {
    key: &'a KeyWrapper,
    pending: &'a mut Slot,
    scheduler: &'a ExpirationScheduler,
}

impl KeySlot<'_> {
    /// The data type captured by the pending timer.
    pub fn data_type(&self) -> Option<DataType> {
        self.pending.as_ref().map(|t| t.data_type)
    }

    /// Arms a timer for `deadline`, replacing any pending one.
    pub fn schedule(&mut self, data_type: DataType, deadline: Instant) {
        let task = self
            .scheduler
            .spawn_timer(self.key.clone(), data_type, deadline);
        let inner = &self.scheduler.inner;
        inner.scheduled.fetch_add(1, Ordering::Relaxed);

        match self.pending.replace(task) {
            Some(old) => {
                old.handle.abort();
                inner.rescheduled.fetch_add(1, Ordering::Relaxed);
                trace!(key = %self.key, "Expiration rescheduled");
            }
            None => {
                inner.pending.fetch_add(1, Ordering::Relaxed);
                trace!(key = %self.key, "Expiration scheduled");
            }
        }
    }

    /// Cancels the pending timer, if one exists.
    pub fn cancel(&mut self) -> Cancellation {
        match self.pending.take() {
            Some(task) => {
                task.handle.abort();
                let inner = &self.scheduler.inner;
                inner.pending.fetch_sub(1, Ordering::Relaxed);
                inner.canceled.fetch_add(1, Ordering::Relaxed);
                trace!(key = %self.key, "Expiration canceled");
                Cancellation::Canceled
            }
            None => Cancellation::NotPending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, StoreError};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTarget {
        calls: Mutex<Vec<(KeyWrapper, DataType, bool)>>,
        fail: AtomicBool,
    }

    impl RecordingTarget {
        fn calls(&self) -> Vec<(KeyWrapper, DataType, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ExpiryTarget for RecordingTarget {
        fn remove_key(
            &self,
            key: &KeyWrapper,
            data_type: DataType,
            notify_only: bool,
        ) -> Result<bool> {
            self.calls
                .lock()
                .unwrap()
                .push((key.clone(), data_type, notify_only));
            if self.fail.load(Ordering::SeqCst) {
                return Err(EngineError::StoreUnavailable(StoreError::Offline(
                    "test".to_string(),
                )));
            }
            Ok(true)
        }
    }

    fn scheduler_for(target: &Arc<RecordingTarget>) -> ExpirationScheduler {
        let weak: Weak<dyn ExpiryTarget> = Arc::downgrade(target) as Weak<dyn ExpiryTarget>;
        ExpirationScheduler::new(weak, Handle::current(), 8)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_at_deadline() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        scheduler.schedule(&key, DataType::String, Duration::from_millis(100));
        assert!(scheduler.is_scheduled(&key));

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(target.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(target.calls(), vec![(key.clone(), DataType::String, false)]);
        assert!(!scheduler.is_scheduled(&key));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.calls().len(), 1);

        let stats = scheduler.stats();
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire_wins() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        scheduler.schedule(&key, DataType::List, Duration::from_millis(100));
        assert_eq!(scheduler.cancel(&key), Cancellation::Canceled);
        assert_eq!(scheduler.cancel(&key), Cancellation::NotPending);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(target.calls().is_empty());
        assert_eq!(scheduler.stats().canceled, 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_uses_new_deadline() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        scheduler.schedule(&key, DataType::String, Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let deadline = scheduler.schedule(&key, DataType::String, Duration::from_millis(200));

        assert_eq!(scheduler.pending(), 1);
        assert_eq!(scheduler.pending_for(&key), Some((DataType::String, deadline)));

        // the original deadline passes without an eviction
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(target.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert_eq!(target.calls().len(), 1);

        let stats = scheduler.stats();
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.rescheduled, 1);
        assert_eq!(stats.fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_not_pending() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        scheduler.schedule(&key, DataType::Hash, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(scheduler.cancel(&key), Cancellation::NotPending);
        assert_eq!(target.calls(), vec![(key, DataType::Hash, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_eviction_is_not_rearmed() {
        let target = Arc::new(RecordingTarget::default());
        target.fail.store(true, Ordering::SeqCst);
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        scheduler.schedule(&key, DataType::Set, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(target.calls().len(), 1);
        assert!(!scheduler.is_scheduled(&key));
        let stats = scheduler.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_target_is_ignored() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        scheduler.schedule(&KeyWrapper::from("a"), DataType::String, Duration::from_millis(10));
        drop(target);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.stats().fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_is_released_when_empty() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("a");

        let outcome = scheduler.with_slot(&key, |slot| {
            assert_eq!(slot.data_type(), None);
            slot.cancel()
        });
        assert_eq!(outcome, Cancellation::NotPending);
        assert!(scheduler.inner.tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_ttl_is_clamped() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        let key = KeyWrapper::from("forever");

        let before = Instant::now();
        let deadline = scheduler.schedule(&key, DataType::String, Duration::MAX);
        assert!(deadline > before + Duration::from_secs(86400 * 365));
        assert_eq!(scheduler.pending_for(&key), Some((DataType::String, deadline)));

        tokio::time::sleep(Duration::from_secs(86400)).await;
        assert!(target.calls().is_empty());
        assert_eq!(scheduler.cancel(&key), Cancellation::Canceled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_busy_slot_does_not_block_other_keys() {
        let target = Arc::new(RecordingTarget::default());
        let weak: Weak<dyn ExpiryTarget> = Arc::downgrade(&target) as Weak<dyn ExpiryTarget>;
        // two shards, so most of the keys below share a shard with "slow"
        let scheduler = Arc::new(ExpirationScheduler::new(weak, Handle::current(), 2));
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let busy = {
            let scheduler = Arc::clone(&scheduler);
            std::thread::spawn(move || {
                scheduler.with_slot(&KeyWrapper::from("slow"), |slot| {
                    entered_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(400));
                    slot.cancel()
                })
            })
        };
        entered_rx.recv().unwrap();

        let started = std::time::Instant::now();
        for i in 0..16 {
            let key = KeyWrapper::from(format!("k{}", i));
            scheduler.schedule(&key, DataType::String, Duration::from_secs(60));
            assert!(scheduler.is_scheduled(&key));
            assert_eq!(scheduler.cancel(&key), Cancellation::Canceled);
        }
        let elapsed = started.elapsed();

        assert_eq!(busy.join().unwrap(), Cancellation::NotPending);
        assert!(
            elapsed < Duration::from_millis(200),
            "unrelated keys waited {:?} on a busy slot",
            elapsed
        );
        assert!(scheduler.inner.tasks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);
        for i in 0..20 {
            scheduler.schedule(
                &KeyWrapper::from(format!("k{}", i)),
                DataType::String,
                Duration::from_millis(100 + i),
            );
        }
        assert_eq!(scheduler.pending(), 20);
        assert_eq!(scheduler.cancel_all(), 20);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(target.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_keys() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = scheduler_for(&target);

        for i in 0..10u64 {
            let key = KeyWrapper::from(format!("k{}", i));
            scheduler.schedule(&key, DataType::String, Duration::from_millis(10 * (i + 1)));
            if i % 2 == 0 {
                scheduler.cancel(&key);
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut evicted: Vec<String> = target.calls().iter().map(|(k, _, _)| k.to_string()).collect();
        evicted.sort();
        assert_eq!(evicted, vec!["k1", "k3", "k5", "k7", "k9"]);
    }
}

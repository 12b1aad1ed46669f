//! Backing Regions
//!
//! A region is a keyed store holding entries of a single [`DataType`]. The
//! engine treats it as an opaque collaborator with CRUD plus listener
//! registration; [`MemoryRegion`] is the in-process implementation.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 MemoryRegion (one per type)                 │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards by hash, so operations on different
//! keys rarely touch the same lock. Listeners are always invoked after the
//! shard lock has been released.

use crate::error::{StoreError, StoreResult};
use crate::storage::{DataType, KeyWrapper, Value};
use std::collections::HashMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::time::Instant;

/// Default number of shards per region.
pub const DEFAULT_REGION_SHARDS: usize = 64;

/// A stored value with its optional absolute expiry deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionEntry {
    pub value: Value,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl RegionEntry {
    /// Creates an entry without expiry.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates an entry that expires at `deadline`.
    pub fn with_deadline(value: Value, deadline: Instant) -> Self {
        Self {
            value,
            expires_at: Some(deadline),
        }
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// Callback for removals performed by the backing store itself.
pub trait RegionListener: Send + Sync {
    /// Called after `key` was removed from the region without the engine
    /// asking for it (redistribution, failover, local eviction).
    fn after_invalidate(&self, key: &KeyWrapper, data_type: DataType);
}

/// A keyed store holding entries of exactly one data type.
///
/// Implementations must be safe to share across threads. Every operation
/// is synchronous; failures surface as [`StoreError`].
pub trait Region: Send + Sync + fmt::Debug {
    /// Region name, unique per provider.
    fn name(&self) -> &str;

    /// The single data type this region stores.
    fn data_type(&self) -> DataType;

    /// Returns a copy of the entry stored under `key`.
    fn get(&self, key: &KeyWrapper) -> StoreResult<Option<RegionEntry>>;

    /// Runs `f` against the entry under `key` without copying it.
    fn inspect(
        &self,
        key: &KeyWrapper,
        f: &mut dyn FnMut(Option<&RegionEntry>),
    ) -> StoreResult<()>;

    fn contains_key(&self, key: &KeyWrapper) -> StoreResult<bool>;

    /// Stores `entry`, returning the previous entry if there was one.
    fn put(&self, key: KeyWrapper, entry: RegionEntry) -> StoreResult<Option<RegionEntry>>;

    /// Atomically rewrites the slot for `key`. Leaving the slot empty
    /// removes the key.
    fn update(
        &self,
        key: &KeyWrapper,
        f: &mut dyn FnMut(&mut Option<RegionEntry>),
    ) -> StoreResult<()>;

    /// Removes `key`, returning the removed entry. Listeners are not called.
    fn remove(&self, key: &KeyWrapper) -> StoreResult<Option<RegionEntry>>;

    /// Removes `key` on behalf of the store itself and notifies listeners.
    fn invalidate(&self, key: &KeyWrapper) -> StoreResult<bool>;

    /// Snapshot of all keys currently stored.
    fn keys(&self) -> StoreResult<Vec<KeyWrapper>>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes everything, returning how many entries were dropped.
    fn clear(&self) -> StoreResult<usize>;

    /// Registers a listener for store-initiated removals.
    fn add_listener(&self, listener: Arc<dyn RegionListener>);
}

/// Creates the backing region for a data type on first use.
pub trait RegionFactory: Send + Sync {
    fn create_region(&self, data_type: DataType) -> Arc<dyn Region>;
}

/// Factory for sharded in-memory regions.
#[derive(Debug, Clone)]
pub struct MemoryRegionFactory {
    shards: usize,
}

impl MemoryRegionFactory {
    pub fn new(shards: usize) -> Self {
        Self { shards }
    }
}

impl Default for MemoryRegionFactory {
    fn default() -> Self {
        Self::new(DEFAULT_REGION_SHARDS)
    }
}

impl RegionFactory for MemoryRegionFactory {
    fn create_region(&self, data_type: DataType) -> Arc<dyn Region> {
        Arc::new(MemoryRegion::new(data_type, self.shards))
    }
}

type Shard = RwLock<HashMap<KeyWrapper, RegionEntry>>;

/// Sharded in-memory region.
pub struct MemoryRegion {
    name: String,
    data_type: DataType,
    shards: Vec<Shard>,
    entry_count: AtomicU64,
    online: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn RegionListener>>>,
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("name", &self.name)
            .field("shards", &self.shards.len())
            .field("entries", &self.entry_count.load(Ordering::Relaxed))
            .field("online", &self.online.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryRegion {
    /// Creates an empty region for `data_type` with `shards` shards.
    pub fn new(data_type: DataType, shards: usize) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            name: data_type.region_name().to_string(),
            data_type,
            shards,
            entry_count: AtomicU64::new(0),
            online: AtomicBool::new(true),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Takes the region offline or brings it back. While offline every
    /// operation fails with [`StoreError::Offline`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    #[inline]
    fn shard_index(&self, key: &KeyWrapper) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    #[inline]
    fn get_shard(&self, key: &KeyWrapper) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Offline(self.name.clone()))
        }
    }

    fn poisoned(&self) -> StoreError {
        StoreError::Poisoned(self.name.clone())
    }

    fn read_shard(
        &self,
        key: &KeyWrapper,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<KeyWrapper, RegionEntry>>> {
        self.check_online()?;
        self.get_shard(key).read().map_err(|_| self.poisoned())
    }

    fn write_shard(
        &self,
        key: &KeyWrapper,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<KeyWrapper, RegionEntry>>> {
        self.check_online()?;
        self.get_shard(key).write().map_err(|_| self.poisoned())
    }
}

impl Region for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn get(&self, key: &KeyWrapper) -> StoreResult<Option<RegionEntry>> {
        Ok(self.read_shard(key)?.get(key).cloned())
    }

    fn inspect(
        &self,
        key: &KeyWrapper,
        f: &mut dyn FnMut(Option<&RegionEntry>),
    ) -> StoreResult<()> {
        let data = self.read_shard(key)?;
        f(data.get(key));
        Ok(())
    }

    fn contains_key(&self, key: &KeyWrapper) -> StoreResult<bool> {
        Ok(self.read_shard(key)?.contains_key(key))
    }

    fn put(&self, key: KeyWrapper, entry: RegionEntry) -> StoreResult<Option<RegionEntry>> {
        let mut data = self.write_shard(&key)?;
        let previous = data.insert(key, entry);
        if previous.is_none() {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(previous)
    }

    fn update(
        &self,
        key: &KeyWrapper,
        f: &mut dyn FnMut(&mut Option<RegionEntry>),
    ) -> StoreResult<()> {
        let mut data = self.write_shard(key)?;
        let mut slot = data.remove(key);
        let existed = slot.is_some();
        f(&mut slot);

        match (existed, slot) {
            (true, Some(entry)) => {
                data.insert(key.clone(), entry);
            }
            (false, Some(entry)) => {
                data.insert(key.clone(), entry);
                self.entry_count.fetch_add(1, Ordering::Relaxed);
            }
            (true, None) => {
                self.entry_count.fetch_sub(1, Ordering::Relaxed);
            }
            (false, None) => {}
        }
        Ok(())
    }

    fn remove(&self, key: &KeyWrapper) -> StoreResult<Option<RegionEntry>> {
        let mut data = self.write_shard(key)?;
        let removed = data.remove(key);
        if removed.is_some() {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    fn invalidate(&self, key: &KeyWrapper) -> StoreResult<bool> {
        let removed = self.remove(key)?.is_some();
        if removed {
            let listeners: Vec<Arc<dyn RegionListener>> = match self.listeners.read() {
                Ok(l) => l.clone(),
                Err(_) => return Err(self.poisoned()),
            };
            for listener in listeners {
                listener.after_invalidate(key, self.data_type);
            }
        }
        Ok(removed)
    }

    fn keys(&self) -> StoreResult<Vec<KeyWrapper>> {
        self.check_online()?;
        let mut keys = Vec::new();
        for shard in &self.shards {
            let data = shard.read().map_err(|_| self.poisoned())?;
            keys.extend(data.keys().cloned());
        }
        Ok(keys)
    }

    fn len(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed) as usize
    }

    fn clear(&self) -> StoreResult<usize> {
        self.check_online()?;
        let mut cleared = 0;
        for shard in &self.shards {
            let mut data = shard.write().map_err(|_| self.poisoned())?;
            cleared += data.len();
            data.clear();
        }
        self.entry_count.fetch_sub(cleared as u64, Ordering::Relaxed);
        Ok(cleared)
    }

    fn add_listener(&self, listener: Arc<dyn RegionListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push(listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;
    use tokio::time::Duration;

    fn string(s: &'static str) -> Value {
        Value::String(Bytes::from(s))
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(KeyWrapper, DataType)>>,
    }

    impl RegionListener for Recorder {
        fn after_invalidate(&self, key: &KeyWrapper, data_type: DataType) {
            self.seen.lock().unwrap().push((key.clone(), data_type));
        }
    }

    #[test]
    fn test_put_get_remove() {
        let region = MemoryRegion::new(DataType::String, 8);
        let key = KeyWrapper::from("key");

        assert_eq!(region.put(key.clone(), RegionEntry::new(string("v1"))), Ok(None));
        assert_eq!(region.len(), 1);
        assert_eq!(region.get(&key).unwrap().unwrap().value, string("v1"));

        let previous = region.put(key.clone(), RegionEntry::new(string("v2"))).unwrap();
        assert_eq!(previous.unwrap().value, string("v1"));
        assert_eq!(region.len(), 1);

        assert!(region.remove(&key).unwrap().is_some());
        assert!(region.remove(&key).unwrap().is_none());
        assert!(region.is_empty());
    }

    #[test]
    fn test_update_creates_and_removes() {
        let region = MemoryRegion::new(DataType::String, 4);
        let key = KeyWrapper::from("counter");

        region
            .update(&key, &mut |slot| {
                assert!(slot.is_none());
                *slot = Some(RegionEntry::new(string("1")));
            })
            .unwrap();
        assert_eq!(region.len(), 1);

        region.update(&key, &mut |slot| *slot = None).unwrap();
        assert_eq!(region.len(), 0);
        assert!(!region.contains_key(&key).unwrap());
    }

    #[test]
    fn test_offline_region_fails() {
        let region = MemoryRegion::new(DataType::List, 4);
        region.set_online(false);

        let err = region.get(&KeyWrapper::from("k")).unwrap_err();
        assert_eq!(err, StoreError::Offline("__redis_lists".to_string()));

        region.set_online(true);
        assert!(region.get(&KeyWrapper::from("k")).unwrap().is_none());
    }

    #[test]
    fn test_invalidate_notifies_listeners() {
        let region = MemoryRegion::new(DataType::String, 4);
        let recorder = Arc::new(Recorder::default());
        region.add_listener(recorder.clone());

        let key = KeyWrapper::from("gone");
        region.put(key.clone(), RegionEntry::new(string("x"))).unwrap();

        // plain removals are engine-initiated and stay silent
        region.remove(&key).unwrap();
        assert!(recorder.seen.lock().unwrap().is_empty());

        region.put(key.clone(), RegionEntry::new(string("x"))).unwrap();
        assert!(region.invalidate(&key).unwrap());
        assert!(!region.invalidate(&key).unwrap());

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(key, DataType::String)]);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let now = Instant::now();
        let entry = RegionEntry::with_deadline(string("v"), now + Duration::from_millis(100));

        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_millis(100)));
        assert!(!RegionEntry::new(string("v")).is_expired_at(now + Duration::from_secs(3600)));
    }

    #[test]
    fn test_keys_and_clear() {
        let region = MemoryRegion::new(DataType::String, 16);
        for i in 0..50 {
            region
                .put(KeyWrapper::from(format!("k{}", i)), RegionEntry::new(string("v")))
                .unwrap();
        }
        assert_eq!(region.keys().unwrap().len(), 50);
        assert_eq!(region.clear().unwrap(), 50);
        assert_eq!(region.len(), 0);
    }
}

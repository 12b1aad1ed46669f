//! Region Provider
//!
//! The single authority for "does this key exist, and of what type". It
//! owns one backing region per [`DataType`], routes every key operation to
//! the right one, and keeps the expiration table consistent with the
//! entries actually stored.
//!
//! ## Routing
//!
//! ```text
//!                         ┌──────────────────────┐
//!   command executor ───> │    RegionProvider    │ <─── timer fired
//!                         │  (per-key section in │      (ExpiryTarget)
//!                         │   the scheduler)     │
//!                         └──────────┬───────────┘
//!            ┌──────────┬────────────┼───────────┬──────────────┐
//!            ▼          ▼            ▼           ▼              ▼
//!     __redis_strings  _lists     _sets      _hashes    _sorted_sets
//! ```
//!
//! Regions are created lazily on first use and live as long as the provider.
//!
//! ## Consistency
//!
//! Every mutation runs inside the key's scheduler slot, so storing a value
//! and arming (or canceling) its timer happen as one step with respect to
//! other mutations of the same key. Locks are always taken in the order
//! scheduler slot → region shard. Notifications are published only after
//! the slot is released.
//!
//! An entry carries `expires_at` exactly when a timer is pending for it.
//! Reads additionally treat an entry past its deadline as absent, so a
//! timer that is late to run is never observable.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result, StoreError, StoreResult};
use crate::storage::expiry::{
    far_future, Cancellation, ExpirationScheduler, ExpiryStats, ExpiryTarget, KeySlot,
};
use crate::storage::glob::GlobPattern;
use crate::storage::notify::{
    ChannelGateway, EventKind, KeyspaceEvent, NoopGateway, NotificationGateway,
};
use crate::storage::region::{
    MemoryRegionFactory, Region, RegionEntry, RegionFactory, RegionListener,
};
use crate::storage::{DataType, KeyWrapper, Value};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

const REGION_COUNT: usize = DataType::STORABLE.len();

/// What a mutating write does to the key's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Full overwrite: drop any TTL and cancel its timer.
    Clear,
    /// Structural update: keep the existing deadline and timer.
    Keep,
    /// Store and expire after the given duration.
    Expire(Duration),
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key does not exist.
    Missing,
    /// The key exists without a TTL.
    Persistent,
    /// The key expires after this much time.
    Remaining(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Absent,
    Expired,
    Live(Option<Instant>),
}

fn presence_of(region: &dyn Region, key: &KeyWrapper, now: Instant) -> StoreResult<Presence> {
    let mut presence = Presence::Absent;
    region.inspect(key, &mut |entry| {
        presence = match entry {
            None => Presence::Absent,
            Some(e) if e.is_expired_at(now) => Presence::Expired,
            Some(e) => Presence::Live(e.expires_at),
        };
    })?;
    Ok(presence)
}

/// Routes key operations to per-type regions and drives key expiration.
///
/// Always handled through an `Arc`: the scheduler and the region
/// listeners hold weak references back to the provider.
pub struct RegionProvider {
    regions: [OnceLock<Arc<dyn Region>>; REGION_COUNT],
    factory: Arc<dyn RegionFactory>,
    scheduler: ExpirationScheduler,
    gateway: Arc<dyn NotificationGateway>,
    self_ref: Weak<RegionProvider>,
}

impl fmt::Debug for RegionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionProvider")
            .field("regions", &self.existing_regions().count())
            .field("keys", &self.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl RegionProvider {
    /// Creates a provider with in-memory regions and no cluster
    /// notifications. Must be called from within a tokio runtime.
    pub fn new(config: &EngineConfig) -> Result<Arc<Self>> {
        Self::with_gateway(config, Arc::new(NoopGateway))
    }

    /// Creates a provider with in-memory regions publishing to `gateway`.
    pub fn with_gateway(
        config: &EngineConfig,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let factory = Arc::new(MemoryRegionFactory::new(config.region_shards));
        Self::from_parts(config, runtime, factory, gateway)
    }

    /// Creates a provider publishing into a bounded channel sized by
    /// `config.notify_capacity`.
    pub fn with_channel(
        config: &EngineConfig,
    ) -> Result<(Arc<Self>, Arc<ChannelGateway>, mpsc::Receiver<KeyspaceEvent>)> {
        let (gateway, rx) = ChannelGateway::new(config.notify_capacity);
        let gateway = Arc::new(gateway);
        let provider = Self::with_gateway(config, gateway.clone())?;
        Ok((provider, gateway, rx))
    }

    /// Creates a provider from explicit collaborators. Timers run on `runtime`.
    pub fn from_parts(
        config: &EngineConfig,
        runtime: Handle,
        factory: Arc<dyn RegionFactory>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new_cyclic(|provider: &Weak<RegionProvider>| {
            let target: Weak<dyn ExpiryTarget> = provider.clone();
            Self {
                regions: Default::default(),
                factory,
                scheduler: ExpirationScheduler::new(target, runtime, config.scheduler_shards),
                gateway,
                self_ref: provider.clone(),
            }
        }))
    }

    // ========================================================================
    // ROUTING
    // ========================================================================

    /// Returns the backing region for `data_type`, creating it on first use.
    pub fn resolve_region(&self, data_type: DataType) -> Result<Arc<dyn Region>> {
        let slot = data_type
            .slot()
            .ok_or(EngineError::UnsupportedType(data_type))?;

        let region = self.regions[slot].get_or_init(|| {
            let region = self.factory.create_region(data_type);
            region.add_listener(Arc::new(InvalidationListener {
                provider: self.self_ref.clone(),
            }));
            debug!(region = region.name(), "Created region");
            region
        });
        Ok(Arc::clone(region))
    }

    fn existing_regions(&self) -> impl Iterator<Item = &Arc<dyn Region>> {
        self.regions.iter().filter_map(OnceLock::get)
    }

    /// Returns true if any region holds an entry for `key`, live or not.
    fn is_stored(&self, key: &KeyWrapper, now: Instant) -> Result<bool> {
        for region in self.existing_regions() {
            if presence_of(region.as_ref(), key, now)? != Presence::Absent {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Finds the region holding a live entry for `key`.
    fn locate(&self, key: &KeyWrapper, now: Instant) -> Result<Option<(DataType, Option<Instant>)>> {
        for region in self.existing_regions() {
            if let Presence::Live(deadline) = presence_of(region.as_ref(), key, now)? {
                return Ok(Some((region.data_type(), deadline)));
            }
        }
        Ok(None)
    }

    /// Returns the type of `key`, or `DataType::None` if it does not exist.
    pub fn get_type(&self, key: &KeyWrapper) -> Result<DataType> {
        Ok(self
            .locate(key, Instant::now())?
            .map(|(data_type, _)| data_type)
            .unwrap_or(DataType::None))
    }

    pub fn exists(&self, key: &KeyWrapper) -> Result<bool> {
        Ok(self.locate(key, Instant::now())?.is_some())
    }

    fn check_type(key: &KeyWrapper, expected: DataType, actual: DataType) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(EngineError::InvalidType {
                key: key.clone(),
                expected,
                actual,
            })
        }
    }

    // ========================================================================
    // REMOVAL
    // ========================================================================

    /// Removes `key` from the region for `data_type`.
    ///
    /// With `notify_only = false` the entry is deleted and a pending
    /// expiration captured for `data_type` is canceled, even when the entry
    /// was already gone; removing an absent key is otherwise a no-op. With
    /// `notify_only = true` the removal already happened in the backing
    /// store: nothing is deleted, a timer left without an entry is
    /// canceled, and a notification is published.
    ///
    /// Returns true if an entry was deleted.
    pub fn remove_key(&self, key: &KeyWrapper, data_type: DataType, notify_only: bool) -> Result<bool> {
        self.evict(key, data_type, notify_only, EventKind::Removed)
    }

    fn evict(
        &self,
        key: &KeyWrapper,
        data_type: DataType,
        notify_only: bool,
        kind: EventKind,
    ) -> Result<bool> {
        let region = self.resolve_region(data_type)?;

        if notify_only {
            self.scheduler.with_slot(key, |slot| -> Result<()> {
                if slot.data_type() == Some(data_type)
                    && presence_of(region.as_ref(), key, Instant::now())? == Presence::Absent
                {
                    slot.cancel();
                }
                Ok(())
            })?;
            self.publish(KeyspaceEvent::new(EventKind::RemovedDownstream, key.clone(), data_type));
            return Ok(false);
        }

        let removed = self.scheduler.with_slot(key, |slot| -> Result<bool> {
            let removed = region.remove(key)?.is_some();
            if slot.data_type() == Some(data_type) {
                slot.cancel();
            }
            Ok(removed)
        })?;

        if removed {
            self.publish(KeyspaceEvent::new(kind, key.clone(), data_type));
        }
        Ok(removed)
    }

    /// Deletes `key` whatever its type. Returns true if a live key was
    /// deleted; expired leftovers are purged but not counted.
    pub fn delete(&self, key: &KeyWrapper) -> Result<bool> {
        let mut events = Vec::new();
        let result = self.scheduler.with_slot(key, |slot| -> Result<bool> {
            let now = Instant::now();
            let mut deleted = false;

            for region in self.existing_regions() {
                let presence = presence_of(region.as_ref(), key, now)?;
                if presence == Presence::Absent || region.remove(key)?.is_none() {
                    continue;
                }

                let kind = if presence == Presence::Expired {
                    EventKind::Expired
                } else {
                    deleted = true;
                    EventKind::Removed
                };
                events.push(KeyspaceEvent::new(kind, key.clone(), region.data_type()));
            }
            slot.cancel();
            Ok(deleted)
        });

        self.publish_all(events);
        result
    }

    /// Drops every key in every region and cancels all pending timers.
    ///
    /// A write racing the flush may arm a timer after the first cancel pass
    /// and lose its entry to the clear; a second pass cancels such timers
    /// under each key's slot.
    pub fn flush(&self) -> Result<usize> {
        let mut canceled = self.scheduler.cancel_all();
        let mut cleared = 0;
        for region in self.existing_regions() {
            cleared += region.clear()?;
        }

        for key in self.scheduler.scheduled_keys() {
            let orphaned = self.scheduler.with_slot(&key, |slot| -> Result<bool> {
                if self.is_stored(&key, Instant::now())? {
                    return Ok(false);
                }
                Ok(slot.cancel().was_canceled())
            })?;
            if orphaned {
                canceled += 1;
            }
        }

        debug!(cleared, canceled, "Flushed all regions");
        self.publish(KeyspaceEvent::flushed());
        Ok(cleared)
    }

    // ========================================================================
    // EXPIRATION
    // ========================================================================

    /// Sets (or refreshes) the TTL of an existing key.
    ///
    /// The deadline is computed from "now" on every call. Returns the new
    /// absolute deadline.
    ///
    /// # Errors
    ///
    /// - `InvalidExpire` if `ttl_millis` is zero or negative
    /// - `KeyNotFound` if the key does not exist (nothing is scheduled)
    /// - `InvalidType` if the key holds a different type
    pub fn set_expiration(&self, key: &KeyWrapper, data_type: DataType, ttl_millis: i64) -> Result<Instant> {
        if ttl_millis <= 0 {
            return Err(EngineError::InvalidExpire(ttl_millis));
        }
        let ttl = Duration::from_millis(ttl_millis as u64);
        let region = self.resolve_region(data_type)?;

        self.scheduler.with_slot(key, |slot| -> Result<Instant> {
            let now = Instant::now();
            let deadline = now
                .checked_add(ttl)
                .ok_or(EngineError::InvalidExpire(ttl_millis))?;

            match self.locate(key, now)? {
                None => return Err(EngineError::KeyNotFound(key.clone())),
                Some((actual, _)) => Self::check_type(key, data_type, actual)?,
            }

            let mut present = false;
            region.update(key, &mut |entry| {
                if let Some(entry) = entry {
                    entry.expires_at = Some(deadline);
                    present = true;
                }
            })?;
            if !present {
                return Err(EngineError::KeyNotFound(key.clone()));
            }

            slot.schedule(data_type, deadline);
            debug!(key = %key, ttl_ms = ttl_millis, "Expiration set");
            Ok(deadline)
        })
    }

    /// Removes the TTL of `key` without touching its value.
    ///
    /// A no-op for absent keys. [`Cancellation::NotPending`] on an existing
    /// key means the timer had already fired and an eviction is in flight.
    pub fn clear_expiration(&self, key: &KeyWrapper, data_type: DataType) -> Result<Cancellation> {
        let region = self.resolve_region(data_type)?;

        self.scheduler.with_slot(key, |slot| -> Result<Cancellation> {
            let now = Instant::now();
            let Some((actual, _)) = self.locate(key, now)? else {
                return Ok(Cancellation::NotPending);
            };
            Self::check_type(key, data_type, actual)?;

            region.update(key, &mut |entry| {
                if let Some(entry) = entry {
                    entry.expires_at = None;
                }
            })?;
            Ok(slot.cancel())
        })
    }

    /// Remaining time to live of `key`.
    pub fn ttl(&self, key: &KeyWrapper) -> Result<TtlStatus> {
        let now = Instant::now();
        Ok(match self.locate(key, now)? {
            None => TtlStatus::Missing,
            Some((_, None)) => TtlStatus::Persistent,
            Some((_, Some(deadline))) => {
                TtlStatus::Remaining(deadline.saturating_duration_since(now))
            }
        })
    }

    /// Returns true if a timer is pending for `key`.
    pub fn is_scheduled(&self, key: &KeyWrapper) -> bool {
        self.scheduler.is_scheduled(key)
    }

    /// Number of keys with a pending timer.
    pub fn scheduled_count(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn expiry_stats(&self) -> ExpiryStats {
        self.scheduler.stats()
    }

    // ========================================================================
    // VALUE ACCESS
    // ========================================================================

    /// Runs `f` against the live value stored under `key`.
    ///
    /// `f` sees `None` if the key is absent or expired. Fails with
    /// `InvalidType` if the key holds another type.
    pub fn read<R>(
        &self,
        key: &KeyWrapper,
        data_type: DataType,
        f: impl FnOnce(Option<&Value>) -> R,
    ) -> Result<R> {
        let region = self.resolve_region(data_type)?;
        let now = Instant::now();

        let mut f = Some(f);
        let mut output = None;
        region.inspect(key, &mut |entry| {
            if let Some(entry) = entry.filter(|e| !e.is_expired_at(now)) {
                output = f.take().map(|f| f(Some(&entry.value)));
            }
        })?;

        let f = match (output, f) {
            (Some(output), _) => return Ok(output),
            (None, Some(f)) => f,
            (None, None) => return Err(StoreError::Offline(region.name().to_string()).into()),
        };

        match self.get_type(key)? {
            DataType::None => Ok(f(None)),
            actual => {
                Self::check_type(key, data_type, actual)?;
                Ok(f(None))
            }
        }
    }

    /// Mutates the value stored under `key` inside the key's exclusive
    /// section.
    ///
    /// `f` receives the live value (or `None`) and may replace, modify, or
    /// clear it. Leaving `None` or an empty container removes the key.
    /// `policy` decides what happens to the TTL of the stored result.
    /// If `f` fails, the value it left behind is stored with the TTL
    /// untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidType` if the key holds another type, or `f` produced a
    ///   value of the wrong type (which is discarded)
    /// - `InvalidExpire` for a zero `TtlPolicy::Expire`
    /// - whatever `f` returns
    pub fn write<R, F>(&self, key: &KeyWrapper, data_type: DataType, policy: TtlPolicy, f: F) -> Result<R>
    where
        F: FnOnce(&mut Option<Value>) -> Result<R>,
    {
        if let TtlPolicy::Expire(ttl) = policy {
            if ttl.is_zero() {
                return Err(EngineError::InvalidExpire(0));
            }
        }
        self.write_with(key, data_type, |slot| f(slot).map(|r| (r, policy)))
    }

    /// Like [`RegionProvider::write`], but `f` picks the TTL policy after
    /// seeing the current value. Conditional writes that end up changing
    /// nothing return `TtlPolicy::Keep`.
    ///
    /// A zero `TtlPolicy::Expire` stores nothing: the value is considered
    /// expired on arrival and the key is removed.
    pub fn write_with<R, F>(&self, key: &KeyWrapper, data_type: DataType, f: F) -> Result<R>
    where
        F: FnOnce(&mut Option<Value>) -> Result<(R, TtlPolicy)>,
    {
        let region = self.resolve_region(data_type)?;
        let mut events = Vec::new();

        let result = self.scheduler.with_slot(key, |slot| -> Result<R> {
            let now = Instant::now();
            self.purge_other_regions(key, data_type, now, slot, &mut events)?;

            let mut f = Some(f);
            let mut outcome: Option<Result<R>> = None;
            let mut purged = false;
            let mut existed = false;
            let mut rearm = false;
            let mut stored: Option<Option<Instant>> = None;

            region.update(key, &mut |entry| {
                let Some(f) = f.take() else { return };

                if entry.as_ref().is_some_and(|e| e.is_expired_at(now)) {
                    *entry = None;
                    purged = true;
                }
                existed = entry.is_some();
                let previous_deadline = entry.as_ref().and_then(|e| e.expires_at);
                let mut value = entry.take().map(|e| e.value);

                let result = f(&mut value).and_then(|r| match &value {
                    Some(v) if v.data_type() != data_type => Err(EngineError::InvalidType {
                        key: key.clone(),
                        expected: data_type,
                        actual: v.data_type(),
                    }),
                    _ => Ok(r),
                });

                let deadline = match &result {
                    Ok((_, TtlPolicy::Clear)) => None,
                    Ok((_, TtlPolicy::Expire(ttl))) if ttl.is_zero() => {
                        value = None;
                        None
                    }
                    Ok((_, TtlPolicy::Expire(ttl))) => {
                        rearm = true;
                        Some(now.checked_add(*ttl).unwrap_or_else(|| far_future(now)))
                    }
                    Ok((_, TtlPolicy::Keep)) | Err(_) => previous_deadline,
                };
                *entry = value
                    .filter(|v| v.data_type() == data_type && !v.is_empty_container())
                    .map(|value| RegionEntry {
                        value,
                        expires_at: deadline,
                    });
                stored = entry.as_ref().map(|e| e.expires_at);
                outcome = Some(result.map(|(r, _)| r));
            })?;

            let Some(result) = outcome else {
                return Err(StoreError::Offline(region.name().to_string()).into());
            };

            match stored {
                Some(Some(deadline)) if rearm => slot.schedule(data_type, deadline),
                Some(Some(_)) => {}
                Some(None) | None => {
                    slot.cancel();
                }
            }

            if purged {
                events.push(KeyspaceEvent::new(EventKind::Expired, key.clone(), data_type));
            }
            match (existed, stored.is_some()) {
                (false, true) => {
                    events.push(KeyspaceEvent::new(EventKind::Created, key.clone(), data_type));
                }
                (true, false) => {
                    events.push(KeyspaceEvent::new(EventKind::Removed, key.clone(), data_type));
                }
                _ => {}
            }
            result
        });

        self.publish_all(events);
        result
    }

    /// Fails if a live entry for `key` sits in a region other than
    /// `data_type`'s, and purges expired leftovers found there.
    fn purge_other_regions(
        &self,
        key: &KeyWrapper,
        data_type: DataType,
        now: Instant,
        slot: &mut KeySlot<'_>,
        events: &mut Vec<KeyspaceEvent>,
    ) -> Result<()> {
        for other in self.existing_regions() {
            if other.data_type() == data_type {
                continue;
            }
            match presence_of(other.as_ref(), key, now)? {
                Presence::Absent => {}
                Presence::Live(_) => Self::check_type(key, data_type, other.data_type())?,
                Presence::Expired => {
                    if other.remove(key)?.is_some() {
                        slot.cancel();
                        events.push(KeyspaceEvent::new(
                            EventKind::Expired,
                            key.clone(),
                            other.data_type(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // KEYSPACE
    // ========================================================================

    /// All live keys matching a glob pattern.
    ///
    /// **Warning**: scans every region.
    pub fn keys(&self, pattern: &[u8]) -> Result<Vec<KeyWrapper>> {
        let glob = GlobPattern::new(pattern);
        let now = Instant::now();
        let mut keys = Vec::new();

        for region in self.existing_regions() {
            for key in region.keys()? {
                if !glob.is_match_all() && !glob.matches(key.as_bytes()) {
                    continue;
                }
                if matches!(presence_of(region.as_ref(), &key, now)?, Presence::Live(_)) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    /// Number of stored entries across all regions.
    ///
    /// Approximate: includes expired entries whose timer has not run yet.
    pub fn len(&self) -> usize {
        self.existing_regions().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: KeyspaceEvent) {
        self.gateway.notify_members(event);
    }

    fn publish_all(&self, events: Vec<KeyspaceEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl ExpiryTarget for RegionProvider {
    fn remove_key(&self, key: &KeyWrapper, data_type: DataType, notify_only: bool) -> Result<bool> {
        self.evict(key, data_type, notify_only, EventKind::Expired)
    }
}

/// Forwards store-initiated removals back to the provider.
struct InvalidationListener {
    provider: Weak<RegionProvider>,
}

impl RegionListener for InvalidationListener {
    fn after_invalidate(&self, key: &KeyWrapper, data_type: DataType) {
        let Some(provider) = self.provider.upgrade() else {
            return;
        };
        if let Err(e) = provider.remove_key(key, data_type, true) {
            warn!(key = %key, error = %e, "Failed to publish downstream removal");
        }
    }
}

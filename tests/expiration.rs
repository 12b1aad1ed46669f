//! End-to-end expiration behavior through the public provider API.

use bytes::Bytes;
use regionkv::storage::{
    EventKind, KeyspaceEvent, MemoryRegion, NoopGateway, Region, RegionFactory, TtlStatus,
};
use regionkv::{DataType, EngineConfig, EngineError, KeyWrapper, RegionProvider, StoreError, TtlPolicy, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

fn config() -> EngineConfig {
    regionkv::logging::init_tracing("regionkv=debug");
    EngineConfig::default()
        .with_region_shards(4)
        .with_scheduler_shards(4)
}

fn set_string(provider: &RegionProvider, key: &KeyWrapper, value: &'static str) -> anyhow::Result<()> {
    provider.write(key, DataType::String, TtlPolicy::Clear, |slot| {
        *slot = Some(Value::String(Bytes::from_static(value.as_bytes())));
        Ok(())
    })?;
    Ok(())
}

fn get_string(provider: &RegionProvider, key: &KeyWrapper) -> anyhow::Result<Option<Bytes>> {
    Ok(provider.read(key, DataType::String, |v| {
        v.and_then(Value::as_string).cloned()
    })?)
}

fn kinds(rx: &mut mpsc::Receiver<KeyspaceEvent>) -> Vec<EventKind> {
    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    kinds
}

#[tokio::test(start_paused = true)]
async fn set_then_expire_evicts_key() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("a");

    set_string(&provider, &key, "1")?;
    provider.set_expiration(&key, DataType::String, 100)?;

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(provider.get_type(&key)?, DataType::None);
    assert!(!provider.is_scheduled(&key));
    assert_eq!(provider.expiry_stats().fired, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn overwrite_before_deadline_clears_ttl() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("a");

    set_string(&provider, &key, "1")?;
    provider.set_expiration(&key, DataType::String, 100)?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    set_string(&provider, &key, "2")?;

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(provider.get_type(&key)?, DataType::String);
    assert_eq!(get_string(&provider, &key)?, Some(Bytes::from("2")));
    assert_eq!(provider.ttl(&key)?, TtlStatus::Persistent);
    assert_eq!(provider.expiry_stats().fired, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expire_on_missing_key_schedules_nothing() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("ghost");

    let err = provider
        .set_expiration(&key, DataType::String, 100)
        .unwrap_err();
    assert_eq!(err, EngineError::KeyNotFound(key.clone()));
    assert!(!provider.is_scheduled(&key));
    assert_eq!(provider.scheduled_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancel_before_deadline_wins() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("a");

    set_string(&provider, &key, "1")?;
    provider.set_expiration(&key, DataType::String, 100)?;
    assert!(provider.clear_expiration(&key, DataType::String)?.was_canceled());

    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(get_string(&provider, &key)?, Some(Bytes::from("1")));
    let stats = provider.expiry_stats();
    assert_eq!(stats.fired, 0);
    assert_eq!(stats.canceled, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reschedule_moves_the_deadline() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("a");

    set_string(&provider, &key, "1")?;
    provider.set_expiration(&key, DataType::String, 100)?;
    provider.set_expiration(&key, DataType::String, 300)?;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(provider.get_type(&key)?, DataType::String);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(provider.get_type(&key)?, DataType::None);

    let stats = provider.expiry_stats();
    assert_eq!(stats.rescheduled, 1);
    assert_eq!(stats.fired, 1);
    Ok(())
}

#[tokio::test]
async fn remove_absent_key_is_noop() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;

    for data_type in DataType::STORABLE {
        assert!(!provider.remove_key(&KeyWrapper::from("nope"), data_type, false)?);
    }
    Ok(())
}

#[tokio::test]
async fn string_write_over_list_is_rejected() -> anyhow::Result<()> {
    let provider = RegionProvider::new(&config())?;
    let key = KeyWrapper::from("l");

    provider.write(&key, DataType::List, TtlPolicy::Keep, |slot| {
        *slot = Some(Value::List([Bytes::from("x"), Bytes::from("y")].into()));
        Ok(())
    })?;

    let err = provider
        .write(&key, DataType::String, TtlPolicy::Clear, |slot| {
            *slot = Some(Value::String(Bytes::from("s")));
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidType {
            expected: DataType::String,
            actual: DataType::List,
            ..
        }
    ));

    let list = provider.read(&key, DataType::List, |v| v.cloned())?;
    assert_eq!(
        list,
        Some(Value::List([Bytes::from("x"), Bytes::from("y")].into()))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn events_follow_the_key_lifecycle() -> anyhow::Result<()> {
    let (provider, gateway, mut rx) = RegionProvider::with_channel(&config())?;
    let key = KeyWrapper::from("a");

    set_string(&provider, &key, "1")?;
    provider.set_expiration(&key, DataType::String, 10)?;
    tokio::time::sleep(Duration::from_millis(20)).await;

    set_string(&provider, &key, "2")?;
    provider.delete(&key)?;
    provider.flush()?;

    assert_eq!(
        kinds(&mut rx),
        vec![
            EventKind::Created,
            EventKind::Expired,
            EventKind::Created,
            EventKind::Removed,
            EventKind::Flushed,
        ]
    );
    assert_eq!(gateway.sent(), 5);
    assert_eq!(gateway.dropped(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn store_invalidation_only_notifies() -> anyhow::Result<()> {
    let (provider, _gateway, mut rx) = RegionProvider::with_channel(&config())?;
    let key = KeyWrapper::from("a");
    set_string(&provider, &key, "1")?;
    kinds(&mut rx);

    let region = provider.resolve_region(DataType::String)?;
    assert!(region.invalidate(&key)?);

    assert_eq!(kinds(&mut rx), vec![EventKind::RemovedDownstream]);
    assert_eq!(provider.get_type(&key)?, DataType::None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn offline_region_surfaces_store_unavailable() -> anyhow::Result<()> {
    struct Shared(Arc<MemoryRegion>);

    impl RegionFactory for Shared {
        fn create_region(&self, data_type: DataType) -> Arc<dyn Region> {
            if data_type == DataType::String {
                self.0.clone()
            } else {
                Arc::new(MemoryRegion::new(data_type, 4))
            }
        }
    }

    let strings = Arc::new(MemoryRegion::new(DataType::String, 4));
    let provider = RegionProvider::from_parts(
        &config(),
        Handle::current(),
        Arc::new(Shared(strings.clone())),
        Arc::new(NoopGateway),
    )?;
    let key = KeyWrapper::from("a");
    set_string(&provider, &key, "1")?;

    strings.set_online(false);
    let err = provider
        .set_expiration(&key, DataType::String, 100)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::StoreUnavailable(StoreError::Offline(_))
    ));
    assert!(!provider.is_scheduled(&key));

    strings.set_online(true);
    assert_eq!(get_string(&provider, &key)?, Some(Bytes::from("1")));
    Ok(())
}

#[test]
fn provider_needs_a_runtime() {
    let err = RegionProvider::new(&EngineConfig::default()).unwrap_err();
    assert_eq!(err, EngineError::NoRuntime);
}

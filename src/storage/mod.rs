//! Storage Module
//!
//! Key identity, typed backing regions, and the expiration engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RegionProvider                         │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌────────┐ │
//! │  │ strings │ │  lists  │ │  sets   │ │ hashes  │ │  zsets │ │
//! │  │ Region  │ │ Region  │ │ Region  │ │ Region  │ │ Region │ │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘ └────────┘ │
//! └──────────────▲───────────────────────────────┬──────────────┘
//!                │ remove_key(key, type, false)   │ schedule / cancel
//!              ┌─┴────────────────────────────────▼─┐
//!              │        ExpirationScheduler         │
//!              │   (one tokio timer task per key)   │
//!              └────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Typed Regions**: one region per data type, created on first use
//! - **Per-Key Timers**: each TTL is an independent, cancelable task
//! - **Lazy Expiry**: entries past their deadline read as absent
//! - **Notifications**: keyspace events published to a pluggable gateway
//!
//! ## Example
//!
//! ```
//! use regionkv::config::EngineConfig;
//! use regionkv::storage::{DataType, KeyWrapper, RegionProvider, TtlPolicy, Value};
//! use bytes::Bytes;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> regionkv::Result<()> {
//! let provider = RegionProvider::new(&EngineConfig::default())?;
//! let key = KeyWrapper::from("name");
//!
//! provider.write(&key, DataType::String, TtlPolicy::Clear, |slot| {
//!     *slot = Some(Value::String(Bytes::from("Ariz")));
//!     Ok(())
//! })?;
//! provider.set_expiration(&key, DataType::String, 60_000)?;
//!
//! assert_eq!(provider.get_type(&key)?, DataType::String);
//! assert!(provider.is_scheduled(&key));
//! # Ok(())
//! # }
//! ```

pub mod data_type;
pub mod expiry;
pub mod glob;
pub mod key;
pub mod notify;
pub mod provider;
pub mod region;
pub mod value;

pub use data_type::DataType;
pub use expiry::{Cancellation, ExpirationScheduler, ExpiryStats, ExpiryTarget, KeySlot};
pub use glob::GlobPattern;
pub use key::KeyWrapper;
pub use notify::{ChannelGateway, EventKind, KeyspaceEvent, NoopGateway, NotificationGateway};
pub use provider::{RegionProvider, TtlPolicy, TtlStatus};
pub use region::{
    MemoryRegion, MemoryRegionFactory, Region, RegionEntry, RegionFactory, RegionListener,
};
pub use value::{SortedSet, Value};

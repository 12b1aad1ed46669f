//! # RegionKV - Redis-Style Keys over Typed Backing Regions
//!
//! RegionKV is the key/value layer of a Redis-compatible front end. Each
//! Redis data type lives in its own backing region; RegionKV decides which
//! region a key belongs to, enforces that a key has one type at a time,
//! and expires keys with per-key timers.
//!
//! ## Features
//!
//! - **Typed Regions**: strings, lists, sets, hashes and sorted sets each
//!   get a region, created on first use
//! - **Per-Key Expiration**: every TTL is its own cancelable tokio timer;
//!   there is no sweeper
//! - **Lazy Expiry**: a key past its deadline reads as absent even before
//!   its timer runs
//! - **Keyspace Notifications**: creations, removals and expirations are
//!   published to a pluggable gateway
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              RegionKV                                   │
//! │                                                                         │
//! │   decoded RESP command                                                  │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │  Command    │───>│               RegionProvider                 │    │
//! │  │  Handler    │    │  ┌────────┐ ┌──────┐ ┌─────┐ ┌──────┐ ┌─────┐ │    │
//! │  └─────────────┘    │  │strings │ │lists │ │sets │ │hashes│ │zsets│ │    │
//! │                     │  └────────┘ └──────┘ └─────┘ └──────┘ └─────┘ │    │
//! │                     └──────────────┬───────────────────▲───────────┘    │
//! │                                    │ schedule/cancel   │ remove_key     │
//! │                     ┌──────────────▼───────────────────┴───────────┐    │
//! │                     │           ExpirationScheduler                │    │
//! │                     │      (one tokio timer task per key)          │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use regionkv::{CommandHandler, EngineConfig, RegionProvider, RespValue};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> regionkv::Result<()> {
//! let provider = RegionProvider::new(&EngineConfig::from_env()?)?;
//! let handler = CommandHandler::new(provider);
//!
//! let reply = handler.execute(RespValue::command(["SET", "session", "abc", "EX", "60"]));
//! assert_eq!(reply, RespValue::ok());
//!
//! let reply = handler.execute(RespValue::command(["TTL", "session"]));
//! assert_eq!(reply, RespValue::integer(60));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: key identity, regions, the provider and the scheduler
//! - [`commands`]: executors for the supported Redis commands
//! - [`protocol`]: RESP reply values
//! - [`config`]: engine tuning, from code or the environment
//! - [`logging`]: tracing subscriber setup

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::EngineConfig;
pub use error::{EngineError, Result, StoreError};
pub use protocol::RespValue;
pub use storage::{DataType, KeyWrapper, RegionProvider, TtlPolicy, Value};

/// Version of RegionKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Engine configuration.
//!
//! Values come from [`EngineConfig::default`], optionally overridden from
//! the environment:
//!
//! | Variable                    | Field              | Default |
//! |-----------------------------|--------------------|---------|
//! | `REGIONKV_REGION_SHARDS`    | `region_shards`    | 64      |
//! | `REGIONKV_SCHEDULER_SHARDS` | `scheduler_shards` | 64      |
//! | `REGIONKV_NOTIFY_CAPACITY`  | `notify_capacity`  | 1024    |

use crate::error::ConfigError;
use crate::storage::expiry::DEFAULT_SCHEDULER_SHARDS;
use crate::storage::region::DEFAULT_REGION_SHARDS;

pub const ENV_REGION_SHARDS: &str = "REGIONKV_REGION_SHARDS";
pub const ENV_SCHEDULER_SHARDS: &str = "REGIONKV_SCHEDULER_SHARDS";
pub const ENV_NOTIFY_CAPACITY: &str = "REGIONKV_NOTIFY_CAPACITY";

/// Default capacity of the notification channel.
pub const DEFAULT_NOTIFY_CAPACITY: usize = 1024;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Shards per backing region
    pub region_shards: usize,
    /// Shards in the scheduler's task table
    pub scheduler_shards: usize,
    /// Capacity of the keyspace notification channel
    pub notify_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region_shards: DEFAULT_REGION_SHARDS,
            scheduler_shards: DEFAULT_SCHEDULER_SHARDS,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from the process environment and validates the result.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`EngineConfig::from_env`], with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_usize(&lookup, ENV_REGION_SHARDS)? {
            config.region_shards = v;
        }
        if let Some(v) = read_usize(&lookup, ENV_SCHEDULER_SHARDS)? {
            config.scheduler_shards = v;
        }
        if let Some(v) = read_usize(&lookup, ENV_NOTIFY_CAPACITY)? {
            config.notify_capacity = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_region_shards(mut self, shards: usize) -> Self {
        self.region_shards = shards;
        self
    }

    pub fn with_scheduler_shards(mut self, shards: usize) -> Self {
        self.scheduler_shards = shards;
        self
    }

    pub fn with_notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = capacity;
        self
    }

    /// Checks that shard counts are powers of two >= 2 and the channel
    /// capacity is non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_shards("region_shards", self.region_shards)?;
        check_shards("scheduler_shards", self.scheduler_shards)?;
        if self.notify_capacity == 0 {
            return Err(ConfigError::Zero {
                name: "notify_capacity",
            });
        }
        Ok(())
    }
}

fn check_shards(name: &'static str, value: usize) -> Result<(), ConfigError> {
    if value < 2 || !value.is_power_of_two() {
        return Err(ConfigError::NotPowerOfTwo { name, value });
    }
    Ok(())
}

fn read_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<usize>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value: raw }),
    }
}

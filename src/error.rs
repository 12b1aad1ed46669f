//! Error types for the engine.
//!
//! [`EngineError`] is what command executors see. Backing-store failures
//! arrive as [`StoreError`] and are folded into
//! [`EngineError::StoreUnavailable`]; the engine never retries them.
//! Races inside the scheduler (cancel after fire) are not errors and are
//! reported through [`crate::storage::Cancellation`] instead.

use crate::protocol::RespValue;
use crate::storage::{DataType, KeyWrapper};
use thiserror::Error;

/// Errors surfaced by the region provider and command executors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The operation needs an existing key.
    #[error("no such key: {0}")]
    KeyNotFound(KeyWrapper),

    /// The declared type does not match the type the key currently holds.
    #[error("wrong type for key {key}: expected {expected}, found {actual}")]
    InvalidType {
        key: KeyWrapper,
        expected: DataType,
        actual: DataType,
    },

    /// A TTL that is zero, negative, or too large to represent.
    #[error("invalid expire time: {0}")]
    InvalidExpire(i64),

    /// The backing region failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The data type has no backing region (`DataType::None`).
    #[error("data type {0} has no backing region")]
    UnsupportedType(DataType),

    /// The engine was built from an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Scheduling needs a tokio runtime and none was available.
    #[error("no tokio runtime available for the expiration scheduler")]
    NoRuntime,
}

impl EngineError {
    /// Converts the error into the reply sent back to a client.
    ///
    /// `command` is the lower-case command name used in Redis-style messages.
    pub fn to_resp(&self, command: &str) -> RespValue {
        match self {
            EngineError::KeyNotFound(_) => RespValue::error("ERR no such key"),
            EngineError::InvalidType { .. } => RespValue::error(
                "WRONGTYPE Operation against a key holding the wrong kind of value",
            ),
            EngineError::InvalidExpire(_) => RespValue::error(format!(
                "ERR invalid expire time in '{}' command",
                command
            )),
            EngineError::StoreUnavailable(e) => RespValue::error(format!("ERR {}", e)),
            EngineError::UnsupportedType(t) => {
                RespValue::error(format!("ERR unsupported data type '{}'", t))
            }
            EngineError::Config(e) => RespValue::error(format!("ERR {}", e)),
            EngineError::NoRuntime => RespValue::error("ERR expiration scheduler unavailable"),
        }
    }
}

/// Failures reported by a backing region.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The region is offline (failover, redistribution, shutdown).
    #[error("region {0} is offline")]
    Offline(String),

    /// A shard lock was poisoned by a panicking writer.
    #[error("region {0} is corrupted: lock poisoned")]
    Poisoned(String),
}

/// Invalid engine configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a power of two >= 2, got {value}")]
    NotPowerOfTwo { name: &'static str, value: usize },

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
}

/// Convenience Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type returned by backing regions.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrongtype_reply() {
        let err = EngineError::InvalidType {
            key: KeyWrapper::from("k"),
            expected: DataType::String,
            actual: DataType::List,
        };
        assert_eq!(
            err.to_resp("set"),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
        assert!(err.to_string().contains("expected string, found list"));
    }

    #[test]
    fn test_store_error_converts() {
        let err: EngineError = StoreError::Offline("__redis_lists".into()).into();
        assert!(matches!(err, EngineError::StoreUnavailable(_)));
        assert_eq!(
            err.to_resp("lpush"),
            RespValue::error("ERR region __redis_lists is offline")
        );
    }

    #[test]
    fn test_invalid_expire_reply_names_command() {
        let err = EngineError::InvalidExpire(-5);
        assert_eq!(
            err.to_resp("expire"),
            RespValue::error("ERR invalid expire time in 'expire' command")
        );
    }
}

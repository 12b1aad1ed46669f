//! Command dispatch and argument helpers.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│ dispatch()  │───>│   cmd_*()   │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      RegionProvider         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The executors themselves live next door, one file per data type.

use crate::error::Result;
use crate::protocol::RespValue;
use crate::storage::{KeyWrapper, RegionProvider};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// Executes decoded commands against a [`RegionProvider`].
#[derive(Clone)]
pub struct CommandHandler {
    pub(super) provider: Arc<RegionProvider>,
}

impl CommandHandler {
    pub fn new(provider: Arc<RegionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<RegionProvider> {
        &self.provider
    }

    /// Executes a command and returns the reply.
    ///
    /// `command` must be an array whose first element is the command name.
    pub fn execute(&self, command: RespValue) -> RespValue {
        let args = match command {
            RespValue::Array(args) => args,
            _ => {
                return RespValue::error("ERR invalid command format");
            }
        };

        if args.is_empty() {
            return RespValue::error("ERR empty command");
        }

        let cmd_name = match &args[0] {
            RespValue::BulkString(s) => match std::str::from_utf8(s) {
                Ok(s) => s.to_uppercase(),
                Err(_) => return RespValue::error("ERR invalid command name"),
            },
            RespValue::SimpleString(s) => s.to_uppercase(),
            _ => return RespValue::error("ERR invalid command name"),
        };

        trace!(command = %cmd_name, args = args.len() - 1, "Executing command");
        self.dispatch(&cmd_name, &args[1..])
    }

    fn dispatch(&self, cmd: &str, args: &[RespValue]) -> RespValue {
        match cmd {
            // String commands
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "SETNX" => self.cmd_setnx(args),
            "SETEX" => self.cmd_setex(args, 1000, "setex"),
            "PSETEX" => self.cmd_setex(args, 1, "psetex"),
            "GETSET" => self.cmd_getset(args),
            "APPEND" => self.cmd_append(args),
            "STRLEN" => self.cmd_strlen(args),
            "INCR" => self.cmd_incr_by(args, Some(1), "incr"),
            "DECR" => self.cmd_incr_by(args, Some(-1), "decr"),
            "INCRBY" => self.cmd_incr_by(args, None, "incrby"),
            "DECRBY" => self.cmd_decrby(args),

            // List commands
            "LPUSH" => self.cmd_push(args, true, "lpush"),
            "RPUSH" => self.cmd_push(args, false, "rpush"),
            "LPOP" => self.cmd_pop(args, true, "lpop"),
            "RPOP" => self.cmd_pop(args, false, "rpop"),
            "LLEN" => self.cmd_llen(args),
            "LINDEX" => self.cmd_lindex(args),
            "LRANGE" => self.cmd_lrange(args),

            // Set commands
            "SADD" => self.cmd_sadd(args),
            "SREM" => self.cmd_srem(args),
            "SMEMBERS" => self.cmd_smembers(args),
            "SISMEMBER" => self.cmd_sismember(args),
            "SCARD" => self.cmd_scard(args),

            // Hash commands
            "HSET" => self.cmd_hset(args),
            "HGET" => self.cmd_hget(args),
            "HDEL" => self.cmd_hdel(args),
            "HGETALL" => self.cmd_hgetall(args),
            "HLEN" => self.cmd_hlen(args),
            "HEXISTS" => self.cmd_hexists(args),

            // Sorted set commands
            "ZADD" => self.cmd_zadd(args),
            "ZREM" => self.cmd_zrem(args),
            "ZSCORE" => self.cmd_zscore(args),
            "ZCARD" => self.cmd_zcard(args),
            "ZRANGE" => self.cmd_zrange(args),

            // Key commands
            "DEL" => self.cmd_del(args),
            "EXISTS" => self.cmd_exists(args),
            "TYPE" => self.cmd_type(args),
            "KEYS" => self.cmd_keys(args),
            "EXPIRE" => self.cmd_expire(args, 1000, false, "expire"),
            "PEXPIRE" => self.cmd_expire(args, 1, false, "pexpire"),
            "EXPIREAT" => self.cmd_expire(args, 1000, true, "expireat"),
            "PEXPIREAT" => self.cmd_expire(args, 1, true, "pexpireat"),
            "TTL" => self.cmd_ttl(args, false),
            "PTTL" => self.cmd_ttl(args, true),
            "PERSIST" => self.cmd_persist(args),

            // Server commands
            "PING" => self.cmd_ping(args),
            "ECHO" => self.cmd_echo(args),
            "DBSIZE" => self.cmd_dbsize(args),
            "FLUSHDB" | "FLUSHALL" => self.cmd_flushdb(args),

            _ => RespValue::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    // ========================================================================
    // Helper functions
    // ========================================================================

    /// Extracts a Bytes value from a RespValue.
    pub(super) fn get_bytes(&self, value: &RespValue) -> Option<Bytes> {
        match value {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        }
    }

    pub(super) fn get_key(&self, value: &RespValue) -> Option<KeyWrapper> {
        self.get_bytes(value).map(KeyWrapper::from)
    }

    pub(super) fn get_string(&self, value: &RespValue) -> Option<String> {
        match value {
            RespValue::BulkString(b) => std::str::from_utf8(b).ok().map(|s| s.to_string()),
            RespValue::SimpleString(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub(super) fn get_integer(&self, value: &RespValue) -> Option<i64> {
        match value {
            RespValue::Integer(n) => Some(*n),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok().and_then(|s| s.parse().ok()),
            RespValue::SimpleString(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Parses a float argument; NaN is rejected.
    pub(super) fn get_float(&self, value: &RespValue) -> Option<f64> {
        let parsed: f64 = match value {
            RespValue::Integer(n) => *n as f64,
            _ => parse_float(self.get_string(value)?.as_str())?,
        };
        (!parsed.is_nan()).then_some(parsed)
    }

    /// Turns an engine result into a reply, mapping errors the Redis way.
    pub(super) fn reply<T>(
        &self,
        command: &str,
        result: Result<T>,
        f: impl FnOnce(T) -> RespValue,
    ) -> RespValue {
        match result {
            Ok(v) => f(v),
            Err(e) => e.to_resp(command),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            RespValue::pong()
        } else {
            match self.get_bytes(&args[0]) {
                Some(msg) => RespValue::bulk_string(msg),
                None => RespValue::pong(),
            }
        }
    }

    /// ECHO message
    fn cmd_echo(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("echo");
        }

        match self.get_bytes(&args[0]) {
            Some(msg) => RespValue::bulk_string(msg),
            None => RespValue::error("ERR invalid message"),
        }
    }

    /// DBSIZE
    fn cmd_dbsize(&self, _args: &[RespValue]) -> RespValue {
        RespValue::integer(self.provider.len() as i64)
    }

    /// FLUSHDB / FLUSHALL
    fn cmd_flushdb(&self, _args: &[RespValue]) -> RespValue {
        let result = self.provider.flush();
        self.reply("flushdb", result, |_| RespValue::ok())
    }
}

/// Accepts Redis spellings of infinity alongside plain floats.
fn parse_float(s: &str) -> Option<f64> {
    match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

/// Resolves Redis-style inclusive `start..=stop` indices (negative counts
/// from the end) against a collection of `len` items.
pub(super) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

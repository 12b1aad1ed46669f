//! Command Executors
//!
//! Receives already-decoded commands, runs them against the
//! [`RegionProvider`](crate::storage::RegionProvider), and returns replies.
//!
//! ## TTL policy
//!
//! Full overwrites (`SET`, `GETSET`, `SETNX`) drop any TTL; `SETEX`/`PSETEX`
//! and `SET EX|PX` replace it. Structural updates (`APPEND`, `INCR*`, list,
//! set, hash and sorted set mutations) keep it. `SET ... KEEPTTL` keeps it
//! explicitly.
//!
//! ## Supported Commands
//!
//! ### String Commands
//! - `SET key value [EX seconds|PX milliseconds|KEEPTTL] [NX|XX] [GET]`
//! - `GET`, `SETNX`, `SETEX`, `PSETEX`, `GETSET`
//! - `APPEND`, `STRLEN`, `INCR`, `INCRBY`, `DECR`, `DECRBY`
//!
//! ### List Commands
//! - `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LLEN`, `LINDEX`, `LRANGE`
//!
//! ### Set Commands
//! - `SADD`, `SREM`, `SMEMBERS`, `SISMEMBER`, `SCARD`
//!
//! ### Hash Commands
//! - `HSET`, `HGET`, `HDEL`, `HGETALL`, `HLEN`, `HEXISTS`
//!
//! ### Sorted Set Commands
//! - `ZADD`, `ZREM`, `ZSCORE`, `ZCARD`, `ZRANGE [WITHSCORES]`
//!
//! ### Key Commands
//! - `DEL`, `EXISTS`, `TYPE`, `KEYS`
//! - `EXPIRE`, `PEXPIRE`, `EXPIREAT`, `PEXPIREAT`
//! - `TTL`, `PTTL`, `PERSIST`
//!
//! ### Server Commands
//! - `PING`, `ECHO`, `DBSIZE`, `FLUSHDB`, `FLUSHALL`

pub mod handler;
mod hash;
mod keys;
mod list;
mod set;
mod string;
mod zset;

pub use handler::CommandHandler;

#[cfg(test)]
pub(crate) fn create_handler() -> CommandHandler {
    use crate::config::EngineConfig;
    use crate::storage::RegionProvider;

    let config = EngineConfig::default()
        .with_region_shards(4)
        .with_scheduler_shards(4);
    CommandHandler::new(RegionProvider::new(&config).unwrap())
}

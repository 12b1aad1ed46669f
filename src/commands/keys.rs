//! Type-agnostic key commands and TTL management.

use super::CommandHandler;
use crate::error::EngineError;
use crate::protocol::RespValue;
use crate::storage::{DataType, KeyWrapper, TtlStatus};
use std::time::{SystemTime, UNIX_EPOCH};

impl CommandHandler {
    fn keys_arg(&self, args: &[RespValue]) -> Option<Vec<KeyWrapper>> {
        args.iter().map(|a| self.get_key(a)).collect()
    }

    /// DEL key [key ...]
    pub(super) fn cmd_del(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return RespValue::wrong_arity("del");
        }

        let keys = match self.keys_arg(args) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let mut deleted = 0;
        for key in &keys {
            match self.provider.delete(key) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => return e.to_resp("del"),
            }
        }
        RespValue::integer(deleted)
    }

    /// EXISTS key [key ...]
    ///
    /// A key named twice is counted twice.
    pub(super) fn cmd_exists(&self, args: &[RespValue]) -> RespValue {
        if args.is_empty() {
            return RespValue::wrong_arity("exists");
        }

        let keys = match self.keys_arg(args) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let mut count = 0;
        for key in &keys {
            match self.provider.exists(key) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => return e.to_resp("exists"),
            }
        }
        RespValue::integer(count)
    }

    /// TYPE key
    pub(super) fn cmd_type(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("type");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.get_type(&key);
        self.reply("type", result, |t| RespValue::simple_string(t.as_str()))
    }

    /// KEYS pattern
    pub(super) fn cmd_keys(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("keys");
        }

        let pattern = match self.get_bytes(&args[0]) {
            Some(p) => p,
            None => return RespValue::error("ERR invalid pattern"),
        };

        let result = self.provider.keys(&pattern);
        self.reply("keys", result, |mut keys| {
            keys.sort();
            RespValue::key_array(keys)
        })
    }

    /// EXPIRE / PEXPIRE key ttl, EXPIREAT / PEXPIREAT key timestamp
    ///
    /// `unit_ms` scales the argument to milliseconds; `absolute` treats it
    /// as a unix timestamp. Replies `:1` when the TTL was set and `:0` when
    /// the key does not exist.
    pub(super) fn cmd_expire(
        &self,
        args: &[RespValue],
        unit_ms: i64,
        absolute: bool,
        name: &str,
    ) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity(name);
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let amount = match self.get_integer(&args[1]) {
            Some(n) => n,
            None => return RespValue::not_an_integer(),
        };

        let Some(mut ttl_ms) = amount.checked_mul(unit_ms) else {
            return EngineError::InvalidExpire(amount).to_resp(name);
        };
        if absolute {
            ttl_ms = ttl_ms.saturating_sub(unix_millis());
        }
        if ttl_ms <= 0 {
            return EngineError::InvalidExpire(ttl_ms).to_resp(name);
        }

        let data_type = match self.provider.get_type(&key) {
            Ok(DataType::None) => return RespValue::integer(0),
            Ok(t) => t,
            Err(e) => return e.to_resp(name),
        };

        match self.provider.set_expiration(&key, data_type, ttl_ms) {
            Ok(_) => RespValue::integer(1),
            // lost a race with an eviction or a delete
            Err(EngineError::KeyNotFound(_)) => RespValue::integer(0),
            Err(e) => e.to_resp(name),
        }
    }

    /// TTL key / PTTL key
    ///
    /// `-2` if the key does not exist, `-1` if it has no TTL.
    pub(super) fn cmd_ttl(&self, args: &[RespValue], millis: bool) -> RespValue {
        let name = if millis { "pttl" } else { "ttl" };
        if args.len() != 1 {
            return RespValue::wrong_arity(name);
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.ttl(&key);
        self.reply(name, result, |status| match status {
            TtlStatus::Missing => RespValue::integer(-2),
            TtlStatus::Persistent => RespValue::integer(-1),
            TtlStatus::Remaining(left) => {
                let ms = i64::try_from(left.as_millis()).unwrap_or(i64::MAX);
                if millis {
                    RespValue::integer(ms)
                } else {
                    RespValue::integer(ms.saturating_add(500) / 1000)
                }
            }
        })
    }

    /// PERSIST key
    pub(super) fn cmd_persist(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("persist");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let data_type = match self.provider.get_type(&key) {
            Ok(DataType::None) => return RespValue::integer(0),
            Ok(t) => t,
            Err(e) => return e.to_resp("persist"),
        };

        let result = self.provider.clear_expiration(&key, data_type);
        self.reply("persist", result, |c| RespValue::boolean(c.was_canceled()))
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

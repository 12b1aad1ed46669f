//! String commands.

use super::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::{DataType, TtlPolicy, Value};
use bytes::{Bytes, BytesMut};
use std::time::Duration;

impl CommandHandler {
    /// SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX | XX] [GET]
    pub(super) fn cmd_set(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity("set");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let value = match self.get_bytes(&args[1]) {
            Some(v) => v,
            None => return RespValue::error("ERR invalid value"),
        };

        let mut ttl: Option<Duration> = None;
        let mut keep_ttl = false;
        let mut nx = false;
        let mut xx = false;
        let mut get = false;

        let mut i = 2;
        while i < args.len() {
            let opt = match self.get_string(&args[i]) {
                Some(s) => s.to_uppercase(),
                None => return RespValue::syntax_error(),
            };

            match opt.as_str() {
                "EX" | "PX" => {
                    i += 1;
                    if i >= args.len() || ttl.is_some() || keep_ttl {
                        return RespValue::syntax_error();
                    }
                    let amount = match self.get_integer(&args[i]) {
                        Some(n) => n,
                        None => return RespValue::not_an_integer(),
                    };
                    if amount <= 0 {
                        return RespValue::error("ERR invalid expire time in 'set' command");
                    }
                    ttl = Some(if opt == "EX" {
                        Duration::from_secs(amount as u64)
                    } else {
                        Duration::from_millis(amount as u64)
                    });
                }
                "KEEPTTL" if ttl.is_none() => keep_ttl = true,
                "NX" if !xx => nx = true,
                "XX" if !nx => xx = true,
                "GET" => get = true,
                _ => return RespValue::syntax_error(),
            }
            i += 1;
        }

        let policy = match ttl {
            Some(ttl) => TtlPolicy::Expire(ttl),
            None if keep_ttl => TtlPolicy::Keep,
            None => TtlPolicy::Clear,
        };

        let result = self.provider.write_with(&key, DataType::String, |slot| {
            let old = slot.as_ref().and_then(Value::as_string).cloned();
            let exists = slot.is_some();
            if (nx && exists) || (xx && !exists) {
                return Ok(((false, old), TtlPolicy::Keep));
            }
            *slot = Some(Value::String(value));
            Ok(((true, old), policy))
        });

        self.reply("set", result, |(applied, old)| match (get, applied) {
            (true, _) => RespValue::optional(old),
            (false, true) => RespValue::ok(),
            (false, false) => RespValue::null(),
        })
    }

    /// GET key
    pub(super) fn cmd_get(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("get");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::String, |v| {
            v.and_then(Value::as_string).cloned()
        });
        self.reply("get", result, RespValue::optional)
    }

    /// SETNX key value
    pub(super) fn cmd_setnx(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("setnx");
        }

        let (key, value) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(v)) => (k, v),
            _ => return RespValue::error("ERR invalid key or value"),
        };

        let result = self.provider.write_with(&key, DataType::String, |slot| {
            if slot.is_some() {
                return Ok((false, TtlPolicy::Keep));
            }
            *slot = Some(Value::String(value));
            Ok((true, TtlPolicy::Clear))
        });
        self.reply("setnx", result, RespValue::boolean)
    }

    /// SETEX key seconds value / PSETEX key milliseconds value
    pub(super) fn cmd_setex(&self, args: &[RespValue], unit_ms: u64, name: &str) -> RespValue {
        if args.len() != 3 {
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
        if amount <= 0 {
            return RespValue::error(format!("ERR invalid expire time in '{}' command", name));
        }
        let ttl = Duration::from_millis((amount as u64).saturating_mul(unit_ms));

        let value = match self.get_bytes(&args[2]) {
            Some(v) => v,
            None => return RespValue::error("ERR invalid value"),
        };

        let result = self
            .provider
            .write(&key, DataType::String, TtlPolicy::Expire(ttl), |slot| {
                *slot = Some(Value::String(value));
                Ok(())
            });
        self.reply(name, result, |_| RespValue::ok())
    }

    /// GETSET key value
    pub(super) fn cmd_getset(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("getset");
        }

        let (key, value) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(v)) => (k, v),
            _ => return RespValue::error("ERR invalid key or value"),
        };

        let result = self
            .provider
            .write(&key, DataType::String, TtlPolicy::Clear, |slot| {
                let old = slot.as_ref().and_then(Value::as_string).cloned();
                *slot = Some(Value::String(value));
                Ok(old)
            });
        self.reply("getset", result, RespValue::optional)
    }

    /// APPEND key value
    pub(super) fn cmd_append(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("append");
        }

        let (key, suffix) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(v)) => (k, v),
            _ => return RespValue::error("ERR invalid key or value"),
        };

        let result = self
            .provider
            .write(&key, DataType::String, TtlPolicy::Keep, |slot| {
                let joined = match slot.as_ref().and_then(Value::as_string) {
                    Some(current) => {
                        let mut buf = BytesMut::with_capacity(current.len() + suffix.len());
                        buf.extend_from_slice(current);
                        buf.extend_from_slice(&suffix);
                        buf.freeze()
                    }
                    None => suffix,
                };
                let len = joined.len();
                *slot = Some(Value::String(joined));
                Ok(len)
            });
        self.reply("append", result, |len| RespValue::integer(len as i64))
    }

    /// STRLEN key
    pub(super) fn cmd_strlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("strlen");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::String, |v| {
            v.and_then(Value::as_string).map(|s| s.len()).unwrap_or(0)
        });
        self.reply("strlen", result, |len| RespValue::integer(len as i64))
    }

    /// INCR key / DECR key / INCRBY key increment
    ///
    /// `fixed` is the delta for INCR and DECR; INCRBY reads it from `args`.
    pub(super) fn cmd_incr_by(&self, args: &[RespValue], fixed: Option<i64>, name: &str) -> RespValue {
        let expected = if fixed.is_some() { 1 } else { 2 };
        if args.len() != expected {
            return RespValue::wrong_arity(name);
        }

        let delta = match fixed {
            Some(d) => d,
            None => match self.get_integer(&args[1]) {
                Some(d) => d,
                None => return RespValue::not_an_integer(),
            },
        };
        self.incr(args, delta, name)
    }

    /// DECRBY key decrement
    pub(super) fn cmd_decrby(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("decrby");
        }

        let delta = match self.get_integer(&args[1]).and_then(i64::checked_neg) {
            Some(d) => d,
            None => return RespValue::not_an_integer(),
        };
        self.incr(args, delta, "decrby")
    }

    fn incr(&self, args: &[RespValue], delta: i64, name: &str) -> RespValue {
        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self
            .provider
            .write(&key, DataType::String, TtlPolicy::Keep, |slot| {
                let current = match slot.as_ref().and_then(Value::as_string) {
                    Some(bytes) => match std::str::from_utf8(bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
                        Some(n) => n,
                        None => return Ok(Err(RespValue::not_an_integer())),
                    },
                    None => 0,
                };

                let Some(next) = current.checked_add(delta) else {
                    return Ok(Err(RespValue::error(
                        "ERR increment or decrement would overflow",
                    )));
                };
                *slot = Some(Value::String(Bytes::from(next.to_string())));
                Ok(Ok(next))
            });

        self.reply(name, result, |outcome| match outcome {
            Ok(n) => RespValue::integer(n),
            Err(reply) => reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::create_handler;
    use crate::protocol::RespValue;
    use crate::storage::{KeyWrapper, TtlStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["SET", "key", "value"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(RespValue::command(["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string("value"));

        let response = handler.execute(RespValue::command(["GET", "nonexistent"]));
        assert_eq!(response, RespValue::null());
    }

    #[tokio::test]
    async fn test_set_with_options() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["SET", "key", "value", "NX"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(RespValue::command(["SET", "key", "newvalue", "NX"]));
        assert_eq!(response, RespValue::null());

        let response = handler.execute(RespValue::command(["SET", "key", "newvalue", "XX"]));
        assert_eq!(response, RespValue::ok());

        let response = handler.execute(RespValue::command(["SET", "other", "v", "XX"]));
        assert_eq!(response, RespValue::null());

        let response = handler.execute(RespValue::command(["SET", "key", "third", "GET"]));
        assert_eq!(response, RespValue::bulk_string("newvalue"));

        let response = handler.execute(RespValue::command(["SET", "key", "v", "NX", "XX"]));
        assert_eq!(response, RespValue::syntax_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ttl_options() {
        let handler = create_handler();
        let key = KeyWrapper::from("key");

        handler.execute(RespValue::command(["SET", "key", "v", "PX", "100"]));
        assert!(handler.provider().is_scheduled(&key));

        // KEEPTTL keeps the timer, a plain SET drops it
        handler.execute(RespValue::command(["SET", "key", "v2", "KEEPTTL"]));
        assert!(handler.provider().is_scheduled(&key));
        handler.execute(RespValue::command(["SET", "key", "v3"]));
        assert!(!handler.provider().is_scheduled(&key));
        assert_eq!(handler.provider().ttl(&key).unwrap(), TtlStatus::Persistent);

        let response = handler.execute(RespValue::command(["SET", "key", "v", "EX", "0"]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'set' command")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_nx_keeps_ttl() {
        let handler = create_handler();
        let key = KeyWrapper::from("key");

        handler.execute(RespValue::command(["SET", "key", "v", "EX", "10"]));
        let response = handler.execute(RespValue::command(["SETNX", "key", "other"]));
        assert_eq!(response, RespValue::integer(0));
        assert!(handler.provider().is_scheduled(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_setex_expires() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["PSETEX", "k", "50", "v"]));
        assert_eq!(response, RespValue::ok());
        assert_eq!(
            handler.execute(RespValue::command(["GET", "k"])),
            RespValue::bulk_string("v")
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(handler.execute(RespValue::command(["GET", "k"])), RespValue::null());

        let response = handler.execute(RespValue::command(["SETEX", "k", "-1", "v"]));
        assert_eq!(
            response,
            RespValue::error("ERR invalid expire time in 'setex' command")
        );
    }

    #[tokio::test]
    async fn test_getset() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["GETSET", "k", "a"]));
        assert_eq!(response, RespValue::null());
        let response = handler.execute(RespValue::command(["GETSET", "k", "b"]));
        assert_eq!(response, RespValue::bulk_string("a"));
    }

    #[tokio::test]
    async fn test_append() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["APPEND", "key", "Hello"]));
        assert_eq!(response, RespValue::integer(5));

        let response = handler.execute(RespValue::command(["APPEND", "key", " World"]));
        assert_eq!(response, RespValue::integer(11));

        let response = handler.execute(RespValue::command(["GET", "key"]));
        assert_eq!(response, RespValue::bulk_string("Hello World"));

        let response = handler.execute(RespValue::command(["STRLEN", "key"]));
        assert_eq!(response, RespValue::integer(11));
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let handler = create_handler();

        let response = handler.execute(RespValue::command(["INCR", "counter"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(RespValue::command(["INCR", "counter"]));
        assert_eq!(response, RespValue::integer(2));

        let response = handler.execute(RespValue::command(["DECR", "counter"]));
        assert_eq!(response, RespValue::integer(1));

        let response = handler.execute(RespValue::command(["INCRBY", "counter", "10"]));
        assert_eq!(response, RespValue::integer(11));

        let response = handler.execute(RespValue::command(["DECRBY", "counter", "20"]));
        assert_eq!(response, RespValue::integer(-9));
    }

    #[tokio::test]
    async fn test_incr_rejects_non_integers() {
        let handler = create_handler();
        handler.execute(RespValue::command(["SET", "k", "abc"]));

        let response = handler.execute(RespValue::command(["INCR", "k"]));
        assert_eq!(response, RespValue::not_an_integer());
        assert_eq!(
            handler.execute(RespValue::command(["GET", "k"])),
            RespValue::bulk_string("abc")
        );

        handler.execute(RespValue::command(["SET", "max", "9223372036854775807"]));
        let response = handler.execute(RespValue::command(["INCR", "max"]));
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_set_on_list_is_wrongtype() {
        let handler = create_handler();
        handler.execute(RespValue::command(["RPUSH", "l", "a"]));

        let response = handler.execute(RespValue::command(["SET", "l", "x"]));
        assert_eq!(
            response,
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
        assert_eq!(
            handler.execute(RespValue::command(["GET", "l"])),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
        assert_eq!(handler.execute(RespValue::command(["LLEN", "l"])), RespValue::integer(1));
    }
}

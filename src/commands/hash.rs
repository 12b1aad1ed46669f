//! Hash commands.

use super::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::{DataType, TtlPolicy, Value};
use bytes::Bytes;
use std::collections::HashMap;

impl CommandHandler {
    /// HSET key field value [field value ...]
    ///
    /// Returns the number of fields that were newly created.
    pub(super) fn cmd_hset(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 || args.len() % 2 == 0 {
            return RespValue::wrong_arity("hset");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let mut pairs = Vec::with_capacity(args.len() / 2);
        for chunk in args[1..].chunks(2) {
            match (self.get_bytes(&chunk[0]), self.get_bytes(&chunk[1])) {
                (Some(f), Some(v)) => pairs.push((f, v)),
                _ => return RespValue::error("ERR invalid field or value"),
            }
        }

        let result = self
            .provider
            .write(&key, DataType::Hash, TtlPolicy::Keep, |slot| {
                let hash = slot.get_or_insert_with(|| Value::Hash(HashMap::new()));
                Ok(hash
                    .as_hash_mut()
                    .map(|h| {
                        pairs
                            .into_iter()
                            .filter(|(f, v)| h.insert(f.clone(), v.clone()).is_none())
                            .count()
                    })
                    .unwrap_or(0))
            });
        self.reply("hset", result, |created| RespValue::integer(created as i64))
    }

    /// HGET key field
    pub(super) fn cmd_hget(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("hget");
        }

        let (key, field) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(f)) => (k, f),
            _ => return RespValue::error("ERR invalid key or field"),
        };

        let result = self.provider.read(&key, DataType::Hash, |v| {
            v.and_then(Value::as_hash).and_then(|h| h.get(&field)).cloned()
        });
        self.reply("hget", result, RespValue::optional)
    }

    /// HDEL key field [field ...]
    pub(super) fn cmd_hdel(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity("hdel");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };
        let fields: Vec<Bytes> = match args[1..].iter().map(|a| self.get_bytes(a)).collect() {
            Some(f) => f,
            None => return RespValue::error("ERR invalid field"),
        };

        let result = self
            .provider
            .write(&key, DataType::Hash, TtlPolicy::Keep, |slot| {
                Ok(slot
                    .as_mut()
                    .and_then(Value::as_hash_mut)
                    .map(|h| fields.iter().filter(|f| h.remove(*f).is_some()).count())
                    .unwrap_or(0))
            });
        self.reply("hdel", result, |removed| RespValue::integer(removed as i64))
    }

    /// HGETALL key
    ///
    /// Flat field/value array, ordered by field.
    pub(super) fn cmd_hgetall(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("hgetall");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::Hash, |v| {
            let mut pairs: Vec<(Bytes, Bytes)> = v
                .and_then(Value::as_hash)
                .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        });
        self.reply("hgetall", result, |pairs| {
            RespValue::bulk_array(pairs.into_iter().flat_map(|(f, v)| [f, v]))
        })
    }

    /// HLEN key
    pub(super) fn cmd_hlen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("hlen");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::Hash, |v| {
            v.and_then(Value::as_hash).map(|h| h.len()).unwrap_or(0)
        });
        self.reply("hlen", result, |len| RespValue::integer(len as i64))
    }

    /// HEXISTS key field
    pub(super) fn cmd_hexists(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("hexists");
        }

        let (key, field) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(f)) => (k, f),
            _ => return RespValue::error("ERR invalid key or field"),
        };

        let result = self.provider.read(&key, DataType::Hash, |v| {
            v.and_then(Value::as_hash).is_some_and(|h| h.contains_key(&field))
        });
        self.reply("hexists", result, RespValue::boolean)
    }
}

//! Set commands.

use super::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::{DataType, TtlPolicy, Value};
use bytes::Bytes;
use std::collections::HashSet;

impl CommandHandler {
    /// Collects every argument after the key as a member.
    fn members(&self, args: &[RespValue]) -> Option<Vec<Bytes>> {
        args[1..].iter().map(|a| self.get_bytes(a)).collect()
    }

    /// SADD key member [member ...]
    pub(super) fn cmd_sadd(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity("sadd");
        }

        let (key, members) = match (self.get_key(&args[0]), self.members(args)) {
            (Some(k), Some(m)) => (k, m),
            _ => return RespValue::error("ERR invalid key or member"),
        };

        let result = self
            .provider
            .write(&key, DataType::Set, TtlPolicy::Keep, |slot| {
                let set = slot.get_or_insert_with(|| Value::Set(HashSet::new()));
                Ok(set
                    .as_set_mut()
                    .map(|s| members.into_iter().filter(|m| s.insert(m.clone())).count())
                    .unwrap_or(0))
            });
        self.reply("sadd", result, |added| RespValue::integer(added as i64))
    }

    /// SREM key member [member ...]
    pub(super) fn cmd_srem(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity("srem");
        }

        let (key, members) = match (self.get_key(&args[0]), self.members(args)) {
            (Some(k), Some(m)) => (k, m),
            _ => return RespValue::error("ERR invalid key or member"),
        };

        let result = self
            .provider
            .write(&key, DataType::Set, TtlPolicy::Keep, |slot| {
                Ok(slot
                    .as_mut()
                    .and_then(Value::as_set_mut)
                    .map(|s| members.iter().filter(|m| s.remove(*m)).count())
                    .unwrap_or(0))
            });
        self.reply("srem", result, |removed| RespValue::integer(removed as i64))
    }

    /// SMEMBERS key
    ///
    /// Members are returned in byte order so replies are stable.
    pub(super) fn cmd_smembers(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("smembers");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::Set, |v| {
            let mut members: Vec<Bytes> = v
                .and_then(Value::as_set)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            members.sort();
            members
        });
        self.reply("smembers", result, RespValue::bulk_array)
    }

    /// SISMEMBER key member
    pub(super) fn cmd_sismember(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("sismember");
        }

        let (key, member) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(m)) => (k, m),
            _ => return RespValue::error("ERR invalid key or member"),
        };

        let result = self.provider.read(&key, DataType::Set, |v| {
            v.and_then(Value::as_set).is_some_and(|s| s.contains(&member))
        });
        self.reply("sismember", result, RespValue::boolean)
    }

    /// SCARD key
    pub(super) fn cmd_scard(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("scard");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::Set, |v| {
            v.and_then(Value::as_set).map(|s| s.len()).unwrap_or(0)
        });
        self.reply("scard", result, |len| RespValue::integer(len as i64))
    }
}

//! List commands.

use super::handler::normalize_range;
use super::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::{DataType, TtlPolicy, Value};
use bytes::Bytes;
use std::collections::VecDeque;

impl CommandHandler {
    /// LPUSH key element [element ...] / RPUSH key element [element ...]
    pub(super) fn cmd_push(&self, args: &[RespValue], left: bool, name: &str) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity(name);
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let elements: Vec<Bytes> = args[1..].iter().filter_map(|a| self.get_bytes(a)).collect();
        if elements.len() != args.len() - 1 {
            return RespValue::error("ERR invalid value");
        }

        let result = self
            .provider
            .write(&key, DataType::List, TtlPolicy::Keep, |slot| {
                let list = slot.get_or_insert_with(|| Value::List(VecDeque::new()));
                let Some(list) = list.as_list_mut() else {
                    return Ok(0);
                };
                for element in elements {
                    if left {
                        list.push_front(element);
                    } else {
                        list.push_back(element);
                    }
                }
                Ok(list.len())
            });
        self.reply(name, result, |len| RespValue::integer(len as i64))
    }

    /// LPOP key [count] / RPOP key [count]
    pub(super) fn cmd_pop(&self, args: &[RespValue], left: bool, name: &str) -> RespValue {
        if args.is_empty() || args.len() > 2 {
            return RespValue::wrong_arity(name);
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let count = match args.get(1) {
            Some(arg) => match self.get_integer(arg) {
                Some(n) if n >= 0 => Some(n as usize),
                _ => return RespValue::error("ERR value is out of range, must be positive"),
            },
            None => None,
        };

        let result = self
            .provider
            .write(&key, DataType::List, TtlPolicy::Keep, |slot| {
                let Some(list) = slot.as_mut().and_then(Value::as_list_mut) else {
                    return Ok(None);
                };
                let n = count.unwrap_or(1).min(list.len());
                let popped: Vec<Bytes> = (0..n)
                    .filter_map(|_| if left { list.pop_front() } else { list.pop_back() })
                    .collect();
                Ok(Some(popped))
            });

        self.reply(name, result, |popped| match (popped, count) {
            (None, _) => RespValue::null(),
            (Some(mut items), None) => RespValue::optional(items.pop()),
            (Some(items), Some(_)) => RespValue::bulk_array(items),
        })
    }

    /// LLEN key
    pub(super) fn cmd_llen(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("llen");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::List, |v| {
            v.and_then(Value::as_list).map(|l| l.len()).unwrap_or(0)
        });
        self.reply("llen", result, |len| RespValue::integer(len as i64))
    }

    /// LINDEX key index
    pub(super) fn cmd_lindex(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("lindex");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let index = match self.get_integer(&args[1]) {
            Some(i) => i,
            None => return RespValue::not_an_integer(),
        };

        let result = self.provider.read(&key, DataType::List, |v| {
            let list = v.and_then(Value::as_list)?;
            let len = list.len() as i64;
            let i = if index < 0 { len + index } else { index };
            if i < 0 {
                return None;
            }
            list.get(i as usize).cloned()
        });
        self.reply("lindex", result, RespValue::optional)
    }

    /// LRANGE key start stop
    pub(super) fn cmd_lrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 {
            return RespValue::wrong_arity("lrange");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let (start, stop) = match (self.get_integer(&args[1]), self.get_integer(&args[2])) {
            (Some(s), Some(e)) => (s, e),
            _ => return RespValue::not_an_integer(),
        };

        let result = self.provider.read(&key, DataType::List, |v| {
            let Some(list) = v.and_then(Value::as_list) else {
                return Vec::new();
            };
            match normalize_range(start, stop, list.len()) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            }
        });
        self.reply("lrange", result, RespValue::bulk_array)
    }
}

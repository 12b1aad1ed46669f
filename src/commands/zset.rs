//! Sorted set commands.

use super::handler::normalize_range;
use super::CommandHandler;
use crate::protocol::RespValue;
use crate::storage::{DataType, SortedSet, TtlPolicy, Value};
use bytes::Bytes;

impl CommandHandler {
    /// ZADD key score member [score member ...]
    pub(super) fn cmd_zadd(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 3 || args.len() % 2 == 0 {
            return RespValue::wrong_arity("zadd");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let mut entries = Vec::with_capacity(args.len() / 2);
        for chunk in args[1..].chunks(2) {
            let score = match self.get_float(&chunk[0]) {
                Some(s) => s,
                None => return RespValue::error("ERR value is not a valid float"),
            };
            match self.get_bytes(&chunk[1]) {
                Some(member) => entries.push((member, score)),
                None => return RespValue::error("ERR invalid member"),
            }
        }

        let result = self
            .provider
            .write(&key, DataType::SortedSet, TtlPolicy::Keep, |slot| {
                let zset = slot.get_or_insert_with(|| Value::SortedSet(SortedSet::default()));
                Ok(zset
                    .as_sorted_set_mut()
                    .map(|z| {
                        entries
                            .into_iter()
                            .filter(|(m, s)| z.insert(m.clone(), *s))
                            .count()
                    })
                    .unwrap_or(0))
            });
        self.reply("zadd", result, |added| RespValue::integer(added as i64))
    }

    /// ZREM key member [member ...]
    pub(super) fn cmd_zrem(&self, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return RespValue::wrong_arity("zrem");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };
        let members: Vec<Bytes> = match args[1..].iter().map(|a| self.get_bytes(a)).collect() {
            Some(m) => m,
            None => return RespValue::error("ERR invalid member"),
        };

        let result = self
            .provider
            .write(&key, DataType::SortedSet, TtlPolicy::Keep, |slot| {
                Ok(slot
                    .as_mut()
                    .and_then(Value::as_sorted_set_mut)
                    .map(|z| members.iter().filter(|m| z.remove(m)).count())
                    .unwrap_or(0))
            });
        self.reply("zrem", result, |removed| RespValue::integer(removed as i64))
    }

    /// ZSCORE key member
    pub(super) fn cmd_zscore(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 2 {
            return RespValue::wrong_arity("zscore");
        }

        let (key, member) = match (self.get_key(&args[0]), self.get_bytes(&args[1])) {
            (Some(k), Some(m)) => (k, m),
            _ => return RespValue::error("ERR invalid key or member"),
        };

        let result = self.provider.read(&key, DataType::SortedSet, |v| {
            v.and_then(Value::as_sorted_set).and_then(|z| z.score(&member))
        });
        self.reply("zscore", result, |score| {
            RespValue::optional(score.map(|s| Bytes::from(format_score(s))))
        })
    }

    /// ZCARD key
    pub(super) fn cmd_zcard(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 1 {
            return RespValue::wrong_arity("zcard");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let result = self.provider.read(&key, DataType::SortedSet, |v| {
            v.and_then(Value::as_sorted_set).map(|z| z.len()).unwrap_or(0)
        });
        self.reply("zcard", result, |len| RespValue::integer(len as i64))
    }

    /// ZRANGE key start stop [WITHSCORES]
    pub(super) fn cmd_zrange(&self, args: &[RespValue]) -> RespValue {
        if args.len() != 3 && args.len() != 4 {
            return RespValue::wrong_arity("zrange");
        }

        let key = match self.get_key(&args[0]) {
            Some(k) => k,
            None => return RespValue::error("ERR invalid key"),
        };

        let (start, stop) = match (self.get_integer(&args[1]), self.get_integer(&args[2])) {
            (Some(s), Some(e)) => (s, e),
            _ => return RespValue::not_an_integer(),
        };

        let with_scores = match args.get(3).and_then(|a| self.get_string(a)) {
            Some(opt) if opt.eq_ignore_ascii_case("WITHSCORES") => true,
            Some(_) => return RespValue::syntax_error(),
            None if args.len() == 4 => return RespValue::syntax_error(),
            None => false,
        };

        let result = self.provider.read(&key, DataType::SortedSet, |v| {
            let Some(zset) = v.and_then(Value::as_sorted_set) else {
                return Vec::new();
            };
            let ordered = zset.ordered();
            match normalize_range(start, stop, ordered.len()) {
                Some((from, to)) => ordered[from..=to].to_vec(),
                None => Vec::new(),
            }
        });

        self.reply("zrange", result, |members| {
            if with_scores {
                RespValue::bulk_array(
                    members
                        .into_iter()
                        .flat_map(|(m, s)| [m, Bytes::from(format_score(s))]),
                )
            } else {
                RespValue::bulk_array(members.into_iter().map(|(m, _)| m))
            }
        })
    }
}

/// Renders a score the way Redis does: integral values without a fraction.
fn format_score(score: f64) -> String {
    if score == f64::INFINITY {
        "inf".to_string()
    } else if score == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

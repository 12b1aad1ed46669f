//! RESP2 values and their wire encoding.
//!
//! | Prefix | Type          | Example                  |
//! |--------|---------------|--------------------------|
//! | `+`    | Simple String | `+OK\r\n`                |
//! | `-`    | Error         | `-ERR no such key\r\n`   |
//! | `:`    | Integer       | `:1000\r\n`              |
//! | `$`    | Bulk String   | `$5\r\nhello\r\n`        |
//! | `*`    | Array         | `*1\r\n:1\r\n`           |
//!
//! A null reply is encoded as the null bulk string `$-1\r\n`.

use crate::storage::KeyWrapper;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

const CRLF: &[u8] = b"\r\n";

/// A RESP2 value: a decoded request or a reply to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary status line, e.g. `OK` or `PONG`
    SimpleString(String),

    /// Error line; the first word is the error class (`ERR`, `WRONGTYPE`)
    Error(String),

    Integer(i64),

    /// Binary-safe payload
    BulkString(Bytes),

    /// Missing value (`$-1`)
    Null,

    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Integer reply for a boolean outcome (`:1` / `:0`).
    pub fn boolean(b: bool) -> Self {
        RespValue::Integer(i64::from(b))
    }

    /// Bulk string reply, or null when absent.
    pub fn optional(data: Option<Bytes>) -> Self {
        data.map(RespValue::BulkString).unwrap_or(RespValue::Null)
    }

    /// Array of bulk strings.
    pub fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> Self {
        RespValue::Array(items.into_iter().map(RespValue::BulkString).collect())
    }

    /// Array of keys as bulk strings.
    pub fn key_array(keys: impl IntoIterator<Item = KeyWrapper>) -> Self {
        RespValue::Array(
            keys.into_iter()
                .map(|k| RespValue::BulkString(k.to_bytes()))
                .collect(),
        )
    }

    /// Builds a decoded request the way a RESP parser would deliver it.
    pub fn command<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        RespValue::Array(
            parts
                .into_iter()
                .map(|p| RespValue::BulkString(p.into()))
                .collect(),
        )
    }

    /// `ERR wrong number of arguments for '<cmd>' command`
    pub fn wrong_arity(command: &str) -> Self {
        RespValue::Error(format!(
            "ERR wrong number of arguments for '{}' command",
            command.to_lowercase()
        ))
    }

    /// `ERR syntax error`
    pub fn syntax_error() -> Self {
        RespValue::error("ERR syntax error")
    }

    /// `ERR value is not an integer or out of range`
    pub fn not_an_integer() -> Self {
        RespValue::error("ERR value is not an integer or out of range")
    }

    /// Encodes into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the wire form to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => line(buf, b'+', s.as_bytes()),
            RespValue::Error(s) => line(buf, b'-', s.as_bytes()),
            RespValue::Integer(n) => line(buf, b':', n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                line(buf, b'$', data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => buf.put_slice(b"$-1\r\n"),
            RespValue::Array(values) => {
                line(buf, b'*', values.len().to_string().as_bytes());
                for value in values {
                    value.encode_into(buf);
                }
            }
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::BulkString(data) => data.len() + 16,
            RespValue::Array(values) => 16 + values.len() * 16,
            _ => 32,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// UTF-8 view of a simple or bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

fn line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
    buf.put_u8(prefix);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

/// redis-cli style rendering.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) if values.is_empty() => write!(f, "(empty array)"),
            RespValue::Array(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}

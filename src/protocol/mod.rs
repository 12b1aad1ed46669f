//! Reply Model
//!
//! Commands reach the engine already decoded, as a [`RespValue::Array`] of
//! bulk strings. Executors answer with another [`RespValue`], which can be
//! encoded into RESP2 wire format for whatever transport sits in front.
//!
//! ## Example
//!
//! ```
//! use regionkv::protocol::RespValue;
//! use bytes::Bytes;
//!
//! let request = RespValue::command(["GET", "name"]);
//! assert_eq!(request.as_array().map(|a| a.len()), Some(2));
//!
//! let reply = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(reply.encode().as_ref(), b"$4\r\nAriz\r\n");
//! ```

pub mod reply;

pub use reply::RespValue;

//! Key Identity
//!
//! Every operation in the engine is addressed by a [`KeyWrapper`]: an
//! immutable, binary-safe byte sequence whose equality, ordering and hash
//! are purely structural. The same wrapper is used as the map key inside
//! the backing regions and inside the expiration scheduler's task table.

use bytes::Bytes;
use std::borrow::Borrow;
use std::fmt;

/// Canonical wrapper around a raw key.
///
/// Cloning is cheap (the underlying [`Bytes`] is reference counted) and the
/// content can never change after construction.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyWrapper(Bytes);

impl KeyWrapper {
    /// Wraps the given bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the raw key bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns a cheap clone of the underlying buffer.
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for KeyWrapper {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&'static str> for KeyWrapper {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for KeyWrapper {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for KeyWrapper {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<&[u8]> for KeyWrapper {
    fn from(v: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(v))
    }
}

impl AsRef<[u8]> for KeyWrapper {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for KeyWrapper {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for KeyWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "KeyWrapper({:?})", s),
            Err(_) => write!(f, "KeyWrapper({:?})", self.0),
        }
    }
}

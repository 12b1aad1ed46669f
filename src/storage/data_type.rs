//! Data Type Registry
//!
//! Enumerates the value categories a key can hold. Each storable category
//! is backed by exactly one region; `None` is the answer for a key that no
//! region holds and can never be stored.

use std::fmt;
use std::str::FromStr;

/// The category of value stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    String,
    List,
    Set,
    Hash,
    SortedSet,
    /// The key does not exist in any region.
    None,
}

impl DataType {
    /// Every type that owns a backing region, in lookup order.
    pub const STORABLE: [DataType; 5] = [
        DataType::String,
        DataType::List,
        DataType::Set,
        DataType::Hash,
        DataType::SortedSet,
    ];

    /// The name reported by the `TYPE` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::Hash => "hash",
            DataType::SortedSet => "zset",
            DataType::None => "none",
        }
    }

    /// Name of the backing region that holds keys of this type.
    pub fn region_name(&self) -> &'static str {
        match self {
            DataType::String => "__redis_strings",
            DataType::List => "__redis_lists",
            DataType::Set => "__redis_sets",
            DataType::Hash => "__redis_hashes",
            DataType::SortedSet => "__redis_sorted_sets",
            DataType::None => "__redis_none",
        }
    }

    /// Returns true for every type except `None`.
    #[inline]
    pub fn is_storable(&self) -> bool {
        !matches!(self, DataType::None)
    }

    /// Position of this type's region in the provider's region table.
    pub(crate) fn slot(&self) -> Option<usize> {
        match self {
            DataType::String => Some(0),
            DataType::List => Some(1),
            DataType::Set => Some(2),
            DataType::Hash => Some(3),
            DataType::SortedSet => Some(4),
            DataType::None => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(DataType::String),
            "list" => Ok(DataType::List),
            "set" => Ok(DataType::Set),
            "hash" => Ok(DataType::Hash),
            "zset" | "sorted_set" => Ok(DataType::SortedSet),
            "none" => Ok(DataType::None),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

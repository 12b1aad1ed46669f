//! Stored Payloads
//!
//! The opaque value half of a region entry. A region only ever holds
//! payloads of its own [`DataType`], which keeps each region homogeneous.

use crate::storage::DataType;
use bytes::Bytes;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(HashSet<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    SortedSet(SortedSet),
}

impl Value {
    /// The data type this payload belongs to.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Set(_) => DataType::Set,
            Value::Hash(_) => DataType::Hash,
            Value::SortedSet(_) => DataType::SortedSet,
        }
    }

    /// An empty container of the given type, used when a structural
    /// command creates a key. Returns `None` for `DataType::None`.
    pub fn empty(data_type: DataType) -> Option<Value> {
        match data_type {
            DataType::String => Some(Value::String(Bytes::new())),
            DataType::List => Some(Value::List(VecDeque::new())),
            DataType::Set => Some(Value::Set(HashSet::new())),
            DataType::Hash => Some(Value::Hash(HashMap::new())),
            DataType::SortedSet => Some(Value::SortedSet(SortedSet::default())),
            DataType::None => None,
        }
    }

    /// Returns true for containers with no elements. Strings are never
    /// considered empty: an empty string is still a value.
    pub fn is_empty_container(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::SortedSet(z) => z.is_empty(),
        }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&VecDeque<Bytes>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut VecDeque<Bytes>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_set_mut(&mut self) -> Option<&mut HashSet<Bytes>> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_hash_mut(&mut self) -> Option<&mut HashMap<Bytes, Bytes>> {
        match self {
            Value::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_sorted_set(&self) -> Option<&SortedSet> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    pub fn as_sorted_set_mut(&mut self) -> Option<&mut SortedSet> {
        match self {
            Value::SortedSet(z) => Some(z),
            _ => None,
        }
    }

    /// Approximate heap footprint, used for region statistics.
    pub fn approximate_size(&self) -> usize {
        match self {
            Value::String(b) => b.len(),
            Value::List(l) => l.iter().map(|b| b.len() + 16).sum(),
            Value::Set(s) => s.iter().map(|b| b.len() + 16).sum(),
            Value::Hash(h) => h.iter().map(|(k, v)| k.len() + v.len() + 32).sum(),
            Value::SortedSet(z) => z.scores.keys().map(|m| m.len() + 24).sum(),
        }
    }
}

/// Member → score mapping; ordering is computed on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortedSet {
    scores: HashMap<Bytes, f64>,
}

impl SortedSet {
    /// Inserts or updates a member. Returns true if the member was new.
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        self.scores.insert(member, score).is_none()
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        self.scores.remove(member).is_some()
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Members in ascending (score, member) order.
    pub fn ordered(&self) -> Vec<(Bytes, f64)> {
        let mut members: Vec<(Bytes, f64)> = self
            .scores
            .iter()
            .map(|(m, s)| (m.clone(), *s))
            .collect();
        members.sort_by(|a, b| match a.1.total_cmp(&b.1) {
            Ordering::Equal => a.0.cmp(&b.0),
            other => other,
        });
        members
    }
}

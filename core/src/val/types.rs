use std::sync::{Arc, RwLock};

use crate::error::ErrorKind;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new, fast_hash_map_with_capacity, sorted_keys};
use crate::util::sync::{read, write};

use super::Val;

/// Shared, mutable list. Every alias observes in-place updates.
#[derive(Default)]
pub struct ListValue {
    items: RwLock<Vec<Val>>,
}

impl ListValue {
    pub fn new(items: Vec<Val>) -> Arc<Self> {
        Arc::new(Self {
            items: RwLock::new(items),
        })
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<Val> {
        read(&self.items).get(idx).cloned()
    }

    /// Returns false when `idx` is out of bounds.
    pub fn set(&self, idx: usize, value: Val) -> bool {
        match write(&self.items).get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Val) {
        write(&self.items).push(value);
    }

    pub fn extend(&self, values: Vec<Val>) {
        write(&self.items).extend(values);
    }

    pub fn pop(&self) -> Option<Val> {
        write(&self.items).pop()
    }

    pub fn snapshot(&self) -> Vec<Val> {
        read(&self.items).clone()
    }
}

/// String-keyed map; iteration and display use sorted key order.
#[derive(Default)]
pub struct MapValue {
    items: RwLock<FastHashMap<Arc<str>, Val>>,
}

impl MapValue {
    pub fn new(items: FastHashMap<Arc<str>, Val>) -> Arc<Self> {
        Arc::new(Self {
            items: RwLock::new(items),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::new(fast_hash_map_new())
    }

    pub fn from_pairs(pairs: Vec<(Arc<str>, Val)>) -> Arc<Self> {
        let mut items = fast_hash_map_with_capacity(pairs.len());
        for (k, v) in pairs {
            items.insert(k, v);
        }
        Self::new(items)
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Val> {
        read(&self.items).get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        read(&self.items).contains_key(key)
    }

    pub fn insert(&self, key: Arc<str>, value: Val) {
        write(&self.items).insert(key, value);
    }

    pub fn remove(&self, key: &str) -> Option<Val> {
        write(&self.items).remove(key)
    }

    pub fn keys(&self) -> Vec<Arc<str>> {
        sorted_keys(&read(&self.items))
    }

    /// Entries in sorted key order.
    pub fn entries(&self) -> Vec<(Arc<str>, Val)> {
        let items = read(&self.items);
        sorted_keys(&items)
            .into_iter()
            .filter_map(|k| items.get(&k).cloned().map(|v| (k, v)))
            .collect()
    }
}

/// Hashable projection of a value used for set membership. Integral floats
/// collapse onto ints so `2.0` and `2` are the same member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetKey {
    Nil,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
}

impl SetKey {
    pub fn from_val(val: &Val) -> Option<SetKey> {
        let key = match val {
            Val::Nil => SetKey::Nil,
            Val::Bool(b) => SetKey::Bool(*b),
            Val::Int(i) => SetKey::Int(*i),
            Val::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => SetKey::Int(*f as i64),
            Val::Float(f) => SetKey::Float(f.to_bits()),
            Val::Str(s) => SetKey::Str(s.clone()),
            _ => return None,
        };
        Some(key)
    }
}

#[derive(Default)]
pub struct SetValue {
    items: RwLock<FastHashMap<SetKey, Val>>,
}

impl SetValue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        read(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns false when the value is not hashable.
    pub fn insert(&self, value: Val) -> bool {
        match SetKey::from_val(&value) {
            Some(key) => {
                write(&self.items).insert(key, value);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, value: &Val) -> bool {
        SetKey::from_val(value).is_some_and(|key| read(&self.items).contains_key(&key))
    }

    pub fn remove(&self, value: &Val) -> bool {
        SetKey::from_val(value).is_some_and(|key| write(&self.items).remove(&key).is_some())
    }

    /// Members in a stable order.
    pub fn members(&self) -> Vec<Val> {
        let items = read(&self.items);
        let mut keys: Vec<&SetKey> = items.keys().collect();
        keys.sort();
        keys.into_iter().filter_map(|k| items.get(k).cloned()).collect()
    }
}

/// Mutable slot shared between a frame and the closures capturing it.
#[derive(Default)]
pub struct CellValue {
    value: RwLock<Val>,
}

impl CellValue {
    pub fn new(value: Val) -> Arc<Self> {
        Arc::new(Self {
            value: RwLock::new(value),
        })
    }

    #[inline]
    pub fn get(&self) -> Val {
        read(&self.value).clone()
    }

    #[inline]
    pub fn set(&self, value: Val) {
        *write(&self.value) = value;
    }
}

/// Script-visible error value. Returned from a native it fails the call.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub message: String,
    pub kind: ErrorKind,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
            kind: ErrorKind::Raised,
        })
    }

    pub fn with_kind(message: impl Into<String>, kind: ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
            kind,
        })
    }
}

use std::sync::{Arc, RwLock};

use crate::util::sync::{read, write};
use crate::val::Val;

/// Global value table addressed by compile-time index. Shared by a VM, its
/// clones, spawned tasks and every function created from its code: a store
/// from any of them is visible to all. Each access takes the lock only for
/// the single read or write.
#[derive(Debug, Default)]
pub struct Globals {
    names: RwLock<Vec<Arc<str>>>,
    values: RwLock<Vec<Val>>,
}

impl Globals {
    pub fn new(names: Vec<Arc<str>>, mut values: Vec<Val>) -> Arc<Self> {
        values.resize(names.len(), Val::Nil);
        Arc::new(Self {
            names: RwLock::new(names),
            values: RwLock::new(values),
        })
    }

    pub fn len(&self) -> usize {
        read(&self.names).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<Val> {
        read(&self.values).get(idx).cloned()
    }

    /// Returns false when `idx` is outside the table.
    #[inline]
    pub fn set(&self, idx: usize, value: Val) -> bool {
        match write(&self.values).get_mut(idx) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        read(&self.names).iter().position(|n| n.as_ref() == name)
    }

    pub fn lookup(&self, name: &str) -> Option<Val> {
        self.index_of(name).and_then(|idx| self.get(idx))
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        read(&self.names).clone()
    }

    /// Grow the table to match a layout produced by incremental compilation.
    /// Existing slots keep their values; new ones start as nil.
    pub(crate) fn extend_to(&self, layout: &[Arc<str>]) {
        let mut names = write(&self.names);
        if layout.len() <= names.len() {
            return;
        }
        let start = names.len();
        names.extend(layout[start..].iter().cloned());
        write(&self.values).resize(names.len(), Val::Nil);
    }
}

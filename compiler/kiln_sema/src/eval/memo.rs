//! Memoization of property results.
//!
//! Keys hold the receiver entity, the argument values and the values of the
//! property's declared dynamic variables. Entries live as long as the
//! analysis session; errors are never cached.

use kiln_ir::{Entity, PropertyId};
use rustc_hash::FxHashMap;

use super::DynVars;
use crate::Value;

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct MemoKey {
    pub prop: PropertyId,
    pub entity: Entity,
    pub args: Vec<Value>,
    pub dynvars: DynVars,
}

#[derive(Clone, Debug)]
pub(crate) enum MemoEntry {
    InProgress,
    Done(Value),
}

/// Hit and miss counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemoStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Memo {
    entries: FxHashMap<MemoKey, MemoEntry>,
    hits: usize,
    misses: usize,
}

impl Memo {
    pub fn get(&mut self, key: &MemoKey) -> Option<&MemoEntry> {
        let entry = self.entries.get(key);
        match entry {
            Some(MemoEntry::Done(_)) => self.hits += 1,
            Some(MemoEntry::InProgress) => {}
            None => self.misses += 1,
        }
        entry
    }

    pub fn start(&mut self, key: MemoKey) {
        self.entries.insert(key, MemoEntry::InProgress);
    }

    pub fn finish(&mut self, key: MemoKey, value: Value) {
        self.entries.insert(key, MemoEntry::Done(value));
    }

    pub fn abandon(&mut self, key: &MemoKey) {
        self.entries.remove(key);
    }

    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits,
            misses: self.misses,
            entries: self
                .entries
                .values()
                .filter(|e| matches!(e, MemoEntry::Done(_)))
                .count(),
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Ledger, LedgerEntry};
use crate::error::Result;
use crate::parameter::CanonicalKey;

#[derive(Default)]
struct LedgerIndex {
    entries: Vec<Arc<LedgerEntry>>,
    by_key: HashMap<CanonicalKey, usize>,
}

/// In-memory ledger.
///
/// Keeps entries in append order alongside a key index. Also serves as the
/// index behind [`JournalLedger`](super::JournalLedger).
#[derive(Default)]
pub struct MemoryLedger {
    index: RwLock<LedgerIndex>,
}

impl MemoryLedger {
    /// Creates a new, empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `entry` unless its key exists. Returns the stored entry when
    /// it was new.
    pub(crate) fn insert(&self, entry: LedgerEntry) -> Option<Arc<LedgerEntry>> {
        let key = entry.key();
        let mut index = self.index.write();
        if index.by_key.contains_key(&key) {
            return None;
        }
        let entry = Arc::new(entry);
        let position = index.entries.len();
        index.entries.push(Arc::clone(&entry));
        index.by_key.insert(key, position);
        Some(entry)
    }
}

impl Ledger for MemoryLedger {
    fn contains(&self, key: &CanonicalKey) -> bool {
        self.index.read().by_key.contains_key(key)
    }

    fn get(&self, key: &CanonicalKey) -> Option<Arc<LedgerEntry>> {
        let index = self.index.read();
        index
            .by_key
            .get(key)
            .map(|&position| Arc::clone(&index.entries[position]))
    }

    fn append(&self, entry: LedgerEntry) -> Result<bool> {
        Ok(self.insert(entry).is_some())
    }

    fn entries(&self) -> Vec<Arc<LedgerEntry>> {
        self.index.read().entries.clone()
    }

    fn len(&self) -> usize {
        self.index.read().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parameter::{ParamSpec, ParameterSpace};
    use crate::statistics::Statistics;

    fn entry(x: i64, income: f64) -> LedgerEntry {
        let space =
            Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 100).unwrap()]).unwrap());
        LedgerEntry::new(
            space.vector(vec![x]).unwrap(),
            Statistics {
                income,
                ..Statistics::default()
            },
        )
    }

    #[test]
    fn append_is_idempotent() {
        let ledger = MemoryLedger::new();
        assert!(ledger.append(entry(1, 10.0)).unwrap());
        assert!(!ledger.append(entry(1, 99.0)).unwrap());
        assert_eq!(ledger.len(), 1);

        let stored = ledger.get(&entry(1, 0.0).key()).unwrap();
        assert!((stored.statistics.income - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn entries_keep_append_order() {
        let ledger = MemoryLedger::new();
        for x in [5, 2, 9] {
            ledger.append(entry(x, 0.0)).unwrap();
        }
        let keys: Vec<String> = ledger
            .entries()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(keys, vec!["5", "2", "9"]);
        assert!(ledger.contains(&entry(2, 0.0).key()));
        assert!(!ledger.contains(&entry(3, 0.0).key()));
    }
}

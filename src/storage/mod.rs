//! Result ledgers: the record of which parameter vectors have been simulated
//! and with what result.
//!
//! The [`Ledger`] trait defines the contract; every
//! [`Dispatcher`](crate::dispatcher::Dispatcher) owns an `Arc<dyn Ledger>`
//! so the ledger is transparently shared across workers.
//!
//! # Available backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryLedger`] | Ordered entries plus a key index behind a read-write lock |
//! | [`JournalLedger`] | Append-only configuration and stats logs with `fs2` file locking, replayed on open |
//!
//! Entries are never updated or removed. Appending a key that is already
//! present is a no-op that reports `false`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

mod journal;
mod memory;

pub use journal::JournalLedger;
pub use memory::MemoryLedger;

use crate::error::Result;
use crate::parameter::{CanonicalKey, ParameterVector};
use crate::statistics::Statistics;

/// One completed simulation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// The simulated configuration.
    #[serde(rename = "parameters")]
    pub vector: ParameterVector,
    /// What the engine reported.
    pub statistics: Statistics,
    /// Completion time in milliseconds since the Unix epoch.
    pub recorded_at: u64,
}

impl LedgerEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(vector: ParameterVector, statistics: Statistics) -> Self {
        Self {
            vector,
            statistics,
            recorded_at: unix_millis(),
        }
    }

    #[must_use]
    pub fn key(&self) -> CanonicalKey {
        self.vector.key()
    }
}

/// Durable source of truth for completed evaluations.
///
/// Implementations must be `Send + Sync`; the dispatcher appends from
/// several workers at once.
pub trait Ledger: Send + Sync {
    /// Returns `true` if an entry exists for `key`.
    fn contains(&self, key: &CanonicalKey) -> bool;

    /// Returns the entry recorded for `key`.
    fn get(&self, key: &CanonicalKey) -> Option<Arc<LedgerEntry>>;

    /// Appends an entry unless its key is already present.
    ///
    /// Returns `Ok(true)` once the entry is persisted, `Ok(false)` if the
    /// key already existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`](crate::Error::Storage) if persisting fails;
    /// the in-memory index is left unchanged in that case.
    fn append(&self, entry: LedgerEntry) -> Result<bool>;

    /// Snapshot of all entries in append order.
    fn entries(&self) -> Vec<Arc<LedgerEntry>>;

    /// Number of recorded entries.
    fn len(&self) -> usize;

    /// Returns `true` if nothing has been recorded.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

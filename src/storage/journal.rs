//! Append-only journal ledger backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use parking_lot::Mutex;
use serde::Deserialize;

use super::{Ledger, LedgerEntry, MemoryLedger};
use crate::error::{Error, Result};
use crate::parameter::{CanonicalKey, ParameterSpace};
use crate::statistics::{Statistics, round_to};

const CONFIGURATIONS_FILE: &str = "executed_configurations.jsonl";
const STATS_FILE: &str = "stats.txt";

/// A ledger that persists every entry to two append-only files in a
/// directory and keeps an in-memory index for reads.
///
/// * `executed_configurations.jsonl` holds one JSON record per entry with
///   the named parameters, the full statistics and the completion time.
///   It is the authoritative log.
/// * `stats.txt` holds `key;vessels; primeCost; handlingTime; profit; timeAtTerminal`
///   with KPIs rounded to two decimals, for quick inspection.
///
/// Writes use an exclusive file lock and reads a shared one, so several
/// processes may point at the same directory. [`append`](Ledger::append)
/// returns only after the configuration line has been synced to disk.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use facility_search::parameter::ParameterSpace;
/// use facility_search::storage::{JournalLedger, Ledger};
///
/// let space = Arc::new(ParameterSpace::terminal());
/// let ledger = JournalLedger::open("results", space)?;
/// println!("{} configurations already simulated", ledger.len());
/// # Ok::<(), facility_search::Error>(())
/// ```
pub struct JournalLedger {
    memory: MemoryLedger,
    configurations: PathBuf,
    stats: PathBuf,
    /// Serialise in-process writes so we only hold the file lock briefly.
    write_lock: Mutex<()>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryRecord {
    parameters: BTreeMap<String, i64>,
    statistics: Statistics,
    recorded_at: u64,
}

impl JournalLedger {
    /// Opens the ledger in `dir`, creating the directory if needed, and
    /// replays both logs into memory.
    ///
    /// Configuration records missing from `stats.txt` (a crash between the
    /// two writes) get their stats line re-appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LedgerCorruption`] if a configuration line cannot be
    /// parsed or lies outside `space`, or if a stats line is malformed or
    /// names a key with no configuration record. Returns
    /// [`Error::Storage`] on I/O failures.
    pub fn open(dir: impl AsRef<Path>, space: Arc<ParameterSpace>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(storage)?;

        let ledger = Self {
            memory: MemoryLedger::new(),
            configurations: dir.join(CONFIGURATIONS_FILE),
            stats: dir.join(STATS_FILE),
            write_lock: Mutex::new(()),
        };

        for entry in load_configurations(&ledger.configurations, &space)? {
            let key = entry.key();
            if ledger.memory.insert(entry).is_none() {
                trace_warn!(key = %key, "duplicate configuration record, keeping the first");
            }
        }

        let logged = load_stats_keys(&ledger.stats, &ledger.memory)?;
        let missing: Vec<Arc<LedgerEntry>> = ledger
            .memory
            .entries()
            .into_iter()
            .filter(|e| !logged.contains(&e.key()))
            .collect();
        for entry in &missing {
            trace_warn!(key = %entry.key(), "restoring missing stats line");
            append_line(&ledger.stats, &stats_line(entry))?;
        }

        trace_info!(
            dir = %dir.display(),
            entries = ledger.memory.len(),
            repaired = missing.len(),
            "journal ledger opened"
        );
        Ok(ledger)
    }

    /// Path of the authoritative configuration log.
    #[must_use]
    pub fn configurations_path(&self) -> &Path {
        &self.configurations
    }

    /// Path of the derived stats log.
    #[must_use]
    pub fn stats_path(&self) -> &Path {
        &self.stats
    }
}

impl Ledger for JournalLedger {
    fn contains(&self, key: &CanonicalKey) -> bool {
        self.memory.contains(key)
    }

    fn get(&self, key: &CanonicalKey) -> Option<Arc<LedgerEntry>> {
        self.memory.get(key)
    }

    fn append(&self, entry: LedgerEntry) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if self.memory.contains(&entry.key()) {
            return Ok(false);
        }

        let record = serde_json::to_string(&entry).map_err(storage)?;
        let line = stats_line(&entry);
        append_line(&self.configurations, &record)?;

        // The synced configuration line is the commit point. A missing stats
        // line is restored by the next `open`.
        let key = entry.key();
        let inserted = self.memory.insert(entry).is_some();
        if let Err(e) = append_line(&self.stats, &line) {
            trace_warn!(key = %key, error = %e, "stats line not written");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }

        trace_debug!(key = %key, "ledger entry appended");
        Ok(inserted)
    }

    fn entries(&self) -> Vec<Arc<LedgerEntry>> {
        self.memory.entries()
    }

    fn len(&self) -> usize {
        self.memory.len()
    }
}

fn storage(e: impl ToString) -> Error {
    Error::Storage(e.to_string())
}

fn corruption(path: &Path, line: usize, reason: impl ToString) -> Error {
    Error::LedgerCorruption {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    }
}

fn stats_line(entry: &LedgerEntry) -> String {
    let s = &entry.statistics;
    format!(
        "{};{}; {}; {}; {}; {}",
        entry.key(),
        round_to(s.vessels_handled(), 2),
        round_to(s.prime_cost(), 2),
        round_to(s.handling_time(), 2),
        round_to(s.profit(), 2),
        round_to(s.time_at_terminal(), 2),
    )
}

/// Appends one line under an exclusive file lock and syncs it to disk.
fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(storage)?;

    FileExt::lock_exclusive(&file).map_err(storage)?;
    let written = writeln!(file, "{line}")
        .and_then(|()| file.flush())
        .and_then(|()| file.sync_data());
    FileExt::unlock(&file).map_err(storage)?;

    written.map_err(storage)
}

/// Reads every non-empty line of `path` under a shared lock. A missing file
/// reads as empty.
fn read_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage(e)),
    };

    FileExt::lock_shared(&file).map_err(storage)?;
    let mut lines = Vec::new();
    let mut read = Ok(());
    for (i, line) in BufReader::new(&file).lines().enumerate() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => lines.push((i + 1, line)),
            Err(e) => {
                read = Err(corruption(path, i + 1, e));
                break;
            }
        }
    }
    FileExt::unlock(&file).map_err(storage)?;

    read.map(|()| lines)
}

fn load_configurations(path: &Path, space: &Arc<ParameterSpace>) -> Result<Vec<LedgerEntry>> {
    read_lines(path)?
        .into_iter()
        .map(|(number, line)| {
            let record: EntryRecord =
                serde_json::from_str(&line).map_err(|e| corruption(path, number, e))?;
            let vector = space
                .from_record(&record.parameters)
                .map_err(|e| corruption(path, number, e))?;
            Ok(LedgerEntry {
                vector,
                statistics: record.statistics,
                recorded_at: record.recorded_at,
            })
        })
        .collect()
}

/// Validates `stats.txt` against the replayed configurations and returns the
/// keys it covers.
fn load_stats_keys(path: &Path, known: &MemoryLedger) -> Result<HashSet<CanonicalKey>> {
    let index: HashMap<String, CanonicalKey> = known
        .entries()
        .iter()
        .map(|e| {
            let key = e.key();
            (key.as_str().to_owned(), key)
        })
        .collect();

    let mut keys = HashSet::new();
    for (number, line) in read_lines(path)? {
        let mut fields = line.split(';');
        let key = fields.next().unwrap_or_default().trim();
        let values: Vec<&str> = fields.map(str::trim).collect();
        if values.len() != 5 {
            return Err(corruption(
                path,
                number,
                format!("expected 5 values after the key, found {}", values.len()),
            ));
        }
        if let Some(bad) = values.iter().find(|v| v.parse::<f64>().is_err()) {
            return Err(corruption(path, number, format!("'{bad}' is not a number")));
        }
        let key = index
            .get(key)
            .ok_or_else(|| corruption(path, number, format!("no configuration record for '{key}'")))?;
        keys.insert(key.clone());
    }
    Ok(keys)
}

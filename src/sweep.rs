//! Exhaustive sweeps over a parameter grid.
//!
//! [`sweep`] pushes every configuration of an iterator through a
//! [`Dispatcher`]. Configurations already in the ledger are skipped without
//! running the engine; the rest are fed to the pool in order, at most
//! [`Dispatcher::workers`] at a time, so each wait starts close to the moment
//! its run does.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use facility_search::prelude::*;
//!
//! # async fn example() -> facility_search::Result<()> {
//! let space = Arc::new(ParameterSpace::terminal());
//! let ledger = Arc::new(JournalLedger::open("results", Arc::clone(&space))?);
//! let dispatcher = Dispatcher::builder(ProcessSimulator::new("./run-model"), ledger).build()?;
//!
//! let report = sweep(&dispatcher, space.grid(), Duration::from_secs(300)).await;
//! println!("{} new, {} already known", report.completed, report.skipped);
//! # Ok(())
//! # }
//! ```

use core::time::Duration;

use serde::Serialize;
use tokio::task::{JoinError, JoinSet};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::parameter::{CanonicalKey, ParameterVector};
use crate::statistics::Statistics;

/// Counts for one finished sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Configurations taken from the iterator.
    pub submitted: usize,
    /// Configurations answered from the ledger.
    pub skipped: usize,
    /// Runs that completed and were recorded.
    pub completed: usize,
    /// Runs that failed, missed their deadline or timed out.
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, joined: core::result::Result<(CanonicalKey, Result<Statistics>), JoinError>) {
        match joined {
            Ok((_, Ok(_))) => self.completed += 1,
            Ok((key, Err(e))) => {
                self.failed += 1;
                trace_debug!(key = %key, error = %e, "sweep run failed");
                #[cfg(not(feature = "tracing"))]
                let _ = (key, e);
            }
            Err(e) => {
                self.failed += 1;
                trace_warn!(error = %e, "sweep task aborted");
                #[cfg(not(feature = "tracing"))]
                let _ = e;
            }
        }
    }
}

/// Runs every configuration in `vectors` that the ledger does not already
/// hold, waiting up to `timeout` for each.
///
/// Failures are counted, never fatal; a failed configuration is simply run
/// again by the next sweep.
pub async fn sweep<I>(dispatcher: &Dispatcher, vectors: I, timeout: Duration) -> SweepReport
where
    I: IntoIterator<Item = ParameterVector>,
{
    #[cfg(feature = "tracing")]
    let span = tracing::info_span!("sweep", workers = dispatcher.workers());

    let drive = async {
        let window = dispatcher.workers();
        let mut report = SweepReport::default();
        let mut running: JoinSet<(CanonicalKey, Result<Statistics>)> = JoinSet::new();

        for vector in vectors {
            // Drain one result to keep at most `window` runs outstanding.
            while running.len() >= window {
                let Some(joined) = running.join_next().await else {
                    break;
                };
                report.record(joined);
            }

            report.submitted += 1;
            let mut handle = dispatcher.submit(vector);
            if handle.from_ledger() {
                report.skipped += 1;
                continue;
            }
            running.spawn(async move {
                let result = handle.wait(timeout).await;
                (handle.key().clone(), result)
            });
        }

        while let Some(joined) = running.join_next().await {
            report.record(joined);
        }
        report
    };

    #[cfg(feature = "tracing")]
    let drive = tracing::Instrument::instrument(drive, span);

    let report = drive.await;
    trace_info!(
        submitted = report.submitted,
        skipped = report.skipped,
        completed = report.completed,
        failed = report.failed,
        "sweep finished"
    );
    report
}

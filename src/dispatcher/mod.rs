//! Bounded, deduplicating execution of simulation runs.
//!
//! A [`Dispatcher`] owns a fixed pool of worker slots. Every submission is
//! checked against the ledger first; configurations already recorded resolve
//! immediately. A configuration that is already executing is joined rather
//! than run twice. Everything else queues FIFO for a free slot.
//!
//! Each run executes on tokio's blocking pool with its own deadline. The
//! worker slot travels into the blocking call, so an engine call that
//! outlives its deadline keeps its slot until it returns; its late result is
//! discarded. Only fully successful runs reach the ledger; the append also
//! runs on the blocking pool.

use core::time::Duration;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};

mod handle;

use handle::{Flight, Outcome};
pub use handle::{Handle, HandleStatus};

use crate::error::{Error, Result};
use crate::parameter::{CanonicalKey, ParameterVector};
use crate::simulator::{SimulationError, Simulator};
use crate::statistics::Statistics;
use crate::storage::{Ledger, LedgerEntry};

/// Default number of concurrent engine runs.
pub const DEFAULT_WORKERS: usize = 10;

/// Default deadline for one engine run.
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(300);

struct Shared {
    simulator: Arc<dyn Simulator>,
    ledger: Arc<dyn Ledger>,
    slots: Arc<Semaphore>,
    flights: Mutex<HashMap<CanonicalKey, Arc<Flight>>>,
    workers: usize,
    run_timeout: Duration,
}

impl Shared {
    /// Removes `flight` from the in-flight map if it is still the entry for
    /// `key`.
    fn forget(&self, key: &CanonicalKey, flight: &Arc<Flight>) {
        let mut flights = self.flights.lock();
        if flights.get(key).is_some_and(|f| Arc::ptr_eq(f, flight)) {
            flights.remove(key);
        }
    }
}

struct Job {
    vector: ParameterVector,
    flight: Arc<Flight>,
}

/// Shared handle to the worker pool. Clones share the pool, the ledger and
/// the in-flight map.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use facility_search::dispatcher::Dispatcher;
/// use facility_search::parameter::{ParamSpec, ParameterSpace, ParameterVector};
/// use facility_search::simulator::SimulationError;
/// use facility_search::statistics::Statistics;
/// use facility_search::storage::MemoryLedger;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> facility_search::Result<()> {
/// let space = Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 9)?])?);
/// let engine = |v: &ParameterVector| -> Result<Statistics, SimulationError> {
///     Ok(Statistics { income: v.values()[0] as f64, ..Statistics::default() })
/// };
/// let dispatcher = Dispatcher::builder(engine, Arc::new(MemoryLedger::new()))
///     .workers(2)
///     .build()?;
///
/// let stats = dispatcher
///     .evaluate(space.vector(vec![3])?, Duration::from_secs(5))
///     .await?;
/// assert_eq!(stats.income, 3.0);
/// assert_eq!(dispatcher.ledger().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedSender<Job>,
}

/// Builder for [`Dispatcher`].
pub struct DispatcherBuilder {
    simulator: Arc<dyn Simulator>,
    ledger: Arc<dyn Ledger>,
    workers: usize,
    run_timeout: Duration,
}

impl DispatcherBuilder {
    /// Number of concurrent engine runs. Defaults to
    /// [`DEFAULT_WORKERS`].
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Deadline for one engine run, measured from the moment a worker slot
    /// picks it up. Defaults to [`DEFAULT_RUN_TIMEOUT`].
    #[must_use]
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Builds the dispatcher and starts its scheduler on the current tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero workers or a zero run
    /// timeout, and [`Error::NoRuntime`] when called outside a tokio
    /// runtime.
    pub fn build(self) -> Result<Dispatcher> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        if self.run_timeout.is_zero() {
            return Err(Error::InvalidConfig("run_timeout must be non-zero".into()));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::NoRuntime(e.to_string()))?;

        let shared = Arc::new(Shared {
            simulator: self.simulator,
            ledger: self.ledger,
            slots: Arc::new(Semaphore::new(self.workers)),
            flights: Mutex::new(HashMap::new()),
            workers: self.workers,
            run_timeout: self.run_timeout,
        });
        let (jobs, queue) = mpsc::unbounded_channel();
        runtime.spawn(schedule(Arc::clone(&shared), queue));

        trace_info!(
            workers = self.workers,
            run_timeout_secs = self.run_timeout.as_secs_f64(),
            "dispatcher started"
        );
        Ok(Dispatcher { shared, jobs })
    }
}

impl Dispatcher {
    /// Starts building a dispatcher around `simulator` and `ledger`.
    #[must_use]
    pub fn builder(
        simulator: impl Simulator + 'static,
        ledger: Arc<dyn Ledger>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            simulator: Arc::new(simulator),
            ledger,
            workers: DEFAULT_WORKERS,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Submits `vector` for evaluation.
    ///
    /// Resolves immediately from the ledger when the configuration has been
    /// simulated before, joins the existing run when it is in flight, and
    /// queues a new run otherwise.
    #[must_use]
    pub fn submit(&self, vector: ParameterVector) -> Handle {
        let key = vector.key();
        let mut flights = self.shared.flights.lock();

        if let Some(entry) = self.shared.ledger.get(&key) {
            trace_debug!(key = %key, "ledger hit");
            return Handle::ready(key, entry.statistics.clone());
        }
        if let Some(flight) = flights.get(&key) {
            trace_debug!(key = %key, "joining in-flight run");
            return Handle::waiting(
                key,
                flight.subscribe(),
                Arc::clone(flight),
                Arc::clone(&self.shared),
            );
        }

        let flight = Arc::new(Flight::new());
        let rx = flight.subscribe();
        flights.insert(key.clone(), Arc::clone(&flight));
        drop(flights);

        let job = Job {
            vector,
            flight: Arc::clone(&flight),
        };
        if self.jobs.send(job).is_err() && flight.claim() {
            self.shared.forget(&key, &flight);
            flight.publish(Outcome::Failed(Error::Internal("dispatcher scheduler stopped")));
        }
        Handle::waiting(key, rx, flight, Arc::clone(&self.shared))
    }

    /// Submits `vector` and waits up to `timeout` for its statistics.
    ///
    /// # Errors
    ///
    /// See [`Handle::wait`].
    pub async fn evaluate(&self, vector: ParameterVector, timeout: Duration) -> Result<Statistics> {
        self.submit(vector).wait(timeout).await
    }

    /// Number of distinct configurations queued or executing.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.shared.flights.lock().len()
    }

    /// Size of the worker pool.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.shared.workers
    }

    /// Deadline applied to each engine run.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        self.shared.run_timeout
    }

    /// The ledger results are recorded in.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.shared.ledger
    }
}

/// Hands queued jobs to worker slots in submission order.
async fn schedule(shared: Arc<Shared>, mut queue: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = queue.recv().await {
        let Ok(slot) = Arc::clone(&shared.slots).acquire_owned().await else {
            break;
        };
        if job.flight.is_settled() {
            // Cancelled while queued.
            continue;
        }

        #[cfg(feature = "tracing")]
        let span = tracing::info_span!("simulation", key = %job.vector.key());

        let run = drive(Arc::clone(&shared), job, slot);

        #[cfg(feature = "tracing")]
        let run = tracing::Instrument::instrument(run, span);

        tokio::spawn(run);
    }
}

/// Runs one job on the blocking pool and resolves its flight.
async fn drive(shared: Arc<Shared>, job: Job, slot: OwnedSemaphorePermit) {
    let Job { vector, flight } = job;
    let key = vector.key();

    let simulator = Arc::clone(&shared.simulator);
    let input = vector.clone();
    let mut call = tokio::task::spawn_blocking(move || {
        let _slot = slot;
        simulator.simulate(&input)
    });

    trace_debug!("engine run started");
    let outcome = tokio::select! {
        joined = &mut call => match joined {
            Ok(Ok(stats)) => {
                if !flight.claim() {
                    trace_debug!("run finished after cancellation, result discarded");
                    return;
                }
                // The append does file I/O; keep it off the async workers.
                let ledger = Arc::clone(&shared.ledger);
                let entry = LedgerEntry::new(vector, stats.clone());
                match tokio::task::spawn_blocking(move || ledger.append(entry)).await {
                    Ok(Ok(_)) => Outcome::Completed(stats),
                    Ok(Err(e)) => {
                        trace_warn!(error = %e, "ledger append failed");
                        Outcome::Failed(e)
                    }
                    Err(e) => Outcome::Failed(Error::Storage(format!("ledger append panicked: {e}"))),
                }
            }
            Ok(Err(e)) => {
                if !flight.claim() {
                    return;
                }
                Outcome::Failed(Error::Simulation(e))
            }
            Err(e) => {
                if !flight.claim() {
                    return;
                }
                Outcome::Failed(Error::Simulation(SimulationError::new(format!(
                    "engine call panicked: {e}"
                ))))
            }
        },
        () = tokio::time::sleep(shared.run_timeout) => {
            if !flight.claim() {
                return;
            }
            trace_warn!(timeout_secs = shared.run_timeout.as_secs_f64(), "engine run exceeded its deadline");
            Outcome::Failed(Error::Timeout(shared.run_timeout))
        }
        () = flight.cancelled() => {
            // The canceller already settled and published.
            return;
        }
    };

    #[cfg(feature = "tracing")]
    match &outcome {
        Outcome::Completed(_) => tracing::info!(key = %key, "run completed"),
        Outcome::Failed(e) => tracing::debug!(key = %key, error = %e, "run failed"),
        Outcome::Cancelled => {}
    }
    shared.forget(&key, &flight);
    flight.publish(outcome);
}

//! Single-run request surface.
//!
//! [`SimulationService`] is the transport-agnostic core of a "run one
//! configuration" API. It shares the optimizer's [`Dispatcher`], so single
//! runs queue behind the same worker pool and hit the same ledger. Results
//! are also kept in a small in-memory cache of recent calls, separate from
//! the ledger.

use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::parameter::ParameterSpace;
use crate::statistics::Statistics;
use crate::storage::unix_millis;

/// Named parameter values for one run. Omitted parameters take their
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunRequest(pub BTreeMap<String, i64>);

impl RunRequest {
    /// Parses a JSON object of parameter names to integer values.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Invalid`] if the body is not such an object.
    pub fn from_json(body: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(body).map_err(|e| ServiceError::Invalid(e.to_string()))
    }

    /// Sets one parameter.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: i64) -> Self {
        self.0.insert(name.into(), value);
        self
    }
}

/// KPI projection of one run, as returned to API callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiReport {
    pub simulation_id: String,
    pub vessels_handled_qtt: f64,
    pub prime_cost: f64,
    pub handling_time: f64,
    pub profit: f64,
    pub time_at_terminal: f64,
    pub income: f64,
    pub total_costs: f64,
    pub median_handling_time: f64,
    pub median_at_terminal_time: f64,
}

impl KpiReport {
    #[must_use]
    pub fn new(simulation_id: String, stats: &Statistics) -> Self {
        Self {
            simulation_id,
            vessels_handled_qtt: stats.vessels_handled(),
            prime_cost: stats.prime_cost(),
            handling_time: stats.handling_time(),
            profit: stats.profit(),
            time_at_terminal: stats.time_at_terminal(),
            income: stats.income,
            total_costs: stats.total_costs,
            median_handling_time: stats.median_handling_time,
            median_at_terminal_time: stats.median_at_terminal_time,
        }
    }
}

/// Why a single run could not produce a report.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The request named an unknown parameter, omitted one without a
    /// default, or gave an out-of-bound value.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// No result within the service timeout.
    #[error("simulation timed out after {0:?}")]
    Timeout(Duration),

    /// The engine or the ledger failed.
    #[error("simulation failed: {0}")]
    Engine(Error),
}

impl ServiceError {
    /// HTTP-equivalent status code: 400, 408 or 500.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Invalid(_) => 400,
            Self::Timeout(_) => 408,
            Self::Engine(_) => 500,
        }
    }
}

/// Liveness snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub message: &'static str,
    pub workers: usize,
    pub in_flight: usize,
    pub ledger_entries: usize,
    pub cached_results: usize,
}

/// Single-run service backed by a shared [`Dispatcher`].
pub struct SimulationService {
    dispatcher: Dispatcher,
    space: Arc<ParameterSpace>,
    timeout: Duration,
    requests: AtomicU64,
    /// Reports keyed by request sequence number.
    cache: RwLock<BTreeMap<u64, KpiReport>>,
}

impl SimulationService {
    /// Creates a service that validates requests against `space` and waits
    /// up to `timeout` for each run.
    #[must_use]
    pub fn new(dispatcher: Dispatcher, space: Arc<ParameterSpace>, timeout: Duration) -> Self {
        Self {
            dispatcher,
            space,
            timeout,
            requests: AtomicU64::new(0),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Runs one configuration and caches its report under a fresh id of the
    /// form `sim_<n>_<unix-millis>`.
    ///
    /// # Errors
    ///
    /// See [`ServiceError`].
    pub async fn run(&self, request: RunRequest) -> Result<KpiReport, ServiceError> {
        let vector = self
            .space
            .from_partial_record(&request.0)
            .map_err(|e| ServiceError::Invalid(e.to_string()))?;

        let seq = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let simulation_id = format!("sim_{seq}_{}", unix_millis());
        trace_debug!(id = %simulation_id, key = %vector.key(), "single run requested");

        let stats = self
            .dispatcher
            .evaluate(vector, self.timeout)
            .await
            .map_err(|e| match e {
                Error::Timeout(after) => ServiceError::Timeout(after),
                other => ServiceError::Engine(other),
            })?;

        let report = KpiReport::new(simulation_id, &stats);
        self.cache.write().insert(seq, report.clone());
        Ok(report)
    }

    /// Looks up a cached report.
    #[must_use]
    pub fn result(&self, simulation_id: &str) -> Option<KpiReport> {
        self.cache
            .read()
            .values()
            .find(|r| r.simulation_id == simulation_id)
            .cloned()
    }

    /// Every cached report, in submission order.
    #[must_use]
    pub fn all_results(&self) -> Vec<KpiReport> {
        self.cache.read().values().cloned().collect()
    }

    #[must_use]
    pub fn health(&self) -> Health {
        Health {
            status: "healthy",
            message: "Simulation service is running",
            workers: self.dispatcher.workers(),
            in_flight: self.dispatcher.in_flight(),
            ledger_entries: self.dispatcher.ledger().len(),
            cached_results: self.cache.read().len(),
        }
    }

    /// Empties the report cache and returns how many reports were dropped.
    /// The ledger is not touched.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.write();
        let cleared = cache.len();
        cache.clear();
        trace_info!(cleared, "result cache cleared");
        cleared
    }
}

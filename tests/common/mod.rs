//! Instrumented fake simulators and temp-directory helpers shared by the
//! integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use facility_search::parameter::{ParamSpec, ParameterSpace, ParameterVector};
use facility_search::simulator::{SimulationError, Simulator};
use facility_search::statistics::Statistics;
use parking_lot::Mutex;

/// A fresh directory path under the system temp dir. Not created.
pub fn temp_dir(label: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let mut path = std::env::temp_dir();
    path.push(format!(
        "facility_search_{label}_{}_{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

/// Three knobs of ten values each.
pub fn cube_space() -> Arc<ParameterSpace> {
    Arc::new(
        ParameterSpace::new(vec![
            ParamSpec::new("a", 0, 9).unwrap(),
            ParamSpec::new("b", 0, 9).unwrap(),
            ParamSpec::new("c", 0, 9).unwrap(),
        ])
        .unwrap(),
    )
}

/// One knob with `n` values.
pub fn line_space(n: i64) -> Arc<ParameterSpace> {
    Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, n - 1).unwrap()]).unwrap())
}

/// Deterministic statistics with a real trade-off between throughput and
/// cost.
#[allow(clippy::cast_precision_loss)]
pub fn stats_for(vector: &ParameterVector) -> Statistics {
    let sum: i64 = vector.values().iter().sum();
    let first = vector.values()[0] as f64;
    Statistics {
        vessels_handled_qtt: sum as f64,
        prime_cost: first * 2.0 + 1.0,
        median_handling_time: 10.0 + first,
        median_at_terminal_time: 4.0,
        income: 100.0 + sum as f64 * 3.0,
        total_costs: 20.0 + first * first,
        ..Statistics::default()
    }
}

/// Counts invocations, optionally sleeping before answering.
#[derive(Clone, Default)]
pub struct CountingSimulator {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Arc::default(),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Simulator for CountingSimulator {
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(stats_for(vector))
    }
}

/// Fails the first `failures` calls, then succeeds.
#[derive(Clone, Default)]
pub struct FlakySimulator {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl FlakySimulator {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: Arc::default(),
            failures,
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Simulator for FlakySimulator {
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err(SimulationError::new(format!("engine crashed on {vector}")))
        } else {
            Ok(stats_for(vector))
        }
    }
}

/// Sleeps for `slow` on vectors whose first value is in `slow_values`.
#[derive(Clone)]
pub struct SelectiveSleeper {
    slow_values: Vec<i64>,
    slow: Duration,
}

impl SelectiveSleeper {
    pub fn new(slow_values: Vec<i64>, slow: Duration) -> Self {
        Self { slow_values, slow }
    }
}

impl Simulator for SelectiveSleeper {
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        if self.slow_values.contains(&vector.values()[0]) {
            std::thread::sleep(self.slow);
        }
        Ok(stats_for(vector))
    }
}

/// Records start order and peak concurrency.
#[derive(Clone, Default)]
pub struct RecordingSimulator {
    started: Arc<Mutex<Vec<i64>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl RecordingSimulator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<i64> {
        self.started.lock().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Simulator for RecordingSimulator {
    fn simulate(&self, vector: &ParameterVector) -> Result<Statistics, SimulationError> {
        self.started.lock().push(vector.values()[0]);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(stats_for(vector))
    }
}

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Experiment orchestration and multi-objective search for simulated
//! facilities. An expensive, black-box simulation is invoked through a
//! bounded worker pool that deduplicates work against a durable ledger, and
//! an NSGA-II loop proposes new configurations and collects the results into
//! a Pareto frontier.
//!
//! # Getting Started
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use facility_search::prelude::*;
//!
//! # async fn example() -> facility_search::Result<()> {
//! let space = Arc::new(ParameterSpace::terminal());
//! let ledger = Arc::new(JournalLedger::open("results", Arc::clone(&space))?);
//! let dispatcher = Dispatcher::builder(ProcessSimulator::new("./run-model"), ledger).build()?;
//!
//! let optimizer = GeneticOptimizer::builder(Arc::clone(&space), dispatcher)
//!     .population_size(20)
//!     .generations(10)
//!     .seed(7)
//!     .build()?;
//!
//! let outcome = optimizer.run().await?;
//! for member in outcome.frontier.members() {
//!     println!("{} -> {:?}", member.vector.key(), member.objectives.values());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`ParameterVector`](parameter::ParameterVector) | One bounded configuration; its canonical key drives deduplication. |
//! | [`Simulator`](simulator::Simulator) | Blocking adapter to the external simulation engine. |
//! | [`Ledger`](storage::Ledger) | Append-only record of every completed simulation. |
//! | [`Dispatcher`](dispatcher::Dispatcher) | FIFO worker pool with single-flight per key and per-run deadlines. |
//! | [`FitnessExtractor`](fitness::FitnessExtractor) | Projects statistics onto minimize-space objective vectors. |
//! | [`GeneticOptimizer`](optimizer::GeneticOptimizer) | NSGA-II search driving the dispatcher generation by generation. |
//! | [`Frontier`](frontier::Frontier) | Non-dominated set over everything evaluated. |
//! | [`SimulationService`](service::SimulationService) | Single-run request surface sharing the dispatcher. |
//! | [`sweep`](sweep::sweep) | Exhaustive run over a stepped [`Grid`](parameter::Grid), skipping recorded configurations. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at dispatch and search milestones | on |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::warn!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => { tracing::warn!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}

pub mod dispatcher;
mod error;
pub mod fitness;
pub mod frontier;
pub mod optimizer;
pub mod parameter;
pub mod pareto;
mod rng_util;
pub mod service;
pub mod simulator;
pub mod statistics;
pub mod storage;
pub mod sweep;
mod types;

pub use error::{Error, Result};
pub use types::Direction;

/// Convenient wildcard import for the most common types.
///
/// ```
/// use facility_search::prelude::*;
/// ```
pub mod prelude {
    pub use crate::dispatcher::{Dispatcher, DispatcherBuilder, Handle, HandleStatus};
    pub use crate::error::{Error, Result};
    pub use crate::fitness::{FitnessExtractor, Kpi, Objective, ObjectiveVector};
    pub use crate::frontier::{Evaluated, Frontier};
    pub use crate::optimizer::{
        Crossover, GenerationReport, GeneticOptimizer, Mutation, ObjectiveStats, SearchConfig,
        SearchOutcome, SearchState,
    };
    pub use crate::parameter::{
        BoundPolicy, CanonicalKey, Grid, ParamSpec, ParameterSpace, ParameterVector,
    };
    pub use crate::service::{KpiReport, RunRequest, ServiceError, SimulationService};
    pub use crate::simulator::{ProcessSimulator, SimulationError, Simulator};
    pub use crate::statistics::Statistics;
    pub use crate::storage::{JournalLedger, Ledger, LedgerEntry, MemoryLedger};
    pub use crate::sweep::{SweepReport, sweep};
    pub use crate::types::Direction;
}

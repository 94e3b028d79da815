use core::time::Duration;
use std::path::PathBuf;

use crate::simulator::SimulationError;

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a parameter spec has a lower bound above its upper bound.
    #[error("invalid bounds for '{name}': low ({low}) must be less than or equal to high ({high})")]
    InvalidBounds {
        /// The parameter name.
        name: String,
        /// The lower bound value.
        low: i64,
        /// The upper bound value.
        high: i64,
    },

    /// Returned when a value lies outside its parameter's declared bound.
    #[error("value {value} for '{name}' is outside [{low}, {high}]")]
    OutOfBounds {
        /// The parameter name.
        name: String,
        /// The rejected value.
        value: i64,
        /// The lower bound value.
        low: i64,
        /// The upper bound value.
        high: i64,
    },

    /// Returned when a named record mentions a parameter the space does not declare.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    /// Returned when a named record omits a parameter that has no default.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// Returned when a value list does not match the space's arity.
    #[error("arity mismatch: expected {expected} values but got {got}")]
    ArityMismatch {
        /// The number of declared parameters.
        expected: usize,
        /// The number of values provided.
        got: usize,
    },

    /// Returned when a builder is configured with unusable settings.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when the simulation engine reports a fault.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Returned when an evaluation exceeded its deadline.
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// Returned when an evaluation was cancelled before it produced a result.
    #[error("evaluation was cancelled")]
    Cancelled,

    /// Returned when a ledger operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned when a durable ledger line cannot be replayed.
    #[error("ledger corruption in {path}:{line}: {reason}")]
    LedgerCorruption {
        /// The log file containing the bad line.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// What failed to parse.
        reason: String,
    },

    /// Returned when a component that spawns tasks is built outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Returns `true` for failures that belong to a single evaluation
    /// (engine fault, deadline, cancellation) rather than to the process.
    #[must_use]
    pub fn is_evaluation_failure(&self) -> bool {
        matches!(self, Self::Simulation(_) | Self::Timeout(_) | Self::Cancelled)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

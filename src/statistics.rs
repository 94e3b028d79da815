//! The statistics value returned by one simulation run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Aggregate statistics for one simulated configuration.
///
/// Holds the raw engine figures the KPIs are derived from plus any extra
/// sub-statistics the engine chose to report. Field names follow the
/// engine's JSON convention.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Number of vessels handled during the simulated period.
    pub vessels_handled_qtt: f64,
    /// Prime cost of handling.
    pub prime_cost: f64,
    /// Median total handling time per shipment.
    pub median_handling_time: f64,
    /// Median time a shipment spends at the terminal.
    pub median_at_terminal_time: f64,
    /// Total income.
    pub income: f64,
    /// Total costs.
    pub total_costs: f64,
    /// Additional raw sub-statistics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, f64>,
}

impl Statistics {
    #[must_use]
    pub fn vessels_handled(&self) -> f64 {
        self.vessels_handled_qtt
    }

    #[must_use]
    pub fn prime_cost(&self) -> f64 {
        self.prime_cost
    }

    /// Handling time net of the time spent at the terminal.
    #[must_use]
    pub fn handling_time(&self) -> f64 {
        self.median_handling_time - self.median_at_terminal_time
    }

    #[must_use]
    pub fn profit(&self) -> f64 {
        self.income - self.total_costs
    }

    #[must_use]
    pub fn time_at_terminal(&self) -> f64 {
        self.median_at_terminal_time
    }
}

/// Rounds to `places` decimal places.
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
pub(crate) fn round_to(value: f64, places: u32) -> f64 {
    let scale = 10_f64.powi(places as i32);
    (value * scale).round() / scale
}

//! Projection of simulation statistics onto objective vectors.
//!
//! A [`FitnessExtractor`] is an ordered list of [`Objective`]s. Extraction is
//! a pure function: the same statistics always give the same vector, and the
//! vector is in minimize-space (maximize objectives are negated) so the
//! [`pareto`](crate::pareto) functions can compare any two vectors directly.

use serde::{Deserialize, Serialize};

use crate::statistics::Statistics;
use crate::types::Direction;

/// A key performance indicator derived from [`Statistics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kpi {
    VesselsHandled,
    PrimeCost,
    /// Median handling time net of time at the terminal.
    HandlingTime,
    /// Income minus total costs.
    Profit,
    TimeAtTerminal,
}

impl Kpi {
    /// Reads this KPI from `stats`.
    #[must_use]
    pub fn extract(self, stats: &Statistics) -> f64 {
        match self {
            Self::VesselsHandled => stats.vessels_handled(),
            Self::PrimeCost => stats.prime_cost(),
            Self::HandlingTime => stats.handling_time(),
            Self::Profit => stats.profit(),
            Self::TimeAtTerminal => stats.time_at_terminal(),
        }
    }
}

/// One optimization target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub kpi: Kpi,
    pub direction: Direction,
}

impl Objective {
    #[must_use]
    pub fn maximize(kpi: Kpi) -> Self {
        Self {
            kpi,
            direction: Direction::Maximize,
        }
    }

    #[must_use]
    pub fn minimize(kpi: Kpi) -> Self {
        Self {
            kpi,
            direction: Direction::Minimize,
        }
    }
}

/// Fixed-length objective values in minimize-space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectiveVector(Vec<f64>);

impl ObjectiveVector {
    /// Wraps raw minimize-space values. `NaN` becomes `+inf`, the worst
    /// value; infinities are kept, so `-inf` still ranks best.
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self(
            values
                .into_iter()
                .map(|v| if v.is_nan() { f64::INFINITY } else { v })
                .collect(),
        )
    }

    /// The worst possible vector, assigned to failed evaluations.
    #[must_use]
    pub fn sentinel(len: usize) -> Self {
        Self(vec![f64::INFINITY; len])
    }

    /// Returns `true` if every value is `+inf`.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        self.0.iter().all(|v| *v == f64::INFINITY)
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `self` Pareto-dominates `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        crate::pareto::dominates(&self.0, &other.0)
    }
}

/// Maps [`Statistics`] to [`ObjectiveVector`]s.
///
/// # Examples
///
/// ```
/// use facility_search::fitness::{FitnessExtractor, Kpi, Objective};
/// use facility_search::statistics::Statistics;
///
/// let extractor = FitnessExtractor::new(vec![
///     Objective::maximize(Kpi::Profit),
///     Objective::minimize(Kpi::PrimeCost),
/// ]);
/// let stats = Statistics {
///     income: 100.0,
///     total_costs: 30.0,
///     prime_cost: 4.0,
///     ..Statistics::default()
/// };
/// let fitness = extractor.extract(&stats);
/// assert_eq!(fitness.values(), &[-70.0, 4.0]);
/// assert_eq!(extractor.denormalize(&fitness), vec![70.0, 4.0]);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FitnessExtractor {
    objectives: Vec<Objective>,
}

impl FitnessExtractor {
    #[must_use]
    pub fn new(objectives: Vec<Objective>) -> Self {
        Self { objectives }
    }

    /// Five objectives for terminal studies: maximize vessels handled,
    /// minimize prime cost, minimize handling time, maximize profit and
    /// minimize time at terminal.
    #[must_use]
    pub fn terminal() -> Self {
        Self::new(vec![
            Objective::maximize(Kpi::VesselsHandled),
            Objective::minimize(Kpi::PrimeCost),
            Objective::minimize(Kpi::HandlingTime),
            Objective::maximize(Kpi::Profit),
            Objective::minimize(Kpi::TimeAtTerminal),
        ])
    }

    #[must_use]
    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    /// Extracts the minimize-space objective vector for `stats`.
    #[must_use]
    pub fn extract(&self, stats: &Statistics) -> ObjectiveVector {
        ObjectiveVector::new(
            self.objectives
                .iter()
                .map(|o| o.direction.normalize(o.kpi.extract(stats)))
                .collect(),
        )
    }

    /// The worst vector for this extractor's arity.
    #[must_use]
    pub fn sentinel(&self) -> ObjectiveVector {
        ObjectiveVector::sentinel(self.objectives.len())
    }

    /// Maps a minimize-space vector back to KPI values for reporting.
    #[must_use]
    pub fn denormalize(&self, vector: &ObjectiveVector) -> Vec<f64> {
        self.objectives
            .iter()
            .zip(vector.values())
            .map(|(o, &v)| o.direction.denormalize(v))
            .collect()
    }
}

impl Default for FitnessExtractor {
    fn default() -> Self {
        Self::terminal()
    }
}

//! Pareto frontier over evaluated configurations.

use serde::Serialize;

use crate::fitness::{FitnessExtractor, ObjectiveVector};
use crate::parameter::ParameterVector;
use crate::pareto::pareto_front_indices;
use crate::storage::Ledger;

/// A configuration paired with its objective vector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluated {
    pub vector: ParameterVector,
    pub objectives: ObjectiveVector,
}

impl Evaluated {
    #[must_use]
    pub fn new(vector: ParameterVector, objectives: ObjectiveVector) -> Self {
        Self { vector, objectives }
    }

    /// Returns `true` if the evaluation failed and carries sentinel fitness.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.objectives.is_sentinel()
    }
}

/// The non-dominated members of an evaluated set.
///
/// A frontier is always recomputed from the full set it summarizes; it is
/// never patched incrementally. Failed evaluations are never members.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use facility_search::fitness::ObjectiveVector;
/// use facility_search::frontier::{Evaluated, Frontier};
/// use facility_search::parameter::{ParamSpec, ParameterSpace};
///
/// let space = Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 9)?])?);
/// let evaluated = vec![
///     Evaluated::new(space.vector(vec![1])?, ObjectiveVector::new(vec![1.0, 2.0])),
///     Evaluated::new(space.vector(vec![2])?, ObjectiveVector::new(vec![2.0, 1.0])),
///     Evaluated::new(space.vector(vec![3])?, ObjectiveVector::new(vec![3.0, 3.0])),
/// ];
/// let frontier = Frontier::build(&evaluated);
/// assert_eq!(frontier.len(), 2);
/// # Ok::<(), facility_search::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Frontier {
    members: Vec<Evaluated>,
}

impl Frontier {
    /// Builds the first non-dominated front of `evaluated`, keeping members
    /// in their original order.
    #[must_use]
    pub fn build(evaluated: &[Evaluated]) -> Self {
        let candidates: Vec<&Evaluated> = evaluated.iter().filter(|e| !e.is_failed()).collect();
        let values: Vec<Vec<f64>> = candidates
            .iter()
            .map(|e| e.objectives.values().to_vec())
            .collect();

        let members = pareto_front_indices(&values)
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect();
        Self { members }
    }

    /// Builds the frontier across every entry recorded in `ledger`.
    #[must_use]
    pub fn from_ledger(ledger: &dyn Ledger, extractor: &FitnessExtractor) -> Self {
        let evaluated: Vec<Evaluated> = ledger
            .entries()
            .iter()
            .map(|entry| Evaluated::new(entry.vector.clone(), extractor.extract(&entry.statistics)))
            .collect();
        Self::build(&evaluated)
    }

    #[must_use]
    pub fn members(&self) -> &[Evaluated] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member with the lowest minimize-space value in objective
    /// `index`. Ties go to the earliest member.
    #[must_use]
    pub fn best_by(&self, index: usize) -> Option<&Evaluated> {
        self.members
            .iter()
            .filter(|m| index < m.objectives.len())
            .reduce(|best, m| {
                if m.objectives.values()[index] < best.objectives.values()[index] {
                    m
                } else {
                    best
                }
            })
    }

    /// Returns `true` if some member has the same configuration as `vector`.
    #[must_use]
    pub fn contains(&self, vector: &ParameterVector) -> bool {
        self.members.iter().any(|m| &m.vector == vector)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fitness::{Kpi, Objective};
    use crate::parameter::{ParamSpec, ParameterSpace};
    use crate::statistics::Statistics;
    use crate::storage::{LedgerEntry, MemoryLedger};

    fn space() -> Arc<ParameterSpace> {
        Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 99).unwrap()]).unwrap())
    }

    fn evaluated(space: &Arc<ParameterSpace>, x: i64, objectives: &[f64]) -> Evaluated {
        Evaluated::new(
            space.vector(vec![x]).unwrap(),
            ObjectiveVector::new(objectives.to_vec()),
        )
    }

    #[test]
    fn excludes_failed_members() {
        let space = space();
        let set = vec![
            evaluated(&space, 1, &[5.0, 5.0]),
            Evaluated::new(space.vector(vec![2]).unwrap(), ObjectiveVector::sentinel(2)),
        ];
        let frontier = Frontier::build(&set);
        assert_eq!(frontier.len(), 1);
        assert_eq!(frontier.members()[0].vector.values(), &[1]);
    }

    #[test]
    fn all_failed_is_empty() {
        let space = space();
        let set = vec![Evaluated::new(
            space.vector(vec![2]).unwrap(),
            ObjectiveVector::sentinel(3),
        )];
        assert!(Frontier::build(&set).is_empty());
    }

    #[test]
    fn best_by_picks_minimum() {
        let space = space();
        let set = vec![
            evaluated(&space, 1, &[1.0, 9.0]),
            evaluated(&space, 2, &[9.0, 1.0]),
            evaluated(&space, 3, &[5.0, 5.0]),
        ];
        let frontier = Frontier::build(&set);
        assert_eq!(frontier.best_by(0).unwrap().vector.values(), &[1]);
        assert_eq!(frontier.best_by(1).unwrap().vector.values(), &[2]);
        assert!(frontier.best_by(7).is_none());
    }

    #[test]
    fn from_ledger_uses_every_entry() {
        let space = space();
        let ledger = MemoryLedger::new();
        for (x, income, cost) in [(1, 10.0, 1.0), (2, 5.0, 1.0), (3, 20.0, 9.0)] {
            ledger
                .append(LedgerEntry::new(
                    space.vector(vec![x]).unwrap(),
                    Statistics {
                        income,
                        prime_cost: cost,
                        ..Statistics::default()
                    },
                ))
                .unwrap();
        }
        let extractor = FitnessExtractor::new(vec![
            Objective::maximize(Kpi::Profit),
            Objective::minimize(Kpi::PrimeCost),
        ]);
        let frontier = Frontier::from_ledger(&ledger, &extractor);
        let xs: Vec<i64> = frontier.members().iter().map(|m| m.vector.values()[0]).collect();
        assert_eq!(xs, vec![1, 3]);
    }
}

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{CountingSimulator, cube_space};
use facility_search::dispatcher::Dispatcher;
use facility_search::fitness::{FitnessExtractor, Kpi, Objective};
use facility_search::frontier::Frontier;
use facility_search::optimizer::GeneticOptimizer;
use facility_search::statistics::Statistics;
use facility_search::storage::{Ledger, LedgerEntry, MemoryLedger};

fn cost_and_throughput() -> FitnessExtractor {
    FitnessExtractor::new(vec![
        Objective::minimize(Kpi::PrimeCost),
        Objective::maximize(Kpi::VesselsHandled),
    ])
}

fn stats(prime_cost: f64, vessels: f64) -> Statistics {
    Statistics {
        prime_cost,
        vessels_handled_qtt: vessels,
        ..Statistics::default()
    }
}

#[test]
fn dominated_configurations_are_excluded() {
    let space = cube_space();
    let ledger = MemoryLedger::new();
    for (values, s) in [
        (vec![1, 0, 0], stats(1.0, 5.0)),
        (vec![2, 0, 0], stats(2.0, 5.0)),
        (vec![3, 0, 0], stats(1.0, 3.0)),
    ] {
        ledger
            .append(LedgerEntry::new(space.vector(values).unwrap(), s))
            .unwrap();
    }

    let extractor = cost_and_throughput();
    let frontier = Frontier::from_ledger(&ledger, &extractor);
    assert_eq!(frontier.len(), 1);
    let member = &frontier.members()[0];
    assert_eq!(member.vector.key().as_str(), "1-0-0");
    assert_eq!(extractor.denormalize(&member.objectives), vec![1.0, 5.0]);

    // Recomputing over the frontier itself changes nothing.
    assert_eq!(Frontier::build(frontier.members()), frontier);
}

#[test]
fn trade_offs_are_all_kept() {
    let space = cube_space();
    let ledger = MemoryLedger::new();
    for (x, s) in [(1, stats(1.0, 2.0)), (2, stats(2.0, 4.0)), (3, stats(3.0, 6.0)), (4, stats(3.0, 5.0))] {
        ledger
            .append(LedgerEntry::new(space.vector(vec![x, 0, 0]).unwrap(), s))
            .unwrap();
    }

    let frontier = Frontier::from_ledger(&ledger, &cost_and_throughput());
    let xs: Vec<i64> = frontier.members().iter().map(|m| m.vector.values()[0]).collect();
    assert_eq!(xs, vec![1, 2, 3]);

    // Cheapest is objective 0, highest throughput is objective 1.
    assert_eq!(frontier.best_by(0).unwrap().vector.values()[0], 1);
    assert_eq!(frontier.best_by(1).unwrap().vector.values()[0], 3);
    assert!(frontier.best_by(2).is_none());
}

#[test]
fn empty_ledger_has_empty_frontier() {
    let frontier = Frontier::from_ledger(&MemoryLedger::new(), &FitnessExtractor::terminal());
    assert!(frontier.is_empty());
}

#[tokio::test]
async fn search_frontier_matches_ledger_frontier() {
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = Dispatcher::builder(CountingSimulator::new(), ledger.clone())
        .build()
        .unwrap();
    let outcome = GeneticOptimizer::builder(cube_space(), dispatcher)
        .population_size(6)
        .generations(3)
        .objectives(cost_and_throughput())
        .seed(5)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let from_search: BTreeSet<String> = outcome
        .frontier
        .members()
        .iter()
        .map(|m| m.vector.key().to_string())
        .collect();
    let from_ledger: BTreeSet<String> = Frontier::from_ledger(&*ledger, &cost_and_throughput())
        .members()
        .iter()
        .map(|m| m.vector.key().to_string())
        .collect();
    assert_eq!(from_search, from_ledger);
    assert!(outcome.frontier.members().iter().all(|m| outcome.frontier.contains(&m.vector)));
}

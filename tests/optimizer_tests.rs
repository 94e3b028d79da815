//! End-to-end tests for the genetic search loop.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::{CountingSimulator, FlakySimulator, SelectiveSleeper, cube_space, line_space};
use facility_search::Error;
use facility_search::dispatcher::Dispatcher;
use facility_search::optimizer::{Crossover, GeneticOptimizer, Mutation, SearchOutcome, SearchState};
use facility_search::storage::{Ledger, MemoryLedger};

fn keys(outcome: &SearchOutcome) -> BTreeSet<String> {
    outcome
        .frontier
        .members()
        .iter()
        .map(|m| m.vector.key().to_string())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn search_runs_every_generation() {
    let space = cube_space();
    let sim = CountingSimulator::new();
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = Dispatcher::builder(sim.clone(), ledger.clone())
        .workers(4)
        .build()
        .unwrap();

    let outcome = GeneticOptimizer::builder(space, dispatcher)
        .population_size(8)
        .generations(3)
        .seed(1)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.history.len(), 4);
    for (i, report) in outcome.history.iter().enumerate() {
        assert_eq!(report.generation, i);
        assert_eq!(report.evaluated, 8);
        assert_eq!(report.failed, 0);
        assert_eq!(report.ledger_hits, 0);
        assert!(report.frontier_size > 0);
        assert_eq!(report.objective_stats.len(), 5);
        for stats in &report.objective_stats {
            assert!(stats.min <= stats.mean && stats.mean <= stats.max);
            assert!(stats.std >= 0.0);
        }
    }

    // No configuration is simulated twice within a run.
    let total: usize = outcome.history.iter().map(|r| r.evaluated).sum();
    assert_eq!(ledger.len(), total);
    assert_eq!(sim.calls(), total);

    assert_eq!(outcome.final_population.len(), 8);
    assert!(!outcome.frontier.is_empty());
}

#[tokio::test]
async fn seeded_runs_are_reproducible() {
    async fn search(seed: u64) -> SearchOutcome {
        let dispatcher = Dispatcher::builder(CountingSimulator::new(), Arc::new(MemoryLedger::new()))
            .build()
            .unwrap();
        GeneticOptimizer::builder(cube_space(), dispatcher)
            .population_size(6)
            .generations(4)
            .crossover(Crossover::Simulated { eta: 15.0 })
            .mutation(Mutation::Polynomial { eta: 20.0 })
            .seed(seed)
            .build()
            .unwrap()
            .run()
            .await
            .unwrap()
    }

    let a = search(42).await;
    let b = search(42).await;
    assert_eq!(a.history, b.history);
    assert_eq!(a.final_population, b.final_population);
    assert_eq!(keys(&a), keys(&b));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_evaluation_does_not_block_the_generation() {
    let space = line_space(4);
    let dispatcher = Dispatcher::builder(
        SelectiveSleeper::new(vec![0], Duration::from_secs(1)),
        Arc::new(MemoryLedger::new()),
    )
    .build()
    .unwrap();

    let mut optimizer = GeneticOptimizer::builder(space, dispatcher.clone())
        .population_size(4)
        .generations(1)
        .evaluation_timeout(Duration::from_millis(100))
        .seed(3)
        .build()
        .unwrap();
    assert_eq!(optimizer.state(), SearchState::Seeding);

    assert_eq!(optimizer.step().await.unwrap(), SearchState::Evaluating);
    assert_eq!(optimizer.step().await.unwrap(), SearchState::Advancing);

    let report = &optimizer.history()[0];
    assert_eq!(report.evaluated, 4);
    assert_eq!(report.failed, 1);
    assert!(!optimizer.frontier().members().iter().any(|m| m.vector.values()[0] == 0));
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(dispatcher.ledger().len(), 3);

    // All four configurations are known, so nothing is left to breed.
    assert_eq!(optimizer.step().await.unwrap(), SearchState::Done);
    assert_eq!(optimizer.step().await.unwrap(), SearchState::Done);
    assert_eq!(optimizer.history().len(), 1);
}

#[tokio::test]
async fn failing_engine_still_finishes() {
    let dispatcher = Dispatcher::builder(FlakySimulator::always_failing(), Arc::new(MemoryLedger::new()))
        .build()
        .unwrap();
    let outcome = GeneticOptimizer::builder(cube_space(), dispatcher.clone())
        .population_size(4)
        .generations(2)
        .seed(9)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.history.len(), 3);
    assert!(outcome.history.iter().all(|r| r.failed == r.evaluated));
    assert!(outcome.history.iter().all(|r| r.objective_stats.is_empty()));
    assert!(outcome.frontier.is_empty());
    assert!(outcome.final_population.iter().all(|e| e.is_failed()));
    assert!(dispatcher.ledger().is_empty());
}

#[tokio::test]
async fn rerun_resolves_from_the_ledger() {
    let sim = CountingSimulator::new();
    let ledger = Arc::new(MemoryLedger::new());
    let dispatcher = Dispatcher::builder(sim.clone(), ledger.clone())
        .build()
        .unwrap();

    let build = || {
        GeneticOptimizer::builder(cube_space(), dispatcher.clone())
            .population_size(5)
            .generations(2)
            .seed(77)
            .build()
            .unwrap()
    };

    let first = build().run().await.unwrap();
    let calls = sim.calls();
    assert_eq!(calls, ledger.len());

    let second = build().run().await.unwrap();
    assert_eq!(sim.calls(), calls);
    for report in &second.history {
        assert_eq!(report.ledger_hits, report.evaluated);
    }
    assert_eq!(keys(&first), keys(&second));
}

#[tokio::test]
async fn exhausted_space_ends_early() {
    let dispatcher = Dispatcher::builder(CountingSimulator::new(), Arc::new(MemoryLedger::new()))
        .build()
        .unwrap();
    let outcome = GeneticOptimizer::builder(line_space(3), dispatcher)
        .population_size(5)
        .generations(10)
        .seed(0)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.history.len(), 1);
    assert_eq!(outcome.history[0].evaluated, 3);
    assert_eq!(outcome.final_population.len(), 3);
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let dispatcher = Dispatcher::builder(CountingSimulator::new(), Arc::new(MemoryLedger::new()))
        .build()
        .unwrap();

    let too_small = GeneticOptimizer::builder(cube_space(), dispatcher.clone())
        .population_size(1)
        .build();
    assert!(matches!(too_small, Err(Error::InvalidConfig(_))));

    let bad_rate = GeneticOptimizer::builder(cube_space(), dispatcher.clone())
        .mutation_rate(2.0)
        .build();
    assert!(matches!(bad_rate, Err(Error::InvalidConfig(_))));

    let no_generations = GeneticOptimizer::builder(cube_space(), dispatcher)
        .generations(0)
        .build();
    assert!(matches!(no_generations, Err(Error::InvalidConfig(_))));
}

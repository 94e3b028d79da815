use std::sync::Arc;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use facility_search::dispatcher::Dispatcher;
use facility_search::fitness::ObjectiveVector;
use facility_search::frontier::{Evaluated, Frontier};
use facility_search::parameter::{ParamSpec, ParameterSpace, ParameterVector};
use facility_search::pareto::non_dominated_sort;
use facility_search::simulator::SimulationError;
use facility_search::statistics::Statistics;
use facility_search::storage::MemoryLedger;

fn space() -> Arc<ParameterSpace> {
    Arc::new(ParameterSpace::new(vec![ParamSpec::new("x", 0, 1_000_000).unwrap()]).unwrap())
}

fn random_evaluated(n: usize, objectives: usize, seed: u64) -> Vec<Evaluated> {
    let space = space();
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..n)
        .map(|i| {
            let values = (0..objectives).map(|_| rng.f64()).collect();
            Evaluated::new(
                space.vector(vec![i64::try_from(i).unwrap()]).unwrap(),
                ObjectiveVector::new(values),
            )
        })
        .collect()
}

fn bench_frontier_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("frontier_build");

    for n in [100, 500, 2000] {
        let evaluated = random_evaluated(n, 5, 42);
        group.bench_with_input(BenchmarkId::new("n", n), &evaluated, |b, evaluated| {
            b.iter(|| Frontier::build(evaluated));
        });
    }
    group.finish();
}

fn bench_non_dominated_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("non_dominated_sort");
    group.sample_size(20);

    for objectives in [2, 5] {
        let values: Vec<Vec<f64>> = random_evaluated(500, objectives, 7)
            .into_iter()
            .map(|e| e.objectives.values().to_vec())
            .collect();
        group.bench_with_input(
            BenchmarkId::new("objectives", objectives),
            &values,
            |b, values| {
                b.iter(|| non_dominated_sort(values));
            },
        );
    }
    group.finish();
}

fn bench_ledger_hits(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let space = space();
    let engine = |v: &ParameterVector| -> Result<Statistics, SimulationError> {
        #[allow(clippy::cast_precision_loss)]
        let income = v.values()[0] as f64;
        Ok(Statistics {
            income,
            ..Statistics::default()
        })
    };
    let dispatcher = runtime.block_on(async {
        let dispatcher = Dispatcher::builder(engine, Arc::new(MemoryLedger::new()))
            .build()
            .unwrap();
        for x in 0..1000 {
            dispatcher
                .evaluate(space.vector(vec![x]).unwrap(), Duration::from_secs(5))
                .await
                .unwrap();
        }
        dispatcher
    });

    c.bench_function("dispatcher_ledger_hit", |b| {
        let mut x = 0;
        b.iter(|| {
            x = (x + 1) % 1000;
            let handle = dispatcher.submit(space.vector(vec![x]).unwrap());
            assert!(handle.from_ledger());
        });
    });
}

criterion_group!(
    benches,
    bench_frontier_build,
    bench_non_dominated_sort,
    bench_ledger_hits
);
criterion_main!(benches);

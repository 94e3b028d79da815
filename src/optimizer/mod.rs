//! NSGA-II search over a [`ParameterSpace`], evaluated through a
//! [`Dispatcher`].
//!
//! The optimizer is an explicit state machine:
//!
//! | State | Action on [`step`](GeneticOptimizer::step) | Next |
//! |---|---|---|
//! | [`Seeding`](SearchState::Seeding) | Sample the initial population | `Evaluating` |
//! | [`Evaluating`](SearchState::Evaluating) | Submit the generation and await every result | `Advancing` |
//! | [`Advancing`](SearchState::Advancing) | Elitist survival, then breed the next generation | `Evaluating` or `Done` |
//! | [`Done`](SearchState::Done) | Nothing | `Done` |
//!
//! Failed or timed-out evaluations receive the worst possible fitness and
//! never hold up a generation. Configurations are never evaluated twice in
//! one run; configurations recorded by earlier runs resolve from the ledger.

use core::time::Duration;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

mod config;
mod operators;

pub use config::{Crossover, Mutation, SearchConfig};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::fitness::FitnessExtractor;
use crate::frontier::{Evaluated, Frontier};
use crate::parameter::{CanonicalKey, ParameterSpace, ParameterVector};
use crate::statistics::Statistics;

/// Sampling attempts allowed per requested individual before the space is
/// treated as exhausted.
const ATTEMPTS_PER_INDIVIDUAL: usize = 32;

/// Where a [`GeneticOptimizer`] is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SearchState {
    Seeding,
    Evaluating,
    Advancing,
    Done,
}

/// Spread of one objective across a generation, in KPI units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ObjectiveStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl ObjectiveStats {
    /// Summarizes `values`, or returns `None` when there are none.
    #[must_use]
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(Self {
            min,
            mean,
            max,
            std: variance.sqrt(),
        })
    }
}

/// Summary of one evaluated generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    /// Zero for the seeded population.
    pub generation: usize,
    /// Configurations submitted in this generation.
    pub evaluated: usize,
    /// Evaluations that failed or timed out.
    pub failed: usize,
    /// Evaluations answered from the ledger without running the engine.
    pub ledger_hits: usize,
    /// Size of the run's cumulative frontier after this generation.
    pub frontier_size: usize,
    /// One entry per objective over the members that did not fail; empty
    /// when every member failed.
    pub objective_stats: Vec<ObjectiveStats>,
}

/// Result of a completed search.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    /// Survivors of the last generation.
    pub final_population: Vec<Evaluated>,
    /// Non-dominated set over everything evaluated in the run.
    pub frontier: Frontier,
    pub history: Vec<GenerationReport>,
}

/// Builder for [`GeneticOptimizer`].
pub struct GeneticOptimizerBuilder {
    space: Arc<ParameterSpace>,
    dispatcher: Dispatcher,
    config: SearchConfig,
}

impl GeneticOptimizerBuilder {
    /// Replaces every setting at once.
    #[must_use]
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn population_size(mut self, size: usize) -> Self {
        self.config.population_size = size;
        self
    }

    #[must_use]
    pub fn generations(mut self, generations: usize) -> Self {
        self.config.generations = generations;
        self
    }

    #[must_use]
    pub fn mutation_rate(mut self, rate: f64) -> Self {
        self.config.mutation_rate = rate;
        self
    }

    #[must_use]
    pub fn crossover_rate(mut self, rate: f64) -> Self {
        self.config.crossover_rate = rate;
        self
    }

    #[must_use]
    pub fn evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.config.evaluation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn crossover(mut self, crossover: Crossover) -> Self {
        self.config.crossover = crossover;
        self
    }

    #[must_use]
    pub fn mutation(mut self, mutation: Mutation) -> Self {
        self.config.mutation = mutation;
        self
    }

    #[must_use]
    pub fn objectives(mut self, objectives: FitnessExtractor) -> Self {
        self.config.objectives = objectives;
        self
    }

    /// Validates the settings and builds the optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a setting is unusable.
    pub fn build(self) -> Result<GeneticOptimizer> {
        self.config.validate()?;
        let rng = self
            .config
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        Ok(GeneticOptimizer {
            space: self.space,
            dispatcher: self.dispatcher,
            config: self.config,
            rng,
            state: SearchState::Seeding,
            generation: 0,
            pending: Vec::new(),
            evaluated: Vec::new(),
            population: Vec::new(),
            archive: Vec::new(),
            seen: HashSet::new(),
            history: Vec::new(),
        })
    }
}

/// Multi-objective genetic search driving a [`Dispatcher`].
///
/// Each generation is submitted as one batch; generations never overlap.
/// Survival is elitist (μ+λ): parents and offspring compete together by
/// non-dominated rank and then crowding distance.
pub struct GeneticOptimizer {
    space: Arc<ParameterSpace>,
    dispatcher: Dispatcher,
    config: SearchConfig,
    rng: fastrand::Rng,
    state: SearchState,
    generation: usize,
    /// Vectors awaiting evaluation.
    pending: Vec<ParameterVector>,
    /// Results of the latest evaluation batch.
    evaluated: Vec<Evaluated>,
    /// Current survivors.
    population: Vec<Evaluated>,
    /// Everything evaluated in this run.
    archive: Vec<Evaluated>,
    seen: HashSet<CanonicalKey>,
    history: Vec<GenerationReport>,
}

impl GeneticOptimizer {
    /// Starts building an optimizer over `space` that evaluates through
    /// `dispatcher`.
    #[must_use]
    pub fn builder(space: Arc<ParameterSpace>, dispatcher: Dispatcher) -> GeneticOptimizerBuilder {
        GeneticOptimizerBuilder {
            space,
            dispatcher,
            config: SearchConfig::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SearchState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Index of the generation being evaluated or just evaluated.
    #[must_use]
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Reports for every generation evaluated so far.
    #[must_use]
    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }

    /// Current survivors.
    #[must_use]
    pub fn population(&self) -> &[Evaluated] {
        &self.population
    }

    /// Non-dominated set over everything evaluated so far in this run.
    #[must_use]
    pub fn frontier(&self) -> Frontier {
        Frontier::build(&self.archive)
    }

    /// Performs one state transition and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a generated vector falls outside the
    /// space, which indicates a bug in the genetic operators. Evaluation
    /// failures are never errors here.
    pub async fn step(&mut self) -> Result<SearchState> {
        self.state = match self.state {
            SearchState::Seeding => self.seed_population(),
            SearchState::Evaluating => self.evaluate_generation().await,
            SearchState::Advancing => self.advance()?,
            SearchState::Done => SearchState::Done,
        };
        Ok(self.state)
    }

    /// Runs until [`SearchState::Done`].
    ///
    /// # Errors
    ///
    /// Propagates errors from [`step`](Self::step).
    pub async fn run(mut self) -> Result<SearchOutcome> {
        #[cfg(feature = "tracing")]
        let span = tracing::info_span!(
            "search",
            population = self.config.population_size,
            generations = self.config.generations,
        );

        let drive = async {
            while self.step().await? != SearchState::Done {}
            Ok::<(), Error>(())
        };

        #[cfg(feature = "tracing")]
        let drive = tracing::Instrument::instrument(drive, span);

        drive.await?;

        let frontier = self.frontier();
        trace_info!(
            generations = self.history.len(),
            frontier = frontier.len(),
            "search finished"
        );
        Ok(SearchOutcome {
            final_population: self.population,
            frontier,
            history: self.history,
        })
    }

    fn seed_population(&mut self) -> SearchState {
        let target = self.config.population_size;
        let mut attempts = target * ATTEMPTS_PER_INDIVIDUAL;
        while self.pending.len() < target && attempts > 0 {
            attempts -= 1;
            let vector = self.space.sample(&mut self.rng);
            if self.seen.insert(vector.key()) {
                self.pending.push(vector);
            }
        }

        trace_debug!(size = self.pending.len(), "population seeded");
        if self.pending.is_empty() {
            SearchState::Done
        } else {
            SearchState::Evaluating
        }
    }

    async fn evaluate_generation(&mut self) -> SearchState {
        let timeout = self.config.evaluation_timeout;
        let batch = core::mem::take(&mut self.pending);

        let mut join_set: JoinSet<(usize, bool, Result<Statistics>)> = JoinSet::new();
        for (index, vector) in batch.iter().enumerate() {
            let mut handle = self.dispatcher.submit(vector.clone());
            join_set.spawn(async move {
                let result = handle.wait(timeout).await;
                (index, handle.from_ledger(), result)
            });
        }

        let sentinel = self.config.objectives.sentinel();
        let mut fitness = vec![sentinel; batch.len()];
        let mut failed = batch.len();
        let mut ledger_hits = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, from_ledger, Ok(stats))) => {
                    fitness[index] = self.config.objectives.extract(&stats);
                    failed -= 1;
                    if from_ledger {
                        ledger_hits += 1;
                    }
                }
                Ok((index, _, Err(e))) => {
                    if e.is_evaluation_failure() {
                        trace_debug!(key = %batch[index].key(), error = %e, "evaluation failed");
                    } else {
                        trace_warn!(key = %batch[index].key(), error = %e, "evaluation failed outside the engine");
                    }
                    #[cfg(not(feature = "tracing"))]
                    let _ = (index, e);
                }
                Err(e) => {
                    trace_warn!(error = %e, "evaluation task aborted");
                    #[cfg(not(feature = "tracing"))]
                    let _ = e;
                }
            }
        }

        self.evaluated = batch
            .into_iter()
            .zip(fitness)
            .map(|(vector, objectives)| Evaluated::new(vector, objectives))
            .collect();
        self.archive.extend(self.evaluated.iter().cloned());

        let report = GenerationReport {
            generation: self.generation,
            evaluated: self.evaluated.len(),
            failed,
            ledger_hits,
            frontier_size: self.frontier().len(),
            objective_stats: self.objective_stats(),
        };
        trace_info!(
            generation = report.generation,
            evaluated = report.evaluated,
            failed = report.failed,
            ledger_hits = report.ledger_hits,
            frontier = report.frontier_size,
            "generation evaluated"
        );
        self.history.push(report);

        SearchState::Advancing
    }

    fn objective_stats(&self) -> Vec<ObjectiveStats> {
        let rows: Vec<Vec<f64>> = self
            .evaluated
            .iter()
            .filter(|e| !e.is_failed())
            .map(|e| self.config.objectives.denormalize(&e.objectives))
            .collect();
        (0..self.config.objectives.len())
            .map_while(|i| {
                let column: Vec<f64> = rows.iter().map(|row| row[i]).collect();
                ObjectiveStats::of(&column)
            })
            .collect()
    }

    fn advance(&mut self) -> Result<SearchState> {
        let mut pool = core::mem::take(&mut self.population);
        pool.append(&mut self.evaluated);
        self.population = operators::survivors(pool, self.config.population_size);

        if self.generation >= self.config.generations {
            return Ok(SearchState::Done);
        }

        self.pending = self.breed()?;
        if self.pending.is_empty() {
            trace_info!(generation = self.generation, "search space exhausted");
            return Ok(SearchState::Done);
        }
        self.generation += 1;
        Ok(SearchState::Evaluating)
    }

    /// Produces up to `population_size` offspring not yet evaluated in this
    /// run. Falls back to fresh samples when breeding keeps producing known
    /// configurations.
    fn breed(&mut self) -> Result<Vec<ParameterVector>> {
        let target = self.config.population_size;
        let specs = self.space.specs();
        let ranking = operators::Ranking::of(&self.population);

        let mut offspring = Vec::with_capacity(target);
        let mut attempts = target * ATTEMPTS_PER_INDIVIDUAL;
        while offspring.len() < target && attempts > 0 && !self.population.is_empty() {
            attempts -= 1;
            let p1 = ranking.tournament(&mut self.rng);
            let p2 = ranking.tournament(&mut self.rng);

            let (mut child1, mut child2) = operators::crossover(
                &mut self.rng,
                self.config.crossover,
                self.population[p1].vector.values(),
                self.population[p2].vector.values(),
                specs,
                self.config.crossover_rate,
            );
            for child in [&mut child1, &mut child2] {
                operators::mutate(
                    &mut self.rng,
                    self.config.mutation,
                    child,
                    specs,
                    self.config.mutation_rate,
                );
            }

            for genes in [child1, child2] {
                if offspring.len() >= target {
                    break;
                }
                let clamped: Vec<i64> = genes.iter().zip(specs).map(|(g, s)| s.clamp(*g)).collect();
                let vector = self
                    .space
                    .vector(clamped)
                    .map_err(|_| Error::Internal("offspring outside the parameter space"))?;
                if self.seen.insert(vector.key()) {
                    offspring.push(vector);
                }
            }
        }

        let mut attempts = target * ATTEMPTS_PER_INDIVIDUAL;
        while offspring.len() < target && attempts > 0 {
            attempts -= 1;
            let vector = self.space.sample(&mut self.rng);
            if self.seen.insert(vector.key()) {
                offspring.push(vector);
            }
        }

        trace_debug!(size = offspring.len(), "offspring bred");
        Ok(offspring)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_stats_cover_min_mean_max_and_spread() {
        let stats = ObjectiveStats::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn objective_stats_of_a_single_value_have_no_spread() {
        let stats = ObjectiveStats::of(&[3.5]).unwrap();
        assert_eq!((stats.min, stats.mean, stats.max, stats.std), (3.5, 3.5, 3.5, 0.0));
    }

    #[test]
    fn objective_stats_of_nothing_are_absent() {
        assert!(ObjectiveStats::of(&[]).is_none());
    }
}

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fitness::FitnessExtractor;

/// Recombination operator applied to pairs of parents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Crossover {
    /// Each field comes from either parent with equal probability.
    #[default]
    Uniform,
    /// Swap the span between two random cut points.
    TwoPoint,
    /// Simulated binary crossover, rounded to the nearest integer.
    Simulated {
        /// Distribution index; larger values keep children closer to their
        /// parents.
        eta: f64,
    },
}

/// Per-field mutation operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Mutation {
    /// Re-sample the field uniformly from its bound.
    #[default]
    Reset,
    /// Polynomial mutation, rounded to the nearest integer.
    Polynomial {
        /// Distribution index.
        eta: f64,
    },
}

/// Settings for a [`GeneticOptimizer`](super::GeneticOptimizer) run.
///
/// Deserializable so a run can be described in a JSON file; omitted fields
/// take their defaults.
///
/// ```
/// use facility_search::optimizer::{Crossover, SearchConfig};
///
/// let config: SearchConfig = serde_json::from_str(
///     r#"{"populationSize": 12, "crossover": {"kind": "twoPoint"}, "evaluationTimeoutSecs": 60}"#,
/// )
/// .unwrap();
/// assert_eq!(config.population_size, 12);
/// assert_eq!(config.crossover, Crossover::TwoPoint);
/// assert_eq!(config.generations, 50);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    /// Individuals kept per generation. Default 30.
    pub population_size: usize,
    /// Breeding rounds after the seeded population. Default 50.
    pub generations: usize,
    /// Per-field mutation probability. Default 0.1.
    pub mutation_rate: f64,
    /// Probability that a pair of parents is recombined. Default 0.7.
    pub crossover_rate: f64,
    /// How long to wait for each evaluation. Default 300 s.
    #[serde(rename = "evaluationTimeoutSecs", with = "duration_secs")]
    pub evaluation_timeout: Duration,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
    pub crossover: Crossover,
    pub mutation: Mutation,
    /// Objectives to optimize. Defaults to [`FitnessExtractor::terminal`].
    pub objectives: FitnessExtractor,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            generations: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
            evaluation_timeout: Duration::from_secs(300),
            seed: None,
            crossover: Crossover::default(),
            mutation: Mutation::default(),
            objectives: FitnessExtractor::terminal(),
        }
    }
}

impl SearchConfig {
    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(invalid("population_size must be at least 2"));
        }
        if self.generations == 0 {
            return Err(invalid("generations must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(invalid("mutation_rate must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(invalid("crossover_rate must be within [0, 1]"));
        }
        if self.evaluation_timeout.is_zero() {
            return Err(invalid("evaluation_timeout must be non-zero"));
        }
        if self.objectives.is_empty() {
            return Err(invalid("at least one objective is required"));
        }
        if let Crossover::Simulated { eta } = self.crossover
            && !(eta.is_finite() && eta >= 0.0)
        {
            return Err(invalid("crossover eta must be finite and non-negative"));
        }
        if let Mutation::Polynomial { eta } = self.mutation
            && !(eta.is_finite() && eta >= 0.0)
        {
            return Err(invalid("mutation eta must be finite and non-negative"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> Error {
    Error::InvalidConfig(reason.to_owned())
}

mod duration_secs {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

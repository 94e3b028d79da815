//! Selection, crossover and mutation on integer genomes.

use core::cmp::Ordering;

use super::config::{Crossover, Mutation};
use crate::frontier::Evaluated;
use crate::parameter::ParamSpec;
use crate::pareto::{crowding_distance, non_dominated_sort};
use crate::rng_util;

fn objective_rows(pool: &[Evaluated]) -> Vec<Vec<f64>> {
    pool.iter().map(|e| e.objectives.values().to_vec()).collect()
}

/// Front index and crowding distance of every member of a pool.
pub(super) struct Ranking {
    front: Vec<usize>,
    crowding: Vec<f64>,
}

impl Ranking {
    pub(super) fn of(pool: &[Evaluated]) -> Self {
        let rows = objective_rows(pool);
        let mut ranking = Self {
            front: vec![0; pool.len()],
            crowding: vec![0.0; pool.len()],
        };
        for (depth, members) in non_dominated_sort(&rows).iter().enumerate() {
            let spacing = crowding_distance(members, &rows);
            for (&member, distance) in members.iter().zip(spacing) {
                ranking.front[member] = depth;
                ranking.crowding[member] = distance;
            }
        }
        ranking
    }

    /// Crowded-comparison order: shallower front first, then wider spacing.
    fn order(&self, a: usize, b: usize) -> Ordering {
        self.front[a]
            .cmp(&self.front[b])
            .then_with(|| self.crowding[b].total_cmp(&self.crowding[a]))
    }

    /// Binary tournament; the first draw wins ties.
    pub(super) fn tournament(&self, rng: &mut fastrand::Rng) -> usize {
        let contenders = self.front.len();
        let first = rng.usize(0..contenders);
        let second = rng.usize(0..contenders);
        if self.order(second, first).is_lt() {
            second
        } else {
            first
        }
    }
}

/// Elitist NSGA-II survival: fills `size` slots front by front, breaking
/// the last partial front by descending crowding distance.
pub(super) fn survivors(pool: Vec<Evaluated>, size: usize) -> Vec<Evaluated> {
    if pool.len() <= size {
        return pool;
    }

    let rows = objective_rows(&pool);
    let mut keep = vec![false; pool.len()];
    let mut open = size;
    for members in non_dominated_sort(&rows) {
        if members.len() <= open {
            open -= members.len();
            members.iter().for_each(|&m| keep[m] = true);
            continue;
        }
        let spacing = crowding_distance(&members, &rows);
        let mut by_spacing: Vec<(usize, f64)> = members.into_iter().zip(spacing).collect();
        by_spacing.sort_by(|a, b| b.1.total_cmp(&a.1));
        by_spacing.iter().take(open).for_each(|&(m, _)| keep[m] = true);
        break;
    }

    pool.into_iter()
        .zip(keep)
        .filter_map(|(member, kept)| kept.then_some(member))
        .collect()
}

/// Recombines two parents with probability `rate`; otherwise returns copies.
pub(super) fn crossover(
    rng: &mut fastrand::Rng,
    kind: Crossover,
    parent1: &[i64],
    parent2: &[i64],
    specs: &[ParamSpec],
    rate: f64,
) -> (Vec<i64>, Vec<i64>) {
    let mut child1 = parent1.to_vec();
    let mut child2 = parent2.to_vec();
    if !rng_util::chance(rng, rate) {
        return (child1, child2);
    }

    match kind {
        Crossover::Uniform => {
            for (a, b) in child1.iter_mut().zip(child2.iter_mut()) {
                if rng.bool() {
                    core::mem::swap(a, b);
                }
            }
        }
        Crossover::TwoPoint => {
            let size = child1.len();
            if size < 2 {
                return (child1, child2);
            }
            let mut cx1 = rng.usize(1..=size);
            let mut cx2 = rng.usize(1..size);
            if cx2 >= cx1 {
                cx2 += 1;
            } else {
                core::mem::swap(&mut cx1, &mut cx2);
            }
            child1[cx1..cx2].swap_with_slice(&mut child2[cx1..cx2]);
        }
        Crossover::Simulated { eta } => {
            let genes = child1.iter_mut().zip(child2.iter_mut()).zip(specs);
            for ((a, b), spec) in genes {
                if *a != *b {
                    (*a, *b) = sbx_genes(rng, *a, *b, spec, eta);
                }
            }
        }
    }

    (child1, child2)
}

/// Simulated binary crossover of one gene pair: both children sit
/// symmetrically around the parents' midpoint, spread by a factor drawn
/// from a polynomial centred on 1.
#[allow(clippy::cast_precision_loss)]
fn sbx_genes(rng: &mut fastrand::Rng, a: i64, b: i64, spec: &ParamSpec, eta: f64) -> (i64, i64) {
    let u = rng_util::f64_range(rng, 0.0, 1.0);
    let exponent = (eta + 1.0).recip();
    let spread = if u <= 0.5 {
        (2.0 * u).powf(exponent)
    } else {
        (2.0 * (1.0 - u)).powf(-exponent)
    };

    let midpoint = (a as f64 + b as f64) / 2.0;
    let offset = (b as f64 - a as f64) / 2.0 * spread;
    (snap(midpoint - offset, spec), snap(midpoint + offset, spec))
}

/// Mutates each gene independently with probability `rate`.
pub(super) fn mutate(
    rng: &mut fastrand::Rng,
    kind: Mutation,
    genes: &mut [i64],
    specs: &[ParamSpec],
    rate: f64,
) {
    for (gene, spec) in genes.iter_mut().zip(specs) {
        if !rng_util::chance(rng, rate) {
            continue;
        }
        *gene = match kind {
            Mutation::Reset => spec.sample(rng),
            Mutation::Polynomial { eta } => polynomial_gene(rng, *gene, spec, eta),
        };
    }
}

/// Polynomial mutation of one gene. The perturbation is bounded by the
/// gene's distance to each end of its range, so small ranges move little.
#[allow(clippy::cast_precision_loss)]
fn polynomial_gene(rng: &mut fastrand::Rng, gene: i64, spec: &ParamSpec, eta: f64) -> i64 {
    let width = (spec.high() - spec.low()) as f64;
    if width <= 0.0 {
        return gene;
    }
    // Relative position of the gene in its range, 0 at `low` and 1 at `high`.
    let position = (gene - spec.low()) as f64 / width;
    let power = eta + 1.0;

    let u = rng_util::f64_range(rng, 0.0, 1.0);
    let shift = if u < 0.5 {
        let base = 2.0 * u + (1.0 - 2.0 * u) * (1.0 - position).powf(power);
        base.powf(power.recip()) - 1.0
    } else {
        let base = 2.0 * (1.0 - u) + (2.0 * u - 1.0) * position.powf(power);
        1.0 - base.powf(power.recip())
    };

    snap(gene as f64 + shift * width, spec)
}

/// Rounds to the nearest integer inside the spec's bound.
#[allow(clippy::cast_possible_truncation)]
fn snap(value: f64, spec: &ParamSpec) -> i64 {
    spec.clamp(value.round() as i64)
}

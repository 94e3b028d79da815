//! Pareto dominance, non-dominated sorting and crowding distance.
//!
//! Every function here works in minimize-space: objective vectors produced
//! by [`FitnessExtractor`](crate::fitness::FitnessExtractor) have maximize
//! objectives already negated, so smaller is better in every position.
//!
//! | Function | Purpose |
//! |---|---|
//! | [`dominates`] | Pairwise Pareto dominance |
//! | [`non_dominated_sort`] | Rank solutions into successive fronts (front 0, 1, …) |
//! | [`pareto_front_indices`] | Filter to the non-dominated solutions only |
//! | [`crowding_distance`] | Measure spread within a single front |
//!
//! # Example
//!
//! ```
//! use facility_search::pareto::{crowding_distance, non_dominated_sort, pareto_front_indices};
//!
//! let solutions = vec![
//!     vec![1.0, 5.0], // Pareto-optimal
//!     vec![5.0, 1.0], // Pareto-optimal
//!     vec![3.0, 3.0], // Pareto-optimal
//!     vec![4.0, 4.0], // Dominated by (3, 3)
//! ];
//!
//! let fronts = non_dominated_sort(&solutions);
//! assert_eq!(fronts.len(), 2);
//!
//! let front = pareto_front_indices(&solutions);
//! assert_eq!(front, vec![0, 1, 2]);
//!
//! let cd = crowding_distance(&front, &solutions);
//! assert!(cd[0].is_infinite()); // boundary solution
//! ```

use core::cmp::Ordering;

/// Returns `true` if `a` Pareto-dominates `b`.
///
/// `a` dominates `b` when it is no worse in every objective and strictly
/// better in at least one. Equal vectors dominate neither way.
#[must_use]
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    debug_assert_eq!(a.len(), b.len());

    a.iter()
        .zip(b)
        .try_fold(false, |strictly_better, (x, y)| match x.partial_cmp(y) {
            Some(Ordering::Greater) => None,
            Some(Ordering::Less) => Some(true),
            _ => Some(strictly_better),
        })
        .unwrap_or(false)
}

/// Fast non-dominated sorting (Deb et al., 2002).
///
/// Returns `fronts` where `fronts[0]` is the Pareto front; each inner vec
/// holds indices into `values` in ascending order.
///
/// Complexity: O(M * N^2) where M = objectives, N = solutions.
#[must_use]
pub fn non_dominated_sort(values: &[Vec<f64>]) -> Vec<Vec<usize>> {
    let n = values.len();

    // For each solution: whom it dominates, and by how many it is dominated.
    let mut beats: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut beaten_by = vec![0_usize; n];
    for (i, a) in values.iter().enumerate() {
        for (j, b) in values.iter().enumerate().skip(i + 1) {
            if dominates(a, b) {
                beats[i].push(j);
                beaten_by[j] += 1;
            } else if dominates(b, a) {
                beats[j].push(i);
                beaten_by[i] += 1;
            }
        }
    }

    let mut placed = vec![false; n];
    let mut unplaced = n;
    let mut fronts = Vec::new();
    while unplaced > 0 {
        let front: Vec<usize> = (0..n).filter(|&i| !placed[i] && beaten_by[i] == 0).collect();
        // Only reachable when NaN objectives make dominance cyclic.
        if front.is_empty() {
            break;
        }
        for &p in &front {
            placed[p] = true;
            for &q in &beats[p] {
                beaten_by[q] -= 1;
            }
        }
        unplaced -= front.len();
        fronts.push(front);
    }
    fronts
}

/// Indices of the non-dominated solutions, ascending.
#[must_use]
pub fn pareto_front_indices(values: &[Vec<f64>]) -> Vec<usize> {
    non_dominated_sort(values).into_iter().next().unwrap_or_default()
}

/// Crowding distance for the members of one front.
///
/// Boundary solutions get `f64::INFINITY`. Returns one distance per entry of
/// `front`, in the same order. Objectives whose range within the front is
/// zero or unbounded contribute only their boundary markers.
#[must_use]
pub fn crowding_distance(front: &[usize], values: &[Vec<f64>]) -> Vec<f64> {
    let n = front.len();
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }

    let mut distances = vec![0.0_f64; n];
    let mut order: Vec<usize> = (0..n).collect();
    for k in 0..values[front[0]].len() {
        let at = |pos: usize| values[front[pos]][k];
        order.sort_by(|&a, &b| at(a).total_cmp(&at(b)));

        let (lowest, highest) = (order[0], order[n - 1]);
        distances[lowest] = f64::INFINITY;
        distances[highest] = f64::INFINITY;

        let span = at(highest) - at(lowest);
        if span <= 0.0 || !span.is_finite() {
            continue;
        }
        for neighbours in order.windows(3) {
            distances[neighbours[1]] += (at(neighbours[2]) - at(neighbours[0])) / span;
        }
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominance_is_irreflexive() {
        for v in [vec![1.0, 2.0], vec![0.0, 0.0], vec![f64::INFINITY, 3.0]] {
            assert!(!dominates(&v, &v));
        }
    }

    #[test]
    fn dominance_is_antisymmetric() {
        let points = [
            vec![1.0, 5.0],
            vec![2.0, 5.0],
            vec![1.0, 3.0],
            vec![4.0, 0.0],
            vec![f64::INFINITY, f64::INFINITY],
        ];
        for a in &points {
            for b in &points {
                assert!(!(dominates(a, b) && dominates(b, a)), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn incomparable_points_share_a_front() {
        let values = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        assert!(!dominates(&values[0], &values[1]));
        assert!(!dominates(&values[1], &values[0]));
        assert_eq!(non_dominated_sort(&values), vec![vec![0, 1]]);
    }

    #[test]
    fn sort_ranks_chains() {
        let values = vec![vec![3.0, 3.0], vec![1.0, 1.0], vec![2.0, 2.0]];
        assert_eq!(non_dominated_sort(&values), vec![vec![1], vec![2], vec![0]]);
    }

    #[test]
    fn sentinels_land_last() {
        let inf = f64::INFINITY;
        let values = vec![vec![inf, inf], vec![5.0, 5.0], vec![inf, inf]];
        let fronts = non_dominated_sort(&values);
        assert_eq!(fronts, vec![vec![1], vec![0, 2]]);
    }

    #[test]
    fn crowding_marks_boundaries() {
        let values = vec![vec![1.0, 4.0], vec![2.0, 3.0], vec![3.0, 2.0], vec![4.0, 1.0]];
        let front = vec![0, 1, 2, 3];
        let cd = crowding_distance(&front, &values);
        assert!(cd[0].is_infinite());
        assert!(cd[3].is_infinite());
        assert!((cd[1] - cd[2]).abs() < 1e-12);
        assert!(cd[1].is_finite() && cd[1] > 0.0);
    }

    #[test]
    fn crowding_ignores_unbounded_ranges() {
        let inf = f64::INFINITY;
        let values = vec![vec![inf, inf], vec![inf, inf], vec![inf, inf]];
        let cd = crowding_distance(&[0, 1, 2], &values);
        assert!(cd.iter().all(|d| !d.is_nan()));
    }

    #[test]
    fn cyclic_nan_dominance_terminates() {
        let nan = f64::NAN;
        let values = vec![
            vec![0.0, nan, 5.0],
            vec![1.0, 0.0, nan],
            vec![nan, 1.0, 4.0],
            vec![9.0, 9.0, 9.0],
        ];
        let fronts = non_dominated_sort(&values);
        assert!(fronts.iter().flatten().all(|&i| i < values.len()));
    }

    #[test]
    fn empty_input() {
        assert!(non_dominated_sort(&[]).is_empty());
        assert!(pareto_front_indices(&[]).is_empty());
    }
}

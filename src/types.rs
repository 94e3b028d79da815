//! Core types shared across the crate.

use serde::{Deserialize, Serialize};

/// The direction of optimization for one objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Minimize the objective value.
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Maps a raw value into minimize-space.
    #[must_use]
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            Self::Minimize => value,
            Self::Maximize => -value,
        }
    }

    /// Inverse of [`normalize`](Self::normalize).
    #[must_use]
    pub fn denormalize(self, value: f64) -> f64 {
        // Negation is its own inverse.
        self.normalize(value)
    }
}

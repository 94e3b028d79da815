//! Bounded integer parameter spaces and the immutable vectors drawn from them.
//!
//! A [`ParameterSpace`] is an ordered list of named [`ParamSpec`]s, each with a
//! closed `[low, high]` bound. A [`ParameterVector`] holds one value per spec
//! and can only be constructed when every value lies within its bound:
//!
//! ```
//! use std::sync::Arc;
//!
//! use facility_search::parameter::{ParamSpec, ParameterSpace};
//!
//! let space = Arc::new(
//!     ParameterSpace::new(vec![
//!         ParamSpec::new("conveyors", 1, 4).unwrap(),
//!         ParamSpec::new("silos", 10, 20).unwrap(),
//!     ])
//!     .unwrap(),
//! );
//!
//! let v = space.vector(vec![2, 15]).unwrap();
//! assert_eq!(v.key().as_str(), "2-15");
//! assert!(space.vector(vec![5, 15]).is_err());
//! ```
//!
//! Values are never silently clamped. [`BoundPolicy::Clamp`] is available as
//! an explicit alternate policy for callers that want it.

use core::fmt;
use core::hash::{Hash, Hasher};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Error, Result};

/// One named integer knob with a closed bound.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    name: String,
    low: i64,
    high: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<i64>,
}

impl ParamSpec {
    /// Creates a spec for values in `[low, high]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] if `low > high`.
    pub fn new(name: impl Into<String>, low: i64, high: i64) -> Result<Self> {
        let name = name.into();
        if low > high {
            return Err(Error::InvalidBounds { name, low, high });
        }
        Ok(Self {
            name,
            low,
            high,
            default: None,
            step: None,
        })
    }

    /// Sets the spacing of this parameter's [grid](ParameterSpace::grid)
    /// points: `low`, `low + step`, ... up to `high`. Sampling and mutation
    /// still cover the whole bound.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `step` is not positive.
    pub fn with_step(mut self, step: i64) -> Result<Self> {
        if step <= 0 {
            return Err(Error::InvalidConfig(format!(
                "step for '{}' must be positive, got {step}",
                self.name
            )));
        }
        self.step = Some(step);
        Ok(self)
    }

    /// Sets the value used when a partial record omits this parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if `value` is outside the bound.
    pub fn with_default(mut self, value: i64) -> Result<Self> {
        self.check(value)?;
        self.default = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn low(&self) -> i64 {
        self.low
    }

    #[must_use]
    pub fn high(&self) -> i64 {
        self.high
    }

    #[must_use]
    pub fn default_value(&self) -> Option<i64> {
        self.default
    }

    /// Grid spacing; 1 unless set with [`with_step`](Self::with_step).
    #[must_use]
    pub fn step(&self) -> i64 {
        self.step.unwrap_or(1)
    }

    /// Number of grid points in the bound.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn grid_len(&self) -> u128 {
        ((i128::from(self.high) - i128::from(self.low)) / i128::from(self.step()) + 1) as u128
    }

    /// Returns `true` if `value` lies within `[low, high]`.
    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    /// Clamps `value` into `[low, high]`.
    #[must_use]
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.low, self.high)
    }

    /// Number of distinct values in the bound.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn cardinality(&self) -> u128 {
        (i128::from(self.high) - i128::from(self.low) + 1) as u128
    }

    /// Draws a value uniformly from the bound.
    pub(crate) fn sample(&self, rng: &mut fastrand::Rng) -> i64 {
        rng.i64(self.low..=self.high)
    }

    fn check(&self, value: i64) -> Result<()> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(Error::OutOfBounds {
                name: self.name.clone(),
                value,
                low: self.low,
                high: self.high,
            })
        }
    }
}

/// How construction treats values outside a spec's bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundPolicy {
    /// Reject out-of-bound values with [`Error::OutOfBounds`] (the default).
    #[default]
    Reject,
    /// Clamp out-of-bound values into the bound.
    Clamp,
}

/// An ordered, validated set of parameter specs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterSpace {
    specs: Vec<ParamSpec>,
}

impl ParameterSpace {
    /// Creates a space from specs in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the list is empty or two specs
    /// share a name.
    pub fn new(specs: Vec<ParamSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::InvalidConfig(
                "parameter space needs at least one parameter".into(),
            ));
        }
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate parameter '{}'",
                    spec.name
                )));
            }
        }
        Ok(Self { specs })
    }

    /// The eight-knob transhipment terminal model.
    ///
    /// Bounds cover both the exhaustive [`grid`](Self::grid) sweep and the
    /// genetic search ranges used against the model; defaults are the
    /// single-run request defaults. The two capacities are swept in steps of
    /// 200 and 100.
    #[must_use]
    pub fn terminal() -> Self {
        const TERMINAL: [(&str, i64, i64, i64, i64); 8] = [
            ("varOfWork", 3, 3, 3, 1),
            ("capacityOfMainConveyor", 800, 1200, 800, 200),
            ("quantityOfVagonsToSilageAtOnce", 8, 10, 8, 1),
            ("quantityOfVehicleDischargeStations", 2, 4, 2, 1),
            ("numberOfVehicleSilages", 2, 4, 2, 1),
            ("capacityOfVehicleSilages", 800, 1000, 800, 100),
            ("quantityOfSilages", 17, 20, 17, 1),
            ("yearsModelWorking", 1, 1, 1, 1),
        ];
        let specs = TERMINAL
            .iter()
            .map(|&(name, low, high, default, step)| ParamSpec {
                name: name.to_owned(),
                low,
                high,
                default: Some(default),
                step: (step > 1).then_some(step),
            })
            .collect();
        Self { specs }
    }

    #[must_use]
    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Position of the parameter called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    /// Number of distinct vectors in the space, saturating at `u128::MAX`.
    #[must_use]
    pub fn cardinality(&self) -> u128 {
        self.specs
            .iter()
            .fold(1_u128, |acc, s| acc.saturating_mul(s.cardinality()))
    }

    /// Builds a vector, rejecting any out-of-bound value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`] or [`Error::OutOfBounds`].
    pub fn vector(self: &Arc<Self>, values: Vec<i64>) -> Result<ParameterVector> {
        self.vector_with_policy(values, BoundPolicy::Reject)
    }

    /// Builds a vector under an explicit [`BoundPolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArityMismatch`], or [`Error::OutOfBounds`] under
    /// [`BoundPolicy::Reject`].
    pub fn vector_with_policy(
        self: &Arc<Self>,
        mut values: Vec<i64>,
        policy: BoundPolicy,
    ) -> Result<ParameterVector> {
        if values.len() != self.specs.len() {
            return Err(Error::ArityMismatch {
                expected: self.specs.len(),
                got: values.len(),
            });
        }
        for (value, spec) in values.iter_mut().zip(&self.specs) {
            match policy {
                BoundPolicy::Reject => spec.check(*value)?,
                BoundPolicy::Clamp => *value = spec.clamp(*value),
            }
        }
        Ok(ParameterVector {
            space: Arc::clone(self),
            values: values.into_boxed_slice(),
        })
    }

    /// Builds a vector from a record naming every parameter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownParameter`], [`Error::MissingParameter`] or
    /// [`Error::OutOfBounds`].
    pub fn from_record(self: &Arc<Self>, record: &BTreeMap<String, i64>) -> Result<ParameterVector> {
        self.vector_from_named(record, false)
    }

    /// Builds a vector from a record, filling omitted parameters from their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Same as [`from_record`](Self::from_record); a parameter is missing
    /// only when it is omitted and has no default.
    pub fn from_partial_record(
        self: &Arc<Self>,
        record: &BTreeMap<String, i64>,
    ) -> Result<ParameterVector> {
        self.vector_from_named(record, true)
    }

    fn vector_from_named(
        self: &Arc<Self>,
        record: &BTreeMap<String, i64>,
        use_defaults: bool,
    ) -> Result<ParameterVector> {
        if let Some(unknown) = record.keys().find(|k| self.index_of(k).is_none()) {
            return Err(Error::UnknownParameter(unknown.clone()));
        }
        let values = self
            .specs
            .iter()
            .map(|spec| match record.get(&spec.name) {
                Some(&v) => Ok(v),
                None if use_defaults => spec
                    .default
                    .ok_or_else(|| Error::MissingParameter(spec.name.clone())),
                None => Err(Error::MissingParameter(spec.name.clone())),
            })
            .collect::<Result<Vec<_>>>()?;
        self.vector(values)
    }

    /// Number of points [`grid`](Self::grid) yields, saturating at
    /// `u128::MAX`.
    #[must_use]
    pub fn grid_cardinality(&self) -> u128 {
        self.specs
            .iter()
            .fold(1_u128, |acc, s| acc.saturating_mul(s.grid_len()))
    }

    /// Every grid point of the space in nested-loop order: the last
    /// parameter varies fastest.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use facility_search::parameter::{ParamSpec, ParameterSpace};
    ///
    /// let space = Arc::new(ParameterSpace::new(vec![
    ///     ParamSpec::new("conveyor", 800, 1200)?.with_step(200)?,
    ///     ParamSpec::new("silos", 17, 18)?,
    /// ])?);
    /// let keys: Vec<String> = space.grid().map(|v| v.key().to_string()).collect();
    /// assert_eq!(keys, ["800-17", "800-18", "1000-17", "1000-18", "1200-17", "1200-18"]);
    /// # Ok::<(), facility_search::Error>(())
    /// ```
    #[must_use]
    pub fn grid(self: &Arc<Self>) -> Grid {
        Grid {
            space: Arc::clone(self),
            cursor: Some(self.specs.iter().map(|s| s.low).collect()),
        }
    }

    /// Draws a vector uniformly, independently per field.
    pub(crate) fn sample(self: &Arc<Self>, rng: &mut fastrand::Rng) -> ParameterVector {
        let values: Box<[i64]> = self.specs.iter().map(|s| s.sample(rng)).collect();
        ParameterVector {
            space: Arc::clone(self),
            values,
        }
    }
}

/// Iterator over the grid points of a [`ParameterSpace`], created by
/// [`ParameterSpace::grid`].
pub struct Grid {
    space: Arc<ParameterSpace>,
    /// Next point to yield; `None` once the grid is exhausted.
    cursor: Option<Vec<i64>>,
}

impl Iterator for Grid {
    type Item = ParameterVector;

    fn next(&mut self) -> Option<ParameterVector> {
        let cursor = self.cursor.as_mut()?;
        let values: Box<[i64]> = cursor.as_slice().into();

        let mut wrapped = true;
        for (value, spec) in cursor.iter_mut().zip(&self.space.specs).rev() {
            match value.checked_add(spec.step()) {
                Some(next) if next <= spec.high => {
                    *value = next;
                    wrapped = false;
                    break;
                }
                _ => *value = spec.low,
            }
        }
        if wrapped {
            self.cursor = None;
        }

        Some(ParameterVector {
            space: Arc::clone(&self.space),
            values,
        })
    }
}

/// Deterministic encoding of a vector's values, used as the dedup and
/// ledger primary key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn from_values(values: &[i64]) -> Self {
        let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
        Self(parts.join("-"))
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable, in-bound point of a [`ParameterSpace`].
///
/// Equality and hashing consider only the values.
#[derive(Clone)]
pub struct ParameterVector {
    space: Arc<ParameterSpace>,
    values: Box<[i64]>,
}

impl ParameterVector {
    #[must_use]
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    #[must_use]
    pub fn space(&self) -> &Arc<ParameterSpace> {
        &self.space
    }

    /// Value of the parameter called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<i64> {
        self.space.index_of(name).map(|i| self.values[i])
    }

    #[must_use]
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::from_values(&self.values)
    }

    /// Returns a new vector with field `index` replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfBounds`] if the value violates the bound, or
    /// [`Error::ArityMismatch`] if `index` is past the last field.
    pub fn with_value(&self, index: usize, value: i64) -> Result<Self> {
        if index >= self.values.len() {
            return Err(Error::ArityMismatch {
                expected: self.values.len(),
                got: index + 1,
            });
        }
        let mut values = self.values.to_vec();
        values[index] = value;
        self.space.vector(values)
    }

    /// Named record in declaration order.
    #[must_use]
    pub fn to_record(&self) -> BTreeMap<String, i64> {
        self.space
            .specs
            .iter()
            .zip(self.values.iter())
            .map(|(s, &v)| (s.name.clone(), v))
            .collect()
    }
}

impl PartialEq for ParameterVector {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl Eq for ParameterVector {}

impl Hash for ParameterVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}

impl fmt::Debug for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (spec, value) in self.space.specs.iter().zip(self.values.iter()) {
            map.entry(&spec.name, value);
        }
        map.finish()
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key(), f)
    }
}

impl Serialize for ParameterVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (spec, value) in self.space.specs.iter().zip(self.values.iter()) {
            map.serialize_entry(&spec.name, value)?;
        }
        map.end()
    }
}

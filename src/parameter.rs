//! Numeric parameters held by a [`State`](crate::State).
//!
//! The [`Parameter`] trait is the contract the state relies on: naming,
//! element access, in-place scaling, dirtiness, run-index bookkeeping and
//! a fallible deep copy. [`RealParameter`] is the stock implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dirty::Dirtiness;
use crate::error::{StateResult, ValidationError};

/// A named, indexable numeric container owned by exactly one state.
///
/// Element accessors take a dimension index; indexing past
/// [`dimension`](Parameter::dimension) is a caller bug and panics.
pub trait Parameter: fmt::Debug + fmt::Display + Send {
    /// Stable identifier of the parameter within its state.
    fn name(&self) -> &str;

    /// Number of components (always at least one for a prepared parameter).
    fn dimension(&self) -> usize;

    /// First component.
    fn value(&self) -> f64 {
        self.value_at(0)
    }

    /// Component `dim`.
    fn value_at(&self, dim: usize) -> f64;

    /// Multiplies one component in place. Does not touch the dirtiness.
    fn scale_at(&mut self, dim: usize, factor: f64);

    /// Multiplies every component in place. Does not touch the dirtiness.
    fn scale_all(&mut self, factor: f64);

    /// Current change marker.
    fn dirtiness(&self) -> Dirtiness;

    /// Overwrites the change marker.
    fn set_dirtiness(&mut self, flag: Dirtiness);

    /// Position assigned by the owning state during initialization.
    fn run_index(&self) -> Option<usize>;

    /// Records the position assigned by the owning state.
    fn set_run_index(&mut self, index: Option<usize>);

    /// One-off precomputation before a run starts.
    ///
    /// Must be idempotent and must not change any value.
    fn prepare(&mut self) -> StateResult<()>;

    /// Independent deep copy with identical name, values, dirtiness and
    /// run-index.
    fn copy_boxed(&self) -> StateResult<Box<dyn Parameter>>;
}

/// A real-valued vector parameter with optional bounds.
///
/// # Examples
///
/// ```
/// use chainstate::{Dirtiness, Parameter, RealParameter};
///
/// let mut kappa = RealParameter::new("kappa", vec![2.0, 3.0]).with_bounds(0.0, 100.0);
/// kappa.scale_all(2.0);
/// assert_eq!(kappa.value_at(1), 6.0);
/// assert_eq!(kappa.dirtiness(), Dirtiness::Clean);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealParameter {
    name: String,
    values: Vec<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    lower: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    upper: Option<f64>,

    #[serde(default)]
    dirtiness: Dirtiness,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    run_index: Option<usize>,

    #[serde(skip)]
    prepared: bool,
}

impl RealParameter {
    /// Creates an unbounded, clean parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            lower: None,
            upper: None,
            dirtiness: Dirtiness::Clean,
            run_index: None,
            prepared: false,
        }
    }

    /// Creates a one-dimensional parameter.
    #[must_use]
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, vec![value])
    }

    /// Sets inclusive bounds checked by [`validate`](RealParameter::validate).
    #[must_use]
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    /// Starts the parameter with `flag` in place of clean.
    #[must_use]
    pub fn with_dirtiness(mut self, flag: Dirtiness) -> Self {
        self.dirtiness = flag;
        self
    }

    /// All components in dimension order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Lower and upper bound, `None` where unbounded.
    #[must_use]
    pub const fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (self.lower, self.upper)
    }

    /// Whether [`Parameter::prepare`] has completed on this instance.
    #[must_use]
    pub const fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Checks name, dimension and bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.values.is_empty() {
            return Err(ValidationError::ZeroDimension {
                name: self.name.clone(),
            });
        }

        let lower = self.lower.unwrap_or(f64::NEG_INFINITY);
        let upper = self.upper.unwrap_or(f64::INFINITY);
        if lower > upper {
            return Err(ValidationError::InvalidBounds {
                name: self.name.clone(),
                lower,
                upper,
            });
        }
        for (dim, &value) in self.values.iter().enumerate() {
            if !(lower..=upper).contains(&value) {
                return Err(ValidationError::OutOfBounds {
                    name: self.name.clone(),
                    dim,
                    value,
                    lower,
                    upper,
                });
            }
        }
        Ok(())
    }
}

impl Parameter for RealParameter {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, dim: usize) -> f64 {
        self.values[dim]
    }

    fn scale_at(&mut self, dim: usize, factor: f64) {
        self.values[dim] *= factor;
    }

    fn scale_all(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    fn dirtiness(&self) -> Dirtiness {
        self.dirtiness
    }

    fn set_dirtiness(&mut self, flag: Dirtiness) {
        self.dirtiness = flag;
    }

    fn run_index(&self) -> Option<usize> {
        self.run_index
    }

    fn set_run_index(&mut self, index: Option<usize>) {
        self.run_index = index;
    }

    fn prepare(&mut self) -> StateResult<()> {
        self.validate()?;
        self.prepared = true;
        Ok(())
    }

    fn copy_boxed(&self) -> StateResult<Box<dyn Parameter>> {
        Ok(Box::new(self.clone()))
    }
}

impl fmt::Display for RealParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:", self.name, self.dirtiness)?;
        for v in &self.values {
            write!(f, " {v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_accessors() {
        let p = RealParameter::scalar("rate", 1.5);
        assert_eq!(p.name(), "rate");
        assert_eq!(p.dimension(), 1);
        assert_eq!(p.value(), 1.5);
        assert_eq!(p.run_index(), None);
        assert!(p.dirtiness().is_clean());
    }

    #[test]
    fn test_scale_does_not_mark_dirty() {
        let mut p = RealParameter::new("freqs", vec![0.25, 0.5]);
        p.scale_at(1, 2.0);
        assert_eq!(p.values(), &[0.25, 1.0]);
        p.scale_all(4.0);
        assert_eq!(p.values(), &[1.0, 4.0]);
        assert_eq!(p.dirtiness(), Dirtiness::Clean);
    }

    #[test]
    #[should_panic]
    fn test_value_at_out_of_range_panics() {
        let p = RealParameter::scalar("rate", 1.0);
        let _ = p.value_at(1);
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let mut p = RealParameter::new("kappa", vec![2.0]).with_bounds(0.0, 10.0);
        p.prepare().unwrap();
        p.prepare().unwrap();
        assert!(p.is_prepared());
        assert_eq!(p.value(), 2.0);
    }

    #[test]
    fn test_prepare_rejects_bad_parameters() {
        let mut empty = RealParameter::new("empty", Vec::new());
        assert!(empty.prepare().unwrap_err().is_validation());

        let mut unnamed = RealParameter::scalar("  ", 1.0);
        assert!(unnamed.prepare().is_err());

        let outside = RealParameter::scalar("p", 11.0).with_bounds(0.0, 10.0);
        assert!(matches!(
            outside.validate(),
            Err(ValidationError::OutOfBounds { dim: 0, .. })
        ));

        let inverted = RealParameter::scalar("p", 1.0).with_bounds(5.0, 0.0);
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_copy_is_independent() {
        let mut original = RealParameter::new("freqs", vec![0.25, 0.75]).with_dirtiness(Dirtiness::Dirty);
        original.set_run_index(Some(3));

        let mut copy = original.copy_boxed().unwrap();
        assert_eq!(copy.name(), "freqs");
        assert_eq!(copy.value_at(1), 0.75);
        assert_eq!(copy.dirtiness(), Dirtiness::Dirty);
        assert_eq!(copy.run_index(), Some(3));

        copy.scale_all(2.0);
        copy.set_dirtiness(Dirtiness::Clean);
        assert_eq!(original.values(), &[0.25, 0.75]);
        assert_eq!(original.dirtiness(), Dirtiness::Dirty);
    }

    #[test]
    fn test_display() {
        let p = RealParameter::new("freqs", vec![0.25, 0.5]).with_dirtiness(Dirtiness::Gored);
        assert_eq!(p.to_string(), "freqs[gored]: 0.25 0.5");
    }

    #[test]
    fn test_serde_defaults() {
        let p: RealParameter = serde_json::from_str(r#"{"name":"rate","values":[1.0]}"#).unwrap();
        assert_eq!(p, RealParameter::scalar("rate", 1.0));
        let json = serde_json::to_string(&p).unwrap();
        assert!(!json.contains("lower"));
        assert!(json.contains("\"dirtiness\":\"clean\""));
    }
}

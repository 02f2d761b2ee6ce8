//! Control curves: piecewise linear, multi-component functions of one
//! parameter, looked up by `curve_lookup` fields.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CurveId(pub usize);

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "curve {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error("curve `{name}` has {expected} components, got {actual} values")]
    ComponentMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("curve `{name}` parameters must increase: {parameter} follows {previous}")]
    NonIncreasingParameter {
        name: String,
        previous: f64,
        parameter: f64,
    },
    #[error("curve `{name}` has no point {index}")]
    PointOutOfRange { name: String, index: usize },
    #[error("curve `{0}` has no points")]
    Empty(String),
    #[error("unknown {0}")]
    UnknownCurve(CurveId),
    #[error("a curve named `{0}` already exists")]
    DuplicateName(String),
}

/// A piecewise linear curve through `(parameter, values)` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlCurve {
    name: String,
    number_of_components: usize,
    parameters: Vec<f64>,
    values: Vec<f64>,
}

impl ControlCurve {
    #[must_use]
    pub fn new(name: impl Into<String>, number_of_components: usize) -> Self {
        Self {
            name: name.into(),
            number_of_components,
            parameters: Vec::new(),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn number_of_components(&self) -> usize {
        self.number_of_components
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        self.parameters.len()
    }

    /// Appends a point; parameters must be strictly increasing.
    pub fn add_point(&mut self, parameter: f64, values: &[f64]) -> Result<(), CurveError> {
        if values.len() != self.number_of_components {
            return Err(CurveError::ComponentMismatch {
                name: self.name.clone(),
                expected: self.number_of_components,
                actual: values.len(),
            });
        }
        if let Some(&previous) = self.parameters.last() {
            if parameter <= previous {
                return Err(CurveError::NonIncreasingParameter {
                    name: self.name.clone(),
                    previous,
                    parameter,
                });
            }
        }
        self.parameters.push(parameter);
        self.values.extend_from_slice(values);
        Ok(())
    }

    /// Overwrites the values of point `index`.
    pub fn set_point_values(&mut self, index: usize, values: &[f64]) -> Result<(), CurveError> {
        if index >= self.point_count() {
            return Err(CurveError::PointOutOfRange {
                name: self.name.clone(),
                index,
            });
        }
        if values.len() != self.number_of_components {
            return Err(CurveError::ComponentMismatch {
                name: self.name.clone(),
                expected: self.number_of_components,
                actual: values.len(),
            });
        }
        let start = index * self.number_of_components;
        self.values[start..start + self.number_of_components].copy_from_slice(values);
        Ok(())
    }

    /// First and last parameter.
    #[must_use]
    pub fn parameter_range(&self) -> Option<(f64, f64)> {
        Some((*self.parameters.first()?, *self.parameters.last()?))
    }

    /// Values and slopes `d(values)/d(parameter)` at `parameter`.
    ///
    /// Parameters outside the range clamp to the end values with zero slope.
    pub fn evaluate(&self, parameter: f64) -> Result<(Vec<f64>, Vec<f64>), CurveError> {
        let n = self.number_of_components;
        let (first, last) = self
            .parameter_range()
            .ok_or_else(|| CurveError::Empty(self.name.clone()))?;
        let point = |index: usize| &self.values[index * n..(index + 1) * n];

        if self.parameters.len() == 1 || parameter <= first {
            return Ok((point(0).to_vec(), vec![0.0; n]));
        }
        if parameter >= last {
            return Ok((point(self.parameters.len() - 1).to_vec(), vec![0.0; n]));
        }
        let upper = self.parameters.partition_point(|p| *p <= parameter);
        let lower = upper - 1;
        let span = self.parameters[upper] - self.parameters[lower];
        let t = (parameter - self.parameters[lower]) / span;
        let (a, b) = (point(lower), point(upper));
        let values = a.iter().zip(b).map(|(a, b)| a + (b - a) * t).collect();
        let slopes = a.iter().zip(b).map(|(a, b)| (b - a) / span).collect();
        Ok((values, slopes))
    }
}

/// Owning collection of control curves, addressed by id or unique name.
#[derive(Debug, Clone, Default)]
pub struct CurveSet {
    curves: Vec<ControlCurve>,
    name_index: HashMap<String, CurveId>,
}

impl CurveSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, curve: ControlCurve) -> Result<CurveId, CurveError> {
        if self.name_index.contains_key(curve.name()) {
            return Err(CurveError::DuplicateName(curve.name().to_owned()));
        }
        let id = CurveId(self.curves.len());
        self.name_index.insert(curve.name().to_owned(), id);
        self.curves.push(curve);
        Ok(id)
    }

    pub fn get(&self, id: CurveId) -> Result<&ControlCurve, CurveError> {
        self.curves.get(id.0).ok_or(CurveError::UnknownCurve(id))
    }

    pub(crate) fn get_mut(&mut self, id: CurveId) -> Result<&mut ControlCurve, CurveError> {
        self.curves.get_mut(id.0).ok_or(CurveError::UnknownCurve(id))
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<CurveId> {
        self.name_index.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}

//! Evaluation settings shared by every field in a [`FieldGraph`](crate::field::FieldGraph).

use serde::{Deserialize, Serialize};

use crate::geom::Tolerance;

/// Numeric knobs for evaluation, inversion and rasterisation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Newton convergence threshold on xi increments; also the slack allowed
    /// outside `[0, 1]` while iterating.
    pub find_xi_tolerance: f64,
    /// Newton iterations per element before giving up.
    pub find_xi_max_iterations: usize,
    /// Pivot threshold for LU and 3x3 inversion.
    pub singular_tolerance: f64,
    /// Samples per xi direction when rasterising elements for accelerated
    /// find-element-xi.
    pub raster_samples_per_xi: usize,
    /// Value written to every component when compose or sobel_filter look up
    /// a location outside their valid range.
    pub out_of_bounds_value: f64,
}

impl EvaluationConfig {
    #[must_use]
    pub const fn find_xi_tolerance(&self) -> Tolerance {
        Tolerance::new(self.find_xi_tolerance)
    }

    #[must_use]
    pub const fn singular_tolerance(&self) -> Tolerance {
        Tolerance::new(self.singular_tolerance)
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            find_xi_tolerance: Tolerance::FIND_XI.eps,
            find_xi_max_iterations: 10,
            singular_tolerance: Tolerance::SINGULAR.eps,
            raster_samples_per_xi: 4,
            out_of_bounds_value: 0.5,
        }
    }
}

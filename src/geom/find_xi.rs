//! Newton iteration for locating the element xi at which an interpolated
//! field reaches target values.
//!
//! The element is treated as a black box: the caller supplies a closure that
//! evaluates the field and its xi derivatives at a trial xi. The solver forms
//! the normal equations `(D^T D) dxi = D^T (target - value)` so that fields
//! with more components than element dimensions are handled in the least
//! squares sense, then checks afterwards that every component agrees.

use super::core::{Tolerance, norm};
use super::linalg::LuDecomposition;

/// Largest element dimension handled by the solver.
pub const MAXIMUM_XI: usize = 3;

/// Local coordinates, padded with zeros beyond the element dimension.
pub type XiPoint = [f64; MAXIMUM_XI];

/// Field sample at a trial xi: values and component-major xi derivatives
/// (`derivatives[k * dimension + i] = d(value_k)/d(xi_i)`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XiSample {
    pub values: Vec<f64>,
    pub derivatives: Vec<f64>,
}

/// Iteration limits for [`find_xi_in_element`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewtonSettings {
    /// Convergence threshold on every xi increment; also the slack allowed
    /// outside `[0, 1]` while iterating.
    pub tolerance: Tolerance,
    pub max_iterations: usize,
    /// Pivot threshold of the normal equations.
    pub singular: Tolerance,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::FIND_XI,
            max_iterations: 10,
            singular: Tolerance::SINGULAR,
        }
    }
}

/// Why an element was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonFailure {
    /// More xi directions than target values.
    Underdetermined,
    /// Normal equations were singular, usually a collapsed element.
    Singular,
    /// Iteration limit reached.
    IterationLimit,
    /// Xi stopped moving while pinned at the element boundary: the target
    /// lies outside this element.
    Stalled,
    /// The least squares optimum does not reproduce every component.
    Inconsistent,
    /// The sample closure returned no usable derivatives.
    NoDerivatives,
}

/// Runs the Newton search in one element of `dimension` starting from the
/// element centre.
///
/// Returns `Ok(Ok(xi))` on convergence, `Ok(Err(failure))` when this element
/// does not hold the target and `Err` only when `sample` itself fails.
pub fn find_xi_in_element<E, F>(
    dimension: usize,
    target: &[f64],
    settings: NewtonSettings,
    mut sample: F,
) -> Result<Result<XiPoint, NewtonFailure>, E>
where
    F: FnMut(&XiPoint) -> Result<Option<XiSample>, E>,
{
    let n = dimension.min(MAXIMUM_XI);
    let count = target.len();
    if n == 0 || n > count {
        return Ok(Err(NewtonFailure::Underdetermined));
    }
    let tolerance = settings.tolerance.eps;

    let mut xi = [0.0; MAXIMUM_XI];
    for slot in xi.iter_mut().take(n) {
        *slot = 0.5;
    }
    let mut last_xi: Option<XiPoint> = None;
    let mut iterations = 0;

    loop {
        let Some(current) = sample(&xi)? else {
            return Ok(Err(NewtonFailure::NoDerivatives));
        };
        if current.values.len() < count || current.derivatives.len() < count * n {
            return Ok(Err(NewtonFailure::NoDerivatives));
        }
        let d = &current.derivatives;

        let mut a = vec![0.0; n * n];
        let mut b = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = (0..count).map(|k| d[k * n + j] * d[k * n + i]).sum();
            }
            b[i] = (0..count)
                .map(|k| d[k * n + i] * (target[k] - current.values[k]))
                .sum();
        }

        let Ok(lu) = LuDecomposition::decompose(&a, n, settings.singular) else {
            return Ok(Err(NewtonFailure::Singular));
        };
        if lu.solve_in_place(&mut b).is_err() {
            return Ok(Err(NewtonFailure::Singular));
        }

        let converged = b.iter().all(|delta| delta.abs() <= tolerance);
        for i in 0..n {
            xi[i] += b[i];
        }
        iterations += 1;

        if converged {
            if count > n && !reproduces_target(&mut sample, &xi, n, target, settings.tolerance)? {
                return Ok(Err(NewtonFailure::Inconsistent));
            }
            return Ok(Ok(xi));
        }

        for slot in xi.iter_mut().take(n) {
            *slot = slot.clamp(-tolerance, 1.0 + tolerance);
        }
        if iterations >= settings.max_iterations {
            return Ok(Err(NewtonFailure::IterationLimit));
        }
        if let Some(previous) = last_xi {
            if previous == xi {
                return Ok(Err(NewtonFailure::Stalled));
            }
        }
        last_xi = Some(xi);
    }
}

/// Whether every component at `xi` matches `target` to within the
/// tolerance, scaled by the target magnitude and the component's xi slope.
fn reproduces_target<E, F>(
    sample: &mut F,
    xi: &XiPoint,
    n: usize,
    target: &[f64],
    tolerance: Tolerance,
) -> Result<bool, E>
where
    F: FnMut(&XiPoint) -> Result<Option<XiSample>, E>,
{
    let Some(at_xi) = sample(xi)? else {
        return Ok(false);
    };
    if at_xi.values.len() < target.len() || at_xi.derivatives.len() < target.len() * n {
        return Ok(false);
    }
    Ok(target.iter().enumerate().all(|(k, wanted)| {
        let slope = norm(&at_xi.derivatives[k * n..(k + 1) * n]);
        tolerance
            .scaled(1.0 + wanted.abs() + slope)
            .approx_eq_f64(*wanted, at_xi.values[k])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    /// Bilinear map of the unit square onto a sheared quad.
    fn quad(xi: &XiPoint) -> Result<Option<XiSample>, Infallible> {
        let (s, t) = (xi[0], xi[1]);
        Ok(Some(XiSample {
            values: vec![2.0 * s + 0.5 * t, t + 0.25 * s * t],
            derivatives: vec![2.0, 0.5, 0.25 * t, 1.0 + 0.25 * s],
        }))
    }

    #[test]
    fn converges_inside_element() {
        let target = {
            let sample = quad(&[0.3, 0.8, 0.0]).unwrap().unwrap();
            sample.values
        };
        let xi = find_xi_in_element(2, &target, NewtonSettings::default(), quad)
            .unwrap()
            .unwrap();
        assert!((xi[0] - 0.3).abs() < 1e-6);
        assert!((xi[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn rejects_targets_outside_element() {
        let outcome = find_xi_in_element(2, &[10.0, 10.0], NewtonSettings::default(), quad)
            .unwrap();
        assert!(outcome.is_err());
    }

    #[test]
    fn rejects_underdetermined_search() {
        let outcome =
            find_xi_in_element(3, &[0.0, 0.0], NewtonSettings::default(), quad).unwrap();
        assert_eq!(outcome, Err(NewtonFailure::Underdetermined));
    }

    #[test]
    fn overdetermined_line_must_hit_every_component() {
        // A straight line in the plane: (xi, xi).
        let line = |xi: &XiPoint| -> Result<Option<XiSample>, Infallible> {
            Ok(Some(XiSample {
                values: vec![xi[0], xi[0]],
                derivatives: vec![1.0, 1.0],
            }))
        };
        let on_line = find_xi_in_element(1, &[0.25, 0.25], NewtonSettings::default(), line)
            .unwrap()
            .unwrap();
        assert!((on_line[0] - 0.25).abs() < 1e-9);

        let off_line =
            find_xi_in_element(1, &[0.2, 0.6], NewtonSettings::default(), line).unwrap();
        assert_eq!(off_line, Err(NewtonFailure::Inconsistent));
    }

    #[test]
    fn tilted_surface_in_space_accepts_exact_targets() {
        // (0.1 + 0.7 s, 0.2 + 0.9 t, 0.3 s + 0.7 t)
        let plane = |xi: &XiPoint| -> Result<Option<XiSample>, Infallible> {
            let (s, t) = (xi[0], xi[1]);
            Ok(Some(XiSample {
                values: vec![0.1 + 0.7 * s, 0.2 + 0.9 * t, 0.3 * s + 0.7 * t],
                derivatives: vec![0.7, 0.0, 0.0, 0.9, 0.3, 0.7],
            }))
        };
        for i in 0..=10 {
            for j in 0..=10 {
                let xi = [f64::from(i) / 10.0, f64::from(j) / 10.0, 0.0];
                let target = plane(&xi).unwrap().unwrap().values;
                let found = find_xi_in_element(2, &target, NewtonSettings::default(), plane)
                    .unwrap()
                    .unwrap_or_else(|failure| panic!("{xi:?} rejected: {failure:?}"));
                assert!((found[0] - xi[0]).abs() < 1e-6, "{found:?} vs {xi:?}");
                assert!((found[1] - xi[1]).abs() < 1e-6, "{found:?} vs {xi:?}");
            }
        }

        let above = find_xi_in_element(2, &[0.45, 0.65, 1.5], NewtonSettings::default(), plane)
            .unwrap();
        assert_eq!(above, Err(NewtonFailure::Inconsistent));
    }

    #[test]
    fn collapsed_element_is_singular() {
        let collapsed = |_: &XiPoint| -> Result<Option<XiSample>, Infallible> {
            Ok(Some(XiSample {
                values: vec![0.0, 0.0],
                derivatives: vec![0.0, 0.0, 0.0, 0.0],
            }))
        };
        let outcome =
            find_xi_in_element(2, &[1.0, 1.0], NewtonSettings::default(), collapsed).unwrap();
        assert_eq!(outcome, Err(NewtonFailure::Singular));
    }
}

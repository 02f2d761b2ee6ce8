// ─────────────────────────────────────────────────────────────────────────────
// Tolerance
// ─────────────────────────────────────────────────────────────────────────────

/// Tolerance configuration for numeric field operations.
///
/// Use the named constants for specific use cases to avoid epsilon scatter:
/// - `Tolerance::FIND_XI` - Newton convergence in element xi space (1e-6)
/// - `Tolerance::SINGULAR` - Pivot/determinant threshold for inversion (1e-12)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub eps: f64,
}

impl Tolerance {
    /// Convergence tolerance for xi increments and the slack allowed outside
    /// the unit element (1e-6).
    pub const FIND_XI: Self = Self { eps: 1e-6 };

    /// Threshold below which a pivot or determinant is treated as zero (1e-12).
    pub const SINGULAR: Self = Self { eps: 1e-12 };

    #[must_use]
    pub const fn new(eps: f64) -> Self {
        Self { eps }
    }

    /// Create a scaled tolerance (e.g., for relative comparisons).
    #[must_use]
    pub fn scaled(self, scale: f64) -> Self {
        Self::new(self.eps * scale.abs())
    }

    #[must_use]
    pub fn approx_eq_f64(self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.eps
    }

    /// Component-wise comparison of two equally sized slices.
    #[cfg(test)]
    pub(crate) fn approx_eq_slice(self, a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.approx_eq_f64(*x, *y))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Small vector helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Euclidean length of `a`.
#[must_use]
pub fn norm(a: &[f64]) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Pads or truncates `values` to exactly three entries.
#[must_use]
pub fn pad3(values: &[f64]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = *value;
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_comparisons() {
        let tol = Tolerance::FIND_XI;
        assert!(tol.approx_eq_f64(1.0, 1.0 + 5e-7));
        assert!(!tol.approx_eq_f64(1.0, 1.0 + 5e-6));
        assert!(Tolerance::SINGULAR.approx_eq_slice(&[1.0, 2.0], &[1.0, 2.0]));
        assert!(!Tolerance::SINGULAR.approx_eq_slice(&[1.0], &[1.0, 2.0]));
    }

    #[test]
    fn test_scaled_tolerance() {
        let tol = Tolerance::FIND_XI.scaled(-10.0);
        assert!((tol.eps - 1e-5).abs() < 1e-18);
    }

    #[test]
    fn test_pad3_and_norm() {
        assert_eq!(pad3(&[1.0]), [1.0, 0.0, 0.0]);
        assert_eq!(pad3(&[1.0, 2.0, 3.0, 4.0]), [1.0, 2.0, 3.0]);
        assert!((norm(&[3.0, 4.0]) - 5.0).abs() < 1e-12);
    }
}

//! Small dense linear algebra used by the derivative field types and the
//! find-element-xi solver.
//!
//! Matrices are stored row-major in flat slices. 3x3 matrices use `[f64; 9]`.

use super::core::Tolerance;

/// Row-major 3x3 matrix.
pub type Matrix3 = [f64; 9];

pub const IDENTITY3: Matrix3 = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Errors from matrix factorisation and inversion.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum LinearAlgebraError {
    #[error("matrix is singular (|pivot| {pivot:e} <= {tolerance:e})")]
    Singular { pivot: f64, tolerance: f64 },
    #[error("expected a {size}x{size} matrix, got {len} entries")]
    DimensionMismatch { size: usize, len: usize },
}

#[must_use]
pub fn determinant3(m: &Matrix3) -> f64 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6])
}

/// Inverts a 3x3 matrix using the adjugate.
pub fn invert3(m: &Matrix3, tolerance: Tolerance) -> Result<Matrix3, LinearAlgebraError> {
    let det = determinant3(m);
    if !det.is_finite() || det.abs() <= tolerance.eps {
        return Err(LinearAlgebraError::Singular {
            pivot: det,
            tolerance: tolerance.eps,
        });
    }
    let inv_det = 1.0 / det;
    Ok([
        (m[4] * m[8] - m[5] * m[7]) * inv_det,
        (m[2] * m[7] - m[1] * m[8]) * inv_det,
        (m[1] * m[5] - m[2] * m[4]) * inv_det,
        (m[5] * m[6] - m[3] * m[8]) * inv_det,
        (m[0] * m[8] - m[2] * m[6]) * inv_det,
        (m[2] * m[3] - m[0] * m[5]) * inv_det,
        (m[3] * m[7] - m[4] * m[6]) * inv_det,
        (m[1] * m[6] - m[0] * m[7]) * inv_det,
        (m[0] * m[4] - m[1] * m[3]) * inv_det,
    ])
}

/// Returns `a * b`.
#[must_use]
pub fn multiply3(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [0.0; 9];
    for row in 0..3 {
        for col in 0..3 {
            out[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
        }
    }
    out
}

/// Returns `m * v`.
#[must_use]
pub fn apply3(m: &Matrix3, v: &[f64; 3]) -> [f64; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// LU decomposition
// ─────────────────────────────────────────────────────────────────────────────

/// LU factorisation with partial pivoting of a square matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    size: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
}

impl LuDecomposition {
    /// Factorises the row-major `size x size` matrix.
    ///
    /// Fails with [`LinearAlgebraError::Singular`] when a pivot magnitude
    /// falls to or below `tolerance`.
    pub fn decompose(
        matrix: &[f64],
        size: usize,
        tolerance: Tolerance,
    ) -> Result<Self, LinearAlgebraError> {
        if matrix.len() != size * size {
            return Err(LinearAlgebraError::DimensionMismatch {
                size,
                len: matrix.len(),
            });
        }
        let mut lu = matrix.to_vec();
        let mut pivots = Vec::with_capacity(size);

        for col in 0..size {
            let mut pivot_row = col;
            let mut pivot_value = lu[col * size + col].abs();
            for row in (col + 1)..size {
                let candidate = lu[row * size + col].abs();
                if candidate > pivot_value {
                    pivot_value = candidate;
                    pivot_row = row;
                }
            }
            if !pivot_value.is_finite() || pivot_value <= tolerance.eps {
                return Err(LinearAlgebraError::Singular {
                    pivot: pivot_value,
                    tolerance: tolerance.eps,
                });
            }
            if pivot_row != col {
                for k in 0..size {
                    lu.swap(col * size + k, pivot_row * size + k);
                }
            }
            pivots.push(pivot_row);

            let diagonal = lu[col * size + col];
            for row in (col + 1)..size {
                let factor = lu[row * size + col] / diagonal;
                lu[row * size + col] = factor;
                for k in (col + 1)..size {
                    lu[row * size + k] -= factor * lu[col * size + k];
                }
            }
        }

        Ok(Self { size, lu, pivots })
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Solves `A x = rhs` in place, overwriting `rhs` with `x`.
    pub fn solve_in_place(&self, rhs: &mut [f64]) -> Result<(), LinearAlgebraError> {
        let n = self.size;
        if rhs.len() != n {
            return Err(LinearAlgebraError::DimensionMismatch { size: n, len: rhs.len() });
        }
        for (col, &pivot_row) in self.pivots.iter().enumerate() {
            rhs.swap(col, pivot_row);
        }
        for row in 0..n {
            let sum: f64 = (0..row).map(|k| self.lu[row * n + k] * rhs[k]).sum();
            rhs[row] -= sum;
        }
        for row in (0..n).rev() {
            let sum: f64 = ((row + 1)..n).map(|k| self.lu[row * n + k] * rhs[k]).sum();
            rhs[row] = (rhs[row] - sum) / self.lu[row * n + row];
        }
        Ok(())
    }
}

/// Convenience wrapper: factorise `matrix` and solve for a single right hand side.
pub fn solve(
    matrix: &[f64],
    rhs: &mut [f64],
    tolerance: Tolerance,
) -> Result<(), LinearAlgebraError> {
    let lu = LuDecomposition::decompose(matrix, rhs.len(), tolerance)?;
    lu.solve_in_place(rhs)
}

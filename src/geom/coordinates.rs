//! Coordinate system conversion with optional Jacobians.
//!
//! Every conversion goes through rectangular Cartesian: the source tuple is
//! mapped to `(x, y, z)` and then into the destination system. Jacobians are
//! composed the same way, `d(to)/d(from) = d(to)/d(rc) * d(rc)/d(from)`.
//!
//! Conventions (angles in radians):
//! - cylindrical polar `(r, theta, z)`: `x = r cos(theta)`, `y = r sin(theta)`
//! - spherical polar `(r, theta, phi)`: `x = r cos(theta) cos(phi)`,
//!   `y = r sin(theta) cos(phi)`, `z = r sin(phi)`
//! - prolate spheroidal `(lambda, mu, theta)` with focus `a`:
//!   `x = a cosh(lambda) cos(mu)`, `y = a sinh(lambda) sin(mu) cos(theta)`,
//!   `z = a sinh(lambda) sin(mu) sin(theta)`
//! - oblate spheroidal `(lambda, mu, theta)` with focus `a`:
//!   `x = a cosh(lambda) cos(mu) cos(theta)`, `y = a cosh(lambda) cos(mu) sin(theta)`,
//!   `z = a sinh(lambda) sin(mu)`
//!
//! Fibre and "not applicable" systems pass values through unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::core::Tolerance;
use super::linalg::{IDENTITY3, LinearAlgebraError, Matrix3, invert3, multiply3};

/// Kinds of coordinate system a field's values may be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSystemType {
    RectangularCartesian,
    CylindricalPolar,
    SphericalPolar,
    ProlateSpheroidal,
    OblateSpheroidal,
    Fibre,
    NotApplicable,
}

impl CoordinateSystemType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RectangularCartesian => "rectangular_cartesian",
            Self::CylindricalPolar => "cylindrical_polar",
            Self::SphericalPolar => "spherical_polar",
            Self::ProlateSpheroidal => "prolate_spheroidal",
            Self::OblateSpheroidal => "oblate_spheroidal",
            Self::Fibre => "fibre",
            Self::NotApplicable => "not_applicable",
        }
    }

    /// Whether the conversion formulas need a focus parameter.
    #[must_use]
    pub const fn uses_focus(self) -> bool {
        matches!(self, Self::ProlateSpheroidal | Self::OblateSpheroidal)
    }

    /// Kinds that take part in conversion. Everything else behaves as
    /// rectangular Cartesian.
    const fn is_enumerated(self) -> bool {
        matches!(
            self,
            Self::RectangularCartesian
                | Self::CylindricalPolar
                | Self::SphericalPolar
                | Self::ProlateSpheroidal
                | Self::OblateSpheroidal
        )
    }
}

impl fmt::Display for CoordinateSystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A coordinate system kind plus its focus parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSystem {
    pub kind: CoordinateSystemType,
    pub focus: f64,
}

impl CoordinateSystem {
    pub const RECTANGULAR_CARTESIAN: Self = Self::new(CoordinateSystemType::RectangularCartesian);

    #[must_use]
    pub const fn new(kind: CoordinateSystemType) -> Self {
        Self { kind, focus: 1.0 }
    }

    #[must_use]
    pub const fn with_focus(kind: CoordinateSystemType, focus: f64) -> Self {
        Self { kind, focus }
    }

    #[must_use]
    pub const fn is_rectangular_cartesian(&self) -> bool {
        matches!(self.kind, CoordinateSystemType::RectangularCartesian)
    }

    /// Systems that convert exactly like rectangular Cartesian.
    #[must_use]
    pub const fn behaves_as_rectangular_cartesian(&self) -> bool {
        !self.kind.is_enumerated() || self.is_rectangular_cartesian()
    }

    fn same_conversion_as(&self, other: &Self) -> bool {
        if self.behaves_as_rectangular_cartesian() && other.behaves_as_rectangular_cartesian() {
            return true;
        }
        self.kind == other.kind && (!self.kind.uses_focus() || self.focus == other.focus)
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::RECTANGULAR_CARTESIAN
    }
}

impl fmt::Display for CoordinateSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.as_str())?;
        if self.kind.uses_focus() {
            write!(f, " focus {}", self.focus)?;
        }
        Ok(())
    }
}

/// Failures while building a conversion Jacobian.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    #[error("coordinate Jacobian of {system} is singular at ({x}, {y}, {z})")]
    SingularJacobian {
        system: CoordinateSystemType,
        x: f64,
        y: f64,
        z: f64,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Public conversion API
// ─────────────────────────────────────────────────────────────────────────────

/// Converts `value` from `from` to `to`.
#[must_use]
pub fn convert(value: [f64; 3], from: &CoordinateSystem, to: &CoordinateSystem) -> [f64; 3] {
    if from.same_conversion_as(to) {
        return value;
    }
    let rc = to_rectangular_cartesian(value, from);
    from_rectangular_cartesian(rc, to)
}

/// Converts `value` from `from` to `to` and returns the Jacobian
/// `d(to)/d(from)` (row = destination coordinate, column = source coordinate).
pub fn convert_with_jacobian(
    value: [f64; 3],
    from: &CoordinateSystem,
    to: &CoordinateSystem,
) -> Result<([f64; 3], Matrix3), CoordinateError> {
    if from.same_conversion_as(to) {
        return Ok((value, IDENTITY3));
    }
    let rc = to_rectangular_cartesian(value, from);
    let drc_dfrom = rectangular_cartesian_jacobian(value, from);
    let converted = from_rectangular_cartesian(rc, to);
    // d(to)/d(rc) is the inverse of d(rc)/d(to) evaluated at the result.
    let drc_dto = rectangular_cartesian_jacobian(converted, to);
    let dto_drc = invert3(&drc_dto, Tolerance::SINGULAR).map_err(|_: LinearAlgebraError| {
        CoordinateError::SingularJacobian {
            system: to.kind,
            x: rc[0],
            y: rc[1],
            z: rc[2],
        }
    })?;
    Ok((converted, multiply3(&dto_drc, &drc_dfrom)))
}

/// Converts up to three leading `values` (missing ones read as zero).
#[must_use]
pub fn convert_components(
    values: &[f64],
    from: &CoordinateSystem,
    to: &CoordinateSystem,
) -> [f64; 3] {
    convert(super::core::pad3(values), from, to)
}

// ─────────────────────────────────────────────────────────────────────────────
// Forward maps
// ─────────────────────────────────────────────────────────────────────────────

fn to_rectangular_cartesian(v: [f64; 3], system: &CoordinateSystem) -> [f64; 3] {
    let a = system.focus;
    match system.kind {
        CoordinateSystemType::CylindricalPolar => {
            let (r, theta, z) = (v[0], v[1], v[2]);
            [r * theta.cos(), r * theta.sin(), z]
        }
        CoordinateSystemType::SphericalPolar => {
            let (r, theta, phi) = (v[0], v[1], v[2]);
            [
                r * theta.cos() * phi.cos(),
                r * theta.sin() * phi.cos(),
                r * phi.sin(),
            ]
        }
        CoordinateSystemType::ProlateSpheroidal => {
            let (lambda, mu, theta) = (v[0], v[1], v[2]);
            let radial = a * lambda.sinh() * mu.sin();
            [
                a * lambda.cosh() * mu.cos(),
                radial * theta.cos(),
                radial * theta.sin(),
            ]
        }
        CoordinateSystemType::OblateSpheroidal => {
            let (lambda, mu, theta) = (v[0], v[1], v[2]);
            let radial = a * lambda.cosh() * mu.cos();
            [
                radial * theta.cos(),
                radial * theta.sin(),
                a * lambda.sinh() * mu.sin(),
            ]
        }
        CoordinateSystemType::RectangularCartesian
        | CoordinateSystemType::Fibre
        | CoordinateSystemType::NotApplicable => v,
    }
}

/// `d(rc)/d(system)` at `v` given in `system` coordinates.
fn rectangular_cartesian_jacobian(v: [f64; 3], system: &CoordinateSystem) -> Matrix3 {
    let a = system.focus;
    match system.kind {
        CoordinateSystemType::CylindricalPolar => {
            let (r, theta) = (v[0], v[1]);
            let (s, c) = theta.sin_cos();
            [c, -r * s, 0.0, s, r * c, 0.0, 0.0, 0.0, 1.0]
        }
        CoordinateSystemType::SphericalPolar => {
            let (r, theta, phi) = (v[0], v[1], v[2]);
            let (st, ct) = theta.sin_cos();
            let (sp, cp) = phi.sin_cos();
            [
                ct * cp,
                -r * st * cp,
                -r * ct * sp,
                st * cp,
                r * ct * cp,
                -r * st * sp,
                sp,
                0.0,
                r * cp,
            ]
        }
        CoordinateSystemType::ProlateSpheroidal => {
            let (lambda, mu, theta) = (v[0], v[1], v[2]);
            let (sh, ch) = (lambda.sinh(), lambda.cosh());
            let (sm, cm) = mu.sin_cos();
            let (st, ct) = theta.sin_cos();
            [
                a * sh * cm,
                -a * ch * sm,
                0.0,
                a * ch * sm * ct,
                a * sh * cm * ct,
                -a * sh * sm * st,
                a * ch * sm * st,
                a * sh * cm * st,
                a * sh * sm * ct,
            ]
        }
        CoordinateSystemType::OblateSpheroidal => {
            let (lambda, mu, theta) = (v[0], v[1], v[2]);
            let (sh, ch) = (lambda.sinh(), lambda.cosh());
            let (sm, cm) = mu.sin_cos();
            let (st, ct) = theta.sin_cos();
            [
                a * sh * cm * ct,
                -a * ch * sm * ct,
                -a * ch * cm * st,
                a * sh * cm * st,
                -a * ch * sm * st,
                a * ch * cm * ct,
                a * ch * sm,
                a * sh * cm,
                0.0,
            ]
        }
        CoordinateSystemType::RectangularCartesian
        | CoordinateSystemType::Fibre
        | CoordinateSystemType::NotApplicable => IDENTITY3,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inverse maps
// ─────────────────────────────────────────────────────────────────────────────

fn from_rectangular_cartesian(rc: [f64; 3], system: &CoordinateSystem) -> [f64; 3] {
    let [x, y, z] = rc;
    match system.kind {
        CoordinateSystemType::CylindricalPolar => [x.hypot(y), y.atan2(x), z],
        CoordinateSystemType::SphericalPolar => {
            let r = (x * x + y * y + z * z).sqrt();
            let phi = if r > 0.0 { (z / r).clamp(-1.0, 1.0).asin() } else { 0.0 };
            [r, y.atan2(x), phi]
        }
        CoordinateSystemType::ProlateSpheroidal => {
            let radial = y.hypot(z);
            let (lambda, mu) = elliptic_from_planar(x, radial, system.focus);
            [lambda, mu, z.atan2(y)]
        }
        CoordinateSystemType::OblateSpheroidal => {
            let radial = x.hypot(y);
            let (lambda, mu) = elliptic_from_planar(radial, z.abs(), system.focus);
            let mu = if z < 0.0 { -mu } else { mu };
            [lambda, mu, y.atan2(x)]
        }
        CoordinateSystemType::RectangularCartesian
        | CoordinateSystemType::Fibre
        | CoordinateSystemType::NotApplicable => rc,
    }
}

/// Planar elliptic coordinates of `(u, v)` with foci at `(+-a, 0)`, for `v >= 0`:
/// `u = a cosh(lambda) cos(mu)`, `v = a sinh(lambda) sin(mu)`.
fn elliptic_from_planar(u: f64, v: f64, a: f64) -> (f64, f64) {
    if a <= 0.0 {
        return (0.0, 0.0);
    }
    let d1 = (u + a).hypot(v);
    let d2 = (u - a).hypot(v);
    let cosh_lambda = ((d1 + d2) / (2.0 * a)).max(1.0);
    let cos_mu = ((d1 - d2) / (2.0 * a)).clamp(-1.0, 1.0);
    (cosh_lambda.acosh(), cos_mu.acos())
}

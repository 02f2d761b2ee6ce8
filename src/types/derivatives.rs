//! Differential operators over element local coordinates.
//!
//! `derivative` reads one xi column of its source's derivatives. `curl`,
//! `divergence` and `gradient` evaluate their sources on the top-level
//! element and map xi derivatives to spatial ones through the inverse of the
//! coordinate field's `dx/dxi`. A singular `dx/dxi` gives zero output and a
//! warning. None of them produce derivatives of their own.

use log::warn;

use super::{ComputeContext, Established, FieldKind};
use crate::field::{Field, FieldCache, FieldError, FieldGraph, FieldId};
use crate::geom::{
    CoordinateSystem, CoordinateSystemType, LuDecomposition, Matrix3, convert_with_jacobian,
    invert3, pad3,
};
use crate::mesh::MAXIMUM_ELEMENT_XI_DIMENSIONS;

pub(crate) fn establish_derivative(
    graph: &FieldGraph,
    source: FieldId,
    xi_index: usize,
) -> Result<Established, FieldError> {
    if xi_index >= MAXIMUM_ELEMENT_XI_DIMENSIONS {
        return Err(FieldError::argument(format!(
            "xi index {} is out of range 1..={MAXIMUM_ELEMENT_XI_DIMENSIONS}",
            xi_index + 1
        )));
    }
    let components = graph.field(source)?.number_of_components();
    Ok(Established::new(
        FieldKind::Derivative { xi_index },
        vec![source],
        components,
    ))
}

fn require_rectangular_cartesian(field: &Field, role: &str) -> Result<(), FieldError> {
    if field.coordinate_system().behaves_as_rectangular_cartesian() {
        Ok(())
    } else {
        Err(FieldError::argument(format!(
            "{role} field `{}` must be rectangular cartesian, not {}",
            field.name(),
            field.coordinate_system()
        )))
    }
}

fn require_components(
    field: &Field,
    role: &str,
    allowed: impl Fn(usize) -> bool,
    wanted: &str,
) -> Result<(), FieldError> {
    if allowed(field.number_of_components()) {
        Ok(())
    } else {
        Err(FieldError::argument(format!(
            "{role} field `{}` has {} components, expected {wanted}",
            field.name(),
            field.number_of_components()
        )))
    }
}

pub(crate) fn establish_curl(
    graph: &FieldGraph,
    vector: FieldId,
    coordinate: FieldId,
) -> Result<Established, FieldError> {
    let vector_field = graph.field(vector)?;
    let coordinate_field = graph.field(coordinate)?;
    require_components(vector_field, "vector", |n| n == 3, "3")?;
    require_rectangular_cartesian(vector_field, "vector")?;
    require_components(coordinate_field, "coordinate", |n| n == 3, "3")?;
    Ok(Established::new(FieldKind::Curl, vec![vector, coordinate], 3))
}

pub(crate) fn establish_divergence(
    graph: &FieldGraph,
    vector: FieldId,
    coordinate: FieldId,
) -> Result<Established, FieldError> {
    let vector_field = graph.field(vector)?;
    let coordinate_field = graph.field(coordinate)?;
    require_components(coordinate_field, "coordinate", |n| (1..=3).contains(&n), "1 to 3")?;
    let coordinate_components = coordinate_field.number_of_components();
    require_components(
        vector_field,
        "vector",
        |n| n == coordinate_components,
        "as many as the coordinate field",
    )?;
    require_rectangular_cartesian(vector_field, "vector")?;
    Ok(Established::new(
        FieldKind::Divergence,
        vec![vector, coordinate],
        1,
    ))
}

pub(crate) fn establish_gradient(
    graph: &FieldGraph,
    source: FieldId,
    coordinate: FieldId,
) -> Result<Established, FieldError> {
    let source_field = graph.field(source)?;
    let coordinate_field = graph.field(coordinate)?;
    require_components(coordinate_field, "coordinate", |n| (1..=3).contains(&n), "1 to 3")?;
    Ok(Established::new(
        FieldKind::Gradient,
        vec![source, coordinate],
        source_field.number_of_components() * coordinate_field.number_of_components(),
    ))
}

pub(crate) fn compute_derivative(
    ctx: &ComputeContext<'_>,
    xi_index: usize,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    let source = ctx.source(0)?;
    let dimension = source.cache.element_dimension();
    if xi_index >= dimension {
        return Err(ctx.not_defined());
    }
    let derivatives = source.cache.derivatives().ok_or_else(|| ctx.not_defined())?;
    for (i, value) in cache.values.iter_mut().enumerate() {
        *value = derivatives[i * dimension + xi_index];
    }
    cache.derivatives_valid = false;
    Ok(())
}

/// `dx/dxi` of the coordinate field converted to rectangular Cartesian,
/// row = x component, column = xi; unused rows and columns stay zero.
fn rectangular_cartesian_dx_dxi(coordinate: &Field, dimension: usize) -> Option<Matrix3> {
    let derivatives = coordinate.cache.derivatives()?;
    let (_, jacobian) = convert_with_jacobian(
        pad3(coordinate.cache.values()),
        coordinate.coordinate_system(),
        &CoordinateSystem::RECTANGULAR_CARTESIAN,
    )
    .ok()?;
    let components = coordinate.number_of_components();
    let mut dx_dxi = [0.0; 9];
    for i in 0..3 {
        for j in 0..dimension {
            dx_dxi[i * 3 + j] = (0..components)
                .map(|k| jacobian[i * 3 + k] * derivatives[k * dimension + j])
                .sum();
        }
    }
    Some(dx_dxi)
}

/// Spatial derivatives need RC vectors and derivatives from both sources.
fn vector_sources<'a>(
    ctx: &'a ComputeContext<'_>,
) -> Result<(&'a Field, &'a Field, &'a [f64]), FieldError> {
    let vector = ctx.source(0)?;
    let coordinate = ctx.source(1)?;
    if !vector.coordinate_system().behaves_as_rectangular_cartesian()
        || coordinate.cache.derivatives().is_none()
    {
        return Err(ctx.not_defined());
    }
    let vector_derivatives = vector.cache.derivatives().ok_or_else(|| ctx.not_defined())?;
    Ok((vector, coordinate, vector_derivatives))
}

pub(crate) fn compute_curl(
    ctx: &ComputeContext<'_>,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    cache.derivatives_valid = false;
    let (vector, coordinate, dv) = vector_sources(ctx)?;
    let dimension = vector.cache.element_dimension();
    // curl is only meaningful in three dimensions
    if dimension != 3 {
        return Err(ctx.not_defined());
    }
    let dxi_dx = rectangular_cartesian_dx_dxi(coordinate, dimension)
        .and_then(|dx_dxi| invert3(&dx_dxi, ctx.config.singular_tolerance()).ok());
    let Some(dxi_dx) = dxi_dx else {
        warn!(
            "{}: could not invert coordinate derivatives; setting curl to 0",
            ctx.field.name()
        );
        cache.values.fill(0.0);
        return Ok(());
    };

    let term = |row: usize, column: usize| -> f64 {
        (0..dimension)
            .map(|i| dv[row * dimension + i] * dxi_dx[3 * i + column])
            .sum()
    };
    // dVz/dy - dVy/dz, dVx/dz - dVz/dx, dVy/dx - dVx/dy
    cache.values[0] = term(2, 1) - term(1, 2);
    cache.values[1] = term(0, 2) - term(2, 0);
    cache.values[2] = term(1, 0) - term(0, 1);
    Ok(())
}

pub(crate) fn compute_divergence(
    ctx: &ComputeContext<'_>,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    cache.derivatives_valid = false;
    let (vector, coordinate, dv) = vector_sources(ctx)?;
    let dimension = vector.cache.element_dimension();
    let components = coordinate.number_of_components();
    let invertible = (dimension == 3 && components == 3)
        || (coordinate.coordinate_system().is_rectangular_cartesian() && components == dimension)
        || (coordinate.coordinate_system().kind == CoordinateSystemType::CylindricalPolar
            && dimension == 2
            && components == 2);
    if !invertible {
        return Err(ctx.not_defined());
    }

    let dxi_dx = rectangular_cartesian_dx_dxi(coordinate, dimension).and_then(|mut dx_dxi| {
        // ones on the unused diagonal keep the matrix invertible
        if dimension < 3 {
            dx_dxi[8] = 1.0;
            if dimension < 2 {
                dx_dxi[4] = 1.0;
            }
        }
        invert3(&dx_dxi, ctx.config.singular_tolerance()).ok()
    });
    let Some(dxi_dx) = dxi_dx else {
        warn!(
            "{}: could not invert coordinate derivatives; setting divergence to 0",
            ctx.field.name()
        );
        cache.values[0] = 0.0;
        return Ok(());
    };

    let mut divergence = 0.0;
    for i in 0..dimension {
        for j in 0..dimension {
            divergence += dv[i * dimension + j] * dxi_dx[3 * j + i];
        }
    }
    cache.values[0] = divergence;
    Ok(())
}

pub(crate) fn compute_gradient(
    ctx: &ComputeContext<'_>,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    cache.derivatives_valid = false;
    let source = ctx.source(0)?;
    let coordinate = ctx.source(1)?;
    let (Some(source_derivatives), Some(coordinate_derivatives)) =
        (source.cache.derivatives(), coordinate.cache.derivatives())
    else {
        return Err(ctx.not_defined());
    };
    let n = coordinate.number_of_components();
    // dx/dxi must be square
    if coordinate.cache.element_dimension() != n {
        return Err(ctx.not_defined());
    }

    // transpose: a[i][j] = dx_j/dxi_i
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            a[i * n + j] = coordinate_derivatives[j * n + i];
        }
    }
    let solved = LuDecomposition::decompose(&a, n, ctx.config.singular_tolerance()).and_then(|lu| {
        let mut gradient = Vec::with_capacity(cache.values.len());
        for row in source_derivatives.chunks_exact(n) {
            let mut b = row.to_vec();
            lu.solve_in_place(&mut b)?;
            gradient.extend(b);
        }
        Ok(gradient)
    });
    match solved {
        Ok(gradient) if gradient.len() == cache.values.len() => {
            cache.values.copy_from_slice(&gradient);
        }
        _ => {
            warn!(
                "{}: could not invert coordinate derivatives; setting gradient to 0",
                ctx.field.name()
            );
            cache.values.fill(0.0);
        }
    }
    Ok(())
}

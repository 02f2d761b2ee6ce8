//! Leaf fields backed by the mesh: interpolated finite element fields and
//! element local coordinates.

use log::debug;

use super::{ComputeContext, Established, FieldKind};
use crate::field::{FieldCache, FieldError, FieldGraph, Location};
use crate::mesh::{FeFieldId, MAXIMUM_ELEMENT_XI_DIMENSIONS};

pub(crate) fn establish(graph: &FieldGraph, fe_field: FeFieldId) -> Result<Established, FieldError> {
    let components = graph.mesh().fe_field_components(fe_field)?;
    if components == 0 {
        return Err(FieldError::argument(format!(
            "finite element field `{}` has no components",
            graph.mesh().fe_field_name(fe_field)?
        )));
    }
    Ok(Established::new(
        FieldKind::FiniteElement { fe_field },
        Vec::new(),
        components,
    ))
}

pub(crate) fn compute(
    ctx: &ComputeContext<'_>,
    fe_field: FeFieldId,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    match ctx.location {
        Location::Node(node) => {
            let values = ctx.mesh.evaluate_at_node(fe_field, node, ctx.time)?;
            copy_values(ctx, &values, cache)?;
            cache.derivatives_valid = false;
        }
        Location::Element { element, xi } => {
            let evaluation =
                ctx.mesh
                    .evaluate_in_element(fe_field, element, &xi, ctx.time, ctx.need_derivatives)?;
            copy_values(ctx, &evaluation.values, cache)?;
            match evaluation.derivatives {
                Some(derivatives) if ctx.need_derivatives => {
                    if derivatives.len() == cache.derivatives.len() {
                        cache.derivatives.copy_from_slice(&derivatives);
                    } else {
                        debug!(
                            "finite element `{}`: {} derivatives for {} slots",
                            ctx.field.name(),
                            derivatives.len(),
                            cache.derivatives.len()
                        );
                        cache.derivatives_valid = false;
                    }
                }
                _ => cache.derivatives_valid = false,
            }
        }
    }
    Ok(())
}

fn copy_values(
    ctx: &ComputeContext<'_>,
    values: &[f64],
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    if values.len() != cache.values.len() {
        return Err(FieldError::argument(format!(
            "field `{}` expects {} values from the mesh, got {}",
            ctx.field.name(),
            cache.values.len(),
            values.len()
        )));
    }
    cache.values.copy_from_slice(values);
    Ok(())
}

/// Xi coordinates: three values, the identity as derivatives.
pub(crate) fn compute_xi(ctx: &ComputeContext<'_>, cache: &mut FieldCache) -> Result<(), FieldError> {
    let Location::Element { xi, .. } = ctx.location else {
        return Err(ctx.not_defined());
    };
    let dimension = cache.element_dimension;
    for (i, value) in cache.values.iter_mut().enumerate().take(MAXIMUM_ELEMENT_XI_DIMENSIONS) {
        *value = if i < dimension { xi[i] } else { 0.0 };
    }
    if cache.derivatives_valid {
        for i in 0..MAXIMUM_ELEMENT_XI_DIMENSIONS {
            for j in 0..dimension {
                cache.derivatives[i * dimension + j] = if i == j { 1.0 } else { 0.0 };
            }
        }
    }
    Ok(())
}

/// Writes through to the mesh; only finite element storage holds data.
pub(crate) fn set_values(
    graph: &mut FieldGraph,
    fe_field: FeFieldId,
    location: &Location,
    time: f64,
    values: &[f64],
) -> Result<(), FieldError> {
    match *location {
        Location::Node(node) => graph
            .mesh_mut()
            .set_values_at_node(fe_field, node, time, values)?,
        Location::Element { element, xi } => graph
            .mesh_mut()
            .set_values_in_element(fe_field, element, &xi, time, values)?,
    }
    Ok(())
}

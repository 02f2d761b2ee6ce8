//! Coordinate transformation fields.
//!
//! `coordinate_transformation` converts a position from its source field's
//! coordinate system into the field's own. `vector_coordinate_transformation`
//! converts up to three vectors stored relative to the vector field's
//! coordinate system into the field's coordinate system at a position given
//! by a coordinate field.

use log::warn;

use super::{ComputeContext, Established, FieldKind};
use crate::field::{Field, FieldCache, FieldError, FieldGraph, FieldId, Location};
use crate::geom::{convert, convert_components, convert_with_jacobian, pad3};

/// Vector component counts the vector transformation accepts.
const VECTOR_COMPONENT_COUNTS: [usize; 6] = [1, 2, 3, 4, 6, 9];

pub(crate) fn establish_transformation(
    graph: &FieldGraph,
    source: FieldId,
) -> Result<Established, FieldError> {
    let field = graph.field(source)?;
    if field.number_of_components() > 3 {
        return Err(FieldError::argument(format!(
            "coordinate transformation source `{}` has {} components, at most 3 allowed",
            field.name(),
            field.number_of_components()
        )));
    }
    Ok(Established::new(
        FieldKind::CoordinateTransformation,
        vec![source],
        3,
    ))
}

pub(crate) fn establish_vector_transformation(
    graph: &FieldGraph,
    vector: FieldId,
    coordinate: FieldId,
) -> Result<Established, FieldError> {
    let vector_field = graph.field(vector)?;
    let coordinate_field = graph.field(coordinate)?;
    let vector_components = vector_field.number_of_components();
    if !VECTOR_COMPONENT_COUNTS.contains(&vector_components) {
        return Err(FieldError::argument(format!(
            "vector field `{}` has {vector_components} components, expected one of 1, 2, 3, 4, 6 or 9",
            vector_field.name()
        )));
    }
    if coordinate_field.number_of_components() > 3 {
        return Err(FieldError::argument(format!(
            "coordinate field `{}` has {} components, at most 3 allowed",
            coordinate_field.name(),
            coordinate_field.number_of_components()
        )));
    }
    let number_of_components = match vector_components {
        1..=3 => 3,
        4..=6 => 6,
        _ => 9,
    };
    Ok(Established::new(
        FieldKind::VectorCoordinateTransformation,
        vec![vector, coordinate],
        number_of_components,
    ))
}

pub(crate) fn compute_transformation(
    ctx: &ComputeContext<'_>,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    let source = ctx.source(0)?;
    let from = source.coordinate_system();
    let to = ctx.field.coordinate_system();
    let position = pad3(source.cache.values());

    if !cache.derivatives_valid {
        cache
            .values
            .copy_from_slice(&convert(position, from, to));
        return Ok(());
    }

    let (converted, jacobian) = match convert_with_jacobian(position, from, to) {
        Ok(result) => result,
        Err(err) => {
            warn!("{}: {err}; derivatives dropped", ctx.field.name());
            cache
                .values
                .copy_from_slice(&convert(position, from, to));
            cache.derivatives_valid = false;
            return Ok(());
        }
    };
    cache.values.copy_from_slice(&converted);

    let Some(source_derivatives) = source.cache.derivatives() else {
        cache.derivatives_valid = false;
        return Ok(());
    };
    let dimension = cache.element_dimension;
    let source_components = source.number_of_components();
    for i in 0..3 {
        for j in 0..dimension {
            cache.derivatives[i * dimension + j] = (0..source_components)
                .map(|k| jacobian[i * 3 + k] * source_derivatives[k * dimension + j])
                .sum();
        }
    }
    Ok(())
}

pub(crate) fn compute_vector_transformation(
    ctx: &ComputeContext<'_>,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    let vector = ctx.source(0)?;
    let coordinate = ctx.source(1)?;
    cache.derivatives_valid = false;

    // The position is expressed in the vector's system before building the
    // vector-to-field Jacobian.
    let position = convert_components(
        coordinate.cache.values(),
        coordinate.coordinate_system(),
        vector.coordinate_system(),
    );
    let jacobian = match convert_with_jacobian(
        position,
        vector.coordinate_system(),
        ctx.field.coordinate_system(),
    ) {
        Ok((_, jacobian)) => jacobian,
        Err(err) => {
            warn!("{}: {err}; setting vectors to 0", ctx.field.name());
            cache.values.fill(0.0);
            return Ok(());
        }
    };

    let number_of_vectors = ctx.field.number_of_components() / 3;
    let vector_values = vector.cache.values();
    let components_per_vector = vector_values.len() / number_of_vectors;
    for v in 0..number_of_vectors {
        let source = &vector_values[v * components_per_vector..(v + 1) * components_per_vector];
        for j in 0..3 {
            cache.values[v * 3 + j] = source
                .iter()
                .enumerate()
                .map(|(k, value)| jacobian[j * 3 + k] * value)
                .sum();
        }
    }
    Ok(())
}

/// Converts `values` from `field`'s coordinate system back into its source's
/// system, truncated to the source's component count.
fn to_source_system(
    graph: &FieldGraph,
    field: &Field,
    values: &[f64],
) -> Result<(FieldId, Vec<f64>), FieldError> {
    let [source] = field.source_fields() else {
        return Err(FieldError::argument(format!(
            "`{}` needs exactly one source field",
            field.name()
        )));
    };
    let source_field = graph.field(*source)?;
    let converted = convert_components(
        values,
        field.coordinate_system(),
        source_field.coordinate_system(),
    );
    Ok((
        *source,
        converted[..source_field.number_of_components()].to_vec(),
    ))
}

/// Inverse conversion, then delegation to the source's setter.
pub(crate) fn set_values(
    graph: &mut FieldGraph,
    id: FieldId,
    location: &Location,
    time: f64,
    values: &[f64],
) -> Result<(), FieldError> {
    let (source, source_values) = to_source_system(graph, graph.field(id)?, values)?;
    graph.set_values(source, location, time, &source_values)
}

/// Target values expressed for the source field's own find-element-xi.
pub(crate) fn find_element_xi_target(
    graph: &FieldGraph,
    field: &Field,
    values: &[f64],
) -> Result<(FieldId, Vec<f64>), FieldError> {
    to_source_system(graph, field, values)
}

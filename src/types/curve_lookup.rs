//! Control curve lookup: a scalar source field is the curve parameter.

use super::{ComputeContext, Established, FieldKind};
use crate::curve::CurveId;
use crate::field::{FieldCache, FieldError, FieldGraph, FieldId};

pub(crate) fn establish(
    graph: &FieldGraph,
    source: FieldId,
    curve: CurveId,
) -> Result<Established, FieldError> {
    let source_field = graph.field(source)?;
    if source_field.number_of_components() != 1 {
        return Err(FieldError::argument(format!(
            "curve lookup source `{}` must be scalar, it has {} components",
            source_field.name(),
            source_field.number_of_components()
        )));
    }
    let components = graph.curves().get(curve)?.number_of_components();
    if components == 0 {
        return Err(FieldError::argument(format!(
            "curve `{}` has no components",
            graph.curves().get(curve)?.name()
        )));
    }
    Ok(Established::new(
        FieldKind::CurveLookup { curve },
        vec![source],
        components,
    ))
}

pub(crate) fn compute(
    ctx: &ComputeContext<'_>,
    curve: CurveId,
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    let source = ctx.source(0)?;
    let parameter = source.cache.values()[0];
    let (values, slopes) = ctx.curves.get(curve)?.evaluate(parameter)?;
    cache.values.copy_from_slice(&values);

    if cache.derivatives_valid {
        let Some(source_derivatives) = source.cache.derivatives() else {
            cache.derivatives_valid = false;
            return Ok(());
        };
        let dimension = cache.element_dimension;
        for (i, slope) in slopes.iter().enumerate() {
            for (j, derivative) in source_derivatives.iter().enumerate().take(dimension) {
                cache.derivatives[i * dimension + j] = slope * derivative;
            }
        }
    }
    Ok(())
}

//! Compose fields: evaluate a value field through an embedding.
//!
//! The texture coordinate field is evaluated where the compose field is
//! asked for, the result is inverted through the find-element-xi field over
//! the search region, and the value field is evaluated at the location found.
//! Targets outside the embedding give the out-of-bounds value in every
//! component. The embedding is not differentiated.

use log::debug;

use super::{Established, FieldKind};
use crate::field::{FieldError, FieldGraph, FieldId, Location};

pub(crate) fn establish(
    graph: &FieldGraph,
    texture_coordinates: FieldId,
    find_element_xi: FieldId,
    calculate_values: FieldId,
    search_region: String,
) -> Result<Established, FieldError> {
    let texture = graph.field(texture_coordinates)?;
    let find = graph.field(find_element_xi)?;
    if texture.number_of_components() != find.number_of_components() {
        return Err(FieldError::argument(format!(
            "texture coordinates `{}` ({}) and find element xi field `{}` ({}) differ in component count",
            texture.name(),
            texture.number_of_components(),
            find.name(),
            find.number_of_components()
        )));
    }
    if !graph.mesh().has_region(&search_region) {
        return Err(FieldError::argument(format!(
            "unknown search region `{search_region}`"
        )));
    }
    let components = graph.field(calculate_values)?.number_of_components();
    Ok(Established::new(
        FieldKind::Compose { search_region },
        vec![texture_coordinates, find_element_xi, calculate_values],
        components,
    ))
}

/// Evaluation strategy of compose fields; leaves the result in the field's
/// cache.
pub(crate) fn evaluate(
    graph: &mut FieldGraph,
    id: FieldId,
    location: &Location,
    time: f64,
    need_derivatives: bool,
) -> Result<(), FieldError> {
    let field = graph.field(id)?;
    let FieldKind::Compose { search_region } = field.kind() else {
        return Err(FieldError::argument(format!("`{}` is not a compose field", field.name())));
    };
    let search_region = search_region.clone();
    let [texture, find, calculate] = *field.source_fields() else {
        return Err(FieldError::argument(format!(
            "compose field `{}` needs three source fields",
            field.name()
        )));
    };
    let number_of_components = field.number_of_components();

    let target = graph.evaluate(texture, location, time, false)?.values;
    let values = match graph.find_element_xi(find, &target, &search_region, None, time)? {
        Some(found) => graph.evaluate(calculate, &found.location(), time, false)?.values,
        None => {
            debug!("compose `{}`: target outside the embedding", graph.field(id)?.name());
            vec![graph.config().out_of_bounds_value; number_of_components]
        }
    };
    graph.store_values(id, location, need_derivatives, &values)
}

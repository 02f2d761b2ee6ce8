//! Composite fields: each output component is one component of a source
//! field or one constant. Constant and component fields are composites too.
//!
//! Source fields are numbered in order of first use and constants are used
//! in storage order, so two composites with the same effective mapping have
//! identical parameters and compare equal in `contents_match`.

use serde::Serialize;

use super::{ComputeContext, Established, FieldKind, format_g};
use crate::field::{Field, FieldCache, FieldError, FieldGraph, FieldId, Location};

/// Where one output component comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompositeComponent {
    /// Component `component` of source field number `source`.
    Field { source: usize, component: usize },
    /// Constant number `index`.
    Value { index: usize },
}

/// Complete parameter set of a composite field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompositeParameters {
    pub source_fields: Vec<FieldId>,
    pub source_values: Vec<f64>,
    pub components: Vec<CompositeComponent>,
}

/// One output component, described by value rather than by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompositeSource {
    Field { field: FieldId, component: usize },
    Value(f64),
}

impl CompositeParameters {
    #[must_use]
    pub fn constant(values: &[f64]) -> Self {
        Self {
            source_fields: Vec::new(),
            source_values: values.to_vec(),
            components: (0..values.len())
                .map(|index| CompositeComponent::Value { index })
                .collect(),
        }
    }

    #[must_use]
    pub fn component(field: FieldId, component: usize) -> Self {
        Self {
            source_fields: vec![field],
            source_values: Vec::new(),
            components: vec![CompositeComponent::Field {
                source: 0,
                component,
            }],
        }
    }

    /// Builds the canonical numbering for a list of component sources.
    #[must_use]
    pub fn from_sources(sources: &[CompositeSource]) -> Self {
        let mut parameters = Self::default();
        for source in sources {
            match *source {
                CompositeSource::Field { field, component } => {
                    let index = parameters
                        .source_fields
                        .iter()
                        .position(|existing| *existing == field)
                        .unwrap_or_else(|| {
                            parameters.source_fields.push(field);
                            parameters.source_fields.len() - 1
                        });
                    parameters.components.push(CompositeComponent::Field {
                        source: index,
                        component,
                    });
                }
                CompositeSource::Value(value) => {
                    parameters.source_values.push(value);
                    parameters.components.push(CompositeComponent::Value {
                        index: parameters.source_values.len() - 1,
                    });
                }
            }
        }
        parameters
    }

    #[must_use]
    pub fn number_of_components(&self) -> usize {
        self.components.len()
    }
}

pub(crate) fn establish(
    graph: &FieldGraph,
    parameters: CompositeParameters,
) -> Result<Established, FieldError> {
    let CompositeParameters {
        source_fields,
        source_values,
        components,
    } = parameters;
    if components.is_empty() {
        return Err(FieldError::argument("composite needs at least one component"));
    }
    for (position, field) in source_fields.iter().enumerate() {
        if source_fields[..position].contains(field) {
            return Err(FieldError::argument(format!(
                "composite source field `{}` is repeated",
                graph.field(*field)?.name()
            )));
        }
    }

    let mut next_source = 0;
    let mut next_value = 0;
    for (output, component) in components.iter().enumerate() {
        match *component {
            CompositeComponent::Field { source, component } => {
                if source > next_source {
                    return Err(FieldError::argument(format!(
                        "composite component {output} uses source field {source} before field {next_source}"
                    )));
                }
                if source == next_source {
                    next_source += 1;
                }
                let field = source_fields.get(source).ok_or_else(|| {
                    FieldError::argument(format!("composite has no source field {source}"))
                })?;
                let available = graph.field(*field)?.number_of_components();
                if component >= available {
                    return Err(FieldError::argument(format!(
                        "component {component} is out of range for a field with {available} components"
                    )));
                }
            }
            CompositeComponent::Value { index } => {
                if index != next_value || index >= source_values.len() {
                    return Err(FieldError::argument(format!(
                        "composite component {output} uses constant {index}, expected {next_value}"
                    )));
                }
                next_value += 1;
            }
        }
    }
    if next_source != source_fields.len() {
        return Err(FieldError::argument("composite has unused source fields"));
    }
    if next_value != source_values.len() {
        return Err(FieldError::argument("composite has unused source values"));
    }

    let number_of_components = components.len();
    Ok(Established {
        kind: FieldKind::Composite { components },
        source_fields,
        source_values,
        number_of_components,
        coordinate_system: None,
    })
}

pub(crate) fn compute(
    ctx: &ComputeContext<'_>,
    components: &[CompositeComponent],
    cache: &mut FieldCache,
) -> Result<(), FieldError> {
    let dimension = cache.element_dimension;
    for (output, component) in components.iter().enumerate() {
        match *component {
            CompositeComponent::Field { source, component } => {
                let source_cache = &ctx.source(source)?.cache;
                cache.values[output] = source_cache.values[component];
                if cache.derivatives_valid {
                    if let Some(derivatives) = source_cache.derivatives() {
                        let row = &derivatives[component * dimension..(component + 1) * dimension];
                        cache.derivatives[output * dimension..(output + 1) * dimension]
                            .copy_from_slice(row);
                    } else {
                        cache.derivatives_valid = false;
                    }
                }
            }
            CompositeComponent::Value { index } => {
                cache.values[output] = ctx.field.source_values[index];
                // constants have zero derivatives, left from prepare
            }
        }
    }
    Ok(())
}

/// Distributes `values` back onto the sources; constants are overwritten in
/// place.
pub(crate) fn set_values(
    graph: &mut FieldGraph,
    id: FieldId,
    location: &Location,
    time: f64,
    values: &[f64],
) -> Result<(), FieldError> {
    let (components, sources, mut constants) = {
        let field = graph.field(id)?;
        let FieldKind::Composite { components } = &field.kind else {
            return Err(FieldError::argument(format!("`{}` is not a composite", field.name)));
        };
        (
            components.clone(),
            field.source_fields.clone(),
            field.source_values.clone(),
        )
    };

    for (number, source) in sources.iter().enumerate() {
        let mut source_values = graph.evaluate(*source, location, time, false)?.values;
        for (output, component) in components.iter().enumerate() {
            if let CompositeComponent::Field {
                source: s,
                component,
            } = *component
            {
                if s == number {
                    source_values[component] = values[output];
                }
            }
        }
        graph.set_values(*source, location, time, &source_values)?;
    }

    let mut constants_changed = false;
    for (output, component) in components.iter().enumerate() {
        if let CompositeComponent::Value { index } = *component {
            constants_changed |= constants[index] != values[output];
            constants[index] = values[output];
        }
    }
    if constants_changed {
        graph.field_mut(id)?.source_values = constants;
        graph.invalidate(id)?;
    }
    Ok(())
}

/// Maps target values onto the single source field, zero-filling source
/// components the composite does not use.
pub(crate) fn find_element_xi_target(
    graph: &FieldGraph,
    field: &Field,
    values: &[f64],
) -> Result<(FieldId, Vec<f64>), FieldError> {
    let FieldKind::Composite { components } = &field.kind else {
        return Err(FieldError::argument(format!("`{}` is not a composite", field.name)));
    };
    let [source] = field.source_fields.as_slice() else {
        return Err(FieldError::unsupported(
            field.name(),
            "find element xi unless it has exactly one source field",
        ));
    };
    let mut target = vec![0.0; graph.field(*source)?.number_of_components()];
    for (output, component) in components.iter().enumerate() {
        if let CompositeComponent::Field { component, .. } = *component {
            target[component] = values[output];
        }
    }
    Ok((*source, target))
}

/// Source list as written in commands: whole fields by name when all their
/// components appear in order, otherwise `name.component`; constants in
/// `%g` form.
pub(crate) fn source_string(
    graph: &FieldGraph,
    field: &Field,
    components: &[CompositeComponent],
) -> Result<String, FieldError> {
    let mut parts = Vec::new();
    let mut output = 0;
    while output < components.len() {
        match components[output] {
            CompositeComponent::Field { source, component } => {
                let source_field = graph.field(field.source_fields[source])?;
                let count = source_field.number_of_components();
                let whole = component == 0
                    && output + count <= components.len()
                    && (0..count).all(|c| {
                        components[output + c]
                            == CompositeComponent::Field {
                                source,
                                component: c,
                            }
                    });
                if whole {
                    parts.push(source_field.name().to_owned());
                    output += count;
                    continue;
                }
                parts.push(format!("{}.{}", source_field.name(), component + 1));
            }
            CompositeComponent::Value { index } => {
                parts.push(format_g(field.source_values[index]));
            }
        }
        output += 1;
    }
    Ok(parts.join(" "))
}

pub(crate) fn command_string(
    graph: &FieldGraph,
    field: &Field,
    components: &[CompositeComponent],
) -> Result<String, FieldError> {
    let sources = source_string(graph, field, components)?;
    if field.source_fields.is_empty() {
        Ok(format!("constant {sources}"))
    } else {
        Ok(format!("composite {sources}"))
    }
}

impl FieldGraph {
    /// Parameters of a composite field, suitable for re-establishing it.
    pub fn get_type_composite(&self, id: FieldId) -> Result<CompositeParameters, FieldError> {
        let field = self.field(id)?;
        match &field.kind {
            FieldKind::Composite { components } => Ok(CompositeParameters {
                source_fields: field.source_fields.clone(),
                source_values: field.source_values.clone(),
                components: components.clone(),
            }),
            _ => Err(FieldError::argument(format!(
                "`{}` is not a composite field",
                field.name()
            ))),
        }
    }

    /// Whether `id` is a composite built only from constants.
    #[must_use]
    pub fn is_constant(&self, id: FieldId) -> bool {
        self.field(id).is_ok_and(|field| {
            matches!(field.kind, FieldKind::Composite { .. }) && field.source_fields.is_empty()
        })
    }

    /// Whether `id` is a one-component constant equal to `value`.
    #[must_use]
    pub fn is_constant_scalar(&self, id: FieldId, value: f64) -> bool {
        self.is_constant(id)
            && self.field(id).is_ok_and(|field| {
                field.number_of_components == 1 && field.source_values.first() == Some(&value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_sources_numbers_in_first_use_order() {
        let a = FieldId(7);
        let b = FieldId(3);
        let parameters = CompositeParameters::from_sources(&[
            CompositeSource::Field { field: a, component: 1 },
            CompositeSource::Value(2.0),
            CompositeSource::Field { field: b, component: 0 },
            CompositeSource::Field { field: a, component: 0 },
            CompositeSource::Value(-1.0),
        ]);
        assert_eq!(parameters.source_fields, vec![a, b]);
        assert_eq!(parameters.source_values, vec![2.0, -1.0]);
        assert_eq!(
            parameters.components,
            vec![
                CompositeComponent::Field { source: 0, component: 1 },
                CompositeComponent::Value { index: 0 },
                CompositeComponent::Field { source: 1, component: 0 },
                CompositeComponent::Field { source: 0, component: 0 },
                CompositeComponent::Value { index: 1 },
            ]
        );
    }

    #[test]
    fn constant_uses_values_in_order() {
        let parameters = CompositeParameters::constant(&[1.0, 2.0]);
        assert!(parameters.source_fields.is_empty());
        assert_eq!(parameters.number_of_components(), 2);
        assert_eq!(
            parameters.components[1],
            CompositeComponent::Value { index: 1 }
        );
    }
}

//! Evaluation dispatcher.
//!
//! `evaluate` answers from a field's cache when the cached entry matches the
//! request. Otherwise the field's evaluation strategy runs: standard fields
//! evaluate all their sources at the same location first and then run their
//! compute step over the source caches; compose and image filter fields
//! drive their own source evaluations. A successful evaluation marks the
//! cache valid for the request; a failed one leaves it invalid.

use log::debug;

use super::{FieldError, FieldGraph, FieldId, Location};
use crate::mesh::{ElementId, MAXIMUM_ELEMENT_XI_DIMENSIONS, NodeId};
use crate::types::{
    ComputeContext, EvaluationStrategy, FieldKind, compose, composite, coordinate,
    finite_element, format_g, image_processing,
};

/// Result of one evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldValues {
    pub values: Vec<f64>,
    /// `components x element_dimension`, component-major; present when
    /// derivatives were requested and the field could produce them.
    pub derivatives: Option<Vec<f64>>,
    pub element_dimension: usize,
}

impl FieldValues {
    /// `d(value_component)/d(xi_index)`, if derivatives are present.
    #[must_use]
    pub fn derivative(&self, component: usize, xi_index: usize) -> Option<f64> {
        if xi_index >= self.element_dimension {
            return None;
        }
        self.derivatives
            .as_ref()
            .and_then(|d| d.get(component * self.element_dimension + xi_index))
            .copied()
    }
}

/// Which setter a field type routes written values through.
enum Setter {
    FiniteElement(crate::mesh::FeFieldId),
    Composite,
    CoordinateTransformation,
}

impl FieldGraph {
    // ─────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────

    /// Evaluates field `id` at `location` and `time`.
    pub fn evaluate(
        &mut self,
        id: FieldId,
        location: &Location,
        time: f64,
        need_derivatives: bool,
    ) -> Result<FieldValues, FieldError> {
        self.evaluate_cache(id, location, time, need_derivatives)?;
        let cache = self.field(id)?.cache();
        Ok(FieldValues {
            values: cache.values().to_vec(),
            derivatives: if need_derivatives {
                cache.derivatives().map(<[f64]>::to_vec)
            } else {
                None
            },
            element_dimension: cache.element_dimension(),
        })
    }

    pub fn evaluate_at_node(
        &mut self,
        id: FieldId,
        node: NodeId,
        time: f64,
    ) -> Result<Vec<f64>, FieldError> {
        Ok(self.evaluate(id, &Location::node(node), time, false)?.values)
    }

    /// Evaluates at `xi` in `element`; `xi` holds one entry per element
    /// dimension.
    pub fn evaluate_in_element(
        &mut self,
        id: FieldId,
        element: ElementId,
        xi: &[f64],
        time: f64,
        need_derivatives: bool,
    ) -> Result<FieldValues, FieldError> {
        let location = self.element_location(element, xi)?;
        self.evaluate(id, &location, time, need_derivatives)
    }

    /// Values at `node` as comma separated text, or one component of them.
    pub fn evaluate_as_string_at_node(
        &mut self,
        id: FieldId,
        node: NodeId,
        time: f64,
        component: Option<usize>,
    ) -> Result<String, FieldError> {
        let values = self.evaluate_at_node(id, node, time)?;
        self.values_as_string(id, &values, component)
    }

    pub fn evaluate_as_string_in_element(
        &mut self,
        id: FieldId,
        element: ElementId,
        xi: &[f64],
        time: f64,
        component: Option<usize>,
    ) -> Result<String, FieldError> {
        let values = self.evaluate_in_element(id, element, xi, time, false)?.values;
        self.values_as_string(id, &values, component)
    }

    fn values_as_string(
        &self,
        id: FieldId,
        values: &[f64],
        component: Option<usize>,
    ) -> Result<String, FieldError> {
        match component {
            None => Ok(values
                .iter()
                .map(|value| format_g(*value))
                .collect::<Vec<_>>()
                .join(", ")),
            Some(component) => values.get(component).map(|v| format_g(*v)).ok_or_else(|| {
                FieldError::argument(format!(
                    "`{}` has no component {}",
                    self.field(id).map_or("?", |field| field.name()),
                    component + 1
                ))
            }),
        }
    }

    fn element_location(&self, element: ElementId, xi: &[f64]) -> Result<Location, FieldError> {
        let dimension = self.mesh.element_dimension(element)?;
        if xi.len() != dimension || dimension > MAXIMUM_ELEMENT_XI_DIMENSIONS {
            return Err(FieldError::argument(format!(
                "{element} needs {dimension} xi values, got {}",
                xi.len()
            )));
        }
        Ok(Location::element(element, xi))
    }

    /// Makes the cache of `id` hold the values for this request.
    pub(crate) fn evaluate_cache(
        &mut self,
        id: FieldId,
        location: &Location,
        time: f64,
        need_derivatives: bool,
    ) -> Result<(), FieldError> {
        let field = self.field_mut(id)?;
        if field.cache.lookup(location, time, need_derivatives) {
            return Ok(());
        }
        debug!("evaluating `{}` at {location}, time {time}", field.name);
        let strategy = field.kind.strategy();

        let result = match strategy {
            EvaluationStrategy::Standard => {
                self.evaluate_standard(id, location, time, need_derivatives)
            }
            EvaluationStrategy::Compose => {
                compose::evaluate(self, id, location, time, need_derivatives)
            }
            EvaluationStrategy::ImageFilter => {
                image_processing::evaluate(self, id, location, time, need_derivatives)
            }
        };

        let field = self.field_mut(id)?;
        match result {
            Ok(()) => {
                field.cache.mark_valid(*location, time, need_derivatives);
                Ok(())
            }
            Err(err) => {
                field.cache.invalidate();
                Err(err)
            }
        }
    }

    /// Writes `values` as the result of this request, without derivatives.
    /// Used by strategies that compute values outside a compute step.
    pub(crate) fn store_values(
        &mut self,
        id: FieldId,
        location: &Location,
        need_derivatives: bool,
        values: &[f64],
    ) -> Result<(), FieldError> {
        let element_dimension = self.location_dimension(location)?;
        let field = self.field_mut(id)?;
        if values.len() != field.number_of_components {
            return Err(FieldError::argument(format!(
                "`{}` produced {} values for {} components",
                field.name,
                values.len(),
                field.number_of_components
            )));
        }
        let components = field.number_of_components;
        field
            .cache
            .prepare(components, element_dimension, need_derivatives);
        field.cache.values.copy_from_slice(values);
        field.cache.derivatives_valid = false;
        Ok(())
    }

    fn location_dimension(&self, location: &Location) -> Result<usize, FieldError> {
        match *location {
            Location::Node(_) => Ok(0),
            Location::Element { element, .. } => Ok(self.mesh.element_dimension(element)?),
        }
    }

    fn evaluate_standard(
        &mut self,
        id: FieldId,
        location: &Location,
        time: f64,
        need_derivatives: bool,
    ) -> Result<(), FieldError> {
        let (sources, uses_top_level, source_need) = {
            let field = self.field(id)?;
            if location.is_node() && !field.kind.is_defined_at_nodes() {
                return Err(FieldError::not_defined(field.name(), location));
            }
            (
                field.source_fields.clone(),
                field.kind.uses_top_level_element(),
                field.kind.sources_need_derivatives(need_derivatives),
            )
        };

        let source_location = match *location {
            Location::Element { element, xi } if uses_top_level => {
                let (element, xi) = self.mesh.top_level_element_and_xi(element, &xi)?;
                Location::Element { element, xi }
            }
            _ => *location,
        };

        // A source evaluated through another source may move that one's
        // cache; repeat until every cache answers the request.
        let mut attempts = 0;
        loop {
            for source in &sources {
                self.evaluate_cache(*source, &source_location, time, source_need)?;
            }
            let settled = sources.iter().all(|source| {
                self.field(*source)
                    .is_ok_and(|field| field.cache.holds(&source_location, time, source_need))
            });
            if settled {
                break;
            }
            attempts += 1;
            if attempts > sources.len() {
                return Err(FieldError::argument(format!(
                    "sources of `{}` keep evaluating each other at other locations",
                    self.field(id)?.name
                )));
            }
        }

        let element_dimension = self.location_dimension(location)?;
        let field = self.field_mut(id)?;
        let components = field.number_of_components;
        let mut cache = std::mem::take(&mut field.cache);
        cache.prepare(components, element_dimension, need_derivatives);

        let result = self.field(id).and_then(|field| {
            let sources = field
                .source_fields
                .iter()
                .map(|source| self.field(*source))
                .collect::<Result<Vec<_>, _>>()?;
            let ctx = ComputeContext {
                field,
                sources,
                mesh: self.mesh.as_ref(),
                curves: &self.curves,
                config: &self.config,
                source_location,
                location: *location,
                time,
                need_derivatives,
            };
            field.kind.compute(&ctx, &mut cache)
        });
        self.field_mut(id)?.cache = cache;
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Definition queries
    // ─────────────────────────────────────────────────────────────────────

    /// Whether field `id` can be evaluated at `node`.
    pub fn is_defined_at_node(&self, id: FieldId, node: NodeId) -> Result<bool, FieldError> {
        let field = self.field(id)?;
        match &field.kind {
            FieldKind::FiniteElement { fe_field } => {
                Ok(self.mesh.is_fe_field_defined_at_node(*fe_field, node))
            }
            kind if !kind.is_defined_at_nodes() => Ok(false),
            FieldKind::Compose { .. } => match field.source_fields.first() {
                Some(texture) => self.is_defined_at_node(*texture, node),
                None => Ok(false),
            },
            _ => self.all_sources(field.source_fields(), |source| {
                self.is_defined_at_node(source, node)
            }),
        }
    }

    /// Whether field `id` can be evaluated in `element`.
    pub fn is_defined_in_element(
        &self,
        id: FieldId,
        element: ElementId,
    ) -> Result<bool, FieldError> {
        let field = self.field(id)?;
        let dimension = self.mesh.element_dimension(element)?;
        match &field.kind {
            FieldKind::FiniteElement { fe_field } => {
                Ok(self.mesh.is_fe_field_defined_in_element(*fe_field, element))
            }
            FieldKind::Xi => Ok(true),
            FieldKind::Derivative { xi_index } if *xi_index >= dimension => Ok(false),
            // The image and the embedding are looked up through the
            // texture coordinates only.
            FieldKind::Compose { .. } | FieldKind::SobelFilter(_) => {
                let texture = match &field.kind {
                    FieldKind::SobelFilter(data) => Some(data.parameters().texture_coordinates),
                    _ => field.source_fields.first().copied(),
                };
                match texture {
                    Some(texture) => self.is_defined_in_element(texture, element),
                    None => Ok(false),
                }
            }
            kind if kind.uses_top_level_element() => {
                let (top, _) = self
                    .mesh
                    .top_level_element_and_xi(element, &[0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS])?;
                if matches!(kind, FieldKind::Curl) && self.mesh.element_dimension(top)? != 3 {
                    return Ok(false);
                }
                self.all_sources(field.source_fields(), |source| {
                    self.is_defined_in_element(source, top)
                })
            }
            _ => self.all_sources(field.source_fields(), |source| {
                self.is_defined_in_element(source, element)
            }),
        }
    }

    fn all_sources(
        &self,
        sources: &[FieldId],
        mut defined: impl FnMut(FieldId) -> Result<bool, FieldError>,
    ) -> Result<bool, FieldError> {
        for source in sources {
            if !defined(*source)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether field `id` varies with time anywhere in its sources.
    pub fn has_multiple_times(&self, id: FieldId) -> Result<bool, FieldError> {
        let field = self.field(id)?;
        if let FieldKind::FiniteElement { fe_field } = field.kind {
            return Ok(self.mesh.has_multiple_times(fe_field));
        }
        for source in field.source_fields() {
            if self.has_multiple_times(*source)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Grid cells per xi direction in `element` for element-based storage,
    /// from the first source that has any.
    pub fn get_native_discretization_in_element(
        &self,
        id: FieldId,
        element: ElementId,
    ) -> Result<Option<[usize; 3]>, FieldError> {
        let field = self.field(id)?;
        if let FieldKind::FiniteElement { fe_field } = field.kind {
            return Ok(self.mesh.native_discretization(fe_field, element));
        }
        for source in field.source_fields() {
            if let Some(discretization) = self.get_native_discretization_in_element(*source, element)? {
                return Ok(Some(discretization));
            }
        }
        Ok(None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Assignment
    // ─────────────────────────────────────────────────────────────────────

    /// Writes `values` at `location`, through the field's sources down to
    /// the mesh. Caches of the field and its dependents are cleared.
    pub fn set_values(
        &mut self,
        id: FieldId,
        location: &Location,
        time: f64,
        values: &[f64],
    ) -> Result<(), FieldError> {
        let field = self.field(id)?;
        if values.len() != field.number_of_components {
            return Err(FieldError::argument(format!(
                "`{}` has {} components, got {} values",
                field.name,
                field.number_of_components,
                values.len()
            )));
        }
        let setter = match &field.kind {
            FieldKind::FiniteElement { fe_field } => Setter::FiniteElement(*fe_field),
            FieldKind::Composite { .. } => Setter::Composite,
            FieldKind::CoordinateTransformation => Setter::CoordinateTransformation,
            _ => return Err(FieldError::unsupported(field.name(), "assigning values")),
        };
        match setter {
            Setter::FiniteElement(fe_field) => {
                finite_element::set_values(self, fe_field, location, time, values)?;
            }
            Setter::Composite => composite::set_values(self, id, location, time, values)?,
            Setter::CoordinateTransformation => {
                coordinate::set_values(self, id, location, time, values)?;
            }
        }
        self.invalidate(id)
    }

    pub fn set_values_at_node(
        &mut self,
        id: FieldId,
        node: NodeId,
        time: f64,
        values: &[f64],
    ) -> Result<(), FieldError> {
        self.set_values(id, &Location::node(node), time, values)
    }

    pub fn set_values_in_element(
        &mut self,
        id: FieldId,
        element: ElementId,
        xi: &[f64],
        time: f64,
        values: &[f64],
    ) -> Result<(), FieldError> {
        let location = self.element_location(element, xi)?;
        self.set_values(id, &location, time, values)
    }
}

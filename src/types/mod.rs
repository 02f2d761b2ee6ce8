//! Field types: the closed set of evaluation behaviours a field can have.
//!
//! Every field carries one [`FieldKind`] holding its type-specific
//! parameters. Establishing a type goes through a [`FieldDefinition`], which
//! validates its sources against the graph and produces a complete
//! replacement for the field's kind, sources and component count. A failed
//! validation leaves the field untouched.

pub mod composite;
pub mod compose;
pub mod coordinate;
pub mod curve_lookup;
pub mod derivatives;
pub mod finite_element;
pub mod image_processing;
pub mod logical;

use crate::config::EvaluationConfig;
use crate::curve::{CurveId, CurveSet};
use crate::field::{Field, FieldCache, FieldError, FieldGraph, FieldId, Location};
use crate::geom::CoordinateSystem;
use crate::mesh::{FeFieldId, Mesh};

pub use composite::{CompositeComponent, CompositeParameters, CompositeSource};
pub use image_processing::{SobelFilterData, SobelFilterParameters};
pub use logical::LogicalOperator;

/// Type-specific parameters of an established field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Interpolated mesh field.
    FiniteElement { fe_field: FeFieldId },
    /// Element local coordinates.
    Xi,
    /// Components picked from source fields and constants.
    Composite { components: Vec<CompositeComponent> },
    /// Value field looked up through an embedding.
    Compose { search_region: String },
    CoordinateTransformation,
    VectorCoordinateTransformation,
    Derivative { xi_index: usize },
    Curl,
    Divergence,
    Gradient,
    Logical(LogicalOperator),
    CurveLookup { curve: CurveId },
    SobelFilter(Box<SobelFilterData>),
}

/// How the dispatcher drives a field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvaluationStrategy {
    /// Sources first, then a compute step over their caches.
    Standard,
    /// Evaluates its sources at locations it finds itself.
    Compose,
    /// Rasterises its sources into an image before looking up pixels.
    ImageFilter,
}

impl FieldKind {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FiniteElement { .. } => "finite_element",
            Self::Xi => "xi_coordinates",
            Self::Composite { .. } => "composite",
            Self::Compose { .. } => "compose",
            Self::CoordinateTransformation => "coordinate_transformation",
            Self::VectorCoordinateTransformation => "vector_coordinate_transformation",
            Self::Derivative { .. } => "derivative",
            Self::Curl => "curl",
            Self::Divergence => "divergence",
            Self::Gradient => "gradient",
            Self::Logical(operator) => operator.as_str(),
            Self::CurveLookup { .. } => "curve_lookup",
            Self::SobelFilter(_) => "sobel_filter",
        }
    }

    pub(crate) const fn strategy(&self) -> EvaluationStrategy {
        match self {
            Self::Compose { .. } => EvaluationStrategy::Compose,
            Self::SobelFilter(_) => EvaluationStrategy::ImageFilter,
            _ => EvaluationStrategy::Standard,
        }
    }

    /// Whether the type can produce values at nodes at all.
    #[must_use]
    pub const fn is_defined_at_nodes(&self) -> bool {
        !matches!(
            self,
            Self::Xi
                | Self::Derivative { .. }
                | Self::Curl
                | Self::Divergence
                | Self::Gradient
                | Self::SobelFilter(_)
        )
    }

    /// Sources are evaluated on the top-level parent of the element.
    pub(crate) const fn uses_top_level_element(&self) -> bool {
        matches!(self, Self::Curl | Self::Divergence | Self::Gradient)
    }

    pub(crate) const fn sources_need_derivatives(&self, need_derivatives: bool) -> bool {
        match self {
            Self::Derivative { .. } | Self::Curl | Self::Divergence | Self::Gradient => true,
            Self::VectorCoordinateTransformation | Self::Logical(_) => false,
            _ => need_derivatives,
        }
    }

    /// Drops data derived from the sources beyond the value cache.
    pub(crate) fn invalidate_derived_data(&mut self) {
        if let Self::SobelFilter(data) = self {
            data.invalidate();
        }
    }

    /// Compute step of the standard strategy: reads the source caches in
    /// `ctx` and writes `cache`, which has been prepared for this request.
    pub(crate) fn compute(
        &self,
        ctx: &ComputeContext<'_>,
        cache: &mut FieldCache,
    ) -> Result<(), FieldError> {
        match self {
            Self::FiniteElement { fe_field } => finite_element::compute(ctx, *fe_field, cache),
            Self::Xi => finite_element::compute_xi(ctx, cache),
            Self::Composite { components } => composite::compute(ctx, components, cache),
            Self::CoordinateTransformation => coordinate::compute_transformation(ctx, cache),
            Self::VectorCoordinateTransformation => {
                coordinate::compute_vector_transformation(ctx, cache)
            }
            Self::Derivative { xi_index } => derivatives::compute_derivative(ctx, *xi_index, cache),
            Self::Curl => derivatives::compute_curl(ctx, cache),
            Self::Divergence => derivatives::compute_divergence(ctx, cache),
            Self::Gradient => derivatives::compute_gradient(ctx, cache),
            Self::Logical(operator) => logical::compute(ctx, *operator, cache),
            Self::CurveLookup { curve } => curve_lookup::compute(ctx, *curve, cache),
            Self::Compose { .. } | Self::SobelFilter(_) => Err(FieldError::unsupported(
                ctx.field.name(),
                "evaluation without its own strategy",
            )),
        }
    }

    /// Structural equality of the type-specific parameters.
    #[must_use]
    pub fn contents_match(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::FiniteElement { fe_field: a }, Self::FiniteElement { fe_field: b }) => a == b,
            (Self::Composite { components: a }, Self::Composite { components: b }) => a == b,
            (Self::Compose { search_region: a }, Self::Compose { search_region: b }) => a == b,
            (Self::Derivative { xi_index: a }, Self::Derivative { xi_index: b }) => a == b,
            (Self::Logical(a), Self::Logical(b)) => a == b,
            (Self::CurveLookup { curve: a }, Self::CurveLookup { curve: b }) => a == b,
            (Self::SobelFilter(a), Self::SobelFilter(b)) => a.parameters() == b.parameters(),
            (Self::Xi, Self::Xi)
            | (Self::CoordinateTransformation, Self::CoordinateTransformation)
            | (Self::VectorCoordinateTransformation, Self::VectorCoordinateTransformation)
            | (Self::Curl, Self::Curl)
            | (Self::Divergence, Self::Divergence)
            | (Self::Gradient, Self::Gradient) => true,
            _ => false,
        }
    }
}

/// Read-only view handed to a compute step.
pub(crate) struct ComputeContext<'a> {
    pub field: &'a Field,
    /// Source fields, in order, with their caches filled for this request.
    pub sources: Vec<&'a Field>,
    pub mesh: &'a dyn Mesh,
    pub curves: &'a CurveSet,
    pub config: &'a EvaluationConfig,
    /// Where the sources were evaluated (top-level for curl and friends).
    pub source_location: Location,
    /// Where this field is being evaluated.
    pub location: Location,
    pub time: f64,
    pub need_derivatives: bool,
}

impl ComputeContext<'_> {
    pub fn source(&self, index: usize) -> Result<&Field, FieldError> {
        self.sources.get(index).copied().ok_or_else(|| {
            FieldError::argument(format!(
                "field `{}` is missing source {index}",
                self.field.name()
            ))
        })
    }

    pub fn not_defined(&self) -> FieldError {
        FieldError::not_defined(self.field.name(), self.location)
    }
}

/// Everything a successful [`FieldDefinition`] validation installs.
#[derive(Debug, Clone)]
pub(crate) struct Established {
    pub kind: FieldKind,
    pub source_fields: Vec<FieldId>,
    pub source_values: Vec<f64>,
    pub number_of_components: usize,
    /// Replaces the field's coordinate system when set.
    pub coordinate_system: Option<CoordinateSystem>,
}

impl Established {
    pub fn new(kind: FieldKind, source_fields: Vec<FieldId>, number_of_components: usize) -> Self {
        Self {
            kind,
            source_fields,
            source_values: Vec::new(),
            number_of_components,
            coordinate_system: None,
        }
    }
}

/// A request to give a field a type.
#[derive(Debug, Clone)]
pub enum FieldDefinition {
    FiniteElement {
        fe_field: FeFieldId,
    },
    Xi,
    Composite(CompositeParameters),
    Compose {
        texture_coordinates: FieldId,
        find_element_xi: FieldId,
        calculate_values: FieldId,
        search_region: String,
    },
    CoordinateTransformation {
        source: FieldId,
    },
    VectorCoordinateTransformation {
        vector: FieldId,
        coordinate: FieldId,
    },
    /// `xi_index` is zero-based.
    Derivative {
        source: FieldId,
        xi_index: usize,
    },
    Curl {
        vector: FieldId,
        coordinate: FieldId,
    },
    Divergence {
        vector: FieldId,
        coordinate: FieldId,
    },
    Gradient {
        source: FieldId,
        coordinate: FieldId,
    },
    Logical {
        operator: LogicalOperator,
        first: FieldId,
        second: FieldId,
    },
    CurveLookup {
        source: FieldId,
        curve: CurveId,
    },
    SobelFilter(SobelFilterParameters),
}

impl FieldDefinition {
    /// Composite with only constant components.
    #[must_use]
    pub fn constant(values: &[f64]) -> Self {
        Self::Composite(CompositeParameters::constant(values))
    }

    /// Composite selecting one component of `field`.
    #[must_use]
    pub fn component(field: FieldId, component: usize) -> Self {
        Self::Composite(CompositeParameters::component(field, component))
    }

    pub(crate) fn establish(self, graph: &FieldGraph) -> Result<Established, FieldError> {
        match self {
            Self::FiniteElement { fe_field } => finite_element::establish(graph, fe_field),
            Self::Xi => Ok(Established::new(FieldKind::Xi, Vec::new(), 3)),
            Self::Composite(parameters) => composite::establish(graph, parameters),
            Self::Compose {
                texture_coordinates,
                find_element_xi,
                calculate_values,
                search_region,
            } => compose::establish(
                graph,
                texture_coordinates,
                find_element_xi,
                calculate_values,
                search_region,
            ),
            Self::CoordinateTransformation { source } => {
                coordinate::establish_transformation(graph, source)
            }
            Self::VectorCoordinateTransformation { vector, coordinate } => {
                coordinate::establish_vector_transformation(graph, vector, coordinate)
            }
            Self::Derivative { source, xi_index } => {
                derivatives::establish_derivative(graph, source, xi_index)
            }
            Self::Curl { vector, coordinate } => {
                derivatives::establish_curl(graph, vector, coordinate)
            }
            Self::Divergence { vector, coordinate } => {
                derivatives::establish_divergence(graph, vector, coordinate)
            }
            Self::Gradient { source, coordinate } => {
                derivatives::establish_gradient(graph, source, coordinate)
            }
            Self::Logical {
                operator,
                first,
                second,
            } => logical::establish(graph, operator, first, second),
            Self::CurveLookup { source, curve } => curve_lookup::establish(graph, source, curve),
            Self::SobelFilter(parameters) => image_processing::establish(graph, parameters),
        }
    }
}

/// Reproduction command for `field`, naming sources by their current names.
pub(crate) fn command_string(graph: &FieldGraph, field: &Field) -> Result<String, FieldError> {
    let name = |index: usize| -> Result<String, FieldError> {
        let id = field
            .source_fields
            .get(index)
            .copied()
            .ok_or_else(|| FieldError::argument(format!("`{}` lacks source {index}", field.name)))?;
        Ok(graph.field(id)?.name().to_owned())
    };
    let command = match &field.kind {
        FieldKind::FiniteElement { fe_field } => format!(
            "finite_element fe_field {} number_of_components {}",
            graph.mesh().fe_field_name(*fe_field)?,
            field.number_of_components
        ),
        FieldKind::Xi => "xi_coordinates".to_owned(),
        FieldKind::Composite { components } => {
            composite::command_string(graph, field, components)?
        }
        FieldKind::Compose { search_region } => format!(
            "compose texture_coordinates_field {} find_element_xi_field {} calculate_values_field {} search_group {search_region}",
            name(0)?,
            name(1)?,
            name(2)?
        ),
        FieldKind::CoordinateTransformation => {
            format!("coordinate_transformation field {}", name(0)?)
        }
        FieldKind::VectorCoordinateTransformation => format!(
            "vector_coordinate_transformation vector {} coordinate {}",
            name(0)?,
            name(1)?
        ),
        FieldKind::Derivative { xi_index } => {
            format!("derivative field {} xi {}", name(0)?, xi_index + 1)
        }
        FieldKind::Curl => format!("curl coordinate {} vector {}", name(1)?, name(0)?),
        FieldKind::Divergence => {
            format!("divergence coordinate {} vector {}", name(1)?, name(0)?)
        }
        FieldKind::Gradient => format!("gradient coordinate {} field {}", name(1)?, name(0)?),
        FieldKind::Logical(operator) => {
            format!("{} fields {} {}", operator.as_str(), name(0)?, name(1)?)
        }
        FieldKind::CurveLookup { curve } => format!(
            "curve_lookup curve {} source {}",
            graph.curves().get(*curve)?.name(),
            name(0)?
        ),
        FieldKind::SobelFilter(data) => data.command_string(&name(0)?, &name(1)?),
    };
    if field.coordinate_system.is_rectangular_cartesian() {
        Ok(command)
    } else {
        Ok(format!("{command} coordinate_system {}", field.coordinate_system))
    }
}

/// `printf("%g")`-style formatting: six significant digits, trailing zeros
/// dropped, exponent form outside `1e-4 ..= 1e6`.
#[must_use]
pub fn format_g(value: f64) -> String {
    if value == 0.0 {
        return "0".to_owned();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    // Rounding to six significant digits can carry into the next decade.
    let formatted = format!("{value:.5e}");
    let (mantissa, power) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exponent: i32 = power.parse().unwrap_or(0);
    if (-4..6).contains(&exponent) {
        #[allow(clippy::cast_sign_loss)]
        let decimals = (5 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}"))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    }
}

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_owned()
    } else {
        text.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_g_matches_printf() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(-2.5), "-2.5");
        assert_eq!(format_g(0.1), "0.1");
        assert_eq!(format_g(1.0 / 3.0), "0.333333");
        assert_eq!(format_g(123_456.0), "123456");
        assert_eq!(format_g(1_234_567.0), "1.23457e+06");
        assert_eq!(format_g(0.000_012_5), "1.25e-05");
    }

    #[test]
    fn format_g_picks_notation_after_rounding() {
        assert_eq!(format_g(999_999.5), "1e+06");
        assert_eq!(format_g(-999_999.7), "-1e+06");
        assert_eq!(format_g(999_999.4), "999999");
        assert_eq!(format_g(0.000_099_999_99), "0.0001");
    }

    #[test]
    fn node_capable_types() {
        assert!(FieldKind::CoordinateTransformation.is_defined_at_nodes());
        assert!(!FieldKind::Curl.is_defined_at_nodes());
        assert!(!FieldKind::Derivative { xi_index: 0 }.is_defined_at_nodes());
        assert!(FieldKind::Logical(LogicalOperator::And).is_defined_at_nodes());
    }

    #[test]
    fn contents_match_compares_parameters() {
        let a = FieldKind::Derivative { xi_index: 1 };
        assert!(a.contents_match(&FieldKind::Derivative { xi_index: 1 }));
        assert!(!a.contents_match(&FieldKind::Derivative { xi_index: 0 }));
        assert!(!FieldKind::Curl.contents_match(&FieldKind::Divergence));
    }
}

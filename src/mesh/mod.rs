//! Boundary with the finite element mesh.
//!
//! The field engine never interpolates mesh data itself. Everything it needs
//! from elements and nodes goes through the [`Mesh`] trait: element
//! dimensions, the top-level parent of a face or line, the element list of a
//! search region, and interpolated finite element field values with their xi
//! derivatives. [`LagrangeMesh`] is a small in-memory provider with linear
//! Lagrange elements.

mod lagrange;

use std::fmt;

use serde::Serialize;

pub use lagrange::{COORDINATES, ElementShape, LagrangeMesh};

/// Largest element dimension supported by the engine.
pub const MAXIMUM_ELEMENT_XI_DIMENSIONS: usize = 3;

/// Element local coordinates, padded with zeros beyond the element dimension.
pub type Xi = [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS];

/// Region path meaning "every element of the mesh".
pub const ROOT_REGION: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Handle of a finite element field stored in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FeFieldId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element {}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

/// Errors reported by a mesh provider.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("unknown {0}")]
    UnknownElement(ElementId),
    #[error("unknown {0}")]
    UnknownNode(NodeId),
    #[error("unknown finite element field {0}")]
    UnknownFeField(usize),
    #[error("unknown region `{0}`")]
    UnknownRegion(String),
    #[error("finite element field `{field}` is not defined at {location}")]
    NotDefined { field: String, location: String },
    #[error("expected {expected} values, got {actual}")]
    ComponentMismatch { expected: usize, actual: usize },
    #[error("invalid element: {0}")]
    InvalidElement(String),
    #[error("operation not supported by this mesh: {0}")]
    Unsupported(&'static str),
}

/// Interpolated values of a finite element field in an element.
///
/// `derivatives` holds `components x dimension` entries, component-major:
/// `derivatives[c * dimension + j] = d(value_c)/d(xi_j)`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeEvaluation {
    pub values: Vec<f64>,
    pub derivatives: Option<Vec<f64>>,
}

/// The mesh oracle consulted by the field engine.
pub trait Mesh {
    /// Dimension of `element` (1, 2 or 3).
    fn element_dimension(&self, element: ElementId) -> Result<usize, MeshError>;

    /// Maps a location on a face or line to its maximal-dimension parent.
    /// Elements without a parent map to themselves.
    fn top_level_element_and_xi(
        &self,
        element: ElementId,
        xi: &Xi,
    ) -> Result<(ElementId, Xi), MeshError>;

    /// Whether `path` names a search region.
    fn has_region(&self, path: &str) -> bool;

    /// Elements of `path`, optionally restricted to one dimension, in
    /// ascending id order.
    fn region_elements(
        &self,
        path: &str,
        dimension: Option<usize>,
    ) -> Result<Vec<ElementId>, MeshError>;

    /// Whether `element` belongs to the region `path`.
    fn region_contains(&self, path: &str, element: ElementId) -> bool;

    fn fe_field_name(&self, field: FeFieldId) -> Result<&str, MeshError>;

    fn fe_field_components(&self, field: FeFieldId) -> Result<usize, MeshError>;

    fn is_fe_field_defined_at_node(&self, field: FeFieldId, node: NodeId) -> bool;

    fn is_fe_field_defined_in_element(&self, field: FeFieldId, element: ElementId) -> bool;

    fn evaluate_at_node(
        &self,
        field: FeFieldId,
        node: NodeId,
        time: f64,
    ) -> Result<Vec<f64>, MeshError>;

    fn evaluate_in_element(
        &self,
        field: FeFieldId,
        element: ElementId,
        xi: &Xi,
        time: f64,
        need_derivatives: bool,
    ) -> Result<FeEvaluation, MeshError>;

    fn set_values_at_node(
        &mut self,
        field: FeFieldId,
        node: NodeId,
        time: f64,
        values: &[f64],
    ) -> Result<(), MeshError>;

    /// Writes values at an element location. Only element-based
    /// (grid) storage supports this.
    fn set_values_in_element(
        &mut self,
        _field: FeFieldId,
        _element: ElementId,
        _xi: &Xi,
        _time: f64,
        _values: &[f64],
    ) -> Result<(), MeshError> {
        Err(MeshError::Unsupported("set values in element"))
    }

    /// Whether the field's parameters vary with time.
    fn has_multiple_times(&self, _field: FeFieldId) -> bool {
        false
    }

    /// Number of grid cells per xi direction for element-based storage.
    fn native_discretization(&self, _field: FeFieldId, _element: ElementId) -> Option<[usize; 3]> {
        None
    }
}

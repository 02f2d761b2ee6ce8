//! In-memory mesh with linear Lagrange line, square and cube elements.
//!
//! Local node `k` of an element of dimension `d` sits at the xi corner whose
//! `j`-th coordinate is bit `j` of `k`, so xi 1 varies fastest. Faces are
//! stored as elements of their own with a link to the parent, which is how
//! [`Mesh::top_level_element_and_xi`] climbs back to the maximal element.

use std::collections::{BTreeMap, BTreeSet};

use super::{
    ElementId, FeEvaluation, FeFieldId, MAXIMUM_ELEMENT_XI_DIMENSIONS, Mesh, MeshError, NodeId,
    ROOT_REGION, Xi,
};

/// Name of the coordinate field created by [`LagrangeMesh::regular_block`].
pub const COORDINATES: &str = "coordinates";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    Line,
    Square,
    Cube,
}

impl ElementShape {
    #[must_use]
    pub const fn dimension(self) -> usize {
        match self {
            Self::Line => 1,
            Self::Square => 2,
            Self::Cube => 3,
        }
    }

    #[must_use]
    pub const fn node_count(self) -> usize {
        1 << self.dimension()
    }

    const fn from_dimension(dimension: usize) -> Option<Self> {
        match dimension {
            1 => Some(Self::Line),
            2 => Some(Self::Square),
            3 => Some(Self::Cube),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct FeFieldRecord {
    name: String,
    components: usize,
}

#[derive(Debug, Clone, Copy)]
struct FaceOf {
    parent: ElementId,
    axis: usize,
    value: f64,
}

#[derive(Debug, Clone)]
struct ElementRecord {
    shape: ElementShape,
    nodes: Vec<NodeId>,
    face_of: Option<FaceOf>,
}

/// Mesh provider storing nodal parameters for linear Lagrange interpolation.
#[derive(Debug, Clone, Default)]
pub struct LagrangeMesh {
    fe_fields: Vec<FeFieldRecord>,
    nodes: BTreeMap<NodeId, BTreeMap<FeFieldId, Vec<f64>>>,
    elements: Vec<ElementRecord>,
    regions: BTreeMap<String, BTreeSet<ElementId>>,
}

impl LagrangeMesh {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a unit block of `dimension` with `per_axis` elements along each
    /// axis and a nodal `coordinates` field holding each node position.
    ///
    /// The coordinate field always has `dimension` components.
    pub fn regular_block(dimension: usize, per_axis: usize) -> Result<Self, MeshError> {
        let shape = ElementShape::from_dimension(dimension).ok_or_else(|| {
            MeshError::InvalidElement(format!("unsupported dimension {dimension}"))
        })?;
        if per_axis == 0 {
            return Err(MeshError::InvalidElement("block needs at least one element".to_owned()));
        }
        let mut mesh = Self::new();
        let coordinates = mesh.add_fe_field(COORDINATES, dimension);
        let nodes_per_axis = per_axis + 1;
        let node_total = nodes_per_axis.pow(u32::try_from(dimension).unwrap_or(3));
        #[allow(clippy::cast_precision_loss)]
        let spacing = 1.0 / per_axis as f64;

        for index in 0..node_total {
            let mut rest = index;
            let mut position = Vec::with_capacity(dimension);
            for _ in 0..dimension {
                #[allow(clippy::cast_precision_loss)]
                position.push((rest % nodes_per_axis) as f64 * spacing);
                rest /= nodes_per_axis;
            }
            mesh.set_node_values(NodeId(index + 1), coordinates, &position)?;
        }

        let element_total = per_axis.pow(u32::try_from(dimension).unwrap_or(3));
        for index in 0..element_total {
            let mut rest = index;
            let mut base = [0usize; MAXIMUM_ELEMENT_XI_DIMENSIONS];
            for slot in base.iter_mut().take(dimension) {
                *slot = rest % per_axis;
                rest /= per_axis;
            }
            let mut element_nodes = Vec::with_capacity(shape.node_count());
            for local in 0..shape.node_count() {
                let mut node_index = 0;
                let mut stride = 1;
                for (axis, start) in base.iter().enumerate().take(dimension) {
                    node_index += (start + ((local >> axis) & 1)) * stride;
                    stride *= nodes_per_axis;
                }
                element_nodes.push(NodeId(node_index + 1));
            }
            mesh.add_element(shape, &element_nodes)?;
        }
        Ok(mesh)
    }

    /// Registers a finite element field and returns its handle.
    pub fn add_fe_field(&mut self, name: &str, components: usize) -> FeFieldId {
        if let Some(existing) = self.fe_field_by_name(name) {
            return existing;
        }
        self.fe_fields.push(FeFieldRecord {
            name: name.to_owned(),
            components,
        });
        FeFieldId(self.fe_fields.len() - 1)
    }

    #[must_use]
    pub fn fe_field_by_name(&self, name: &str) -> Option<FeFieldId> {
        self.fe_fields
            .iter()
            .position(|record| record.name == name)
            .map(FeFieldId)
    }

    /// Creates `node` without any field values if it does not exist yet.
    pub fn add_node(&mut self, node: NodeId) {
        self.nodes.entry(node).or_default();
    }

    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Stores nodal parameters, creating the node when needed.
    pub fn set_node_values(
        &mut self,
        node: NodeId,
        field: FeFieldId,
        values: &[f64],
    ) -> Result<(), MeshError> {
        let expected = self.record(field)?.components;
        if values.len() != expected {
            return Err(MeshError::ComponentMismatch {
                expected,
                actual: values.len(),
            });
        }
        self.nodes
            .entry(node)
            .or_default()
            .insert(field, values.to_vec());
        Ok(())
    }

    /// Defines `name` at every node by mapping that node's coordinates.
    pub fn define_nodal_field<F>(
        &mut self,
        name: &str,
        components: usize,
        mut map: F,
    ) -> Result<FeFieldId, MeshError>
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let coordinates = self
            .fe_field_by_name(COORDINATES)
            .ok_or_else(|| MeshError::NotDefined {
                field: COORDINATES.to_owned(),
                location: "mesh".to_owned(),
            })?;
        let field = self.add_fe_field(name, components);
        let positions: Vec<(NodeId, Vec<f64>)> = self
            .nodes
            .iter()
            .filter_map(|(node, values)| values.get(&coordinates).map(|x| (*node, x.clone())))
            .collect();
        for (node, position) in positions {
            let values = map(&position);
            self.set_node_values(node, field, &values)?;
        }
        Ok(field)
    }

    /// Adds an element over existing nodes.
    pub fn add_element(
        &mut self,
        shape: ElementShape,
        nodes: &[NodeId],
    ) -> Result<ElementId, MeshError> {
        if nodes.len() != shape.node_count() {
            return Err(MeshError::InvalidElement(format!(
                "{shape:?} needs {} nodes, got {}",
                shape.node_count(),
                nodes.len()
            )));
        }
        if let Some(missing) = nodes.iter().find(|node| !self.nodes.contains_key(node)) {
            return Err(MeshError::UnknownNode(*missing));
        }
        self.elements.push(ElementRecord {
            shape,
            nodes: nodes.to_vec(),
            face_of: None,
        });
        Ok(ElementId(self.elements.len() - 1))
    }

    /// Adds face `face` of `parent`: face `2k` lies at `xi_k = 0`, face
    /// `2k + 1` at `xi_k = 1`. The face xi are the remaining parent xi in order.
    pub fn add_face(&mut self, parent: ElementId, face: usize) -> Result<ElementId, MeshError> {
        let record = self.element(parent)?;
        let parent_dimension = record.shape.dimension();
        let shape = ElementShape::from_dimension(parent_dimension.saturating_sub(1))
            .ok_or_else(|| MeshError::InvalidElement(format!("{parent} has no faces")))?;
        if face >= 2 * parent_dimension {
            return Err(MeshError::InvalidElement(format!(
                "face {face} out of range for {parent}"
            )));
        }
        let axis = face / 2;
        let side = face % 2;
        let nodes = record
            .nodes
            .iter()
            .enumerate()
            .filter(|(local, _)| (local >> axis) & 1 == side)
            .map(|(_, node)| *node)
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let value = side as f64;
        self.elements.push(ElementRecord {
            shape,
            nodes,
            face_of: Some(FaceOf {
                parent,
                axis,
                value,
            }),
        });
        Ok(ElementId(self.elements.len() - 1))
    }

    /// Defines or replaces a named search region.
    pub fn add_region(&mut self, path: &str, elements: &[ElementId]) -> Result<(), MeshError> {
        if path == ROOT_REGION {
            return Err(MeshError::InvalidElement("the root region is implicit".to_owned()));
        }
        if let Some(missing) = elements.iter().find(|e| e.0 >= self.elements.len()) {
            return Err(MeshError::UnknownElement(*missing));
        }
        self.regions
            .insert(path.to_owned(), elements.iter().copied().collect());
        Ok(())
    }

    fn record(&self, field: FeFieldId) -> Result<&FeFieldRecord, MeshError> {
        self.fe_fields
            .get(field.0)
            .ok_or(MeshError::UnknownFeField(field.0))
    }

    fn element(&self, element: ElementId) -> Result<&ElementRecord, MeshError> {
        self.elements
            .get(element.0)
            .ok_or(MeshError::UnknownElement(element))
    }

    fn nodal_parameters(
        &self,
        field: FeFieldId,
        element: ElementId,
    ) -> Result<Vec<&[f64]>, MeshError> {
        let record = self.element(element)?;
        record
            .nodes
            .iter()
            .map(|node| {
                self.nodes
                    .get(node)
                    .and_then(|values| values.get(&field))
                    .map(Vec::as_slice)
                    .ok_or_else(|| MeshError::NotDefined {
                        field: self
                            .record(field)
                            .map(|r| r.name.clone())
                            .unwrap_or_default(),
                        location: element.to_string(),
                    })
            })
            .collect()
    }
}

/// Linear Lagrange basis value of local node `local` and its xi derivatives.
fn basis(local: usize, dimension: usize, xi: &Xi) -> (f64, [f64; MAXIMUM_ELEMENT_XI_DIMENSIONS]) {
    let factor = |axis: usize| {
        if (local >> axis) & 1 == 1 {
            (xi[axis], 1.0)
        } else {
            (1.0 - xi[axis], -1.0)
        }
    };
    let mut value = 1.0;
    let mut derivatives = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
    for axis in 0..dimension {
        value *= factor(axis).0;
    }
    for (j, derivative) in derivatives.iter_mut().enumerate().take(dimension) {
        let mut product = factor(j).1;
        for axis in (0..dimension).filter(|axis| *axis != j) {
            product *= factor(axis).0;
        }
        *derivative = product;
    }
    (value, derivatives)
}

impl Mesh for LagrangeMesh {
    fn element_dimension(&self, element: ElementId) -> Result<usize, MeshError> {
        Ok(self.element(element)?.shape.dimension())
    }

    fn top_level_element_and_xi(
        &self,
        element: ElementId,
        xi: &Xi,
    ) -> Result<(ElementId, Xi), MeshError> {
        let mut current = element;
        let mut current_xi = *xi;
        while let Some(face) = self.element(current)?.face_of {
            let parent_dimension = self.element(face.parent)?.shape.dimension();
            let mut parent_xi = [0.0; MAXIMUM_ELEMENT_XI_DIMENSIONS];
            let mut source = 0;
            for (axis, slot) in parent_xi.iter_mut().enumerate().take(parent_dimension) {
                if axis == face.axis {
                    *slot = face.value;
                } else {
                    *slot = current_xi[source];
                    source += 1;
                }
            }
            current = face.parent;
            current_xi = parent_xi;
        }
        Ok((current, current_xi))
    }

    fn has_region(&self, path: &str) -> bool {
        path == ROOT_REGION || self.regions.contains_key(path)
    }

    fn region_elements(
        &self,
        path: &str,
        dimension: Option<usize>,
    ) -> Result<Vec<ElementId>, MeshError> {
        let matches_dimension = |id: &ElementId| {
            dimension.is_none_or(|d| {
                self.elements
                    .get(id.0)
                    .is_some_and(|record| record.shape.dimension() == d)
            })
        };
        if path == ROOT_REGION {
            return Ok((0..self.elements.len())
                .map(ElementId)
                .filter(matches_dimension)
                .collect());
        }
        let members = self
            .regions
            .get(path)
            .ok_or_else(|| MeshError::UnknownRegion(path.to_owned()))?;
        Ok(members.iter().copied().filter(matches_dimension).collect())
    }

    fn region_contains(&self, path: &str, element: ElementId) -> bool {
        if path == ROOT_REGION {
            return element.0 < self.elements.len();
        }
        self.regions
            .get(path)
            .is_some_and(|members| members.contains(&element))
    }

    fn fe_field_name(&self, field: FeFieldId) -> Result<&str, MeshError> {
        Ok(self.record(field)?.name.as_str())
    }

    fn fe_field_components(&self, field: FeFieldId) -> Result<usize, MeshError> {
        Ok(self.record(field)?.components)
    }

    fn is_fe_field_defined_at_node(&self, field: FeFieldId, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|values| values.contains_key(&field))
    }

    fn is_fe_field_defined_in_element(&self, field: FeFieldId, element: ElementId) -> bool {
        self.nodal_parameters(field, element).is_ok()
    }

    fn evaluate_at_node(
        &self,
        field: FeFieldId,
        node: NodeId,
        _time: f64,
    ) -> Result<Vec<f64>, MeshError> {
        let name = &self.record(field)?.name;
        self.nodes
            .get(&node)
            .ok_or(MeshError::UnknownNode(node))?
            .get(&field)
            .cloned()
            .ok_or_else(|| MeshError::NotDefined {
                field: name.clone(),
                location: node.to_string(),
            })
    }

    fn evaluate_in_element(
        &self,
        field: FeFieldId,
        element: ElementId,
        xi: &Xi,
        _time: f64,
        need_derivatives: bool,
    ) -> Result<FeEvaluation, MeshError> {
        let components = self.record(field)?.components;
        let dimension = self.element(element)?.shape.dimension();
        let parameters = self.nodal_parameters(field, element)?;

        let mut values = vec![0.0; components];
        let mut derivatives = vec![0.0; components * dimension];
        for (local, nodal) in parameters.iter().enumerate() {
            let (weight, dweight) = basis(local, dimension, xi);
            for c in 0..components {
                values[c] += weight * nodal[c];
                for j in 0..dimension {
                    derivatives[c * dimension + j] += dweight[j] * nodal[c];
                }
            }
        }
        Ok(FeEvaluation {
            values,
            derivatives: need_derivatives.then_some(derivatives),
        })
    }

    fn set_values_at_node(
        &mut self,
        field: FeFieldId,
        node: NodeId,
        _time: f64,
        values: &[f64],
    ) -> Result<(), MeshError> {
        if !self.nodes.contains_key(&node) {
            return Err(MeshError::UnknownNode(node));
        }
        self.set_node_values(node, field, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_bilinear_square() {
        let mut mesh = LagrangeMesh::new();
        let field = mesh.add_fe_field("u", 1);
        for (index, value) in [0.0, 1.0, 2.0, 4.0].iter().enumerate() {
            mesh.set_node_values(NodeId(index + 1), field, &[*value]).unwrap();
        }
        let element = mesh
            .add_element(
                ElementShape::Square,
                &[NodeId(1), NodeId(2), NodeId(3), NodeId(4)],
            )
            .unwrap();
        let result = mesh
            .evaluate_in_element(field, element, &[0.5, 0.5, 0.0], 0.0, true)
            .unwrap();
        assert!((result.values[0] - 1.75).abs() < 1e-12);
        let derivatives = result.derivatives.unwrap();
        // du/dxi1 at xi2 = 0.5: ((1 - 0) + (4 - 2)) / 2
        assert!((derivatives[0] - 1.5).abs() < 1e-12);
        assert!((derivatives[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn regular_block_places_nodes_on_unit_grid() {
        let mesh = LagrangeMesh::regular_block(3, 2).unwrap();
        assert_eq!(mesh.element_count(), 8);
        assert_eq!(mesh.node_ids().len(), 27);
        let coordinates = mesh.fe_field_by_name(COORDINATES).unwrap();
        let last = mesh
            .evaluate_in_element(coordinates, ElementId(7), &[1.0, 1.0, 1.0], 0.0, false)
            .unwrap();
        assert_eq!(last.values, vec![1.0, 1.0, 1.0]);
        let first = mesh
            .evaluate_in_element(coordinates, ElementId(0), &[0.5, 0.5, 0.5], 0.0, false)
            .unwrap();
        assert_eq!(first.values, vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn face_maps_to_top_level_xi() {
        let mut mesh = LagrangeMesh::regular_block(3, 1).unwrap();
        let face = mesh.add_face(ElementId(0), 3).unwrap();
        assert_eq!(mesh.element_dimension(face).unwrap(), 2);
        let (top, xi) = mesh
            .top_level_element_and_xi(face, &[0.25, 0.75, 0.0])
            .unwrap();
        assert_eq!(top, ElementId(0));
        assert_eq!(xi, [0.25, 1.0, 0.75]);

        let coordinates = mesh.fe_field_by_name(COORDINATES).unwrap();
        let on_face = mesh
            .evaluate_in_element(coordinates, face, &[0.25, 0.75, 0.0], 0.0, false)
            .unwrap();
        assert_eq!(on_face.values, vec![0.25, 1.0, 0.75]);
    }

    #[test]
    fn regions_filter_by_dimension() {
        let mut mesh = LagrangeMesh::regular_block(2, 2).unwrap();
        let line = mesh.add_face(ElementId(0), 0).unwrap();
        mesh.add_region("/left", &[ElementId(0), ElementId(2), line]).unwrap();
        assert_eq!(
            mesh.region_elements("/left", Some(2)).unwrap(),
            vec![ElementId(0), ElementId(2)]
        );
        assert_eq!(mesh.region_elements(ROOT_REGION, Some(1)).unwrap(), vec![line]);
        assert!(mesh.region_contains("/left", line));
        assert!(!mesh.region_contains("/left", ElementId(1)));
        assert!(matches!(
            mesh.region_elements("/missing", None),
            Err(MeshError::UnknownRegion(_))
        ));
    }

    #[test]
    fn undefined_field_is_reported() {
        let mut mesh = LagrangeMesh::regular_block(1, 1).unwrap();
        let other = mesh.add_fe_field("pressure", 1);
        assert!(!mesh.is_fe_field_defined_in_element(other, ElementId(0)));
        assert!(matches!(
            mesh.evaluate_at_node(other, NodeId(1), 0.0),
            Err(MeshError::NotDefined { .. })
        ));
        assert!(matches!(
            mesh.set_values_at_node(other, NodeId(9), 0.0, &[1.0]),
            Err(MeshError::UnknownNode(NodeId(9)))
        ));
    }
}

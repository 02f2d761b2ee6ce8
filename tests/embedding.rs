use std::f64::consts::FRAC_PI_2;

use field_engine::mesh::{COORDINATES, FeEvaluation, ROOT_REGION, Xi};
use field_engine::{
    CompositeParameters, CompositeSource, ControlCurve, CoordinateSystem, CoordinateSystemType,
    ElementId, FeFieldId, FieldDefinition, FieldError, FieldGraph, FieldId, LagrangeMesh, Mesh,
    MeshError, NodeId, SobelFilterParameters,
};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

struct Square {
    graph: FieldGraph,
    coordinates: FieldId,
    temperature: FieldId,
    polar: FieldId,
}

/// Unit square in 2 x 2 elements with `temperature = x + y` and a
/// cylindrical `polar = (1 + x, y, 0)` field.
fn square() -> Square {
    init_logging();
    let mut mesh = LagrangeMesh::regular_block(2, 2).expect("mesh");
    let fe_coordinates = mesh.fe_field_by_name(COORDINATES).expect("coordinates");
    let fe_temperature = mesh
        .define_nodal_field("temperature", 1, |x| vec![x[0] + x[1]])
        .expect("temperature");
    let fe_polar = mesh
        .define_nodal_field("polar", 3, |x| vec![1.0 + x[0], x[1], 0.0])
        .expect("polar");

    let mut graph = FieldGraph::new(mesh);
    let coordinates = graph
        .create_field(
            "coordinates",
            FieldDefinition::FiniteElement {
                fe_field: fe_coordinates,
            },
        )
        .expect("coordinates");
    let temperature = graph
        .create_field(
            "temperature",
            FieldDefinition::FiniteElement {
                fe_field: fe_temperature,
            },
        )
        .expect("temperature");
    let polar = graph
        .create_field("polar", FieldDefinition::FiniteElement { fe_field: fe_polar })
        .expect("polar");
    graph
        .set_coordinate_system(
            polar,
            CoordinateSystem::new(CoordinateSystemType::CylindricalPolar),
        )
        .expect("cylindrical");
    Square {
        graph,
        coordinates,
        temperature,
        polar,
    }
}

fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < tolerance, "{actual:?} vs {expected:?}");
    }
}

#[test]
fn find_element_xi_inverts_coordinates() {
    let Square {
        mut graph,
        coordinates,
        ..
    } = square();
    let found = graph
        .find_element_xi(coordinates, &[0.6, 0.8], ROOT_REGION, None, 0.0)
        .expect("search")
        .expect("inside the mesh");
    assert_eq!(found.element, ElementId(3));
    assert_close(&found.xi[..2], &[0.2, 0.6], 1e-6);

    // same target again is answered from the search cache
    let again = graph
        .find_element_xi(coordinates, &[0.6, 0.8], ROOT_REGION, None, 0.0)
        .expect("search");
    assert_eq!(again, Some(found));

    assert_eq!(
        graph
            .find_element_xi(coordinates, &[1.5, 0.2], ROOT_REGION, None, 0.0)
            .expect("search"),
        None
    );
    assert!(matches!(
        graph.find_element_xi(coordinates, &[0.5], ROOT_REGION, None, 0.0),
        Err(FieldError::Argument { .. })
    ));
    assert!(
        graph
            .find_element_xi(coordinates, &[0.5, 0.5], "/nowhere", None, 0.0)
            .is_err()
    );
}

#[test]
fn find_element_xi_on_a_surface_in_space() {
    init_logging();
    let mut mesh = LagrangeMesh::regular_block(2, 2).expect("mesh");
    let fe_surface = mesh
        .define_nodal_field("surface", 3, |x| {
            vec![0.1 + 0.7 * x[0], 0.2 + 0.9 * x[1], 0.3 * x[0] + 0.7 * x[1]]
        })
        .expect("surface");
    let mut graph = FieldGraph::new(mesh);
    let surface = graph
        .create_field("surface", FieldDefinition::FiniteElement { fe_field: fe_surface })
        .expect("surface");

    for i in 0..=10 {
        for j in 0..=10 {
            let (x, y) = (f64::from(i) / 10.0, f64::from(j) / 10.0);
            let target = [0.1 + 0.7 * x, 0.2 + 0.9 * y, 0.3 * x + 0.7 * y];
            let found = graph
                .find_element_xi(surface, &target, ROOT_REGION, None, 0.0)
                .expect("search")
                .unwrap_or_else(|| panic!("({x}, {y}) not found"));
            let values = graph
                .evaluate(surface, &found.location(), 0.0, false)
                .expect("evaluate")
                .values;
            assert_close(&values, &target, 1e-6);
        }
    }

    assert_eq!(
        graph
            .find_element_xi(surface, &[0.45, 0.65, 1.5], ROOT_REGION, None, 0.0)
            .expect("search"),
        None
    );
}

#[test]
fn compose_looks_up_values_through_the_embedding() {
    let Square {
        mut graph,
        coordinates,
        temperature,
        ..
    } = square();
    let inside = graph
        .create_field("inside", FieldDefinition::constant(&[0.6, 0.8]))
        .expect("texture");
    let outside = graph
        .create_field("outside", FieldDefinition::constant(&[1.5, 0.2]))
        .expect("texture");
    let compose = |graph: &mut FieldGraph, name: &str, texture| {
        graph
            .create_field(
                name,
                FieldDefinition::Compose {
                    texture_coordinates: texture,
                    find_element_xi: coordinates,
                    calculate_values: temperature,
                    search_region: ROOT_REGION.to_owned(),
                },
            )
            .expect("compose")
    };
    let hit = compose(&mut graph, "hit", inside);
    let miss = compose(&mut graph, "miss", outside);

    let values = graph.evaluate_at_node(hit, NodeId(1), 0.0).expect("hit");
    assert_close(&values, &[1.4], 1e-5);
    let values = graph
        .evaluate_in_element(miss, ElementId(0), &[0.5, 0.5], 0.0, true)
        .expect("miss");
    assert_eq!(values.values, vec![0.5]);
    assert_eq!(values.derivatives, None);

    assert_eq!(
        graph.command_string(hit).expect("command"),
        "compose texture_coordinates_field inside find_element_xi_field coordinates calculate_values_field temperature search_group /"
    );
    assert!(
        graph
            .create_field(
                "mismatched",
                FieldDefinition::Compose {
                    texture_coordinates: temperature,
                    find_element_xi: coordinates,
                    calculate_values: temperature,
                    search_region: ROOT_REGION.to_owned(),
                },
            )
            .is_err()
    );
}

#[test]
fn coordinate_transformation_converts_and_writes_back() {
    let Square {
        mut graph, polar, ..
    } = square();
    let cartesian = graph
        .create_field(
            "cartesian",
            FieldDefinition::CoordinateTransformation { source: polar },
        )
        .expect("transformation");

    // node 8 sits at (0.5, 1.0): r = 1.5, theta = 1
    let values = graph.evaluate_at_node(cartesian, NodeId(8), 0.0).expect("values");
    assert_close(&values, &[1.5 * 1.0_f64.cos(), 1.5 * 1.0_f64.sin(), 0.0], 1e-12);

    graph
        .set_values_at_node(cartesian, NodeId(8), 0.0, &[0.0, 2.0, 0.0])
        .expect("write back");
    let stored = graph.evaluate_at_node(polar, NodeId(8), 0.0).expect("polar");
    assert_close(&stored, &[2.0, FRAC_PI_2, 0.0], 1e-12);
    let values = graph.evaluate_at_node(cartesian, NodeId(8), 0.0).expect("values");
    assert_close(&values, &[0.0, 2.0, 0.0], 1e-12);
}

#[test]
fn coordinate_transformation_chains_derivatives() {
    let Square {
        mut graph, polar, ..
    } = square();
    let cartesian = graph
        .create_field(
            "cartesian",
            FieldDefinition::CoordinateTransformation { source: polar },
        )
        .expect("transformation");
    // element 0 at xi (0.5, 0.5): x = y = 0.25, r = 1.25, theta = 0.25
    let result = graph
        .evaluate_in_element(cartesian, ElementId(0), &[0.5, 0.5], 0.0, true)
        .expect("evaluate");
    let (r, theta) = (1.25_f64, 0.25_f64);
    assert_close(&result.values, &[r * theta.cos(), r * theta.sin(), 0.0], 1e-12);
    // dr/dxi1 = dtheta/dxi2 = 0.5
    let derivatives = result.derivatives.expect("derivatives");
    assert_close(
        &derivatives,
        &[
            0.5 * theta.cos(),
            -0.5 * r * theta.sin(),
            0.5 * theta.sin(),
            0.5 * r * theta.cos(),
            0.0,
            0.0,
        ],
        1e-10,
    );
}

#[test]
fn find_element_xi_through_a_transformation_searches_the_source() {
    let Square {
        mut graph, polar, ..
    } = square();
    let cartesian = graph
        .create_field(
            "cartesian",
            FieldDefinition::CoordinateTransformation { source: polar },
        )
        .expect("transformation");
    let (r, theta) = (1.25_f64, 0.25_f64);
    let found = graph
        .find_element_xi(
            cartesian,
            &[r * theta.cos(), r * theta.sin(), 0.0],
            ROOT_REGION,
            None,
            0.0,
        )
        .expect("search")
        .expect("found");
    assert_eq!(found.element, ElementId(0));
    assert_close(&found.xi[..2], &[0.5, 0.5], 1e-6);
}

#[test]
fn find_element_xi_refuses_multi_source_composites() {
    let Square {
        mut graph,
        coordinates,
        temperature,
        ..
    } = square();
    let mixed = graph
        .create_field(
            "mixed",
            FieldDefinition::Composite(CompositeParameters::from_sources(&[
                CompositeSource::Field {
                    field: coordinates,
                    component: 0,
                },
                CompositeSource::Field {
                    field: temperature,
                    component: 0,
                },
            ])),
        )
        .expect("composite");
    assert!(matches!(
        graph.find_element_xi(mixed, &[0.2, 0.5], ROOT_REGION, None, 0.0),
        Err(FieldError::Unsupported { .. })
    ));

    let swapped = graph
        .create_field(
            "swapped",
            FieldDefinition::Composite(CompositeParameters::from_sources(&[
                CompositeSource::Field {
                    field: coordinates,
                    component: 1,
                },
                CompositeSource::Field {
                    field: coordinates,
                    component: 0,
                },
            ])),
        )
        .expect("swapped");
    let found = graph
        .find_element_xi(swapped, &[0.8, 0.6], ROOT_REGION, None, 0.0)
        .expect("search")
        .expect("found");
    assert_eq!(found.element, ElementId(3));
}

#[test]
fn curve_changes_reach_lookup_fields() {
    let Square {
        mut graph,
        coordinates,
        ..
    } = square();
    let mut ramp = ControlCurve::new("ramp", 1);
    ramp.add_point(0.0, &[0.0]).expect("point");
    ramp.add_point(1.0, &[10.0]).expect("point");
    let curve = graph.add_curve(ramp).expect("curve");
    let x = graph
        .create_field("x", FieldDefinition::component(coordinates, 0))
        .expect("x");
    let lookup = graph
        .create_field("lookup", FieldDefinition::CurveLookup { source: x, curve })
        .expect("lookup");

    let result = graph
        .evaluate_in_element(lookup, ElementId(0), &[0.5, 0.5], 0.0, true)
        .expect("evaluate");
    assert_close(&result.values, &[2.5], 1e-12);
    assert_close(result.derivatives.as_deref().expect("derivatives"), &[5.0, 0.0], 1e-12);

    graph
        .modify_curve(curve, |ramp| ramp.set_point_values(1, &[20.0]))
        .expect("modify");
    let result = graph
        .evaluate_in_element(lookup, ElementId(0), &[0.5, 0.5], 0.0, true)
        .expect("evaluate");
    assert_close(&result.values, &[5.0], 1e-12);
    assert_close(result.derivatives.as_deref().expect("derivatives"), &[10.0, 0.0], 1e-12);
    assert_eq!(
        graph.command_string(lookup).expect("command"),
        "curve_lookup curve ramp source x"
    );
}

fn sobel_parameters(source: FieldId, texture: FieldId) -> SobelFilterParameters {
    SobelFilterParameters {
        source,
        texture_coordinates: texture,
        sizes: vec![3, 3],
        minimums: vec![0.0, 0.0],
        maximums: vec![0.5, 0.5],
        element_dimension: None,
        search_region: ROOT_REGION.to_owned(),
    }
}

#[test]
fn sobel_image_is_rebuilt_only_after_source_changes() {
    let Square {
        mut graph,
        coordinates,
        temperature,
        ..
    } = square();
    let edges = graph
        .create_field(
            "edges",
            FieldDefinition::SobelFilter(sobel_parameters(temperature, coordinates)),
        )
        .expect("sobel");
    assert_eq!(graph.image_statistics(edges).expect("statistics"), None);

    let first = graph
        .evaluate_in_element(edges, ElementId(0), &[0.5, 0.5], 0.0, false)
        .expect("evaluate");
    assert_eq!(first.values.len(), 1);
    let statistics = graph
        .image_statistics(edges)
        .expect("statistics")
        .expect("image built");
    assert_eq!(statistics.rebuild_count, 1);
    assert_eq!(statistics.pixels_not_found, 0);
    assert_eq!(statistics.pixels_not_evaluated, 0);
    assert!(graph.is_image_valid(edges).expect("valid"));

    graph
        .evaluate_in_element(edges, ElementId(0), &[0.1, 0.9], 0.0, false)
        .expect("evaluate elsewhere");
    let statistics = graph.image_statistics(edges).expect("statistics").expect("image");
    assert_eq!(statistics.rebuild_count, 1);

    graph
        .set_values_at_node(temperature, NodeId(1), 0.0, &[3.0])
        .expect("edit source");
    assert!(!graph.is_image_valid(edges).expect("stale"));
    graph
        .evaluate_in_element(edges, ElementId(0), &[0.5, 0.5], 0.0, false)
        .expect("evaluate again");
    let statistics = graph.image_statistics(edges).expect("statistics").expect("image");
    assert_eq!(statistics.rebuild_count, 2);
}

/// Lagrange mesh whose `growing` field is scaled by `1 + time`.
struct GrowingMesh {
    inner: LagrangeMesh,
    growing: FeFieldId,
}

impl GrowingMesh {
    fn scale(&self, field: FeFieldId, time: f64) -> f64 {
        if field == self.growing { 1.0 + time } else { 1.0 }
    }
}

impl Mesh for GrowingMesh {
    fn element_dimension(&self, element: ElementId) -> Result<usize, MeshError> {
        self.inner.element_dimension(element)
    }

    fn top_level_element_and_xi(
        &self,
        element: ElementId,
        xi: &Xi,
    ) -> Result<(ElementId, Xi), MeshError> {
        self.inner.top_level_element_and_xi(element, xi)
    }

    fn has_region(&self, path: &str) -> bool {
        self.inner.has_region(path)
    }

    fn region_elements(
        &self,
        path: &str,
        dimension: Option<usize>,
    ) -> Result<Vec<ElementId>, MeshError> {
        self.inner.region_elements(path, dimension)
    }

    fn region_contains(&self, path: &str, element: ElementId) -> bool {
        self.inner.region_contains(path, element)
    }

    fn fe_field_name(&self, field: FeFieldId) -> Result<&str, MeshError> {
        self.inner.fe_field_name(field)
    }

    fn fe_field_components(&self, field: FeFieldId) -> Result<usize, MeshError> {
        self.inner.fe_field_components(field)
    }

    fn is_fe_field_defined_at_node(&self, field: FeFieldId, node: NodeId) -> bool {
        self.inner.is_fe_field_defined_at_node(field, node)
    }

    fn is_fe_field_defined_in_element(&self, field: FeFieldId, element: ElementId) -> bool {
        self.inner.is_fe_field_defined_in_element(field, element)
    }

    fn evaluate_at_node(
        &self,
        field: FeFieldId,
        node: NodeId,
        time: f64,
    ) -> Result<Vec<f64>, MeshError> {
        let scale = self.scale(field, time);
        let values = self.inner.evaluate_at_node(field, node, time)?;
        Ok(values.into_iter().map(|v| v * scale).collect())
    }

    fn evaluate_in_element(
        &self,
        field: FeFieldId,
        element: ElementId,
        xi: &Xi,
        time: f64,
        need_derivatives: bool,
    ) -> Result<FeEvaluation, MeshError> {
        let scale = self.scale(field, time);
        let mut evaluation =
            self.inner
                .evaluate_in_element(field, element, xi, time, need_derivatives)?;
        evaluation.values.iter_mut().for_each(|v| *v *= scale);
        if let Some(derivatives) = &mut evaluation.derivatives {
            derivatives.iter_mut().for_each(|d| *d *= scale);
        }
        Ok(evaluation)
    }

    fn set_values_at_node(
        &mut self,
        field: FeFieldId,
        node: NodeId,
        time: f64,
        values: &[f64],
    ) -> Result<(), MeshError> {
        self.inner.set_values_at_node(field, node, time, values)
    }

    fn has_multiple_times(&self, field: FeFieldId) -> bool {
        field == self.growing
    }
}

#[test]
fn sobel_image_follows_the_evaluation_time() {
    init_logging();
    let mut inner = LagrangeMesh::regular_block(2, 2).expect("mesh");
    let fe_coordinates = inner.fe_field_by_name(COORDINATES).expect("coordinates");
    let growing = inner
        .define_nodal_field("temperature", 1, |x| vec![x[0] + x[1]])
        .expect("temperature");
    let mut graph = FieldGraph::new(GrowingMesh { inner, growing });
    let coordinates = graph
        .create_field(
            "coordinates",
            FieldDefinition::FiniteElement {
                fe_field: fe_coordinates,
            },
        )
        .expect("coordinates");
    let temperature = graph
        .create_field("temperature", FieldDefinition::FiniteElement { fe_field: growing })
        .expect("temperature");
    let edges = graph
        .create_field(
            "edges",
            FieldDefinition::SobelFilter(sobel_parameters(temperature, coordinates)),
        )
        .expect("sobel");
    assert!(graph.has_multiple_times(edges).expect("times"));

    let at_start = graph
        .evaluate_in_element(edges, ElementId(0), &[0.5, 0.5], 0.0, false)
        .expect("evaluate at 0")
        .values[0];
    assert!(at_start > 0.0);
    let later = graph
        .evaluate_in_element(edges, ElementId(0), &[0.5, 0.5], 1.0, false)
        .expect("evaluate at 1")
        .values[0];
    assert!((later - 2.0 * at_start).abs() < 1e-9, "{at_start} then {later}");
    let statistics = graph.image_statistics(edges).expect("statistics").expect("image");
    assert_eq!(statistics.rebuild_count, 2);

    graph
        .evaluate_in_element(edges, ElementId(0), &[0.2, 0.2], 1.0, false)
        .expect("same time elsewhere");
    let statistics = graph.image_statistics(edges).expect("statistics").expect("image");
    assert_eq!(statistics.rebuild_count, 2);
}

#[test]
fn sobel_outside_the_image_gives_the_sentinel() {
    let Square {
        mut graph,
        coordinates,
        temperature,
        ..
    } = square();
    let edges = graph
        .create_field(
            "edges",
            FieldDefinition::SobelFilter(sobel_parameters(temperature, coordinates)),
        )
        .expect("sobel");
    let values = graph
        .evaluate_in_element(edges, ElementId(3), &[0.5, 0.5], 0.0, false)
        .expect("evaluate");
    assert_eq!(values.values, vec![0.5]);
    assert!(
        graph
            .evaluate_at_node(edges, NodeId(1), 0.0)
            .expect_err("element only")
            .is_not_defined()
    );
}

#[test]
fn sobel_of_a_constant_has_no_edges() {
    let Square {
        mut graph,
        coordinates,
        ..
    } = square();
    let level = graph
        .create_field("level", FieldDefinition::constant(&[4.0]))
        .expect("level");
    let edges = graph
        .create_field(
            "edges",
            FieldDefinition::SobelFilter(sobel_parameters(level, coordinates)),
        )
        .expect("sobel");
    let values = graph
        .evaluate_in_element(edges, ElementId(0), &[0.3, 0.3], 0.0, false)
        .expect("evaluate");
    assert_eq!(values.values, vec![0.0]);
}

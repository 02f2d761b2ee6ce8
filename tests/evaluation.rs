use field_engine::mesh::COORDINATES;
use field_engine::{
    CompositeParameters, CompositeSource, ElementId, FieldDefinition, FieldError, FieldGraph,
    FieldId, LagrangeMesh, LogicalOperator, NodeId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Unit square split into 2 x 2 elements with a `coordinates` field.
fn square() -> (FieldGraph, FieldId) {
    init_logging();
    let mesh = LagrangeMesh::regular_block(2, 2).expect("mesh");
    let fe_field = mesh.fe_field_by_name(COORDINATES).expect("coordinates");
    let mut graph = FieldGraph::new(mesh);
    let coordinates = graph
        .create_field("coordinates", FieldDefinition::FiniteElement { fe_field })
        .expect("coordinate field");
    (graph, coordinates)
}

fn close(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-12)
}

#[test]
fn repeated_evaluation_is_answered_from_the_cache() {
    let (mut graph, coordinates) = square();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..25 {
        let element = rng.random_range(0..4);
        let xi = [rng.random_range(0.0..1.0), rng.random_range(0.0..1.0)];
        let before = graph.field(coordinates).expect("field").cache().stats();

        let first = graph
            .evaluate_in_element(coordinates, ElementId(element), &xi, 0.0, true)
            .expect("first");
        let second = graph
            .evaluate_in_element(coordinates, ElementId(element), &xi, 0.0, true)
            .expect("second");
        assert_eq!(first, second);

        #[allow(clippy::cast_precision_loss)]
        let expected = [
            0.5 * (element % 2) as f64 + 0.5 * xi[0],
            0.5 * (element / 2) as f64 + 0.5 * xi[1],
        ];
        assert!(close(&first.values, &expected), "{first:?}");

        let after = graph.field(coordinates).expect("field").cache().stats();
        assert_eq!(after.hits, before.hits + 1);
        assert_eq!(after.misses, before.misses + 1);
    }
}

#[test]
fn shared_source_is_evaluated_once_per_request() {
    let (mut graph, coordinates) = square();
    let x = graph
        .create_field("x", FieldDefinition::component(coordinates, 0))
        .expect("x");
    let y = graph
        .create_field("y", FieldDefinition::component(coordinates, 1))
        .expect("y");
    let swapped = graph
        .create_field(
            "swapped",
            FieldDefinition::Composite(CompositeParameters::from_sources(&[
                CompositeSource::Field {
                    field: y,
                    component: 0,
                },
                CompositeSource::Field {
                    field: x,
                    component: 0,
                },
            ])),
        )
        .expect("swapped");

    let result = graph
        .evaluate_in_element(swapped, ElementId(1), &[0.4, 0.2], 0.0, false)
        .expect("evaluate");
    assert!(close(&result.values, &[0.1, 0.7]), "{result:?}");

    let stats = graph.field(coordinates).expect("field").cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn value_cache_does_not_answer_derivative_requests() {
    let (mut graph, coordinates) = square();
    let plain = graph
        .evaluate_in_element(coordinates, ElementId(0), &[0.5, 0.5], 0.0, false)
        .expect("values");
    assert_eq!(plain.derivatives, None);

    let with_derivatives = graph
        .evaluate_in_element(coordinates, ElementId(0), &[0.5, 0.5], 0.0, true)
        .expect("derivatives");
    assert_eq!(with_derivatives.derivatives, Some(vec![0.5, 0.0, 0.0, 0.5]));
    assert_eq!(with_derivatives.derivative(1, 1), Some(0.5));
}

#[test]
fn composite_picks_components_and_constants() {
    let (mut graph, coordinates) = square();
    let composite = graph
        .create_field(
            "mixed",
            FieldDefinition::Composite(CompositeParameters::from_sources(&[
                CompositeSource::Field {
                    field: coordinates,
                    component: 1,
                },
                CompositeSource::Value(5.0),
                CompositeSource::Field {
                    field: coordinates,
                    component: 0,
                },
            ])),
        )
        .expect("composite");

    let result = graph
        .evaluate_in_element(composite, ElementId(3), &[0.2, 0.6], 0.0, true)
        .expect("evaluate");
    assert!(close(&result.values, &[0.8, 5.0, 0.6]));
    assert!(close(
        result.derivatives.as_deref().expect("derivatives"),
        &[0.0, 0.5, 0.0, 0.0, 0.5, 0.0]
    ));
    assert_eq!(
        graph.command_string(composite).expect("command"),
        "composite coordinates.2 5 coordinates.1"
    );
}

#[test]
fn composite_parameters_round_trip_and_match() {
    let (mut graph, coordinates) = square();
    let parameters = CompositeParameters::from_sources(&[
        CompositeSource::Value(1.5),
        CompositeSource::Field {
            field: coordinates,
            component: 0,
        },
    ]);
    let a = graph
        .create_field("a", FieldDefinition::Composite(parameters.clone()))
        .expect("a");
    assert_eq!(graph.get_type_composite(a).expect("parameters"), parameters);

    let b = graph
        .create_field("b", FieldDefinition::Composite(parameters))
        .expect("b");
    assert!(graph.contents_match(a, b).expect("match"));

    let c = graph
        .create_field("c", FieldDefinition::constant(&[1.5, 0.0]))
        .expect("c");
    assert!(!graph.contents_match(a, c).expect("match"));
    assert!(matches!(
        graph.get_type_composite(coordinates),
        Err(FieldError::Argument { .. })
    ));
}

#[test]
fn constant_scalars_are_recognised() {
    let (mut graph, coordinates) = square();
    let two = graph
        .create_field("two", FieldDefinition::constant(&[2.0]))
        .expect("two");
    let pair = graph
        .create_field("pair", FieldDefinition::constant(&[2.0, 2.0]))
        .expect("pair");
    let x = graph
        .create_field("x", FieldDefinition::component(coordinates, 0))
        .expect("x");

    assert!(graph.is_constant_scalar(two, 2.0));
    assert!(!graph.is_constant_scalar(two, 3.0));
    assert!(graph.is_constant(pair));
    assert!(!graph.is_constant_scalar(pair, 2.0));
    assert!(!graph.is_constant(x));
    assert_eq!(graph.command_string(two).expect("command"), "constant 2");
}

#[test]
fn composite_rejects_repeated_sources_and_leaves_field_unchanged() {
    let (mut graph, coordinates) = square();
    let x = graph
        .create_field("x", FieldDefinition::component(coordinates, 0))
        .expect("x");
    let repeated = CompositeParameters {
        source_fields: vec![coordinates, coordinates],
        source_values: Vec::new(),
        components: CompositeParameters::from_sources(&[CompositeSource::Field {
            field: coordinates,
            component: 0,
        }])
        .components,
    };
    assert!(matches!(
        graph.set_type(x, FieldDefinition::Composite(repeated)),
        Err(FieldError::Argument { .. })
    ));
    assert!(matches!(
        graph.set_type(x, FieldDefinition::component(coordinates, 2)),
        Err(FieldError::Argument { .. })
    ));
    assert_eq!(graph.source_fields(x).expect("sources"), &[coordinates]);
    assert_eq!(graph.number_of_components(x).expect("components"), 1);
}

#[test]
fn writing_a_constant_overwrites_its_values() {
    let (mut graph, _) = square();
    let constant = graph
        .create_field("offset", FieldDefinition::constant(&[1.0]))
        .expect("constant");
    assert_eq!(
        graph.evaluate_at_node(constant, NodeId(1), 0.0).expect("before"),
        vec![1.0]
    );
    graph
        .set_values_at_node(constant, NodeId(4), 0.0, &[7.0])
        .expect("set");
    assert_eq!(
        graph.evaluate_at_node(constant, NodeId(1), 0.0).expect("after"),
        vec![7.0]
    );
}

#[test]
fn writing_a_composite_reaches_the_mesh() {
    let (mut graph, coordinates) = square();
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
    assert_eq!(
        graph.evaluate_at_node(swapped, NodeId(1), 0.0).expect("before"),
        vec![0.0, 0.0]
    );

    graph
        .set_values_at_node(swapped, NodeId(1), 0.0, &[0.3, 0.9])
        .expect("set");
    assert_eq!(
        graph.evaluate_at_node(coordinates, NodeId(1), 0.0).expect("mesh"),
        vec![0.9, 0.3]
    );
    assert_eq!(
        graph.evaluate_at_node(swapped, NodeId(1), 0.0).expect("after"),
        vec![0.3, 0.9]
    );
    assert!(matches!(
        graph.set_values_at_node(swapped, NodeId(1), 0.0, &[1.0]),
        Err(FieldError::Argument { .. })
    ));
}

#[test]
fn logical_operators_combine_componentwise() {
    let (mut graph, _) = square();
    let a = graph
        .create_field("a", FieldDefinition::constant(&[1.0, 0.0, 2.0]))
        .expect("a");
    let b = graph
        .create_field("b", FieldDefinition::constant(&[1.0, 1.0, 0.0]))
        .expect("b");
    let expected = [
        (LogicalOperator::Or, [1.0, 1.0, 1.0]),
        (LogicalOperator::And, [1.0, 0.0, 0.0]),
        (LogicalOperator::Xor, [0.0, 1.0, 1.0]),
        (LogicalOperator::EqualTo, [1.0, 0.0, 0.0]),
        (LogicalOperator::LessThan, [0.0, 1.0, 0.0]),
        (LogicalOperator::GreaterThan, [0.0, 0.0, 1.0]),
    ];
    for (operator, values) in expected {
        let field = graph
            .create_field(
                operator.as_str(),
                FieldDefinition::Logical {
                    operator,
                    first: a,
                    second: b,
                },
            )
            .expect("logical");
        assert_eq!(
            graph.evaluate_at_node(field, NodeId(1), 0.0).expect("values"),
            values,
            "{}",
            operator.as_str()
        );
    }
}

#[test]
fn logical_fields_refuse_derivatives() {
    let (mut graph, coordinates) = square();
    let x = graph
        .create_field("x", FieldDefinition::component(coordinates, 0))
        .expect("x");
    let y = graph
        .create_field("y", FieldDefinition::component(coordinates, 1))
        .expect("y");
    let less = graph
        .create_field(
            "less",
            FieldDefinition::Logical {
                operator: LogicalOperator::LessThan,
                first: x,
                second: y,
            },
        )
        .expect("less");

    let values = graph
        .evaluate_in_element(less, ElementId(2), &[0.5, 0.5], 0.0, false)
        .expect("values");
    assert_eq!(values.values, vec![1.0]);
    assert!(matches!(
        graph.evaluate_in_element(less, ElementId(1), &[0.5, 0.5], 0.0, true),
        Err(FieldError::Unsupported { .. })
    ));
    assert!(!graph.field(less).expect("field").cache().is_valid());
}

#[test]
fn definition_queries_follow_field_types() {
    let (mut graph, coordinates) = square();
    let xi = graph.create_field("xi", FieldDefinition::Xi).expect("xi");
    let d3 = graph
        .create_field(
            "d3",
            FieldDefinition::Derivative {
                source: coordinates,
                xi_index: 2,
            },
        )
        .expect("derivative");

    assert!(graph.is_defined_at_node(coordinates, NodeId(1)).expect("query"));
    assert!(!graph.is_defined_at_node(xi, NodeId(1)).expect("query"));
    assert!(!graph.is_defined_at_node(d3, NodeId(1)).expect("query"));
    assert!(graph.is_defined_in_element(xi, ElementId(0)).expect("query"));
    assert!(!graph.is_defined_in_element(d3, ElementId(0)).expect("query"));

    let error = graph
        .evaluate_in_element(d3, ElementId(0), &[0.5, 0.5], 0.0, false)
        .expect_err("xi 3 in a square");
    assert!(error.is_not_defined());
    let error = graph.evaluate_at_node(xi, NodeId(1), 0.0).expect_err("xi at node");
    assert!(error.is_not_defined());
    assert!(!graph.has_multiple_times(d3).expect("times"));
    assert_eq!(
        graph
            .get_native_discretization_in_element(d3, ElementId(0))
            .expect("discretization"),
        None
    );
}

#[test]
fn values_format_as_text() {
    let (mut graph, coordinates) = square();
    assert_eq!(
        graph
            .evaluate_as_string_at_node(coordinates, NodeId(2), 0.0, None)
            .expect("text"),
        "0.5, 0"
    );
    assert_eq!(
        graph
            .evaluate_as_string_in_element(coordinates, ElementId(3), &[0.5, 0.5], 0.0, Some(1))
            .expect("text"),
        "0.75"
    );
    assert!(
        graph
            .evaluate_as_string_at_node(coordinates, NodeId(2), 0.0, Some(2))
            .is_err()
    );
}

#[test]
fn names_are_unique_and_renamable() {
    let (mut graph, coordinates) = square();
    assert!(matches!(
        graph.create_field("coordinates", FieldDefinition::Xi),
        Err(FieldError::DuplicateName(_))
    ));
    assert!(graph.create_field(" ", FieldDefinition::Xi).is_err());

    graph.set_name(coordinates, "geometry").expect("rename");
    assert_eq!(graph.find_field_by_name("geometry"), Some(coordinates));
    assert_eq!(graph.find_field_by_name("coordinates"), None);
    assert_eq!(graph.component_name(coordinates, 1).expect("name"), "2");
    assert!(graph.component_name(coordinates, 2).is_err());
}

#[test]
fn type_changes_cannot_create_cycles() {
    let (mut graph, coordinates) = square();
    let a = graph
        .create_field("a", FieldDefinition::component(coordinates, 0))
        .expect("a");
    let b = graph
        .create_field("b", FieldDefinition::component(a, 0))
        .expect("b");

    assert!(matches!(
        graph.set_type(a, FieldDefinition::component(b, 0)),
        Err(FieldError::Cycle { .. })
    ));
    assert_eq!(graph.source_fields(a).expect("sources"), &[coordinates]);
    assert!(graph.depends_on(b, coordinates));
    assert!(!graph.depends_on(coordinates, b));
    assert_eq!(
        graph.evaluation_order(b).expect("order"),
        vec![coordinates, a, b]
    );
}

#[test]
fn component_count_is_fixed_while_other_fields_read_it() {
    let (mut graph, coordinates) = square();
    let a = graph
        .create_field("a", FieldDefinition::component(coordinates, 0))
        .expect("a");
    let b = graph
        .create_field("b", FieldDefinition::component(a, 0))
        .expect("b");

    assert!(matches!(
        graph.set_type(a, FieldDefinition::constant(&[1.0, 2.0])),
        Err(FieldError::Argument { .. })
    ));
    graph
        .set_type(a, FieldDefinition::constant(&[4.0]))
        .expect("same component count");
    assert_eq!(
        graph.evaluate_at_node(b, NodeId(1), 0.0).expect("values"),
        vec![4.0]
    );
    graph
        .set_type(b, FieldDefinition::constant(&[1.0, 2.0]))
        .expect("b has no readers");
}

#[test]
fn removal_and_garbage_collection_respect_readers() {
    let (mut graph, coordinates) = square();
    let a = graph
        .create_field("a", FieldDefinition::component(coordinates, 0))
        .expect("a");
    let b = graph
        .create_field("b", FieldDefinition::component(a, 0))
        .expect("b");

    match graph.remove_field(coordinates) {
        Err(FieldError::InUse { dependents, .. }) => assert_eq!(dependents, vec!["a"]),
        other => panic!("expected in-use error, got {other:?}"),
    }

    graph.set_managed(a, false).expect("unmanage a");
    assert!(graph.collect_garbage().is_empty(), "b still reads a");

    graph.set_managed(b, false).expect("unmanage b");
    assert_eq!(graph.collect_garbage(), vec!["a", "b"]);
    assert_eq!(graph.len(), 1);
    assert!(graph.field(a).is_err());
    graph.remove_field(coordinates).expect("no readers left");
    assert!(graph.is_empty());
}

fn main() {
    field_engine::initialize(None);
    if let Err(err) = native::run() {
        eprintln!("field_cli error: {err}");
        std::process::exit(1);
    }
}

mod native {
    use field_engine::mesh::{COORDINATES, ROOT_REGION};
    use field_engine::{
        CompositeParameters, CompositeSource, ControlCurve, EvaluationConfig, FieldDefinition,
        FieldGraph, FieldId, LagrangeMesh, LogicalOperator, SobelFilterParameters,
    };

    const USAGE: &str = r"field_cli (field-engine)

USAGE:
  field_cli list
  field_cli run <scenario|all> [options]

SCENARIOS:
  curl_swirl
  divergence_stretch
  gradient_potential
  find_xi_square
  compose_lookup
  curve_ramp
  logical_halves
  sobel_ramp

OPTIONS (run):
  --per-axis <n>        Elements per axis of the generated block (default 2)
  --samples <n>         Raster samples per xi direction
  --out-of-bounds <v>   Value reported outside embeddings and images
  --stats               Print cache statistics after each scenario
  -h, --help            Show this help
";

    pub fn run() -> Result<(), String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut args = Args::new(args);

        let Some(command) = args.next() else {
            print_usage();
            return Ok(());
        };

        match command.as_str() {
            "list" => {
                for scenario in Scenario::ALL {
                    println!("{}", scenario.name());
                }
                Ok(())
            }
            "run" => cmd_run(&mut args),
            "-h" | "--help" | "help" => {
                print_usage();
                Ok(())
            }
            other => Err(format!("unknown command `{other}`\n\n{USAGE}")),
        }
    }

    fn print_usage() {
        println!("{USAGE}");
    }

    struct Options {
        per_axis: usize,
        config: EvaluationConfig,
        stats: bool,
    }

    fn cmd_run(args: &mut Args) -> Result<(), String> {
        let scenario_name = args.next().ok_or("missing scenario name")?;
        let mut options = Options {
            per_axis: 2,
            config: EvaluationConfig::default(),
            stats: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--per-axis" => options.per_axis = args.parsed("--per-axis")?,
                "--samples" => options.config.raster_samples_per_xi = args.parsed("--samples")?,
                "--out-of-bounds" => {
                    options.config.out_of_bounds_value = args.parsed("--out-of-bounds")?;
                }
                "--stats" => options.stats = true,
                "-h" | "--help" => {
                    print_usage();
                    return Ok(());
                }
                other => return Err(format!("unknown option `{other}`")),
            }
        }

        let scenarios: Vec<Scenario> = if scenario_name == "all" {
            Scenario::ALL.to_vec()
        } else {
            vec![
                Scenario::from_str(&scenario_name)
                    .ok_or_else(|| format!("unknown scenario `{scenario_name}`"))?,
            ]
        };
        for scenario in scenarios {
            println!("== {}", scenario.name());
            run_scenario(scenario, &options)?;
        }
        Ok(())
    }

    #[derive(Debug, Clone, Copy)]
    enum Scenario {
        CurlSwirl,
        DivergenceStretch,
        GradientPotential,
        FindXiSquare,
        ComposeLookup,
        CurveRamp,
        LogicalHalves,
        SobelRamp,
    }

    impl Scenario {
        const ALL: &'static [Scenario] = &[
            Scenario::CurlSwirl,
            Scenario::DivergenceStretch,
            Scenario::GradientPotential,
            Scenario::FindXiSquare,
            Scenario::ComposeLookup,
            Scenario::CurveRamp,
            Scenario::LogicalHalves,
            Scenario::SobelRamp,
        ];

        fn name(self) -> &'static str {
            match self {
                Scenario::CurlSwirl => "curl_swirl",
                Scenario::DivergenceStretch => "divergence_stretch",
                Scenario::GradientPotential => "gradient_potential",
                Scenario::FindXiSquare => "find_xi_square",
                Scenario::ComposeLookup => "compose_lookup",
                Scenario::CurveRamp => "curve_ramp",
                Scenario::LogicalHalves => "logical_halves",
                Scenario::SobelRamp => "sobel_ramp",
            }
        }

        fn from_str(name: &str) -> Option<Self> {
            Self::ALL.iter().copied().find(|s| s.name() == name)
        }

        fn dimension(self) -> usize {
            match self {
                Scenario::CurlSwirl | Scenario::DivergenceStretch | Scenario::GradientPotential => 3,
                _ => 2,
            }
        }
    }

    /// Block mesh plus the nodal fields every scenario draws from.
    fn build_graph(dimension: usize, options: &Options) -> Result<(FieldGraph, FieldId), String> {
        let mut mesh = LagrangeMesh::regular_block(dimension, options.per_axis)
            .map_err(|err| err.to_string())?;
        let fe_coordinates = mesh
            .fe_field_by_name(COORDINATES)
            .ok_or("block mesh without coordinates")?;
        let mut nodal = |name: &str, components: usize, map: fn(&[f64]) -> Vec<f64>| {
            mesh.define_nodal_field(name, components, map)
                .map_err(|err| err.to_string())
        };
        let fe_swirl = nodal("swirl", 3, |x| vec![-x[1], x[0], 0.0])?;
        let fe_stretch = nodal("stretch", dimension, |x| {
            x.iter().enumerate().map(|(i, v)| v * (i as f64 + 1.0)).collect()
        })?;
        let fe_potential = nodal("potential", 1, |x| {
            vec![x.iter().enumerate().map(|(i, v)| v * (i as f64 + 1.0)).sum()]
        })?;

        let mut graph = FieldGraph::with_config(mesh, options.config);
        let coordinates = create(
            &mut graph,
            "coordinates",
            FieldDefinition::FiniteElement {
                fe_field: fe_coordinates,
            },
        )?;
        for (name, fe_field) in [
            ("swirl", fe_swirl),
            ("stretch", fe_stretch),
            ("potential", fe_potential),
        ] {
            create(&mut graph, name, FieldDefinition::FiniteElement { fe_field })?;
        }
        Ok((graph, coordinates))
    }

    fn create(
        graph: &mut FieldGraph,
        name: &str,
        definition: FieldDefinition,
    ) -> Result<FieldId, String> {
        graph
            .create_field(name, definition)
            .map_err(|err| format!("creating `{name}`: {err}"))
    }

    fn lookup(graph: &FieldGraph, name: &str) -> Result<FieldId, String> {
        graph
            .find_field_by_name(name)
            .ok_or_else(|| format!("no field named `{name}`"))
    }

    /// Prints `field` at the centre of every element.
    fn print_element_centres(graph: &mut FieldGraph, field: FieldId) -> Result<(), String> {
        let name = graph.name(field).map_err(|err| err.to_string())?.to_owned();
        let elements = graph
            .mesh()
            .region_elements(ROOT_REGION, None)
            .map_err(|err| err.to_string())?;
        for element in elements {
            let dimension = graph
                .mesh()
                .element_dimension(element)
                .map_err(|err| err.to_string())?;
            let xi = vec![0.5; dimension];
            let text = graph
                .evaluate_as_string_in_element(field, element, &xi, 0.0, None)
                .map_err(|err| err.to_string())?;
            println!("{name} @ {element} centre: {text}");
        }
        Ok(())
    }

    fn print_stats(graph: &FieldGraph) {
        for id in graph.field_ids() {
            if let Ok(field) = graph.field(id) {
                let stats = field.cache().stats();
                println!(
                    "  {:<12} {:<28} hits {:>4} misses {:>4}",
                    field.name(),
                    field.type_name(),
                    stats.hits,
                    stats.misses
                );
            }
        }
    }

    fn run_scenario(scenario: Scenario, options: &Options) -> Result<(), String> {
        let (mut graph, coordinates) = build_graph(scenario.dimension(), options)?;
        field_engine::debug_log!("scenario {} over {graph:?}", scenario.name());
        let field = match scenario {
            Scenario::CurlSwirl => {
                let vector = lookup(&graph, "swirl")?;
                create(
                    &mut graph,
                    "curl",
                    FieldDefinition::Curl {
                        vector,
                        coordinate: coordinates,
                    },
                )?
            }
            Scenario::DivergenceStretch => {
                let vector = lookup(&graph, "stretch")?;
                create(
                    &mut graph,
                    "divergence",
                    FieldDefinition::Divergence {
                        vector,
                        coordinate: coordinates,
                    },
                )?
            }
            Scenario::GradientPotential => {
                let source = lookup(&graph, "potential")?;
                create(
                    &mut graph,
                    "gradient",
                    FieldDefinition::Gradient {
                        source,
                        coordinate: coordinates,
                    },
                )?
            }
            Scenario::FindXiSquare => {
                for target in [[0.1, 0.1], [0.6, 0.8], [0.99, 0.5], [1.5, 0.5]] {
                    let found = graph
                        .find_element_xi(coordinates, &target, ROOT_REGION, None, 0.0)
                        .map_err(|err| err.to_string())?;
                    match found {
                        Some(found) => println!(
                            "({}, {}) -> {} xi ({:.6}, {:.6})",
                            target[0], target[1], found.element, found.xi[0], found.xi[1]
                        ),
                        None => println!("({}, {}) -> not found", target[0], target[1]),
                    }
                }
                coordinates
            }
            Scenario::ComposeLookup => {
                let potential = lookup(&graph, "potential")?;
                let shift = create(&mut graph, "shift", FieldDefinition::constant(&[0.25, 0.0]))?;
                let texture = create(
                    &mut graph,
                    "texture",
                    FieldDefinition::Composite(CompositeParameters::from_sources(&[
                        CompositeSource::Field {
                            field: coordinates,
                            component: 0,
                        },
                        CompositeSource::Field {
                            field: shift,
                            component: 0,
                        },
                    ])),
                )?;
                create(
                    &mut graph,
                    "compose",
                    FieldDefinition::Compose {
                        texture_coordinates: texture,
                        find_element_xi: coordinates,
                        calculate_values: potential,
                        search_region: ROOT_REGION.to_owned(),
                    },
                )?
            }
            Scenario::CurveRamp => {
                let mut ramp = ControlCurve::new("ramp", 1);
                for (parameter, value) in [(0.0, 0.0), (0.5, 2.0), (1.0, 2.5)] {
                    ramp.add_point(parameter, &[value])
                        .map_err(|err| err.to_string())?;
                }
                let curve = graph.add_curve(ramp).map_err(|err| err.to_string())?;
                let x = create(&mut graph, "x", FieldDefinition::component(coordinates, 0))?;
                create(
                    &mut graph,
                    "ramp_of_x",
                    FieldDefinition::CurveLookup { source: x, curve },
                )?
            }
            Scenario::LogicalHalves => {
                let x = create(&mut graph, "x", FieldDefinition::component(coordinates, 0))?;
                let half = create(&mut graph, "half", FieldDefinition::constant(&[0.5]))?;
                create(
                    &mut graph,
                    "left",
                    FieldDefinition::Logical {
                        operator: LogicalOperator::LessThan,
                        first: x,
                        second: half,
                    },
                )?
            }
            Scenario::SobelRamp => {
                let potential = lookup(&graph, "potential")?;
                let field = create(
                    &mut graph,
                    "edges",
                    FieldDefinition::SobelFilter(SobelFilterParameters {
                        source: potential,
                        texture_coordinates: coordinates,
                        sizes: vec![8, 8],
                        minimums: vec![0.0, 0.0],
                        maximums: vec![1.0, 1.0],
                        element_dimension: None,
                        search_region: ROOT_REGION.to_owned(),
                    }),
                )?;
                print_element_centres(&mut graph, field)?;
                if let Some(statistics) = graph
                    .image_statistics(field)
                    .map_err(|err| err.to_string())?
                {
                    println!(
                        "image rebuilds {}, pixels not found {}, not evaluated {}",
                        statistics.rebuild_count,
                        statistics.pixels_not_found,
                        statistics.pixels_not_evaluated
                    );
                }
                field
            }
        };

        if !matches!(scenario, Scenario::FindXiSquare | Scenario::SobelRamp) {
            print_element_centres(&mut graph, field)?;
        }
        println!(
            "{}",
            graph.command_string(field).map_err(|err| err.to_string())?
        );
        if options.stats {
            print_stats(&graph);
        }
        Ok(())
    }

    struct Args {
        args: Vec<String>,
        pos: usize,
    }

    impl Args {
        fn new(args: Vec<String>) -> Self {
            Self { args, pos: 0 }
        }

        fn next(&mut self) -> Option<String> {
            let arg = self.args.get(self.pos)?.clone();
            self.pos += 1;
            Some(arg)
        }

        fn value(&mut self, flag: &str) -> Result<String, String> {
            self.next()
                .ok_or_else(|| format!("missing value for {flag}"))
        }

        fn parsed<T: std::str::FromStr>(&mut self, flag: &str) -> Result<T, String> {
            let value = self.value(flag)?;
            value
                .parse()
                .map_err(|_| format!("invalid value `{value}` for {flag}"))
        }
    }
}

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Computed field evaluation engine.
//!
//! A [`FieldGraph`] owns named fields whose values are computed from other
//! fields, from constants and from a [`Mesh`] at node or element locations.
//! Evaluation results are cached per field and reused until a mutation
//! invalidates them. Fields can be inverted with find-element-xi, composed
//! through embeddings, differentiated, compared, looked up in control curves
//! and rasterised through a Sobel edge filter.

pub mod config;
pub mod curve;
pub mod field;
pub mod geom;
pub mod mesh;
pub mod types;

pub use config::EvaluationConfig;
pub use curve::{ControlCurve, CurveError, CurveId, CurveSet};
pub use field::{CacheStats, ElementXi, Field, FieldError, FieldGraph, FieldId, FieldValues, Location};
pub use geom::{CoordinateSystem, CoordinateSystemType, ImageStatistics};
pub use mesh::{ElementId, FeFieldId, LagrangeMesh, Mesh, MeshError, NodeId};
pub use types::{
    CompositeParameters, CompositeSource, FieldDefinition, FieldKind, LogicalOperator,
    SobelFilterParameters,
};

cfg_if::cfg_if! {
    if #[cfg(feature = "parallel")] {
        /// Sets up logging and the global worker pool used by image filters.
        pub fn initialize(worker_count: Option<usize>) {
            init_logger();
            let threads = worker_count
                .map(|count| count.max(1))
                .or_else(|| std::thread::available_parallelism().map(std::num::NonZero::get).ok())
                .unwrap_or(1);
            if let Err(err) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
                log::warn!("worker pool already initialised: {err}");
            }
        }
    } else {
        /// Sets up logging.
        pub fn initialize(_worker_count: Option<usize>) {
            init_logger();
        }
    }
}

/// Installs `env_logger` at debug level; a no-op without `debug_logs`.
#[cfg(feature = "debug_logs")]
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

#[cfg(not(feature = "debug_logs"))]
pub fn init_logger() {}

#[macro_export]
macro_rules! debug_log {
    ($($t:tt)*) => {{
        #[cfg(feature = "debug_logs")]
        {
            println!("{}", format!($($t)*));
        }
    }};
}

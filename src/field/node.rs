//! The field record stored in a [`FieldGraph`](super::FieldGraph).

use serde::Serialize;

use super::cache::FieldCache;
use super::find_xi::FindXiCache;
use crate::geom::CoordinateSystem;
use crate::types::FieldKind;

/// Handle of a field within its graph.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd, Serialize)]
pub struct FieldId(pub usize);

impl FieldId {
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }
}

impl From<usize> for FieldId {
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}

/// A named, typed node of the field graph.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) id: FieldId,
    pub(crate) name: String,
    pub(crate) coordinate_system: CoordinateSystem,
    pub(crate) number_of_components: usize,
    pub(crate) source_fields: Vec<FieldId>,
    pub(crate) source_values: Vec<f64>,
    pub(crate) kind: FieldKind,
    pub(crate) cache: FieldCache,
    pub(crate) managed: bool,
    pub(crate) find_xi_cache: Option<FindXiCache>,
}

impl Field {
    #[must_use]
    pub const fn id(&self) -> FieldId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn coordinate_system(&self) -> &CoordinateSystem {
        &self.coordinate_system
    }

    #[must_use]
    pub const fn number_of_components(&self) -> usize {
        self.number_of_components
    }

    #[must_use]
    pub fn source_fields(&self) -> &[FieldId] {
        &self.source_fields
    }

    #[must_use]
    pub fn source_values(&self) -> &[f64] {
        &self.source_values
    }

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    #[must_use]
    pub const fn cache(&self) -> &FieldCache {
        &self.cache
    }

    /// Managed fields are roots for [`FieldGraph::collect_garbage`](super::FieldGraph::collect_garbage).
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.managed
    }

    /// Component names are their one-based numbers.
    #[must_use]
    pub fn component_name(&self, component: usize) -> Option<String> {
        (component < self.number_of_components).then(|| (component + 1).to_string())
    }

    pub(crate) fn clear_cache(&mut self) {
        self.cache.invalidate();
        self.find_xi_cache = None;
        self.kind.invalidate_derived_data();
    }
}

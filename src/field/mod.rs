//! The field graph: an arena of named, typed fields connected by source
//! edges.
//!
//! Fields are addressed by [`FieldId`] and reference their sources by id, so
//! the graph is the single owner of every field. Establishing a type is
//! validated against the whole graph first and only then installed, which
//! keeps the source edges acyclic and leaves a field untouched when
//! validation fails. Mutations clear the caches of the changed field and of
//! everything that reads from it.

mod cache;
mod error;
mod evaluator;
mod find_xi;
mod location;
mod node;
pub mod topo;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use log::debug;

pub use cache::{CacheStats, FieldCache};
pub use error::FieldError;
pub use evaluator::FieldValues;
pub use find_xi::{ElementRaster, ElementXi, FindXiCache, RasterLookup};
pub use location::Location;
pub use node::{Field, FieldId};

use crate::config::EvaluationConfig;
use crate::curve::{ControlCurve, CurveError, CurveId, CurveSet};
use crate::geom::CoordinateSystem;
use crate::mesh::Mesh;
use crate::types::{self, FieldDefinition, FieldKind};
use topo::{SourceEdges, Topology, dependents_of, sources_reachable_from};

/// Owner of all fields, the mesh they are evaluated over and the control
/// curves they may look up.
pub struct FieldGraph {
    fields: Vec<Option<Field>>,
    name_index: HashMap<String, FieldId>,
    mesh: Box<dyn Mesh>,
    curves: CurveSet,
    /// Curve -> fields whose values depend on it.
    curve_observers: BTreeMap<CurveId, BTreeSet<FieldId>>,
    config: EvaluationConfig,
}

impl fmt::Debug for FieldGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldGraph")
            .field("fields", &self.name_index.len())
            .field("curves", &self.curves.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FieldGraph {
    #[must_use]
    pub fn new(mesh: impl Mesh + 'static) -> Self {
        Self::with_config(mesh, EvaluationConfig::default())
    }

    #[must_use]
    pub fn with_config(mesh: impl Mesh + 'static, config: EvaluationConfig) -> Self {
        Self {
            fields: Vec::new(),
            name_index: HashMap::new(),
            mesh: Box::new(mesh),
            curves: CurveSet::new(),
            curve_observers: BTreeMap::new(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EvaluationConfig {
        &self.config
    }

    /// Replaces the configuration; every cached value is dropped.
    pub fn set_config(&mut self, config: EvaluationConfig) {
        self.config = config;
        self.invalidate_all();
    }

    #[must_use]
    pub fn mesh(&self) -> &dyn Mesh {
        self.mesh.as_ref()
    }

    /// Mutable mesh access. Any mesh change can alter any field, so all
    /// caches are cleared up front.
    pub fn mesh_mut(&mut self) -> &mut dyn Mesh {
        self.invalidate_all();
        self.mesh.as_mut()
    }

    #[must_use]
    pub const fn curves(&self) -> &CurveSet {
        &self.curves
    }

    pub fn add_curve(&mut self, curve: ControlCurve) -> Result<CurveId, FieldError> {
        Ok(self.curves.add(curve)?)
    }

    /// Edits a curve and invalidates every field that looks it up.
    pub fn modify_curve<R>(
        &mut self,
        id: CurveId,
        edit: impl FnOnce(&mut ControlCurve) -> Result<R, CurveError>,
    ) -> Result<R, FieldError> {
        let result = edit(self.curves.get_mut(id)?)?;
        let observers: Vec<FieldId> = self
            .curve_observers
            .get(&id)
            .map(|fields| fields.iter().copied().collect())
            .unwrap_or_default();
        debug!("curve {} changed, {} observing fields", id.0, observers.len());
        for field in observers {
            self.invalidate_with_dependents(field);
        }
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Creation and type changes
    // ─────────────────────────────────────────────────────────────────────

    /// Creates a managed field named `name` with the type `definition`.
    pub fn create_field(
        &mut self,
        name: &str,
        definition: FieldDefinition,
    ) -> Result<FieldId, FieldError> {
        self.check_new_name(name)?;
        let established = definition.establish(self)?;
        let id = FieldId::new(self.fields.len());
        let field = Field {
            id,
            name: name.to_owned(),
            coordinate_system: established.coordinate_system.unwrap_or_default(),
            number_of_components: established.number_of_components,
            source_fields: established.source_fields,
            source_values: established.source_values,
            kind: established.kind,
            cache: FieldCache::new(established.number_of_components),
            managed: true,
            find_xi_cache: None,
        };
        self.register_observers(id, &field.kind);
        debug!("created {} field `{name}`", field.type_name());
        self.fields.push(Some(field));
        self.name_index.insert(name.to_owned(), id);
        Ok(id)
    }

    /// Gives an existing field a new type.
    ///
    /// Fails without changing anything when the definition is invalid, when
    /// it would make the field depend on itself, or when it changes the
    /// component count of a field other fields read from.
    pub fn set_type(&mut self, id: FieldId, definition: FieldDefinition) -> Result<(), FieldError> {
        let current_components = self.field(id)?.number_of_components;
        let established = definition.establish(self)?;

        let mut edges = self.source_edges();
        let dependents = dependents_of(&edges, id);
        edges.insert(id, established.source_fields.clone());
        Topology::sort(&edges)?;

        if established.number_of_components != current_components && !dependents.is_empty() {
            let field = self.field(id)?;
            return Err(FieldError::argument(format!(
                "cannot change `{}` from {} to {} components while other fields use it",
                field.name, current_components, established.number_of_components
            )));
        }

        self.unregister_observers(id);
        self.register_observers(id, &established.kind);
        let field = self.field_mut(id)?;
        field.kind = established.kind;
        field.source_fields = established.source_fields;
        field.source_values = established.source_values;
        field.number_of_components = established.number_of_components;
        field.cache = FieldCache::new(established.number_of_components);
        if let Some(system) = established.coordinate_system {
            field.coordinate_system = system;
        }
        debug!("field `{}` is now {}", field.name, field.type_name());
        self.invalidate_with_dependents(id);
        Ok(())
    }

    fn check_new_name(&self, name: &str) -> Result<(), FieldError> {
        if name.trim().is_empty() {
            return Err(FieldError::argument("field names must not be empty"));
        }
        if self.name_index.contains_key(name) {
            return Err(FieldError::DuplicateName(name.to_owned()));
        }
        Ok(())
    }

    fn register_observers(&mut self, id: FieldId, kind: &FieldKind) {
        if let FieldKind::CurveLookup { curve } = kind {
            self.curve_observers.entry(*curve).or_default().insert(id);
        }
    }

    fn unregister_observers(&mut self, id: FieldId) {
        for observers in self.curve_observers.values_mut() {
            observers.remove(&id);
        }
        self.curve_observers.retain(|_, observers| !observers.is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lookup and field properties
    // ─────────────────────────────────────────────────────────────────────

    pub fn field(&self, id: FieldId) -> Result<&Field, FieldError> {
        self.fields
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(FieldError::UnknownField(id))
    }

    pub(crate) fn field_mut(&mut self, id: FieldId) -> Result<&mut Field, FieldError> {
        self.fields
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(FieldError::UnknownField(id))
    }

    #[must_use]
    pub fn find_field_by_name(&self, name: &str) -> Option<FieldId> {
        self.name_index.get(name).copied()
    }

    /// Ids of all live fields in creation order.
    #[must_use]
    pub fn field_ids(&self) -> Vec<FieldId> {
        self.fields.iter().flatten().map(|field| field.id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.name_index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name_index.is_empty()
    }

    pub fn name(&self, id: FieldId) -> Result<&str, FieldError> {
        Ok(self.field(id)?.name())
    }

    pub fn set_name(&mut self, id: FieldId, name: &str) -> Result<(), FieldError> {
        if self.field(id)?.name == name {
            return Ok(());
        }
        self.check_new_name(name)?;
        let field = self.field_mut(id)?;
        let old = std::mem::replace(&mut field.name, name.to_owned());
        self.name_index.remove(&old);
        self.name_index.insert(name.to_owned(), id);
        Ok(())
    }

    pub fn number_of_components(&self, id: FieldId) -> Result<usize, FieldError> {
        Ok(self.field(id)?.number_of_components)
    }

    pub fn coordinate_system(&self, id: FieldId) -> Result<CoordinateSystem, FieldError> {
        Ok(self.field(id)?.coordinate_system)
    }

    /// Changing the coordinate system changes converted values downstream.
    pub fn set_coordinate_system(
        &mut self,
        id: FieldId,
        system: CoordinateSystem,
    ) -> Result<(), FieldError> {
        self.field_mut(id)?.coordinate_system = system;
        self.invalidate_with_dependents(id);
        Ok(())
    }

    pub fn component_name(&self, id: FieldId, component: usize) -> Result<String, FieldError> {
        let field = self.field(id)?;
        field.component_name(component).ok_or_else(|| {
            FieldError::argument(format!(
                "`{}` has no component {}",
                field.name,
                component + 1
            ))
        })
    }

    pub fn type_name(&self, id: FieldId) -> Result<&'static str, FieldError> {
        Ok(self.field(id)?.type_name())
    }

    pub fn source_fields(&self, id: FieldId) -> Result<&[FieldId], FieldError> {
        Ok(self.field(id)?.source_fields())
    }

    pub fn source_values(&self, id: FieldId) -> Result<&[f64], FieldError> {
        Ok(self.field(id)?.source_values())
    }

    /// Whether `field` is `other` or reads from it, directly or indirectly.
    #[must_use]
    pub fn depends_on(&self, field: FieldId, other: FieldId) -> bool {
        field == other || sources_reachable_from(&self.source_edges(), [field]).contains(&other)
    }

    pub fn set_managed(&mut self, id: FieldId, managed: bool) -> Result<(), FieldError> {
        self.field_mut(id)?.managed = managed;
        Ok(())
    }

    /// Reproduction command naming sources by their current names.
    pub fn command_string(&self, id: FieldId) -> Result<String, FieldError> {
        types::command_string(self, self.field(id)?)
    }

    /// Structural equality of two fields: same type parameters, sources,
    /// constants, component count and coordinate system.
    pub fn contents_match(&self, a: FieldId, b: FieldId) -> Result<bool, FieldError> {
        let a = self.field(a)?;
        let b = self.field(b)?;
        Ok(a.kind.contents_match(&b.kind)
            && a.source_fields == b.source_fields
            && a.source_values == b.source_values
            && a.number_of_components == b.number_of_components
            && a.coordinate_system == b.coordinate_system)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifetime
    // ─────────────────────────────────────────────────────────────────────

    /// Removes a field no other field reads from.
    pub fn remove_field(&mut self, id: FieldId) -> Result<(), FieldError> {
        let field = self.field(id)?;
        let mut readers: Vec<String> = self
            .fields
            .iter()
            .flatten()
            .filter(|other| other.source_fields.contains(&id))
            .map(|other| other.name.clone())
            .collect();
        if !readers.is_empty() {
            readers.sort();
            return Err(FieldError::InUse {
                field: field.name.clone(),
                dependents: readers,
            });
        }
        self.drop_field(id);
        Ok(())
    }

    /// Removes unmanaged fields that no managed field reads from. Returns
    /// the removed names, sorted.
    pub fn collect_garbage(&mut self) -> Vec<String> {
        let roots: Vec<FieldId> = self
            .fields
            .iter()
            .flatten()
            .filter(|field| field.managed)
            .map(|field| field.id)
            .collect();
        let reachable = sources_reachable_from(&self.source_edges(), roots);
        let unreachable: Vec<FieldId> = self
            .field_ids()
            .into_iter()
            .filter(|id| !reachable.contains(id))
            .collect();
        let mut removed: Vec<String> = unreachable
            .into_iter()
            .filter_map(|id| self.drop_field(id))
            .collect();
        removed.sort();
        if !removed.is_empty() {
            debug!("collected {} unused fields", removed.len());
        }
        removed
    }

    fn drop_field(&mut self, id: FieldId) -> Option<String> {
        let field = self.fields.get_mut(id.0)?.take()?;
        self.name_index.remove(&field.name);
        self.unregister_observers(id);
        Some(field.name)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Invalidation and dependency queries
    // ─────────────────────────────────────────────────────────────────────

    /// Clears the caches of `id` and of every field reading from it.
    pub fn invalidate(&mut self, id: FieldId) -> Result<(), FieldError> {
        self.field(id)?;
        self.invalidate_with_dependents(id);
        Ok(())
    }

    /// Clears the caches of `id` only.
    pub fn clear_cache(&mut self, id: FieldId) -> Result<(), FieldError> {
        self.field_mut(id)?.clear_cache();
        Ok(())
    }

    pub fn invalidate_all(&mut self) {
        for field in self.fields.iter_mut().flatten() {
            field.clear_cache();
        }
    }

    fn invalidate_with_dependents(&mut self, id: FieldId) {
        let dependents = dependents_of(&self.source_edges(), id);
        for field in std::iter::once(id).chain(dependents) {
            if let Some(Some(field)) = self.fields.get_mut(field.0) {
                field.clear_cache();
            }
        }
    }

    pub(crate) fn source_edges(&self) -> SourceEdges {
        self.fields
            .iter()
            .flatten()
            .map(|field| (field.id, field.source_fields.clone()))
            .collect()
    }

    /// `id` and all fields it reads from, sources first.
    pub fn evaluation_order(&self, id: FieldId) -> Result<Vec<FieldId>, FieldError> {
        self.field(id)?;
        let edges = self.source_edges();
        let reachable = sources_reachable_from(&edges, [id]);
        let subgraph: SourceEdges = edges
            .into_iter()
            .filter(|(field, _)| reachable.contains(field))
            .collect();
        Ok(Topology::sort(&subgraph)?.order)
    }
}

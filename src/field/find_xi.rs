//! Inverse evaluation: locating the element and xi at which a field takes
//! given values.
//!
//! The general search walks the elements of a region, last hit first, and
//! runs the Newton solver from [`crate::geom::find_xi_in_element`] in each.
//! Every field keeps the most recent answer so repeated lookups of the same
//! target are free. [`ElementRaster`] accelerates repeated inversions over a
//! regular grid by remembering which elements can cover each pixel.

use log::debug;

use super::error::FieldError;
use super::location::Location;
use super::node::FieldId;
use super::FieldGraph;
use crate::geom::{
    ImageGeometry, NewtonSettings, XiPoint, XiSample, find_xi_in_element,
};
use crate::mesh::{ElementId, Xi};
use crate::types::{FieldKind, composite, coordinate};

/// A found location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementXi {
    pub element: ElementId,
    pub xi: Xi,
}

impl ElementXi {
    #[must_use]
    pub const fn location(&self) -> Location {
        Location::Element {
            element: self.element,
            xi: self.xi,
        }
    }
}

/// Most recent find-element-xi request of one field and its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct FindXiCache {
    values: Vec<f64>,
    search_region: String,
    element_dimension: Option<usize>,
    time: f64,
    result: Option<ElementXi>,
    last_element: Option<ElementId>,
}

impl FindXiCache {
    fn answers(
        &self,
        values: &[f64],
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> bool {
        self.values == values
            && self.search_region == search_region
            && self.element_dimension == element_dimension
            && self.time == time
    }
}

/// Outcome of a raster lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RasterLookup {
    Found(ElementXi),
    /// No element can reach the pixel holding the target.
    Missed,
    /// The raster cannot decide; use the general search.
    Inconclusive,
}

/// Candidate elements per pixel of a regular grid over a field's values.
///
/// Built on first use by sampling every element of the search region and
/// marking the pixels covered by the sample bounding box, widened by one
/// pixel on each side. A lookup at another time rebuilds it.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRaster {
    geometry: ImageGeometry,
    built_for: Option<(FieldId, String, Option<usize>, f64)>,
    candidates: Vec<Vec<ElementId>>,
}

impl ElementRaster {
    #[must_use]
    pub fn new(geometry: ImageGeometry) -> Self {
        Self {
            geometry,
            built_for: None,
            candidates: Vec::new(),
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.built_for.is_some()
    }

    /// Elements that may contain the values of pixel `index`.
    #[must_use]
    pub fn candidates(&self, index: usize) -> &[ElementId] {
        self.candidates.get(index).map_or(&[], Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.built_for = None;
        self.candidates.clear();
    }

    fn is_built_for(
        &self,
        id: FieldId,
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> bool {
        self.built_for
            .as_ref()
            .is_some_and(|(field, region, dimension, built_at)| {
                *field == id
                    && region == search_region
                    && *dimension == element_dimension
                    && *built_at == time
            })
    }

    /// Records `element` for every pixel touched by the box `[low, high]`.
    fn mark(&mut self, element: ElementId, low: &[f64], high: &[f64]) {
        let dimension = self.geometry.dimension();
        let mut ranges = [(0_usize, 0_usize); 3];
        for axis in 0..dimension {
            let size = self.geometry.sizes()[axis];
            let minimum = self.geometry.minimums()[axis];
            let maximum = self.geometry.maximums()[axis];
            if size < 2 {
                ranges[axis] = (0, 0);
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let step = (maximum - minimum) / (size - 1) as f64;
            if high[axis] < minimum - step || low[axis] > maximum + step {
                return;
            }
            let first = ((low[axis] - minimum) / step).floor() - 1.0;
            let last = ((high[axis] - minimum) / step).ceil() + 1.0;
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let clamp = |value: f64| value.clamp(0.0, (size - 1) as f64) as usize;
            ranges[axis] = (clamp(first), clamp(last));
        }

        let sizes = self.geometry.sizes();
        let strides = [1, sizes[0], sizes[0] * sizes.get(1).copied().unwrap_or(1)];
        let axis_range = |axis: usize| {
            if axis < dimension {
                ranges[axis].0..=ranges[axis].1
            } else {
                0..=0
            }
        };
        for k in axis_range(2) {
            for j in axis_range(1) {
                for i in axis_range(0) {
                    let index = i + j * strides[1] + k * strides[2];
                    let list = &mut self.candidates[index];
                    if list.last() != Some(&element) {
                        list.push(element);
                    }
                }
            }
        }
    }
}

/// Regular xi sample points of an element, `samples + 1` per direction.
fn sample_points(dimension: usize, samples: usize) -> Vec<XiPoint> {
    let per_axis = samples.max(1) + 1;
    let count = per_axis.pow(u32::try_from(dimension).unwrap_or(3));
    (0..count)
        .map(|mut index| {
            let mut xi = [0.0; 3];
            for slot in xi.iter_mut().take(dimension) {
                #[allow(clippy::cast_precision_loss)]
                let value = (index % per_axis) as f64 / (per_axis - 1) as f64;
                *slot = value;
                index /= per_axis;
            }
            xi
        })
        .collect()
}

impl FieldGraph {
    fn newton_settings(&self) -> NewtonSettings {
        NewtonSettings {
            tolerance: self.config.find_xi_tolerance(),
            max_iterations: self.config.find_xi_max_iterations,
            singular: self.config.singular_tolerance(),
        }
    }

    /// Elements searched for `id`, with `preferred` moved to the front.
    fn search_candidates(
        &self,
        number_of_components: usize,
        search_region: &str,
        element_dimension: Option<usize>,
        preferred: Option<ElementId>,
    ) -> Result<Vec<ElementId>, FieldError> {
        let mut elements = self.mesh.region_elements(search_region, element_dimension)?;
        if element_dimension.is_none() {
            // fewer target values than xi directions has no unique answer
            elements.retain(|element| {
                self.mesh
                    .element_dimension(*element)
                    .is_ok_and(|dimension| dimension <= number_of_components)
            });
        }
        if let Some(preferred) = preferred {
            if let Some(position) = elements.iter().position(|element| *element == preferred) {
                elements[..=position].rotate_right(1);
            }
        }
        Ok(elements)
    }

    /// Newton search for `values` of field `id` inside one element.
    fn find_xi_in_one_element(
        &mut self,
        id: FieldId,
        element: ElementId,
        values: &[f64],
        time: f64,
    ) -> Result<Option<Xi>, FieldError> {
        let dimension = self.mesh.element_dimension(element)?;
        let settings = self.newton_settings();
        let outcome = find_xi_in_element(dimension, values, settings, |xi: &XiPoint| {
            match self.evaluate_in_element(id, element, &xi[..dimension], time, true) {
                Ok(result) => Ok(result.derivatives.map(|derivatives| XiSample {
                    values: result.values,
                    derivatives,
                })),
                Err(err) if err.is_not_defined() => Ok(None),
                Err(err) => Err(err),
            }
        })?;
        match outcome {
            Ok(xi) => Ok(Some(xi)),
            Err(failure) => {
                debug!("find xi in {element}: {failure:?}");
                Ok(None)
            }
        }
    }

    /// Finds an element and xi in `search_region` where field `id` equals
    /// `values`, optionally only among elements of `element_dimension`.
    ///
    /// Coordinate transformations convert the target back to their source's
    /// coordinate system and search the source. Composites search their only
    /// source field with unused components zero-filled; composites with more
    /// than one source field are unsupported.
    pub fn find_element_xi(
        &mut self,
        id: FieldId,
        values: &[f64],
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> Result<Option<ElementXi>, FieldError> {
        let field = self.field(id)?;
        if values.len() != field.number_of_components() {
            return Err(FieldError::argument(format!(
                "find element xi on `{}` needs {} values, got {}",
                field.name(),
                field.number_of_components(),
                values.len()
            )));
        }
        if !self.mesh.has_region(search_region) {
            return Err(FieldError::argument(format!(
                "unknown search region `{search_region}`"
            )));
        }
        match field.kind() {
            FieldKind::CoordinateTransformation => {
                let (source, target) = coordinate::find_element_xi_target(self, field, values)?;
                return self.find_element_xi(source, &target, search_region, element_dimension, time);
            }
            FieldKind::Composite { .. } => {
                let (source, target) = composite::find_element_xi_target(self, field, values)?;
                return self.find_element_xi(source, &target, search_region, element_dimension, time);
            }
            _ => {}
        }

        if let Some(cache) = &field.find_xi_cache {
            if cache.answers(values, search_region, element_dimension, time) {
                debug!("find xi `{}`: cached", field.name());
                return Ok(cache.result);
            }
        }
        let number_of_components = field.number_of_components();
        let preferred = field.find_xi_cache.as_ref().and_then(|cache| cache.last_element);
        let elements =
            self.search_candidates(number_of_components, search_region, element_dimension, preferred)?;

        let mut result = None;
        for element in elements {
            if let Some(xi) = self.find_xi_in_one_element(id, element, values, time)? {
                result = Some(ElementXi { element, xi });
                break;
            }
        }

        let last_element = result.map(|found| found.element).or(preferred);
        self.field_mut(id)?.find_xi_cache = Some(FindXiCache {
            values: values.to_vec(),
            search_region: search_region.to_owned(),
            element_dimension,
            time,
            result,
            last_element,
        });
        Ok(result)
    }

    fn build_raster(
        &mut self,
        id: FieldId,
        raster: &mut ElementRaster,
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> Result<(), FieldError> {
        let number_of_components = self.field(id)?.number_of_components();
        let dimension = raster.geometry.dimension();
        if number_of_components < dimension {
            return Err(FieldError::argument(format!(
                "raster of dimension {dimension} over a field with {number_of_components} components"
            )));
        }
        raster.candidates = vec![Vec::new(); raster.geometry.pixel_count()];
        let elements =
            self.search_candidates(number_of_components, search_region, element_dimension, None)?;
        let samples = self.config.raster_samples_per_xi;
        for element in elements {
            let element_dimension = self.mesh.element_dimension(element)?;
            let mut low = [f64::INFINITY; 3];
            let mut high = [f64::NEG_INFINITY; 3];
            let mut defined = false;
            for xi in sample_points(element_dimension, samples) {
                match self.evaluate_in_element(id, element, &xi[..element_dimension], time, false) {
                    Ok(result) => {
                        defined = true;
                        for axis in 0..dimension {
                            low[axis] = low[axis].min(result.values[axis]);
                            high[axis] = high[axis].max(result.values[axis]);
                        }
                    }
                    Err(err) if err.is_not_defined() => {}
                    Err(err) => return Err(err),
                }
            }
            if defined {
                raster.mark(element, &low, &high);
            }
        }
        raster.built_for = Some((id, search_region.to_owned(), element_dimension, time));
        debug!(
            "raster for `{}` built over {} pixels",
            self.field(id)?.name(),
            raster.geometry.pixel_count()
        );
        Ok(())
    }

    /// Looks `values` up in `raster`, building it first if needed.
    pub fn raster_lookup(
        &mut self,
        id: FieldId,
        raster: &mut ElementRaster,
        values: &[f64],
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> Result<RasterLookup, FieldError> {
        if !raster.is_built_for(id, search_region, element_dimension, time) {
            self.build_raster(id, raster, search_region, element_dimension, time)?;
        }
        let Some(pixel) = raster.geometry.pixel_at(values) else {
            return Ok(RasterLookup::Inconclusive);
        };
        let candidates = raster.candidates(pixel);
        if candidates.is_empty() {
            return Ok(RasterLookup::Missed);
        }
        for element in candidates.to_vec() {
            if let Some(xi) = self.find_xi_in_one_element(id, element, values, time)? {
                return Ok(RasterLookup::Found(ElementXi { element, xi }));
            }
        }
        Ok(RasterLookup::Inconclusive)
    }

    /// [`find_element_xi`](Self::find_element_xi) through a raster, falling
    /// back to the general search when the raster is inconclusive.
    pub fn find_element_xi_special(
        &mut self,
        id: FieldId,
        raster: &mut ElementRaster,
        values: &[f64],
        search_region: &str,
        element_dimension: Option<usize>,
        time: f64,
    ) -> Result<Option<ElementXi>, FieldError> {
        match self.raster_lookup(id, raster, values, search_region, element_dimension, time)? {
            RasterLookup::Found(found) => Ok(Some(found)),
            RasterLookup::Missed => Ok(None),
            RasterLookup::Inconclusive => {
                self.find_element_xi(id, values, search_region, element_dimension, time)
            }
        }
    }
}

//! Image processing fields.
//!
//! A `sobel_filter` field rasterises its source field over a regular grid in
//! the texture coordinate field's domain, runs the Sobel edge filter over the
//! image and answers evaluations by looking up the pixel under the texture
//! coordinates of the requested location. The filtered image is kept until
//! either source field changes or it is asked for at another time.

use log::{debug, warn};

use super::{Established, FieldKind, format_g};
use crate::field::{ElementRaster, FieldError, FieldGraph, FieldId, Location};
use crate::geom::{ImageCache, ImageError, ImageGeometry, ImageStatistics};

/// Everything that defines a Sobel filter field.
#[derive(Debug, Clone, PartialEq)]
pub struct SobelFilterParameters {
    pub source: FieldId,
    pub texture_coordinates: FieldId,
    /// Pixels per image axis; the image dimension is their count.
    pub sizes: Vec<usize>,
    pub minimums: Vec<f64>,
    pub maximums: Vec<f64>,
    /// Restricts the element search to one dimension.
    pub element_dimension: Option<usize>,
    pub search_region: String,
}

impl SobelFilterParameters {
    fn geometry(&self) -> Result<ImageGeometry, FieldError> {
        ImageGeometry::new(&self.sizes, &self.minimums, &self.maximums).map_err(image_error)
    }
}

fn image_error(err: ImageError) -> FieldError {
    FieldError::argument(err.to_string())
}

/// Parameters plus the derived image and element raster.
#[derive(Debug, Clone)]
pub struct SobelFilterData {
    parameters: SobelFilterParameters,
    image: Option<ImageCache>,
    /// Time the image was rasterised at.
    image_time: Option<f64>,
    raster: Option<ElementRaster>,
}

impl SobelFilterData {
    #[must_use]
    pub const fn parameters(&self) -> &SobelFilterParameters {
        &self.parameters
    }

    /// Counters of the image cache, once it has been built.
    #[must_use]
    pub fn image_statistics(&self) -> Option<ImageStatistics> {
        self.image.as_ref().map(ImageCache::statistics)
    }

    #[must_use]
    pub fn is_image_valid(&self) -> bool {
        self.image.as_ref().is_some_and(ImageCache::is_valid)
    }

    /// Marks the image stale; the next evaluation rebuilds it.
    pub fn invalidate(&mut self) {
        if let Some(image) = &mut self.image {
            image.invalidate();
        }
        self.raster = None;
    }

    pub(crate) fn command_string(&self, source: &str, texture_coordinates: &str) -> String {
        let list = |values: &[f64]| {
            values
                .iter()
                .map(|v| format_g(*v))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let sizes = self
            .parameters
            .sizes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        let mut command = format!(
            "sobel_filter field {source} dimension {} sizes {sizes} minimums {} maximums {} texture_coordinates_field {texture_coordinates} search_group {}",
            self.parameters.sizes.len(),
            list(&self.parameters.minimums),
            list(&self.parameters.maximums),
            self.parameters.search_region
        );
        if let Some(dimension) = self.parameters.element_dimension {
            command.push_str(&format!(" element_dimension {dimension}"));
        }
        command
    }
}

pub(crate) fn establish(
    graph: &FieldGraph,
    parameters: SobelFilterParameters,
) -> Result<Established, FieldError> {
    let geometry = parameters.geometry()?;
    let source = graph.field(parameters.source)?;
    let texture = graph.field(parameters.texture_coordinates)?;
    if texture.number_of_components() < geometry.dimension() {
        return Err(FieldError::argument(format!(
            "texture coordinates `{}` have {} components, the image needs {}",
            texture.name(),
            texture.number_of_components(),
            geometry.dimension()
        )));
    }
    if !graph.mesh().has_region(&parameters.search_region) {
        return Err(FieldError::argument(format!(
            "unknown search region `{}`",
            parameters.search_region
        )));
    }
    let components = source.number_of_components();
    let sources = vec![parameters.source, parameters.texture_coordinates];
    Ok(Established::new(
        FieldKind::SobelFilter(Box::new(SobelFilterData {
            parameters,
            image: None,
            image_time: None,
            raster: None,
        })),
        sources,
        components,
    ))
}

/// Rasterises the source and filters the image unless it is still valid
/// for `time`.
fn refresh_image(
    graph: &mut FieldGraph,
    parameters: &SobelFilterParameters,
    image: &mut Option<ImageCache>,
    image_time: &mut Option<f64>,
    raster: &mut Option<ElementRaster>,
    time: f64,
) -> Result<(), FieldError> {
    if *image_time == Some(time) && image.as_ref().is_some_and(ImageCache::is_valid) {
        return Ok(());
    }
    *image_time = None;
    let geometry = parameters.geometry()?;
    let depth = graph.field(parameters.source)?.number_of_components();
    let texture_components = graph
        .field(parameters.texture_coordinates)?
        .number_of_components();
    let cache = match image.take() {
        Some(cache) if cache.depth() == depth => cache,
        _ => ImageCache::new(geometry.clone(), depth).map_err(image_error)?,
    };
    let cache = image.insert(cache);
    let raster = raster.get_or_insert_with(|| ElementRaster::new(geometry));

    let mut not_found = 0;
    let mut not_evaluated = 0;
    let mut failure = None;
    cache.rasterize(|coordinates, pixel| {
        pixel.fill(0.0);
        if failure.is_some() {
            return;
        }
        let mut target = coordinates.to_vec();
        target.resize(texture_components, 0.0);
        let found = graph.find_element_xi_special(
            parameters.texture_coordinates,
            raster,
            &target,
            &parameters.search_region,
            parameters.element_dimension,
            time,
        );
        match found {
            Ok(Some(found)) => {
                match graph.evaluate(parameters.source, &found.location(), time, false) {
                    Ok(result) => pixel.copy_from_slice(&result.values),
                    Err(err) if err.is_not_defined() => not_evaluated += 1,
                    Err(err) => failure = Some(err),
                }
            }
            Ok(None) => not_found += 1,
            Err(err) => {
                debug!("sobel filter pixel at {coordinates:?}: {err}");
                not_found += 1;
            }
        }
    });
    if let Some(err) = failure {
        cache.invalidate();
        return Err(err);
    }

    let pixel_count = cache.geometry().pixel_count();
    if not_evaluated > 0 {
        warn!(
            "sobel filter: field could not be evaluated in element for {not_evaluated} out of {pixel_count} pixels"
        );
    }
    if not_found > 0 {
        warn!(
            "sobel filter: unable to find element:xi for {not_found} out of {pixel_count} pixels"
        );
    }
    cache.record_pass(not_found, not_evaluated);
    cache.apply_sobel_filter();
    *image_time = Some(time);
    debug!("sobel filter image rebuilt ({pixel_count} pixels)");
    Ok(())
}

/// Evaluation strategy of Sobel filter fields; element locations only.
pub(crate) fn evaluate(
    graph: &mut FieldGraph,
    id: FieldId,
    location: &Location,
    time: f64,
    need_derivatives: bool,
) -> Result<(), FieldError> {
    if location.is_node() {
        return Err(FieldError::not_defined(graph.field(id)?.name(), location));
    }
    let (parameters, mut image, mut image_time, mut raster) = match &mut graph.field_mut(id)?.kind {
        FieldKind::SobelFilter(data) => (
            data.parameters.clone(),
            data.image.take(),
            data.image_time,
            data.raster.take(),
        ),
        _ => {
            return Err(FieldError::argument(format!(
                "field {} is not a sobel filter field",
                id.0
            )));
        }
    };

    let refreshed = refresh_image(
        graph,
        &parameters,
        &mut image,
        &mut image_time,
        &mut raster,
        time,
    );
    if let FieldKind::SobelFilter(data) = &mut graph.field_mut(id)?.kind {
        data.image = image;
        data.image_time = image_time;
        data.raster = raster;
    }
    refreshed?;

    let texture = graph
        .evaluate(parameters.texture_coordinates, location, time, false)?
        .values;
    let values = {
        let field = graph.field(id)?;
        let FieldKind::SobelFilter(data) = field.kind() else {
            return Err(FieldError::argument(format!(
                "`{}` is not a sobel filter field",
                field.name()
            )));
        };
        let pixel = data.image.as_ref().and_then(|image| {
            image
                .geometry()
                .pixel_at(&texture)
                .and_then(|index| image.pixel(index))
        });
        match pixel {
            Some(pixel) => pixel.to_vec(),
            None => vec![graph.config().out_of_bounds_value; field.number_of_components()],
        }
    };
    graph.store_values(id, location, need_derivatives, &values)
}

impl FieldGraph {
    /// Image counters of a Sobel filter field; `None` before the first
    /// evaluation.
    pub fn image_statistics(&self, id: FieldId) -> Result<Option<ImageStatistics>, FieldError> {
        let field = self.field(id)?;
        match field.kind() {
            FieldKind::SobelFilter(data) => Ok(data.image_statistics()),
            _ => Err(FieldError::argument(format!(
                "`{}` is not a sobel filter field",
                field.name()
            ))),
        }
    }

    /// Whether the filtered image of a Sobel filter field is up to date.
    pub fn is_image_valid(&self, id: FieldId) -> Result<bool, FieldError> {
        let field = self.field(id)?;
        match field.kind() {
            FieldKind::SobelFilter(data) => Ok(data.is_image_valid()),
            _ => Err(FieldError::argument(format!(
                "`{}` is not a sobel filter field",
                field.name()
            ))),
        }
    }
}

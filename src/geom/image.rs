//! Regular pixel grids over texture coordinate space and the Sobel edge
//! filter applied to them.
//!
//! Pixels are stored with axis 0 varying fastest and the `depth` components
//! of one pixel interleaved: sample `k` of pixel `p` lives at
//! `data[p * depth + k]`.

use thiserror::Error;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Largest image dimension.
pub const MAXIMUM_IMAGE_DIMENSION: usize = 3;

const FILTER_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("image dimension must be 1..={MAXIMUM_IMAGE_DIMENSION}, got {0}")]
    InvalidDimension(usize),
    #[error("expected {expected} entries per axis, got {actual}")]
    AxisCountMismatch { expected: usize, actual: usize },
    #[error("axis {axis} needs at least one pixel")]
    EmptyAxis { axis: usize },
    #[error("axis {axis} range [{minimum}, {maximum}] is empty")]
    EmptyRange {
        axis: usize,
        minimum: f64,
        maximum: f64,
    },
    #[error("image depth must be positive")]
    ZeroDepth,
}

/// Pixel counts and texture coordinate bounds of a regular grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageGeometry {
    sizes: Vec<usize>,
    minimums: Vec<f64>,
    maximums: Vec<f64>,
}

impl ImageGeometry {
    pub fn new(sizes: &[usize], minimums: &[f64], maximums: &[f64]) -> Result<Self, ImageError> {
        let dimension = sizes.len();
        if dimension == 0 || dimension > MAXIMUM_IMAGE_DIMENSION {
            return Err(ImageError::InvalidDimension(dimension));
        }
        for actual in [minimums.len(), maximums.len()] {
            if actual != dimension {
                return Err(ImageError::AxisCountMismatch {
                    expected: dimension,
                    actual,
                });
            }
        }
        for axis in 0..dimension {
            if sizes[axis] == 0 {
                return Err(ImageError::EmptyAxis { axis });
            }
            if !(maximums[axis] > minimums[axis]) {
                return Err(ImageError::EmptyRange {
                    axis,
                    minimum: minimums[axis],
                    maximum: maximums[axis],
                });
            }
        }
        Ok(Self {
            sizes: sizes.to_vec(),
            minimums: minimums.to_vec(),
            maximums: maximums.to_vec(),
        })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.sizes.len()
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[must_use]
    pub fn minimums(&self) -> &[f64] {
        &self.minimums
    }

    #[must_use]
    pub fn maximums(&self) -> &[f64] {
        &self.maximums
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.sizes.iter().product()
    }

    /// Per-axis indices of the flat pixel `index`.
    #[must_use]
    pub fn pixel_indices(&self, index: usize) -> [usize; MAXIMUM_IMAGE_DIMENSION] {
        let mut indices = [0; MAXIMUM_IMAGE_DIMENSION];
        let mut rest = index;
        for (axis, size) in self.sizes.iter().enumerate() {
            indices[axis] = rest % size;
            rest /= size;
        }
        indices
    }

    /// Texture coordinates sampled by the flat pixel `index`: the first pixel
    /// sits on the minimum and the last on the maximum of each axis.
    #[must_use]
    pub fn pixel_coordinates(&self, index: usize) -> Vec<f64> {
        let indices = self.pixel_indices(index);
        (0..self.dimension())
            .map(|axis| {
                let size = self.sizes[axis];
                if size < 2 {
                    self.minimums[axis]
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let step = (self.maximums[axis] - self.minimums[axis]) / (size - 1) as f64;
                    #[allow(clippy::cast_precision_loss)]
                    let offset = indices[axis] as f64 * step;
                    self.minimums[axis] + offset
                }
            })
            .collect()
    }

    /// Flat pixel holding `coordinates`, or `None` when any coordinate lies
    /// outside `[minimum, maximum]`. The maximum maps onto the last pixel.
    #[must_use]
    pub fn pixel_at(&self, coordinates: &[f64]) -> Option<usize> {
        if coordinates.len() < self.dimension() {
            return None;
        }
        let mut offset = 0;
        for axis in (0..self.dimension()).rev() {
            let value = coordinates[axis];
            let (minimum, maximum) = (self.minimums[axis], self.maximums[axis]);
            if !(value >= minimum && value <= maximum) {
                return None;
            }
            let size = self.sizes[axis];
            let fraction = (value - minimum) / (maximum - minimum);
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let index = ((size as f64 * fraction).floor() as usize).min(size - 1);
            offset = offset * size + index;
        }
        Some(offset)
    }
}

/// Counters describing the most recent rasterisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageStatistics {
    /// Number of full rasterise-and-filter passes so far.
    pub rebuild_count: usize,
    /// Pixels of the last pass for which no element:xi was found.
    pub pixels_not_found: usize,
    /// Pixels of the last pass whose source field failed to evaluate.
    pub pixels_not_evaluated: usize,
}

/// A rasterised snapshot of a field over an [`ImageGeometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImageCache {
    geometry: ImageGeometry,
    depth: usize,
    data: Vec<f64>,
    valid: bool,
    statistics: ImageStatistics,
}

impl ImageCache {
    pub fn new(geometry: ImageGeometry, depth: usize) -> Result<Self, ImageError> {
        if depth == 0 {
            return Err(ImageError::ZeroDepth);
        }
        let data = vec![0.0; geometry.pixel_count() * depth];
        Ok(Self {
            geometry,
            depth,
            data,
            valid: false,
            statistics: ImageStatistics::default(),
        })
    }

    #[must_use]
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[must_use]
    pub const fn statistics(&self) -> ImageStatistics {
        self.statistics
    }

    /// Samples of one pixel.
    #[must_use]
    pub fn pixel(&self, index: usize) -> Option<&[f64]> {
        let start = index.checked_mul(self.depth)?;
        self.data.get(start..start + self.depth)
    }

    /// Replaces every sample and marks the image valid.
    ///
    /// `fill` is called once per pixel, in storage order, with the pixel's
    /// texture coordinates and its `depth` samples to overwrite.
    pub fn rasterize<F>(&mut self, mut fill: F)
    where
        F: FnMut(&[f64], &mut [f64]),
    {
        let depth = self.depth;
        for (index, samples) in self.data.chunks_mut(depth).enumerate() {
            let coordinates = self.geometry.pixel_coordinates(index);
            fill(&coordinates, samples);
        }
        self.valid = true;
    }

    pub(crate) fn record_pass(&mut self, pixels_not_found: usize, pixels_not_evaluated: usize) {
        self.statistics.rebuild_count += 1;
        self.statistics.pixels_not_found = pixels_not_found;
        self.statistics.pixels_not_evaluated = pixels_not_evaluated;
    }

    /// Applies [`sobel_filter`] in place.
    pub fn apply_sobel_filter(&mut self) {
        self.data = sobel_filter(&self.geometry, self.depth, &self.data);
    }
}

/// Stencil weights of pass `pass` over the `3^dimension` neighbourhood.
///
/// The pass axis carries the smoothing weights `1, 2, 1`; every other axis
/// carries the difference weights `-1, 0, 1`.
fn sobel_stencil(dimension: usize, pass: usize) -> Vec<f64> {
    let stencil_size = FILTER_SIZE.pow(u32::try_from(dimension).unwrap_or(3));
    let mut stencil = vec![1.0; stencil_size];
    let mut filter_step = 1;
    for axis in 0..dimension {
        for (j, weight) in stencil.iter_mut().enumerate() {
            let position = (j / filter_step) % FILTER_SIZE;
            if axis == pass {
                if position == 1 {
                    *weight *= 2.0;
                }
            } else {
                match position {
                    0 => *weight = -*weight,
                    1 => *weight = 0.0,
                    _ => {}
                }
            }
        }
        filter_step *= FILTER_SIZE;
    }
    stencil
}

/// Neighbour pixel of `indices` at stencil entry `j`, wrapping each axis.
fn stencil_neighbour(geometry: &ImageGeometry, indices: &[usize], j: usize) -> usize {
    let sizes = geometry.sizes();
    let mut offset = 0;
    let mut stride = 1;
    let mut filter_step = 1;
    for (axis, size) in sizes.iter().enumerate() {
        let shift = (j / filter_step) % FILTER_SIZE;
        // shift 0, 1, 2 means -1, 0, +1 along this axis
        let index = (indices[axis] + size + shift - 1) % size;
        offset += index * stride;
        stride *= size;
        filter_step *= FILTER_SIZE;
    }
    offset
}

fn sobel_pixel(
    geometry: &ImageGeometry,
    depth: usize,
    data: &[f64],
    stencils: &[Vec<f64>],
    pixel: usize,
) -> Vec<f64> {
    let indices = geometry.pixel_indices(pixel);
    let mut result = vec![0.0; depth];
    let mut sums = vec![0.0; depth];
    for stencil in stencils {
        sums.iter_mut().for_each(|sum| *sum = 0.0);
        for (j, weight) in stencil.iter().enumerate() {
            if *weight == 0.0 {
                continue;
            }
            let neighbour = stencil_neighbour(geometry, &indices, j) * depth;
            for k in 0..depth {
                sums[k] += weight * data[neighbour + k];
            }
        }
        for k in 0..depth {
            result[k] += sums[k].abs();
        }
    }
    result
}

/// N-dimensional Sobel filter with toroidal boundaries.
///
/// Every output sample is the sum over passes of the absolute directional
/// response, not the Euclidean gradient magnitude.
#[must_use]
pub fn sobel_filter(geometry: &ImageGeometry, depth: usize, data: &[f64]) -> Vec<f64> {
    let dimension = geometry.dimension();
    let stencils: Vec<Vec<f64>> = (0..dimension)
        .map(|pass| sobel_stencil(dimension, pass))
        .collect();
    let pixels = filter_pixels(geometry, depth, data, &stencils);
    pixels.into_iter().flatten().collect()
}

#[cfg(feature = "parallel")]
fn filter_pixels(
    geometry: &ImageGeometry,
    depth: usize,
    data: &[f64],
    stencils: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    (0..geometry.pixel_count())
        .into_par_iter()
        .map(|pixel| sobel_pixel(geometry, depth, data, stencils, pixel))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn filter_pixels(
    geometry: &ImageGeometry,
    depth: usize,
    data: &[f64],
    stencils: &[Vec<f64>],
) -> Vec<Vec<f64>> {
    (0..geometry.pixel_count())
        .map(|pixel| sobel_pixel(geometry, depth, data, stencils, pixel))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stencil_matches_classical_kernels_in_two_dimensions() {
        // Pass 0 smooths along axis 0 and differentiates along axis 1.
        assert_eq!(
            sobel_stencil(2, 0),
            vec![-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0]
        );
        assert_eq!(
            sobel_stencil(2, 1),
            vec![-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0]
        );
    }

    #[test]
    fn pixel_lookup_clamps_maximum_to_last_pixel() {
        let geometry = ImageGeometry::new(&[4, 2], &[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(geometry.pixel_at(&[0.0, 0.0]), Some(0));
        assert_eq!(geometry.pixel_at(&[1.0, 0.0]), Some(3));
        assert_eq!(geometry.pixel_at(&[0.3, 0.9]), Some(5));
        assert_eq!(geometry.pixel_at(&[1.0, 1.0]), Some(7));
        assert_eq!(geometry.pixel_at(&[1.01, 0.0]), None);
    }

    #[test]
    fn pixel_coordinates_span_bounds() {
        let geometry = ImageGeometry::new(&[3, 1], &[-1.0, 2.0], &[1.0, 5.0]).unwrap();
        assert_eq!(geometry.pixel_coordinates(0), vec![-1.0, 2.0]);
        assert_eq!(geometry.pixel_coordinates(1), vec![0.0, 2.0]);
        assert_eq!(geometry.pixel_coordinates(2), vec![1.0, 2.0]);
    }

    #[test]
    fn constant_image_has_no_edges() {
        let geometry = ImageGeometry::new(&[4, 3], &[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let data = vec![2.5; 12];
        assert!(sobel_filter(&geometry, 1, &data).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn vertical_step_lights_up_both_sides() {
        // Columns 0..2 are 0, columns 2..4 are 1; rows wrap around.
        let geometry = ImageGeometry::new(&[4, 4], &[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let data: Vec<f64> = (0..16).map(|p| if p % 4 >= 2 { 1.0 } else { 0.0 }).collect();
        let filtered = sobel_filter(&geometry, 1, &data);
        // Pixel (1, 0): left neighbour 0, right neighbour 1 -> |1 + 2 + 1| = 4.
        assert_eq!(filtered[1], 4.0);
        // Pixel (0, 0) wraps to column 3 on the left: |0 - 4| = 4.
        assert_eq!(filtered[0], 4.0);
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(matches!(
            ImageGeometry::new(&[], &[], &[]),
            Err(ImageError::InvalidDimension(0))
        ));
        assert!(matches!(
            ImageGeometry::new(&[2], &[1.0], &[1.0]),
            Err(ImageError::EmptyRange { .. })
        ));
        assert!(matches!(
            ImageGeometry::new(&[0], &[0.0], &[1.0]),
            Err(ImageError::EmptyAxis { axis: 0 })
        ));
    }
}

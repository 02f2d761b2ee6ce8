use crate::geom::{ImageCache, ImageGeometry, sobel_filter};

fn cube_geometry() -> ImageGeometry {
    ImageGeometry::new(&[5, 5, 5], &[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0]).expect("geometry")
}

fn is_interior(geometry: &ImageGeometry, index: usize) -> bool {
    let indices = geometry.pixel_indices(index);
    geometry
        .sizes()
        .iter()
        .zip(indices)
        .all(|(size, i)| i > 0 && i + 1 < *size)
}

#[test]
fn ramp_gives_uniform_interior_response() {
    let geometry = cube_geometry();
    let data: Vec<f64> = (0..geometry.pixel_count())
        .map(|index| geometry.pixel_coordinates(index)[0])
        .collect();
    let filtered = sobel_filter(&geometry, 1, &data);

    let interior: Vec<f64> = (0..geometry.pixel_count())
        .filter(|index| is_interior(&geometry, *index))
        .map(|index| filtered[index])
        .collect();
    assert_eq!(interior.len(), 27);
    assert!(interior[0] > 0.0);
    for value in &interior {
        assert!((value - interior[0]).abs() < 1e-12);
    }
}

#[test]
fn channels_are_filtered_independently() {
    let geometry = cube_geometry();
    let mut image = ImageCache::new(geometry.clone(), 2).expect("image");
    image.rasterize(|coordinates, pixel| {
        pixel[0] = 3.0;
        pixel[1] = coordinates[2];
    });
    image.apply_sobel_filter();

    let centre = (0..geometry.pixel_count())
        .find(|index| geometry.pixel_indices(*index)[..3] == [2, 2, 2])
        .expect("centre pixel");
    let pixel = image.pixel(centre).expect("pixel");
    assert_eq!(pixel[0], 0.0);
    assert!(pixel[1] > 0.0);
}

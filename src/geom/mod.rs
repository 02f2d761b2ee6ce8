//! Numeric building blocks of the field engine: tolerances, small dense
//! linear algebra, coordinate system conversion, the find-xi Newton solver
//! and regular image grids with the Sobel filter.

mod coordinates;
mod core;
mod find_xi;
mod image;
mod linalg;

pub use coordinates::{
    CoordinateError, CoordinateSystem, CoordinateSystemType, convert, convert_components,
    convert_with_jacobian,
};
pub use core::{Tolerance, norm, pad3};
pub use find_xi::{
    MAXIMUM_XI, NewtonFailure, NewtonSettings, XiPoint, XiSample, find_xi_in_element,
};
pub use image::{
    ImageCache, ImageError, ImageGeometry, ImageStatistics, MAXIMUM_IMAGE_DIMENSION,
    sobel_filter,
};
pub use linalg::{
    IDENTITY3, LinearAlgebraError, LuDecomposition, Matrix3, apply3, determinant3, invert3,
    multiply3, solve,
};

#[cfg(test)]
mod tests;

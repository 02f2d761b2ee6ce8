use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{
    CoordinateSystem, CoordinateSystemType, IDENTITY3, Tolerance, convert, convert_with_jacobian,
    multiply3,
};

fn curvilinear_systems() -> [CoordinateSystem; 4] {
    [
        CoordinateSystem::new(CoordinateSystemType::CylindricalPolar),
        CoordinateSystem::new(CoordinateSystemType::SphericalPolar),
        CoordinateSystem::with_focus(CoordinateSystemType::ProlateSpheroidal, 1.5),
        CoordinateSystem::with_focus(CoordinateSystemType::OblateSpheroidal, 1.5),
    ]
}

fn random_point(rng: &mut StdRng) -> [f64; 3] {
    // off every axis so all systems stay regular
    [
        rng.random_range(0.3..2.0),
        rng.random_range(0.3..2.0),
        rng.random_range(0.3..2.0),
    ]
}

#[test]
fn random_points_round_trip_through_curvilinear_systems() {
    let mut rng = StdRng::seed_from_u64(17);
    let rc = CoordinateSystem::RECTANGULAR_CARTESIAN;
    let tol = Tolerance::new(1e-9);
    for _ in 0..50 {
        let point = random_point(&mut rng);
        for system in curvilinear_systems() {
            let there = convert(point, &rc, &system);
            let back = convert(there, &system, &rc);
            assert!(
                tol.approx_eq_slice(&back, &point),
                "{system}: {point:?} came back as {back:?}"
            );
        }
    }
}

#[test]
fn forward_and_inverse_jacobians_multiply_to_identity() {
    let mut rng = StdRng::seed_from_u64(5);
    let rc = CoordinateSystem::RECTANGULAR_CARTESIAN;
    let tol = Tolerance::new(1e-7);
    for _ in 0..20 {
        let point = random_point(&mut rng);
        for system in curvilinear_systems() {
            let (there, forward) = convert_with_jacobian(point, &rc, &system).expect("forward");
            let (_, inverse) = convert_with_jacobian(there, &system, &rc).expect("inverse");
            let product = multiply3(&inverse, &forward);
            assert!(
                tol.approx_eq_slice(&product, &IDENTITY3),
                "{system}: {product:?}"
            );
        }
    }
}

#[test]
fn conversion_between_two_curvilinear_systems_goes_through_cartesian() {
    let rc = CoordinateSystem::RECTANGULAR_CARTESIAN;
    let cylindrical = CoordinateSystem::new(CoordinateSystemType::CylindricalPolar);
    let spherical = CoordinateSystem::new(CoordinateSystemType::SphericalPolar);
    let point = [1.0, 1.0, 1.0];

    let direct = convert(convert(point, &rc, &cylindrical), &cylindrical, &spherical);
    let via_cartesian = convert(point, &rc, &spherical);
    assert!(Tolerance::new(1e-12).approx_eq_slice(&direct, &via_cartesian));
}

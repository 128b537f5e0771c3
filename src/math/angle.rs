use super::Vector3d;
use cgmath::prelude::*;

/// The angle between two vectors in degrees, in the range `[0, 180]`.
///
/// Returns `0.0` if either vector has zero (or non-finite) length.
pub fn angle_between(a: Vector3d, b: Vector3d) -> f64 {
    let denom = a.magnitude() * b.magnitude();
    if !(denom > f64::EPSILON) || !denom.is_finite() {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Projects a vector onto the ground plane and normalises it.
/// Falls back to the x axis for vertical or zero vectors.
pub fn horizontal(vec: Vector3d) -> Vector3d {
    let flat = Vector3d::new(vec.x, vec.y, 0.0);
    let mag = flat.magnitude();
    if mag > f64::EPSILON && mag.is_finite() {
        flat / mag
    } else {
        Vector3d::unit_x()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn angles() {
        let x = Vector3d::new(1.0, 0.0, 0.0);
        assert_approx_eq!(angle_between(x, Vector3d::new(0.0, 3.0, 0.0)), 90.0);
        assert_approx_eq!(angle_between(x, Vector3d::new(1.0, 1.0, 0.0)), 45.0);
        assert_approx_eq!(angle_between(x, Vector3d::new(-2.0, 0.0, 0.0)), 180.0);
        assert_approx_eq!(angle_between(x, x * 4.0), 0.0);
        assert_eq!(angle_between(x, Vector3d::new(0.0, 0.0, 0.0)), 0.0);
    }
}

use super::{horizontal, Point3d, Vector3d};
use cgmath::prelude::*;

/// Returns `true` if `point` lies within `radius` of `origin`.
pub fn point_in_range(point: Point3d, origin: Point3d, radius: f64) -> bool {
    point.distance2(origin) <= radius * radius
}

/// Whether every coordinate of the point is finite.
pub fn is_finite(point: Point3d) -> bool {
    point.x.is_finite() && point.y.is_finite() && point.z.is_finite()
}

/// Projects a point onto a local coordinate system on the ground plane.
///
/// # Parameters
/// * `point` - The point to project
/// * `origin` - The origin of the coordinate system
/// * `heading` - The direction of the positive longitudinal axis
///
/// # Returns
/// The longitudinal and lateral offsets of the point. The lateral offset is
/// positive to the left of `heading`.
pub fn project_local(point: Point3d, origin: Point3d, heading: Vector3d) -> (f64, f64) {
    let y_axis = horizontal(heading);
    let x_axis = rot90(y_axis);
    let point = point - origin;
    (point.dot(y_axis), point.dot(x_axis))
}

/// Rotates a vector 90 degrees anticlockwise about the z axis.
pub fn rot90(vec: Vector3d) -> Vector3d {
    Vector3d::new(-vec.y, vec.x, 0.0)
}

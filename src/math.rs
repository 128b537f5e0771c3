//! Geometric primitives.

use cgmath::{Point3, Vector3};
pub use angle::{angle_between, horizontal};
pub use bounds::{Interval, OrientedBox};
pub use line::LineSegment3d;
pub use util::*;

mod angle;
mod bounds;
mod line;
mod util;

/// A 3D point. The ground plane is x/y and z is the elevation.
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

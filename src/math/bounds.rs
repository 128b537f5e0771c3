use super::{horizontal, rot90, Point3d, Vector3d};
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};

/// An interval on the real number line.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    /// Creates a new interval.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Creates an interval with the given centre and radius.
    pub fn disc(centre: f64, radius: f64) -> Self {
        Self::new(centre - radius, centre + radius)
    }

    /// The smallest interval containing all the values.
    pub fn enclosing(values: impl IntoIterator<Item = f64>) -> Self {
        values.into_iter().fold(
            Self::new(f64::INFINITY, f64::NEG_INFINITY),
            |acc, v| Self::new(acc.min.min(v), acc.max.max(v)),
        )
    }

    /// Returns true if this interval overlaps with the other.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether both ends are finite and in order.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// A box whose footprint is a rectangle on the ground plane,
/// rotated to the vehicle's heading, with a vertical extent.
#[derive(Copy, Clone, Debug)]
pub struct OrientedBox {
    centre: Point3d,
    forward: Vector3d,
    half_len: f64,
    half_wid: f64,
    vertical: Interval,
}

impl OrientedBox {
    /// Creates a box centred on `centre`, aligned with `heading`.
    pub fn new(centre: Point3d, heading: Vector3d, length: f64, width: f64, height: f64) -> Self {
        Self {
            centre,
            forward: horizontal(heading),
            half_len: 0.5 * length,
            half_wid: 0.5 * width,
            vertical: Interval::disc(centre.z, 0.5 * height),
        }
    }

    /// The centre of the box.
    pub fn centre(&self) -> Point3d {
        self.centre
    }

    /// The radius of a circle on the ground plane that encloses the footprint.
    pub fn radius(&self) -> f64 {
        self.half_len.hypot(self.half_wid)
    }

    /// The corners of the footprint.
    pub fn corners(&self) -> [Point3d; 4] {
        let long = self.forward * self.half_len;
        let lat = rot90(self.forward) * self.half_wid;
        let c = Point3d::new(self.centre.x, self.centre.y, 0.0);
        [c + long + lat, c + long - lat, c - long - lat, c - long + lat]
    }

    /// Whether the point lies inside the box.
    pub fn contains_point(&self, point: Point3d) -> bool {
        if !self.vertical.contains(point.z) {
            return false;
        }
        let offset = Vector3d::new(point.x - self.centre.x, point.y - self.centre.y, 0.0);
        offset.dot(self.forward).abs() <= self.half_len
            && offset.dot(rot90(self.forward)).abs() <= self.half_wid
    }

    /// Whether two boxes overlap, using the separating axis theorem on the ground plane.
    pub fn overlaps(&self, other: &Self) -> bool {
        if !self.vertical.overlaps(&other.vertical) {
            return false;
        }
        let (a, b) = (self.corners(), other.corners());
        let axes = [
            self.forward,
            rot90(self.forward),
            other.forward,
            rot90(other.forward),
        ];
        axes.iter().all(|axis| {
            let pa = Interval::enclosing(a.iter().map(|p| p.to_vec().dot(*axis)));
            let pb = Interval::enclosing(b.iter().map(|p| p.to_vec().dot(*axis)));
            pa.overlaps(&pb)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn car(x: f64, y: f64, heading: Vector3d) -> OrientedBox {
        OrientedBox::new(Point3d::new(x, y, 0.0), heading, 4.0, 2.0, 1.5)
    }

    #[test]
    fn interval_overlap() {
        let a = Interval::new(0.0, 2.0);
        assert!(a.overlaps(&Interval::new(1.0, 3.0)));
        assert!(!a.overlaps(&Interval::new(2.0, 3.0)));
        assert!(a.contains(2.0));
        assert_eq!(Interval::enclosing([3.0, -1.0, 2.0]), Interval::new(-1.0, 3.0));
    }

    #[test]
    fn aligned_boxes() {
        let x = Vector3d::unit_x();
        assert!(car(0.0, 0.0, x).overlaps(&car(3.9, 0.0, x)));
        assert!(!car(0.0, 0.0, x).overlaps(&car(4.1, 0.0, x)));
        assert!(!car(0.0, 0.0, x).overlaps(&car(0.0, 2.1, x)));
    }

    #[test]
    fn rotated_boxes() {
        let x = Vector3d::unit_x();
        let diag = Vector3d::new(1.0, 1.0, 0.0);
        // The rotated box's corner reaches ~2.12 along x from its centre
        assert!(car(0.0, 0.0, x).overlaps(&car(4.0, 0.0, diag)));
        assert!(!car(0.0, 0.0, x).overlaps(&car(4.3, 0.0, diag)));
    }

    #[test]
    fn vertical_separation() {
        let x = Vector3d::unit_x();
        let low = car(0.0, 0.0, x);
        let high = OrientedBox::new(Point3d::new(0.0, 0.0, 10.0), x, 4.0, 2.0, 1.5);
        assert!(!low.overlaps(&high));
    }

    #[test]
    fn point_containment() {
        let b = car(0.0, 0.0, Vector3d::unit_y());
        assert!(b.contains_point(Point3d::new(0.9, 1.9, 0.0)));
        assert!(!b.contains_point(Point3d::new(1.1, 0.0, 0.0)));
        assert!(!b.contains_point(Point3d::new(0.0, 0.0, 1.0)));
    }
}

use super::{Point3d, Vector3d};
use cgmath::prelude::*;

/// A straight line segment between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment3d {
    pub start: Point3d,
    pub end: Point3d,
}

impl LineSegment3d {
    /// Creates a line segment from its end points.
    pub const fn from_ends(start: Point3d, end: Point3d) -> Self {
        Self { start, end }
    }

    /// The length of the line segment.
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// The vector from the start to the end of the segment.
    pub fn delta(&self) -> Vector3d {
        self.end - self.start
    }

    /// A unit vector pointing from the start to the end,
    /// or `None` if the segment has no usable length.
    pub fn direction(&self) -> Option<Vector3d> {
        let length = self.length();
        if length > f64::EPSILON && length.is_finite() {
            Some(self.delta() / length)
        } else {
            None
        }
    }

    /// The point `distance` units along the line from its start.
    /// Distances outside of `[0, length]` extrapolate along the line.
    pub fn point_at(&self, distance: f64) -> Point3d {
        match self.direction() {
            Some(dir) => self.start + dir * distance,
            None => self.start,
        }
    }

    /// The distance along the segment of the point closest to `point`,
    /// clamped to `[0, length]`.
    pub fn project(&self, point: Point3d) -> f64 {
        match self.direction() {
            Some(dir) => (point - self.start).dot(dir).clamp(0.0, self.length()),
            None => 0.0,
        }
    }

    /// The point on the segment closest to `point`.
    pub fn closest_point(&self, point: Point3d) -> Point3d {
        self.point_at(self.project(point))
    }

    /// The shortest distance between `point` and the segment.
    pub fn distance_to(&self, point: Point3d) -> f64 {
        self.closest_point(point).distance(point)
    }

    /// Points spaced `spacing` apart from the start of the segment,
    /// always finishing with the end point.
    pub fn sample_points(&self, spacing: f64) -> Vec<Point3d> {
        let length = self.length();
        let Some(dir) = self.direction() else {
            return vec![self.start];
        };
        let mut points = (0..)
            .map(|i| i as f64 * spacing)
            .take_while(|pos| *pos < length)
            .map(|pos| self.start + dir * pos)
            .collect::<Vec<_>>();
        points.push(self.end);
        points
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn line() -> LineSegment3d {
        LineSegment3d::from_ends(Point3d::new(0.0, 0.0, 0.0), Point3d::new(30.0, 40.0, 0.0))
    }

    #[test]
    fn projection_is_clamped() {
        let line = line();
        assert_approx_eq!(line.length(), 50.0);
        assert_approx_eq!(line.project(Point3d::new(-10.0, -10.0, 0.0)), 0.0);
        assert_approx_eq!(line.project(Point3d::new(300.0, 400.0, 0.0)), 50.0);
        assert_approx_eq!(line.project(Point3d::new(3.0, 4.0, 7.0)), 5.0);
        assert_approx_eq!(line.distance_to(Point3d::new(3.0, 4.0, 7.0)), 7.0);
    }

    #[test]
    fn samples_are_monotonic() {
        let line = line();
        let samples = line.sample_points(4.0);
        assert_eq!(samples.len(), 14);
        assert_eq!(*samples.last().unwrap(), line.end);
        for pair in samples.windows(2) {
            assert!(line.project(pair[1]) > line.project(pair[0]));
        }
    }

    #[test]
    fn zero_length_line() {
        let p = Point3d::new(1.0, 1.0, 1.0);
        let line = LineSegment3d::from_ends(p, p);
        assert!(line.direction().is_none());
        assert_eq!(line.point_at(10.0), p);
        assert_eq!(line.sample_points(2.0), vec![p]);
    }
}

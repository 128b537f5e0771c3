use crate::entity::{Disposable, Positioned};
use crate::error::ConfigError;
use crate::generator::VehicleGenerator;
use crate::math::{is_finite, LineSegment3d, Point3d, Vector3d};
use crate::signal::TrafficFlowControl;
use crate::{SegmentId, VehicleId};
use log::warn;
use smallvec::SmallVec;

/// Segments shorter than this are considered to have zero length.
const MIN_SEGMENT_LENGTH: f64 = 1e-6;

/// The default width of a segment.
const DEFAULT_WIDTH: f64 = 3.5;

/// A directed edge of the road network, travelled from start to end.
#[derive(Clone, Debug)]
pub struct RoadSegment {
    /// The segment ID.
    id: SegmentId,
    /// The centre line of the segment.
    line: LineSegment3d,
    /// The width of the segment.
    width: f64,
    /// Speed limit, infinite if unset.
    speed_limit: f64,
    /// Whether vehicles enter the network here.
    is_inlet: bool,
    /// Whether the segment is a merge lane.
    is_merge_lane: bool,
    /// Segments with the same road name are candidates for lane changing.
    road_name: Option<String>,
    /// Points spaced evenly along the segment, from start to end.
    samples: Vec<Point3d>,
    /// The vehicles on the segment.
    vehicles: SmallVec<[VehicleId; 8]>,
    /// A signal at the end of the segment.
    signal: Option<TrafficFlowControl>,
    /// A generator spawning vehicles at the start of the segment.
    generator: Option<VehicleGenerator>,
    /// Set if the geometry is unusable for heading calculations.
    degeneracy: Option<Degeneracy>,
    /// Whether this is a temporary connector created for a lane change.
    synthetic: bool,
}

/// The attributes of a segment.
#[derive(Clone, Debug)]
pub struct SegmentAttributes {
    pub start: Point3d,
    pub end: Point3d,
    /// The width, or a default width if `None`.
    pub width: Option<f64>,
    /// The speed limit, or no limit if `None`.
    pub speed_limit: Option<f64>,
    pub road_name: Option<String>,
    pub is_inlet: bool,
    pub is_merge_lane: bool,
}

/// Why a segment's geometry can't be used for heading calculations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Degeneracy {
    /// The start and end coincide.
    ZeroLength,
    /// A coordinate is NaN or infinite.
    NonFinite,
}

impl SegmentAttributes {
    /// Attributes of an unnamed segment with no speed limit.
    pub fn new(start: Point3d, end: Point3d) -> Self {
        Self {
            start,
            end,
            width: None,
            speed_limit: None,
            road_name: None,
            is_inlet: false,
            is_merge_lane: false,
        }
    }

    pub fn with_speed_limit(self, speed_limit: f64) -> Self {
        Self {
            speed_limit: Some(speed_limit),
            ..self
        }
    }

    pub fn with_road_name(self, road_name: impl Into<String>) -> Self {
        Self {
            road_name: Some(road_name.into()),
            ..self
        }
    }

    /// Rejects negative or NaN widths and speed limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(width) = self.width {
            ConfigError::check_non_negative("width", width)?;
        }
        if let Some(limit) = self.speed_limit {
            ConfigError::check_limit("speed_limit", limit)?;
        }
        Ok(())
    }
}

impl RoadSegment {
    /// Creates a new segment. The attributes must have been validated.
    pub(crate) fn new(id: SegmentId, attribs: &SegmentAttributes, sample_spacing: f64) -> Self {
        let line = LineSegment3d::from_ends(attribs.start, attribs.end);
        let degeneracy = if !is_finite(attribs.start) || !is_finite(attribs.end) {
            Some(Degeneracy::NonFinite)
        } else if line.length() < MIN_SEGMENT_LENGTH {
            Some(Degeneracy::ZeroLength)
        } else {
            None
        };
        if let Some(degeneracy) = degeneracy {
            warn!(
                "segment {:?} from {:?} to {:?} is degenerate ({:?})",
                id, attribs.start, attribs.end, degeneracy
            );
        }
        let samples = match degeneracy {
            None => line.sample_points(sample_spacing),
            Some(Degeneracy::ZeroLength) => vec![attribs.start],
            Some(Degeneracy::NonFinite) => vec![],
        };
        Self {
            id,
            line,
            width: attribs.width.unwrap_or(DEFAULT_WIDTH),
            speed_limit: attribs.speed_limit.unwrap_or(f64::INFINITY),
            is_inlet: attribs.is_inlet,
            is_merge_lane: attribs.is_merge_lane,
            road_name: attribs.road_name.clone(),
            samples,
            vehicles: SmallVec::new(),
            signal: None,
            generator: None,
            degeneracy,
            synthetic: false,
        }
    }

    /// Creates a temporary connector used by a vehicle changing lanes.
    pub(crate) fn connector(
        id: SegmentId,
        start: Point3d,
        end: Point3d,
        width: f64,
        speed_limit: f64,
        sample_spacing: f64,
    ) -> Self {
        let attribs = SegmentAttributes {
            width: Some(width),
            speed_limit: Some(speed_limit),
            ..SegmentAttributes::new(start, end)
        };
        Self {
            synthetic: true,
            ..Self::new(id, &attribs, sample_spacing)
        }
    }

    /// Gets the segment's ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn start(&self) -> Point3d {
        self.line.start
    }

    pub fn end(&self) -> Point3d {
        self.line.end
    }

    /// The centre line of the segment.
    pub fn line(&self) -> &LineSegment3d {
        &self.line
    }

    /// Gets the length of the segment.
    pub fn length(&self) -> f64 {
        match self.degeneracy {
            Some(Degeneracy::NonFinite) => 0.0,
            _ => self.line.length(),
        }
    }

    /// A unit vector in the direction of travel, if the segment isn't degenerate.
    pub fn direction(&self) -> Option<Vector3d> {
        match self.degeneracy {
            None => self.line.direction(),
            Some(_) => None,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    /// The speed limit, infinite if there is none.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn is_inlet(&self) -> bool {
        self.is_inlet
    }

    pub fn is_merge_lane(&self) -> bool {
        self.is_merge_lane
    }

    pub fn road_name(&self) -> Option<&str> {
        self.road_name.as_deref()
    }

    /// Points spaced evenly along the segment, ordered from start to end.
    pub fn samples(&self) -> &[Point3d] {
        &self.samples
    }

    /// The vehicles currently on the segment.
    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    /// The signal at the end of the segment.
    pub fn signal(&self) -> Option<&TrafficFlowControl> {
        self.signal.as_ref()
    }

    /// The generator at the start of the segment.
    pub fn generator(&self) -> Option<&VehicleGenerator> {
        self.generator.as_ref()
    }

    pub fn degeneracy(&self) -> Option<Degeneracy> {
        self.degeneracy
    }

    pub fn is_degenerate(&self) -> bool {
        self.degeneracy.is_some()
    }

    /// Whether this is a temporary lane change connector.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// The point `pos` units along the segment.
    pub fn point_at(&self, pos: f64) -> Point3d {
        self.line.point_at(pos)
    }

    /// The distance along the segment of the point closest to `point`.
    pub fn project(&self, point: Point3d) -> f64 {
        self.line.project(point)
    }

    /// The distance left to travel from the point closest to `point` to the end.
    pub fn remaining_from(&self, point: Point3d) -> f64 {
        self.length() - self.project(point)
    }

    pub(crate) fn set_signal(&mut self, mut signal: TrafficFlowControl) {
        signal.set_location(self.end());
        self.signal = Some(signal);
    }

    pub(crate) fn signal_mut(&mut self) -> Option<&mut TrafficFlowControl> {
        self.signal.as_mut()
    }

    pub(crate) fn set_generator(&mut self, generator: VehicleGenerator) {
        self.generator = Some(generator);
    }

    pub(crate) fn generator_mut(&mut self) -> Option<&mut VehicleGenerator> {
        self.generator.as_mut()
    }

    /// Adds a vehicle to the segment, if it isn't already on it.
    pub(crate) fn insert_vehicle(&mut self, id: VehicleId) {
        if !self.vehicles.contains(&id) {
            self.vehicles.push(id);
        }
    }

    /// Removes the vehicle with the given ID from the segment.
    pub(crate) fn remove_vehicle(&mut self, id: VehicleId) {
        self.vehicles.retain(|v| *v != id);
    }
}

impl Positioned for RoadSegment {
    fn location(&self) -> Point3d {
        self.start()
    }
}

impl Disposable for RoadSegment {
    /// Lane change connectors are discarded once nobody is using them.
    fn is_disposable(&self, _now_ms: f64) -> bool {
        self.synthetic && self.vehicles.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use slotmap::KeyData;

    fn id() -> SegmentId {
        SegmentId::from(KeyData::from_ffi(1))
    }

    #[test]
    fn straight_segment() {
        let attribs = SegmentAttributes::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(0.0, 12.0, 0.0),
        );
        let segment = RoadSegment::new(id(), &attribs, 5.0);
        assert_approx_eq!(segment.length(), 12.0);
        assert_eq!(segment.speed_limit(), f64::INFINITY);
        assert_eq!(segment.samples().len(), 4);
        assert_approx_eq!(segment.remaining_from(Point3d::new(3.0, 4.0, 0.0)), 8.0);
        assert!(!segment.is_degenerate());
    }

    #[test]
    fn degenerate_segments() {
        let p = Point3d::new(5.0, 5.0, 0.0);
        let zero = RoadSegment::new(id(), &SegmentAttributes::new(p, p), 5.0);
        assert_eq!(zero.degeneracy(), Some(Degeneracy::ZeroLength));
        assert!(zero.direction().is_none());
        assert_eq!(zero.length(), 0.0);

        let nan = Point3d::new(f64::NAN, 0.0, 0.0);
        let broken = RoadSegment::new(id(), &SegmentAttributes::new(p, nan), 5.0);
        assert_eq!(broken.degeneracy(), Some(Degeneracy::NonFinite));
        assert_eq!(broken.length(), 0.0);
        assert!(broken.samples().is_empty());
    }

    #[test]
    fn invalid_attributes() {
        let p = Point3d::new(0.0, 0.0, 0.0);
        let q = Point3d::new(1.0, 0.0, 0.0);
        assert!(SegmentAttributes::new(p, q).with_speed_limit(-5.0).validate().is_err());
        assert!(SegmentAttributes::new(p, q).with_speed_limit(f64::NAN).validate().is_err());
        assert!(SegmentAttributes::new(p, q).with_speed_limit(f64::INFINITY).validate().is_ok());
    }

    #[test]
    fn vehicle_membership_is_a_set() {
        let attribs = SegmentAttributes::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 0.0, 0.0),
        );
        let mut segment = RoadSegment::new(id(), &attribs, 5.0);
        let vehicle = VehicleId::from(KeyData::from_ffi(1));
        segment.insert_vehicle(vehicle);
        segment.insert_vehicle(vehicle);
        assert_eq!(segment.vehicles(), &[vehicle]);
        segment.remove_vehicle(vehicle);
        assert!(segment.vehicles().is_empty());
    }
}

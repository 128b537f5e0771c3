use crate::network::RoadNetwork;
use crate::vehicle::Vehicle;
use crate::SegmentId;

/// A contiguous run of segments of the same road, each ending where the next starts.
#[derive(Clone, Debug, PartialEq)]
pub struct Lane {
    segments: Vec<SegmentId>,
    length: f64,
}

/// The segments sharing a road name, grouped into lanes.
#[derive(Clone, Debug)]
pub struct Road {
    name: String,
    segments: Vec<SegmentId>,
    lanes: Vec<Lane>,
}

impl Lane {
    pub(crate) fn new(segments: Vec<SegmentId>, length: f64) -> Self {
        Self { segments, length }
    }

    /// The segments of the lane in driving order.
    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    /// The total length of the lane.
    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn contains(&self, segment: SegmentId) -> bool {
        self.segments.contains(&segment)
    }

    /// The vehicles on the lane, in the order of the segments they're on.
    pub fn vehicles<'a>(&'a self, network: &'a RoadNetwork) -> impl Iterator<Item = &'a Vehicle> {
        self.segments
            .iter()
            .filter_map(move |id| network.segment(*id))
            .flat_map(|segment| segment.vehicles().iter())
            .filter_map(move |id| network.vehicle(*id))
    }
}

impl Road {
    pub(crate) fn new(name: String, segments: Vec<SegmentId>, lanes: Vec<Lane>) -> Self {
        Self {
            name,
            segments,
            lanes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> &[SegmentId] {
        &self.segments
    }

    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    /// Whether the segment belongs to the road.
    pub fn contains(&self, segment: SegmentId) -> bool {
        self.segments.contains(&segment)
    }

    /// The lane holding the given segment.
    pub fn lane_of(&self, segment: SegmentId) -> Option<&Lane> {
        self.lanes.iter().find(|lane| lane.contains(segment))
    }
}

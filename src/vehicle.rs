use crate::entity::{Disposable, Positioned};
use crate::error::ConfigError;
use crate::math::{is_finite, OrientedBox, Point3d, Vector3d};
use crate::segment::RoadSegment;
use crate::{SegmentId, VehicleId};
pub use decision::{Decision, DecisionEngine, Hazard, LaneChangePlan};
use log::warn;

mod decision;
pub(crate) mod kinematics;

/// A simulated vehicle.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID
    id: VehicleId,
    /// Half the vehicle's width.
    half_wid: f64,
    /// Half the vehicle's length.
    half_len: f64,
    height: f64,
    max_speed: f64,
    /// The acceleration rate in units/s^2.
    acc: f64,
    /// The comfortable deceleration rate in units/s^2, a positive number.
    dec: f64,
    /// Reaction time in s.
    reaction_time: f64,
    /// The segment the vehicle is travelling on.
    segment: SegmentId,
    /// The distance along the current segment.
    pos: f64,
    /// The world space coordinates of the centre of the vehicle.
    location: Point3d,
    /// A unit vector aligned with the vehicle's heading.
    heading: Vector3d,
    speed: f64,
    /// The speed the vehicle is trying to reach.
    target_speed: f64,
    /// The deceleration used when slowing to the target speed.
    brake_rate: f64,
    state: VehicleState,
    /// The in-progress lane change, if there is one.
    lane_change: Option<LaneChange>,
    /// The earliest time the vehicle may begin another lane change, in ms.
    lane_change_ready_at: f64,
    /// When the vehicle last made a decision, in ms.
    last_decision_at: Option<f64>,
    crashed_at: Option<f64>,
    /// When a crashed vehicle is removed from the network, in ms.
    crash_cleanup_at: Option<f64>,
    /// Set once the vehicle's geometry has become unusable. A flagged vehicle
    /// never advances.
    flagged: bool,
}

/// The attributes of a simulated vehicle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleAttributes {
    pub width: f64,
    pub length: f64,
    pub height: f64,
    /// The fastest the vehicle will ever travel.
    pub max_speed: f64,
    /// The acceleration rate in units/s^2.
    pub acceleration: f64,
    /// The comfortable deceleration rate in units/s^2, a positive number.
    pub deceleration: f64,
    /// Reaction time in s.
    pub reaction_time: f64,
}

/// What a vehicle is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VehicleState {
    Stopped,
    Accelerating,
    Decelerating,
    ChangingLane,
    Crashed,
}

/// An in-progress lane change.
///
/// The vehicle drives along a temporary `connector` segment which ends
/// `destination_pos` units along the `destination` segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneChange {
    pub(crate) connector: SegmentId,
    pub(crate) origin: SegmentId,
    pub(crate) destination: SegmentId,
    pub(crate) destination_pos: f64,
}

impl LaneChange {
    /// The temporary segment the vehicle drives along.
    pub fn connector(&self) -> SegmentId {
        self.connector
    }

    /// The segment the vehicle left.
    pub fn origin(&self) -> SegmentId {
        self.origin
    }

    /// The segment the vehicle is moving onto.
    pub fn destination(&self) -> SegmentId {
        self.destination
    }

    /// Where the vehicle joins the destination segment.
    pub fn destination_pos(&self) -> f64 {
        self.destination_pos
    }
}

impl Default for VehicleAttributes {
    fn default() -> Self {
        Self {
            width: 2.0,
            length: 4.5,
            height: 1.5,
            max_speed: 40.0,
            acceleration: 3.0,
            deceleration: 6.0,
            reaction_time: 0.5,
        }
    }
}

impl VehicleAttributes {
    /// Checks that every attribute is finite and positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("vehicle.width", self.width)?;
        ConfigError::check_positive("vehicle.length", self.length)?;
        ConfigError::check_positive("vehicle.height", self.height)?;
        ConfigError::check_positive("vehicle.max_speed", self.max_speed)?;
        ConfigError::check_positive("vehicle.acceleration", self.acceleration)?;
        ConfigError::check_positive("vehicle.deceleration", self.deceleration)?;
        ConfigError::check_positive("vehicle.reaction_time", self.reaction_time)?;
        Ok(())
    }
}

impl Vehicle {
    /// Creates a stationary vehicle `pos` units along `segment`.
    pub(crate) fn new(
        id: VehicleId,
        attributes: &VehicleAttributes,
        segment: &RoadSegment,
        pos: f64,
    ) -> Self {
        let mut vehicle = Self {
            id,
            half_wid: 0.5 * attributes.width,
            half_len: 0.5 * attributes.length,
            height: attributes.height,
            max_speed: attributes.max_speed,
            acc: attributes.acceleration,
            dec: attributes.deceleration,
            reaction_time: attributes.reaction_time,
            segment: segment.id(),
            pos,
            location: Point3d::new(0.0, 0.0, 0.0),
            heading: Vector3d::unit_x(),
            speed: 0.0,
            target_speed: 0.0,
            brake_rate: attributes.deceleration,
            state: VehicleState::Stopped,
            lane_change: None,
            lane_change_ready_at: 0.0,
            last_decision_at: None,
            crashed_at: None,
            crash_cleanup_at: None,
            flagged: false,
        };
        vehicle.update_coords(segment);
        vehicle
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn width(&self) -> f64 {
        2.0 * self.half_wid
    }

    pub fn length(&self) -> f64 {
        2.0 * self.half_len
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn acceleration(&self) -> f64 {
        self.acc
    }

    pub fn deceleration(&self) -> f64 {
        self.dec
    }

    /// Reaction time in s.
    pub fn reaction_time(&self) -> f64 {
        self.reaction_time
    }

    /// The ID of the segment the vehicle is travelling on.
    pub fn segment_id(&self) -> SegmentId {
        self.segment
    }

    /// The distance travelled along the current segment.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// A unit vector aligned with the vehicle's heading.
    pub fn heading(&self) -> Vector3d {
        self.heading
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// The speed the vehicle is trying to reach.
    pub fn target_speed(&self) -> f64 {
        self.target_speed
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn lane_change(&self) -> Option<LaneChange> {
        self.lane_change
    }

    /// The earliest time the vehicle may change lanes again, in ms.
    pub fn lane_change_ready_at(&self) -> f64 {
        self.lane_change_ready_at
    }

    pub fn crashed_at(&self) -> Option<f64> {
        self.crashed_at
    }

    /// When the vehicle will be removed, if it has crashed.
    pub fn crash_cleanup_at(&self) -> Option<f64> {
        self.crash_cleanup_at
    }

    pub fn is_crashed(&self) -> bool {
        self.state == VehicleState::Crashed
    }

    /// Whether the vehicle has stopped advancing because of unusable geometry.
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    /// The vehicle's bounding box.
    pub fn bounds(&self) -> OrientedBox {
        OrientedBox::new(
            self.location,
            self.heading,
            self.length(),
            self.width(),
            self.height,
        )
    }

    /// The distance ahead the vehicle pays attention to.
    pub fn lookahead_distance(&self, stop_speed: f64) -> f64 {
        kinematics::lookahead_distance(
            self.speed,
            self.dec,
            self.reaction_time,
            self.length(),
            stop_speed,
        )
    }

    /// The comfortable stopping distance of the vehicle.
    pub fn stopping_distance(&self) -> f64 {
        kinematics::stopping_distance(self.speed, self.dec)
    }

    /// Whether the vehicle should decide again at time `now_ms`.
    ///
    /// Decisions are made at most once per reaction time.
    pub(crate) fn decision_due(&self, now_ms: f64) -> bool {
        if self.is_crashed() || self.flagged {
            return false;
        }
        match self.last_decision_at {
            Some(last) => now_ms - last >= 1000.0 * self.reaction_time,
            None => true,
        }
    }

    /// Adopts the outcome of a decision made at time `now_ms`.
    pub(crate) fn apply_decision(&mut self, decision: &Decision, now_ms: f64) {
        self.last_decision_at = Some(now_ms);
        self.target_speed = decision.target_speed;
        self.brake_rate = decision.brake_rate;
        self.state = match decision.state {
            // Becomes `ChangingLane` once the connector exists
            VehicleState::ChangingLane if self.lane_change.is_none() => {
                VehicleState::Decelerating
            }
            state => state,
        };
    }

    /// Integrates the vehicle's speed and position.
    ///
    /// # Parameters
    /// * `dt` - The time step in seconds
    pub(crate) fn integrate(&mut self, dt: f64) {
        if self.flagged || self.is_crashed() {
            return;
        }
        let (speed, travelled) =
            kinematics::integrate(self.speed, self.target_speed, self.acc, self.brake_rate, dt);
        if !speed.is_finite() || !travelled.is_finite() {
            self.flag();
            return;
        }
        self.speed = speed;
        self.pos += travelled;
    }

    /// Slows a crashed vehicle to a halt.
    pub(crate) fn decay(&mut self, dt: f64, decay_factor: f64) {
        if !self.is_crashed() || self.flagged {
            return;
        }
        let (speed, travelled) =
            kinematics::integrate(self.speed, 0.0, 0.0, decay_factor * self.dec, dt);
        if speed.is_finite() && travelled.is_finite() {
            self.speed = speed;
            self.pos += travelled;
        }
    }

    /// Updates the vehicle's world coordinates from its position along `segment`.
    pub(crate) fn update_coords(&mut self, segment: &RoadSegment) {
        let location = segment.point_at(self.pos);
        if !is_finite(location) {
            self.flag();
            return;
        }
        self.location = location;
        if let Some(dir) = segment.direction() {
            self.heading = dir;
        }
    }

    /// Moves the vehicle to `pos` units along another segment.
    pub(crate) fn place(&mut self, segment: &RoadSegment, pos: f64) {
        self.segment = segment.id();
        self.pos = pos;
        self.update_coords(segment);
    }

    /// Sets the speed directly, e.g. when placing a vehicle by hand.
    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
        self.target_speed = speed;
    }

    pub(crate) fn begin_lane_change(
        &mut self,
        lane_change: LaneChange,
        connector: &RoadSegment,
        ready_at: f64,
    ) {
        self.lane_change = Some(lane_change);
        self.lane_change_ready_at = ready_at;
        self.state = VehicleState::ChangingLane;
        self.place(connector, 0.0);
    }

    pub(crate) fn finish_lane_change(&mut self, destination: &RoadSegment, pos: f64) {
        self.lane_change = None;
        if !self.is_crashed() {
            self.state = if self.speed < self.target_speed {
                VehicleState::Accelerating
            } else {
                VehicleState::Decelerating
            };
        }
        self.place(destination, pos);
    }

    /// Marks the vehicle as crashed. Crashing again has no effect.
    ///
    /// Returns `true` iff the vehicle wasn't already crashed.
    pub(crate) fn crash(&mut self, now_ms: f64, cleanup_at: f64) -> bool {
        if self.is_crashed() {
            return false;
        }
        self.state = VehicleState::Crashed;
        self.crashed_at = Some(now_ms);
        self.crash_cleanup_at = Some(cleanup_at);
        self.target_speed = 0.0;
        true
    }

    /// Stops the vehicle from advancing.
    pub(crate) fn flag(&mut self) {
        if !self.flagged {
            warn!("vehicle {:?} has non-finite kinematics and is halted", self.id);
        }
        self.flagged = true;
    }
}

impl Positioned for Vehicle {
    fn location(&self) -> Point3d {
        self.location
    }
}

impl Disposable for Vehicle {
    /// A crashed vehicle is removed once its cleanup deadline has passed.
    fn is_disposable(&self, now_ms: f64) -> bool {
        self.crash_cleanup_at.map_or(false, |at| now_ms >= at)
    }
}

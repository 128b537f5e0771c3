//! Per-vehicle decision making: what lies ahead, and how to respond to it.

use super::{kinematics, Vehicle, VehicleState};
use crate::config::SimulationConfig;
use crate::entity::Positioned;
use crate::math::{angle_between, project_local, Point3d};
use crate::network::RoadNetwork;
use crate::{SegmentId, VehicleId};
use cgmath::MetricSpace;
use smallvec::SmallVec;

/// A lane change connector ends at least this many vehicle lengths ahead.
const LANE_CHANGE_LENGTHS: f64 = 2.0;

/// Something ahead of a vehicle that limits its speed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Hazard {
    /// A stopped or slower vehicle in the way.
    /// `speed` is zero if the vehicle is stopped or crashed.
    Vehicle {
        id: VehicleId,
        distance: f64,
        speed: f64,
    },
    /// A signal telling the vehicle to stop.
    Signal { segment: SegmentId, distance: f64 },
    /// A change of heading at the end of the current segment.
    Cornering {
        /// The heading change in degrees.
        heading_change: f64,
        max_speed: f64,
        distance: f64,
    },
    /// A speed limit lower than the vehicle's speed.
    SpeedLimit { limit: f64, distance: f64 },
}

/// A lane change chosen by the [DecisionEngine].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneChangePlan {
    /// The parallel segment to move onto.
    pub destination: SegmentId,
    /// Where the vehicle joins the destination, as a distance along it.
    pub destination_pos: f64,
    /// The sample point at `destination_pos`.
    pub target: Point3d,
}

/// The outcome of a vehicle's decision.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    pub state: VehicleState,
    pub target_speed: f64,
    /// The deceleration to use while slowing to the target speed.
    pub brake_rate: f64,
    pub lane_change: Option<LaneChangePlan>,
    /// The hazards the decision responded to.
    pub hazards: SmallVec<[Hazard; 4]>,
}

/// Decides what each vehicle does next, from a read-only view of the network.
pub struct DecisionEngine<'a> {
    network: &'a RoadNetwork,
    config: &'a SimulationConfig,
}

/// Where a vehicle's path ahead starts: the segment it reasons about, the
/// point on that segment, and the distance already covered to reach it.
struct PathOrigin {
    segment: SegmentId,
    location: Point3d,
    offset: f64,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(network: &'a RoadNetwork) -> Self {
        Self {
            network,
            config: network.config(),
        }
    }

    /// Decides the target speed, braking and any lane change for `vehicle`
    /// at simulation time `now_ms`.
    pub fn decide(&self, vehicle: &Vehicle, now_ms: f64) -> Decision {
        let cfg = self.config;
        let speed = vehicle.speed();
        let limit = self
            .network
            .segment(vehicle.segment_id())
            .map_or(0.0, |segment| segment.speed_limit());
        let desired = f64::min(limit, vehicle.max_speed());

        let blocker = self.vehicle_ahead(vehicle);
        let signal = self.signal_ahead(vehicle);

        // Try to change lanes around a vehicle, unless a signal will stop us first
        if let Some(Hazard::Vehicle { distance, .. }) = blocker {
            let signal_first = matches!(
                signal,
                Some(Hazard::Signal { distance: d, .. }) if d <= distance
            );
            if !signal_first && self.may_change_lane(vehicle, now_ms) {
                if let Some(plan) = self.clear_lane(vehicle) {
                    return Decision {
                        state: VehicleState::ChangingLane,
                        target_speed: desired,
                        brake_rate: vehicle.deceleration(),
                        lane_change: Some(plan),
                        hazards: blocker.into_iter().collect(),
                    };
                }
            }
        }

        let mut hazards: SmallVec<[Hazard; 4]> = [blocker, signal, self.cornering_ahead(vehicle)]
            .into_iter()
            .flatten()
            .collect();
        if speed > desired {
            hazards.push(Hazard::SpeedLimit {
                limit: desired,
                distance: 0.0,
            });
        }
        hazards.extend(self.speed_limit_ahead(vehicle));

        let min_dec = cfg.min_brake_factor * vehicle.deceleration();
        let max_dec = cfg.max_brake_factor * vehicle.deceleration();
        let mut target = desired;
        let mut brake_rate = min_dec;
        for hazard in &hazards {
            let (limit, gap) = self.limit_and_gap(vehicle, hazard);
            target = f64::min(target, limit);
            brake_rate = f64::max(
                brake_rate,
                kinematics::braking_rate(speed, limit, gap, min_dec, max_dec),
            );
        }
        if speed > desired {
            brake_rate = f64::max(brake_rate, vehicle.deceleration());
        }

        let state = if vehicle.lane_change().is_some() {
            VehicleState::ChangingLane
        } else if target <= 0.0 && speed < cfg.stop_speed {
            VehicleState::Stopped
        } else if speed > target {
            VehicleState::Decelerating
        } else {
            VehicleState::Accelerating
        };

        Decision {
            state,
            target_speed: target,
            brake_rate,
            lane_change: None,
            hazards,
        }
    }

    /// The speed a hazard allows, and the distance available to slow to it.
    fn limit_and_gap(&self, vehicle: &Vehicle, hazard: &Hazard) -> (f64, f64) {
        let cfg = self.config;
        match *hazard {
            Hazard::Vehicle {
                id,
                distance,
                speed,
            } => {
                let other_len = self.network.vehicle(id).map_or(0.0, |other| other.length());
                let gap = distance - 0.5 * (vehicle.length() + other_len) - cfg.min_gap;
                // Too close to follow, so stop
                let limit = if gap > 0.0 { speed } else { 0.0 };
                (limit, gap)
            }
            Hazard::Signal { distance, .. } => {
                (0.0, distance - 0.5 * vehicle.length() - cfg.min_gap)
            }
            Hazard::Cornering {
                max_speed,
                distance,
                ..
            } => (max_speed, distance),
            // A limit already in force is met at the comfortable rate
            Hazard::SpeedLimit { limit, distance } if distance <= 0.0 => (limit, f64::INFINITY),
            Hazard::SpeedLimit { limit, distance } => (limit, distance),
        }
    }

    /// The nearest vehicle the given vehicle must follow or stop behind.
    ///
    /// A vehicle is followed if it is within lookahead, inside the view cone,
    /// not laterally clear, and stopped or slower than the follower.
    pub fn vehicle_ahead(&self, vehicle: &Vehicle) -> Option<Hazard> {
        let cfg = self.config;
        let lookahead = vehicle.lookahead_distance(cfg.stop_speed);
        let cone = match vehicle.lane_change() {
            Some(_) => cfg.lane_change_view_angle,
            None => cfg.view_angle,
        };
        let origin = vehicle.location();
        let heading = vehicle.heading();

        self.network
            .vehicles_within_radius(origin, lookahead)
            .into_iter()
            .filter(|(id, _)| *id != vehicle.id())
            .filter_map(|(id, distance)| Some((self.network.vehicle(id)?, distance)))
            .filter(|(other, _)| angle_between(heading, other.location() - origin) <= cone)
            .filter(|(other, _)| {
                let (_, lat) = project_local(other.location(), origin, heading);
                lat.abs() <= 0.5 * (vehicle.width() + other.width()) + cfg.lateral_clearance
            })
            .find_map(|(other, distance)| {
                let stopped = other.is_crashed() || other.speed() < cfg.stop_speed;
                (stopped || other.speed() < vehicle.speed()).then(|| Hazard::Vehicle {
                    id: other.id(),
                    distance,
                    speed: if stopped { 0.0 } else { other.speed() },
                })
            })
    }

    /// The nearest signal within lookahead telling the vehicle to stop.
    ///
    /// While changing lanes, the search starts from the lane change destination.
    pub fn signal_ahead(&self, vehicle: &Vehicle) -> Option<Hazard> {
        let origin = self.path_origin(vehicle)?;
        let budget = vehicle.lookahead_distance(self.config.stop_speed) - origin.offset;
        self.network
            .signals_ahead_of(origin.location, origin.segment, budget)
            .into_iter()
            .filter(|hit| {
                self.network
                    .segment(hit.segment)
                    .and_then(|segment| segment.signal())
                    .map_or(false, |signal| signal.should_stop(vehicle))
            })
            .map(|hit| Hazard::Signal {
                segment: hit.segment,
                distance: hit.distance + origin.offset,
            })
            .next()
    }

    /// The cornering speed cap at the end of the vehicle's segment, if the
    /// end is within lookahead and the turn is sharp enough to need one.
    pub fn cornering_ahead(&self, vehicle: &Vehicle) -> Option<Hazard> {
        let origin = self.path_origin(vehicle)?;
        let segment = self.network.segment(origin.segment)?;
        let heading = segment.direction()?;
        let distance = segment.remaining_from(origin.location) + origin.offset;
        if distance >= vehicle.lookahead_distance(self.config.stop_speed) {
            return None;
        }
        let heading_change = self
            .network
            .successors(origin.segment)
            .into_iter()
            .filter_map(|id| self.network.segment(id)?.direction())
            .map(|dir| angle_between(heading, dir))
            .fold(None, |max: Option<f64>, angle| {
                Some(max.map_or(angle, |max| max.max(angle)))
            })?;
        let max_speed = self.config.cornering.max_speed(heading_change);
        max_speed.is_finite().then(|| Hazard::Cornering {
            heading_change,
            max_speed,
            distance,
        })
    }

    /// The lowest speed limit among the successors, if the end of the
    /// vehicle's segment is within lookahead and the limit is below its speed.
    fn speed_limit_ahead(&self, vehicle: &Vehicle) -> Option<Hazard> {
        let origin = self.path_origin(vehicle)?;
        let segment = self.network.segment(origin.segment)?;
        let distance = segment.remaining_from(origin.location) + origin.offset;
        if distance >= vehicle.lookahead_distance(self.config.stop_speed) {
            return None;
        }
        let limit = self
            .network
            .successors(origin.segment)
            .into_iter()
            .filter_map(|id| self.network.segment(id))
            .map(|next| next.speed_limit())
            .fold(f64::INFINITY, f64::min);
        (limit < vehicle.speed()).then(|| Hazard::SpeedLimit { limit, distance })
    }

    /// The nearest parallel segment with no vehicle within lookahead,
    /// and the point on it where a lane change would end.
    pub fn clear_lane(&self, vehicle: &Vehicle) -> Option<LaneChangePlan> {
        let lookahead = vehicle.lookahead_distance(self.config.stop_speed);
        let location = vehicle.location();
        let min_ahead = LANE_CHANGE_LENGTHS * vehicle.length();

        self.network
            .parallel_segments_of(vehicle.segment_id())
            .into_iter()
            .filter_map(|id| {
                let segment = self.network.segment(id)?;
                let occupied = segment
                    .vehicles()
                    .iter()
                    .filter_map(|other| self.network.vehicle(*other))
                    .any(|other| other.location().distance(location) <= lookahead);
                if occupied {
                    return None;
                }
                let along = segment.project(location);
                let (target, destination_pos) = segment
                    .samples()
                    .iter()
                    .map(|point| (*point, segment.project(*point)))
                    .find(|(_, pos)| *pos >= along + min_ahead)?;
                Some(LaneChangePlan {
                    destination: id,
                    destination_pos,
                    target,
                })
            })
            .min_by(|a, b| {
                let da = a.target.distance2(location);
                let db = b.target.distance2(location);
                da.total_cmp(&db)
            })
    }

    fn may_change_lane(&self, vehicle: &Vehicle, now_ms: f64) -> bool {
        vehicle.lane_change().is_none()
            && now_ms >= vehicle.lane_change_ready_at()
            && self
                .network
                .segment(vehicle.segment_id())
                .map_or(false, |segment| !segment.is_synthetic())
    }

    /// Where to start searching for hazards along the vehicle's path.
    fn path_origin(&self, vehicle: &Vehicle) -> Option<PathOrigin> {
        match vehicle.lane_change() {
            Some(lc) => {
                let connector = self.network.segment(lc.connector())?;
                let destination = self.network.segment(lc.destination())?;
                Some(PathOrigin {
                    segment: lc.destination(),
                    location: destination.point_at(lc.destination_pos()),
                    offset: f64::max(connector.length() - vehicle.pos(), 0.0),
                })
            }
            None => Some(PathOrigin {
                segment: vehicle.segment_id(),
                location: vehicle.location(),
                offset: 0.0,
            }),
        }
    }
}

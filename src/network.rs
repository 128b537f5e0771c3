use crate::config::SimulationConfig;
use crate::entity::{Disposable, Positioned, Updatable};
use crate::error::{ConfigError, Removal, RemovalReason};
use crate::generator::VehicleGenerator;
use crate::math::{angle_between, point_in_range, OrientedBox, Point3d, Vector3d};
use crate::road::{Lane, Road};
use crate::segment::{Degeneracy, RoadSegment, SegmentAttributes};
use crate::signal::TrafficFlowControl;
use crate::simulation::TickContext;
use crate::vehicle::{
    Decision, DecisionEngine, LaneChange, LaneChangePlan, Vehicle, VehicleAttributes,
};
use crate::{SegmentId, SegmentSet, VehicleId, VehicleSet};
use cgmath::MetricSpace;
use index::PointIndex;
use itertools::Itertools;
use log::{debug, error, info, warn};
use rand::Rng;
use smallvec::{smallvec, SmallVec};
use std::collections::{HashMap, HashSet};

mod index;

/// The most segment boundaries a vehicle may cross in one tick.
const MAX_TRANSITIONS_PER_TICK: usize = 64;

/// A road network and the vehicles travelling on it.
#[derive(Clone, Debug)]
pub struct RoadNetwork {
    config: SimulationConfig,
    /// The segments in the network, including lane change connectors.
    segments: SegmentSet,
    vehicles: VehicleSet,
    roads: Vec<Road>,
    /// Segments by start point.
    starts: PointIndex,
    /// Segments by end point.
    ends: PointIndex,
    /// Vehicles that have left the network.
    removals: Vec<Removal>,
    /// The time of the last update, in ms.
    now_ms: f64,
}

/// A signal found by [RoadNetwork::signals_ahead_of].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalAhead {
    /// The segment the signal stands at the end of.
    pub segment: SegmentId,
    /// The distance along the road to the signal.
    pub distance: f64,
}

impl RoadNetwork {
    /// Creates an empty network.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            starts: PointIndex::new(config.point_tolerance),
            ends: PointIndex::new(config.point_tolerance),
            config,
            segments: SegmentSet::with_key(),
            vehicles: VehicleSet::with_key(),
            roads: vec![],
            removals: vec![],
            now_ms: 0.0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The time of the last update, in ms.
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Adds a segment to the network.
    pub fn add_segment(&mut self, attribs: &SegmentAttributes) -> Result<SegmentId, ConfigError> {
        let id = self.insert_segment(attribs)?;
        if let Some(name) = &attribs.road_name {
            self.rebuild_road(name);
        }
        Ok(id)
    }

    /// Adds a segment without regrouping its road into lanes.
    pub(crate) fn insert_segment(
        &mut self,
        attribs: &SegmentAttributes,
    ) -> Result<SegmentId, ConfigError> {
        attribs.validate()?;
        let spacing = self.config.sample_spacing;
        let id = self
            .segments
            .insert_with_key(|id| RoadSegment::new(id, attribs, spacing));
        self.starts.insert(attribs.start, id);
        self.ends.insert(attribs.end, id);
        Ok(id)
    }

    /// Puts a signal at the end of a segment, replacing any existing one.
    pub fn attach_signal(
        &mut self,
        segment: SegmentId,
        signal: TrafficFlowControl,
    ) -> Result<(), ConfigError> {
        let segment = self
            .segments
            .get_mut(segment)
            .ok_or(ConfigError::UnknownSegment(segment))?;
        segment.set_signal(signal);
        Ok(())
    }

    /// Puts a generator at the start of a segment, replacing any existing one.
    pub fn attach_generator(
        &mut self,
        segment: SegmentId,
        delay_ms: f64,
        max_count: Option<u32>,
    ) -> Result<(), ConfigError> {
        let segment = self
            .segments
            .get_mut(segment)
            .ok_or(ConfigError::UnknownSegment(segment))?;
        let generator = VehicleGenerator::new(segment.id(), segment.start(), delay_ms, max_count)?;
        segment.set_generator(generator);
        Ok(())
    }

    /// Adds a stationary vehicle `pos` units along a segment.
    pub fn add_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        segment: SegmentId,
        pos: f64,
    ) -> Result<VehicleId, ConfigError> {
        attributes.validate()?;
        ConfigError::check_non_negative("vehicle.pos", pos)?;
        if !self.segments.contains_key(segment) {
            return Err(ConfigError::UnknownSegment(segment));
        }
        Ok(self.insert_vehicle(attributes, segment, pos))
    }

    fn insert_vehicle(
        &mut self,
        attributes: &VehicleAttributes,
        segment: SegmentId,
        pos: f64,
    ) -> VehicleId {
        let seg = &self.segments[segment];
        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, attributes, seg, pos));
        self.segments[segment].insert_vehicle(id);
        id
    }

    /// Sets a vehicle's speed. Returns `false` if there is no such vehicle
    /// or the speed is negative or not finite.
    pub fn set_vehicle_speed(&mut self, id: VehicleId, speed: f64) -> bool {
        match self.vehicles.get_mut(id) {
            Some(vehicle) if speed.is_finite() && speed >= 0.0 => {
                vehicle.set_speed(speed);
                true
            }
            _ => false,
        }
    }

    /// Removes a vehicle from the network.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> Option<Vehicle> {
        self.remove_vehicle_with(id, RemovalReason::Explicit)
    }

    fn remove_vehicle_with(&mut self, id: VehicleId, reason: RemovalReason) -> Option<Vehicle> {
        let vehicle = self.vehicles.remove(id)?;
        let mut held_by: SmallVec<[SegmentId; 3]> = smallvec![vehicle.segment_id()];
        if let Some(lc) = vehicle.lane_change() {
            held_by.extend([lc.connector(), lc.destination()]);
        }
        for segment in held_by {
            if let Some(segment) = self.segments.get_mut(segment) {
                segment.remove_vehicle(id);
            }
        }
        debug!("vehicle {:?} removed: {:?}", id, reason);
        self.removals.push(Removal {
            vehicle: id,
            reason,
            at_ms: self.now_ms,
        });
        Some(vehicle)
    }

    /// Gets the segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> Option<&RoadSegment> {
        self.segments.get(id)
    }

    /// Gets the vehicle with the given ID.
    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Returns an iterator over all the segments in the network.
    pub fn segments(&self) -> impl Iterator<Item = &RoadSegment> {
        self.segments.values()
    }

    /// Returns an iterator over all the vehicles in the network.
    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    /// Gets the road with the given name.
    pub fn road(&self, name: &str) -> Option<&Road> {
        self.roads.iter().find(|road| road.name() == name)
    }

    /// Returns an iterator over the lanes of every road.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.roads.iter().flat_map(|road| road.lanes())
    }

    /// Returns an iterator over the segments where vehicles enter the network.
    pub fn inlets(&self) -> impl Iterator<Item = &RoadSegment> {
        self.segments.values().filter(|segment| segment.is_inlet())
    }

    /// The segments starting within the point tolerance of `point`.
    pub fn segments_starting_at(&self, point: Point3d) -> SmallVec<[SegmentId; 4]> {
        self.starts.find(point)
    }

    /// The segments ending within the point tolerance of `point`.
    pub fn segments_ending_at(&self, point: Point3d) -> SmallVec<[SegmentId; 4]> {
        self.ends.find(point)
    }

    /// The segments a vehicle may continue onto from the end of the given segment.
    pub fn successors(&self, id: SegmentId) -> SmallVec<[SegmentId; 4]> {
        match self.segments.get(id) {
            Some(segment) if !segment.is_synthetic() => {
                let mut next = self.segments_starting_at(segment.end());
                next.retain(|next| *next != id);
                next
            }
            _ => SmallVec::new(),
        }
    }

    /// The segments a vehicle may change lanes onto from the given segment.
    ///
    /// These share its road name, are in a different lane, head the same way,
    /// and have a pair of sample points within the parallel radius.
    pub fn parallel_segments_of(&self, id: SegmentId) -> Vec<SegmentId> {
        let Some(segment) = self.segments.get(id) else {
            return vec![];
        };
        let Some(heading) = segment.direction() else {
            return vec![];
        };
        let Some(road) = segment.road_name().and_then(|name| self.road(name)) else {
            return vec![];
        };
        if segment.is_synthetic() {
            return vec![];
        }
        let own_lane = road.lane_of(id);
        let radius = self.config.parallel_radius;

        road.segments()
            .iter()
            .copied()
            .filter(|other| *other != id && !own_lane.map_or(false, |lane| lane.contains(*other)))
            .filter(|other| {
                let Some(other) = self.segments.get(*other) else {
                    return false;
                };
                let aligned = other.direction().map_or(false, |dir| {
                    angle_between(heading, dir) < self.config.parallel_heading_tolerance
                });
                aligned
                    && segment.samples().iter().any(|p| {
                        other
                            .samples()
                            .iter()
                            .any(|q| point_in_range(*q, *p, radius))
                    })
            })
            .collect()
    }

    /// The vehicles within `distance` of `origin`, nearest first.
    pub fn vehicles_within_radius(&self, origin: Point3d, distance: f64) -> Vec<(VehicleId, f64)> {
        let mut found = self
            .vehicles
            .iter()
            .map(|(id, vehicle)| (id, vehicle.location().distance(origin)))
            .filter(|(_, d)| *d <= distance)
            .collect::<Vec<_>>();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// Finds the signals within `distance` along the road from `location`
    /// on `segment`, nearest first.
    ///
    /// The walk follows every successor, and a branch stops once the
    /// distance budget is used up. Each signal is reported at the shortest
    /// distance it can be reached by.
    pub fn signals_ahead_of(
        &self,
        location: Point3d,
        segment: SegmentId,
        distance: f64,
    ) -> Vec<SignalAhead> {
        let Some(start) = self.segments.get(segment) else {
            return vec![];
        };
        let to_end = start.remaining_from(location);
        if !(to_end <= distance) {
            return vec![];
        }

        let mut found: HashMap<SegmentId, f64> = HashMap::new();
        if start.signal().is_some() {
            found.insert(segment, to_end);
        }
        let mut reached: HashMap<SegmentId, f64> = HashMap::from([(segment, to_end)]);
        let mut stack: Vec<(SegmentId, f64)> = self
            .successors(segment)
            .into_iter()
            .map(|next| (next, to_end))
            .collect();

        while let Some((id, travelled)) = stack.pop() {
            let Some(seg) = self.segments.get(id) else {
                continue;
            };
            let end = travelled + seg.length();
            if end > distance || reached.get(&id).map_or(false, |best| *best <= end) {
                continue;
            }
            reached.insert(id, end);
            if seg.signal().is_some() {
                found.insert(id, end);
            }
            stack.extend(self.successors(id).into_iter().map(|next| (next, end)));
        }

        found
            .into_iter()
            .map(|(segment, distance)| SignalAhead { segment, distance })
            .sorted_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then(a.segment.cmp(&b.segment))
            })
            .collect()
    }

    /// Whether a pending vehicle can be spawned at the start of a segment.
    ///
    /// Nobody may overlap it, and no vehicle whose lookahead reaches the
    /// spawn point may have it in view.
    pub fn spawn_point_clear(&self, segment: SegmentId, attributes: &VehicleAttributes) -> bool {
        let Some(segment) = self.segments.get(segment) else {
            return false;
        };
        let spawn = segment.start();
        let heading = segment.direction().unwrap_or_else(Vector3d::unit_x);
        let pending = OrientedBox::new(
            spawn,
            heading,
            attributes.length,
            attributes.width,
            attributes.height,
        );
        self.vehicles.values().all(|other| {
            if other.bounds().overlaps(&pending) {
                return false;
            }
            let reach = other.length() + other.lookahead_distance(self.config.stop_speed);
            !point_in_range(spawn, other.location(), reach)
                || angle_between(other.heading(), spawn - other.location())
                    > self.config.view_angle
        })
    }

    /// The vehicles that have left the network.
    pub fn removals(&self) -> &[Removal] {
        &self.removals
    }

    /// Takes the record of vehicles that have left the network.
    pub fn take_removals(&mut self) -> Vec<Removal> {
        std::mem::take(&mut self.removals)
    }

    /// Advances the network by `delta_ms` milliseconds.
    ///
    /// A NaN, infinite or negative delta is ignored.
    pub fn update(&mut self, delta_ms: f64, ctx: &mut TickContext) {
        if !(delta_ms >= 0.0) || !delta_ms.is_finite() {
            warn!("ignoring invalid time step of {} ms", delta_ms);
            return;
        }
        ctx.advance(delta_ms);
        self.now_ms = ctx.now_ms();

        self.update_controls(delta_ms, ctx);
        self.apply_decisions();
        self.integrate(delta_ms / 1000.0);
        self.advance_vehicles(ctx);
        self.detect_crashes(ctx);
        self.clean_up_crashes();
        self.dispose_connectors();
    }

    /// Updates the signals and generators, spawning any vehicles that are due.
    fn update_controls(&mut self, delta_ms: f64, ctx: &mut TickContext) {
        let controlled = self
            .segments
            .iter()
            .filter(|(_, s)| s.signal().is_some() || s.generator().is_some())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        for id in controlled {
            let profile = &self.config.vehicle_profile;
            let segment = &mut self.segments[id];
            if let Some(signal) = segment.signal_mut() {
                signal.update(delta_ms);
            }
            let Some(generator) = segment.generator_mut() else {
                continue;
            };
            generator.update(delta_ms);
            generator.prepare(profile, ctx.rng());

            let Some(pending) = generator.pending().copied() else {
                continue;
            };
            if !self.spawn_point_clear(id, &pending) {
                continue;
            }
            let taken = self.segments[id]
                .generator_mut()
                .and_then(|generator| generator.take_pending());
            if let Some(attributes) = taken {
                let vehicle = self.insert_vehicle(&attributes, id, 0.0);
                debug!("spawned vehicle {:?} on segment {:?}", vehicle, id);
            }
        }
    }

    /// Lets every vehicle that is due decide, then applies the decisions.
    fn apply_decisions(&mut self) {
        let now = self.now_ms;
        let decisions: Vec<(VehicleId, Decision)> = {
            let engine = DecisionEngine::new(self);
            self.vehicles
                .values()
                .filter(|vehicle| vehicle.decision_due(now))
                .map(|vehicle| (vehicle.id(), engine.decide(vehicle, now)))
                .collect()
        };

        for (id, decision) in decisions {
            if let Some(vehicle) = self.vehicles.get_mut(id) {
                vehicle.apply_decision(&decision, now);
            }
            if let Some(plan) = decision.lane_change {
                self.begin_lane_change(id, plan);
            }
        }
    }

    /// Moves a vehicle onto a new connector leading to a parallel segment.
    fn begin_lane_change(&mut self, id: VehicleId, plan: LaneChangePlan) {
        let Some(vehicle) = self.vehicles.get(id) else {
            return;
        };
        let origin = vehicle.segment_id();
        let start = vehicle.location();
        let Some(destination) = self.segments.get(plan.destination) else {
            return;
        };
        let width = destination.width();
        let speed_limit = self
            .segments
            .get(origin)
            .map_or(destination.speed_limit(), |o| {
                f64::min(o.speed_limit(), destination.speed_limit())
            });

        let spacing = self.config.sample_spacing;
        let connector = self.segments.insert_with_key(|cid| {
            RoadSegment::connector(cid, start, plan.target, width, speed_limit, spacing)
        });
        if let Some(origin) = self.segments.get_mut(origin) {
            origin.remove_vehicle(id);
        }
        for held_by in [connector, plan.destination] {
            if let Some(segment) = self.segments.get_mut(held_by) {
                segment.insert_vehicle(id);
            }
        }

        let lane_change = LaneChange {
            connector,
            origin,
            destination: plan.destination,
            destination_pos: plan.destination_pos,
        };
        let ready_at = self.now_ms + self.config.change_lane_delay_ms;
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            vehicle.begin_lane_change(lane_change, &self.segments[connector], ready_at);
        }
        debug!(
            "vehicle {:?} changing lanes from {:?} to {:?}",
            id, origin, plan.destination
        );
    }

    /// Integrates the speeds and positions of all vehicles.
    fn integrate(&mut self, dt: f64) {
        let decay = self.config.crash_decay_factor;
        for vehicle in self.vehicles.values_mut() {
            match self.segments.get(vehicle.segment_id()) {
                Some(segment) if segment.degeneracy() == Some(Degeneracy::NonFinite) => {
                    vehicle.flag();
                }
                Some(segment) => {
                    if vehicle.is_crashed() {
                        vehicle.decay(dt, decay);
                    } else {
                        vehicle.integrate(dt);
                    }
                    vehicle.update_coords(segment);
                }
                // Picked up by `advance_vehicles`
                None => {}
            }
        }
    }

    /// Moves vehicles that have passed the end of their segment onto the next one.
    fn advance_vehicles(&mut self, ctx: &mut TickContext) {
        let ids = self.vehicles.keys().collect::<Vec<_>>();
        for id in ids {
            self.advance_vehicle(id, ctx);
        }
    }

    fn advance_vehicle(&mut self, id: VehicleId, ctx: &mut TickContext) {
        for _ in 0..MAX_TRANSITIONS_PER_TICK {
            let Some(vehicle) = self.vehicles.get(id) else {
                return;
            };
            let from = vehicle.segment_id();
            let Some(segment) = self.segments.get(from) else {
                error!("vehicle {:?} is on missing segment {:?}", id, from);
                self.remove_vehicle_with(id, RemovalReason::InvariantViolation);
                return;
            };
            let length = segment.length();
            if vehicle.is_flagged() || !(vehicle.pos() > length) {
                return;
            }
            let leftover = vehicle.pos() - length;

            // The end of a connector is the lane change destination
            if let Some(lc) = vehicle.lane_change().filter(|lc| lc.connector() == from) {
                if !self.segments.contains_key(lc.destination()) {
                    error!(
                        "vehicle {:?} is changing lanes onto missing segment {:?}",
                        id,
                        lc.destination()
                    );
                    self.remove_vehicle_with(id, RemovalReason::InvariantViolation);
                    return;
                }
                self.segments[from].remove_vehicle(id);
                let pos = lc.destination_pos() + leftover;
                self.vehicles[id].finish_lane_change(&self.segments[lc.destination()], pos);
                continue;
            }

            let successors = self.successors(from);
            if successors.is_empty() {
                self.remove_vehicle_with(id, RemovalReason::EndOfNetwork);
                return;
            }
            let next = successors[ctx.rng().gen_range(0..successors.len())];
            self.segments[from].remove_vehicle(id);
            self.segments[next].insert_vehicle(id);
            self.vehicles[id].place(&self.segments[next], leftover);
        }
        warn!(
            "vehicle {:?} crossed more than {} segments in one tick",
            id, MAX_TRANSITIONS_PER_TICK
        );
    }

    /// Marks every pair of vehicles whose bounding boxes overlap as crashed.
    fn detect_crashes(&mut self, ctx: &mut TickContext) {
        let boxes = self
            .vehicles
            .iter()
            .filter(|(_, vehicle)| !vehicle.is_flagged())
            .map(|(id, vehicle)| (id, vehicle.bounds()))
            .collect::<Vec<_>>();

        let mut crashed: Vec<VehicleId> = vec![];
        for ((a, box_a), (b, box_b)) in boxes.iter().tuple_combinations() {
            let reach = box_a.radius() + box_b.radius();
            if point_in_range(box_a.centre(), box_b.centre(), reach) && box_a.overlaps(box_b) {
                crashed.extend([*a, *b]);
            }
        }

        for id in crashed {
            let Some(vehicle) = self.vehicles.get_mut(id).filter(|v| !v.is_crashed()) else {
                continue;
            };
            let delay = self.config.crash_cleanup.delay(vehicle.speed(), ctx.rng());
            if vehicle.crash(self.now_ms, self.now_ms + delay) {
                info!(
                    "vehicle {:?} crashed at {:?}, speed {:.1}",
                    id,
                    vehicle.location(),
                    vehicle.speed()
                );
            }
        }
    }

    /// Removes crashed vehicles whose cleanup deadline has passed.
    fn clean_up_crashes(&mut self) {
        let now = self.now_ms;
        let due = self
            .vehicles
            .values()
            .filter(|vehicle| vehicle.is_disposable(now))
            .map(|vehicle| vehicle.id())
            .collect::<Vec<_>>();
        for id in due {
            self.remove_vehicle_with(id, RemovalReason::CrashCleanup);
        }
    }

    /// Discards lane change connectors nobody is using.
    fn dispose_connectors(&mut self) {
        let now = self.now_ms;
        self.segments.retain(|_, segment| !segment.is_disposable(now));
    }

    /// Regroups the segments of a road into lanes.
    pub(crate) fn rebuild_road(&mut self, name: &str) {
        let members = self
            .segments
            .iter()
            .filter(|(_, s)| !s.is_synthetic() && s.road_name() == Some(name))
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        let next_in_road = |id: SegmentId| {
            self.successors(id)
                .into_iter()
                .find(|next| members.contains(next))
        };
        let has_predecessor = members
            .iter()
            .filter_map(|id| next_in_road(*id))
            .collect::<HashSet<_>>();

        // Chains start at segments with no predecessor; the second pass breaks cycles
        let heads = members
            .iter()
            .filter(|id| !has_predecessor.contains(id))
            .chain(members.iter());
        let mut placed = HashSet::new();
        let mut lanes = vec![];
        for head in heads {
            let mut chain = vec![];
            let mut current = Some(*head);
            while let Some(id) = current {
                if !placed.insert(id) {
                    break;
                }
                chain.push(id);
                current = next_in_road(id);
            }
            if !chain.is_empty() {
                let length = chain
                    .iter()
                    .filter_map(|id| self.segments.get(*id))
                    .map(|segment| segment.length())
                    .sum();
                lanes.push(Lane::new(chain, length));
            }
        }

        let road = Road::new(name.to_owned(), members, lanes);
        match self.roads.iter_mut().find(|road| road.name() == name) {
            Some(existing) => *existing = road,
            None => self.roads.push(road),
        }
    }
}

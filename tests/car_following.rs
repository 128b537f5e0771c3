//! Tests of vehicles following and stopping behind other vehicles.

use road_sim::{
    math::Point3d, DecisionEngine, Hazard, Positioned, RoadNetwork, SegmentAttributes, SegmentId,
    SignalKind, SignalState, SignalTimings, Simulation, TrafficFlowControl, VehicleAttributes,
    VehicleId, VehicleState,
};

fn segment(network: &mut RoadNetwork, start: (f64, f64), end: (f64, f64)) -> SegmentId {
    network
        .add_segment(&SegmentAttributes::new(
            Point3d::new(start.0, start.1, 0.0),
            Point3d::new(end.0, end.1, 0.0),
        ))
        .unwrap()
}

/// A follower at 100 units travelling at 20 units/s, and a stationary vehicle
/// `offset` units beyond the follower's lookahead.
fn follower_and_lead(offset: f64) -> (RoadNetwork, VehicleId, VehicleId) {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let road = segment(&mut network, (0.0, 0.0), (1000.0, 0.0));
    let attributes = VehicleAttributes::default();
    let follower = network.add_vehicle(&attributes, road, 100.0).unwrap();
    network.set_vehicle_speed(follower, 20.0);
    let lookahead = network
        .vehicle(follower)
        .unwrap()
        .lookahead_distance(network.config().stop_speed);
    let lead = network
        .add_vehicle(&attributes, road, 100.0 + lookahead + offset)
        .unwrap();
    (network, follower, lead)
}

#[test]
fn lead_just_inside_lookahead_is_followed() {
    let (network, follower, lead) = follower_and_lead(-0.1);
    let engine = DecisionEngine::new(&network);
    let hazard = engine.vehicle_ahead(network.vehicle(follower).unwrap());
    assert!(matches!(
        hazard,
        Some(Hazard::Vehicle { id, speed, .. }) if id == lead && speed == 0.0
    ));

    let decision = engine.decide(network.vehicle(follower).unwrap(), 0.0);
    assert_eq!(decision.state, VehicleState::Decelerating);
    assert_eq!(decision.target_speed, 0.0);
}

#[test]
fn lead_just_outside_lookahead_is_ignored() {
    let (network, follower, _) = follower_and_lead(0.1);
    let engine = DecisionEngine::new(&network);
    assert!(engine
        .vehicle_ahead(network.vehicle(follower).unwrap())
        .is_none());
}

#[test]
fn vehicle_beside_is_outside_view_cone() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let left = segment(&mut network, (0.0, 0.0), (1000.0, 0.0));
    let right = segment(&mut network, (0.0, 4.0), (1000.0, 4.0));
    let attributes = VehicleAttributes::default();
    let follower = network.add_vehicle(&attributes, left, 100.0).unwrap();
    network.set_vehicle_speed(follower, 20.0);
    // 63 degrees off the follower's heading
    network.add_vehicle(&attributes, right, 102.0).unwrap();

    let engine = DecisionEngine::new(&network);
    assert!(engine
        .vehicle_ahead(network.vehicle(follower).unwrap())
        .is_none());
}

#[test]
fn faster_lead_is_not_followed() {
    let (mut network, follower, lead) = follower_and_lead(-20.0);
    network.set_vehicle_speed(lead, 25.0);
    let engine = DecisionEngine::new(&network);
    assert!(engine
        .vehicle_ahead(network.vehicle(follower).unwrap())
        .is_none());
}

/// Test that a follower approaching a stationary vehicle stops without touching it.
#[test]
fn stationary_lead_is_never_overlapped() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let road = network
        .add_segment(
            &SegmentAttributes::new(Point3d::new(0.0, 0.0, 0.0), Point3d::new(304.0, 0.0, 0.0))
                .with_speed_limit(20.0),
        )
        .unwrap();
    // A red light holds the lead in place
    let light = TrafficFlowControl::new(
        SignalKind::TrafficLight,
        SignalTimings::new(1_000.0, 1_000.0, 1e9).unwrap(),
        SignalState::Stop,
        Point3d::new(0.0, 0.0, 0.0),
    );
    network.attach_signal(road, light).unwrap();

    let attributes = VehicleAttributes::default();
    let lead = network.add_vehicle(&attributes, road, 296.0).unwrap();
    let follower = network.add_vehicle(&attributes, road, 0.0).unwrap();
    network.set_vehicle_speed(follower, 20.0);
    let mut sim = Simulation::new(network, 3);

    for _ in 0..600 {
        sim.step(50.0);
        let lead = sim.network().vehicle(lead).unwrap();
        let follower = sim.network().vehicle(follower).unwrap();
        assert_eq!(lead.location().x, 296.0);
        let gap = lead.location().x - follower.location().x;
        assert!(gap > 0.5 * (lead.length() + follower.length()));
        assert_ne!(follower.state(), VehicleState::Crashed);
    }

    let lead = sim.network().vehicle(lead).unwrap();
    let follower = sim.network().vehicle(follower).unwrap();
    assert_eq!(follower.state(), VehicleState::Stopped);
    assert_eq!(lead.state(), VehicleState::Stopped);
    let gap = lead.location().x - follower.location().x;
    assert!(gap > 5.0 && gap < 8.0, "gap was {}", gap);
}

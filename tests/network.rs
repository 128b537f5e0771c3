//! Tests of crashes, generators and other network-wide behaviour.

use road_sim::{
    math::Point3d, Degeneracy, Positioned, RemovalReason, RoadNetwork, SegmentAttributes,
    SegmentId, SignalKind, SignalState, SignalTimings, Simulation, TrafficFlowControl,
    VehicleAttributes, VehicleState,
};

fn straight(network: &mut RoadNetwork, from: (f64, f64), to: (f64, f64)) -> SegmentId {
    network
        .add_segment(&SegmentAttributes::new(
            Point3d::new(from.0, from.1, 0.0),
            Point3d::new(to.0, to.1, 0.0),
        ))
        .unwrap()
}

fn red_light() -> TrafficFlowControl {
    TrafficFlowControl::new(
        SignalKind::TrafficLight,
        SignalTimings::new(1_000.0, 1_000.0, 1e9).unwrap(),
        SignalState::Stop,
        Point3d::new(0.0, 0.0, 0.0),
    )
}

#[test]
fn overlapping_vehicles_crash_and_are_cleaned_up() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let road = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    let attributes = VehicleAttributes::default();
    let a = network.add_vehicle(&attributes, road, 10.0).unwrap();
    let b = network.add_vehicle(&attributes, road, 12.0).unwrap();
    let mut sim = Simulation::new(network, 5);

    sim.step(50.0);
    for id in [a, b] {
        let vehicle = sim.network().vehicle(id).unwrap();
        assert_eq!(vehicle.state(), VehicleState::Crashed);
        assert_eq!(vehicle.crashed_at(), Some(50.0));
        // Crashed slowly, so the short cleanup range applies
        let cleanup = vehicle.crash_cleanup_at().unwrap();
        assert!((3_050.0..=6_050.0).contains(&cleanup), "{}", cleanup);
    }

    // Crashing again leaves the deadlines alone
    let before = sim.network().vehicle(a).unwrap().crash_cleanup_at();
    sim.step(50.0);
    assert_eq!(sim.network().vehicle(a).unwrap().crash_cleanup_at(), before);

    sim.run_for(7_000.0, 50.0);
    assert_eq!(sim.network().vehicle_count(), 0);
    let removals = sim.network().removals();
    assert_eq!(removals.len(), 2);
    assert!(removals
        .iter()
        .all(|removal| removal.reason == RemovalReason::CrashCleanup));
    assert!(sim.network().segment(road).unwrap().vehicles().is_empty());
}

#[test]
fn separated_vehicles_do_not_crash() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let left = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    let right = straight(&mut network, (0.0, 3.0), (100.0, 3.0));
    let attributes = VehicleAttributes::default();
    let a = network.add_vehicle(&attributes, left, 10.0).unwrap();
    let b = network.add_vehicle(&attributes, right, 10.0).unwrap();
    let mut sim = Simulation::new(network, 5);

    sim.step(50.0);
    for id in [a, b] {
        assert!(!sim.network().vehicle(id).unwrap().is_crashed());
    }
}

/// Test that a generator holds its pending vehicle until the spawn point clears.
#[test]
fn generator_waits_for_clear_spawn_point() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let inlet = straight(&mut network, (0.0, 0.0), (10.0, 0.0));
    network.attach_signal(inlet, red_light()).unwrap();
    network.attach_generator(inlet, 1_000.0, None).unwrap();
    let blocker = network
        .add_vehicle(&VehicleAttributes::default(), inlet, 2.0)
        .unwrap();
    let mut sim = Simulation::new(network, 11);

    sim.run_for(2_000.0, 50.0);
    let generator = sim.network().segment(inlet).unwrap().generator().unwrap();
    assert_eq!(generator.count(), 0);
    assert!(generator.pending().is_some());
    assert_eq!(sim.network().vehicle_count(), 1);

    assert!(sim.network_mut().remove_vehicle(blocker).is_some());
    assert_eq!(
        sim.network().removals().last().unwrap().reason,
        RemovalReason::Explicit
    );
    sim.step(50.0);
    let generator = sim.network().segment(inlet).unwrap().generator().unwrap();
    assert_eq!(generator.count(), 1);
    assert!(generator.pending().is_none());
    assert_eq!(sim.network().vehicle_count(), 1);
    let spawned = sim.network().vehicles().next().unwrap();
    assert_eq!(spawned.segment_id(), inlet);
}

/// Test that a vehicle approaching the spawn point holds back generation.
#[test]
fn approaching_vehicle_blocks_spawn_point() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let upstream = straight(&mut network, (-100.0, 0.0), (0.0, 0.0));
    let inlet = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    let attributes = VehicleAttributes::default();

    // 20 units short of the spawn point, far enough not to overlap it
    let veh = network.add_vehicle(&attributes, upstream, 80.0).unwrap();
    network.set_vehicle_speed(veh, 20.0);
    assert!(!network.spawn_point_clear(inlet, &attributes));

    // Stopped, it looks only a few lengths ahead
    network.set_vehicle_speed(veh, 0.0);
    assert!(network.spawn_point_clear(inlet, &attributes));

    // Past the spawn point, it is heading away
    network.remove_vehicle(veh).unwrap();
    let veh = network.add_vehicle(&attributes, inlet, 20.0).unwrap();
    network.set_vehicle_speed(veh, 20.0);
    assert!(network.spawn_point_clear(inlet, &attributes));
}

#[test]
fn generator_stops_at_max_count() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let inlet = straight(&mut network, (0.0, 0.0), (1_000.0, 0.0));
    network.attach_generator(inlet, 1_000.0, Some(3)).unwrap();
    let mut sim = Simulation::new(network, 2);

    sim.run_for(20_000.0, 50.0);
    let generator = sim.network().segment(inlet).unwrap().generator().unwrap();
    assert_eq!(generator.count(), 3);
    assert!(generator.is_exhausted());
    assert_eq!(sim.network().vehicle_count(), 3);

    sim.run_for(10_000.0, 50.0);
    let generator = sim.network().segment(inlet).unwrap().generator().unwrap();
    assert_eq!(generator.count(), 3);
    assert!(generator.pending().is_none());
}

/// A fork fed by a generator, run for 30 s.
fn run_fork(seed: u64) -> Simulation {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let inlet = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    straight(&mut network, (100.0, 0.0), (200.0, 30.0));
    straight(&mut network, (100.0, 0.0), (200.0, -30.0));
    network.attach_generator(inlet, 2_000.0, None).unwrap();
    let mut sim = Simulation::new(network, seed);
    sim.run_for(30_000.0, 50.0);
    sim
}

#[test]
fn same_seed_replays_identically() {
    let snapshot = |sim: &Simulation| {
        sim.network()
            .vehicles()
            .map(|vehicle| (vehicle.id(), vehicle.location(), vehicle.speed()))
            .collect::<Vec<_>>()
    };
    let first = run_fork(99);
    let second = run_fork(99);
    assert!(!first.network().removals().is_empty());
    assert_eq!(snapshot(&first), snapshot(&second));
    assert_eq!(first.network().removals(), second.network().removals());
}

#[test]
fn non_finite_segment_halts_its_vehicles() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let broken = network
        .add_segment(&SegmentAttributes::new(
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(f64::NAN, 0.0, 0.0),
        ))
        .unwrap();
    assert_eq!(
        network.segment(broken).unwrap().degeneracy(),
        Some(Degeneracy::NonFinite)
    );
    let veh = network
        .add_vehicle(&VehicleAttributes::default(), broken, 0.0)
        .unwrap();
    let mut sim = Simulation::new(network, 1);

    sim.run_for(1_000.0, 50.0);
    let vehicle = sim.network().vehicle(veh).unwrap();
    assert!(vehicle.is_flagged());
    assert_eq!(vehicle.pos(), 0.0);
    assert!(sim.network().removals().is_empty());
}

#[test]
fn zero_length_segment_is_traversed() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let first = straight(&mut network, (0.0, 0.0), (10.0, 0.0));
    let point = straight(&mut network, (10.0, 0.0), (10.0, 0.0));
    let last = straight(&mut network, (10.0, 0.0), (100.0, 0.0));
    assert_eq!(
        network.segment(point).unwrap().degeneracy(),
        Some(Degeneracy::ZeroLength)
    );
    let veh = network
        .add_vehicle(&VehicleAttributes::default(), first, 0.0)
        .unwrap();
    network.set_vehicle_speed(veh, 10.0);
    let mut sim = Simulation::new(network, 1);

    sim.run_for(2_000.0, 50.0);
    let vehicle = sim.network().vehicle(veh).unwrap();
    assert_eq!(vehicle.segment_id(), last);
    assert!(!vehicle.is_flagged());
}

#[test]
fn invalid_time_steps_are_ignored() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let road = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    let veh = network
        .add_vehicle(&VehicleAttributes::default(), road, 0.0)
        .unwrap();
    network.set_vehicle_speed(veh, 10.0);
    let mut sim = Simulation::new(network, 1);

    sim.step(50.0);
    let pos = sim.network().vehicle(veh).unwrap().pos();
    for delta in [f64::NAN, -50.0, f64::INFINITY] {
        sim.step(delta);
        assert_eq!(sim.now_ms(), 50.0);
        assert_eq!(sim.network().now_ms(), 50.0);
        assert_eq!(sim.network().vehicle(veh).unwrap().pos(), pos);
    }
}

#[test]
fn unknown_segments_are_rejected() {
    let mut network = RoadNetwork::new(Default::default()).unwrap();
    let road = straight(&mut network, (0.0, 0.0), (100.0, 0.0));
    // The second key of another network names no segment of this one
    let mut other = RoadNetwork::new(Default::default()).unwrap();
    straight(&mut other, (0.0, 0.0), (1.0, 0.0));
    let stranger = straight(&mut other, (1.0, 0.0), (2.0, 0.0));

    let attributes = VehicleAttributes::default();
    assert!(network.add_vehicle(&attributes, stranger, 0.0).is_err());
    assert!(network.attach_generator(stranger, 1_000.0, None).is_err());
    assert!(network.attach_signal(stranger, red_light()).is_err());
    assert!(network.add_vehicle(&attributes, road, -1.0).is_err());
    assert_eq!(network.vehicle_count(), 0);
}

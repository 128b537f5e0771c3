pub use cgmath;
pub use config::{CorneringStep, CorneringTable, CrashCleanup, SimulationConfig, VehicleProfile};
pub use entity::{Disposable, Positioned, Updatable};
pub use error::{ConfigError, Removal, RemovalReason};
pub use generator::{GeneratorKind, VehicleGenerator};
pub use map::{GeneratorDescriptor, MapDescription, SegmentDescriptor, SignalDescriptor};
pub use network::{RoadNetwork, SignalAhead};
pub use road::{Lane, Road};
pub use segment::{Degeneracy, RoadSegment, SegmentAttributes};
pub use signal::{SignalKind, SignalState, SignalTimings, TrafficFlowControl};
pub use simulation::{Clock, Simulation, TickContext};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::{
    Decision, DecisionEngine, Hazard, LaneChange, LaneChangePlan, Vehicle, VehicleAttributes,
    VehicleState,
};

mod config;
mod entity;
mod error;
mod generator;
mod map;
pub mod math;
mod network;
mod road;
mod segment;
mod signal;
mod simulation;
mod vehicle;

new_key_type! {
    /// Unique ID of a [RoadSegment].
    pub struct SegmentId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type SegmentSet = SlotMap<SegmentId, RoadSegment>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;

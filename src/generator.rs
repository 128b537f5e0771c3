use crate::config::VehicleProfile;
use crate::entity::{Positioned, Updatable};
use crate::error::ConfigError;
use crate::math::Point3d;
use crate::vehicle::VehicleAttributes;
use crate::SegmentId;
use rand::Rng;
use std::str::FromStr;

/// Periodically spawns vehicles at the start of a segment.
///
/// A new vehicle is held as pending until the spawn point is clear,
/// so that a queue backing up to the generator stops it from spawning.
#[derive(Clone, Debug)]
pub struct VehicleGenerator {
    /// The segment vehicles are spawned onto.
    segment: SegmentId,
    /// The start of the segment.
    spawn_point: Point3d,
    /// Time between spawns in ms.
    delay_ms: f64,
    /// The maximum number of vehicles to spawn, or unlimited if `None`.
    max_count: Option<u32>,
    /// The number of vehicles spawned so far.
    count: u32,
    /// Time since the last spawn in ms.
    elapsed: f64,
    /// A vehicle waiting for the spawn point to clear.
    pending: Option<VehicleAttributes>,
}

/// The kinds of generator understood by the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratorKind {
    Periodic,
}

impl FromStr for GeneratorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "periodic" => Ok(GeneratorKind::Periodic),
            _ => Err(ConfigError::UnknownGeneratorType(s.to_owned())),
        }
    }
}

impl VehicleGenerator {
    /// Creates a generator spawning a vehicle every `delay_ms` at `spawn_point`.
    pub fn new(
        segment: SegmentId,
        spawn_point: Point3d,
        delay_ms: f64,
        max_count: Option<u32>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            segment,
            spawn_point,
            delay_ms: ConfigError::check_non_negative("generator.delay_ms", delay_ms)?,
            max_count,
            count: 0,
            elapsed: 0.0,
            pending: None,
        })
    }

    /// The segment the generator spawns vehicles onto.
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    pub fn delay_ms(&self) -> f64 {
        self.delay_ms
    }

    pub fn max_count(&self) -> Option<u32> {
        self.max_count
    }

    /// The number of vehicles spawned so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The vehicle waiting to be spawned, if any.
    pub fn pending(&self) -> Option<&VehicleAttributes> {
        self.pending.as_ref()
    }

    /// Whether the generator has spawned all the vehicles it may.
    pub fn is_exhausted(&self) -> bool {
        self.max_count.map_or(false, |max| self.count >= max)
    }

    /// Synthesises a pending vehicle if one is due.
    pub(crate) fn prepare(&mut self, profile: &VehicleProfile, rng: &mut impl Rng) {
        if self.pending.is_none() && self.elapsed >= self.delay_ms && !self.is_exhausted() {
            self.pending = Some(profile.sample(rng));
        }
    }

    /// Hands over the pending vehicle for insertion into the network.
    pub(crate) fn take_pending(&mut self) -> Option<VehicleAttributes> {
        let attributes = self.pending.take()?;
        self.count += 1;
        self.elapsed = 0.0;
        Some(attributes)
    }
}

impl Updatable for VehicleGenerator {
    fn update(&mut self, delta_ms: f64) {
        if delta_ms > 0.0 {
            self.elapsed += delta_ms;
        }
    }
}

impl Positioned for VehicleGenerator {
    fn location(&self) -> Point3d {
        self.spawn_point
    }
}

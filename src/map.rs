//! Map descriptions, and building a road network from them.

use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::generator::GeneratorKind;
use crate::math::Point3d;
use crate::network::RoadNetwork;
use crate::segment::SegmentAttributes;
use crate::signal::{SignalKind, SignalState, SignalTimings, TrafficFlowControl};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A road network as described by a map file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MapDescription {
    pub segments: Vec<SegmentDescriptor>,
}

/// One segment of a [MapDescription].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub start: [f64; 3],
    pub end: [f64; 3],
    #[serde(default)]
    pub speed_limit: Option<f64>,
    #[serde(default)]
    pub road_name: Option<String>,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub is_inlet: bool,
    #[serde(default, alias = "is_merge_lane")]
    pub merge_lane: bool,
    #[serde(default)]
    pub signal: Option<SignalDescriptor>,
    #[serde(default)]
    pub generator: Option<GeneratorDescriptor>,
}

/// A signal at the end of a segment. Durations are in ms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(alias = "green", alias = "proceed")]
    pub proceed_ms: f64,
    #[serde(alias = "yellow", alias = "caution")]
    pub caution_ms: f64,
    #[serde(alias = "red", alias = "stop")]
    pub stop_ms: f64,
    #[serde(default = "default_initial_state")]
    pub initial_state: SignalState,
}

/// A generator at the start of a segment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeneratorDescriptor {
    #[serde(rename = "type", default = "default_generator_kind")]
    pub kind: String,
    pub delay_ms: f64,
    #[serde(default)]
    pub max_count: Option<u32>,
}

fn default_initial_state() -> SignalState {
    SignalState::Proceed
}

fn default_generator_kind() -> String {
    "periodic".to_owned()
}

impl MapDescription {
    /// Parses a map description from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl SegmentDescriptor {
    pub fn attributes(&self) -> SegmentAttributes {
        SegmentAttributes {
            width: self.width,
            speed_limit: self.speed_limit,
            road_name: self.road_name.clone(),
            is_inlet: self.is_inlet,
            is_merge_lane: self.merge_lane,
            ..SegmentAttributes::new(Point3d::from(self.start), Point3d::from(self.end))
        }
    }
}

impl SignalDescriptor {
    /// Builds the signal. It is moved to the end of its segment when attached.
    pub fn build(&self) -> Result<TrafficFlowControl, ConfigError> {
        let kind: SignalKind = self.kind.parse()?;
        let timings = SignalTimings::new(self.proceed_ms, self.caution_ms, self.stop_ms)?;
        Ok(TrafficFlowControl::new(
            kind,
            timings,
            self.initial_state,
            Point3d::new(0.0, 0.0, 0.0),
        ))
    }
}

impl RoadNetwork {
    /// Builds a network from a map description.
    ///
    /// Construction stops at the first invalid segment, and the error
    /// names the segment's index in the description.
    pub fn from_description(
        description: &MapDescription,
        config: SimulationConfig,
    ) -> Result<Self, ConfigError> {
        let mut network = RoadNetwork::new(config)?;
        for (index, descriptor) in description.segments.iter().enumerate() {
            network
                .add_descriptor(descriptor)
                .map_err(|source| ConfigError::Segment {
                    index,
                    source: Box::new(source),
                })?;
        }
        let names = description
            .segments
            .iter()
            .filter_map(|descriptor| descriptor.road_name.as_deref())
            .unique()
            .collect::<Vec<_>>();
        for name in names {
            network.rebuild_road(name);
        }
        Ok(network)
    }

    fn add_descriptor(&mut self, descriptor: &SegmentDescriptor) -> Result<(), ConfigError> {
        // Check everything before touching the network
        let signal = descriptor
            .signal
            .as_ref()
            .map(SignalDescriptor::build)
            .transpose()?;
        if let Some(generator) = &descriptor.generator {
            generator.kind.parse::<GeneratorKind>()?;
            ConfigError::check_non_negative("generator.delay_ms", generator.delay_ms)?;
        }

        let id = self.insert_segment(&descriptor.attributes())?;
        if let Some(signal) = signal {
            self.attach_signal(id, signal)?;
        }
        if let Some(generator) = &descriptor.generator {
            self.attach_generator(id, generator.delay_ms, generator.max_count)?;
        }
        Ok(())
    }
}

use crate::entity::{Positioned, Updatable};
use crate::error::ConfigError;
use crate::math::Point3d;
use crate::vehicle::Vehicle;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A traffic signal controlling the end of a segment.
///
/// The signal cycles `Proceed → Caution → Stop → Proceed` on a fixed timer,
/// independently of the vehicles around it.
#[derive(Clone, Debug)]
pub struct TrafficFlowControl {
    /// The kind of signal.
    kind: SignalKind,
    /// The current state.
    state: SignalState,
    /// How long each state lasts.
    timings: SignalTimings,
    /// Time spent in the current state, in ms.
    elapsed: f64,
    /// Where the signal stands.
    location: Point3d,
}

/// The kinds of signal understood by the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    TrafficLight,
}

/// The state of a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalState {
    #[serde(alias = "green")]
    Proceed,
    #[serde(alias = "yellow", alias = "amber")]
    Caution,
    #[serde(alias = "red")]
    Stop,
}

/// The duration of each signal state, in ms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SignalTimings {
    pub proceed_ms: f64,
    pub caution_ms: f64,
    pub stop_ms: f64,
}

impl FromStr for SignalKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traffic_light" | "trafficLight" | "light" => Ok(SignalKind::TrafficLight),
            _ => Err(ConfigError::UnknownSignalType(s.to_owned())),
        }
    }
}

impl SignalState {
    /// The state that follows this one.
    pub fn next(self) -> Self {
        match self {
            SignalState::Proceed => SignalState::Caution,
            SignalState::Caution => SignalState::Stop,
            SignalState::Stop => SignalState::Proceed,
        }
    }
}

impl SignalTimings {
    /// Creates a set of timings, rejecting negative durations
    /// and a cycle with no duration at all.
    pub fn new(proceed_ms: f64, caution_ms: f64, stop_ms: f64) -> Result<Self, ConfigError> {
        let timings = Self {
            proceed_ms: ConfigError::check_non_negative("signal.proceed_ms", proceed_ms)?,
            caution_ms: ConfigError::check_non_negative("signal.caution_ms", caution_ms)?,
            stop_ms: ConfigError::check_non_negative("signal.stop_ms", stop_ms)?,
        };
        ConfigError::check_positive("signal cycle length", timings.cycle_ms())?;
        Ok(timings)
    }

    /// The duration of the given state in ms.
    pub fn duration(&self, state: SignalState) -> f64 {
        match state {
            SignalState::Proceed => self.proceed_ms,
            SignalState::Caution => self.caution_ms,
            SignalState::Stop => self.stop_ms,
        }
    }

    /// The length of a full cycle in ms.
    pub fn cycle_ms(&self) -> f64 {
        self.proceed_ms + self.caution_ms + self.stop_ms
    }
}

impl TrafficFlowControl {
    /// Creates a signal at `location` in the `initial` state.
    pub fn new(
        kind: SignalKind,
        timings: SignalTimings,
        initial: SignalState,
        location: Point3d,
    ) -> Self {
        Self {
            kind,
            state: initial,
            timings,
            elapsed: 0.0,
            location,
        }
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// The current state of the signal.
    pub fn current_state(&self) -> SignalState {
        self.state
    }

    pub fn timings(&self) -> &SignalTimings {
        &self.timings
    }

    /// Time spent in the current state, in ms.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Time left before the signal changes state, in ms.
    pub fn remaining(&self) -> f64 {
        self.timings.duration(self.state) - self.elapsed
    }

    /// Whether the signal tells the vehicle to stop.
    ///
    /// A vehicle that already covers the signal's location is in the
    /// intersection and is never told to stop.
    pub fn should_stop(&self, vehicle: &Vehicle) -> bool {
        match self.state {
            SignalState::Proceed => false,
            SignalState::Caution | SignalState::Stop => {
                !vehicle.bounds().contains_point(self.location)
            }
        }
    }

    pub(crate) fn set_location(&mut self, location: Point3d) {
        self.location = location;
    }
}

impl Updatable for TrafficFlowControl {
    fn update(&mut self, delta_ms: f64) {
        if !(delta_ms > 0.0) || !delta_ms.is_finite() {
            return;
        }
        self.elapsed += delta_ms;
        // Whole cycles leave the state unchanged
        let cycle = self.timings.cycle_ms();
        if self.elapsed >= cycle {
            self.elapsed %= cycle;
        }
        let mut duration = self.timings.duration(self.state);
        while self.elapsed >= duration {
            self.elapsed -= duration;
            self.state = self.state.next();
            duration = self.timings.duration(self.state);
        }
    }
}

impl Positioned for TrafficFlowControl {
    fn location(&self) -> Point3d {
        self.location
    }
}

//! Tunable parameters of the simulation.

use crate::error::ConfigError;
use crate::math::Interval;
use crate::vehicle::VehicleAttributes;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// The tunable parameters of a simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Distance between consecutive sample points along a segment.
    pub sample_spacing: f64,
    /// Distance within which two points are considered coincident.
    pub point_tolerance: f64,
    /// Maximum heading difference, in degrees, between parallel segments.
    pub parallel_heading_tolerance: f64,
    /// Maximum sample point distance between parallel segments.
    pub parallel_radius: f64,
    /// Half-angle of a vehicle's forward view cone, in degrees.
    pub view_angle: f64,
    /// Half-angle of the view cone while changing lanes, in degrees.
    pub lane_change_view_angle: f64,
    /// Minimum time between two lane changes of a vehicle, in ms.
    pub change_lane_delay_ms: f64,
    /// Speed below which a vehicle counts as stopped.
    pub stop_speed: f64,
    /// Bumper to bumper gap kept to a stopped obstacle.
    pub min_gap: f64,
    /// Lateral clearance needed to pass a vehicle without following it.
    pub lateral_clearance: f64,
    /// Lower bound on braking, as a fraction of the vehicle's deceleration.
    pub min_brake_factor: f64,
    /// Upper bound on braking, as a multiple of the vehicle's deceleration.
    pub max_brake_factor: f64,
    /// Deceleration of a crashed vehicle, as a multiple of its deceleration.
    pub crash_decay_factor: f64,
    pub cornering: CorneringTable,
    pub vehicle_profile: VehicleProfile,
    pub crash_cleanup: CrashCleanup,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_spacing: 5.0,
            point_tolerance: 0.01,
            parallel_heading_tolerance: 5.0,
            parallel_radius: 12.0,
            view_angle: 45.0,
            lane_change_view_angle: 90.0,
            change_lane_delay_ms: 3000.0,
            stop_speed: 0.1,
            min_gap: 1.0,
            lateral_clearance: 0.5,
            min_brake_factor: 0.25,
            max_brake_factor: 4.0,
            crash_decay_factor: 2.0,
            cornering: Default::default(),
            vehicle_profile: Default::default(),
            crash_cleanup: Default::default(),
        }
    }
}

impl SimulationConfig {
    /// Parses a configuration from JSON. Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every parameter is within its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("sample_spacing", self.sample_spacing)?;
        ConfigError::check_positive("point_tolerance", self.point_tolerance)?;
        ConfigError::check_non_negative(
            "parallel_heading_tolerance",
            self.parallel_heading_tolerance,
        )?;
        ConfigError::check_non_negative("parallel_radius", self.parallel_radius)?;
        ConfigError::check_non_negative("view_angle", self.view_angle)?;
        ConfigError::check_non_negative("lane_change_view_angle", self.lane_change_view_angle)?;
        ConfigError::check_non_negative("change_lane_delay_ms", self.change_lane_delay_ms)?;
        ConfigError::check_positive("stop_speed", self.stop_speed)?;
        ConfigError::check_non_negative("min_gap", self.min_gap)?;
        ConfigError::check_non_negative("lateral_clearance", self.lateral_clearance)?;
        ConfigError::check_positive("min_brake_factor", self.min_brake_factor)?;
        ConfigError::check_positive("max_brake_factor", self.max_brake_factor)?;
        ConfigError::check_positive("crash_decay_factor", self.crash_decay_factor)?;
        if self.min_brake_factor > self.max_brake_factor {
            return Err(ConfigError::OutOfRange {
                field: "min_brake_factor",
                expected: "no greater than max_brake_factor",
                value: self.min_brake_factor,
            });
        }
        self.cornering.validate()?;
        self.vehicle_profile.validate()?;
        self.crash_cleanup.validate()
    }
}

/// One row of the [CorneringTable].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorneringStep {
    /// The row applies to heading changes strictly below this angle, in degrees.
    pub below: f64,
    pub max_speed: f64,
}

/// Maps an upcoming heading change to a maximum cornering speed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorneringTable {
    /// Rows ordered by increasing angle and non-increasing speed.
    pub steps: Vec<CorneringStep>,
    /// The speed used when the heading change exceeds every row.
    pub otherwise: f64,
}

impl Default for CorneringTable {
    fn default() -> Self {
        let step = |below, max_speed| CorneringStep { below, max_speed };
        Self {
            steps: vec![
                step(12.0, f64::INFINITY),
                step(25.0, 100.0),
                step(45.0, 30.0),
                step(90.0, 10.0),
                step(135.0, 5.0),
            ],
            otherwise: 1.0,
        }
    }
}

impl CorneringTable {
    /// The maximum speed for a heading change of `degrees`.
    pub fn max_speed(&self, degrees: f64) -> f64 {
        self.steps
            .iter()
            .find(|step| degrees < step.below)
            .map(|step| step.max_speed)
            .unwrap_or(self.otherwise)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason| ConfigError::InvalidTable {
            table: "cornering",
            reason,
        };
        let monotone = self.steps.windows(2).all(|pair| {
            pair[0].below < pair[1].below && pair[0].max_speed >= pair[1].max_speed
        });
        if !monotone {
            return Err(invalid("rows must increase in angle and not increase in speed"));
        }
        if self.steps.iter().any(|s| !(s.max_speed >= 0.0) || s.below.is_nan()) {
            return Err(invalid("speeds must be non-negative"));
        }
        match self.steps.last() {
            Some(last) if last.max_speed < self.otherwise => {
                Err(invalid("fallback speed exceeds the last row"))
            }
            _ => ConfigError::check_limit("cornering.otherwise", self.otherwise).map(|_| ()),
        }
    }
}

/// Ranges from which generated vehicles draw their attributes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleProfile {
    pub width: Interval,
    pub length: Interval,
    pub height: Interval,
    pub max_speed: Interval,
    pub acceleration: Interval,
    pub deceleration: Interval,
    /// Reaction time in s.
    pub reaction_time: Interval,
}

impl Default for VehicleProfile {
    fn default() -> Self {
        Self {
            width: Interval::new(1.8, 2.2),
            length: Interval::new(4.0, 5.5),
            height: Interval::new(1.4, 2.0),
            max_speed: Interval::new(25.0, 40.0),
            acceleration: Interval::new(2.0, 3.5),
            deceleration: Interval::new(5.0, 8.0),
            reaction_time: Interval::new(0.3, 0.8),
        }
    }
}

impl VehicleProfile {
    /// Draws a random set of vehicle attributes from the profile.
    pub fn sample(&self, rng: &mut impl Rng) -> VehicleAttributes {
        let mut draw =
            |range: Interval| Uniform::new_inclusive(range.min, range.max).sample(&mut *rng);
        VehicleAttributes {
            width: draw(self.width),
            length: draw(self.length),
            height: draw(self.height),
            max_speed: draw(self.max_speed),
            acceleration: draw(self.acceleration),
            deceleration: draw(self.deceleration),
            reaction_time: draw(self.reaction_time),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("vehicle_profile.width", self.width),
            ("vehicle_profile.length", self.length),
            ("vehicle_profile.height", self.height),
            ("vehicle_profile.max_speed", self.max_speed),
            ("vehicle_profile.acceleration", self.acceleration),
            ("vehicle_profile.deceleration", self.deceleration),
            ("vehicle_profile.reaction_time", self.reaction_time),
        ];
        for (field, range) in ranges {
            if !range.is_valid() {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "an ordered, finite range",
                    value: range.min,
                });
            }
        }
        // Sampled values must themselves be valid attributes
        VehicleAttributes {
            width: self.width.min,
            length: self.length.min,
            height: self.height.min,
            max_speed: self.max_speed.min,
            acceleration: self.acceleration.min,
            deceleration: self.deceleration.min,
            reaction_time: self.reaction_time.min,
        }
        .validate()
    }
}

/// How long a crashed vehicle stays on the road, by its speed when it crashed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashCleanup {
    /// Crashes below this speed use the `low` range.
    pub low_speed_below: f64,
    /// Crashes below this speed (and not low) use the `medium` range.
    pub medium_speed_below: f64,
    /// Cleanup delays in ms.
    pub low: Interval,
    pub medium: Interval,
    pub high: Interval,
}

impl Default for CrashCleanup {
    fn default() -> Self {
        Self {
            low_speed_below: 10.0,
            medium_speed_below: 25.0,
            low: Interval::new(3_000.0, 6_000.0),
            medium: Interval::new(6_000.0, 12_000.0),
            high: Interval::new(12_000.0, 20_000.0),
        }
    }
}

impl CrashCleanup {
    /// Draws the delay, in ms, before a vehicle that crashed at `speed` is removed.
    pub fn delay(&self, speed: f64, rng: &mut impl Rng) -> f64 {
        let range = if speed < self.low_speed_below {
            self.low
        } else if speed < self.medium_speed_below {
            self.medium
        } else {
            self.high
        };
        Uniform::new_inclusive(range.min, range.max).sample(rng)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_non_negative("crash_cleanup.low_speed_below", self.low_speed_below)?;
        if !(self.medium_speed_below >= self.low_speed_below) {
            return Err(ConfigError::OutOfRange {
                field: "crash_cleanup.medium_speed_below",
                expected: "no less than low_speed_below",
                value: self.medium_speed_below,
            });
        }
        for (field, range) in [
            ("crash_cleanup.low", self.low),
            ("crash_cleanup.medium", self.medium),
            ("crash_cleanup.high", self.high),
        ] {
            if !range.is_valid() || range.min < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    expected: "an ordered, non-negative range",
                    value: range.min,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn cornering_steps() {
        let table = CorneringTable::default();
        assert_eq!(table.max_speed(0.0), f64::INFINITY);
        assert_eq!(table.max_speed(11.9), f64::INFINITY);
        assert_eq!(table.max_speed(12.0), 100.0);
        assert_eq!(table.max_speed(30.0), 30.0);
        assert_eq!(table.max_speed(45.0), 10.0);
        assert_eq!(table.max_speed(100.0), 5.0);
        assert_eq!(table.max_speed(135.0), 1.0);
        assert_eq!(table.max_speed(180.0), 1.0);
    }

    #[test]
    fn non_monotone_table_is_rejected() {
        let mut config = SimulationConfig::default();
        config.cornering.steps[2].max_speed = 500.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTable { .. })
        ));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = SimulationConfig::from_json_str(r#"{ "view_angle": 30.0 }"#).unwrap();
        assert_eq!(config.view_angle, 30.0);
        assert_eq!(config.sample_spacing, 5.0);
    }

    #[test]
    fn negative_values_are_rejected() {
        let result = SimulationConfig::from_json_str(r#"{ "change_lane_delay_ms": -1.0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::OutOfRange {
                field: "change_lane_delay_ms",
                ..
            })
        ));
    }

    #[test]
    fn sampled_vehicles_are_within_profile() {
        let profile = VehicleProfile::default();
        let mut rng = rand::rngs::StdRng::from_seed(*b"Vegemite sandwhich is not fun...");
        for _ in 0..100 {
            let attrs = profile.sample(&mut rng);
            assert!(profile.length.contains(attrs.length));
            assert!(profile.reaction_time.contains(attrs.reaction_time));
            attrs.validate().unwrap();
        }
    }

    #[test]
    fn crash_brackets() {
        let cleanup = CrashCleanup::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        assert!(cleanup.low.contains(cleanup.delay(2.0, &mut rng)));
        assert!(cleanup.medium.contains(cleanup.delay(15.0, &mut rng)));
        assert!(cleanup.high.contains(cleanup.delay(60.0, &mut rng)));
    }
}

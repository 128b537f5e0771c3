use crate::{SegmentId, VehicleId};
use thiserror::Error;

/// An error in the map description or the simulation configuration.
/// These are fatal at load time: construction stops at the first one.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown signal type `{0}`")]
    UnknownSignalType(String),
    #[error("unknown generator type `{0}`")]
    UnknownGeneratorType(String),
    #[error("`{field}` must be {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("invalid {table} table: {reason}")]
    InvalidTable {
        table: &'static str,
        reason: &'static str,
    },
    #[error("no segment with ID {0:?}")]
    UnknownSegment(SegmentId),
    #[error("segment {index} of the map description is invalid: {source}")]
    Segment {
        index: usize,
        #[source]
        source: Box<ConfigError>,
    },
    #[error("malformed description: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Fails unless `value` is finite and not negative.
    pub(crate) fn check_non_negative(field: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(Self::OutOfRange {
                field,
                expected: "a finite, non-negative number",
                value,
            })
        }
    }

    /// Fails unless `value` is finite and strictly positive.
    pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Self::OutOfRange {
                field,
                expected: "a finite, positive number",
                value,
            })
        }
    }

    /// Fails if `value` is NaN or negative. Infinity is accepted.
    pub(crate) fn check_limit(field: &'static str, value: f64) -> Result<f64, Self> {
        if value >= 0.0 {
            Ok(value)
        } else {
            Err(Self::OutOfRange {
                field,
                expected: "a non-negative number",
                value,
            })
        }
    }
}

/// Why a vehicle left the simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemovalReason {
    /// The vehicle passed the end of a segment with no successor.
    EndOfNetwork,
    /// The vehicle crashed and its cleanup deadline passed.
    CrashCleanup,
    /// The vehicle was removed by the caller.
    Explicit,
    /// The vehicle's bookkeeping was inconsistent, e.g. its segment vanished.
    InvariantViolation,
}

/// A record of a vehicle leaving the simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Removal {
    pub vehicle: VehicleId,
    pub reason: RemovalReason,
    /// Simulation time of the removal in ms.
    pub at_ms: f64,
}

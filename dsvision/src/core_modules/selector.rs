//! Target selection: turns detection results into telemetry values.
//!
//! Tape keeps exactly two slots, filled positionally from the detector order.
//! Gear reports every candidate under its own indexed key.

use crate::core_modules::candidate::DetectionResult;
use crate::core_modules::telemetry::TelemetryPublisher;
use serde::{Deserialize, Serialize};

/// Published when a slot has no candidate.
pub const NOT_DETECTED: f64 = -1.0;

/// Subtables of `CameraPublisher` the loop writes to.
pub const RETROTAPE_TABLE: &str = "Retrotape";
pub const GEAR_TABLE: &str = "Gear";

pub const TAPE_ONE_KEY: &str = "Tape One Center";
pub const TAPE_TWO_KEY: &str = "Tape Two Center";

/// The two tape slots of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TapeSelection {
    pub one: Option<i32>,
    pub two: Option<i32>,
}

impl TapeSelection {
    pub fn one_center(&self) -> f64 {
        self.one.map_or(NOT_DETECTED, f64::from)
    }

    pub fn two_center(&self) -> f64 {
        self.two.map_or(NOT_DETECTED, f64::from)
    }

    /// Writes both slots. A missing slot is written as the sentinel, never skipped.
    pub fn publish(&self, publisher: &mut impl TelemetryPublisher) {
        publisher.publish(TAPE_ONE_KEY, self.one_center());
        publisher.publish(TAPE_TWO_KEY, self.two_center());
    }
}

/// Picks entries 0 and 1 of `result`, each slot checked on its own.
pub fn select_tape(result: &DetectionResult) -> TapeSelection {
    TapeSelection {
        one: result.get(0).map(|candidate| candidate.centroid_x),
        two: result.get(1).map(|candidate| candidate.centroid_x),
    }
}

/// One reported gear candidate, keyed by its position in the detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearReading {
    pub index: usize,
    pub center: i32,
}

pub fn select_gears(result: &DetectionResult) -> Vec<GearReading> {
    result
        .indexed()
        .map(|(index, candidate)| GearReading {
            index,
            center: candidate.centroid_x,
        })
        .collect()
}

pub fn gear_key(index: usize) -> String {
    format!("Gear {index} Center")
}

pub fn publish_gears(readings: &[GearReading], publisher: &mut impl TelemetryPublisher) {
    for reading in readings {
        publisher.publish(&gear_key(reading.index), f64::from(reading.center));
    }
}

/// Which detector output drives the gear telemetry and the annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GearSource {
    /// The gear detector, the intended wiring.
    #[default]
    Gear,
    /// The tape detector. Matches the behaviour of earlier deployments, which
    /// reported tape regions under the gear keys.
    Tape,
}

impl std::str::FromStr for GearSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gear" => Ok(GearSource::Gear),
            "tape" => Ok(GearSource::Tape),
            other => Err(format!("unknown gear source '{other}' (expected gear or tape)")),
        }
    }
}

use std::time::Duration;

pub mod atc;
pub mod engine;
pub mod entities;
pub mod error;
pub mod flight_plan;
pub mod geometry;
pub mod pathfinder;

pub use error::{Error, Result};

pub const DEFAULT_TICK_RATE_TPS: usize = 15;

pub const NAUTICALMILES_TO_FEET: f32 = 6076.115;
pub const KNOT_TO_FEET_PER_SECOND: f32 = 1.68781;
pub const KNOT_TO_METERS_PER_SECOND: f32 = 0.514444;
pub const METERS_TO_FEET: f32 = 3.28084;
pub const FEET_TO_METERS: f32 = 0.3048;

/// Number of consecutive evaluations without progress before an agent is
/// declared stuck and removed.
pub const AI_STUCK_LIMIT: u32 = 100;

/// Two distance-to-go samples closer than this (in feet) count as "no
/// progress" for stuck detection.
pub const STUCK_TOLERANCE_FT: f32 = 0.03;

/// Minimum time an aircraft waits at the gate before its next departure.
pub const MIN_TURNAROUND: Duration = Duration::from_secs(1200);

pub const APPROACH_ALTITUDE: f32 = 2000.0;

/// Substring marking the final waypoint of a generated leg.
pub const LEG_END: &str = "legend";

pub fn sign3(x: f32) -> f32 {
  if x > 0.0 {
    1.0
  } else if x < 0.0 {
    -1.0
  } else {
    0.0
  }
}

/// Duration between two sim timestamps in signed seconds (`a - b`).
pub fn seconds_between(a: Duration, b: Duration) -> f32 {
  a.as_secs_f32() - b.as_secs_f32()
}

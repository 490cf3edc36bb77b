use std::time::Duration;

use internment::Intern;
use serde::{Deserialize, Serialize};

use super::Waypoint;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FlightRules {
  #[default]
  Ifr,
  Vfr,
}

/// One scheduled flight between two airports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFlight {
  pub callsign: Intern<String>,
  pub departure: Intern<String>,
  pub arrival: Intern<String>,
  pub departure_time: Duration,
  pub arrival_time: Duration,
  /// Feet.
  pub cruise_altitude: f32,
  #[serde(default)]
  pub flight_rules: FlightRules,
}

impl ScheduledFlight {
  pub fn new(
    callsign: Intern<String>,
    departure: Intern<String>,
    arrival: Intern<String>,
    departure_time: Duration,
    arrival_time: Duration,
  ) -> Self {
    Self {
      callsign,
      departure,
      arrival,
      departure_time,
      arrival_time,
      cruise_altitude: 30000.0,
      flight_rules: FlightRules::Ifr,
    }
  }

  pub fn with_cruise_altitude(mut self, cruise_altitude: f32) -> Self {
    self.cruise_altitude = cruise_altitude;
    self
  }

  pub fn with_flight_rules(mut self, flight_rules: FlightRules) -> Self {
    self.flight_rules = flight_rules;
    self
  }

  fn shift(&mut self, offset: Duration) {
    self.departure_time += offset;
    self.arrival_time += offset;
  }
}

/// The rotation an aircraft flies: its flights in order, plus the
/// per-airframe data the path synthesizer needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficSchedule {
  /// Traffic type used to pick the runway class (`gate`, `ga`, `mil-*`...).
  pub flight_type: String,
  /// Wingspan radius in feet, used to fit gates.
  pub radius: f32,
  /// Standard departure to fly instead of a synthesized climb.
  #[serde(default)]
  pub sid: Option<Vec<Waypoint>>,
  /// When set, the rotation starts over this much later once the last
  /// flight is done.
  #[serde(default)]
  pub repeat_period: Option<Duration>,

  flights: Vec<ScheduledFlight>,
  #[serde(default)]
  current: usize,
}

impl TrafficSchedule {
  pub fn new(
    flight_type: impl Into<String>,
    radius: f32,
    flights: Vec<ScheduledFlight>,
  ) -> Self {
    Self {
      flight_type: flight_type.into(),
      radius,
      sid: None,
      repeat_period: None,
      flights,
      current: 0,
    }
  }

  pub fn with_sid(mut self, sid: Vec<Waypoint>) -> Self {
    self.sid = Some(sid);
    self
  }

  pub fn with_repeat_period(mut self, period: Duration) -> Self {
    self.repeat_period = Some(period);
    self
  }

  pub fn flights(&self) -> &[ScheduledFlight] {
    &self.flights
  }

  pub fn current(&self) -> Option<&ScheduledFlight> {
    self.flights.get(self.current)
  }

  /// Moves on to the next flight. Returns `false` when the rotation is
  /// over and does not repeat.
  pub fn advance(&mut self) -> bool {
    if self.current + 1 < self.flights.len() {
      self.current += 1;
      return true;
    }

    match self.repeat_period {
      Some(period) if !self.flights.is_empty() => {
        for flight in self.flights.iter_mut() {
          flight.shift(period);
        }
        self.current = 0;
        true
      }
      _ => false,
    }
  }
}

use std::{collections::HashMap, path::Path, time::Duration};

use glam::Vec2;
use internment::Intern;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use traffic::{
  DEFAULT_TICK_RATE_TPS,
  entities::{
    airport::{Airport, Frequencies, Gate, Runway, RunwayClass},
    performance::Performance,
  },
  flight_plan::{FlightRules, ScheduledFlight, TrafficSchedule},
  geometry::Translate,
  pathfinder::{GroundNetwork, Node, NodeKind},
};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file: {0}")]
  Read(#[from] std::io::Error),
  #[error("failed to parse config file: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("airport {airport}: unknown ground node {node:?}")]
  UnknownNode { airport: String, node: String },
  #[error("flight {0} has no legs")]
  NoLegs(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  pub world: Option<WorldConfig>,
  #[serde(default)]
  pub airports: Vec<AirportConfig>,
  #[serde(default)]
  pub flights: Vec<FlightConfig>,
}

impl Config {
  pub fn from_path<T>(path: T) -> Result<Self, ConfigError>
  where
    T: AsRef<Path>,
  {
    let config = std::fs::read_to_string(path.as_ref())?;
    Ok(toml::from_str(&config)?)
  }

  pub fn world(&self) -> WorldConfig {
    self.world.unwrap_or_default()
  }

  pub fn build_airports(&self) -> Result<Vec<Airport>, ConfigError> {
    self.airports.iter().map(Airport::try_from).collect()
  }

  pub fn build_flights(
    &self,
  ) -> Result<Vec<(TrafficSchedule, Performance)>, ConfigError> {
    self
      .flights
      .iter()
      .map(|flight| Ok((flight.schedule()?, flight.performance())))
      .collect()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldConfig {
  pub seed: Option<u64>,
  /// Ticks per simulated second.
  pub tick_rate: Option<usize>,
  /// Simulated seconds to run for.
  pub duration: Option<u64>,
  /// Clock value, in seconds, when the simulation starts.
  pub start_time: Option<u64>,
  /// Pace ticks to the wall clock instead of running flat out.
  pub realtime: Option<bool>,
}

impl WorldConfig {
  pub fn tick_rate(&self) -> usize {
    self.tick_rate.unwrap_or(DEFAULT_TICK_RATE_TPS).max(1)
  }

  pub fn start_time(&self) -> Duration {
    Duration::from_secs(self.start_time.unwrap_or_default())
  }
}

/// Positions inside an airport are relative to its center.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirportConfig {
  pub id: String,
  #[serde(default)]
  pub center: Vec2,
  pub elevation: Option<f32>,
  pub wind_heading: Option<f32>,
  pub frequencies: Option<Frequencies>,
  #[serde(default)]
  pub runways: Vec<RunwayConfig>,
  #[serde(default)]
  pub gates: Vec<GateConfig>,
  #[serde(default)]
  pub nodes: Vec<NodeConfig>,
  /// Each entry is a chain of node names joined one after the other.
  #[serde(default)]
  pub taxiways: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunwayConfig {
  pub id: String,
  pub start: Vec2,
  pub heading: f32,
  pub length: f32,
  pub displaced_threshold: Option<f32>,
  pub class: Option<RunwayClass>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
  pub id: String,
  pub pos: Vec2,
  pub heading: f32,
  pub radius: f32,
  pub node: Option<String>,
  pub pushback: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
  pub name: String,
  #[serde(default)]
  pub kind: NodeKind,
  pub pos: Vec2,
}

impl TryFrom<&AirportConfig> for Airport {
  type Error = ConfigError;

  fn try_from(value: &AirportConfig) -> Result<Self, Self::Error> {
    let mut airport = Airport::new(Intern::from_ref(&value.id), Vec2::ZERO)
      .with_elevation(value.elevation.unwrap_or_default())
      .with_wind(value.wind_heading.unwrap_or_default());
    airport.frequencies = value.frequencies.clone().unwrap_or_default();

    for runway in value.runways.iter() {
      airport.add_runway(
        Runway::new(
          Intern::from_ref(&runway.id),
          runway.start,
          runway.heading,
          runway.length,
        )
        .with_displaced_threshold(runway.displaced_threshold.unwrap_or_default())
        .with_class(runway.class.unwrap_or_default()),
      );
    }

    let mut network = GroundNetwork::new();
    let mut indices = HashMap::new();
    for node in value.nodes.iter() {
      let index = network.add_node(Node::new(
        Intern::from_ref(&node.name),
        node.kind,
        node.pos,
      ));
      indices.insert(node.name.as_str(), index);
    }

    let lookup = |name: &str| {
      indices
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownNode {
          airport: value.id.clone(),
          node: name.to_owned(),
        })
    };

    for taxiway in value.taxiways.iter() {
      for pair in taxiway.windows(2) {
        network.connect(lookup(&pair[0])?, lookup(&pair[1])?);
      }
    }

    for gate in value.gates.iter() {
      let node = gate.node.as_deref().map(lookup).transpose()?;
      let pushback = gate.pushback.as_deref().map(lookup).transpose()?;
      airport.add_gate(
        Gate::new(
          Intern::from_ref(&gate.id),
          gate.pos,
          gate.heading,
          gate.radius,
        )
        .with_nodes(node, pushback),
      );
    }

    if !network.is_empty() {
      airport.ground_network = Some(network);
    }
    airport.translate(value.center);

    Ok(airport)
  }
}

/// One airframe and the rotation it flies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightConfig {
  pub callsign: String,
  /// Performance category, see `Performance::for_category`.
  pub performance: Option<String>,
  pub flight_type: Option<String>,
  /// Wingspan radius in feet.
  pub radius: Option<f32>,
  /// Seconds after which the rotation repeats.
  pub repeat_period: Option<u64>,
  #[serde(default)]
  pub legs: Vec<LegConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegConfig {
  /// Callsign for this flight if it differs from the airframe's.
  pub callsign: Option<String>,
  pub departure: String,
  pub arrival: String,
  /// Seconds on the simulation clock.
  pub departure_time: u64,
  pub arrival_time: u64,
  pub cruise_altitude: Option<f32>,
  pub flight_rules: Option<FlightRules>,
}

impl FlightConfig {
  pub fn performance(&self) -> Performance {
    Performance::for_category(self.performance.as_deref().unwrap_or("jet"))
  }

  pub fn schedule(&self) -> Result<TrafficSchedule, ConfigError> {
    if self.legs.is_empty() {
      return Err(ConfigError::NoLegs(self.callsign.clone()));
    }

    let flights = self
      .legs
      .iter()
      .map(|leg| {
        let callsign = leg.callsign.as_deref().unwrap_or(&self.callsign);
        let mut flight = ScheduledFlight::new(
          Intern::from_ref(callsign),
          Intern::from_ref(&leg.departure),
          Intern::from_ref(&leg.arrival),
          Duration::from_secs(leg.departure_time),
          Duration::from_secs(leg.arrival_time),
        )
        .with_flight_rules(leg.flight_rules.unwrap_or_default());
        if let Some(altitude) = leg.cruise_altitude {
          flight = flight.with_cruise_altitude(altitude);
        }
        flight
      })
      .collect();

    let mut schedule = TrafficSchedule::new(
      self.flight_type.as_deref().unwrap_or("gate"),
      self.radius.unwrap_or(60.0),
      flights,
    );
    if let Some(period) = self.repeat_period {
      schedule = schedule.with_repeat_period(Duration::from_secs(period));
    }

    Ok(schedule)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCENARIO: &str = r#"
    [world]
    seed = 3
    tick_rate = 10

    [[airports]]
    id = "KDEP"
    center = [1000.0, 2000.0]
    elevation = 100.0
    taxiways = [["A1", "A1P", "HS36", "RW36"]]

    [[airports.runways]]
    id = "36"
    start = [0.0, -5000.0]
    heading = 0.0
    length = 10000.0

    [[airports.gates]]
    id = "A1"
    pos = [-1000.0, 0.0]
    heading = 90.0
    radius = 120.0
    node = "A1"
    pushback = "A1P"

    [[airports.nodes]]
    name = "A1"
    kind = "gate"
    pos = [-1000.0, 0.0]

    [[airports.nodes]]
    name = "A1P"
    kind = "pushback"
    pos = [-1200.0, 0.0]

    [[airports.nodes]]
    name = "HS36"
    kind = "holdshort"
    pos = [-300.0, -4800.0]

    [[airports.nodes]]
    name = "RW36"
    kind = "runway"
    pos = [0.0, -4800.0]

    [[flights]]
    callsign = "TST1"
    performance = "turboprop"
    repeat_period = 86400

    [[flights.legs]]
    departure = "KDEP"
    arrival = "KARR"
    departure_time = 60
    arrival_time = 3600

    [[flights.legs]]
    callsign = "TST2"
    departure = "KARR"
    arrival = "KDEP"
    departure_time = 7200
    arrival_time = 10800
    cruise_altitude = 24000.0
  "#;

  fn config() -> Config {
    toml::from_str(SCENARIO).unwrap()
  }

  #[test]
  fn test_world_defaults() {
    let empty = Config::default();
    assert_eq!(empty.world().tick_rate(), DEFAULT_TICK_RATE_TPS);
    assert_eq!(empty.world().start_time(), Duration::ZERO);

    let world = config().world();
    assert_eq!(world.seed, Some(3));
    assert_eq!(world.tick_rate(), 10);
  }

  #[test]
  fn test_airport_is_translated() {
    let airports = config().build_airports().unwrap();
    let airport = &airports[0];

    assert_eq!(airport.center, Vec2::new(1000.0, 2000.0));
    assert_eq!(airport.runways[0].start, Vec2::new(1000.0, -3000.0));
    assert_eq!(airport.gates[0].pos, Vec2::new(0.0, 2000.0));
  }

  #[test]
  fn test_ground_network_is_connected() {
    let airports = config().build_airports().unwrap();
    let network = airports[0].ground_network.as_ref().unwrap();
    let gate = airports[0].gates[0].node.unwrap();
    let runway = network.node_by_name(Intern::from_ref("RW36")).unwrap();

    assert_eq!(network.len(), 4);
    assert_eq!(network.shortest_route(gate, runway).map(|r| r.len()), Some(4));
  }

  #[test]
  fn test_unknown_taxiway_node() {
    let mut scenario = config();
    scenario.airports[0].taxiways.push(vec!["A1".into(), "B9".into()]);

    let result = scenario.build_airports();
    assert!(matches!(
      result,
      Err(ConfigError::UnknownNode { node, .. }) if node == "B9"
    ));
  }

  #[test]
  fn test_flight_schedule() {
    let flights = config().build_flights().unwrap();
    let (schedule, performance) = &flights[0];

    assert_eq!(*performance, Performance::turboprop());
    assert_eq!(schedule.flights().len(), 2);
    assert_eq!(schedule.flights()[1].callsign.as_str(), "TST2");
    assert_eq!(schedule.flights()[1].cruise_altitude, 24000.0);
    assert_eq!(schedule.repeat_period, Some(Duration::from_secs(86400)));
  }

  #[test]
  fn test_flight_without_legs() {
    let mut scenario = config();
    scenario.flights[0].legs.clear();
    assert!(matches!(
      scenario.build_flights(),
      Err(ConfigError::NoLegs(callsign)) if callsign == "TST1"
    ));
  }

  #[test]
  fn test_demo_scenario_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/scenario.toml");
    let config = Config::from_path(path).unwrap();

    let airports = config.build_airports().unwrap();
    assert_eq!(airports.len(), 2);
    assert!(airports[0].ground_network.is_some());
    assert!(airports[1].ground_network.is_none());
    assert_eq!(config.build_flights().unwrap().len(), 3);
  }
}

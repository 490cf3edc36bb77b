use glam::Vec2;
use internment::Intern;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  geometry::{Translate, delta_angle, inverse_degrees, move_point},
  pathfinder::GroundNetwork,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frequencies {
  pub clearance: f32,
  pub ground: f32,
  pub tower: f32,
  pub approach: f32,
}

impl Default for Frequencies {
  fn default() -> Self {
    Self {
      clearance: 121.9,
      ground: 121.7,
      tower: 118.5,
      approach: 119.1,
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RunwayClass {
  #[default]
  Commercial,
  General,
  Ultralight,
  Military,
}

impl RunwayClass {
  pub fn from_flight_type(flight_type: &str) -> Self {
    match flight_type {
      "gate" | "cargo" => Self::Commercial,
      "ga" => Self::General,
      "ul" => Self::Ultralight,
      t if t.starts_with("mil-") => Self::Military,
      _ => Self::Commercial,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunwayUsage {
  #[default]
  Takeoff,
  Landing,
}

/// A runway direction. `start` is the physical beginning of the pavement,
/// the landing threshold is `displaced_threshold` feet further along.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Runway {
  pub id: Intern<String>,
  pub start: Vec2,
  pub heading: f32,
  pub length: f32,
  #[serde(default)]
  pub displaced_threshold: f32,
  #[serde(default)]
  pub class: RunwayClass,
}

impl Translate for Runway {
  fn translate(&mut self, offset: Vec2) {
    self.start += offset;
  }
}

impl Runway {
  pub fn new(id: Intern<String>, start: Vec2, heading: f32, length: f32) -> Self {
    Self {
      id,
      start,
      heading,
      length,
      displaced_threshold: 0.0,
      class: RunwayClass::default(),
    }
  }

  pub fn with_displaced_threshold(mut self, displaced: f32) -> Self {
    self.displaced_threshold = displaced;
    self
  }

  pub fn with_class(mut self, class: RunwayClass) -> Self {
    self.class = class;
    self
  }

  /// Point `distance` feet along the centerline from the start of the
  /// pavement. Negative values lie before the runway.
  pub fn point_on_centerline(&self, distance: f32) -> Vec2 {
    move_point(self.start, self.heading, distance)
  }

  pub fn point_on_centerline_displaced(&self, distance: f32) -> Vec2 {
    self.point_on_centerline(self.displaced_threshold + distance)
  }

  /// Point `distance` feet along and `lateral` feet to the right of the
  /// centerline.
  pub fn point_off_centerline(&self, distance: f32, lateral: f32) -> Vec2 {
    move_point(
      self.point_on_centerline(distance),
      self.heading + 90.0,
      lateral,
    )
  }

  pub fn threshold(&self) -> Vec2 {
    self.point_on_centerline(self.displaced_threshold)
  }

  pub fn begin(&self) -> Vec2 {
    self.start
  }

  pub fn end(&self) -> Vec2 {
    self.point_on_centerline(self.length)
  }

  pub fn landing_length(&self) -> f32 {
    self.length - self.displaced_threshold
  }
}

/// A parking position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
  pub id: Intern<String>,
  pub pos: Vec2,
  pub heading: f32,
  /// Largest aircraft radius in feet the gate can take.
  pub radius: f32,
  #[serde(default = "available_default")]
  pub available: bool,
  #[serde(skip)]
  pub node: Option<NodeIndex>,
  #[serde(skip)]
  pub pushback: Option<NodeIndex>,
}

fn available_default() -> bool {
  true
}

impl Translate for Gate {
  fn translate(&mut self, offset: Vec2) {
    self.pos += offset;
  }
}

impl Gate {
  pub fn new(id: Intern<String>, pos: Vec2, heading: f32, radius: f32) -> Self {
    Self {
      id,
      pos,
      heading,
      radius,
      available: true,
      node: None,
      pushback: None,
    }
  }

  pub fn with_nodes(
    mut self,
    node: Option<NodeIndex>,
    pushback: Option<NodeIndex>,
  ) -> Self {
    self.node = node;
    self.pushback = pushback;
    self
  }

  /// Point `distance` feet behind the gate, where the nose of a parked
  /// aircraft would be when it is `distance` feet from stopping.
  pub fn point_behind(&self, distance: f32) -> Vec2 {
    move_point(self.pos, inverse_degrees(self.heading), distance)
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Airport {
  pub id: Intern<String>,
  pub center: Vec2,
  #[serde(default)]
  pub elevation: f32,
  /// Direction the wind blows from.
  #[serde(default)]
  pub wind_heading: f32,
  #[serde(default)]
  pub frequencies: Frequencies,
  pub runways: Vec<Runway>,
  #[serde(default)]
  pub gates: Vec<Gate>,
  #[serde(default)]
  pub ground_network: Option<GroundNetwork>,
}

impl Translate for Airport {
  fn translate(&mut self, offset: Vec2) {
    self.center += offset;

    for runway in self.runways.iter_mut() {
      runway.translate(offset);
    }

    for gate in self.gates.iter_mut() {
      gate.translate(offset);
    }

    if let Some(network) = self.ground_network.as_mut() {
      for node in network.graph.node_weights_mut() {
        node.data += offset;
      }
    }
  }
}

impl Airport {
  pub fn new(id: Intern<String>, center: Vec2) -> Self {
    Self {
      id,
      center,
      ..Default::default()
    }
  }

  pub fn with_elevation(mut self, elevation: f32) -> Self {
    self.elevation = elevation;
    self
  }

  pub fn with_wind(mut self, wind_heading: f32) -> Self {
    self.wind_heading = wind_heading;
    self
  }

  pub fn add_runway(&mut self, runway: Runway) {
    self.runways.push(runway);
  }

  pub fn add_gate(&mut self, gate: Gate) {
    self.gates.push(gate);
  }

  pub fn network(&self) -> Option<&GroundNetwork> {
    self.ground_network.as_ref().filter(|n| !n.is_empty())
  }

  pub fn runway(&self, id: Intern<String>) -> Option<&Runway> {
    self.runways.iter().find(|r| r.id == id)
  }

  /// Picks the runway in use for the given class. The runway most aligned
  /// with the wind wins and `heading` (the intended course) breaks ties.
  /// Falls back to every runway when none carries the class.
  pub fn active_runway(
    &self,
    class: RunwayClass,
    usage: RunwayUsage,
    heading: f32,
  ) -> Option<&Runway> {
    let mut candidates: Vec<&Runway> =
      self.runways.iter().filter(|r| r.class == class).collect();
    if candidates.is_empty() {
      candidates = self.runways.iter().collect();
    }

    let runway = candidates.into_iter().min_by(|a, b| {
      let wind_a = delta_angle(a.heading, self.wind_heading).abs().round();
      let wind_b = delta_angle(b.heading, self.wind_heading).abs().round();
      wind_a.total_cmp(&wind_b).then_with(|| {
        delta_angle(a.heading, heading)
          .abs()
          .total_cmp(&delta_angle(b.heading, heading).abs())
      })
    });

    if let Some(runway) = runway {
      tracing::trace!(
        "{} active {:?} runway for {:?}: {}",
        self.id,
        usage,
        class,
        runway.id
      );
    }

    runway
  }

  pub fn gate(&self, id: Intern<String>) -> Option<&Gate> {
    self.gates.iter().find(|g| g.id == id)
  }

  pub fn gate_mut(&mut self, id: Intern<String>) -> Option<&mut Gate> {
    self.gates.iter_mut().find(|g| g.id == id)
  }

  /// Reserves the first free gate that fits an aircraft of `radius` feet.
  pub fn claim_gate(&mut self, radius: f32) -> Option<Intern<String>> {
    let gate = self
      .gates
      .iter_mut()
      .find(|g| g.available && g.radius >= radius)?;
    gate.available = false;

    Some(gate.id)
  }

  pub fn release_gate(&mut self, id: Intern<String>) {
    if let Some(gate) = self.gate_mut(id) {
      gate.available = true;
    }
  }
}

pub fn find_airport(airports: &[Airport], id: Intern<String>) -> Result<&Airport> {
  airports
    .iter()
    .find(|a| a.id == id)
    .ok_or(Error::UnknownAirport(id))
}

pub fn find_airport_mut(
  airports: &mut [Airport],
  id: Intern<String>,
) -> Result<&mut Airport> {
  airports
    .iter_mut()
    .find(|a| a.id == id)
    .ok_or(Error::UnknownAirport(id))
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPSILON: f32 = 0.01;

  fn runway(id: &str, heading: f32) -> Runway {
    Runway::new(Intern::from_ref(id), Vec2::ZERO, heading, 10000.0)
  }

  fn airport() -> Airport {
    let mut airport =
      Airport::new(Intern::from_ref("KSFO"), Vec2::ZERO).with_wind(280.0);
    airport.add_runway(runway("28L", 284.0));
    airport.add_runway(runway("10R", 104.0));
    airport.add_runway(runway("01L", 14.0).with_class(RunwayClass::General));
    airport
  }

  mod runway {
    use super::*;

    #[test]
    fn test_centerline_points() {
      let runway = runway("36", 0.0).with_displaced_threshold(1000.0);

      assert_eq!(runway.threshold(), Vec2::new(0.0, 1000.0));
      assert_eq!(runway.end(), Vec2::new(0.0, 10000.0));
      assert_eq!(runway.point_on_centerline(-500.0), Vec2::new(0.0, -500.0));
      assert!(
        (runway.point_on_centerline_displaced(500.0) - Vec2::new(0.0, 1500.0))
          .length()
          < EPSILON
      );
      assert_eq!(runway.landing_length(), 9000.0);
    }

    #[test]
    fn test_point_off_centerline_is_right_hand() {
      let runway = runway("36", 0.0);
      let point = runway.point_off_centerline(100.0, 50.0);

      assert!((point - Vec2::new(50.0, 100.0)).length() < EPSILON);
    }

    #[test]
    fn test_class_from_flight_type() {
      assert_eq!(RunwayClass::from_flight_type("gate"), RunwayClass::Commercial);
      assert_eq!(RunwayClass::from_flight_type("cargo"), RunwayClass::Commercial);
      assert_eq!(RunwayClass::from_flight_type("ga"), RunwayClass::General);
      assert_eq!(RunwayClass::from_flight_type("ul"), RunwayClass::Ultralight);
      assert_eq!(
        RunwayClass::from_flight_type("mil-fighter"),
        RunwayClass::Military
      );
      assert_eq!(
        RunwayClass::from_flight_type("balloon"),
        RunwayClass::Commercial
      );
    }
  }

  mod airport {
    use super::*;

    #[test]
    fn test_active_runway_follows_wind() {
      let airport = airport();
      let runway = airport.active_runway(
        RunwayClass::Commercial,
        RunwayUsage::Takeoff,
        100.0,
      );

      assert_eq!(runway.map(|r| r.id), Some(Intern::from_ref("28L")));
    }

    #[test]
    fn test_active_runway_falls_back_to_any_class() {
      let airport = airport();
      let runway = airport.active_runway(
        RunwayClass::Military,
        RunwayUsage::Landing,
        0.0,
      );

      assert_eq!(runway.map(|r| r.id), Some(Intern::from_ref("28L")));
    }

    #[test]
    fn test_active_runway_class_filter() {
      let airport = airport();
      let runway =
        airport.active_runway(RunwayClass::General, RunwayUsage::Landing, 0.0);

      assert_eq!(runway.map(|r| r.id), Some(Intern::from_ref("01L")));
    }

    #[test]
    fn test_active_runway_heading_breaks_ties() {
      let mut airport = Airport::new(Intern::from_ref("EGLL"), Vec2::ZERO)
        .with_wind(0.0);
      airport.add_runway(runway("09", 90.0));
      airport.add_runway(runway("27", 270.0));

      let runway =
        airport.active_runway(RunwayClass::Commercial, RunwayUsage::Takeoff, 260.0);
      assert_eq!(runway.map(|r| r.id), Some(Intern::from_ref("27")));
    }

    #[test]
    fn test_claim_and_release_gate() {
      let mut airport = airport();
      airport.add_gate(Gate::new(Intern::from_ref("A1"), Vec2::ZERO, 0.0, 20.0));
      airport.add_gate(Gate::new(Intern::from_ref("A2"), Vec2::ZERO, 0.0, 60.0));

      assert_eq!(airport.claim_gate(40.0), Some(Intern::from_ref("A2")));
      assert_eq!(airport.claim_gate(40.0), None);
      assert_eq!(airport.claim_gate(10.0), Some(Intern::from_ref("A1")));

      airport.release_gate(Intern::from_ref("A2"));
      assert_eq!(airport.claim_gate(40.0), Some(Intern::from_ref("A2")));
    }

    #[test]
    fn test_translate_moves_everything() {
      let mut airport = airport();
      airport.add_gate(Gate::new(Intern::from_ref("A1"), Vec2::ZERO, 0.0, 20.0));
      airport.translate(Vec2::new(10.0, 20.0));

      assert_eq!(airport.center, Vec2::new(10.0, 20.0));
      assert_eq!(airport.runways[0].start, Vec2::new(10.0, 20.0));
      assert_eq!(airport.gates[0].pos, Vec2::new(10.0, 20.0));
    }
  }
}

use core::fmt;
use std::time::Duration;

use glam::Vec2;
use internment::Intern;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use turborand::{TurboRand, rng::Rng};

use crate::{
  Error, Result,
  entities::airport::Airport,
  flight_plan::{FlightRules, Leg},
  seconds_between,
};

pub mod approach;
pub mod ground;
mod message;
pub mod runway;
pub mod startup;
pub mod tower;

pub use approach::ApproachController;
pub use ground::GroundController;
pub use message::{AtcMessage, Direction, MessageKind};
pub use runway::ActiveRunway;
pub use startup::StartupController;
pub use tower::TowerController;

use message::Station;

/// Ground records closer than this (in feet) to a parked aircraft keep its
/// push-back on hold.
pub const PUSHBACK_CLEARANCE_FT: f32 = 200.0;

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TakeoffStatus {
  #[default]
  None,
  Queued,
  ClearedForTakeoff,
}

/// What a controller currently wants from an aircraft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
  pub hold_pattern: bool,
  pub hold_position: bool,
  pub change_speed: Option<f32>,
  pub change_heading: Option<f32>,
  pub change_altitude: Option<f32>,
  pub resolve_circular_wait: bool,
  pub runway_slot: Option<Duration>,
}

impl Instruction {
  /// Whether anything here asks the aircraft to deviate from its plan.
  pub fn has_instruction(&self) -> bool {
    self.hold_pattern
      || self.hold_position
      || self.change_speed.is_some()
      || self.change_heading.is_some()
      || self.change_altitude.is_some()
      || self.resolve_circular_wait
  }
}

/// Snapshot an aircraft hands to a controller when it announces itself or
/// reports its position.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReport {
  pub id: Intern<String>,
  pub callsign: Intern<String>,
  pub pos: Vec2,
  pub heading: f32,
  pub speed: f32,
  pub altitude: f32,
  pub radius: f32,
  pub leg: Leg,
  pub runway: Option<Intern<String>>,
  pub gate: Option<Intern<String>>,
  pub destination: Intern<String>,
  pub flight_rules: FlightRules,
  pub node: Option<NodeIndex>,
  pub intentions: Vec<NodeIndex>,
  pub departure_time: Duration,
  pub descent_speed: f32,
  /// Seconds until the next checkpoint at the current speed.
  pub eta_to_checkpoint: Option<f32>,
  pub arrival_slot: Option<Duration>,
}

/// A controller's view of one aircraft.
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficRecord {
  pub id: Intern<String>,
  pub callsign: Intern<String>,
  pub pos: Vec2,
  pub heading: f32,
  pub speed: f32,
  pub altitude: f32,
  pub radius: f32,
  pub leg: Leg,
  pub runway: Option<Intern<String>>,
  pub gate: Option<Intern<String>>,
  pub destination: Intern<String>,
  pub flight_rules: FlightRules,
  pub node: Option<NodeIndex>,
  pub intentions: Vec<NodeIndex>,

  state: u32,
  pub instruction: Instruction,
  pub runway_slot: Option<Duration>,
  pub waits_for: Option<Intern<String>>,
  pub takeoff_status: TakeoffStatus,
  pub departure_time: Duration,
  pub transponder: Option<String>,

  pub allow_transmission: bool,
  pub allow_pushback: bool,
  pub descent_speed: f32,
  pub eta_to_checkpoint: Option<f32>,
}

impl TrafficRecord {
  pub fn from_report(report: PositionReport) -> Self {
    Self {
      id: report.id,
      callsign: report.callsign,
      pos: report.pos,
      heading: report.heading,
      speed: report.speed,
      altitude: report.altitude,
      radius: report.radius,
      leg: report.leg,
      runway: report.runway,
      gate: report.gate,
      destination: report.destination,
      flight_rules: report.flight_rules,
      node: report.node,
      intentions: report.intentions,
      state: 0,
      instruction: Instruction::default(),
      runway_slot: report.arrival_slot,
      waits_for: None,
      takeoff_status: TakeoffStatus::None,
      departure_time: report.departure_time,
      transponder: None,
      allow_transmission: true,
      allow_pushback: true,
      descent_speed: report.descent_speed,
      eta_to_checkpoint: report.eta_to_checkpoint,
    }
  }

  /// Refreshes the snapshot, keeping the conversation and instruction.
  pub fn update(&mut self, report: PositionReport) {
    self.set_position_and_heading(
      report.pos,
      report.heading,
      report.speed,
      report.altitude,
    );
    self.set_position_and_intentions(report.node, report.intentions);
    self.leg = report.leg;
    self.runway = report.runway.or(self.runway);
    self.gate = report.gate;
    self.radius = report.radius;
    self.departure_time = report.departure_time;
    self.descent_speed = report.descent_speed;
    self.eta_to_checkpoint = report.eta_to_checkpoint;
    if report.arrival_slot.is_some() {
      self.runway_slot = report.arrival_slot;
    }
  }

  pub fn set_position_and_heading(
    &mut self,
    pos: Vec2,
    heading: f32,
    speed: f32,
    altitude: f32,
  ) {
    self.pos = pos;
    self.heading = heading;
    self.speed = speed;
    self.altitude = altitude;
  }

  pub fn set_position_and_intentions(
    &mut self,
    node: Option<NodeIndex>,
    intentions: Vec<NodeIndex>,
  ) {
    self.node = node;
    self.intentions = intentions;
  }

  /// True when `other` sits on our current node or on a node we still
  /// intend to pass.
  pub fn check_position_and_intentions(&self, other: &TrafficRecord) -> bool {
    if self.id == other.id {
      return false;
    }

    match other.node {
      Some(node) => self.node == Some(node) || self.intentions.contains(&node),
      None => false,
    }
  }

  pub fn state(&self) -> u32 {
    self.state
  }

  pub fn next_state(&mut self) {
    self.state += 1;
  }

  /// Jumps ahead to `state`; never moves backwards.
  pub fn advance_state_to(&mut self, state: u32) {
    self.state = self.state.max(state);
  }

  pub fn set_hold_position(&mut self, hold: bool) {
    self.instruction.hold_position = hold;
  }

  pub fn set_speed_adjustment(&mut self, speed: f32) {
    self.instruction.change_speed = Some(speed);
  }

  pub fn clear_speed_adjustment(&mut self) {
    self.instruction.change_speed = None;
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
  #[default]
  Startup,
  Ground,
  Tower,
  Approach,
}

impl ControllerKind {
  pub const ALL: [Self; 4] =
    [Self::Startup, Self::Ground, Self::Tower, Self::Approach];
}

impl fmt::Display for ControllerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Startup => write!(f, "startup"),
      Self::Ground => write!(f, "ground"),
      Self::Tower => write!(f, "tower"),
      Self::Approach => write!(f, "approach"),
    }
  }
}

/// Names one controller: the kind at a given airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControllerRef {
  pub airport: Intern<String>,
  pub kind: ControllerKind,
}

impl ControllerRef {
  pub fn new(airport: Intern<String>, kind: ControllerKind) -> Self {
    Self { airport, kind }
  }
}

impl fmt::Display for ControllerRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.airport, self.kind)
  }
}

/// Something an aircraft asked of ATC during its tick. Requests are applied
/// in order once every aircraft has ticked.
#[derive(Debug, Clone, PartialEq)]
pub enum AtcRequest {
  Announce {
    to: ControllerRef,
    report: PositionReport,
  },
  Report {
    to: ControllerRef,
    report: PositionReport,
  },
  SignOff {
    from: ControllerRef,
    id: Intern<String>,
  },
  ScheduleDeparture {
    tower: ControllerRef,
    report: PositionReport,
  },
}

/// Record keeping and radio shared by every controller.
#[derive(Debug, Clone)]
pub struct ControllerCore {
  name: String,
  pub frequency: f32,
  pub ground_frequency: f32,

  records: Vec<TrafficRecord>,
  available: bool,
  last_transmission: Duration,
  messages: Vec<AtcMessage>,
}

impl ControllerCore {
  pub fn new(controller: ControllerRef, frequency: f32) -> Self {
    Self {
      name: controller.to_string(),
      frequency,
      ground_frequency: frequency,
      records: Vec::new(),
      available: true,
      last_transmission: Duration::ZERO,
      messages: Vec::new(),
    }
  }

  pub fn with_ground_frequency(mut self, frequency: f32) -> Self {
    self.ground_frequency = frequency;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn records(&self) -> &[TrafficRecord] {
    &self.records
  }

  pub fn records_mut(&mut self) -> &mut [TrafficRecord] {
    &mut self.records
  }

  pub fn record(&self, id: Intern<String>) -> Option<&TrafficRecord> {
    self.records.iter().find(|r| r.id == id)
  }

  pub fn record_mut(&mut self, id: Intern<String>) -> Option<&mut TrafficRecord> {
    self.records.iter_mut().find(|r| r.id == id)
  }

  /// Creates the record for a newly announced aircraft, or refreshes the
  /// existing one. Returns whether the record is new.
  pub fn announce_position(&mut self, report: PositionReport) -> bool {
    match self.record_mut(report.id) {
      Some(record) => {
        record.update(report);
        false
      }
      None => {
        debug!("{} announced to {}", report.callsign, self.name);
        self.records.push(TrafficRecord::from_report(report));
        true
      }
    }
  }

  pub fn update_aircraft_information(
    &mut self,
    report: PositionReport,
  ) -> Result<()> {
    let id = report.id;
    match self.record_mut(id) {
      Some(record) => {
        record.update(report);
        Ok(())
      }
      None => {
        error!("{id} reported to {} without a traffic record", self.name);
        Err(Error::NoTrafficRecord(id))
      }
    }
  }

  pub fn sign_off(&mut self, id: Intern<String>) -> Result<TrafficRecord> {
    match self.records.iter().position(|r| r.id == id) {
      Some(i) => {
        debug!("{id} signing off from {}", self.name);
        Ok(self.records.remove(i))
      }
      None => {
        error!("{id} signing off from {} without a traffic record", self.name);
        Err(Error::NoTrafficRecord(id))
      }
    }
  }

  pub fn has_instruction(&self, id: Intern<String>) -> bool {
    match self.record(id) {
      Some(record) => record.instruction.has_instruction(),
      None => {
        error!("{id} checked instructions at {} without a record", self.name);
        false
      }
    }
  }

  pub fn instruction(&self, id: Intern<String>) -> Instruction {
    match self.record(id) {
      Some(record) => record.instruction.clone(),
      None => {
        error!("{id} asked {} for instructions without a record", self.name);
        Instruction::default()
      }
    }
  }

  pub fn try_instruction(&self, id: Intern<String>) -> Option<&Instruction> {
    self.record(id).map(|r| &r.instruction)
  }

  /// Drops the records of aircraft that are no longer alive. Returns the
  /// ids that were removed.
  pub fn sweep(
    &mut self,
    is_alive: impl Fn(Intern<String>) -> bool,
  ) -> Vec<Intern<String>> {
    let mut removed = Vec::new();
    self.records.retain(|r| {
      let alive = is_alive(r.id);
      if !alive {
        debug!("removing dead traffic {}", r.id);
        removed.push(r.id);
      }
      alive
    });

    removed
  }

  pub fn is_available(&self) -> bool {
    self.available
  }

  /// The frequency frees up a few seconds after the last call.
  pub fn refresh_availability(&mut self, now: Duration, rng: &mut Rng) {
    let quiet = 3 + rng.u32(0..15);
    if seconds_between(now, self.last_transmission) > quiet as f32 {
      self.available = true;
    }
  }

  pub fn mark_transmitted(&mut self, now: Duration) {
    self.last_transmission = now;
    self.available = false;
  }

  /// Renders and logs a call between the station and the aircraft `id`.
  pub fn transmit(
    &mut self,
    id: Intern<String>,
    kind: MessageKind,
    direction: Direction,
    now: Duration,
  ) {
    let Some(record) = self.record(id) else {
      error!("{} cannot transmit to {id} without a record", self.name);
      return;
    };

    let station = Station {
      name: &self.name,
      ground_frequency: self.ground_frequency,
    };
    let (sender, receiver, text) = kind.compose(&station, record, direction);
    let message = AtcMessage {
      at: now,
      frequency: self.frequency,
      aircraft: id,
      kind,
      direction,
      sender,
      receiver,
      text,
    };

    debug!(target: "atc", "{message}");
    self.messages.push(message);
  }

  pub fn messages(&self) -> &[AtcMessage] {
    &self.messages
  }

  pub fn drain_messages(&mut self) -> Vec<AtcMessage> {
    core::mem::take(&mut self.messages)
  }
}

/// Squawk for a new clearance: `1200` for VFR, four random octal digits
/// otherwise.
pub fn transponder_code(rules: FlightRules, rng: &mut Rng) -> String {
  match rules {
    FlightRules::Vfr => "1200".to_string(),
    FlightRules::Ifr => (0..4)
      .map(|_| char::from(b'0' + rng.u8(0..8)))
      .collect(),
  }
}

pub trait Controller {
  fn core(&self) -> &ControllerCore;
  fn core_mut(&mut self) -> &mut ControllerCore;

  fn announce(&mut self, report: PositionReport, _now: Duration) {
    self.core_mut().announce_position(report);
  }

  fn report(&mut self, report: PositionReport) -> Result<()> {
    self.core_mut().update_aircraft_information(report)
  }

  fn sign_off(&mut self, id: Intern<String>) -> Result<TrafficRecord> {
    self.core_mut().sign_off(id)
  }

  fn sweep(&mut self, is_alive: &dyn Fn(Intern<String>) -> bool) {
    self.core_mut().sweep(is_alive);
  }

  /// Runs once per tick after every queued request has been applied.
  fn update(&mut self, now: Duration, rng: &mut Rng);
}

/// The four controllers serving one airport.
#[derive(Debug, Clone)]
pub struct AirportControllers {
  pub airport: Intern<String>,
  pub startup: StartupController,
  pub ground: GroundController,
  pub tower: TowerController,
  pub approach: ApproachController,
}

impl AirportControllers {
  pub fn new(airport: &Airport) -> Self {
    let id = airport.id;
    let freq = &airport.frequencies;
    let core = |kind, frequency| {
      ControllerCore::new(ControllerRef::new(id, kind), frequency)
        .with_ground_frequency(freq.ground)
    };

    Self {
      airport: id,
      startup: StartupController::new(
        core(ControllerKind::Startup, freq.clearance),
      ),
      ground: GroundController::new(core(ControllerKind::Ground, freq.ground)),
      tower: TowerController::new(core(ControllerKind::Tower, freq.tower)),
      approach: ApproachController::new(core(
        ControllerKind::Approach,
        freq.approach,
      )),
    }
  }

  pub fn get(&self, kind: ControllerKind) -> &dyn Controller {
    match kind {
      ControllerKind::Startup => &self.startup,
      ControllerKind::Ground => &self.ground,
      ControllerKind::Tower => &self.tower,
      ControllerKind::Approach => &self.approach,
    }
  }

  pub fn get_mut(&mut self, kind: ControllerKind) -> &mut dyn Controller {
    match kind {
      ControllerKind::Startup => &mut self.startup,
      ControllerKind::Ground => &mut self.ground,
      ControllerKind::Tower => &mut self.tower,
      ControllerKind::Approach => &mut self.approach,
    }
  }

  /// Push-back waits while a taxiing aircraft is close to the gate.
  fn update_pushback_permissions(&mut self) {
    let taxiing: Vec<(Intern<String>, Vec2)> = self
      .ground
      .core()
      .records()
      .iter()
      .map(|r| (r.id, r.pos))
      .collect();

    for record in self.startup.core_mut().records_mut() {
      record.allow_pushback = !taxiing.iter().any(|(id, pos)| {
        *id != record.id && pos.distance(record.pos) < PUSHBACK_CLEARANCE_FT
      });
    }
  }
}

/// Owns every controller in the world and routes requests to them.
#[derive(Debug, Clone, Default)]
pub struct AtcManager {
  airports: Vec<AirportControllers>,
}

impl AtcManager {
  pub fn add_airport(&mut self, airport: &Airport) {
    if self.controllers(airport.id).is_none() {
      self.airports.push(AirportControllers::new(airport));
    }
  }

  pub fn controllers(&self, airport: Intern<String>) -> Option<&AirportControllers> {
    self.airports.iter().find(|c| c.airport == airport)
  }

  pub fn controllers_mut(
    &mut self,
    airport: Intern<String>,
  ) -> Option<&mut AirportControllers> {
    self.airports.iter_mut().find(|c| c.airport == airport)
  }

  pub fn controller(&self, to: ControllerRef) -> Option<&dyn Controller> {
    self.controllers(to.airport).map(|c| c.get(to.kind))
  }

  pub fn controller_mut(
    &mut self,
    to: ControllerRef,
  ) -> Option<&mut dyn Controller> {
    self.controllers_mut(to.airport).map(|c| c.get_mut(to.kind))
  }

  /// The instruction `id` holds with `controller`, or `None` while it has
  /// no record there yet.
  pub fn try_instruction(
    &self,
    controller: ControllerRef,
    id: Intern<String>,
  ) -> Option<Instruction> {
    self
      .controller(controller)?
      .core()
      .try_instruction(id)
      .cloned()
  }

  /// Approach-side runway state, created on first use.
  pub fn approach_runway_mut(
    &mut self,
    airport: Intern<String>,
    runway: Intern<String>,
  ) -> Option<&mut ActiveRunway> {
    self
      .controllers_mut(airport)
      .map(|c| c.approach.runway_mut(runway))
  }

  pub fn apply(&mut self, requests: Vec<AtcRequest>, now: Duration) {
    for request in requests {
      match request {
        AtcRequest::Announce { to, report } => match self.controller_mut(to) {
          Some(controller) => controller.announce(report, now),
          None => error!("{} announced to unknown controller {to}", report.id),
        },
        AtcRequest::Report { to, report } => {
          if let Some(controller) = self.controller_mut(to) {
            // Logged by the controller.
            let _ = controller.report(report);
          }
        }
        AtcRequest::SignOff { from, id } => {
          if let Some(controller) = self.controller_mut(from) {
            let _ = controller.sign_off(id);
          }
        }
        AtcRequest::ScheduleDeparture { tower, report } => {
          match self.controllers_mut(tower.airport) {
            Some(controllers) => {
              controllers.tower.schedule_departure(report, now)
            }
            None => error!("{} scheduled with unknown tower {tower}", report.id),
          }
        }
      }
    }
  }

  /// Sweeps dead traffic and runs every controller once.
  pub fn update(
    &mut self,
    now: Duration,
    rng: &mut Rng,
    is_alive: impl Fn(Intern<String>) -> bool,
  ) {
    for controllers in self.airports.iter_mut() {
      for kind in ControllerKind::ALL {
        controllers.get_mut(kind).sweep(&is_alive);
      }

      controllers.update_pushback_permissions();

      for kind in ControllerKind::ALL {
        controllers.get_mut(kind).update(now, rng);
      }
    }
  }

  pub fn drain_messages(&mut self) -> Vec<AtcMessage> {
    let mut messages: Vec<AtcMessage> = self
      .airports
      .iter_mut()
      .flat_map(|c| {
        ControllerKind::ALL
          .into_iter()
          .flat_map(|kind| c.get_mut(kind).core_mut().drain_messages())
          .collect::<Vec<_>>()
      })
      .collect();
    messages.sort_by_key(|m| m.at);

    messages
  }
}

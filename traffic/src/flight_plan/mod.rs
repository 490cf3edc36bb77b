use std::time::Duration;

use glam::Vec2;
use internment::Intern;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::{
  LEG_END,
  geometry::{angle_between_points, delta_angle, turn_radius},
};

pub mod create;
mod descent;
mod schedule;

pub use create::{CreateContext, accel_distance, initial_leg, pitch_distance};
pub use schedule::{FlightRules, ScheduledFlight, TrafficSchedule};

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Lights {
  #[default]
  PowerDown,
  Ground,
  Takeoff,
  Approach,
  Cruise,
}

/// A point the aircraft steers through, with the configuration it should
/// have by the time it gets there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
  pub name: String,
  pub pos: Vec2,
  pub altitude: f32,
  pub speed: f32,
  /// Altitude restriction. `None` means no restriction.
  pub cross_at: Option<f32>,
  pub on_ground: bool,
  pub gear_down: bool,
  pub flaps: f32,
  pub spoilers: f32,
  pub speed_brakes: bool,
  pub lights: Lights,
  pub finished: bool,
  #[serde(skip)]
  pub route_index: Option<NodeIndex>,
  /// Length in feet of the track ending at this waypoint.
  pub track_length: f32,
}

impl Waypoint {
  fn new(name: impl Into<String>, pos: Vec2, altitude: f32, speed: f32) -> Self {
    Self {
      name: name.into(),
      pos,
      altitude,
      speed,
      cross_at: None,
      on_ground: false,
      gear_down: false,
      flaps: 0.0,
      spoilers: 0.0,
      speed_brakes: false,
      lights: Lights::PowerDown,
      finished: false,
      route_index: None,
      track_length: 0.0,
    }
  }

  pub fn on_ground(
    name: impl Into<String>,
    pos: Vec2,
    elevation: f32,
    speed: f32,
  ) -> Self {
    let mut wpt = Self::new(name, pos, elevation, speed);
    wpt.on_ground = true;
    wpt.gear_down = true;
    wpt.lights = if speed == 0.0 {
      Lights::PowerDown
    } else {
      Lights::Ground
    };
    wpt
  }

  pub fn on_runway(
    name: impl Into<String>,
    pos: Vec2,
    elevation: f32,
    speed: f32,
  ) -> Self {
    let mut wpt = Self::on_ground(name, pos, elevation, speed);
    wpt.lights = Lights::Takeoff;
    wpt
  }

  pub fn in_air(
    name: impl Into<String>,
    pos: Vec2,
    altitude: f32,
    speed: f32,
  ) -> Self {
    let mut wpt = Self::new(name, pos, altitude, speed);
    wpt.cross_at = Some(altitude);
    wpt.lights = if altitude < 10000.0 {
      Lights::Approach
    } else {
      Lights::Cruise
    };
    wpt
  }

  pub fn with_gear(mut self, gear_down: bool) -> Self {
    self.gear_down = gear_down;
    self
  }

  pub fn with_flaps(mut self, flaps: f32) -> Self {
    self.flaps = flaps;
    self
  }

  pub fn with_spoilers(mut self, spoilers: f32) -> Self {
    self.spoilers = spoilers;
    self
  }

  pub fn with_cross_at(mut self, cross_at: Option<f32>) -> Self {
    self.cross_at = cross_at;
    self
  }

  pub fn with_route_index(mut self, index: Option<NodeIndex>) -> Self {
    self.route_index = index;
    self
  }

  pub fn with_track_length(mut self, track_length: f32) -> Self {
    self.track_length = track_length;
    self
  }

  pub fn contains(&self, pattern: &str) -> bool {
    self.name.contains(pattern)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
  #[default]
  Pushback,
  TaxiOut,
  Takeoff,
  Climb,
  Cruise,
  Descent,
  Hold,
  Landing,
  TaxiIn,
  Parking,
}

impl Leg {
  /// The leg that follows this one, or `None` after parking.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::Pushback => Some(Self::TaxiOut),
      Self::TaxiOut => Some(Self::Takeoff),
      Self::Takeoff => Some(Self::Climb),
      Self::Climb => Some(Self::Cruise),
      Self::Cruise => Some(Self::Descent),
      Self::Descent => Some(Self::Hold),
      Self::Hold => Some(Self::Landing),
      Self::Landing => Some(Self::TaxiIn),
      Self::TaxiIn => Some(Self::Parking),
      Self::Parking => None,
    }
  }

  pub fn on_ground(self) -> bool {
    matches!(
      self,
      Self::Pushback | Self::TaxiOut | Self::TaxiIn | Self::Parking
    )
  }
}

/// A gate held by a flight plan, either the departure gate or the arrival
/// gate depending on the leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GateAssignment {
  pub airport: Intern<String>,
  pub gate: Intern<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
  waypoints: Vec<Waypoint>,
  cursor: usize,
  leg: Leg,

  pub repeat: bool,
  pub start_time: Duration,
  pub arrival_time: Duration,
  pub runway: Option<Intern<String>>,
  pub gate: Option<GateAssignment>,

  lead_distance: f32,
  next_turn_angle: f32,
  /// Leg generated behind the current one, entered when its end marker
  /// is passed.
  queued_leg: Option<Leg>,
  #[serde(skip)]
  pub last_node_index: Option<NodeIndex>,
}

impl FlightPlan {
  pub fn new(start_time: Duration, leg: Leg) -> Self {
    Self {
      start_time,
      leg,
      ..Default::default()
    }
  }

  pub fn with_gate(mut self, gate: Option<GateAssignment>) -> Self {
    self.gate = gate;
    self
  }

  pub fn leg(&self) -> Leg {
    self.leg
  }

  /// Moves to another leg. Only plan creation, restart and repositioning
  /// may move the leg backwards.
  pub(crate) fn set_leg(&mut self, leg: Leg) {
    self.leg = leg;
  }

  pub fn advance_leg(&mut self, leg: Leg) {
    if leg < self.leg {
      tracing::error!("refusing to move leg back from {:?} to {leg:?}", self.leg);
      return;
    }
    self.leg = leg;
  }

  pub(crate) fn queue_leg(&mut self, leg: Leg) {
    self.queued_leg = Some(leg);
  }

  pub fn queued_leg(&self) -> Option<Leg> {
    self.queued_leg
  }

  /// Enters the queued leg, or the natural successor when nothing was
  /// queued.
  pub fn begin_next_leg(&mut self, runway_slot: Option<Duration>, now: Duration) {
    let next = self
      .queued_leg
      .take()
      .or_else(|| self.determine_next_leg(self.leg, runway_slot, now));

    match next {
      // A turnaround starts the rotation's next flight.
      Some(Leg::Pushback) if self.leg == Leg::Parking => self.set_leg(Leg::Pushback),
      Some(leg) => self.advance_leg(leg),
      None => tracing::debug!("no leg after {:?}", self.leg),
    }
  }

  pub fn waypoints(&self) -> &[Waypoint] {
    &self.waypoints
  }

  pub fn len(&self) -> usize {
    self.waypoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.waypoints.is_empty()
  }

  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn current_waypoint(&self) -> Option<&Waypoint> {
    self.waypoints.get(self.cursor)
  }

  pub fn previous_waypoint(&self) -> Option<&Waypoint> {
    self.cursor.checked_sub(1).and_then(|i| self.waypoints.get(i))
  }

  pub fn previous_waypoint_mut(&mut self) -> Option<&mut Waypoint> {
    self
      .cursor
      .checked_sub(1)
      .and_then(|i| self.waypoints.get_mut(i))
  }

  pub fn next_waypoint(&self) -> Option<&Waypoint> {
    self.waypoints.get(self.cursor + 1)
  }

  pub fn last_waypoint(&self) -> Option<&Waypoint> {
    self.waypoints.last()
  }

  pub fn last_waypoint_mut(&mut self) -> Option<&mut Waypoint> {
    self.waypoints.last_mut()
  }

  /// Appends a waypoint unless it sits exactly on the previous one.
  pub fn push_waypoint(&mut self, wpt: Waypoint) {
    if let Some(last) = self.waypoints.last() {
      if last.pos == wpt.pos {
        tracing::trace!("double waypoint {} not added", wpt.name);
        return;
      }
    }

    self.waypoints.push(wpt);
  }

  /// Advances the cursor, which never moves past the last waypoint. With
  /// `erase_consumed`, the plan keeps only one waypoint behind the cursor.
  /// Returns false when there was no waypoint to advance to.
  pub fn increment_waypoint(&mut self, erase_consumed: bool) -> bool {
    let Some(last) = self.waypoints.len().checked_sub(1) else {
      return false;
    };

    let target = (self.cursor + 1).min(last);
    let advanced = target > self.cursor;
    if erase_consumed && target > 1 {
      self.waypoints.drain(..target - 1);
      self.cursor = 1;
    } else {
      self.cursor = target;
    }

    self.next_turn_angle = 0.0;
    if let (Some(prev), Some(curr), Some(next)) = (
      self.previous_waypoint(),
      self.current_waypoint(),
      self.next_waypoint(),
    ) {
      let inbound = self.bearing(prev.pos, curr.pos);
      let outbound = self.bearing(curr.pos, next.pos);
      let mut angle = delta_angle(inbound, outbound);
      if (prev.speed > 0.0 && next.speed < 0.0)
        || (prev.speed < 0.0 && next.speed > 0.0)
      {
        angle += 180.0;
      }
      self.next_turn_angle = angle;
    }

    advanced
  }

  fn clamp_cursor(&mut self) {
    self.cursor = self.cursor.min(self.waypoints.len().saturating_sub(1));
  }

  pub fn restart(&mut self) {
    self.cursor = 0;
  }

  pub fn lead_distance(&self) -> f32 {
    self.lead_distance
  }

  pub fn next_turn_angle(&self) -> f32 {
    self.next_turn_angle
  }

  /// Distance in feet before `current` at which the aircraft starts turning
  /// toward `next`.
  pub fn set_lead_distance(
    &mut self,
    speed: f32,
    bearing: f32,
    current: &Waypoint,
    next: &Waypoint,
  ) {
    if speed < 0.5 {
      self.set_lead_distance_ft(0.5);
      return;
    }

    let radius = turn_radius(speed, speed >= 25.0);
    let outbound = self.bearing(current.pos, next.pos);
    let mut lead_in = (bearing - outbound).abs();
    if lead_in > 180.0 {
      lead_in = 360.0 - lead_in;
    }

    if lead_in < 1.0 {
      self.set_lead_distance_ft((2.0 * speed).abs());
    } else {
      self.set_lead_distance_ft(radius * (lead_in.to_radians() / 2.0).tan());
    }
  }

  pub fn set_lead_distance_ft(&mut self, distance: f32) {
    if distance > 10000.0 {
      tracing::trace!("excessive lead distance {distance}");
    }
    self.lead_distance = distance;
  }

  pub fn distance_to_go(&self, pos: Vec2, wpt: &Waypoint) -> f32 {
    pos.distance(wpt.pos)
  }

  pub fn bearing(&self, from: Vec2, to: Vec2) -> f32 {
    angle_between_points(from, to)
  }

  /// Drops everything but the last waypoint, which becomes the first
  /// waypoint of the next leg.
  pub fn reset_waypoints(&mut self) {
    let Some(mut last) = self.waypoints.pop() else {
      return;
    };

    last.name = last.name.replace(LEG_END, "");
    last.finished = false;
    last.track_length = 0.0;
    tracing::trace!("recycling waypoint {}", last.name);

    self.delete_waypoints();
    self.waypoints.push(last);
  }

  pub fn delete_waypoints(&mut self) {
    self.waypoints.clear();
    self.cursor = 0;
  }

  pub fn erase_last_waypoint(&mut self) {
    if self.waypoints.pop().is_some() {
      self.cursor = self.cursor.min(1);
      self.clamp_cursor();
    }
  }

  /// Trims the plan to `number + 3` waypoints and marks the new last one.
  pub fn shorten_to_first(&mut self, number: usize, suffix: &str) {
    while self.waypoints.len() > number + 3 {
      self.erase_last_waypoint();
    }
    if let Some(last) = self.waypoints.last_mut() {
      last.name.push_str(suffix);
    }
  }

  pub fn is_active(&self, now: Duration) -> bool {
    now >= self.start_time
  }

  /// Track length in feet from the waypoint after the current one up to
  /// and including the first waypoint whose name contains `name`. Zero when
  /// no such waypoint is ahead.
  pub fn check_track_length(&self, name: &str) -> f32 {
    let mut track = 0.0;
    for wpt in self.waypoints.iter().skip(self.cursor + 1) {
      track += wpt.track_length;
      if wpt.contains(name) {
        return track;
      }
    }

    0.0
  }

  pub fn route_index(&self, i: usize) -> Option<NodeIndex> {
    self.waypoints.get(i).and_then(|w| w.route_index)
  }

  pub fn leg_ended(&self, wpt: &Waypoint) -> bool {
    wpt.contains(LEG_END)
  }

  /// Leg to load after `current`. A descent goes into the hold while the
  /// granted runway slot is still in the future.
  pub fn determine_next_leg(
    &self,
    current: Leg,
    runway_slot: Option<Duration>,
    now: Duration,
  ) -> Option<Leg> {
    match current {
      Leg::Descent => match runway_slot {
        Some(slot) if slot > now => Some(Leg::Hold),
        _ => Some(Leg::Landing),
      },
      Leg::Hold => Some(Leg::Landing),
      leg => leg.next(),
    }
  }

  pub(crate) fn mark_leg_end(&mut self) {
    if let Some(last) = self.waypoints.last_mut() {
      if !last.contains(LEG_END) {
        last.name.push_str(LEG_END);
      }
    }
  }
}

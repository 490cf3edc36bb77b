use std::time::Duration;

use tracing::{debug, info, trace, warn};
use turborand::TurboRand;

use crate::{
  AI_STUCK_LIMIT, APPROACH_ALTITUDE, Error, FEET_TO_METERS,
  KNOT_TO_METERS_PER_SECOND, METERS_TO_FEET, MIN_TURNAROUND, Result,
  STUCK_TOLERANCE_FT,
  atc::{AtcRequest, ControllerKind, ControllerRef, TakeoffStatus},
  entities::airport::find_airport,
  flight_plan::{CreateContext, FlightPlan, Leg, Waypoint},
  geometry::{angle_between_points, delta_angle, normalize_angle},
};

use super::{Aircraft, DeathReason, TickContext};

/// Seconds between two flight plan evaluations, before jitter.
const EVALUATION_INTERVAL: f32 = 0.1;

/// Speed while closing in on the end of a pushback, shaped as a quarter
/// circle over the `arrival` distance so the aircraft eases to a stop.
pub fn pushback_speed(arrival: f32, distance: f32) -> f32 {
  let speed = -(arrival.powi(2) - (arrival - distance).powi(2)).sqrt();
  speed.min(-1.0)
}

pub fn parking_speed(distance: f32) -> f32 {
  (distance / 10.0).max(1.0)
}

/// Feet per minute needed to change altitude by `vertical_ft` over
/// `distance_m` at `speed` knots.
pub fn calc_vertical_speed(vertical_ft: f32, distance_m: f32, speed: f32) -> f32 {
  if distance_m == 0.0 {
    return 0.0;
  }

  let vertical_m = vertical_ft * FEET_TO_METERS;
  let speed_mps = speed * KNOT_TO_METERS_PER_SECOND;
  vertical_m / distance_m * speed_mps * METERS_TO_FEET * 60.0
}

/// Waypoints where the turn anticipation is left alone.
fn keeps_lead_distance(wpt: &Waypoint) -> bool {
  wpt.contains("END") || wpt.contains("PushBackPointlegend")
}

impl Aircraft {
  pub fn at_gate(&self) -> bool {
    self.flight_plan.as_ref().is_some_and(|fp| {
      matches!(fp.leg(), Leg::Pushback | Leg::TaxiOut) && fp.gate.is_some()
    })
  }

  /// Starts a fresh plan on `leg` for the current scheduled flight.
  pub fn create_initial_plan(
    &mut self,
    ctx: &mut TickContext,
    leg: Leg,
    start_time: Duration,
  ) -> Result<()> {
    self.flight_plan = Some(FlightPlan::new(start_time, leg));
    self.create_leg(ctx, leg, true)
  }

  pub(super) fn process_flight_plan(
    &mut self,
    ctx: &mut TickContext,
  ) -> Result<()> {
    let Some(fp) = self.flight_plan.as_ref() else {
      return Ok(());
    };
    self.dt_count += ctx.dt;

    if fp.previous_waypoint().is_none() || self.repositioned {
      if fp.is_empty() {
        self.set_dead(DeathReason::EmptyPlan);
        return Ok(());
      }
      return self.handle_first_waypoint(ctx);
    }

    let due = self.dt_count > EVALUATION_INTERVAL + self.fp_jitter;
    let executable = due && fp.is_active(ctx.now);
    if !executable {
      return Ok(());
    }
    self.dt_count = 0.0;
    self.fp_jitter = ctx.rng.f32();

    if self.reached_end_of_cruise(ctx) {
      debug!("{}: top of descent", self.callsign);
      self.load_next_leg(ctx)?;
      let slot = self.runway_slot(ctx.atc);
      if let Some(fp) = self.flight_plan.as_mut() {
        fp.begin_next_leg(slot, ctx.now);
        fp.increment_waypoint(false);
        fp.increment_waypoint(false);
      }
    }

    let Some(fp) = self.flight_plan.as_ref() else {
      return Ok(());
    };
    let Some(curr) = fp.current_waypoint().cloned() else {
      warn!("{}: no waypoint to fly to", self.callsign);
      return Ok(());
    };
    let next = fp.next_waypoint().cloned();
    let turn = fp.next_turn_angle();

    if !self.lead_point_reached(&curr, next.as_ref(), turn) {
      self.control_heading(&curr, None);
      self.control_speed(&curr, next.as_ref());
      return Ok(());
    }
    if self.is_dead() {
      return Ok(());
    }

    if curr.finished {
      match self.flight_plan.as_mut().filter(|fp| fp.repeat) {
        Some(fp) => fp.restart(),
        None => self.set_dead(DeathReason::PlanFinished),
      }
      return Ok(());
    }

    if let Some(next) = &next {
      self.target.heading = angle_between_points(curr.pos, next.pos);
      self.spin_counter = 0;
    }

    if !self.advance_waypoint(ctx)? {
      return Ok(());
    }

    let Some(fp) = self.flight_plan.as_ref() else {
      return Ok(());
    };
    let (Some(prev), Some(curr)) = (
      fp.previous_waypoint().cloned(),
      fp.current_waypoint().cloned(),
    ) else {
      return Err(Error::MissingWaypoint);
    };
    trace!("{}: passed {}", self.callsign, prev.name);

    self.handle_airport_end_points(&prev, ctx);
    self.announce_position_to_controller(ctx)?;

    let Some(fp) = self.flight_plan.as_mut() else {
      return Ok(());
    };
    if let Some(next) = fp.next_waypoint().cloned() {
      if !keeps_lead_distance(&curr) {
        fp.set_lead_distance(self.target.speed, self.target.heading, &curr, &next);
      }
    }
    // End points may have rewritten the waypoint just passed.
    let prev_speed = fp.previous_waypoint().map_or(prev.speed, |w| w.speed);

    self.set_vertical_targets(&prev, &curr);
    self.target.speed = prev_speed;
    self.heading_lock = true;
    self.altitude_lock = true;
    self.no_roll = prev.on_ground && curr.on_ground;

    Ok(())
  }

  /// Steps to the next waypoint, generating the following leg whenever the
  /// plan is about to run out. False if the aircraft was removed or
  /// repositioned on the way.
  fn advance_waypoint(&mut self, ctx: &mut TickContext) -> Result<bool> {
    let at_end = self
      .flight_plan
      .as_ref()
      .is_some_and(|fp| fp.next_waypoint().is_none());
    if at_end {
      self.load_next_leg(ctx)?;
      if self.is_dead() || self.repositioned {
        return Ok(false);
      }
    }

    let Some(fp) = self.flight_plan.as_mut() else {
      return Ok(false);
    };
    if !fp.increment_waypoint(true) {
      return Err(Error::MissingWaypoint);
    }
    if fp.next_waypoint().is_none() {
      self.load_next_leg(ctx)?;
      if self.is_dead() || self.repositioned {
        return Ok(false);
      }
    }

    Ok(true)
  }

  /// Places the aircraft on the first waypoint of a new plan.
  fn handle_first_waypoint(&mut self, ctx: &mut TickContext) -> Result<()> {
    self.heading_error = 0.0;
    self.spin_counter = 0;
    self.repositioned = false;

    if !self.advance_waypoint(ctx)? {
      return Ok(());
    }

    let Some(fp) = self.flight_plan.as_mut() else {
      return Ok(());
    };
    let (Some(prev), Some(curr)) = (
      fp.previous_waypoint().cloned(),
      fp.current_waypoint().cloned(),
    ) else {
      return Err(Error::MissingWaypoint);
    };

    self.pos = prev.pos;
    self.speed = if fp.leg() == Leg::Pushback {
      0.0
    } else {
      prev.speed
    };
    self.altitude = prev.altitude;
    self.heading = if prev.speed > 0.0 {
      angle_between_points(prev.pos, curr.pos)
    } else {
      angle_between_points(curr.pos, prev.pos)
    };
    self.target.heading = self.heading;
    self.target.speed = prev.speed;

    if let Some(next) = fp.next_waypoint().cloned() {
      if !keeps_lead_distance(&curr) {
        fp.set_lead_distance(self.target.speed, self.heading, &curr, &next);
      }
    }

    match curr.cross_at {
      Some(cross_at) => {
        let distance_m = self.pos.distance(curr.pos) * FEET_TO_METERS;
        self.use_perf_vs = false;
        self.target.vertical_speed =
          calc_vertical_speed(cross_at - self.altitude, distance_m, self.speed);
        self.target.altitude = cross_at;
      }
      None => {
        self.use_perf_vs = true;
        self.target.altitude = prev.altitude;
      }
    }
    self.heading_lock = true;
    self.altitude_lock = true;
    self.no_roll = prev.on_ground;

    info!(
      "{}: starting at {} on the {:?} leg",
      self.callsign,
      prev.name,
      self.flight_plan.as_ref().map(|fp| fp.leg()).unwrap_or_default()
    );
    self.announce_position_to_controller(ctx)?;
    self.prev_speed = 0.0;

    Ok(())
  }

  fn set_vertical_targets(&mut self, prev: &Waypoint, curr: &Waypoint) {
    let distance_m = self.pos.distance(curr.pos) * FEET_TO_METERS;

    match (prev.on_ground, curr.on_ground) {
      (_, false) => match curr.cross_at {
        Some(cross_at) => {
          self.use_perf_vs = false;
          self.target.vertical_speed = calc_vertical_speed(
            cross_at - self.altitude,
            distance_m,
            self.speed,
          );
          self.target.altitude = cross_at;
        }
        None => {
          self.use_perf_vs = true;
          self.target.altitude = prev.altitude;
        }
      },
      (false, true) => {
        self.use_perf_vs = false;
        self.target.vertical_speed = calc_vertical_speed(
          curr.altitude - self.altitude,
          distance_m,
          self.speed,
        );
        self.target.altitude = curr.altitude;
      }
      (true, true) => {}
    }
  }

  /// True once the aircraft should switch to the next waypoint. Also shapes
  /// the speed at the end of pushback and parking, and counts evaluations
  /// without progress.
  fn lead_point_reached(
    &mut self,
    curr: &Waypoint,
    next: Option<&Waypoint>,
    turn: f32,
  ) -> bool {
    let on_ground = self.on_ground();
    let Some(fp) = self.flight_plan.as_mut() else {
      return false;
    };

    let distance = self.pos.distance(curr.pos);
    let distance_m = distance * FEET_TO_METERS;
    let arrival = (10.0 * curr.speed).abs();

    let shaped = if distance_m < arrival
      && self.speed < 0.0
      && self.target.speed < 0.0
      && curr.contains("PushBackPoint")
    {
      Some(pushback_speed(arrival, distance_m))
    } else if distance_m < arrival
      && self.speed > 0.0
      && self.target.speed > 0.0
      && curr.contains("END")
    {
      Some(parking_speed(distance_m))
    } else {
      None
    };
    if let Some(speed) = shaped {
      self.target.speed = speed;
      if let Some(prev) = fp.previous_waypoint_mut() {
        if prev.speed < speed {
          prev.speed = speed;
        }
      }
    }

    let mut lead = fp.lead_distance();
    if lead < (2.0 * self.speed).abs() {
      lead = (2.0 * self.speed).abs();
      fp.set_lead_distance_ft(lead);
    }
    if on_ground && turn.abs() > 50.0 {
      lead = (4.0 * self.speed).abs();
      fp.set_lead_distance_ft(lead);
    }

    let bearing = self.bearing_error(angle_between_points(self.pos, curr.pos));
    if bearing < self.min_bearing {
      self.min_bearing = bearing.max(10.0);
      self.speed_fraction = if self.min_bearing > 10.0 && self.min_bearing < 360.0
      {
        0.5 + self.min_bearing.to_radians().cos() * 0.5
      } else {
        1.0
      };
    }

    let passing = distance > self.prev_dist_to_go && bearing > self.min_bearing * 1.1;
    if distance < lead || passing {
      trace!(
        "{}: reached {} ({distance:.0} ft, lead {lead:.0} ft)",
        self.callsign,
        curr.name
      );
      self.min_bearing = 360.0;
      self.speed_fraction = 1.0;
      self.prev_dist_to_go = f32::MAX;
      return true;
    }

    let no_progress = (self.prev_dist_to_go - distance).abs() < STUCK_TOLERANCE_FT;
    if no_progress && self.ground_target_speed.abs() > 0.0 && !self.at_gate() {
      self.stuck_counter += 1;
      trace!("{}: no progress toward {}", self.callsign, curr.name);
      if self.stuck_counter > AI_STUCK_LIMIT {
        let leg = self.flight_plan.as_ref().map(|fp| fp.leg());
        warn!(
          "{}: stuck on the way to {} ({leg:?}, next {:?})",
          self.callsign,
          curr.name,
          next.map(|w| &w.name)
        );
        self.set_dead(DeathReason::Stuck);
      }
    } else {
      self.stuck_counter = 0;
    }
    self.prev_dist_to_go = distance;

    false
  }

  /// Unsigned difference between the heading and `course`, in 0..=180.
  fn bearing_error(&self, course: f32) -> f32 {
    delta_angle(self.heading, course).abs()
  }

  /// Triggers for the names of the waypoint just passed.
  fn handle_airport_end_points(&mut self, prev: &Waypoint, ctx: &mut TickContext) {
    let slot = self.runway_slot(ctx.atc);
    let v_taxi = self.performance.v_taxi_reduced();
    let Some(fp) = self.flight_plan.as_mut() else {
      return;
    };

    if prev.contains("PushBackPoint") {
      fp.release_gate(ctx.airports);
      self.target.speed = 0.0;
      // Pull forward to the taxiway instead of reversing onto it.
      if let Some(wpt) = fp.previous_waypoint_mut() {
        wpt.speed = v_taxi;
      }
    }

    if fp.leg_ended(prev) {
      let from = fp.leg();
      fp.begin_next_leg(slot, ctx.now);
      debug!("{}: {from:?} -> {:?}", self.callsign, fp.leg());
    }

    if prev.contains("DepartureHold") {
      if self.takeoff_status == TakeoffStatus::None {
        self.schedule_departure(ctx);
      }
      self.takeoff_status = TakeoffStatus::Queued;
    }

    if prev.contains("Accel") {
      self.takeoff_status = TakeoffStatus::ClearedForTakeoff;
    }

    if prev.contains("END") {
      let departure = self
        .schedule
        .current()
        .map_or(Duration::ZERO, |f| f.departure_time);
      if let Some(fp) = self.flight_plan.as_mut() {
        fp.start_time = departure.max(ctx.now + MIN_TURNAROUND);
        debug!("{}: next start at {:?}", self.callsign, fp.start_time);
      }
    }
  }

  fn schedule_departure(&mut self, ctx: &mut TickContext) {
    let Some(flight) = self.schedule.current() else {
      return;
    };
    let tower = ControllerRef::new(flight.departure, ControllerKind::Tower);
    if let Some(report) = self.position_report() {
      ctx.requests.push(AtcRequest::ScheduleDeparture { tower, report });
    }
    self.tower = Some(tower);
  }

  fn reached_end_of_cruise(&self, ctx: &TickContext) -> bool {
    let Some(fp) = self.flight_plan.as_ref() else {
      return false;
    };
    let Some(curr) = fp.current_waypoint() else {
      return false;
    };
    if curr.name != "BOD" || fp.cursor() + 2 != fp.len() {
      return false;
    }

    let Some(flight) = self.schedule.current() else {
      return false;
    };
    let elevation = match find_airport(ctx.airports, flight.arrival) {
      Ok(airport) => airport.elevation,
      Err(e) => {
        warn!("{}: {e}", self.callsign);
        return false;
      }
    };

    let distance_m = self.pos.distance(curr.pos) * FEET_TO_METERS;
    let descent_speed = self.performance.v_descent * KNOT_TO_METERS_PER_SECOND;
    let descent_rate = self.performance.descent_rate * FEET_TO_METERS / 60.0;
    let vertical_m = (self.altitude - APPROACH_ALTITUDE - elevation) * FEET_TO_METERS;

    distance_m < descent_speed * (vertical_m / descent_rate)
  }

  fn load_next_leg(&mut self, ctx: &mut TickContext) -> Result<()> {
    let Some(fp) = self.flight_plan.as_ref() else {
      return Ok(());
    };
    let leg = fp.leg();
    if leg == Leg::Parking {
      return self.begin_next_flight(ctx);
    }

    let slot = self.runway_slot(ctx.atc);
    let Some(next) = fp.determine_next_leg(leg, slot, ctx.now) else {
      return Ok(());
    };
    debug!("{}: loading {next:?} after {leg:?}", self.callsign);
    self.create_leg(ctx, next, false)?;
    if let Some(fp) = self.flight_plan.as_mut() {
      fp.queue_leg(next);
    }

    Ok(())
  }

  /// Moves the schedule on after parking. A flight leaving from another
  /// airport than the one just reached repositions the aircraft there.
  fn begin_next_flight(&mut self, ctx: &mut TickContext) -> Result<()> {
    let arrived_at = self.schedule.current().map(|f| f.arrival);
    if !self.schedule.advance() {
      self.set_dead(DeathReason::ScheduleEnded);
      return Ok(());
    }

    let flight = self.schedule.current().ok_or(Error::NoScheduledFlight)?;
    let departure = flight.departure;
    let start_time = flight.departure_time.max(ctx.now + MIN_TURNAROUND);
    info!(
      "{} -> {}: next flight from {departure} at {start_time:?}",
      self.callsign, flight.callsign
    );
    self.callsign = flight.callsign;
    self.takeoff_status = TakeoffStatus::None;
    self.tower = None;

    let reposition = arrived_at != Some(departure);
    if reposition {
      self.clear_atc_controller(ctx.requests);
      self.repositioned = true;
    }
    if let Some(fp) = self.flight_plan.as_mut() {
      fp.runway = None;
      if reposition {
        fp.release_gate(ctx.airports);
        fp.delete_waypoints();
        fp.set_leg(Leg::Pushback);
        fp.start_time = start_time;
      } else {
        fp.queue_leg(Leg::Pushback);
      }
    }

    self.create_leg(ctx, Leg::Pushback, false)
  }

  fn create_leg(
    &mut self,
    ctx: &mut TickContext,
    leg: Leg,
    first_flight: bool,
  ) -> Result<()> {
    let flight = self.schedule.current().ok_or(Error::NoScheduledFlight)?;
    let Some(fp) = self.flight_plan.as_mut() else {
      return Ok(());
    };

    let mut create = CreateContext {
      pos: self.pos,
      heading: self.heading,
      altitude: self.altitude,
      speed: self.speed,
      performance: &self.performance,
      schedule: &self.schedule,
      flight,
      airports: &mut *ctx.airports,
      atc: &mut *ctx.atc,
      now: ctx.now,
      rng: &mut *ctx.rng,
    };
    fp.create(&mut create, leg, first_flight)
  }

  /// Steers toward `curr`, or splits the difference with the course to
  /// `next` when one is given.
  fn control_heading(&mut self, curr: &Waypoint, next: Option<&Waypoint>) {
    let bearing = angle_between_points(self.pos, curr.pos);
    let course = if self.speed < 0.0 {
      normalize_angle(bearing + 180.0)
    } else {
      bearing
    };

    let heading = match next.filter(|_| self.speed > 0.0) {
      Some(next) => {
        let outbound = angle_between_points(self.pos, next.pos);
        normalize_angle(course + delta_angle(course, outbound) / 2.0)
      }
      None => course,
    };

    if (heading - self.target.heading).abs() > 0.01 {
      self.target.heading = heading;
    }
  }

  /// Recomputes the turn anticipation after a large speed change.
  fn control_speed(&mut self, curr: &Waypoint, next: Option<&Waypoint>) {
    let diff = self.speed - self.prev_speed;
    if diff.abs() <= 10.0 {
      return;
    }
    self.prev_speed = self.speed;

    let speed = if diff > 0.0 && self.target.speed >= 5.0 {
      self.speed
    } else {
      self.target.speed
    };
    if let (Some(next), Some(fp)) = (next, self.flight_plan.as_mut()) {
      if !keeps_lead_distance(curr) {
        fp.set_lead_distance(speed, self.target.heading, curr, next);
      }
    }
  }
}

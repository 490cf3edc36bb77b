use std::time::Duration;

use itertools::Itertools;
use tracing::debug;

use crate::{
  Error, KNOT_TO_FEET_PER_SECOND, LEG_END, Result, seconds_between,
  atc::{
    AtcManager, AtcRequest, ControllerKind, ControllerRef, Instruction,
    PositionReport,
  },
  flight_plan::{Leg, ScheduledFlight},
};

use super::{Aircraft, DeathReason, TickContext};

/// The controller an aircraft flying `leg` of `flight` talks to, if any.
pub fn controller_for_leg(
  leg: Leg,
  flight: &ScheduledFlight,
) -> Option<ControllerRef> {
  let (airport, kind) = match leg {
    Leg::Pushback => (flight.departure, ControllerKind::Startup),
    Leg::TaxiOut => (flight.departure, ControllerKind::Ground),
    Leg::Takeoff => (flight.departure, ControllerKind::Tower),
    Leg::Descent | Leg::Hold => (flight.arrival, ControllerKind::Approach),
    Leg::TaxiIn => (flight.arrival, ControllerKind::Ground),
    Leg::Climb | Leg::Cruise | Leg::Landing | Leg::Parking => return None,
  };

  Some(ControllerRef::new(airport, kind))
}

impl Aircraft {
  /// Hands the aircraft over to the controller of its current leg and
  /// announces its position there.
  pub(super) fn announce_position_to_controller(
    &mut self,
    ctx: &mut TickContext,
  ) -> Result<()> {
    let Some(fp) = self.flight_plan.as_ref() else {
      return Ok(());
    };
    if fp.current_waypoint().is_none() {
      return Err(Error::MissingWaypoint);
    }

    let leg = fp.leg();
    let controller = self
      .schedule
      .current()
      .and_then(|flight| controller_for_leg(leg, flight));
    if leg == Leg::Takeoff {
      self.tower = None;
    }

    if controller != self.prev_controller {
      debug!(
        "{}: handoff {:?} -> {:?}",
        self.callsign, self.prev_controller, controller
      );
      if let Some(from) = self.prev_controller {
        if !self.is_dead() {
          ctx.requests.push(AtcRequest::SignOff { from, id: self.id });
        }
      }
    }
    self.prev_controller = controller;
    self.controller = controller;

    if let (Some(to), Some(report)) = (controller, self.position_report()) {
      ctx.requests.push(AtcRequest::Announce { to, report });
    }

    Ok(())
  }

  /// Reports to the controllers holding this aircraft and follows what they
  /// say back.
  pub(super) fn handle_atc_requests(&mut self, ctx: &mut TickContext) {
    let Some(report) = self.position_report() else {
      return;
    };

    let mut instruction = None;
    if let Some(to) = self.controller {
      ctx.requests.push(AtcRequest::Report {
        to,
        report: report.clone(),
      });
      instruction = ctx.atc.try_instruction(to, self.id);
    }

    // The tower only holds the aircraft in line; everything else comes from
    // ground.
    if let Some(tower) = self.tower {
      ctx.requests.push(AtcRequest::Report { to: tower, report });
      if let Some(from_tower) = ctx.atc.try_instruction(tower, self.id) {
        let merged = instruction.get_or_insert_with(Instruction::default);
        merged.hold_position |= from_tower.hold_position;
      }
    }

    if let Some(instruction) = instruction {
      self.process_atc(&instruction);
    }
  }

  fn process_atc(&mut self, instruction: &Instruction) {
    if instruction.resolve_circular_wait {
      self.set_dead(DeathReason::CircularWait);
      return;
    }

    self.hold_position = instruction.hold_position;
    if instruction.hold_position {
      self.target.speed = 0.0;
    } else if let Some(speed) = instruction.change_speed {
      self.target.speed = speed;
    } else if let Some(prev) = self
      .flight_plan
      .as_ref()
      .and_then(|fp| fp.previous_waypoint())
    {
      self.target.speed = prev.speed;
    }

    match instruction.change_heading {
      Some(heading) => {
        self.heading_lock = false;
        self.target.heading = heading;
      }
      None => self.heading_lock = true,
    }
  }

  pub fn position_report(&self) -> Option<PositionReport> {
    let flight = self.schedule.current()?;
    let fp = self.flight_plan.as_ref();
    let leg = fp.map(|fp| fp.leg()).unwrap_or_default();
    let approaching = matches!(leg, Leg::Descent | Leg::Hold);

    let intentions = fp
      .map(|fp| {
        fp.waypoints()
          .iter()
          .skip(fp.cursor() + 1)
          .take_while_inclusive(|w| !w.contains(LEG_END))
          .filter_map(|w| w.route_index)
          .collect()
      })
      .unwrap_or_default();

    Some(PositionReport {
      id: self.id,
      callsign: self.callsign,
      pos: self.pos,
      heading: self.heading,
      speed: self.speed,
      altitude: self.altitude,
      radius: self.schedule.radius,
      leg,
      runway: fp.and_then(|fp| fp.runway),
      gate: fp.and_then(|fp| fp.gate).map(|g| g.gate),
      destination: flight.arrival,
      flight_rules: flight.flight_rules,
      node: fp
        .and_then(|fp| fp.current_waypoint())
        .and_then(|w| w.route_index),
      intentions,
      departure_time: fp.map_or(flight.departure_time, |fp| fp.start_time),
      descent_speed: self.performance.v_descent,
      eta_to_checkpoint: approaching.then(|| self.ete_to(LEG_END)).flatten(),
      arrival_slot: fp
        .map(|fp| fp.arrival_time)
        .filter(|t| approaching && !t.is_zero()),
    })
  }

  /// Seconds to the first waypoint named like `name` at the current speed.
  fn ete_to(&self, name: &str) -> Option<f32> {
    let fp = self.flight_plan.as_ref()?;
    let track = fp.check_track_length(name);
    if track < 0.1 || self.speed < 1.0 {
      return None;
    }

    let curr = fp.current_waypoint()?;
    let distance = track + self.pos.distance(curr.pos);
    Some(distance / (self.speed * KNOT_TO_FEET_PER_SECOND))
  }

  /// Seconds the aircraft will be late (positive) or early (negative) at
  /// `name` against the plan's arrival time.
  pub fn check_for_arrival_time(&self, name: &str, now: Duration) -> f32 {
    let Some(fp) = self.flight_plan.as_ref() else {
      return 0.0;
    };

    match self.ete_to(name) {
      Some(ete) => ete - seconds_between(fp.arrival_time, now),
      None => 0.0,
    }
  }

  /// Slot granted by the current controller, else the planned arrival time.
  pub(super) fn runway_slot(&self, atc: &AtcManager) -> Option<Duration> {
    self
      .controller
      .and_then(|c| atc.try_instruction(c, self.id))
      .and_then(|i| i.runway_slot)
      .or_else(|| {
        self
          .flight_plan
          .as_ref()
          .map(|fp| fp.arrival_time)
          .filter(|t| !t.is_zero())
      })
  }

  /// Signs off from every controller. Safe to call more than once.
  pub fn clear_atc_controller(&mut self, requests: &mut Vec<AtcRequest>) {
    let held = [self.controller.take(), self.tower.take()];
    if !self.is_dead() {
      for from in held.into_iter().flatten().unique() {
        requests.push(AtcRequest::SignOff { from, id: self.id });
      }
    }
    self.prev_controller = None;
  }
}

#[cfg(test)]
mod tests {
  use glam::Vec2;
  use internment::Intern;

  use super::*;
  use crate::{
    entities::aircraft::tests::{Harness, aircraft, ground, taxiing},
    flight_plan::{FlightPlan, Waypoint},
  };

  fn kdep(kind: ControllerKind) -> ControllerRef {
    ControllerRef::new(Intern::from_ref("KDEP"), kind)
  }

  mod handoff {
    use super::*;

    #[test]
    fn test_controller_for_each_leg() {
      let flight = ScheduledFlight::new(
        Intern::from_ref("TST1"),
        Intern::from_ref("KDEP"),
        Intern::from_ref("KARR"),
        Duration::ZERO,
        Duration::from_secs(3600),
      );
      let karr = |kind| ControllerRef::new(Intern::from_ref("KARR"), kind);

      let controllers: Vec<_> = [
        Leg::Pushback,
        Leg::TaxiOut,
        Leg::Takeoff,
        Leg::Climb,
        Leg::Cruise,
        Leg::Descent,
        Leg::Hold,
        Leg::Landing,
        Leg::TaxiIn,
        Leg::Parking,
      ]
      .into_iter()
      .map(|leg| controller_for_leg(leg, &flight))
      .collect();

      assert_eq!(
        controllers,
        vec![
          Some(kdep(ControllerKind::Startup)),
          Some(kdep(ControllerKind::Ground)),
          Some(kdep(ControllerKind::Tower)),
          None,
          None,
          Some(karr(ControllerKind::Approach)),
          Some(karr(ControllerKind::Approach)),
          None,
          Some(karr(ControllerKind::Ground)),
          None,
        ]
      );
    }

    #[test]
    fn test_new_leg_signs_off_previous() {
      let mut harness = Harness::new();
      let mut aircraft = taxiing(
        Leg::TaxiOut,
        vec![ground("a", 0.0, 0.0, 15.0), ground("b", 0.0, 500.0, 15.0)],
      );
      aircraft.prev_controller = Some(kdep(ControllerKind::Startup));

      aircraft
        .announce_position_to_controller(&mut harness.ctx(0.1))
        .unwrap();

      assert_eq!(aircraft.controller, Some(kdep(ControllerKind::Ground)));
      assert_eq!(aircraft.prev_controller, aircraft.controller);
      assert!(matches!(
        harness.requests.as_slice(),
        [
          AtcRequest::SignOff { from, .. },
          AtcRequest::Announce { to, .. },
        ] if *from == kdep(ControllerKind::Startup) && *to == kdep(ControllerKind::Ground)
      ));
    }

    #[test]
    fn test_same_controller_only_announces() {
      let mut harness = Harness::new();
      let mut aircraft = taxiing(
        Leg::TaxiOut,
        vec![ground("a", 0.0, 0.0, 15.0), ground("b", 0.0, 500.0, 15.0)],
      );
      aircraft.prev_controller = Some(kdep(ControllerKind::Ground));

      aircraft
        .announce_position_to_controller(&mut harness.ctx(0.1))
        .unwrap();
      assert!(matches!(
        harness.requests.as_slice(),
        [AtcRequest::Announce { .. }]
      ));
    }

    #[test]
    fn test_missing_waypoint_is_fatal() {
      let mut harness = Harness::new();
      let mut aircraft = taxiing(Leg::TaxiOut, Vec::new());

      let result = aircraft.announce_position_to_controller(&mut harness.ctx(0.1));
      assert!(matches!(result, Err(Error::MissingWaypoint)));
    }

    #[test]
    fn test_clear_controller_is_idempotent() {
      let mut aircraft = aircraft();
      aircraft.controller = Some(kdep(ControllerKind::Ground));
      aircraft.prev_controller = aircraft.controller;
      aircraft.tower = Some(kdep(ControllerKind::Tower));

      let mut requests = Vec::new();
      aircraft.clear_atc_controller(&mut requests);
      aircraft.clear_atc_controller(&mut requests);

      assert_eq!(requests.len(), 2);
      assert_eq!(aircraft.controller, None);
      assert_eq!(aircraft.prev_controller, None);
      assert_eq!(aircraft.tower, None);
    }

    #[test]
    fn test_dead_aircraft_do_not_sign_off() {
      let mut aircraft = aircraft();
      aircraft.controller = Some(kdep(ControllerKind::Ground));
      aircraft.set_dead(DeathReason::Stuck);

      let mut requests = Vec::new();
      aircraft.clear_atc_controller(&mut requests);
      assert!(requests.is_empty());
      assert_eq!(aircraft.controller, None);
    }
  }

  mod instructions {
    use super::*;

    fn taxiing_at(speed: f32) -> Aircraft {
      taxiing(
        Leg::TaxiOut,
        vec![ground("a", 0.0, 0.0, speed), ground("b", 0.0, 500.0, speed)],
      )
    }

    #[test]
    fn test_hold_position_stops() {
      let mut aircraft = taxiing_at(15.0);
      aircraft.process_atc(&Instruction {
        hold_position: true,
        change_speed: Some(10.0),
        ..Default::default()
      });

      assert!(aircraft.hold_position);
      assert_eq!(aircraft.target.speed, 0.0);
    }

    #[test]
    fn test_release_resumes_waypoint_speed() {
      let mut aircraft = taxiing_at(15.0);
      aircraft.process_atc(&Instruction {
        hold_position: true,
        ..Default::default()
      });
      aircraft.process_atc(&Instruction::default());

      assert!(!aircraft.hold_position);
      assert_eq!(aircraft.target.speed, 15.0);
    }

    #[test]
    fn test_speed_and_heading_changes() {
      let mut aircraft = taxiing_at(15.0);
      aircraft.process_atc(&Instruction {
        change_speed: Some(8.0),
        change_heading: Some(270.0),
        ..Default::default()
      });

      assert_eq!(aircraft.target.speed, 8.0);
      assert_eq!(aircraft.target.heading, 270.0);
      assert!(!aircraft.heading_lock);
    }

    #[test]
    fn test_circular_wait_kills() {
      let mut aircraft = taxiing_at(15.0);
      aircraft.process_atc(&Instruction {
        resolve_circular_wait: true,
        ..Default::default()
      });
      assert!(aircraft.is_dead());
    }

    #[test]
    fn test_tower_hold_applies_while_with_ground() {
      let mut harness = Harness::new();
      let tower = kdep(ControllerKind::Tower);
      let runway = Some(Intern::from_ref("36"));

      let mut first = taxiing_at(15.0).with_id(Intern::from_ref("FIRST"));
      let mut second = taxiing_at(15.0).with_id(Intern::from_ref("SECOND"));
      for aircraft in [&mut first, &mut second] {
        if let Some(fp) = aircraft.flight_plan.as_mut() {
          fp.runway = runway;
        }
        aircraft.tower = Some(tower);
        let report = aircraft.position_report().unwrap();
        harness
          .requests
          .push(AtcRequest::ScheduleDeparture { tower, report });
      }
      harness.flush();
      harness.atc.update(harness.now, &mut harness.rng, |_| true);

      first.handle_atc_requests(&mut harness.ctx(0.1));
      second.handle_atc_requests(&mut harness.ctx(0.1));

      assert!(!first.hold_position);
      assert!(second.hold_position);
      assert_eq!(second.target.speed, 0.0);
    }
  }

  mod reports {
    use super::*;

    fn descending() -> Aircraft {
      let mut fp = FlightPlan::new(Duration::ZERO, Leg::Descent);
      fp.push_waypoint(Waypoint::in_air("a", Vec2::ZERO, 10000.0, 300.0));
      fp.push_waypoint(Waypoint::in_air("b", Vec2::new(0.0, 10000.0), 9000.0, 300.0));
      fp.push_waypoint(
        Waypoint::in_air("c", Vec2::new(0.0, 20000.0), 8000.0, 300.0)
          .with_track_length(10000.0),
      );
      fp.push_waypoint(
        Waypoint::in_air("dlegend", Vec2::new(0.0, 30000.0), 7000.0, 300.0)
          .with_track_length(10000.0),
      );
      fp.increment_waypoint(false);
      fp.arrival_time = Duration::from_secs(1100);

      let mut aircraft = aircraft().with_flight_plan(fp);
      aircraft.speed = 300.0;
      aircraft.no_roll = false;
      aircraft
    }

    #[test]
    fn test_descent_reports_eta_and_slot() {
      let aircraft = descending();
      let report = aircraft.position_report().unwrap();

      // 20000 ft of track plus 10000 ft to the current waypoint.
      let expected = 30000.0 / (300.0 * KNOT_TO_FEET_PER_SECOND);
      let eta = report.eta_to_checkpoint.unwrap();
      assert!((eta - expected).abs() < 0.01);
      assert_eq!(report.arrival_slot, Some(Duration::from_secs(1100)));
    }

    #[test]
    fn test_arrival_time_difference() {
      let aircraft = descending();
      let ete = 30000.0 / (300.0 * KNOT_TO_FEET_PER_SECOND);
      let late = aircraft.check_for_arrival_time(LEG_END, Duration::from_secs(1000));
      assert!((late - (ete - 100.0)).abs() < 0.01);

      assert_eq!(aircraft.check_for_arrival_time("nowhere", Duration::ZERO), 0.0);
    }

    #[test]
    fn test_ground_reports_have_no_eta() {
      let aircraft = taxiing(
        Leg::TaxiOut,
        vec![ground("a", 0.0, 0.0, 15.0), ground("b", 0.0, 500.0, 15.0)],
      );
      let report = aircraft.position_report().unwrap();
      assert_eq!(report.eta_to_checkpoint, None);
      assert_eq!(report.arrival_slot, None);
    }

    #[test]
    fn test_intentions_stop_at_leg_end() {
      use petgraph::graph::NodeIndex;

      let mut fp = FlightPlan::new(Duration::ZERO, Leg::TaxiOut);
      for (i, name) in ["a", "b", "clegend", "d"].into_iter().enumerate() {
        fp.push_waypoint(
          ground(name, 0.0, i as f32 * 100.0, 15.0)
            .with_route_index(Some(NodeIndex::new(i))),
        );
      }
      fp.increment_waypoint(false);
      let aircraft = aircraft().with_flight_plan(fp);
      let report = aircraft.position_report().unwrap();

      assert_eq!(report.node, Some(NodeIndex::new(1)));
      assert_eq!(report.intentions, vec![NodeIndex::new(2)]);
    }
  }
}

use std::{f32::consts::PI, time::Duration};

use glam::Vec2;
use internment::Intern;
use petgraph::graph::NodeIndex;
use tracing::{debug, trace, warn};
use turborand::{TurboRand, rng::Rng};

use crate::{
  APPROACH_ALTITUDE, Error, FEET_TO_METERS, KNOT_TO_METERS_PER_SECOND,
  METERS_TO_FEET, NAUTICALMILES_TO_FEET, Result,
  atc::AtcManager,
  entities::{
    airport::{
      Airport, Runway, RunwayClass, RunwayUsage, find_airport, find_airport_mut,
    },
    performance::Performance,
  },
  geometry::{angle_between_points, delta_angle, move_point, turn_radius},
  pathfinder::{GroundNetwork, display_route},
  seconds_between,
};

use super::{
  FlightPlan, GateAssignment, Leg, Lights, ScheduledFlight, TrafficSchedule,
  Waypoint,
};

/// Everything a generator may look at or touch while building a leg.
pub struct CreateContext<'a> {
  pub pos: Vec2,
  pub heading: f32,
  pub altitude: f32,
  pub speed: f32,

  pub performance: &'a Performance,
  pub schedule: &'a TrafficSchedule,
  pub flight: &'a ScheduledFlight,

  pub airports: &'a mut [Airport],
  pub atc: &'a mut AtcManager,
  pub now: Duration,
  pub rng: &'a mut Rng,
}

impl CreateContext<'_> {
  fn runway_class(&self) -> RunwayClass {
    RunwayClass::from_flight_type(&self.schedule.flight_type)
  }

  /// Great-circle stand-in: the course between the two airport centers.
  fn course(&self) -> f32 {
    match (
      find_airport(self.airports, self.flight.departure),
      find_airport(self.airports, self.flight.arrival),
    ) {
      (Ok(dep), Ok(arr)) if dep.center != arr.center => {
        angle_between_points(dep.center, arr.center)
      }
      _ => self.heading,
    }
  }
}

/// Distance covered while changing speed from `v0` to `v1` at a constant
/// rate `accel`. Units follow the inputs.
pub fn accel_distance(v0: f32, v1: f32, accel: f32) -> f32 {
  if accel <= 0.0 {
    return 0.0;
  }

  let t = (v1 - v0).abs() / accel;
  t * 0.5 * (v0 + v1)
}

/// Horizontal distance needed to gain `altitude` while climbing at
/// `degrees` of pitch.
pub fn pitch_distance(degrees: f32, altitude: f32) -> f32 {
  altitude / degrees.to_radians().tan()
}

/// Distance in feet to change speed between two values in knots with an
/// acceleration in knots per second.
fn accel_distance_ft(v0: f32, v1: f32, accel: f32) -> f32 {
  accel_distance(
    v0 * KNOT_TO_METERS_PER_SECOND,
    v1 * KNOT_TO_METERS_PER_SECOND,
    accel * KNOT_TO_METERS_PER_SECOND,
  ) * METERS_TO_FEET
}

/// Leg an aircraft should be placed in when it first appears at `now`.
pub fn initial_leg(now: Duration, departure: Duration, arrival: Duration) -> Leg {
  let elapsed = seconds_between(now, departure);
  if elapsed <= 60.0 {
    Leg::Pushback
  } else if elapsed <= 1500.0 {
    Leg::TaxiOut
  } else if elapsed <= 2000.0 {
    Leg::Takeoff
  } else if now < arrival {
    Leg::Cruise
  } else {
    Leg::Descent
  }
}

fn route_nodes(
  network: &GroundNetwork,
  from: NodeIndex,
  to: NodeIndex,
) -> Option<Vec<(NodeIndex, Intern<String>, Vec2)>> {
  let route = network.shortest_route(from, to)?;
  trace!("ground route: {}", display_route(network, &route));
  Some(
    route
      .nodes
      .into_iter()
      .filter_map(|i| network.node(i).map(|n| (i, n.name, n.data)))
      .collect(),
  )
}

impl FlightPlan {
  /// Appends the waypoints of `leg`. The cursor is left untouched and the
  /// last generated waypoint carries the leg end marker.
  pub fn create(
    &mut self,
    ctx: &mut CreateContext,
    leg: Leg,
    first_flight: bool,
  ) -> Result<()> {
    let before = self.waypoints.len();
    let cursor = self.cursor;

    match leg {
      Leg::Pushback => self.create_pushback(ctx, first_flight),
      Leg::TaxiOut => self.create_taxi_out(ctx, first_flight),
      Leg::Takeoff => self.create_takeoff(ctx),
      Leg::Climb => self.create_climb(ctx),
      Leg::Cruise => self.create_cruise(ctx),
      Leg::Descent => self.create_descent(ctx),
      Leg::Hold => self.create_hold(ctx),
      Leg::Landing => self.create_landing(ctx),
      Leg::TaxiIn => self.create_taxi_in(ctx),
      Leg::Parking => self.create_parking(ctx),
    }?;

    self.cursor = cursor;
    self.clamp_cursor();
    if self.waypoints.len() == before {
      warn!("{}: {leg:?} leg has no waypoints", ctx.flight.callsign);
      return Err(Error::EmptyLeg(leg));
    }

    self.mark_leg_end();
    debug!(
      "{}: created {leg:?} leg with {} waypoints",
      ctx.flight.callsign,
      self.waypoints.len() - before
    );

    Ok(())
  }

  fn departure_runway(&mut self, ctx: &CreateContext) -> Result<Runway> {
    let dep = ctx.flight.departure;
    let airport = find_airport(ctx.airports, dep)?;
    let runway = match self.runway.and_then(|id| airport.runway(id)) {
      Some(runway) => runway.clone(),
      None => airport
        .active_runway(ctx.runway_class(), RunwayUsage::Takeoff, ctx.course())
        .cloned()
        .ok_or(Error::NoActiveRunway(dep))?,
    };
    self.runway = Some(runway.id);

    Ok(runway)
  }

  fn claim_gate(&mut self, airport: &mut Airport, radius: f32) {
    if self.gate.is_some_and(|g| g.airport == airport.id) {
      return;
    }

    self.gate = airport.claim_gate(radius).map(|gate| GateAssignment {
      airport: airport.id,
      gate,
    });
    if self.gate.is_none() {
      warn!("no gate for radius {radius} at {}", airport.id);
    }
  }

  pub(crate) fn release_gate(&mut self, airports: &mut [Airport]) {
    if let Some(assignment) = self.gate.take() {
      if let Ok(airport) = find_airport_mut(airports, assignment.airport) {
        airport.release_gate(assignment.gate);
      }
    }
  }

  fn create_pushback(
    &mut self,
    ctx: &mut CreateContext,
    first_flight: bool,
  ) -> Result<()> {
    let dep = ctx.flight.departure;
    let radius = ctx.schedule.radius;
    let v_push = -ctx.performance.v_taxi / 2.0;

    let airport = find_airport_mut(ctx.airports, dep)?;
    if first_flight || self.gate.is_none() {
      self.claim_gate(airport, radius);
    }
    let elevation = airport.elevation;

    let gate = self
      .gate
      .filter(|g| g.airport == dep)
      .and_then(|g| airport.gate(g.gate))
      .cloned();
    let Some(gate) = gate else {
      warn!("{}: pushing back without a gate", ctx.flight.callsign);
      let behind =
        move_point(ctx.pos, ctx.heading + 180.0, 2.0 * radius.max(50.0));
      self.push_waypoint(Waypoint::on_ground("park", ctx.pos, elevation, v_push));
      self.push_waypoint(Waypoint::on_ground(
        "PushBackPoint",
        behind,
        elevation,
        v_push,
      ));
      return Ok(());
    };

    self.push_waypoint(Waypoint::on_ground(
      format!("Gate-{}", gate.id),
      gate.pos,
      elevation,
      v_push,
    ));

    let route = airport
      .network()
      .zip(gate.node.zip(gate.pushback))
      .and_then(|(network, (from, to))| route_nodes(network, from, to))
      .filter(|nodes| nodes.len() > 1);

    match route {
      Some(nodes) => {
        let count = nodes.len();
        for (i, (index, _, pos)) in nodes.iter().enumerate().skip(1) {
          let name = if i + 1 == count {
            "PushBackPoint".to_string()
          } else {
            format!("pushback-{i:03}")
          };
          self.push_waypoint(
            Waypoint::on_ground(name, *pos, elevation, v_push)
              .with_route_index(Some(*index)),
          );
        }
        self.last_node_index = nodes.last().map(|(i, ..)| *i);
      }
      None => {
        let behind = gate.point_behind(gate.radius.max(radius));
        self.push_waypoint(Waypoint::on_ground(
          "PushBackPoint",
          behind,
          elevation,
          v_push,
        ));
        self.last_node_index = gate.pushback.or(gate.node);
      }
    }

    Ok(())
  }

  fn create_default_taxi_out(
    &mut self,
    airport: &Airport,
    runway: &Runway,
    perf: &Performance,
  ) {
    let elevation = airport.elevation;
    self.push_waypoint(Waypoint::on_ground(
      "Airport Center",
      airport.center,
      elevation,
      perf.v_taxi,
    ));
    self.push_waypoint(
      Waypoint::on_runway(
        "Runway Takeoff",
        runway.point_on_centerline(5.0 * METERS_TO_FEET),
        elevation,
        perf.v_taxi,
      )
      .with_flaps(0.5),
    );
    self.push_waypoint(
      Waypoint::on_runway(
        "Accel",
        runway.point_on_centerline(105.0 * METERS_TO_FEET),
        elevation,
        perf.v_rotate,
      )
      .with_flaps(0.5),
    );
  }

  fn create_taxi_out(
    &mut self,
    ctx: &mut CreateContext,
    first_flight: bool,
  ) -> Result<()> {
    let dep = ctx.flight.departure;
    let perf = ctx.performance;

    if first_flight {
      let airport = find_airport_mut(ctx.airports, dep)?;
      if !airport.gates.is_empty() {
        self.claim_gate(airport, ctx.schedule.radius);
      }
    }

    let runway = self.departure_runway(ctx)?;
    let takeoff_point =
      runway.point_on_centerline_displaced(5.0 * METERS_TO_FEET);

    let airport = find_airport(ctx.airports, dep)?;
    let elevation = airport.elevation;
    let Some(network) = airport.network() else {
      self.create_default_taxi_out(airport, &runway, perf);
      return Ok(());
    };

    let start = self
      .gate
      .filter(|g| g.airport == dep)
      .and_then(|g| airport.gate(g.gate))
      .and_then(|g| g.pushback.or(g.node))
      .or(self.last_node_index)
      .or_else(|| network.nearest_node(ctx.pos));
    let route = start
      .zip(network.nearest_runway_node(takeoff_point))
      .and_then(|(from, to)| route_nodes(network, from, to));

    let nodes = match route {
      Some(nodes) if nodes.len() > 1 => nodes,
      _ => {
        debug!("{}: no taxi route at {dep}", ctx.flight.callsign);
        self.create_default_taxi_out(airport, &runway, perf);
        return Ok(());
      }
    };

    let skip = if first_flight {
      let most = nodes.len().saturating_sub(2).max(1);
      ctx.rng.usize(1..=most)
    } else {
      1
    };
    let nodes = &nodes[skip.min(nodes.len() - 1)..];
    let count = nodes.len();

    for (i, (index, name, pos)) in nodes.iter().enumerate() {
      let mut wpt = Waypoint::on_ground(name.as_str(), *pos, elevation, perf.v_taxi)
        .with_route_index(Some(*index));
      match count - i {
        2 => {
          wpt.name.push_str("_DepartureHold");
          wpt.flaps = 0.5;
          wpt.lights = Lights::Takeoff;
        }
        1 => {
          wpt.name.push_str("_Accel");
          wpt.flaps = 0.5;
          wpt.lights = Lights::Takeoff;
        }
        _ => {}
      }
      self.push_waypoint(wpt);
    }
    self.last_node_index = nodes.last().map(|(i, ..)| *i);

    let last = self.last_waypoint().map(|w| w.pos).unwrap_or(takeoff_point);
    let mut accel_point = 105.0 * METERS_TO_FEET;
    let to_threshold = last.distance(runway.threshold());
    if to_threshold > accel_point {
      accel_point += to_threshold;
    }
    self.push_waypoint(
      Waypoint::on_runway(
        "Accel",
        runway.point_on_centerline_displaced(accel_point),
        elevation,
        perf.v_rotate,
      )
      .with_flaps(0.5),
    );

    if first_flight {
      self.release_gate(ctx.airports);
    }

    Ok(())
  }

  fn create_takeoff(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let perf = ctx.performance;
    let runway = self.departure_runway(ctx)?;
    let elevation = find_airport(ctx.airports, ctx.flight.departure)?.elevation;

    let mut accel_point = 105.0 * METERS_TO_FEET;
    if self.waypoints.is_empty() {
      self.push_waypoint(
        Waypoint::on_runway(
          "Accel",
          runway.point_on_centerline_displaced(accel_point),
          elevation,
          perf.v_rotate,
        )
        .with_flaps(0.5),
      );
    } else {
      let to_threshold = ctx.pos.distance(runway.threshold());
      if to_threshold > accel_point {
        accel_point += to_threshold;
      }
    }

    let rotate =
      accel_distance_ft(perf.v_taxi, perf.v_rotate, perf.acceleration)
        + accel_point;
    self.push_waypoint(
      Waypoint::on_runway(
        "rotate",
        runway.point_on_centerline_displaced(rotate),
        elevation,
        perf.v_rotate,
      )
      .with_flaps(0.5),
    );

    let liftoff = rotate
      + accel_distance_ft(perf.v_rotate, perf.v_takeoff, perf.acceleration);
    self.push_waypoint(
      Waypoint::on_runway(
        "takeoff",
        runway.point_on_centerline_displaced(liftoff),
        elevation,
        perf.v_takeoff,
      )
      .with_flaps(0.5),
    );

    // Past the point where 400 ft would be reached, so the lead distance
    // never triggers the gear before the aircraft is airborne.
    let v_ref = perf.v_takeoff + 20.0;
    let gear_up = liftoff + 2.0 * v_ref + pitch_distance(10.0, 400.0);
    self.push_waypoint(
      Waypoint::in_air(
        "gear-up",
        runway.point_on_centerline_displaced(gear_up),
        elevation + 400.0,
        v_ref,
      )
      .with_flaps(0.5),
    );

    let v_climb = perf.v_climb.min(240.0);
    for (name, height) in [("2000'", 2000.0), ("2500'", 2500.0)] {
      let distance = liftoff + 2.0 * v_climb + pitch_distance(10.0, height);
      self.push_waypoint(Waypoint::in_air(
        name,
        runway.point_on_centerline_displaced(distance),
        elevation + height,
        v_climb,
      ));
    }

    Ok(())
  }

  fn create_climb(&mut self, ctx: &mut CreateContext) -> Result<()> {
    if let Some(sid) = &ctx.schedule.sid {
      for wpt in sid {
        self.push_waypoint(wpt.clone());
      }
      return Ok(());
    }

    let perf = ctx.performance;
    let top = ctx.flight.cruise_altitude;
    let runway = self.departure_runway(ctx)?;
    let destination = find_airport(ctx.airports, ctx.flight.arrival)?.center;

    let current = self.last_waypoint().map_or(runway.end(), |w| w.pos);
    let course = angle_between_points(current, destination);
    let diff = delta_angle(runway.heading, course);

    if diff.abs() < 10.0 {
      self.push_waypoint(Waypoint::in_air(
        "10000ft climb",
        move_point(current, course, 10.0 * NAUTICALMILES_TO_FEET),
        top.min(10000.0),
        perf.v_climb,
      ));
      self.push_waypoint(Waypoint::in_air(
        "18000ft climb",
        move_point(current, course, 20.0 * NAUTICALMILES_TO_FEET),
        top.min(18000.0),
        perf.v_climb,
      ));
      return Ok(());
    }

    let climb_out =
      move_point(current, runway.heading, 5.0 * NAUTICALMILES_TO_FEET);
    let level = top.min(5000.0);
    self.push_waypoint(Waypoint::in_air(
      "5000ft climb",
      climb_out,
      level,
      perf.v_climb,
    ));

    let (right_angle, increment) = if diff > 0.0 { (90.0, 2) } else { (-90.0, -2) };
    let radius = turn_radius(perf.v_climb, true);
    let center = move_point(climb_out, runway.heading + right_angle, radius);
    self.create_arc(
      center,
      runway.heading - right_angle,
      course - right_angle,
      increment,
      radius,
      level,
      level - top.min(10000.0),
      perf.v_climb,
      "climb-out",
    );

    let arc_end = self.last_waypoint().map_or(climb_out, |w| w.pos);
    self.push_waypoint(Waypoint::in_air(
      "18000ft climb",
      move_point(
        arc_end,
        angle_between_points(arc_end, destination),
        10.0 * NAUTICALMILES_TO_FEET,
      ),
      top.min(18000.0),
      perf.v_climb,
    ));

    Ok(())
  }

  fn create_cruise(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let perf = ctx.performance;
    let arr = ctx.flight.arrival;
    let altitude = ctx.flight.cruise_altitude;
    let airport = find_airport(ctx.airports, arr)?;

    let start = self.last_waypoint().map_or(ctx.pos, |w| w.pos);
    let course = angle_between_points(start, airport.center);
    let runway = airport
      .active_runway(ctx.runway_class(), RunwayUsage::Landing, course)
      .ok_or(Error::NoActiveRunway(arr))?;

    let bod = runway.point_on_centerline(0.0);
    let leg = 20.0 * NAUTICALMILES_TO_FEET;
    let to_bod = angle_between_points(start, bod);
    let count = (start.distance(bod) / leg) as usize;

    self.push_waypoint(Waypoint::in_air("Cruise", start, altitude, perf.v_cruise));
    for i in 1..count {
      self.push_waypoint(
        Waypoint::in_air(
          format!("cruise{i:03}"),
          move_point(start, to_bod, i as f32 * leg),
          altitude,
          perf.v_cruise,
        )
        .with_track_length(leg),
      );
    }

    // Placeholders; the descent replaces them once the aircraft is
    // close enough.
    self.push_waypoint(Waypoint::in_air("BOD", bod, altitude, perf.v_cruise));
    self.push_waypoint(Waypoint::in_air(
      "BOD2",
      runway.point_on_centerline(-10000.0),
      altitude,
      perf.v_cruise,
    ));

    Ok(())
  }

  fn create_landing(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let perf = ctx.performance;
    let arr = ctx.flight.arrival;
    let airport = find_airport(ctx.airports, arr)?;
    let runway = match self.runway.and_then(|id| airport.runway(id)) {
      Some(runway) => runway,
      None => airport
        .active_runway(ctx.runway_class(), RunwayUsage::Landing, ctx.heading)
        .ok_or(Error::NoActiveRunway(arr))?,
    };
    self.runway = Some(runway.id);
    let elevation = airport.elevation;

    let glideslope = 3f32.to_radians().tan();
    let touchdown = runway.displaced_threshold + 0.25 * runway.landing_length();

    let mut begin = Waypoint::in_air(
      format!("Glideslope begin Rwy {}", runway.id),
      runway.point_on_centerline(touchdown - APPROACH_ALTITUDE / glideslope),
      elevation + APPROACH_ALTITUDE,
      perf.v_approach,
    )
    .with_gear(true)
    .with_flaps(1.0);
    begin.speed_brakes = true;
    self.push_waypoint(begin);

    self.push_waypoint(
      Waypoint::in_air(
        "500' decel",
        runway.point_on_centerline(touchdown - 500.0 / glideslope),
        elevation + 500.0,
        perf.v_touchdown,
      )
      .with_gear(true)
      .with_flaps(1.0),
    );
    self.push_waypoint(
      Waypoint::in_air(
        "CrossThreshold",
        runway.begin(),
        elevation + touchdown * glideslope,
        perf.v_touchdown,
      )
      .with_gear(true)
      .with_flaps(1.0),
    );

    let rollout = accel_distance_ft(
      perf.v_touchdown,
      perf.v_taxi,
      perf.deceleration_on_ground(),
    );
    let count = ((rollout * FEET_TO_METERS / 60.0) as usize).max(1);
    for i in 1..=count {
      let fraction = (count - i) as f32 / count as f32;
      let t = 1.0 - fraction * fraction;
      let speed = perf.v_touchdown + (perf.v_taxi - perf.v_touchdown) * t;
      self.push_waypoint(
        Waypoint::on_runway(
          format!("landingdecel{i:03}"),
          runway.point_on_centerline(touchdown + rollout * t),
          elevation,
          speed,
        )
        .with_flaps(1.0)
        .with_spoilers(1.0)
        .with_cross_at(Some(elevation)),
      );
    }
    if let Some(last) = self.last_waypoint_mut() {
      last.speed = perf.v_taxi;
    }

    let exit = airport.network().and_then(|network| {
      let index = network
        .nearest_runway_node(runway.point_on_centerline(1.1 * rollout + touchdown))?;
      network.node(index).map(|n| (index, n.name, n.data))
    });
    if let Some((index, name, pos)) = exit {
      self.push_waypoint(
        Waypoint::on_runway(format!("exit-{name}"), pos, elevation, perf.v_taxi)
          .with_route_index(Some(index)),
      );
      self.last_node_index = Some(index);
    }

    Ok(())
  }

  fn create_default_taxi_in(
    &mut self,
    airport: &Airport,
    exit: Vec2,
    gate: Option<Vec2>,
    v_taxi: f32,
  ) {
    let elevation = airport.elevation;
    self.push_waypoint(Waypoint::on_ground("Runway Exit", exit, elevation, v_taxi));
    self.push_waypoint(Waypoint::on_ground(
      "Airport Center",
      airport.center,
      elevation,
      v_taxi,
    ));
    if let Some(gate) = gate {
      self.push_waypoint(Waypoint::on_ground("END-taxi", gate, elevation, v_taxi));
    }
  }

  fn create_taxi_in(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let arr = ctx.flight.arrival;
    let v_taxi = ctx.performance.v_taxi;

    let airport = find_airport_mut(ctx.airports, arr)?;
    self.claim_gate(airport, ctx.schedule.radius);
    let airport = &*airport;

    let gate = self
      .gate
      .filter(|g| g.airport == arr)
      .and_then(|g| airport.gate(g.gate));
    let exit = self.last_waypoint().map_or(ctx.pos, |w| w.pos);

    let route = airport.network().and_then(|network| {
      let to = gate?.node?;
      let from = self.last_node_index.or_else(|| network.nearest_node(exit))?;
      route_nodes(network, from, to)
    });
    let (Some(nodes), Some(gate)) = (route.filter(|n| !n.is_empty()), gate) else {
      let behind = gate.map(|g| g.point_behind(20.0 * METERS_TO_FEET));
      self.create_default_taxi_in(airport, exit, behind, v_taxi);
      return Ok(());
    };

    let elevation = airport.elevation;
    let gate_pos = gate.pos;
    let count = nodes.len();
    for (i, (index, _, pos)) in nodes.iter().enumerate() {
      let previous = self.last_waypoint().map_or(exit, |w| w.pos);
      let spacing = previous.distance(*pos);
      if spacing <= METERS_TO_FEET || pos.distance(gate_pos) <= 20.0 * METERS_TO_FEET {
        continue;
      }

      let speed = if spacing < 10.0 * METERS_TO_FEET || count - i < 2 {
        v_taxi / 2.0
      } else {
        v_taxi
      };
      self.push_waypoint(
        Waypoint::on_ground(
          format!("landingtaxi-{}-{i}", index.index()),
          *pos,
          elevation,
          speed,
        )
        .with_route_index(Some(*index)),
      );
    }
    self.last_node_index = nodes.last().map(|(i, ..)| *i);

    Ok(())
  }

  fn create_parking(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let arr = ctx.flight.arrival;
    let airport = find_airport(ctx.airports, arr)?;
    let elevation = airport.elevation;
    let reduced = ctx.performance.v_taxi_reduced();

    let gate = self
      .gate
      .filter(|g| g.airport == arr)
      .and_then(|g| airport.gate(g.gate));
    let Some(gate) = gate else {
      warn!("{}: parking without a valid gate", ctx.flight.callsign);
      self.push_waypoint(Waypoint::on_ground(
        "END-ParkingInvalidGate",
        airport.center,
        elevation,
        reduced,
      ));
      return Ok(());
    };

    let approach = [(18.0, 3.0), (14.0, 3.0), (10.0, 2.0), (6.0, 2.0), (3.0, 2.0)];
    for (i, (behind, speed)) in approach.into_iter().enumerate() {
      self.push_waypoint(Waypoint::on_ground(
        format!("parking{}", i + 1),
        gate.point_behind(behind * METERS_TO_FEET),
        elevation,
        speed,
      ));
    }

    let creep = reduced / 3.0;
    self.push_waypoint(Waypoint::on_ground(
      format!("Parking-{}", gate.id),
      gate.pos,
      elevation,
      creep,
    ));
    for (name, beyond) in [("Beyond-Parking", 2.0), ("END-Parking", 3.0)] {
      self.push_waypoint(Waypoint::on_ground(
        name,
        move_point(gate.pos, gate.heading, beyond * METERS_TO_FEET),
        elevation,
        creep,
      ));
    }

    Ok(())
  }

  /// Appends in-air points on a circle around `center`, from bearing
  /// `start` to `end` in whole-degree steps of `increment`, descending
  /// `alt_diff` feet in total from `elevation`.
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn create_arc(
    &mut self,
    center: Vec2,
    start: f32,
    end: f32,
    increment: i32,
    radius: f32,
    elevation: f32,
    alt_diff: f32,
    speed: f32,
    prefix: &str,
  ) {
    if increment == 0 {
      warn!("arc {prefix} has no increment");
      return;
    }

    let start = start.round() as i32;
    let mut end = end.round() as i32;
    if end > start && increment < 0 {
      end -= 360;
    } else if end < start && increment > 0 {
      end += 360;
    }

    let step = increment.abs();
    let count = ((end - start).abs() / step).max(1);
    let alt_decrement = alt_diff / count as f32;
    let track_length = 2.0 * PI * radius / 360.0 * step as f32;

    let mut altitude = elevation;
    let mut angle = start;
    while (increment > 0 && angle < end) || (increment < 0 && angle > end) {
      if angle.abs() > 720 {
        warn!("runaway arc {prefix} at {angle} degrees");
        break;
      }

      altitude -= alt_decrement;
      self.push_waypoint(
        Waypoint::in_air(
          format!("{prefix}{angle:03}"),
          move_point(center, angle as f32, radius),
          altitude,
          speed,
        )
        .with_track_length(track_length),
      );
      angle += increment;
    }
  }

  /// Appends in-air points along a straight line, spaced by roughly two
  /// seconds of flight at `speed`.
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn create_line(
    &mut self,
    start: Vec2,
    azimuth: f32,
    distance: f32,
    elevation: f32,
    alt_diff: f32,
    speed: f32,
    prefix: &str,
  ) {
    if speed <= 0.0 {
      return;
    }

    let count = (distance * FEET_TO_METERS / (2.0 * speed)) as usize;
    let step = distance / count.max(1) as f32;
    for i in 1..count {
      let fraction = i as f32 / count as f32;
      self.push_waypoint(
        Waypoint::in_air(
          format!("{prefix}{i:03}"),
          move_point(start, azimuth, distance * fraction),
          elevation - alt_diff * fraction,
          speed,
        )
        .with_track_length(step),
      );
    }
  }
}

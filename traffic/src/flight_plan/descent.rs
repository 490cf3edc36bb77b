use std::time::Duration;

use internment::Intern;
use tracing::{debug, trace};

use crate::{
  APPROACH_ALTITUDE, Error, KNOT_TO_FEET_PER_SECOND, NAUTICALMILES_TO_FEET,
  Result,
  entities::airport::{RunwayClass, RunwayUsage, find_airport},
  geometry::{
    Circle, angle_between_points, delta_angle, inner_tangents_angle,
    inner_tangents_length, move_point, normalize_angle, outer_tangents_angle,
    outer_tangents_length, turn_radius,
  },
};

use super::{CreateContext, FlightPlan, Waypoint};

const DEFAULT_DISTANCE_TO_FINAL: f32 = 6.0 * NAUTICALMILES_TO_FEET;

impl FlightPlan {
  fn altitude_or(&self, altitude: f32) -> f32 {
    self.last_waypoint().map_or(altitude, |w| w.altitude)
  }

  /// Distance from the threshold at which arrivals to `runway` join the
  /// final approach.
  fn distance_to_final(ctx: &mut CreateContext, runway: Intern<String>) -> f32 {
    ctx
      .atc
      .approach_runway_mut(ctx.flight.arrival, runway)
      .map_or(DEFAULT_DISTANCE_TO_FINAL, |r| r.distance_to_final)
  }

  pub(super) fn create_descent(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let arr = ctx.flight.arrival;
    let class = RunwayClass::from_flight_type(&ctx.schedule.flight_type);
    let (runway, elevation) = {
      let airport = find_airport(ctx.airports, arr)?;
      let runway = airport
        .active_runway(class, RunwayUsage::Landing, ctx.heading)
        .cloned()
        .ok_or(Error::NoActiveRunway(arr))?;
      (runway, airport.elevation)
    };
    self.runway = Some(runway.id);

    let current = ctx.pos;
    let mut heading = ctx.heading;
    if self.waypoints.is_empty() && heading == 0.0 {
      heading = angle_between_points(current, runway.threshold());
    }

    let v_descent = ctx.performance.v_descent;
    let alt = ctx.altitude;
    let alt_diff = alt - elevation - APPROACH_ALTITUDE;
    let radius = turn_radius(v_descent, true);
    let out = Self::distance_to_final(ctx, runway.id);

    let heading_diff = delta_angle(runway.heading, heading);
    let lateral = if heading_diff > 0.0 { -radius } else { radius };

    let initial = runway.point_on_centerline(-out);
    let mut secondary = runway.point_off_centerline(-2.0 * out, lateral);
    let distance = current.distance(initial);
    let azimuth = angle_between_points(current, initial);
    let to_threshold = angle_between_points(current, runway.threshold());
    let circle = |center| Circle::new(center, radius);

    let before = self.waypoints.len();
    trace!(
      "{}: descent entry, runway diff {heading_diff}, {distance} ft out",
      ctx.flight.callsign
    );

    if (30.0..=150.0).contains(&heading_diff.abs()) {
      let (right_angle, increment) =
        if heading_diff > 0.0 { (90.0, 2) } else { (-90.0, -2) };
      let mut center = move_point(current, heading + right_angle, radius);

      if distance < 2.0 * radius {
        debug!("{}: near S-curve entry", ctx.flight.callsign);
        secondary = runway.point_off_centerline(-2.0 * out, -lateral);

        // Too close to turn in: overfly and come back from the other side.
        let mut new_current = current;
        if delta_angle(to_threshold, heading).abs() < 90.0 {
          new_current = move_point(current, heading, distance + 1000.0);
          center = move_point(new_current, heading + right_angle, radius);
          self.create_line(
            current,
            heading,
            distance + 1000.0,
            self.altitude_or(alt),
            0.0,
            v_descent,
            "move",
          );
        }
        let mut offset = 1000.0;
        while center.distance(secondary) < 2.0 * radius {
          offset += 100.0;
          new_current = move_point(new_current, heading, offset);
          center = move_point(new_current, heading + right_angle, radius);
        }

        let course = outer_tangents_angle(&circle(center), &circle(secondary))[0];
        self.create_arc(
          center,
          heading - right_angle,
          course - right_angle,
          increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "near-initialturn",
        );
        let length = inner_tangents_length(&circle(center), &circle(secondary));
        let start = self.last_waypoint().map_or(current, |w| w.pos);
        self.create_line(
          start,
          course,
          length,
          self.altitude_or(alt),
          alt_diff / 2.0,
          v_descent,
          "descent",
        );
        self.create_arc(
          secondary,
          normalize_angle(course - right_angle),
          normalize_angle(runway.heading - right_angle),
          increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "turn",
        );
      } else {
        debug!("{}: far S-curve entry", ctx.flight.callsign);
        let tangent = usize::from(heading_diff >= 0.0);
        let mut offset = 1000.0;
        while center.distance(secondary) < 2.0 * radius {
          offset += 1000.0;
          secondary = runway.point_off_centerline(-2.0 * out + offset, lateral);
        }

        let course =
          inner_tangents_angle(&circle(center), &circle(secondary)).headings[tangent];
        self.create_arc(
          center,
          heading - right_angle,
          course - right_angle,
          increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 8.0,
          v_descent,
          "far-initialturn",
        );
        let length = inner_tangents_length(&circle(center), &circle(secondary));
        let start = self.last_waypoint().map_or(current, |w| w.pos);
        self.create_line(
          start,
          course,
          length,
          self.altitude_or(alt),
          alt_diff * 0.75,
          v_descent,
          "descent",
        );
        self.create_arc(
          secondary,
          normalize_angle(course + right_angle),
          normalize_angle(runway.heading + right_angle),
          -increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 8.0,
          v_descent,
          "s-turn",
        );
      }
    } else if heading_diff.abs() > 150.0 {
      if distance < 2.0 * radius {
        debug!("{}: near downwind entry", ctx.flight.callsign);
        secondary = runway.point_off_centerline(-2.0 * out, -lateral);

        let (right_angle, increment) = if delta_angle(heading, azimuth) > 0.0 {
          (90.0, 2)
        } else {
          (-90.0, -2)
        };
        let first = move_point(current, heading + right_angle, radius);
        let downwind = normalize_angle(runway.heading - 180.0);
        let second = move_point(first, downwind, 2.0 * radius);
        self.create_arc(
          first,
          heading - right_angle,
          downwind,
          increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "d-near-initialturn",
        );

        let course = outer_tangents_angle(&circle(second), &circle(secondary))[0];
        self.create_arc(
          second,
          normalize_angle(runway.heading),
          course + right_angle,
          -increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "secondturn",
        );
        let length = outer_tangents_length(&circle(second), &circle(secondary));
        let start = self.last_waypoint().map_or(current, |w| w.pos);
        self.create_line(
          start,
          course,
          length,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "descent",
        );
        self.create_arc(
          secondary,
          course + right_angle,
          normalize_angle(runway.heading + right_angle),
          -increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 4.0,
          v_descent,
          "turn",
        );
      } else {
        debug!("{}: far downwind entry", ctx.flight.callsign);
        let (right_angle, increment) =
          if heading_diff > 0.0 { (90.0, 2) } else { (-90.0, -2) };
        let tangent = usize::from(heading_diff >= 0.0);
        let center = move_point(current, heading + right_angle, radius);

        let course =
          inner_tangents_angle(&circle(center), &circle(secondary)).headings[tangent];
        self.create_arc(
          center,
          heading - right_angle,
          course - right_angle,
          increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 3.0,
          v_descent,
          "d-far-initialturn",
        );
        let length = inner_tangents_length(&circle(center), &circle(secondary));
        let start = self.last_waypoint().map_or(current, |w| w.pos);
        self.create_line(
          start,
          course,
          length,
          self.altitude_or(alt),
          alt_diff / 3.0,
          v_descent,
          "descent",
        );
        self.create_arc(
          secondary,
          normalize_angle(course + right_angle),
          normalize_angle(runway.heading + right_angle),
          -increment,
          radius,
          self.altitude_or(alt),
          alt_diff / 3.0,
          v_descent,
          "d-s-turn",
        );
      }
    } else {
      debug!("{}: straight entry", ctx.flight.callsign);
      let (right_angle, increment) =
        if heading_diff > 0.0 { (90.0, -2) } else { (-90.0, 2) };
      let center = move_point(current, heading - right_angle, radius);
      self.create_arc(
        center,
        heading + right_angle,
        runway.heading + right_angle,
        increment,
        radius,
        alt,
        alt_diff / 3.0,
        v_descent,
        "straight_turn_",
      );

      // Nearly aligned entries produce no arc; either way the leg ends on
      // the final approach fix.
      let (start, altitude) = self.waypoints[before..]
        .last()
        .map_or((current, alt), |w| (w.pos, w.altitude));
      let target = alt - alt_diff;
      let course = angle_between_points(start, initial);
      let length = start.distance(initial);
      self.create_line(
        start,
        course,
        length,
        altitude,
        altitude - target,
        v_descent,
        "final",
      );
      let from = self.waypoints[before..].last().map_or(start, |w| w.pos);
      self.push_waypoint(
        Waypoint::in_air("final-fix", initial, target, v_descent)
          .with_track_length(from.distance(initial)),
      );
    }

    self.request_arrival_slot(ctx, before, runway.id);
    Ok(())
  }

  /// Asks the approach controller for a landing slot matching the time it
  /// takes to fly the waypoints generated after `from`.
  fn request_arrival_slot(
    &mut self,
    ctx: &mut CreateContext,
    from: usize,
    runway: Intern<String>,
  ) {
    let track: f32 = self.waypoints[from..]
      .iter()
      .map(|w| w.track_length)
      .sum();
    let speed = ctx.performance.v_descent * KNOT_TO_FEET_PER_SECOND;
    let eta = ctx.now + Duration::from_secs_f32(track / speed.max(1.0));

    self.arrival_time = match ctx.atc.approach_runway_mut(ctx.flight.arrival, runway) {
      Some(active) => active.request_time_slot(eta, ctx.now),
      None => eta,
    };
    debug!(
      "{}: {track} ft to go, eta {eta:?}, runway {runway} slot {:?}",
      ctx.flight.callsign, self.arrival_time
    );
  }

  pub(super) fn create_hold(&mut self, ctx: &mut CreateContext) -> Result<()> {
    let arr = ctx.flight.arrival;
    let class = RunwayClass::from_flight_type(&ctx.schedule.flight_type);
    let runway = find_airport(ctx.airports, arr)?
      .active_runway(class, RunwayUsage::Landing, ctx.heading)
      .cloned()
      .ok_or(Error::NoActiveRunway(arr))?;

    let v_descent = ctx.performance.v_descent;
    let radius = turn_radius(v_descent, true);
    let altitude = self.altitude_or(ctx.altitude);
    let out = Self::distance_to_final(ctx, runway.id);

    let inbound = runway.point_off_centerline(-2.0 * out, radius);
    let outbound = runway.point_off_centerline(-4.0 * out, radius);
    self.create_arc(
      inbound,
      runway.heading - 90.0,
      runway.heading + 90.0,
      5,
      radius,
      altitude,
      0.0,
      v_descent,
      "hold_1_",
    );
    self.create_arc(
      outbound,
      runway.heading + 90.0,
      runway.heading - 90.0,
      5,
      radius,
      altitude,
      0.0,
      v_descent,
      "hold_2_",
    );

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use glam::Vec2;

  use super::*;
  use crate::flight_plan::{Leg, create::tests::Fixture};

  const ARRIVAL_Y: f32 = 200.0 * NAUTICALMILES_TO_FEET;

  fn descent(pos: Vec2, heading: f32) -> (Fixture, FlightPlan) {
    let mut fixture = Fixture::new(false);
    let mut fp = FlightPlan::new(Duration::ZERO, Leg::Descent);
    let result = fixture.create(&mut fp, Leg::Descent, pos, heading, 12000.0);
    assert_eq!(result, Ok(()));
    (fixture, fp)
  }

  /// Six miles out on the extended centerline of the arrival runway.
  fn final_fix() -> Vec2 {
    Vec2::new(0.0, ARRIVAL_Y - 5000.0 - 6.0 * NAUTICALMILES_TO_FEET)
  }

  #[test]
  fn test_straight_entry_turns_onto_runway_heading() {
    let pos = Vec2::new(2000.0, ARRIVAL_Y - 40.0 * NAUTICALMILES_TO_FEET);
    let (_, fp) = descent(pos, 20.0);

    let names: Vec<&str> = fp.waypoints().iter().map(|w| w.name.as_str()).collect();
    assert!(names[0].starts_with("straight_turn_"));
    assert!(names.iter().all(|n| n.starts_with("straight_turn_") || n.starts_with("final")));
    assert!(fp.len() > 1);
    let last = fp.waypoints()[fp.len() - 1].pos;
    let before = fp.waypoints()[fp.len() - 2].pos;
    assert!(delta_angle(fp.bearing(before, last), 0.0).abs() < 5.0);
    assert!(last.distance(final_fix()) < 1.0);
  }

  #[test]
  fn test_aligned_straight_entry_flies_to_final_fix() {
    let pos = Vec2::new(0.0, ARRIVAL_Y - 40.0 * NAUTICALMILES_TO_FEET);
    let (_, fp) = descent(pos, 0.2);

    assert!(fp.len() > 1);
    assert!(!fp.waypoints().iter().any(|w| w.contains("straight_turn_")));
    let last = fp.last_waypoint().map_or(Vec2::ZERO, |w| w.pos);
    assert!(last.distance(final_fix()) < 1.0);
    assert!(fp.waypoints().iter().all(|w| w.pos.x.abs() < 1.0));

    let altitude = fp.last_waypoint().map_or(f32::MAX, |w| w.altitude);
    assert!((altitude - APPROACH_ALTITUDE).abs() < 1.0);
    assert!(fp.arrival_time > Duration::ZERO);
  }

  #[test]
  fn test_s_curve_entry() {
    let pos = Vec2::new(-60.0 * NAUTICALMILES_TO_FEET, ARRIVAL_Y - 10.0 * NAUTICALMILES_TO_FEET);
    let (_, fp) = descent(pos, 90.0);

    let names: Vec<&str> = fp.waypoints().iter().map(|w| w.name.as_str()).collect();
    assert!(names.iter().any(|n| n.starts_with("far-initialturn")));
    assert!(names.iter().any(|n| n.starts_with("descent")));
    assert!(names.iter().any(|n| n.starts_with("s-turn")));

    // Joins the extended centerline heading north.
    let last = fp.waypoints()[fp.len() - 1].pos;
    let before = fp.waypoints()[fp.len() - 2].pos;
    assert!(last.x.abs() < 600.0);
    assert!(delta_angle(fp.bearing(before, last), 0.0).abs() < 5.0);
  }

  #[test]
  fn test_downwind_entry() {
    let pos = Vec2::new(-5.0 * NAUTICALMILES_TO_FEET, ARRIVAL_Y + 30.0 * NAUTICALMILES_TO_FEET);
    let (_, fp) = descent(pos, 180.0);

    let names: Vec<&str> = fp.waypoints().iter().map(|w| w.name.as_str()).collect();
    assert!(names.iter().any(|n| n.starts_with("d-far-initialturn")));
    assert!(names.iter().any(|n| n.starts_with("d-s-turn")));
  }

  #[test]
  fn test_descent_loses_altitude() {
    let pos = Vec2::new(-60.0 * NAUTICALMILES_TO_FEET, ARRIVAL_Y - 10.0 * NAUTICALMILES_TO_FEET);
    let (_, fp) = descent(pos, 90.0);

    let last = fp.last_waypoint().map_or(f32::MAX, |w| w.altitude);
    assert!((APPROACH_ALTITUDE..APPROACH_ALTITUDE + 200.0).contains(&last));
    assert!(fp.waypoints().iter().all(|w| w.cross_at.is_some()));
  }

  #[test]
  fn test_descent_requests_slots_in_order() {
    let pos = Vec2::new(2000.0, ARRIVAL_Y - 40.0 * NAUTICALMILES_TO_FEET);
    let (mut fixture, first) = descent(pos, 20.0);

    let mut second = FlightPlan::new(Duration::ZERO, Leg::Descent);
    let result = fixture.create(&mut second, Leg::Descent, pos, 20.0, 12000.0);
    assert_eq!(result, Ok(()));

    assert!(first.arrival_time > Duration::ZERO);
    assert_eq!(
      second.arrival_time,
      first.arrival_time + Duration::from_secs(60)
    );
  }

  #[test]
  fn test_hold_is_two_half_circles() {
    let mut fixture = Fixture::new(false);
    let mut fp = FlightPlan::new(Duration::ZERO, Leg::Hold);
    let pos = Vec2::new(0.0, ARRIVAL_Y - 20.0 * NAUTICALMILES_TO_FEET);
    let result = fixture.create(&mut fp, Leg::Hold, pos, 0.0, 4000.0);
    assert_eq!(result, Ok(()));

    let first = fp.waypoints().iter().filter(|w| w.contains("hold_1_")).count();
    let second = fp.waypoints().iter().filter(|w| w.contains("hold_2_")).count();
    assert_eq!((first, second), (36, 36));
    assert!(fp.waypoints().iter().all(|w| w.altitude == 4000.0));
  }
}

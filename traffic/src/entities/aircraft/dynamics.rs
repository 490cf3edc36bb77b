use std::f32::consts::PI;

use tracing::{trace, warn};

use crate::{
  AI_STUCK_LIMIT, FEET_TO_METERS, KNOT_TO_FEET_PER_SECOND, sign3,
  entities::performance::limit_rate_of_change,
  geometry::{delta_angle, move_point},
};

use super::{Aircraft, DeathReason, control::calc_vertical_speed};

/// Climb or descent rate forced by a resolution advisory, in feet per
/// minute.
const TCAS_VERTICAL_SPEED: f32 = 4000.0;
/// Below this altitude a descend advisory only levels off.
const TCAS_MIN_DESCENT_ALTITUDE: f32 = 1000.0;
const ROTATION_PITCH: f32 = 8.0;

impl Aircraft {
  pub(super) fn update_secondary_targets(&mut self) {
    self.update_bank_target();
    self.update_vertical_speed_target();
    self.update_pitch_target();
  }

  fn update_bank_target(&mut self) {
    if self.heading_lock {
      let max_bank = self.performance.max_bank;
      let turn = delta_angle(self.heading, self.target.heading);
      self.target.roll = turn.clamp(-max_bank, max_bank);

      // Aircraft circling a waypoint they cannot reach slowly bleed speed
      // until the turn closes.
      if self.spin_counter.abs() > 1 && turn.abs() > max_bank {
        self.target.speed *= 0.999;
      }
    }

    if self.no_roll {
      self.target.roll = 0.0;
    }
  }

  fn update_vertical_speed_target(&mut self) {
    if self.on_ground() {
      self.target.vertical_speed = 0.0;
      if let Some(prev) = self
        .flight_plan
        .as_ref()
        .and_then(|fp| fp.previous_waypoint())
      {
        self.altitude = prev.altitude;
      }
      return;
    }

    if self.altitude_lock {
      if self.use_perf_vs {
        let delta = self.target.altitude - self.altitude;
        self.target.vertical_speed = if delta > 0.0 {
          delta.min(self.performance.climb_rate)
        } else {
          delta.max(-self.performance.descent_rate)
        };
      } else {
        let curr = self.flight_plan.as_ref().and_then(|fp| fp.current_waypoint());
        self.target.vertical_speed = match curr {
          Some(curr) => calc_vertical_speed(
            curr.cross_at.unwrap_or(curr.altitude) - self.altitude,
            self.pos.distance(curr.pos) * FEET_TO_METERS,
            self.speed,
          ),
          None => 0.0,
        };
      }
    } else {
      // Pitch mode flies the vertical speed matching the commanded pitch.
      self.target.vertical_speed = if self.target.pitch > 0.0 {
        self.target.pitch / 0.005
      } else {
        self.target.pitch / 0.002
      };
    }

    self.check_tcas();
  }

  fn update_pitch_target(&mut self) {
    if !self.altitude_lock {
      return;
    }

    self.target.pitch = if self.on_ground() {
      if self.speed > self.performance.v_rotate {
        ROTATION_PITCH
      } else {
        0.0
      }
    } else if self.target.vertical_speed > 0.0 {
      self.target.vertical_speed * 0.005
    } else {
      self.target.vertical_speed * 0.002
    };
  }

  /// Overrides the vertical speed target while a resolution advisory is
  /// active.
  pub(super) fn check_tcas(&mut self) {
    let Some(tcas) = self.tcas.filter(|t| t.threat_level == 3) else {
      return;
    };

    if tcas.sense > 0 && self.target.vertical_speed < TCAS_VERTICAL_SPEED {
      self.target.vertical_speed = TCAS_VERTICAL_SPEED;
    } else if tcas.sense < 0 {
      if self.altitude < TCAS_MIN_DESCENT_ALTITUDE {
        self.target.vertical_speed = self.target.vertical_speed.min(0.0);
      } else if self.target.vertical_speed > -TCAS_VERTICAL_SPEED {
        self.target.vertical_speed = -TCAS_VERTICAL_SPEED;
      }
    }
  }

  pub(super) fn update_actual_state(&mut self, dt: f32, active: bool) {
    self.pos = move_point(
      self.pos,
      self.heading,
      self.speed * KNOT_TO_FEET_PER_SECOND * dt,
    );

    self.speed = if self.on_ground() {
      self.performance.actual_speed(
        self.speed,
        self.ground_target_speed,
        dt,
        true,
        self.hold_position,
      )
    } else {
      self.performance.actual_speed(
        self.speed,
        self.target.speed * self.speed_fraction,
        dt,
        false,
        false,
      )
    };

    self.update_heading(dt, active);
    self.roll = self.performance.actual_bank_angle(self.roll, self.target.roll, dt);

    self.altitude += self.vertical_speed / 60.0 * dt;
    self.vertical_speed = self.performance.actual_vertical_speed(
      self.vertical_speed,
      self.target.vertical_speed,
      dt,
    );
    self.pitch = self.performance.actual_pitch(self.pitch, self.target.pitch, dt);
  }

  fn update_heading(&mut self, dt: f32, active: bool) {
    if self.on_ground() {
      self.update_ground_heading(dt, active);
    } else {
      self.update_air_heading(dt);
    }

    while self.heading >= 360.0 {
      self.heading -= 360.0;
      self.spin_counter += 1;
    }
    while self.heading < 0.0 {
      self.heading += 360.0;
      self.spin_counter -= 1;
    }
  }

  /// Steers the nose wheel directly. The turn rate builds up while the
  /// heading error is large and scales with the square root of the speed.
  fn update_ground_heading(&mut self, dt: f32, active: bool) {
    let diff = delta_angle(self.target.heading, self.heading);

    let mut target_speed = self.target.speed * diff.to_radians().cos();
    if target_speed.signum() != self.target.speed.signum()
      && self.target.speed.abs() > 0.0
    {
      if self.speed.abs() < 2.0 && active {
        self.stuck_counter += 1;
        trace!("{}: next point is behind", self.callsign);
        if self.stuck_counter > AI_STUCK_LIMIT {
          warn!("{}: stuck facing away from its route", self.callsign);
          self.set_dead(DeathReason::Stuck);
        }
      }
      // Keeps creeping in the commanded direction while turning around.
      target_speed = 0.21 * self.target.speed.signum();
    }
    self.ground_target_speed = if active { target_speed } else { 0.0 };

    if self.speed != 0.0 {
      let step = (if diff.abs() > 30.0 { 10.0 } else { 3.0 }) * dt;
      if self.heading_change_rate.signum() == diff.signum() {
        self.heading_change_rate = -step * diff.signum();
      } else {
        self.heading_change_rate -= step * diff.signum();
      }

      if diff.abs() > 30.0 && diff < self.heading_error {
        self.heading_change_rate = self.heading_change_rate.clamp(-30.0, 30.0);
      }
    }

    self.heading += self.heading_change_rate * dt * (self.speed.abs() / 15.0).sqrt();
    self.heading_error = diff;
    if diff.abs() < 1.0 {
      self.heading = self.target.heading;
    }
  }

  /// Turns at the rate given by the current bank angle.
  fn update_air_heading(&mut self, dt: f32) {
    let radius = if self.speed.abs() > 1.0 {
      0.088362 * self.speed.powi(2) / self.roll.abs().to_radians().tan()
    } else {
      1.0
    };

    let covered = self.speed * KNOT_TO_FEET_PER_SECOND * dt;
    let turn = covered / (2.0 * PI * radius) * 360.0;
    if turn.is_finite() {
      self.heading += turn * sign3(self.roll);
    }
  }

  /// Moves gear and flaps toward the configuration of the waypoint just
  /// passed. Spoilers, speed brakes and lights switch immediately.
  pub(super) fn update_configuration(&mut self, dt: f32) {
    let Some(prev) = self
      .flight_plan
      .as_ref()
      .and_then(|fp| fp.previous_waypoint())
    else {
      return;
    };

    let gear = if prev.gear_down { 1.0 } else { 0.0 };
    self.gear = limit_rate_of_change(self.gear, gear, self.performance.gear_rate, dt);
    self.flaps =
      limit_rate_of_change(self.flaps, prev.flaps, self.performance.flaps_rate, dt);
    self.spoilers = prev.spoilers;
    self.speed_brakes = prev.speed_brakes;
    self.lights = prev.lights;
  }
}

#[cfg(test)]
mod tests {
  use glam::Vec2;

  use super::*;
  use crate::{
    entities::aircraft::{
      TcasAdvisory,
      tests::{aircraft, ground, taxiing},
    },
    flight_plan::{FlightPlan, Leg, Waypoint},
  };

  mod tcas {
    use super::*;

    fn advised(sense: i8, altitude: f32, vs: f32) -> f32 {
      let mut aircraft = aircraft();
      aircraft.altitude = altitude;
      aircraft.target.vertical_speed = vs;
      aircraft.tcas = Some(TcasAdvisory {
        threat_level: 3,
        sense,
      });
      aircraft.check_tcas();
      aircraft.target.vertical_speed
    }

    #[test]
    fn test_climb_advisory() {
      assert_eq!(advised(1, 5000.0, -500.0), 4000.0);
      assert_eq!(advised(1, 5000.0, 4500.0), 4500.0);
    }

    #[test]
    fn test_descend_advisory() {
      assert_eq!(advised(-1, 5000.0, 1000.0), -4000.0);
      assert_eq!(advised(-1, 5000.0, -5000.0), -5000.0);
    }

    #[test]
    fn test_descend_advisory_levels_off_when_low() {
      assert_eq!(advised(-1, 800.0, 1000.0), 0.0);
      assert_eq!(advised(-1, 800.0, -300.0), -300.0);
    }

    #[test]
    fn test_lower_threats_ignored() {
      let mut aircraft = aircraft();
      aircraft.target.vertical_speed = 200.0;
      aircraft.tcas = Some(TcasAdvisory {
        threat_level: 2,
        sense: 1,
      });
      aircraft.check_tcas();
      assert_eq!(aircraft.target.vertical_speed, 200.0);
    }
  }

  mod targets {
    use super::*;

    #[test]
    fn test_bank_toward_target_heading() {
      let mut aircraft = aircraft();
      aircraft.no_roll = false;
      aircraft.heading = 350.0;
      aircraft.target.heading = 10.0;
      aircraft.update_secondary_targets();
      assert!((aircraft.target.roll - 20.0).abs() < 0.01);

      aircraft.target.heading = 200.0;
      aircraft.update_secondary_targets();
      assert_eq!(aircraft.target.roll, -aircraft.performance.max_bank);
    }

    #[test]
    fn test_no_roll_on_ground() {
      let mut aircraft = aircraft();
      aircraft.heading = 0.0;
      aircraft.target.heading = 90.0;
      aircraft.update_secondary_targets();
      assert_eq!(aircraft.target.roll, 0.0);
    }

    #[test]
    fn test_perf_climb_rate_caps_vertical_speed() {
      let mut aircraft = aircraft();
      aircraft.no_roll = false;
      aircraft.altitude = 5000.0;
      aircraft.target.altitude = 15000.0;
      aircraft.update_secondary_targets();

      assert_eq!(aircraft.target.vertical_speed, aircraft.performance.climb_rate);
      assert!((aircraft.target.pitch - aircraft.performance.climb_rate * 0.005).abs() < 0.001);
    }

    #[test]
    fn test_rotation_pitch() {
      let mut aircraft = aircraft();
      aircraft.speed = aircraft.performance.v_rotate + 1.0;
      aircraft.update_secondary_targets();
      assert_eq!(aircraft.target.pitch, ROTATION_PITCH);
    }

    #[test]
    fn test_ground_altitude_follows_waypoint() {
      let mut aircraft = taxiing(
        Leg::TaxiOut,
        vec![ground("a", 0.0, 0.0, 15.0), ground("b", 0.0, 500.0, 15.0)],
      );
      aircraft.altitude = 130.0;
      aircraft.update_secondary_targets();

      assert_eq!(aircraft.altitude, 100.0);
      assert_eq!(aircraft.target.vertical_speed, 0.0);
    }
  }

  mod heading {
    use super::*;

    #[test]
    fn test_ground_turn_snaps_when_close() {
      let mut aircraft = aircraft();
      aircraft.heading = 90.5;
      aircraft.target.heading = 90.0;
      aircraft.speed = 10.0;
      aircraft.update_heading(0.1, true);
      assert_eq!(aircraft.heading, 90.0);
    }

    #[test]
    fn test_ground_turn_converges() {
      let mut aircraft = aircraft();
      aircraft.heading = 0.0;
      aircraft.target.heading = 60.0;
      aircraft.target.speed = 15.0;
      aircraft.speed = 15.0;

      for _ in 0..600 {
        aircraft.update_heading(0.1, true);
      }
      assert!(delta_angle(aircraft.heading, 60.0).abs() < 1.0);
    }

    #[test]
    fn test_point_behind_creeps() {
      let mut aircraft = aircraft();
      aircraft.heading = 0.0;
      aircraft.target.heading = 180.0;
      aircraft.target.speed = 15.0;
      aircraft.update_heading(0.1, true);

      assert_eq!(aircraft.ground_target_speed(), 0.21);
      assert_eq!(aircraft.stuck_counter, 1);
    }

    #[test]
    fn test_inactive_has_no_ground_speed() {
      let mut aircraft = aircraft();
      aircraft.target.speed = 15.0;
      aircraft.update_heading(0.1, false);
      assert_eq!(aircraft.ground_target_speed(), 0.0);
    }

    #[test]
    fn test_air_turn_follows_bank() {
      let mut aircraft = aircraft();
      aircraft.no_roll = false;
      aircraft.heading = 359.0;
      aircraft.speed = 250.0;
      aircraft.roll = 25.0;
      aircraft.update_heading(1.0, true);

      assert!(aircraft.heading > 0.0 && aircraft.heading < 5.0);
      assert_eq!(aircraft.spin_counter, 1);
    }

    #[test]
    fn test_wings_level_keeps_heading() {
      let mut aircraft = aircraft();
      aircraft.no_roll = false;
      aircraft.heading = 45.0;
      aircraft.speed = 250.0;
      aircraft.update_heading(1.0, true);
      assert_eq!(aircraft.heading, 45.0);
    }
  }

  mod state {
    use super::*;

    #[test]
    fn test_moves_along_heading() {
      let mut aircraft = aircraft();
      aircraft.no_roll = false;
      aircraft.heading = 90.0;
      aircraft.speed = 100.0;
      aircraft.target.speed = 100.0;
      aircraft.update_actual_state(1.0, true);

      assert!((aircraft.pos.x - 100.0 * KNOT_TO_FEET_PER_SECOND).abs() < 0.01);
      assert!(aircraft.pos.y.abs() < 0.01);
    }

    #[test]
    fn test_configuration_is_rate_limited() {
      let mut fp = FlightPlan::new(Default::default(), Leg::Climb);
      fp.push_waypoint(
        Waypoint::in_air("a", Vec2::ZERO, 3000.0, 200.0)
          .with_gear(false)
          .with_flaps(0.0),
      );
      fp.push_waypoint(Waypoint::in_air("b", Vec2::new(0.0, 9000.0), 5000.0, 250.0));
      fp.increment_waypoint(false);

      let mut aircraft = aircraft().with_flight_plan(fp);
      aircraft.gear = 1.0;
      aircraft.flaps = 0.5;
      aircraft.update_configuration(1.0);

      let perf = &aircraft.performance;
      assert!((aircraft.gear - (1.0 - perf.gear_rate)).abs() < 0.001);
      assert!((aircraft.flaps - (0.5 - perf.flaps_rate)).abs() < 0.001);
      assert_eq!(aircraft.lights, crate::flight_plan::Lights::Approach);
    }
  }
}

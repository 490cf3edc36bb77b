use serde::{Deserialize, Serialize};

/// Read-only performance profile of an aircraft type.
///
/// Speeds are in knots, accelerations in knots per second, climb and descent
/// rates in feet per minute and angular rates in degrees per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
  pub acceleration: f32,
  pub deceleration: f32,
  pub climb_rate: f32,
  pub descent_rate: f32,

  pub v_rotate: f32,
  pub v_takeoff: f32,
  pub v_climb: f32,
  pub v_cruise: f32,
  pub v_descent: f32,
  pub v_approach: f32,
  pub v_touchdown: f32,
  pub v_taxi: f32,

  #[serde(default = "default_max_bank")]
  pub max_bank: f32,
  #[serde(default = "default_roll_rate")]
  pub roll_rate: f32,
  #[serde(default = "default_pitch_rate")]
  pub pitch_rate: f32,
  /// Feet per minute per second.
  #[serde(default = "default_vs_rate")]
  pub vs_rate: f32,
  /// Fraction of full travel per second.
  #[serde(default = "default_gear_rate")]
  pub gear_rate: f32,
  #[serde(default = "default_flaps_rate")]
  pub flaps_rate: f32,
}

fn default_max_bank() -> f32 {
  25.0
}

fn default_roll_rate() -> f32 {
  9.0
}

fn default_pitch_rate() -> f32 {
  2.0
}

fn default_vs_rate() -> f32 {
  500.0
}

fn default_gear_rate() -> f32 {
  0.1
}

fn default_flaps_rate() -> f32 {
  0.05
}

impl Default for Performance {
  fn default() -> Self {
    Self::jet_transport()
  }
}

impl Performance {
  #[allow(clippy::too_many_arguments)]
  fn preset(
    acceleration: f32,
    deceleration: f32,
    climb_rate: f32,
    descent_rate: f32,
    v_rotate: f32,
    v_takeoff: f32,
    v_climb: f32,
    v_cruise: f32,
    v_descent: f32,
    v_approach: f32,
    v_touchdown: f32,
    v_taxi: f32,
  ) -> Self {
    Self {
      acceleration,
      deceleration,
      climb_rate,
      descent_rate,
      v_rotate,
      v_takeoff,
      v_climb,
      v_cruise,
      v_descent,
      v_approach,
      v_touchdown,
      v_taxi,
      max_bank: default_max_bank(),
      roll_rate: default_roll_rate(),
      pitch_rate: default_pitch_rate(),
      vs_rate: default_vs_rate(),
      gear_rate: default_gear_rate(),
      flaps_rate: default_flaps_rate(),
    }
  }

  pub fn jet_transport() -> Self {
    Self::preset(
      5.0, 7.0, 3000.0, 1500.0, 150.0, 160.0, 300.0, 430.0, 300.0, 170.0,
      150.0, 15.0,
    )
  }

  pub fn turboprop() -> Self {
    Self::preset(
      4.0, 10.0, 1800.0, 1800.0, 130.0, 150.0, 200.0, 300.0, 200.0, 130.0,
      130.0, 15.0,
    )
  }

  pub fn light() -> Self {
    Self::preset(
      2.0, 3.0, 450.0, 1000.0, 70.0, 70.0, 80.0, 100.0, 80.0, 70.0, 60.0, 15.0,
    )
    .with_max_bank(30.0)
  }

  pub fn for_category(category: &str) -> Self {
    match category {
      "light" | "ga" | "ul" => Self::light(),
      "turboprop" | "tp" => Self::turboprop(),
      "jet" | "jet_transport" | "heavy" => Self::jet_transport(),
      other => {
        tracing::debug!("unknown performance category {other:?}, using jet");
        Self::jet_transport()
      }
    }
  }

  pub fn with_max_bank(mut self, max_bank: f32) -> Self {
    self.max_bank = max_bank;
    self
  }

  /// Converges `current` toward `target`. Braking on the ground is stronger,
  /// and stronger still while holding position.
  pub fn actual_speed(
    &self,
    current: f32,
    target: f32,
    dt: f32,
    on_ground: bool,
    hold_position: bool,
  ) -> f32 {
    if target > current {
      (current + self.acceleration * dt).min(target)
    } else if target < current {
      let rate = match (on_ground, hold_position) {
        (true, true) => self.deceleration_on_ground() * 1.5,
        (true, false) => self.deceleration_on_ground(),
        (false, _) => self.deceleration,
      };
      (current - rate * dt).max(target)
    } else {
      current
    }
  }

  pub fn actual_bank_angle(&self, current: f32, target: f32, dt: f32) -> f32 {
    let target = target.clamp(-self.max_bank, self.max_bank);
    limit_rate_of_change(current, target, self.roll_rate, dt)
  }

  pub fn actual_vertical_speed(
    &self,
    current: f32,
    target: f32,
    dt: f32,
  ) -> f32 {
    limit_rate_of_change(current, target, self.vs_rate, dt)
  }

  pub fn actual_pitch(&self, current: f32, target: f32, dt: f32) -> f32 {
    limit_rate_of_change(current, target, self.pitch_rate, dt)
  }

  pub fn deceleration_on_ground(&self) -> f32 {
    self.deceleration * 2.0
  }

  pub fn v_taxi_reduced(&self) -> f32 {
    self.v_taxi * 2.0 / 3.0
  }
}

/// Moves `current` toward `target` by at most `rate * dt`.
pub fn limit_rate_of_change(current: f32, target: f32, rate: f32, dt: f32) -> f32 {
  let max_step = (rate * dt).abs();
  current + (target - current).clamp(-max_step, max_step)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_actual_speed_converges_without_overshoot() {
    let perf = Performance::jet_transport();

    assert_eq!(perf.actual_speed(0.0, 2.0, 1.0, true, false), 2.0);
    assert_eq!(perf.actual_speed(0.0, 20.0, 1.0, true, false), 5.0);
    assert_eq!(perf.actual_speed(20.0, 0.0, 1.0, false, false), 13.0);
    assert_eq!(perf.actual_speed(20.0, 0.0, 1.0, true, false), 6.0);
    assert_eq!(perf.actual_speed(20.0, 0.0, 1.0, true, true), 0.0);
  }

  #[test]
  fn test_actual_speed_reversing() {
    let perf = Performance::jet_transport();
    assert_eq!(perf.actual_speed(0.0, -7.5, 1.0, true, false), -7.5);
  }

  #[test]
  fn test_bank_is_limited() {
    let perf = Performance::jet_transport();
    let mut bank = 0.0;
    for _ in 0..100 {
      bank = perf.actual_bank_angle(bank, 60.0, 0.5);
    }

    assert_eq!(bank, perf.max_bank);
  }

  #[test]
  fn test_limit_rate_of_change() {
    assert_eq!(limit_rate_of_change(0.0, 10.0, 2.0, 1.0), 2.0);
    assert_eq!(limit_rate_of_change(0.0, -10.0, 2.0, 1.0), -2.0);
    assert_eq!(limit_rate_of_change(9.5, 10.0, 2.0, 1.0), 10.0);
  }

  #[test]
  fn test_for_category() {
    assert_eq!(Performance::for_category("ga"), Performance::light());
    assert_eq!(Performance::for_category("tp"), Performance::turboprop());
    assert_eq!(Performance::for_category("???"), Performance::jet_transport());
  }
}

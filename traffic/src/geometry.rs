use std::f32::consts::PI;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::KNOT_TO_FEET_PER_SECOND;

pub fn normalize_angle(angle: f32) -> f32 {
  let angle = angle.rem_euclid(360.0);
  // rem_euclid can round up to exactly 360.0 for tiny negative inputs
  if angle >= 360.0 { 0.0 } else { angle }
}

pub trait Translate {
  fn translate(&mut self, offset: Vec2);
}

pub fn move_point(point: Vec2, degrees: f32, length: f32) -> Vec2 {
  let radians = degrees.to_radians();

  let x = length * radians.sin();
  let y = length * radians.cos();

  point + Vec2::new(x, y)
}

pub fn add_degrees(degrees: f32, add: f32) -> f32 {
  normalize_angle(degrees + add)
}

pub fn subtract_degrees(degrees: f32, subtract: f32) -> f32 {
  normalize_angle(degrees - subtract)
}

pub fn inverse_degrees(degrees: f32) -> f32 {
  add_degrees(degrees, 180.0)
}

/// Signed shortest turn from `current` to `target`, in -180..180.
pub fn delta_angle(current: f32, target: f32) -> f32 {
  (target - current + 540.0).rem_euclid(360.0) - 180.0
}

/// Signed difference `b - a` between two bearings, in -180..180.
pub fn bearing_difference(a: f32, b: f32) -> f32 {
  delta_angle(a, b)
}

pub fn angle_between_points(a: Vec2, b: Vec2) -> f32 {
  let dx = b.x - a.x;
  let dy = b.y - a.y;
  let angle = dx.atan2(dy).to_degrees();
  if angle < 0.0 { angle + 360.0 } else { angle }
}

/// Turn radius in feet for a given speed in knots.
///
/// In the air this assumes a 25 degree bank. On the ground it assumes a
/// constant 30 degrees per second turn rate.
pub fn turn_radius(speed: f32, in_air: bool) -> f32 {
  if in_air {
    0.1911 * speed * speed
  } else {
    (360.0 / 30.0) * (speed * KNOT_TO_FEET_PER_SECOND).abs() / (2.0 * PI)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Circle {
  pub center: Vec2,
  pub radius: f32,
}

impl Circle {
  pub fn new(center: Vec2, radius: f32) -> Self {
    Self { center, radius }
  }
}

/// A pair of tangent headings between two circles.
///
/// `degenerate` is set when the circles are too close for the requested
/// tangents to exist; the headings are then a near-tangent approximation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tangents {
  pub headings: [f32; 2],
  pub degenerate: bool,
}

fn inner_tangent_offset(a: &Circle, b: &Circle) -> (f32, f32, bool) {
  let distance = a.center.distance(b.center);
  let radii = a.radius + b.radius;
  let degenerate = distance <= radii;
  if degenerate {
    tracing::warn!(
      "inner tangents requested for circles {distance} ft apart with combined radius {radii} ft"
    );
  }

  let ratio = if distance > 0.0 {
    (radii / distance).clamp(-1.0, 1.0)
  } else {
    1.0
  };
  let angle = ratio.asin().to_degrees();
  // Measured from the smaller circle's side when `a` is the larger one.
  let course = if a.radius > b.radius {
    angle_between_points(b.center, a.center)
  } else {
    angle_between_points(a.center, b.center)
  };

  (course, angle, degenerate)
}

/// Headings of the two tangent lines that cross between `a` and `b`.
pub fn inner_tangents_angle(a: &Circle, b: &Circle) -> Tangents {
  let (course, angle, degenerate) = inner_tangent_offset(a, b);

  Tangents {
    headings: [
      normalize_angle(course - angle),
      normalize_angle(course + angle),
    ],
    degenerate,
  }
}

/// Touch points on `a` and `b` of the first inner tangent
/// (`inner_tangents_angle(a, b).headings[0]`).
pub fn inner_tangent_points(a: &Circle, b: &Circle) -> (Vec2, Vec2) {
  let (course, angle, _) = inner_tangent_offset(a, b);
  let heading = course - angle;

  (
    move_point(a.center, heading + 90.0, a.radius),
    move_point(b.center, heading - 90.0, b.radius),
  )
}

/// Point where a line on `heading` touches `circle`. `side` is `1.0` for a
/// circle on the right of the line and `-1.0` for one on the left.
pub fn tangent_point(circle: &Circle, heading: f32, side: f32) -> Vec2 {
  move_point(circle.center, heading - 90.0 * side, circle.radius)
}

/// Length of the crossing tangent segment between the two touch points.
pub fn inner_tangents_length(a: &Circle, b: &Circle) -> f32 {
  let (p1, p2) = inner_tangent_points(a, b);
  p1.distance(p2)
}

/// Headings of the two tangent lines that do not cross between `a` and `b`.
/// Well defined for overlapping circles.
pub fn outer_tangents_angle(a: &Circle, b: &Circle) -> [f32; 2] {
  let distance = a.center.distance(b.center);
  let beta = (a.radius - b.radius).abs().atan2(distance).to_degrees();
  let gamma = angle_between_points(a.center, b.center);

  [normalize_angle(gamma - beta), normalize_angle(gamma + beta)]
}

pub fn outer_tangents_length(a: &Circle, b: &Circle) -> f32 {
  let distance = a.center.distance(b.center);
  let delta = a.radius - b.radius;
  (distance * distance - delta * delta).max(0.0).sqrt()
}

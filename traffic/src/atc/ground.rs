use std::time::Duration;

use internment::Intern;
use tracing::{debug, warn};
use turborand::rng::Rng;

use crate::geometry::{angle_between_points, delta_angle};

use super::{Controller, ControllerCore, Direction, MessageKind, TrafficRecord};

/// Followers closer than this (in feet) match the speed of the aircraft
/// ahead.
pub const FOLLOW_DISTANCE_FT: f32 = 400.0;
/// Followers closer than this (in feet) stop.
pub const HOLD_DISTANCE_FT: f32 = 200.0;

/// Keeps taxiing aircraft apart on the ground network.
#[derive(Debug, Clone)]
pub struct GroundController {
  core: ControllerCore,
}

/// Closest aircraft in front of `me` that shares its route.
fn closest_ahead<'a>(
  me: &TrafficRecord,
  traffic: &'a [TrafficRecord],
) -> Option<(f32, &'a TrafficRecord)> {
  traffic
    .iter()
    .filter(|other| me.check_position_and_intentions(other))
    .filter(|other| {
      let bearing = angle_between_points(me.pos, other.pos);
      delta_angle(me.heading, bearing).abs() <= 90.0
    })
    .map(|other| (me.pos.distance(other.pos), other))
    .min_by(|a, b| a.0.total_cmp(&b.0))
}

impl GroundController {
  pub fn new(core: ControllerCore) -> Self {
    Self { core }
  }

  fn separate(&mut self, now: Duration) {
    let snapshot = self.core.records.clone();
    let mut calls = Vec::new();

    for (record, me) in self.core.records.iter_mut().zip(snapshot.iter()) {
      let was_holding = record.instruction.hold_position;

      match closest_ahead(me, &snapshot) {
        Some((distance, other)) if distance < HOLD_DISTANCE_FT => {
          record.set_hold_position(true);
          record.clear_speed_adjustment();
          record.waits_for = Some(other.id);
        }
        Some((distance, other)) if distance < FOLLOW_DISTANCE_FT => {
          record.set_hold_position(false);
          record.set_speed_adjustment(other.speed.max(0.0));
          record.waits_for = None;
        }
        _ => {
          record.set_hold_position(false);
          record.clear_speed_adjustment();
          record.waits_for = None;
        }
      }

      match (was_holding, record.instruction.hold_position) {
        (false, true) => calls.push((record.id, MessageKind::HoldPosition)),
        (true, false) => calls.push((record.id, MessageKind::ResumeTaxi)),
        _ => {}
      }
    }

    for (id, kind) in calls {
      self.core.transmit(id, kind, Direction::GroundToAir, now);
    }
  }

  /// Follows `waits_for` from `start`; returns true when the chain comes
  /// back to it.
  fn waits_on_itself(&self, start: Intern<String>) -> bool {
    let mut current = start;
    for _ in 0..self.core.records.len() {
      let Some(next) = self.core.record(current).and_then(|r| r.waits_for) else {
        return false;
      };
      if next == start {
        return true;
      }
      current = next;
    }

    false
  }

  /// Marks the first aircraft found in a circular wait so it can be taken
  /// out, and breaks the cycle.
  fn resolve_circular_waits(&mut self) {
    let looping = self
      .core
      .records
      .iter()
      .map(|r| r.id)
      .find(|id| self.waits_on_itself(*id));

    if let Some(id) = looping {
      warn!("{id} is part of a circular wait on the ground");
      if let Some(record) = self.core.record_mut(id) {
        record.instruction.resolve_circular_wait = true;
        record.waits_for = None;
      }
    }
  }
}

impl Controller for GroundController {
  fn core(&self) -> &ControllerCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut ControllerCore {
    &mut self.core
  }

  fn update(&mut self, now: Duration, _rng: &mut Rng) {
    if self.core.records.is_empty() {
      return;
    }

    self.separate(now);
    self.resolve_circular_waits();
    debug!("{}: {} aircraft taxiing", self.core.name(), self.core.records.len());
  }
}

#[cfg(test)]
mod tests {
  use glam::Vec2;
  use petgraph::graph::NodeIndex;
  use turborand::SeededCore;

  use super::*;
  use crate::atc::{
    ControllerKind, PositionReport,
    tests::{controller_core, report},
  };

  fn taxiing(id: &str, pos: Vec2, heading: f32, node: usize, route: &[usize]) -> PositionReport {
    PositionReport {
      pos,
      heading,
      speed: 15.0,
      node: Some(NodeIndex::new(node)),
      intentions: route.iter().copied().map(NodeIndex::new).collect(),
      ..report(id)
    }
  }

  fn controller(reports: Vec<PositionReport>) -> GroundController {
    let mut ground = GroundController::new(controller_core(ControllerKind::Ground));
    for report in reports {
      ground.announce(report, Duration::ZERO);
    }
    ground
  }

  fn tick(ground: &mut GroundController) {
    let mut rng = Rng::with_seed(1);
    ground.update(Duration::from_secs(1), &mut rng);
  }

  #[test]
  fn test_follower_matches_speed() {
    let mut ground = controller(vec![
      taxiing("LEAD", Vec2::new(0.0, 300.0), 0.0, 2, &[3]),
      taxiing("FOLLOW", Vec2::ZERO, 0.0, 1, &[2, 3]),
    ]);
    tick(&mut ground);

    let follow = ground.core().instruction(Intern::from_ref("FOLLOW"));
    assert_eq!(follow.change_speed, Some(15.0));
    assert!(!follow.hold_position);

    let lead = ground.core().instruction(Intern::from_ref("LEAD"));
    assert!(!lead.has_instruction());
  }

  #[test]
  fn test_close_follower_holds() {
    let mut ground = controller(vec![
      taxiing("LEAD", Vec2::new(0.0, 150.0), 0.0, 2, &[3]),
      taxiing("FOLLOW", Vec2::ZERO, 0.0, 1, &[2, 3]),
    ]);
    tick(&mut ground);

    let id = Intern::from_ref("FOLLOW");
    assert!(ground.core().instruction(id).hold_position);
    assert_eq!(
      ground.core().record(id).and_then(|r| r.waits_for),
      Some(Intern::from_ref("LEAD"))
    );
    assert_eq!(ground.core().messages().len(), 1);
  }

  #[test]
  fn test_traffic_behind_is_ignored() {
    let mut ground = controller(vec![
      taxiing("LEAD", Vec2::new(0.0, -150.0), 0.0, 2, &[3]),
      taxiing("FOLLOW", Vec2::ZERO, 0.0, 1, &[2, 3]),
    ]);
    tick(&mut ground);

    assert!(!ground.core().has_instruction(Intern::from_ref("FOLLOW")));
  }

  #[test]
  fn test_circular_wait_is_flagged_once() {
    let mut ground = controller(vec![
      taxiing("A", Vec2::ZERO, 90.0, 1, &[2]),
      taxiing("B", Vec2::new(100.0, 0.0), 270.0, 2, &[1]),
    ]);
    tick(&mut ground);

    let flagged: Vec<_> = ground
      .core()
      .records()
      .iter()
      .filter(|r| r.instruction.resolve_circular_wait)
      .map(|r| r.id)
      .collect();
    assert_eq!(flagged, vec![Intern::from_ref("A")]);
  }
}

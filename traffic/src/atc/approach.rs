use std::time::Duration;

use internment::Intern;
use tracing::{debug, trace};
use turborand::rng::Rng;

use crate::seconds_between;

use super::{ActiveRunway, Controller, ControllerCore, PositionReport};

/// Meters arrivals to their runway slot by adjusting their descent speed.
#[derive(Debug, Clone)]
pub struct ApproachController {
  core: ControllerCore,
  runways: Vec<ActiveRunway>,
}

/// Speed factor on the descent speed for an aircraft `time_diff` seconds
/// late (positive) or early (negative).
pub fn speed_factor(time_diff: f32) -> Option<f32> {
  if time_diff > 15.0 {
    Some(1.35)
  } else if time_diff > 5.0 {
    Some(1.2)
  } else if time_diff < -15.0 {
    Some(0.65)
  } else if time_diff < -5.0 {
    Some(0.8)
  } else {
    None
  }
}

impl ApproachController {
  pub fn new(core: ControllerCore) -> Self {
    Self {
      core,
      runways: Vec::new(),
    }
  }

  pub fn runways(&self) -> &[ActiveRunway] {
    &self.runways
  }

  pub fn runway_mut(&mut self, id: Intern<String>) -> &mut ActiveRunway {
    match self.runways.iter().position(|r| r.id == id) {
      Some(i) => &mut self.runways[i],
      None => {
        debug!("{}: activating runway {id}", self.core.name());
        self.runways.push(ActiveRunway::new(id));
        let last = self.runways.len() - 1;
        &mut self.runways[last]
      }
    }
  }
}

impl Controller for ApproachController {
  fn core(&self) -> &ControllerCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut ControllerCore {
    &mut self.core
  }

  fn announce(&mut self, report: PositionReport, now: Duration) {
    let id = report.id;
    let runway = report.runway;
    let eta = report.eta_to_checkpoint;
    self.core.announce_position(report);

    let needs_slot = self
      .core
      .record(id)
      .is_some_and(|r| r.runway_slot.is_none());
    let slot = match (needs_slot, runway, eta) {
      (true, Some(runway), Some(eta)) => Some(
        self
          .runway_mut(runway)
          .request_time_slot(now + Duration::from_secs_f32(eta.max(0.0)), now),
      ),
      _ => None,
    };

    if let Some(record) = self.core.record_mut(id) {
      record.runway_slot = record.runway_slot.or(slot);
      record.instruction.runway_slot = record.runway_slot;
    }
  }

  fn update(&mut self, now: Duration, _rng: &mut Rng) {
    for record in self.core.records.iter_mut() {
      record.instruction.runway_slot = record.runway_slot;

      let time_diff = match (record.eta_to_checkpoint, record.runway_slot) {
        (Some(eta), Some(slot)) => eta - seconds_between(slot, now),
        _ => {
          record.clear_speed_adjustment();
          continue;
        }
      };

      match speed_factor(time_diff) {
        Some(factor) => {
          trace!("{}: {time_diff:.0} s off its slot", record.id);
          record.set_speed_adjustment(record.descent_speed * factor);
        }
        None => record.clear_speed_adjustment(),
      }
    }
  }
}

use std::time::Duration;

use internment::Intern;
use tracing::{debug, info};
use turborand::rng::Rng;

use crate::Result;

use super::{
  ActiveRunway, Controller, ControllerCore, Direction, MessageKind,
  PositionReport, TakeoffStatus, TrafficRecord,
};

/// Conversation state of an aircraft once it has been cleared.
const CLEARED_STATE: u32 = 10;

/// Sequences departures: one aircraft per runway is cleared at a time, in
/// the order they reached the holding point.
#[derive(Debug, Clone)]
pub struct TowerController {
  core: ControllerCore,
  runways: Vec<ActiveRunway>,
}

impl TowerController {
  pub fn new(core: ControllerCore) -> Self {
    Self {
      core,
      runways: Vec::new(),
    }
  }

  pub fn runways(&self) -> &[ActiveRunway] {
    &self.runways
  }

  pub fn runway(&self, id: Intern<String>) -> Option<&ActiveRunway> {
    self.runways.iter().find(|r| r.id == id)
  }

  fn runway_mut(&mut self, id: Intern<String>) -> &mut ActiveRunway {
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

  /// Registers an aircraft at the holding point and queues it for takeoff.
  pub fn schedule_departure(&mut self, report: PositionReport, now: Duration) {
    let id = report.id;
    self.announce(report, now);

    if let Some(record) = self.core.record_mut(id) {
      if record.takeoff_status == TakeoffStatus::None {
        record.takeoff_status = TakeoffStatus::Queued;
      }
    }
  }

  /// Drops queue entries whose records are gone.
  fn forget_missing(&mut self) {
    let core = &self.core;
    for runway in self.runways.iter_mut() {
      runway
        .departure_queue
        .retain(|id| core.record(*id).is_some());
      if runway.cleared.is_some_and(|id| core.record(id).is_none()) {
        runway.cleared = None;
      }
    }
  }

  fn clear_next(&mut self, now: Duration) {
    let mut cleared = Vec::new();
    for runway in self.runways.iter_mut() {
      if runway.cleared.is_some() {
        continue;
      }
      let Some(head) = runway.first_in_departure_queue() else {
        continue;
      };

      if let Some(record) = self.core.record_mut(head) {
        if record.takeoff_status != TakeoffStatus::ClearedForTakeoff {
          record.takeoff_status = TakeoffStatus::ClearedForTakeoff;
          record.advance_state_to(CLEARED_STATE);
          cleared.push(head);
        }
        runway.cleared = Some(head);
      }
    }

    for id in cleared {
      info!("{id} cleared for takeoff");
      self.core.transmit(
        id,
        MessageKind::ClearedForTakeoff,
        Direction::GroundToAir,
        now,
      );
    }
  }

  /// Everyone in a departure queue holds except the aircraft cleared on
  /// its runway.
  fn update_holds(&mut self) {
    for record in self.core.records.iter_mut() {
      let runway = record
        .runway
        .and_then(|id| self.runways.iter().find(|r| r.id == id));
      let hold = match runway {
        Some(runway) if runway.departure_queue.contains(&record.id) => {
          runway.cleared != Some(record.id)
        }
        _ => false,
      };
      record.set_hold_position(hold);
    }
  }
}

impl Controller for TowerController {
  fn core(&self) -> &ControllerCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut ControllerCore {
    &mut self.core
  }

  fn announce(&mut self, report: PositionReport, now: Duration) {
    let id = report.id;
    let runway = report.runway;
    let new = self.core.announce_position(report);

    let Some(runway_id) = runway else {
      return;
    };
    let runway = self.runway_mut(runway_id);
    runway.add_to_departure_queue(id);
    if new {
      let slot = runway.request_time_slot(now, now);
      if let Some(record) = self.core.record_mut(id) {
        record.runway_slot = Some(slot);
      }
    }
  }

  fn sign_off(&mut self, id: Intern<String>) -> Result<TrafficRecord> {
    let mut record = self.core.sign_off(id)?;

    for runway in self.runways.iter_mut() {
      runway.remove_from_departure_queue(id);
      if runway.cleared == Some(id) {
        runway.cleared = None;
      }
    }
    record.takeoff_status = TakeoffStatus::None;

    Ok(record)
  }

  fn update(&mut self, now: Duration, _rng: &mut Rng) {
    self.forget_missing();
    self.clear_next(now);
    self.update_holds();
  }
}

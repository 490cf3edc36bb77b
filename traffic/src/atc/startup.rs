use std::time::Duration;

use tracing::trace;
use turborand::rng::Rng;

use super::{
  Controller, ControllerCore, Direction, MessageKind, PositionReport,
  transponder_code,
};

use Direction::{AirToGround, GroundToAir};

/// Calls of the start-up conversation, by state: seconds after the
/// scheduled departure, message and who is talking.
const SEQUENCE: [(u64, MessageKind, Direction); 8] = [
  (0, MessageKind::AnnounceEngineStart, AirToGround),
  (60, MessageKind::RequestEngineStart, AirToGround),
  (80, MessageKind::PermitEngineStart, GroundToAir),
  (100, MessageKind::AcknowledgeEngineStart, AirToGround),
  (130, MessageKind::AcknowledgeSwitchGroundFrequency, AirToGround),
  (140, MessageKind::InitiateContact, AirToGround),
  (150, MessageKind::AcknowledgeInitiateContact, GroundToAir),
  (180, MessageKind::RequestPushbackClearance, AirToGround),
];

const PUSHBACK_DECISION: Duration = Duration::from_secs(200);

/// Talks parked aircraft through engine start and releases them for
/// push-back.
#[derive(Debug, Clone)]
pub struct StartupController {
  core: ControllerCore,
}

impl StartupController {
  pub fn new(core: ControllerCore) -> Self {
    Self { core }
  }

  fn update_record(&mut self, index: usize, now: Duration, rng: &mut Rng) {
    let record = &self.core.records[index];
    let (id, state, start) = (record.id, record.state(), record.departure_time);
    let available = self.core.is_available();

    match state {
      0..=7 => {
        let (offset, kind, direction) = SEQUENCE[state as usize];
        if !available || now <= start + Duration::from_secs(offset) {
          return;
        }

        if kind == MessageKind::PermitEngineStart {
          let record = &mut self.core.records[index];
          record.transponder = Some(transponder_code(record.flight_rules, rng));
        }
        self.core.transmit(id, kind, direction, now);
        self.core.records[index].next_state();
        self.core.mark_transmitted(now);
      }
      8 => {
        if !available || now <= start + PUSHBACK_DECISION {
          return;
        }

        let record = &self.core.records[index];
        if record.allow_pushback {
          self.core.records[index].allow_transmission = true;
          self.core.transmit(
            id,
            MessageKind::PermitPushbackClearance,
            GroundToAir,
            now,
          );
          self.core.records[index].next_state();
        } else {
          if record.allow_transmission {
            self.core.transmit(
              id,
              MessageKind::HoldPushbackClearance,
              GroundToAir,
              now,
            );
          }
          self.core.records[index].allow_transmission = false;
          trace!("{id}: push-back held");
        }
        self.core.mark_transmitted(now);
      }
      _ => {
        if available {
          self.core.records[index].set_hold_position(false);
        }
      }
    }
  }
}

impl Controller for StartupController {
  fn core(&self) -> &ControllerCore {
    &self.core
  }

  fn core_mut(&mut self) -> &mut ControllerCore {
    &mut self.core
  }

  fn announce(&mut self, report: PositionReport, _now: Duration) {
    let id = report.id;
    if self.core.announce_position(report) {
      if let Some(record) = self.core.record_mut(id) {
        record.set_hold_position(true);
      }
    }
  }

  fn update(&mut self, now: Duration, rng: &mut Rng) {
    if !self.core.is_available() {
      self.core.refresh_availability(now, rng);
    }

    for index in 0..self.core.records.len() {
      self.update_record(index, now, rng);
    }
  }
}

use std::{collections::VecDeque, time::Duration};

use internment::Intern;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::NAUTICALMILES_TO_FEET;

use super::{TakeoffStatus, TrafficRecord};

/// Minimum time between two aircraft using the same runway.
pub const RUNWAY_SEPARATION: Duration = Duration::from_secs(60);

/// A runway in use, with the arrival slots handed out so far and the
/// departures waiting for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRunway {
  pub id: Intern<String>,
  /// Feet from the threshold at which arrivals join the final approach.
  pub distance_to_final: f32,

  slots: Vec<Duration>,
  pub departure_queue: VecDeque<Intern<String>>,
  pub cleared: Option<Intern<String>>,
}

impl ActiveRunway {
  pub fn new(id: Intern<String>) -> Self {
    Self {
      id,
      distance_to_final: 6.0 * NAUTICALMILES_TO_FEET,
      slots: Vec::new(),
      departure_queue: VecDeque::new(),
      cleared: None,
    }
  }

  pub fn slots(&self) -> &[Duration] {
    &self.slots
  }

  /// Hands out the earliest slot at or after `eta` that keeps
  /// [`RUNWAY_SEPARATION`] from the slots already given out.
  pub fn request_time_slot(&mut self, eta: Duration, now: Duration) -> Duration {
    let separation = RUNWAY_SEPARATION;

    let Some(&first) = self.slots.first() else {
      self.slots.push(eta);
      debug!("{}: first slot {eta:?}", self.id);
      return eta;
    };

    if eta + separation < first {
      trace!("{}: slot before {first:?}", self.id);
      self.slot_housekeeping(eta, now);
      return eta;
    }

    let mut new_eta = None;
    for (i, &slot) in self.slots.iter().enumerate() {
      match self.slots.get(i + 1) {
        None => {
          new_eta = Some(if slot + separation < eta {
            eta
          } else {
            slot + separation
          });
        }
        Some(&next) if next - slot > separation * 2 => {
          if eta > slot && eta < next {
            new_eta = Some(eta.max(slot + separation));
          } else if eta < slot {
            new_eta = Some(slot + separation);
          }
        }
        Some(_) => {}
      }

      if new_eta.is_some() {
        break;
      }
    }

    let new_eta = new_eta.unwrap_or(eta);
    debug!("{}: eta {eta:?} gets slot {new_eta:?}", self.id);
    self.slot_housekeeping(new_eta, now);

    new_eta
  }

  /// Stores `new_eta`, keeps the slots sorted and drops the ones already
  /// in the past.
  pub fn slot_housekeeping(&mut self, new_eta: Duration, now: Duration) {
    self.slots.push(new_eta);
    self.slots.sort();
    self.slots.retain(|slot| {
      let keep = *slot >= now;
      if !keep {
        trace!("dropping slot {slot:?} (now {now:?})");
      }
      keep
    });
  }

  pub fn add_to_departure_queue(&mut self, id: Intern<String>) {
    if !self.departure_queue.contains(&id) {
      self.departure_queue.push_back(id);
    }
  }

  /// Takes `id` out of the queue, keeping the order of everyone else.
  pub fn remove_from_departure_queue(&mut self, id: Intern<String>) {
    self.departure_queue.retain(|queued| *queued != id);
  }

  pub fn first_in_departure_queue(&self) -> Option<Intern<String>> {
    self.departure_queue.front().copied()
  }

  /// First queued aircraft whose record carries `status`.
  pub fn first_of_status<'a>(
    &self,
    status: TakeoffStatus,
    records: impl Fn(Intern<String>) -> Option<&'a TrafficRecord>,
  ) -> Option<Intern<String>> {
    self
      .departure_queue
      .iter()
      .copied()
      .find(|id| records(*id).is_some_and(|r| r.takeoff_status == status))
  }
}

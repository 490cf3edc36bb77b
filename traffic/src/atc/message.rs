use core::fmt;
use std::time::Duration;

use internment::Intern;
use serde::{Deserialize, Serialize};

use crate::flight_plan::FlightRules;

use super::TrafficRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
  AirToGround,
  GroundToAir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
  AnnounceEngineStart,
  RequestEngineStart,
  PermitEngineStart,
  AcknowledgeEngineStart,
  AcknowledgeSwitchGroundFrequency,
  InitiateContact,
  AcknowledgeInitiateContact,
  RequestPushbackClearance,
  PermitPushbackClearance,
  HoldPushbackClearance,
  HoldPosition,
  ResumeTaxi,
  ClearedForTakeoff,
}

/// A radio call, already rendered with the station and aircraft names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtcMessage {
  pub at: Duration,
  pub frequency: f32,
  pub aircraft: Intern<String>,
  pub kind: MessageKind,
  pub direction: Direction,
  pub sender: String,
  pub receiver: String,
  pub text: String,
}

impl fmt::Display for AtcMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{:.3}] {}", self.frequency, self.text)
  }
}

/// Everything a phrase may need besides the record itself.
pub(super) struct Station<'a> {
  pub name: &'a str,
  pub ground_frequency: f32,
}

impl MessageKind {
  pub(super) fn compose(
    self,
    station: &Station,
    record: &TrafficRecord,
    direction: Direction,
  ) -> (String, String, String) {
    let (sender, receiver) = match direction {
      Direction::AirToGround => {
        (record.callsign.to_string(), station.name.to_string())
      }
      Direction::GroundToAir => {
        (station.name.to_string(), record.callsign.to_string())
      }
    };

    let runway = record.runway.map_or_else(String::new, |r| r.to_string());
    let squawk = record.transponder.as_deref().unwrap_or("1200");
    let ground = format!("{:.3}", station.ground_frequency);
    let rules = match record.flight_rules {
      FlightRules::Ifr => "IFR",
      FlightRules::Vfr => "VFR",
    };

    let text = match self {
      Self::AnnounceEngineStart => format!("{sender}. Ready to start up."),
      Self::RequestEngineStart => format!(
        "{receiver}, this is {sender}. Position {}. {rules} to {}. Request start-up.",
        record.gate.map_or_else(|| "unknown".to_string(), |g| g.to_string()),
        record.destination,
      ),
      Self::PermitEngineStart => format!(
        "{receiver}. Start-up approved. Runway {runway}, fly runway heading, squawk {squawk}. For push-back and taxi clearance call {ground}. {sender} control."
      ),
      Self::AcknowledgeEngineStart => format!(
        "{receiver}. Start-up approved. Runway {runway}, fly runway heading, squawk {squawk}. For push-back and taxi clearance call {ground}. {sender}."
      ),
      Self::AcknowledgeSwitchGroundFrequency => {
        format!("{receiver}. Switching to {ground}. {sender}.")
      }
      Self::InitiateContact => format!("{receiver}. With you. {sender}."),
      Self::AcknowledgeInitiateContact => {
        format!("{receiver}. Roger. {sender}.")
      }
      Self::RequestPushbackClearance => {
        format!("{receiver}. Request push-back. {sender}.")
      }
      Self::PermitPushbackClearance => {
        format!("{receiver}. Push-back approved. {sender}.")
      }
      Self::HoldPushbackClearance => format!("{receiver}. Standby. {sender}."),
      Self::HoldPosition => format!("{receiver}. Hold position. {sender}."),
      Self::ResumeTaxi => format!("{receiver}. Resume taxiing. {sender}."),
      Self::ClearedForTakeoff => format!(
        "{receiver}. Cleared for takeoff runway {runway}. {sender}."
      ),
    };

    (sender, receiver, text)
  }
}

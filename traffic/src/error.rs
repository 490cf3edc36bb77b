use internment::Intern;
use thiserror::Error;

use crate::flight_plan::Leg;

/// Failures surfaced by plan generation and the ATC protocol.
///
/// None of these abort the simulation: the unit of failure is always a
/// single agent, which the engine removes when a call on its behalf fails.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  #[error("unknown airport {0}")]
  UnknownAirport(Intern<String>),
  #[error("no runway {runway} at {airport}")]
  NoSuchRunway {
    airport: Intern<String>,
    runway: Intern<String>,
  },
  #[error("no active runway available at {0}")]
  NoActiveRunway(Intern<String>),
  #[error("no gate available at {0}")]
  NoGate(Intern<String>),
  #[error("no ground route from {from} to {to}")]
  NoRoute { from: String, to: String },
  #[error("{0:?} leg produced no waypoints")]
  EmptyLeg(Leg),
  #[error("traffic schedule has no current flight")]
  NoScheduledFlight,
  #[error("flight plan has no current waypoint")]
  MissingWaypoint,
  #[error("aircraft {0} has no traffic record with this controller")]
  NoTrafficRecord(Intern<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

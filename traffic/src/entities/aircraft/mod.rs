pub mod atc;
mod control;
mod dynamics;

use std::time::Duration;

use glam::Vec2;
use internment::Intern;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use turborand::rng::Rng;

use crate::{
  Error,
  atc::{AtcManager, AtcRequest, ControllerRef, TakeoffStatus},
  entities::{airport::Airport, performance::Performance},
  flight_plan::{FlightPlan, Lights, TrafficSchedule},
};

pub use control::{calc_vertical_speed, parking_speed, pushback_speed};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AircraftTargets {
  pub heading: f32,
  pub speed: f32,
  pub altitude: f32,
  /// Feet per minute.
  pub vertical_speed: f32,
  pub roll: f32,
  pub pitch: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeathReason {
  NoFlightPlan,
  EmptyPlan,
  PlanFinished,
  PlanGeneration,
  InvalidPlan,
  Stuck,
  CircularWait,
  ScheduleEnded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type", content = "value")]
pub enum AgentStatus {
  #[default]
  Alive,
  Dead(DeathReason),
}

/// What the engine should do with an aircraft after its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  Continue,
  RemovalRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "mode", content = "value")]
pub enum LateralMode {
  Heading(f32),
  Roll(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "mode", content = "value")]
pub enum VerticalMode {
  Altitude(f32),
  Pitch(f32),
}

/// Targets flown when the aircraft has no flight plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualControls {
  pub lateral: LateralMode,
  pub vertical: VerticalMode,
  pub speed: f32,
}

/// Resolution advisory from an external collision avoidance source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcasAdvisory {
  pub threat_level: u8,
  /// Positive to climb, negative to descend.
  pub sense: i8,
}

/// Everything an aircraft may touch during its tick.
pub struct TickContext<'a> {
  pub dt: f32,
  pub now: Duration,
  pub airports: &'a mut [Airport],
  pub atc: &'a mut AtcManager,
  pub rng: &'a mut Rng,
  pub requests: &'a mut Vec<AtcRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
  pub id: Intern<String>,
  pub callsign: Intern<String>,

  pub pos: Vec2,
  pub heading: f32,
  pub speed: f32,
  pub altitude: f32,
  /// Feet per minute.
  pub vertical_speed: f32,
  pub roll: f32,
  pub pitch: f32,

  pub target: AircraftTargets,
  pub heading_lock: bool,
  pub altitude_lock: bool,
  pub use_perf_vs: bool,
  pub no_roll: bool,
  pub hold_position: bool,

  pub status: AgentStatus,
  pub stuck_counter: u32,
  pub takeoff_status: TakeoffStatus,
  pub repositioned: bool,

  pub flight_plan: Option<FlightPlan>,
  pub schedule: TrafficSchedule,
  pub performance: Performance,

  pub controller: Option<ControllerRef>,
  pub prev_controller: Option<ControllerRef>,
  /// Tower holding this aircraft in its departure queue while it still
  /// talks to ground.
  pub tower: Option<ControllerRef>,

  pub manual: Option<ManualControls>,
  pub tcas: Option<TcasAdvisory>,

  pub gear: f32,
  pub flaps: f32,
  pub spoilers: f32,
  pub speed_brakes: bool,
  pub lights: Lights,

  prev_dist_to_go: f32,
  min_bearing: f32,
  speed_fraction: f32,
  prev_speed: f32,
  ground_target_speed: f32,
  heading_change_rate: f32,
  heading_error: f32,
  spin_counter: i32,
  dt_count: f32,
  fp_jitter: f32,
}

impl Aircraft {
  pub fn new(
    callsign: Intern<String>,
    schedule: TrafficSchedule,
    performance: Performance,
  ) -> Self {
    Self {
      id: callsign,
      callsign,
      pos: Vec2::ZERO,
      heading: 0.0,
      speed: 0.0,
      altitude: 0.0,
      vertical_speed: 0.0,
      roll: 0.0,
      pitch: 0.0,
      target: AircraftTargets::default(),
      heading_lock: true,
      altitude_lock: true,
      use_perf_vs: true,
      no_roll: true,
      hold_position: false,
      status: AgentStatus::Alive,
      stuck_counter: 0,
      takeoff_status: TakeoffStatus::None,
      repositioned: false,
      flight_plan: None,
      schedule,
      performance,
      controller: None,
      prev_controller: None,
      tower: None,
      manual: None,
      tcas: None,
      gear: 1.0,
      flaps: 0.0,
      spoilers: 0.0,
      speed_brakes: false,
      lights: Lights::PowerDown,
      prev_dist_to_go: f32::MAX,
      min_bearing: 360.0,
      speed_fraction: 1.0,
      prev_speed: 0.0,
      ground_target_speed: 0.0,
      heading_change_rate: 0.0,
      heading_error: 0.0,
      spin_counter: 0,
      dt_count: 0.0,
      fp_jitter: 0.0,
    }
  }

  pub fn with_id(mut self, id: Intern<String>) -> Self {
    self.id = id;
    self
  }

  pub fn with_state(
    mut self,
    pos: Vec2,
    heading: f32,
    altitude: f32,
    speed: f32,
  ) -> Self {
    self.pos = pos;
    self.heading = heading;
    self.altitude = altitude;
    self.speed = speed;
    self.sync_targets_to_vals();
    self
  }

  pub fn with_flight_plan(mut self, flight_plan: FlightPlan) -> Self {
    self.flight_plan = Some(flight_plan);
    self
  }

  pub fn with_manual_controls(mut self, manual: ManualControls) -> Self {
    self.manual = Some(manual);
    self
  }

  pub fn sync_targets_to_vals(&mut self) {
    self.target.heading = self.heading;
    self.target.speed = self.speed;
    self.target.altitude = self.altitude;
  }

  pub fn is_dead(&self) -> bool {
    matches!(self.status, AgentStatus::Dead(_))
  }

  /// Marks the aircraft for removal. The first reason given sticks.
  pub fn set_dead(&mut self, reason: DeathReason) {
    if self.is_dead() {
      return;
    }

    match reason {
      DeathReason::PlanFinished | DeathReason::ScheduleEnded => {
        info!("{}: done ({reason:?})", self.callsign)
      }
      _ => warn!("{}: removed ({reason:?})", self.callsign),
    }
    self.status = AgentStatus::Dead(reason);
  }

  pub fn on_ground(&self) -> bool {
    self.no_roll
  }

  pub fn ground_target_speed(&self) -> f32 {
    self.ground_target_speed
  }

  pub fn speed_fraction(&self) -> f32 {
    self.speed_fraction
  }

  /// Runs one tick: plan, ATC, derived targets, then the actual state.
  pub fn update(&mut self, ctx: &mut TickContext) -> TickOutcome {
    if self.is_dead() {
      return TickOutcome::Continue;
    }

    let mut active = true;
    match (&self.flight_plan, self.manual) {
      (Some(_), _) => {
        match self.process_flight_plan(ctx) {
          Ok(()) => {}
          Err(Error::MissingWaypoint) => {
            error!("{}: flight plan lost its current waypoint", self.callsign);
            return TickOutcome::RemovalRequested;
          }
          Err(e) => {
            warn!("{}: {e}", self.callsign);
            self.set_dead(DeathReason::PlanGeneration);
          }
        }
        active = self
          .flight_plan
          .as_ref()
          .is_some_and(|fp| fp.is_active(ctx.now));
      }
      (None, Some(manual)) => self.apply_manual_controls(manual),
      (None, None) => {
        self.set_dead(DeathReason::NoFlightPlan);
      }
    }

    if self.is_dead() || self.repositioned {
      return TickOutcome::Continue;
    }
    if !active {
      self.ground_target_speed = 0.0;
    }

    self.handle_atc_requests(ctx);
    if self.is_dead() {
      return TickOutcome::Continue;
    }

    self.update_secondary_targets();
    self.update_actual_state(ctx.dt, active);
    self.update_configuration(ctx.dt);

    TickOutcome::Continue
  }

  fn apply_manual_controls(&mut self, manual: ManualControls) {
    match manual.lateral {
      LateralMode::Heading(heading) => {
        self.heading_lock = true;
        self.target.heading = heading;
      }
      LateralMode::Roll(roll) => {
        self.heading_lock = false;
        self.target.roll = roll;
      }
    }

    match manual.vertical {
      VerticalMode::Altitude(altitude) => {
        self.altitude_lock = true;
        self.use_perf_vs = true;
        self.target.altitude = altitude;
      }
      VerticalMode::Pitch(pitch) => {
        self.altitude_lock = false;
        self.target.pitch = pitch;
      }
    }

    self.no_roll = false;
    self.target.speed = manual.speed;
  }
}

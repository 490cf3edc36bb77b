use std::{collections::HashSet, io, path::Path, time::Duration};

use glam::Vec2;
use internment::Intern;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use turborand::{SeededCore, rng::Rng};

use crate::{
  DEFAULT_TICK_RATE_TPS, Error, NAUTICALMILES_TO_FEET, Result,
  atc::{AtcManager, AtcMessage},
  entities::{
    aircraft::{Aircraft, DeathReason, TickContext, TickOutcome},
    airport::{Airport, find_airport},
    performance::Performance,
  },
  flight_plan::{Leg, ScheduledFlight, TrafficSchedule, initial_leg},
  geometry::{angle_between_points, move_point},
  seconds_between,
};

/// Distance from the arrival airport at which arrivals appear.
const DESCENT_SPAWN_DISTANCE: f32 = 40.0 * NAUTICALMILES_TO_FEET;
const DESCENT_SPAWN_ALTITUDE: f32 = 12000.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct World {
  pub airports: Vec<Airport>,
  pub aircraft: Vec<Aircraft>,
  pub now: Duration,
}

impl World {
  pub fn aircraft(&self, id: Intern<String>) -> Option<&Aircraft> {
    self.aircraft.iter().find(|a| a.id == id)
  }
}

pub struct Engine {
  pub world: World,
  pub atc: AtcManager,
  pub rng: Rng,

  rate: usize,
}

impl Engine {
  pub fn new(airports: Vec<Airport>, seed: u64) -> Self {
    let mut atc = AtcManager::default();
    for airport in airports.iter() {
      atc.add_airport(airport);
    }

    Self {
      world: World {
        airports,
        ..Default::default()
      },
      atc,
      rng: Rng::with_seed(seed),
      rate: DEFAULT_TICK_RATE_TPS,
    }
  }

  pub fn with_tick_rate(mut self, rate: usize) -> Self {
    self.rate = rate.max(1);
    self
  }

  pub fn with_start_time(mut self, now: Duration) -> Self {
    self.world.now = now;
    self
  }

  pub fn tick_rate(&self) -> usize {
    self.rate
  }

  /// Seconds of simulation time per tick.
  pub fn dt(&self) -> f32 {
    1.0 / self.rate as f32
  }

  /// Places an aircraft for the current flight of `schedule` on the leg it
  /// would be flying right now.
  pub fn spawn(
    &mut self,
    schedule: TrafficSchedule,
    performance: Performance,
  ) -> Result<Intern<String>> {
    let flight = schedule.current().ok_or(Error::NoScheduledFlight)?.clone();
    let now = self.world.now;
    let leg = initial_leg(now, flight.departure_time, flight.arrival_time);
    let (pos, heading, altitude, speed) =
      self.spawn_state(&flight, leg, &performance)?;
    let start_time = if leg == Leg::Pushback {
      flight.departure_time
    } else {
      now
    };

    let id = self.unique_id(flight.callsign);
    let mut aircraft = Aircraft::new(flight.callsign, schedule, performance)
      .with_id(id)
      .with_state(pos, heading, altitude, speed);

    let mut requests = Vec::new();
    let mut ctx = TickContext {
      dt: 0.0,
      now,
      airports: &mut self.world.airports,
      atc: &mut self.atc,
      rng: &mut self.rng,
      requests: &mut requests,
    };
    aircraft.create_initial_plan(&mut ctx, leg, start_time)?;
    self.atc.apply(requests, now);

    info!(
      "spawned {id} ({} -> {}) on the {leg:?} leg",
      flight.departure, flight.arrival
    );
    self.world.aircraft.push(aircraft);

    Ok(id)
  }

  fn spawn_state(
    &self,
    flight: &ScheduledFlight,
    leg: Leg,
    performance: &Performance,
  ) -> Result<(Vec2, f32, f32, f32)> {
    let departure = find_airport(&self.world.airports, flight.departure)?;
    let arrival = find_airport(&self.world.airports, flight.arrival)?;
    let course = angle_between_points(departure.center, arrival.center);

    Ok(match leg {
      Leg::Cruise => {
        let total = seconds_between(flight.arrival_time, flight.departure_time);
        let elapsed = seconds_between(self.world.now, flight.departure_time);
        let fraction = if total > 0.0 {
          (elapsed / total).clamp(0.0, 1.0)
        } else {
          0.0
        };
        let pos = departure.center.lerp(arrival.center, fraction);
        (pos, course, flight.cruise_altitude, performance.v_cruise)
      }
      Leg::Descent => {
        let pos =
          move_point(arrival.center, course + 180.0, DESCENT_SPAWN_DISTANCE);
        let altitude = flight.cruise_altitude.min(DESCENT_SPAWN_ALTITUDE);
        (pos, course, altitude, performance.v_descent)
      }
      _ => (departure.center, 0.0, departure.elevation, 0.0),
    })
  }

  fn unique_id(&self, callsign: Intern<String>) -> Intern<String> {
    let taken = |id: Intern<String>| self.world.aircraft.iter().any(|a| a.id == id);
    if !taken(callsign) {
      return callsign;
    }

    (2..)
      .map(|n| Intern::from(format!("{callsign}-{n}")))
      .find(|id| !taken(*id))
      .unwrap_or(callsign)
  }

  /// Advances the world by `dt` seconds and returns what was said on the
  /// radio.
  pub fn tick(&mut self, dt: f32) -> Vec<AtcMessage> {
    self.world.now += Duration::from_secs_f32(dt);
    let now = self.world.now;

    let mut requests = Vec::new();
    for aircraft in self.world.aircraft.iter_mut() {
      if aircraft.is_dead() {
        continue;
      }

      let mut ctx = TickContext {
        dt,
        now,
        airports: &mut self.world.airports,
        atc: &mut self.atc,
        rng: &mut self.rng,
        requests: &mut requests,
      };
      if aircraft.update(&mut ctx) == TickOutcome::RemovalRequested {
        error!("{}: removed after an invalid flight plan", aircraft.id);
        aircraft.set_dead(DeathReason::InvalidPlan);
      }
    }

    self.atc.apply(requests, now);
    let alive: HashSet<Intern<String>> = self
      .world
      .aircraft
      .iter()
      .filter(|a| !a.is_dead())
      .map(|a| a.id)
      .collect();
    self.atc.update(now, &mut self.rng, |id| alive.contains(&id));

    let messages = self.atc.drain_messages();
    for message in messages.iter() {
      debug!(target: "atc", "{} {message}", message.aircraft);
    }

    self.cleanup();
    messages
  }

  /// Removes dead aircraft and gives back their gates.
  pub fn cleanup(&mut self) {
    let airports = &mut self.world.airports;
    self.world.aircraft.retain_mut(|aircraft| {
      if !aircraft.is_dead() {
        return true;
      }

      if let Some(fp) = aircraft.flight_plan.as_mut() {
        fp.release_gate(airports);
      }
      info!("{}: removed ({:?})", aircraft.id, aircraft.status);
      false
    });
  }

  pub fn save_world(&self, path: &Path) -> io::Result<()> {
    let string = serde_json::to_string(&self.world).map_err(io::Error::other)?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, string)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entities::{
      aircraft::AgentStatus,
      airport::{Gate, Runway},
    },
    flight_plan::GateAssignment,
  };

  fn airports() -> Vec<Airport> {
    let mut dep = Airport::new(Intern::from_ref("KDEP"), Vec2::ZERO)
      .with_elevation(100.0)
      .with_wind(0.0);
    dep.add_runway(Runway::new(
      Intern::from_ref("36"),
      Vec2::new(0.0, -5000.0),
      0.0,
      10000.0,
    ));
    dep.add_gate(Gate::new(
      Intern::from_ref("A1"),
      Vec2::new(-1000.0, 0.0),
      90.0,
      120.0,
    ));

    let mut arr = Airport::new(Intern::from_ref("KARR"), Vec2::new(0.0, 600000.0))
      .with_elevation(50.0)
      .with_wind(0.0);
    arr.add_runway(Runway::new(
      Intern::from_ref("36"),
      Vec2::new(0.0, 595000.0),
      0.0,
      10000.0,
    ));

    vec![dep, arr]
  }

  fn schedule(callsign: &str, departure: u64, arrival: u64) -> TrafficSchedule {
    TrafficSchedule::new(
      "gate",
      60.0,
      vec![ScheduledFlight::new(
        Intern::from_ref(callsign),
        Intern::from_ref("KDEP"),
        Intern::from_ref("KARR"),
        Duration::from_secs(departure),
        Duration::from_secs(arrival),
      )],
    )
  }

  fn engine() -> Engine {
    Engine::new(airports(), 42).with_start_time(Duration::from_secs(10000))
  }

  mod spawning {
    use super::*;

    #[test]
    fn test_spawn_at_gate() {
      let mut engine = engine();
      let id = engine
        .spawn(schedule("TST1", 10000, 14000), Performance::jet_transport())
        .unwrap();

      let aircraft = engine.world.aircraft(id).unwrap();
      let fp = aircraft.flight_plan.as_ref().unwrap();
      assert_eq!(fp.leg(), Leg::Pushback);
      assert_eq!(fp.start_time, Duration::from_secs(10000));
      assert_eq!(
        fp.gate,
        Some(GateAssignment {
          airport: Intern::from_ref("KDEP"),
          gate: Intern::from_ref("A1"),
        })
      );
    }

    #[test]
    fn test_spawn_in_cruise() {
      let mut engine = engine();
      let id = engine
        .spawn(schedule("TST1", 0, 20000), Performance::jet_transport())
        .unwrap();

      let aircraft = engine.world.aircraft(id).unwrap();
      assert_eq!(
        aircraft.flight_plan.as_ref().map(|fp| fp.leg()),
        Some(Leg::Cruise)
      );
      assert_eq!(aircraft.altitude, 30000.0);
      assert!((aircraft.pos.y - 300000.0).abs() < 1.0);
    }

    #[test]
    fn test_duplicate_callsigns_get_unique_ids() {
      let mut engine = engine();
      let a = engine
        .spawn(schedule("TST1", 0, 20000), Performance::jet_transport())
        .unwrap();
      let b = engine
        .spawn(schedule("TST1", 0, 20000), Performance::jet_transport())
        .unwrap();

      assert_eq!(a.as_str(), "TST1");
      assert_eq!(b.as_str(), "TST1-2");
    }

    #[test]
    fn test_unknown_airport_fails() {
      let mut engine = engine();
      let schedule = TrafficSchedule::new(
        "gate",
        60.0,
        vec![ScheduledFlight::new(
          Intern::from_ref("TST1"),
          Intern::from_ref("KXXX"),
          Intern::from_ref("KARR"),
          Duration::ZERO,
          Duration::from_secs(4000),
        )],
      );

      let result = engine.spawn(schedule, Performance::jet_transport());
      assert_eq!(
        result,
        Err(Error::UnknownAirport(Intern::from_ref("KXXX")))
      );
      assert!(engine.world.aircraft.is_empty());
    }
  }

  mod ticking {
    use super::*;

    #[test]
    fn test_tick_advances_time() {
      let mut engine = engine();
      engine.tick(0.5);
      engine.tick(0.5);
      assert_eq!(engine.world.now, Duration::from_secs(10001));
    }

    #[test]
    fn test_dead_aircraft_release_gate() {
      let mut engine = engine();
      let id = engine
        .spawn(schedule("TST1", 10000, 14000), Performance::jet_transport())
        .unwrap();
      let gate_taken = |engine: &Engine| {
        engine.world.airports[0]
          .gate(Intern::from_ref("A1"))
          .is_some_and(|g| !g.available)
      };
      assert!(gate_taken(&engine));

      if let Some(aircraft) = engine.world.aircraft.iter_mut().find(|a| a.id == id) {
        aircraft.set_dead(DeathReason::Stuck);
      }
      engine.tick(0.1);

      assert!(engine.world.aircraft.is_empty());
      assert!(!gate_taken(&engine));
    }

    #[test]
    fn test_cruise_aircraft_moves() {
      let mut engine = engine();
      let id = engine
        .spawn(schedule("TST1", 0, 20000), Performance::jet_transport())
        .unwrap();
      let start = engine.world.aircraft(id).map(|a| a.pos).unwrap();

      for _ in 0..100 {
        engine.tick(engine.dt());
      }

      let aircraft = engine.world.aircraft(id).unwrap();
      assert_eq!(aircraft.status, AgentStatus::Alive);
      assert!(aircraft.pos.distance(start) > 1000.0);
    }

    #[test]
    fn test_snapshot_is_json() {
      let mut engine = engine();
      engine
        .spawn(schedule("TST1", 0, 20000), Performance::jet_transport())
        .unwrap();

      let dir = std::env::temp_dir().join("traffic-engine-test");
      let path = dir.join("world.json");
      engine.save_world(&path).unwrap();

      let text = std::fs::read_to_string(&path).unwrap();
      let value: serde_json::Value = serde_json::from_str(&text).unwrap();
      assert_eq!(value["aircraft"][0]["id"], "TST1");
      let _ = std::fs::remove_dir_all(dir);
    }
  }
}

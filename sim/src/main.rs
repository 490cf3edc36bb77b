use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use traffic::engine::Engine;

use crate::config::{Config, ConfigError};

mod config;

#[derive(Parser)]
#[command(version, about = "Runs a headless AI traffic scenario")]
struct Cli {
  /// The path to the scenario config file.
  #[arg(short, long)]
  config_path: PathBuf,

  /// The seed to use for the random number generator.
  #[arg(short, long)]
  seed: Option<u64>,

  /// How many ticks to run. Defaults to the configured duration.
  #[arg(short, long)]
  ticks: Option<u64>,

  /// Also write logs to this file.
  #[arg(long)]
  log_file: Option<PathBuf>,

  /// Where to write a JSON snapshot of the world when the run ends.
  #[arg(long)]
  snapshot: Option<PathBuf>,

  /// Pace ticks to the wall clock.
  #[arg(long)]
  realtime: bool,

  /// Log ATC transmissions and other debug output.
  #[arg(short, long)]
  verbose: bool,
}

const DEFAULT_DURATION_SECS: u64 = 3600;

#[tokio::main]
async fn main() {
  let cli = Cli::parse();
  let _guard = init_logging(cli.log_file.as_deref(), cli.verbose);

  if let Err(e) = run(cli).await {
    error!("{e}");
    std::process::exit(1);
  }
}

fn init_logging(log_file: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
  let level = if verbose { Level::DEBUG } else { Level::INFO };

  match log_file {
    Some(path) => {
      let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
      let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("traffic-sim.log"));
      let (writer, guard) = tracing_appender::non_blocking(
        tracing_appender::rolling::never(directory, file_name),
      );

      tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(writer)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt().with_max_level(level).init();
      None
    }
  }
}

async fn run(cli: Cli) -> Result<(), ConfigError> {
  let config = Config::from_path(&cli.config_path)?;
  let world = config.world();
  let seed = cli.seed.or(world.seed).unwrap_or_default();
  let rate = world.tick_rate();

  let mut engine = Engine::new(config.build_airports()?, seed)
    .with_tick_rate(rate)
    .with_start_time(world.start_time());
  info!(
    "loaded {} airports from '{}' (seed {seed})",
    engine.world.airports.len(),
    cli.config_path.display()
  );

  for (schedule, performance) in config.build_flights()? {
    if let Err(e) = engine.spawn(schedule, performance) {
      warn!("unable to spawn flight: {e}");
    }
  }

  let ticks = cli
    .ticks
    .unwrap_or(world.duration.unwrap_or(DEFAULT_DURATION_SECS) * rate as u64);
  let dt = engine.dt();
  let mut interval = (cli.realtime || world.realtime.unwrap_or_default())
    .then(|| tokio::time::interval(Duration::from_secs_f32(dt)));
  let mut transmissions = 0;

  for tick in 0..ticks {
    if let Some(interval) = interval.as_mut() {
      interval.tick().await;
    }

    transmissions += engine.tick(dt).len();

    if tick % (rate as u64 * 60) == 0 {
      info!(
        "t={:.0}s aircraft={} transmissions={transmissions}",
        engine.world.now.as_secs_f32(),
        engine.world.aircraft.len()
      );
    }

    if engine.world.aircraft.is_empty() {
      info!("no traffic left after {} ticks", tick + 1);
      break;
    }
  }

  info!(
    "finished at t={:.0}s with {} aircraft and {transmissions} transmissions",
    engine.world.now.as_secs_f32(),
    engine.world.aircraft.len()
  );

  if let Some(path) = cli.snapshot {
    match engine.save_world(&path) {
      Ok(()) => info!("wrote snapshot to '{}'", path.display()),
      Err(e) => error!("unable to write snapshot: {e}"),
    }
  }

  Ok(())
}

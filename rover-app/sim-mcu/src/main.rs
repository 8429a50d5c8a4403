mod world;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, ValueEnum};
use rover_core::{
    mk_static,
    utils::{
        config::NavConfig,
        navigation::{NavError, Navigator, StopReason},
        sensors::odometer::Odometer,
    },
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, info};
use world::{Pose, SimClock, SimDelay, SimMotors, SimSensors, World, WorldSpec};

#[derive(Clone, Copy, Debug, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Nothing in the way
    Open,
    /// Wall ahead, block on the left
    SideObstacle,
    /// Dead end narrower than the obstacle threshold
    BoxedIn,
    /// Wide corridor closed at the far end
    Corridor,
}

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// Built-in arena to drive in
    #[clap(long, value_enum, default_value = "side-obstacle")]
    scenario: Scenario,
    /// JSON arena file, replaces the built-in scenario
    #[clap(long)]
    world: Option<PathBuf>,
    /// JSON navigation config overrides
    #[clap(long)]
    config: Option<PathBuf>,
    /// Inject encoder contact bounce 300 us after every edge
    #[clap(long)]
    bounce: bool,
    /// Give up after this much simulated time
    #[clap(long, default_value_t = 120)]
    max_sim_secs: u64,
    /// Print the run report as JSON
    #[clap(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    scenario: Scenario,
    outcome: Option<StopReason>,
    fault: Option<String>,
    pulses: u32,
    sim_time_ms: u64,
    pose: Pose,
    heading_deg: f32,
    motor_commands: usize,
    crosstalk_warnings: u32,
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Caps the pivot timeout at the simulated time budget. The budget is only
/// enforced on sensor reads, which a pivot never makes.
fn within_budget(
    mut config: NavConfig,
    max_sim_secs: u64,
) -> NavConfig {
    let budget_ms = u32::try_from(max_sim_secs.saturating_mul(1_000)).unwrap_or(u32::MAX);
    let limit = config
        .turn_timeout_ms
        .map_or(budget_ms, |ms| ms.min(budget_ms));
    if config.turn_timeout_ms != Some(limit) {
        debug!(limit_ms = limit, "pivot timeout capped by time budget");
    }
    config.turn_timeout_ms = Some(limit);
    config
}

fn run_sim(
    scenario: Scenario,
    spec: WorldSpec,
    config: NavConfig,
    odometer: &'static Odometer,
    max_sim_secs: u64,
) -> RunReport {
    let config = within_budget(config, max_sim_secs);
    let world = World::new(spec, &config, odometer, max_sim_secs);

    let mut nav = Navigator::new(
        SimSensors(world.clone()),
        SimMotors(world.clone()),
        odometer,
        SimDelay(world.clone()),
        SimClock(world.clone()),
        config,
    );

    let (outcome, fault) = match nav.run() {
        Ok(reason) => (Some(reason), None),
        Err(NavError::TurnStalled { counted, required }) => {
            (None, Some(format!("turn stalled at {counted}/{required} pulses")))
        }
        Err(NavError::Sensor(e)) => (None, Some(e.to_string())),
        Err(NavError::Actuator(e)) => (None, Some(format!("{e:?}"))),
    };

    let w = world.borrow();
    RunReport {
        scenario,
        outcome,
        fault,
        pulses: odometer.read(),
        sim_time_ms: w.now_ms(),
        pose: w.pose,
        heading_deg: w.pose.heading.to_degrees(),
        motor_commands: w.commands,
        crosstalk_warnings: w.crosstalk_warnings,
    }
}

fn simulate(opts: &Opts) -> Result<RunReport, Box<dyn std::error::Error>> {
    let config: NavConfig = match &opts.config {
        Some(path) => load_json(path)?,
        None => NavConfig::default(),
    };
    let mut spec: WorldSpec = match &opts.world {
        Some(path) => load_json(path)?,
        None => world::preset(opts.scenario),
    };
    if opts.bounce {
        spec.bounce_us.get_or_insert(300);
    }
    info!(?config, obstacles = spec.obstacles.len(), "starting simulation");

    // Shared with the simulated encoder interrupt, as on hardware.
    let odometer: &'static Odometer = mk_static!(Odometer, Odometer::new(config.debounce_us));
    Ok(run_sim(opts.scenario, spec, config, odometer, opts.max_sim_secs))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let opts: Opts = Opts::parse();

    let report = match simulate(&opts) {
        Ok(report) => report,
        Err(e) => {
            error!("simulation setup failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    if opts.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => error!("failed to encode report: {e}"),
        }
    } else {
        info!(
            outcome = ?report.outcome,
            fault = ?report.fault,
            pulses = report.pulses,
            sim_time_ms = report.sim_time_ms,
            x = report.pose.x,
            y = report.pose.y,
            heading_deg = report.heading_deg,
            "run finished"
        );
    }

    if report.fault.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

//! Headless frame loop: spawn the requested rigs, hand the simulation to the
//! physics thread and drive it at a fixed visual rate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use softrig_config::{CliArgs, Config};
use softrig_sim::{
    AudioAdapter, AudioRelay, FlatTerrain, PhysicsThread, SimContext, SimError, Simulation, VehicleDef, VehicleId,
};
use tracing::{debug, info, trace, warn};

use crate::error::AppError;
use crate::recorder::{Recorder, describe};
use crate::report::{EventCounts, RunReport};
use crate::scenarios::{Driver, Scenario};

/// Visual frame length (60 Hz).
pub const FRAME_DT: f32 = 1.0 / 60.0;

pub const DEFAULT_FRAMES: u32 = 600;

/// Spacing between vehicles loaded from files.
const SPAWN_SPACING: f32 = 10.0;

/// What one invocation simulates.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub scenario: Option<Scenario>,
    pub vehicles: Vec<PathBuf>,
    pub frames: u32,
    pub record: Option<PathBuf>,
}

impl RunPlan {
    pub fn from_args(args: &CliArgs) -> Result<Self, AppError> {
        let scenario = args.scenario.as_deref().map(str::parse::<Scenario>).transpose()?;
        if scenario.is_none() && args.vehicle.is_empty() {
            return Err(AppError::NothingToRun);
        }
        Ok(Self {
            scenario,
            vehicles: args.vehicle.clone(),
            frames: args.frames.unwrap_or(DEFAULT_FRAMES),
            record: args.record.clone(),
        })
    }
}

/// Headless audio sink: sound triggers go to the trace log.
#[derive(Debug, Default)]
struct TracedAudio {
    triggers: u64,
}

impl AudioAdapter for TracedAudio {
    fn trig_start(&mut self, vehicle: VehicleId, sound: i32) {
        self.triggers += 1;
        trace!(%vehicle, sound, "sound start");
    }

    fn trig_stop(&mut self, vehicle: VehicleId, sound: i32) {
        trace!(%vehicle, sound, "sound stop");
    }

    fn modulate(&mut self, vehicle: VehicleId, sound: i32, value: f32) {
        trace!(%vehicle, sound, value, "sound modulate");
    }
}

fn build_simulation(config: &Config) -> Simulation {
    let mut terrain = FlatTerrain::new(0.0);
    if let Some(level) = config.world.water_level {
        terrain = terrain.with_water(level);
    }
    Simulation::new(SimContext::from_config(config, Arc::new(terrain)))
}

/// Spawn everything in `plan` into `sim`.
fn populate(plan: &RunPlan, sim: &mut Simulation) -> Result<Driver, AppError> {
    let mut driver = match plan.scenario {
        Some(scenario) => Driver::setup(scenario, sim)?,
        None => Driver::passive(Vec::new()),
    };
    for (i, path) in plan.vehicles.iter().enumerate() {
        let origin = Vec3::new((i + 1) as f32 * SPAWN_SPACING, 1.0, 0.0);
        let id = VehicleDef::load(path)
            .and_then(|def| sim.spawn(&def, origin))
            .map_err(|source| AppError::Vehicle {
                path: path.clone(),
                source,
            })?;
        info!(vehicle = %id, path = %path.display(), "vehicle loaded");
        driver.add_vehicle(id);
    }
    Ok(driver)
}

/// Run `plan` to completion and summarize it.
pub fn run(config: &Config, plan: &RunPlan) -> Result<RunReport, AppError> {
    let mut sim = build_simulation(config);
    let mut driver = populate(plan, &mut sim)?;
    if driver.vehicles().is_empty() {
        return Err(AppError::NothingToRun);
    }

    let mut recorder = match &plan.record {
        Some(path) => {
            let rigs = driver
                .vehicles()
                .iter()
                .map(|&id| sim.with_vehicle(id, describe).map(|d| (id, d)))
                .collect::<Result<Vec<_>, _>>()?;
            Some(Recorder::create(path, &rigs)?)
        }
        None => None,
    };

    info!(
        vehicles = driver.vehicles().len(),
        frames = plan.frames,
        workers = sim.worker_threads(),
        "starting run"
    );
    let physics = PhysicsThread::spawn(sim)?;
    let mut events = EventCounts::default();
    let mut relay = AudioRelay::new();
    let mut audio = TracedAudio::default();
    let started = Instant::now();

    for frame in 0..plan.frames {
        driver = physics.call(move |sim| {
            if let Err(e) = driver.drive(sim) {
                warn!(error = %e, "scenario input rejected");
            }
            driver
        })?;
        physics.step(FRAME_DT)?;
        if recorder.is_some() {
            physics.sync()?;
        }

        let snapshot = physics.latest();
        relay.deliver(&snapshot, &mut audio);
        for event in physics.drain_events() {
            events.count(&event);
            relay.on_event(&event, &mut audio);
            if let Some(rec) = recorder.as_mut() {
                rec.record_event(snapshot.time, snapshot.frame, &event)?;
            }
        }
        if let Some(rec) = recorder.as_mut() {
            rec.record(&snapshot)?;
        }
        if frame % 60 == 0 {
            debug!(frame, time = snapshot.time, "progress");
        }
    }

    physics.sync()?;
    for event in physics.drain_events() {
        events.count(&event);
    }
    let wall_time_ms = started.elapsed().as_millis() as u64;
    let sim = physics.shutdown().ok_or(SimError::ThreadStopped)?;

    if let Some(rec) = recorder {
        let written = rec.finish(sim.time(), sim.frame())?;
        info!(frames = written, "replay written");
    }

    let report = RunReport::collect(&sim, events, wall_time_ms);
    info!(
        frames = report.frames,
        sim_time = report.sim_time,
        wall_ms = report.wall_time_ms,
        beams_broken = report.events.beams_broken,
        sounds = audio.triggers,
        "run finished"
    );
    Ok(report)
}

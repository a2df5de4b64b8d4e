//! JSON summary of a finished run.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use softrig_sim::{SimEvent, Simulation, VehicleId};

use crate::error::AppError;

/// Running tally of simulation events, by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub spawned: u32,
    pub removed: u32,
    pub state_changes: u32,
    pub beams_broken: u32,
    pub beams_deformed: u32,
    pub wheels_detached: u32,
    pub hooks_locked: u32,
    pub hooks_unlocked: u32,
    pub ties_changed: u32,
    pub ropes_changed: u32,
    pub slide_nodes_changed: u32,
    pub linked_sets_changed: u32,
    pub lights_changed: u32,
    pub resets: u32,
    pub desyncs: u32,
}

impl EventCounts {
    pub fn count(&mut self, event: &SimEvent) {
        let slot = match event {
            SimEvent::VehicleSpawned { .. } => &mut self.spawned,
            SimEvent::VehicleRemoved { .. } => &mut self.removed,
            SimEvent::StateChanged { .. } => &mut self.state_changes,
            SimEvent::BeamBroken { .. } => &mut self.beams_broken,
            SimEvent::BeamDeformed { .. } => &mut self.beams_deformed,
            SimEvent::WheelDetached { .. } => &mut self.wheels_detached,
            SimEvent::HookLocked { .. } => &mut self.hooks_locked,
            SimEvent::HookUnlocked { .. } => &mut self.hooks_unlocked,
            SimEvent::TieChanged { .. } => &mut self.ties_changed,
            SimEvent::RopeChanged { .. } => &mut self.ropes_changed,
            SimEvent::SlideNodeChanged { .. } => &mut self.slide_nodes_changed,
            SimEvent::LinkedSetChanged { .. } => &mut self.linked_sets_changed,
            SimEvent::LightsChanged { .. } => &mut self.lights_changed,
            SimEvent::VehicleReset { .. } => &mut self.resets,
            SimEvent::NetworkDesync { .. } => &mut self.desyncs,
        };
        *slot += 1;
    }
}

/// Short stable name of an event, used in replay event records.
pub fn event_kind(event: &SimEvent) -> &'static str {
    match event {
        SimEvent::VehicleSpawned { .. } => "vehicle_spawned",
        SimEvent::VehicleRemoved { .. } => "vehicle_removed",
        SimEvent::StateChanged { .. } => "state_changed",
        SimEvent::BeamBroken { .. } => "beam_broken",
        SimEvent::BeamDeformed { .. } => "beam_deformed",
        SimEvent::WheelDetached { .. } => "wheel_detached",
        SimEvent::HookLocked { .. } => "hook_locked",
        SimEvent::HookUnlocked { .. } => "hook_unlocked",
        SimEvent::TieChanged { .. } => "tie_changed",
        SimEvent::RopeChanged { .. } => "rope_changed",
        SimEvent::SlideNodeChanged { .. } => "slide_node_changed",
        SimEvent::LinkedSetChanged { .. } => "linked_set_changed",
        SimEvent::LightsChanged { .. } => "lights_changed",
        SimEvent::VehicleReset { .. } => "vehicle_reset",
        SimEvent::NetworkDesync { .. } => "network_desync",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleReport {
    pub id: u32,
    pub name: String,
    pub state: String,
    pub nodes: usize,
    pub beams: usize,
    pub broken_beams: usize,
    pub center_of_mass: [f32; 3],
    pub linked: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub frames: u64,
    pub sim_time: f64,
    pub wall_time_ms: u64,
    pub worker_threads: usize,
    pub vehicles: Vec<VehicleReport>,
    pub events: EventCounts,
}

impl RunReport {
    /// Summarize the vehicles still present in `sim`.
    pub fn collect(sim: &Simulation, events: EventCounts, wall_time_ms: u64) -> Self {
        let vehicles = sim
            .vehicle_ids()
            .into_iter()
            .filter_map(|id| sim.with_vehicle(id, |v| vehicle_report(id, v)).ok())
            .collect();
        Self {
            frames: sim.frame(),
            sim_time: sim.time(),
            wall_time_ms,
            worker_threads: sim.worker_threads(),
            vehicles,
            events,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), AppError> {
        let out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(out, self)?;
        Ok(())
    }
}

fn vehicle_report(id: VehicleId, v: &softrig_sim::Vehicle) -> VehicleReport {
    VehicleReport {
        id: id.0,
        name: v.name().to_string(),
        state: format!("{:?}", v.state()),
        nodes: v.nodes().len(),
        beams: v.beams().len(),
        broken_beams: v.beams().iter().filter(|b| b.broken).count(),
        center_of_mass: v.center_of_mass().to_array(),
        linked: v.linked().iter().map(|l| l.0).collect(),
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use softrig_sim::{SimContext, WorkerPool};

    use super::*;
    use crate::scenarios;

    #[test]
    fn test_event_counts() {
        let mut counts = EventCounts::default();
        let vehicle = VehicleId(0);
        counts.count(&SimEvent::BeamBroken { vehicle, beam: 2 });
        counts.count(&SimEvent::BeamBroken { vehicle, beam: 3 });
        counts.count(&SimEvent::VehicleReset { vehicle });
        assert_eq!(counts.beams_broken, 2);
        assert_eq!(counts.resets, 1);
        assert_eq!(counts.hooks_locked, 0);
    }

    #[test]
    fn test_report_lists_vehicles_and_writes_json() {
        let mut sim = Simulation::with_pool(SimContext::default(), WorkerPool::inline());
        sim.spawn(&scenarios::cube(), Vec3::new(0.0, 3.0, 0.0)).unwrap();
        sim.step(0.05);

        let report = RunReport::collect(&sim, EventCounts::default(), 7);
        assert_eq!(report.vehicles.len(), 1);
        assert_eq!(report.vehicles[0].name, "cube");
        assert_eq!(report.vehicles[0].nodes, 8);
        assert_eq!(report.vehicles[0].broken_beams, 0);
        assert_eq!(report.frames, 1);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("report.json");
        report.write(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["vehicles"][0]["name"], "cube");
        assert_eq!(value["wall_time_ms"], 7);
    }
}

//! Writes published frame snapshots and simulation events to a replay file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use softrig_net::{ReplayWriter, RigDescriptor, WheelSetup, encode_node_buffer};
use softrig_sim::{FrameSnapshot, SimEvent, Vehicle, VehicleId};

use crate::error::AppError;
use crate::report::event_kind;

/// Payload of an event record.
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    kind: &'a str,
    detail: String,
}

/// Describe `vehicle` for the replay header.
pub fn describe(vehicle: &Vehicle) -> RigDescriptor {
    RigDescriptor {
        name: vehicle.name().to_string(),
        node_count: vehicle.nodes().len() as u32,
        beam_count: vehicle.beams().len() as u32,
        wheels: vehicle
            .wheels()
            .iter()
            .map(|w| WheelSetup {
                radius: w.radius,
                rim_nodes: w.rim.len() as u32,
            })
            .collect(),
    }
}

fn millis(time: f64) -> u32 {
    (time * 1000.0).round() as u32
}

pub struct Recorder {
    writer: ReplayWriter<BufWriter<File>>,
    /// Rig number of each recorded vehicle is its index here.
    rigs: Vec<VehicleId>,
    buffer: Vec<u8>,
    frames_written: u32,
}

impl Recorder {
    pub fn create(path: &Path, rigs: &[(VehicleId, RigDescriptor)]) -> Result<Self, AppError> {
        let file = BufWriter::new(File::create(path)?);
        let descriptors: Vec<RigDescriptor> = rigs.iter().map(|(_, d)| d.clone()).collect();
        let writer = ReplayWriter::new(file, &descriptors)?;
        tracing::info!(path = %path.display(), rigs = rigs.len(), "recording replay");
        Ok(Self {
            writer,
            rigs: rigs.iter().map(|(id, _)| *id).collect(),
            buffer: Vec::new(),
            frames_written: 0,
        })
    }

    fn rig_num(&self, id: VehicleId) -> Option<i32> {
        self.rigs.iter().position(|r| *r == id).map(|i| i as i32)
    }

    /// Append one node-buffer frame per recorded vehicle still present.
    pub fn record(&mut self, snapshot: &FrameSnapshot) -> Result<(), AppError> {
        let time_ms = millis(snapshot.time);
        for (rig, id) in self.rigs.iter().enumerate() {
            let Some(vehicle) = snapshot.vehicle(*id) else {
                continue;
            };
            encode_node_buffer(&vehicle.positions, &vehicle.wheel_rotations, &mut self.buffer);
            self.writer
                .write_frame(rig as i32, time_ms, snapshot.frame as u32, &self.buffer)?;
            self.frames_written += 1;
        }
        Ok(())
    }

    /// Append an event record; events of vehicles spawned after recording
    /// started are skipped.
    pub fn record_event(&mut self, time: f64, frame: u64, event: &SimEvent) -> Result<(), AppError> {
        let Some(rig) = self.rig_num(event.vehicle()) else {
            return Ok(());
        };
        let payload = serde_json::to_vec(&EventRecord {
            kind: event_kind(event),
            detail: format!("{event:?}"),
        })?;
        self.writer.write_event(rig, millis(time), frame as u32, &payload)?;
        Ok(())
    }

    /// Close the file; returns the number of frame records written.
    pub fn finish(self, time: f64, frame: u64) -> Result<u32, AppError> {
        self.writer.finish(millis(time), frame as u32)?;
        Ok(self.frames_written)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use softrig_net::{ReplayEntryKind, ReplayReader};
    use softrig_sim::{SimContext, Simulation, WorkerPool};

    use super::*;
    use crate::scenarios;

    #[test]
    fn test_recording_reads_back() {
        let mut sim = Simulation::with_pool(SimContext::default(), WorkerPool::inline());
        let id = sim.spawn(&scenarios::cube(), Vec3::new(0.0, 3.0, 0.0)).unwrap();
        let descriptor = sim.with_vehicle(id, describe).unwrap();
        assert_eq!(descriptor.node_count, 8);

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.replay");
        let mut recorder = Recorder::create(&path, &[(id, descriptor.clone())]).unwrap();
        for _ in 0..3 {
            sim.step(1.0 / 60.0);
            recorder.record(&sim.snapshot_reader().latest()).unwrap();
        }
        recorder
            .record_event(sim.time(), sim.frame(), &SimEvent::BeamBroken { vehicle: id, beam: 4 })
            .unwrap();
        recorder
            .record_event(sim.time(), sim.frame(), &SimEvent::VehicleReset { vehicle: VehicleId(9) })
            .unwrap();
        assert_eq!(recorder.finish(sim.time(), sim.frame()).unwrap(), 3);

        let mut reader = ReplayReader::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(reader.rigs(), &[descriptor]);
        let mut kinds = Vec::new();
        while let Some(entry) = reader.next_entry().unwrap() {
            kinds.push(entry.kind);
        }
        assert_eq!(
            kinds,
            vec![
                ReplayEntryKind::Frame,
                ReplayEntryKind::Frame,
                ReplayEntryKind::Frame,
                ReplayEntryKind::Event,
                ReplayEntryKind::End,
            ]
        );
    }
}

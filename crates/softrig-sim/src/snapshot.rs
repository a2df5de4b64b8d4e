//! Visual snapshots published by the physics thread.
//!
//! The physics thread is the only writer. Readers take the latest
//! [`FrameSnapshot`] without waiting for the current frame to finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use glam::Vec3;

use crate::adapters::{BeamVisual, RendererAdapter};
use crate::engine::Engine;
use crate::fleet::Fleet;
use crate::ids::VehicleId;
use crate::vehicle::{Vehicle, VehicleState};

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub state: VehicleState,
    pub positions: Vec<Vec3>,
    pub beams: Vec<BeamVisual>,
    pub wheel_rotations: Vec<f32>,
    pub audio: AudioCues,
}

/// Sound-relevant state of a vehicle at snapshot time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioCues {
    pub engine_rpm: Option<f32>,
    pub braking: bool,
    pub antilock: bool,
    pub traction: bool,
}

impl AudioCues {
    fn capture(vehicle: &Vehicle) -> Self {
        let brakes = vehicle.brakes();
        Self {
            engine_rpm: vehicle.engine().map(Engine::rpm),
            braking: brakes.brake > 0.0,
            antilock: brakes.antilock_active(),
            traction: brakes.traction_active(),
        }
    }
}

impl VehicleSnapshot {
    fn capture(vehicle: &Vehicle, fleet: &Fleet<'_>) -> Self {
        let positions: Vec<Vec3> = vehicle.nodes.iter().map(|n| n.abs_pos).collect();
        let beams = vehicle
            .beams
            .iter()
            .map(|b| {
                let p2 = match b.remote {
                    Some(remote) => fleet.get(remote.vehicle).and_then(|peer| peer.node_position(remote.node)),
                    None => positions.get(b.p2).copied(),
                };
                let p1 = positions.get(b.p1).copied().unwrap_or(vehicle.origin);
                BeamVisual {
                    p1,
                    p2: p2.unwrap_or(p1),
                    broken: b.broken,
                    scale: b.scale(),
                }
            })
            .collect();
        Self {
            id: vehicle.id,
            state: vehicle.state,
            positions,
            beams,
            wheel_rotations: vehicle.wheels.iter().map(|w| w.rotation).collect(),
            audio: AudioCues::capture(vehicle),
        }
    }
}

/// Everything a renderer needs for one visual frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSnapshot {
    /// Physics frames completed when this snapshot was taken.
    pub frame: u64,
    pub time: f64,
    pub vehicles: Vec<VehicleSnapshot>,
}

impl FrameSnapshot {
    pub(crate) fn capture(frame: u64, time: f64, fleet: &Fleet<'_>) -> Self {
        Self {
            frame,
            time,
            vehicles: fleet.iter().map(|v| VehicleSnapshot::capture(v, fleet)).collect(),
        }
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&VehicleSnapshot> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    /// Hand the node and beam data to a renderer.
    pub fn deliver(&self, renderer: &mut dyn RendererAdapter) {
        for v in &self.vehicles {
            renderer.update_nodes(v.id, &v.positions);
            renderer.update_beams(v.id, &v.beams);
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    latest: Mutex<Arc<FrameSnapshot>>,
    index: AtomicU64,
}

/// Write side, owned by the simulation.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    shared: Arc<Shared>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: FrameSnapshot) {
        let frame = snapshot.frame;
        *self.shared.latest.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        self.shared.index.store(frame, Ordering::Release);
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read side, cheap to clone and hand to visual threads.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    shared: Arc<Shared>,
}

impl SnapshotReader {
    /// Frame index of the newest snapshot.
    pub fn index(&self) -> u64 {
        self.shared.index.load(Ordering::Acquire)
    }

    pub fn latest(&self) -> Arc<FrameSnapshot> {
        Arc::clone(&self.shared.latest.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        nodes: Vec<(VehicleId, usize)>,
        beams: Vec<(VehicleId, usize)>,
    }

    impl RendererAdapter for Recorder {
        fn update_nodes(&mut self, vehicle: VehicleId, positions: &[Vec3]) {
            self.nodes.push((vehicle, positions.len()));
        }

        fn update_beams(&mut self, vehicle: VehicleId, beams: &[BeamVisual]) {
            self.beams.push((vehicle, beams.len()));
        }

        fn on_event(&mut self, _event: &crate::events::SimEvent) {}
    }

    fn snapshot(frame: u64) -> FrameSnapshot {
        FrameSnapshot {
            frame,
            time: frame as f64 * 0.01,
            vehicles: vec![VehicleSnapshot {
                id: VehicleId(2),
                state: VehicleState::Deactivated,
                positions: vec![Vec3::ZERO, Vec3::X],
                beams: vec![BeamVisual {
                    p1: Vec3::ZERO,
                    p2: Vec3::X,
                    broken: false,
                    scale: 1.0,
                }],
                wheel_rotations: Vec::new(),
                audio: AudioCues::default(),
            }],
        }
    }

    #[test]
    fn test_reader_sees_latest_publish() {
        let publisher = SnapshotPublisher::new();
        let reader = publisher.reader();
        assert_eq!(reader.index(), 0);
        assert!(reader.latest().vehicles.is_empty());

        publisher.publish(snapshot(1));
        publisher.publish(snapshot(2));
        assert_eq!(reader.index(), 2);
        assert_eq!(reader.latest().frame, 2);
    }

    #[test]
    fn test_deliver_feeds_renderer() {
        let mut recorder = Recorder::default();
        snapshot(1).deliver(&mut recorder);
        assert_eq!(recorder.nodes, vec![(VehicleId(2), 2)]);
        assert_eq!(recorder.beams, vec![(VehicleId(2), 1)]);
    }

    #[test]
    fn test_lookup_by_id() {
        let snap = snapshot(1);
        assert!(snap.vehicle(VehicleId(2)).is_some());
        assert!(snap.vehicle(VehicleId(3)).is_none());
    }
}

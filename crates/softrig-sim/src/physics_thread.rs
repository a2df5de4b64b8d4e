//! A dedicated thread that owns the [`Simulation`].
//!
//! The host sends frames and calls over a channel; events come back on a
//! second channel and visual state through the published snapshot.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::error::SimError;
use crate::events::SimEvent;
use crate::simulation::Simulation;
use crate::snapshot::{FrameSnapshot, SnapshotReader};

type Call = Box<dyn FnOnce(&mut Simulation) + Send + 'static>;

enum Command {
    Step(f32),
    Call(Call),
    Shutdown,
}

pub struct PhysicsThread {
    commands: Sender<Command>,
    events: Receiver<SimEvent>,
    snapshots: SnapshotReader,
    handle: Option<JoinHandle<Simulation>>,
}

impl std::fmt::Debug for PhysicsThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsThread")
            .field("frame", &self.snapshots.index())
            .field("running", &self.handle.is_some())
            .finish()
    }
}

fn run(mut sim: Simulation, commands: Receiver<Command>, events: Sender<SimEvent>) -> Simulation {
    tracing::debug!("physics thread started");
    while let Ok(command) = commands.recv() {
        match command {
            Command::Step(frame_dt) => {
                sim.step(frame_dt);
            }
            Command::Call(call) => call(&mut sim),
            Command::Shutdown => break,
        }
        for event in sim.drain_events() {
            if events.send(event).is_err() {
                break;
            }
        }
    }
    tracing::debug!(frames = sim.frame(), "physics thread stopped");
    sim
}

impl PhysicsThread {
    /// Move `sim` onto a new thread named `softrig-physics`.
    pub fn spawn(sim: Simulation) -> std::io::Result<Self> {
        let (commands, command_rx) = unbounded();
        let (event_tx, events) = unbounded();
        let snapshots = sim.snapshot_reader();
        let handle = std::thread::Builder::new()
            .name("softrig-physics".into())
            .spawn(move || run(sim, command_rx, event_tx))?;
        Ok(Self {
            commands,
            events,
            snapshots,
            handle: Some(handle),
        })
    }

    /// Queue one visual frame. Returns immediately.
    pub fn step(&self, frame_dt: f32) -> Result<(), SimError> {
        self.commands
            .send(Command::Step(frame_dt))
            .map_err(|_| SimError::ThreadStopped)
    }

    /// Run `f` on the physics thread between frames and wait for its
    /// result.
    pub fn call<R, F>(&self, f: F) -> Result<R, SimError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Simulation) -> R + Send + 'static,
    {
        let (reply, result) = bounded(1);
        let call: Call = Box::new(move |sim| {
            let _ = reply.send(f(sim));
        });
        self.commands
            .send(Command::Call(call))
            .map_err(|_| SimError::ThreadStopped)?;
        result.recv().map_err(|_| SimError::ThreadStopped)
    }

    /// Block until every queued command has been processed.
    pub fn sync(&self) -> Result<(), SimError> {
        self.call(|_| ())
    }

    /// Events produced since the last call.
    pub fn drain_events(&self) -> Vec<SimEvent> {
        self.events.try_iter().collect()
    }

    pub fn snapshots(&self) -> SnapshotReader {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Arc<FrameSnapshot> {
        self.snapshots.latest()
    }

    /// Stop the thread and take the simulation back. `None` when the
    /// thread panicked.
    pub fn shutdown(mut self) -> Option<Simulation> {
        self.stop()
    }

    fn stop(&mut self) -> Option<Simulation> {
        let handle = self.handle.take()?;
        let _ = self.commands.send(Command::Shutdown);
        match handle.join() {
            Ok(sim) => Some(sim),
            Err(_) => {
                tracing::error!("physics thread panicked");
                None
            }
        }
    }
}

impl Drop for PhysicsThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::context::SimContext;
    use crate::def::{BeamDef, NodeDef, VehicleDef};
    use crate::pool::WorkerPool;

    fn rod() -> VehicleDef {
        VehicleDef {
            name: "rod".to_string(),
            nodes: vec![NodeDef::at(0.0, 0.0, 0.0), NodeDef::at(1.0, 0.0, 0.0)],
            beams: vec![BeamDef::between(0, 1)],
            ..VehicleDef::default()
        }
    }

    fn thread() -> PhysicsThread {
        PhysicsThread::spawn(Simulation::with_pool(SimContext::default(), WorkerPool::inline())).unwrap()
    }

    #[test]
    fn test_calls_run_in_order_with_frames() {
        let physics = thread();
        let id = physics
            .call(|sim| sim.spawn(&rod(), Vec3::new(0.0, 20.0, 0.0)))
            .unwrap()
            .unwrap();
        for _ in 0..5 {
            physics.step(0.01).unwrap();
        }
        let frame = physics.call(|sim| sim.frame()).unwrap();
        assert_eq!(frame, 5);
        assert_eq!(physics.latest().frame, 5);
        assert!(physics.latest().vehicle(id).is_some());
    }

    #[test]
    fn test_events_are_forwarded() {
        let physics = thread();
        physics.call(|sim| sim.spawn(&rod(), Vec3::ZERO)).unwrap().unwrap();
        physics.sync().unwrap();
        let events = physics.drain_events();
        assert!(matches!(events.as_slice(), [SimEvent::VehicleSpawned { .. }]));
        assert!(physics.drain_events().is_empty());
    }

    #[test]
    fn test_shutdown_returns_simulation() {
        let physics = thread();
        physics.call(|sim| sim.spawn(&rod(), Vec3::ZERO)).unwrap().unwrap();
        physics.step(0.02).unwrap();
        let sim = physics.shutdown().expect("clean shutdown");
        assert_eq!(sim.vehicle_count(), 1);
        assert_eq!(sim.frame(), 1);
    }

    #[test]
    fn test_panicking_call_stops_the_thread() {
        let physics = thread();
        let result = physics.call(|_| -> u32 { panic!("bad call") });
        assert!(matches!(result, Err(SimError::ThreadStopped)));
        assert!(physics.shutdown().is_none());
    }
}

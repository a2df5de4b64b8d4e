//! Turns published snapshots and simulation events into sound triggers.

use rustc_hash::FxHashMap;

use crate::adapters::{AudioAdapter, sounds};
use crate::events::SimEvent;
use crate::ids::VehicleId;
use crate::snapshot::{AudioCues, FrameSnapshot};

/// Remembers what each vehicle sounded like on the previous frame so
/// looping sounds are started and stopped on edges only.
#[derive(Debug, Default)]
pub struct AudioRelay {
    playing: FxHashMap<VehicleId, AudioCues>,
}

fn looping(cues: &AudioCues) -> [(i32, bool); 3] {
    [
        (sounds::BRAKE, cues.braking),
        (sounds::ANTILOCK, cues.antilock),
        (sounds::TRACTION, cues.traction),
    ]
}

impl AudioRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modulate engines and toggle looping sounds for one visual frame.
    pub fn deliver(&mut self, snapshot: &FrameSnapshot, audio: &mut dyn AudioAdapter) {
        for v in &snapshot.vehicles {
            let before = self.playing.insert(v.id, v.audio).unwrap_or_default();
            if let Some(rpm) = v.audio.engine_rpm {
                audio.modulate(v.id, sounds::ENGINE, rpm);
            }
            for ((sound, was), (_, now)) in looping(&before).into_iter().zip(looping(&v.audio)) {
                match (was, now) {
                    (false, true) => audio.trig_start(v.id, sound),
                    (true, false) => audio.trig_stop(v.id, sound),
                    _ => {}
                }
            }
        }
    }

    /// One-shot sounds for events; silences removed vehicles.
    pub fn on_event(&mut self, event: &SimEvent, audio: &mut dyn AudioAdapter) {
        match event {
            SimEvent::BeamBroken { vehicle, .. } => audio.trig_start(*vehicle, sounds::BEAM_BREAK),
            SimEvent::VehicleRemoved { vehicle, .. } => {
                if let Some(cues) = self.playing.remove(vehicle) {
                    for (sound, on) in looping(&cues) {
                        if on {
                            audio.trig_stop(*vehicle, sound);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::def::{BeamDef, NodeDef, VehicleDef};
    use crate::engine::EngineDef;
    use crate::snapshot::VehicleSnapshot;
    use crate::vehicle::VehicleState;
    use crate::{SimContext, Simulation, WorkerPool};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Start(VehicleId, i32),
        Stop(VehicleId, i32),
        Modulate(VehicleId, i32, f32),
    }

    #[derive(Default)]
    struct Recording(Vec<Call>);

    impl AudioAdapter for Recording {
        fn trig_start(&mut self, vehicle: VehicleId, sound: i32) {
            self.0.push(Call::Start(vehicle, sound));
        }

        fn trig_stop(&mut self, vehicle: VehicleId, sound: i32) {
            self.0.push(Call::Stop(vehicle, sound));
        }

        fn modulate(&mut self, vehicle: VehicleId, sound: i32, value: f32) {
            self.0.push(Call::Modulate(vehicle, sound, value));
        }
    }

    fn frame(id: VehicleId, audio: AudioCues) -> FrameSnapshot {
        FrameSnapshot {
            frame: 1,
            time: 0.0,
            vehicles: vec![VehicleSnapshot {
                id,
                state: VehicleState::Activated,
                positions: Vec::new(),
                beams: Vec::new(),
                wheel_rotations: Vec::new(),
                audio,
            }],
        }
    }

    #[test]
    fn test_looping_sounds_toggle_on_edges() {
        let id = VehicleId(1);
        let mut relay = AudioRelay::new();
        let mut out = Recording::default();
        let braking = AudioCues {
            engine_rpm: Some(800.0),
            braking: true,
            antilock: true,
            traction: false,
        };
        relay.deliver(&frame(id, braking), &mut out);
        relay.deliver(&frame(id, braking), &mut out);
        relay.deliver(
            &frame(
                id,
                AudioCues {
                    antilock: false,
                    ..braking
                },
            ),
            &mut out,
        );
        assert_eq!(
            out.0,
            vec![
                Call::Modulate(id, sounds::ENGINE, 800.0),
                Call::Start(id, sounds::BRAKE),
                Call::Start(id, sounds::ANTILOCK),
                Call::Modulate(id, sounds::ENGINE, 800.0),
                Call::Modulate(id, sounds::ENGINE, 800.0),
                Call::Stop(id, sounds::ANTILOCK),
            ]
        );
    }

    #[test]
    fn test_events_trigger_sounds() {
        let id = VehicleId(3);
        let mut relay = AudioRelay::new();
        let mut out = Recording::default();
        relay.deliver(
            &frame(
                id,
                AudioCues {
                    braking: true,
                    ..AudioCues::default()
                },
            ),
            &mut out,
        );
        out.0.clear();

        relay.on_event(&SimEvent::BeamBroken { vehicle: id, beam: 0 }, &mut out);
        relay.on_event(
            &SimEvent::VehicleRemoved {
                vehicle: id,
                scene_handles: Vec::new(),
            },
            &mut out,
        );
        assert_eq!(out.0, vec![Call::Start(id, sounds::BEAM_BREAK), Call::Stop(id, sounds::BRAKE)]);
    }

    #[test]
    fn test_simulated_vehicle_feeds_audio() {
        let mut sim = Simulation::with_pool(SimContext::default(), WorkerPool::inline());
        let def = VehicleDef {
            name: "audible".to_string(),
            nodes: vec![NodeDef::at(0.0, 0.0, 0.0), NodeDef::at(1.0, 0.0, 0.0)],
            beams: vec![BeamDef::between(0, 1)],
            engine: Some(EngineDef::default()),
            ..VehicleDef::default()
        };
        let id = sim.spawn(&def, Vec3::new(0.0, 2.0, 0.0)).unwrap();
        sim.step(1.0 / 60.0);

        let mut relay = AudioRelay::new();
        let mut out = Recording::default();
        relay.deliver(&sim.snapshot_reader().latest(), &mut out);
        assert!(out.0.iter().any(|c| matches!(c, Call::Modulate(v, sounds::ENGINE, _) if *v == id)));
    }
}

//! Sending and receiving vehicle state over the stream codec.

use glam::Vec3;
use softrig_net::{
    CompressionConfig, NetEngineMode, NetMask, NetworkInterpolator, StreamFrame, StreamRegistration,
    VehicleStateHeader, decode_stream_frame, encode_stream_frame,
};

use crate::engine::TransmissionMode;
use crate::events::SimEvent;
use crate::vehicle::{Vehicle, VehicleState};

/// Receive side of a remote vehicle.
#[derive(Debug)]
pub struct NetworkLink {
    registration: StreamRegistration,
    interpolator: NetworkInterpolator,
    last_header: Option<VehicleStateHeader>,
}

impl NetworkLink {
    pub fn new(registration: StreamRegistration, offset_ms: i32) -> Self {
        Self {
            registration,
            interpolator: NetworkInterpolator::new(offset_ms),
            last_header: None,
        }
    }

    pub fn registration(&self) -> &StreamRegistration {
        &self.registration
    }

    pub fn frames_received(&self) -> u64 {
        self.interpolator.frames_received()
    }

    pub fn last_header(&self) -> Option<&VehicleStateHeader> {
        self.last_header.as_ref()
    }
}

fn transmission_mode(mode: NetEngineMode) -> TransmissionMode {
    match mode {
        NetEngineMode::Automatic => TransmissionMode::Automatic,
        NetEngineMode::SemiAuto => TransmissionMode::SemiAuto,
        NetEngineMode::Manual => TransmissionMode::Manual,
        NetEngineMode::ManualStick => TransmissionMode::ManualStick,
        NetEngineMode::ManualRanges => TransmissionMode::ManualRanges,
    }
}

impl Vehicle {
    /// Stream registration describing this vehicle's frame layout.
    pub fn stream_registration(&self) -> StreamRegistration {
        StreamRegistration {
            name: self.name.clone(),
            node_count: self.nodes.len() as u32,
            wheel_count: self.wheels.len() as u32,
        }
    }

    /// Header of an outgoing frame at `time_ms`.
    pub fn state_header(&self, time_ms: i32) -> VehicleStateHeader {
        let (engine_speed, engine_force, engine_clutch, engine_gear) = self
            .engine
            .as_ref()
            .map_or((0.0, 0.0, 0.0, 0), |e| (e.rpm(), e.acc(), e.clutch(), e.gear()));
        VehicleStateHeader {
            time: time_ms,
            engine_speed,
            engine_force,
            engine_clutch,
            engine_gear,
            hydrodirstate: self.controls.hydro_dir_state,
            brake: self.brakes.brake,
            wheelspeed: self.wheel_speed,
            flagmask: self.status_mask().0,
        }
    }

    /// Encode the current state as a wire payload.
    pub fn encode_state(&self, time_ms: i32, compression: &CompressionConfig) -> Vec<u8> {
        let frame = StreamFrame {
            header: self.state_header(time_ms),
            positions: self.nodes.iter().map(|n| n.abs_pos).collect(),
            wheel_rotations: self.wheels.iter().map(|w| w.rotation).collect(),
        };
        encode_stream_frame(&frame, compression)
    }

    /// Hand the vehicle over to remote control.
    pub(crate) fn make_networked(&mut self, registration: StreamRegistration, offset_ms: i32) {
        self.network = Some(NetworkLink::new(registration, offset_ms));
        self.set_state(VehicleState::Networked);
    }

    /// Accept a received payload. A payload that does not match the
    /// registered layout marks the vehicle invalid; it is not integrated
    /// any more.
    pub fn receive_state(&mut self, payload: &[u8]) -> bool {
        if self.state != VehicleState::Networked {
            return false;
        }
        let Some(link) = &mut self.network else {
            return false;
        };
        let layout = link.registration.layout();
        match decode_stream_frame(payload, layout) {
            Ok(frame) => {
                link.last_header = Some(frame.header);
                link.interpolator.push(frame);
                true
            }
            Err(e) => {
                let expected = softrig_net::VehicleStateHeader::SIZE + layout.byte_len();
                tracing::warn!(vehicle = %self.id, error = %e, "invalid stream frame");
                let id = self.id;
                self.emit(SimEvent::NetworkDesync {
                    vehicle: id,
                    expected,
                    actual: payload.len(),
                });
                self.set_state(VehicleState::NetworkedInvalid);
                false
            }
        }
    }

    /// Place the nodes at the interpolated remote state for `local_ms`.
    pub(crate) fn update_networked(&mut self, local_ms: i32) {
        let Some(link) = &mut self.network else {
            return;
        };
        let Some(state) = link.interpolator.sample(local_ms) else {
            return;
        };
        if state.positions.len() != self.nodes.len() {
            return;
        }
        let origin = state.positions.first().copied().unwrap_or(Vec3::ZERO);
        self.origin = origin;
        for (node, pos) in self.nodes.iter_mut().zip(&state.positions) {
            node.set_position(origin, *pos - origin);
            node.velocity = Vec3::ZERO;
        }
        for (wheel, rotation) in self.wheels.iter_mut().zip(&state.wheel_rotations) {
            wheel.rotation = *rotation;
        }

        let header = state.header;
        let flags = header.flags();
        if let Some(engine) = &mut self.engine {
            let mode = flags.engine_mode().map_or(engine.mode(), transmission_mode);
            engine.apply_network_state(
                header.engine_speed,
                header.engine_force,
                header.engine_clutch,
                header.engine_gear,
                flags.contains(NetMask::ENGINE_RUN),
                flags.contains(NetMask::ENGINE_CONT),
                mode,
            );
        }
        self.controls.hydro_dir_state = header.hydrodirstate;
        self.brakes.brake = header.brake;
        self.brakes.parking = flags.contains(NetMask::PBRAKE);
        self.wheel_speed = header.wheelspeed;

        let lights = NetMask(
            flags.0
                & (NetMask::HORN
                    | NetMask::LIGHTS
                    | NetMask::BEACONS
                    | NetMask::BLINK_LEFT
                    | NetMask::BLINK_RIGHT
                    | NetMask::BLINK_WARN
                    | NetMask::CLIGHT1
                    | NetMask::CLIGHT2
                    | NetMask::CLIGHT3
                    | NetMask::CLIGHT4)
                    .0,
        );
        if lights != self.lights {
            self.lights = lights;
            let id = self.id;
            self.emit(SimEvent::LightsChanged { vehicle: id, lights });
        }
        self.update_bounds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{BeamDef, NodeDef, VehicleDef};
    use crate::engine::EngineDef;
    use crate::ids::VehicleId;

    fn truck(id: u32) -> Vehicle {
        let def = VehicleDef {
            name: "truck".to_string(),
            nodes: vec![NodeDef::at(0.0, 1.0, 0.0), NodeDef::at(1.0, 1.0, 0.0), NodeDef::at(0.0, 2.0, 0.0)],
            beams: vec![BeamDef::between(0, 1), BeamDef::between(1, 2), BeamDef::between(2, 0)],
            engine: Some(EngineDef::default()),
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(id), &def, Vec3::new(5.0, 0.0, 5.0), &SimContext::default()).expect("valid")
    }

    fn remote_of(local: &Vehicle) -> Vehicle {
        let mut remote = truck(9);
        remote.make_networked(local.stream_registration(), 0);
        remote
    }

    #[test]
    fn test_remote_follows_sent_frames() {
        let mut local = truck(1);
        let mut remote = remote_of(&local);
        let compression = CompressionConfig::default();

        assert!(remote.receive_state(&local.encode_state(0, &compression)));
        local.translate_to(Vec3::new(15.0, 1.0, 5.0));
        assert!(remote.receive_state(&local.encode_state(100, &compression)));

        remote.update_networked(100);
        for (a, b) in remote.nodes().iter().zip(local.nodes()) {
            assert!(a.abs_pos.distance(b.abs_pos) < 2.0 / 300.0);
            assert_eq!(a.abs_pos, remote.origin() + a.rel_pos);
        }
    }

    #[test]
    fn test_engine_mode_first_bit_wins() {
        let mut local = truck(1);
        let mut remote = remote_of(&local);
        local.lights.insert(NetMask::ENGINE_MODE_MANUAL_STICK);
        let payload = local.encode_state(0, &CompressionConfig::default());
        remote.receive_state(&payload);
        remote.update_networked(0);
        let engine = remote.engine().expect("engine");
        assert_eq!(engine.mode(), TransmissionMode::Automatic);
    }

    #[test]
    fn test_size_mismatch_invalidates() {
        let local = truck(1);
        let mut remote = remote_of(&local);
        let mut payload = local.encode_state(0, &CompressionConfig { threshold: 0, enabled: false });
        payload.extend_from_slice(&[0, 0, 0, 0]);
        assert!(!remote.receive_state(&payload));
        assert_eq!(remote.state(), VehicleState::NetworkedInvalid);
        assert!(remote.events.iter().any(|e| matches!(e, SimEvent::NetworkDesync { .. })));
        assert!(!remote.receive_state(&local.encode_state(0, &CompressionConfig::default())));
    }

    #[test]
    fn test_header_mirrors_controls() {
        let mut local = truck(1);
        local.brakes.brake = 1200.0;
        local.wheel_speed = 12.5;
        local.lights.insert(NetMask::LIGHTS);
        let header = local.state_header(42);
        assert_eq!(header.time, 42);
        assert_eq!(header.brake, 1200.0);
        assert_eq!(header.wheelspeed, 12.5);
        let flags = header.flags();
        assert!(flags.contains(NetMask::LIGHTS) && flags.contains(NetMask::BRAKES));
    }
}

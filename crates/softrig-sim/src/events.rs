//! Notifications produced by the simulation for renderers, audio and UI.

use softrig_net::NetMask;

use crate::ids::{NodeRef, VehicleId};
use crate::vehicle::VehicleState;

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    VehicleSpawned {
        vehicle: VehicleId,
        name: String,
    },
    /// The vehicle is gone; renderers release the listed scene handles.
    VehicleRemoved {
        vehicle: VehicleId,
        scene_handles: Vec<u64>,
    },
    StateChanged {
        vehicle: VehicleId,
        from: VehicleState,
        to: VehicleState,
    },
    BeamBroken {
        vehicle: VehicleId,
        beam: usize,
    },
    BeamDeformed {
        vehicle: VehicleId,
        beam: usize,
    },
    WheelDetached {
        vehicle: VehicleId,
        wheel: usize,
    },
    HookLocked {
        vehicle: VehicleId,
        hook: usize,
        target: NodeRef,
    },
    HookUnlocked {
        vehicle: VehicleId,
        hook: usize,
    },
    TieChanged {
        vehicle: VehicleId,
        tie: usize,
        tied: bool,
    },
    RopeChanged {
        vehicle: VehicleId,
        rope: usize,
        locked: bool,
    },
    SlideNodeChanged {
        vehicle: VehicleId,
        slide_node: usize,
        attached: bool,
    },
    /// The transitive set of coupled vehicles changed; skeleton and debug
    /// visibility should follow `linked`.
    LinkedSetChanged {
        vehicle: VehicleId,
        linked: Vec<VehicleId>,
    },
    LightsChanged {
        vehicle: VehicleId,
        lights: NetMask,
    },
    /// The numeric guard fired and the vehicle was reset in place.
    VehicleReset {
        vehicle: VehicleId,
    },
    NetworkDesync {
        vehicle: VehicleId,
        expected: usize,
        actual: usize,
    },
}

impl SimEvent {
    pub fn vehicle(&self) -> VehicleId {
        match self {
            SimEvent::VehicleSpawned { vehicle, .. }
            | SimEvent::VehicleRemoved { vehicle, .. }
            | SimEvent::StateChanged { vehicle, .. }
            | SimEvent::BeamBroken { vehicle, .. }
            | SimEvent::BeamDeformed { vehicle, .. }
            | SimEvent::WheelDetached { vehicle, .. }
            | SimEvent::HookLocked { vehicle, .. }
            | SimEvent::HookUnlocked { vehicle, .. }
            | SimEvent::TieChanged { vehicle, .. }
            | SimEvent::RopeChanged { vehicle, .. }
            | SimEvent::SlideNodeChanged { vehicle, .. }
            | SimEvent::LinkedSetChanged { vehicle, .. }
            | SimEvent::LightsChanged { vehicle, .. }
            | SimEvent::VehicleReset { vehicle }
            | SimEvent::NetworkDesync { vehicle, .. } => *vehicle,
        }
    }
}

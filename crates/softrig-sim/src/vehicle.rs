//! A simulated vehicle: its mesh, drivetrain, controls and couplers.
//!
//! The force kernels live in their own modules as `impl Vehicle` blocks;
//! this module holds the state, the lifecycle and the public accessors.

use std::sync::Arc;

use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use softrig_math::Aabb;
use softrig_net::NetMask;

use crate::beam::Beam;
use crate::brakes::Brakes;
use crate::collision::{CabRate, CollisionCab, PointDetector};
use crate::commands::{CommandKey, Rotator};
use crate::controls::Controls;
use crate::couplers::{CouplerRequest, Hook, Rail, Ropable, Rope, SlideNode, Tie};
use crate::cruise::CruiseControl;
use crate::differential::Axle;
use crate::engine::Engine;
use crate::events::SimEvent;
use crate::hydros::Hydro;
use crate::ids::VehicleId;
use crate::network::NetworkLink;
use crate::node::{Node, WetState};
use crate::replay::ReplayBuffer;
use crate::rigidifier::Rigidifier;
use crate::shocks::Shock;
use crate::stabilizer::Stabilizer;
use crate::topology::Topology;
use crate::wheels::Wheel;

/// Simulation state of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleState {
    /// Simulated and focused by the player.
    Activated,
    /// Simulated, not focused.
    Deactivated,
    /// Resting; sleeps once its whole linked set rests too.
    MaySleep,
    /// Falls asleep at the next frame boundary.
    GoSleep,
    Sleeping,
    /// Driven by received network frames.
    Networked,
    /// Received frames did not match the declared layout.
    NetworkedInvalid,
    /// Parked out of the simulation, waiting to be reused.
    Recycle,
    Deleting,
}

impl VehicleState {
    /// Runs the force kernels this frame.
    pub fn is_simulated(self) -> bool {
        matches!(
            self,
            VehicleState::Activated | VehicleState::Deactivated | VehicleState::MaySleep | VehicleState::GoSleep
        )
    }

    /// Takes part in collisions and coupler searches.
    pub fn is_awake(self) -> bool {
        self.is_simulated() || self == VehicleState::Networked
    }

    pub fn is_networked(self) -> bool {
        matches!(self, VehicleState::Networked | VehicleState::NetworkedInvalid)
    }
}

/// Sub-step phase of replay sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ReplayClock {
    pub accumulator: f32,
}

pub struct Vehicle {
    pub(crate) id: VehicleId,
    pub(crate) name: String,
    pub(crate) state: VehicleState,
    pub(crate) origin: Vec3,

    pub(crate) nodes: Vec<Node>,
    pub(crate) beams: Vec<Beam>,
    pub(crate) topology: Arc<Topology>,
    pub(crate) shocks: Vec<Shock>,
    pub(crate) rigidifiers: Vec<Rigidifier>,

    pub(crate) cabs: Vec<CollisionCab>,
    pub(crate) intra_rates: Vec<CabRate>,
    pub(crate) inter_rates: Vec<CabRate>,
    pub(crate) collision_range: f32,
    pub(crate) contacters: Vec<usize>,
    pub(crate) intra_detector: PointDetector,

    pub(crate) wheels: Vec<Wheel>,
    pub(crate) axles: Vec<Axle>,
    /// Twist of the locked shafts between consecutive axles.
    pub(crate) shaft_twist: Vec<f32>,
    pub(crate) engine: Option<Engine>,
    pub(crate) brakes: Brakes,
    pub(crate) cruise: CruiseControl,
    pub(crate) controls: Controls,
    pub(crate) hydros: Vec<Hydro>,
    /// Indexed by key id; slot 0 is unused.
    pub(crate) commands: Vec<CommandKey>,
    pub(crate) rotators: Vec<Rotator>,
    pub(crate) stabilizer: Option<Stabilizer>,

    pub(crate) hooks: Vec<Hook>,
    pub(crate) ties: Vec<Tie>,
    pub(crate) ropes: Vec<Rope>,
    pub(crate) ropables: Vec<Ropable>,
    pub(crate) rails: Vec<Rail>,
    pub(crate) slide_nodes: Vec<SlideNode>,
    pub(crate) pending_couplers: Vec<CouplerRequest>,
    pub(crate) couplers_changed: bool,
    pub(crate) linked: Vec<VehicleId>,

    pub(crate) replay: Option<ReplayBuffer>,
    pub(crate) replay_clock: ReplayClock,
    /// Frame offset being shown while replaying.
    pub(crate) replay_offset: Option<isize>,
    pub(crate) network: Option<NetworkLink>,

    pub(crate) bounds: Aabb,
    pub(crate) predicted_bounds: Aabb,
    pub(crate) reset_requested: bool,
    pub(crate) last_good_position: Vec3,
    /// Ground-test every node on the next sub-step.
    pub(crate) increased_accuracy: bool,

    pub(crate) events: Vec<SimEvent>,
    pub(crate) deformed: Vec<usize>,
    pub(crate) external_forces: Vec<(usize, Vec3)>,
    pub(crate) lights: NetMask,

    pub(crate) wheel_speed: f32,
    pub(crate) odometer_total: f32,
    pub(crate) odometer_user: f32,

    pub(crate) sleep_counter: u32,
    pub(crate) sleep_reference: Vec3,
    pub(crate) substep: u64,
    pub(crate) sim_time: f64,
    pub(crate) rng: SmallRng,
}

impl std::fmt::Debug for Vehicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vehicle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nodes", &self.nodes.len())
            .field("beams", &self.beams.len())
            .field("wheels", &self.wheels.len())
            .finish_non_exhaustive()
    }
}

impl Vehicle {
    /// An empty vehicle; [`crate::builder`] fills it from a description.
    pub(crate) fn empty(id: VehicleId, name: String, origin: Vec3) -> Self {
        Self {
            id,
            name,
            state: VehicleState::Deactivated,
            origin,
            nodes: Vec::new(),
            beams: Vec::new(),
            topology: Arc::new(Topology::default()),
            shocks: Vec::new(),
            rigidifiers: Vec::new(),
            cabs: Vec::new(),
            intra_rates: Vec::new(),
            inter_rates: Vec::new(),
            collision_range: crate::constants::DEFAULT_COLLISION_RANGE,
            contacters: Vec::new(),
            intra_detector: PointDetector::new(),
            wheels: Vec::new(),
            axles: Vec::new(),
            shaft_twist: Vec::new(),
            engine: None,
            brakes: Brakes::new(&Default::default()),
            cruise: CruiseControl::default(),
            controls: Controls::default(),
            hydros: Vec::new(),
            commands: (0..=crate::constants::MAX_COMMANDS).map(|_| CommandKey::default()).collect(),
            rotators: Vec::new(),
            stabilizer: None,
            hooks: Vec::new(),
            ties: Vec::new(),
            ropes: Vec::new(),
            ropables: Vec::new(),
            rails: Vec::new(),
            slide_nodes: Vec::new(),
            pending_couplers: Vec::new(),
            couplers_changed: false,
            linked: vec![id],
            replay: None,
            replay_clock: ReplayClock::default(),
            replay_offset: None,
            network: None,
            bounds: Aabb::EMPTY,
            predicted_bounds: Aabb::EMPTY,
            reset_requested: false,
            last_good_position: origin,
            increased_accuracy: false,
            events: Vec::new(),
            deformed: Vec::new(),
            external_forces: Vec::new(),
            lights: NetMask::empty(),
            wheel_speed: 0.0,
            odometer_total: 0.0,
            odometer_user: 0.0,
            sleep_counter: 0,
            sleep_reference: origin,
            substep: 0,
            sim_time: 0.0,
            rng: SmallRng::seed_from_u64(u64::from(id.0)),
        }
    }

    pub fn id(&self) -> VehicleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    pub fn shocks(&self) -> &[Shock] {
        &self.shocks
    }

    pub fn wheels(&self) -> &[Wheel] {
        &self.wheels
    }

    pub fn axles(&self) -> &[Axle] {
        &self.axles
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    pub fn ties(&self) -> &[Tie] {
        &self.ties
    }

    pub fn ropes(&self) -> &[Rope] {
        &self.ropes
    }

    pub fn slide_nodes(&self) -> &[SlideNode] {
        &self.slide_nodes
    }

    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut Engine> {
        self.engine.as_mut()
    }

    pub fn brakes(&self) -> &Brakes {
        &self.brakes
    }

    pub fn brakes_mut(&mut self) -> &mut Brakes {
        &mut self.brakes
    }

    pub fn cruise(&self) -> &CruiseControl {
        &self.cruise
    }

    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut Controls {
        &mut self.controls
    }

    pub fn command_key(&self, key: usize) -> Option<&CommandKey> {
        self.commands.get(key).filter(|_| key > 0)
    }

    /// Player input of a command key, in `[0, 1]`.
    pub fn set_command_input(&mut self, key: usize, value: f32) {
        if let Some(k) = self.commands.get_mut(key).filter(|_| key > 0) {
            k.player = value.clamp(0.0, 1.0);
        }
    }

    pub fn rotators(&self) -> &[Rotator] {
        &self.rotators
    }

    pub fn hydros(&self) -> &[Hydro] {
        &self.hydros
    }

    pub fn stabilizer(&self) -> Option<&Stabilizer> {
        self.stabilizer.as_ref()
    }

    pub fn linked(&self) -> &[VehicleId] {
        &self.linked
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn predicted_bounds(&self) -> Aabb {
        self.predicted_bounds
    }

    pub fn wheel_speed(&self) -> f32 {
        self.wheel_speed
    }

    /// Distance driven in metres since spawn and since the last trip reset.
    pub fn odometer(&self) -> (f32, f32) {
        (self.odometer_total, self.odometer_user)
    }

    pub fn reset_trip(&mut self) {
        self.odometer_user = 0.0;
    }

    /// Renderer handles registered on the beams.
    pub fn scene_handles(&self) -> Vec<u64> {
        self.beams.iter().filter_map(|b| b.scene_handle).collect()
    }

    pub fn set_scene_handle(&mut self, beam: usize, handle: u64) {
        if let Some(b) = self.beams.get_mut(beam) {
            b.scene_handle = Some(handle);
        }
    }

    pub fn lights(&self) -> NetMask {
        self.lights
    }

    pub fn is_replaying(&self) -> bool {
        self.replay_offset.is_some()
    }

    pub fn replay_buffer(&self) -> Option<&ReplayBuffer> {
        self.replay.as_ref()
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn substeps(&self) -> u64 {
        self.substep
    }

    pub fn node_position(&self, node: usize) -> Option<Vec3> {
        self.nodes.get(node).map(|n| n.abs_pos)
    }

    /// Mass-weighted centre of all nodes.
    pub fn center_of_mass(&self) -> Vec3 {
        let (sum, mass) = self
            .nodes
            .iter()
            .fold((Vec3::ZERO, 0.0), |(s, m), n| (s + n.abs_pos * n.mass(), m + n.mass()));
        if mass > 0.0 { sum / mass } else { self.origin }
    }

    /// Mean velocity of the nodes that are not part of a wheel.
    pub fn chassis_velocity(&self) -> Vec3 {
        let (sum, count) = self
            .nodes
            .iter()
            .filter(|n| !n.is_wheel)
            .fold((Vec3::ZERO, 0u32), |(s, c), n| (s + n.velocity, c + 1));
        if count > 0 { sum / count as f32 } else { Vec3::ZERO }
    }

    pub fn total_mass(&self) -> f32 {
        self.nodes.iter().map(Node::mass).sum()
    }

    pub fn set_node_velocity(&mut self, node: usize, velocity: Vec3) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.velocity = velocity;
        }
    }

    /// Give every node the same velocity.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        for n in &mut self.nodes {
            n.velocity = velocity;
        }
    }

    /// Force applied on the next sub-step only.
    pub fn add_external_force(&mut self, node: usize, force: Vec3) {
        if node < self.nodes.len() && force.is_finite() {
            self.external_forces.push((node, force));
        }
    }

    /// Ask for a reset at the next sub-step boundary.
    pub fn request_reset(&mut self) {
        self.reset_requested = true;
    }

    pub(crate) fn emit(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub(crate) fn set_state(&mut self, to: VehicleState) {
        if self.state != to {
            tracing::debug!(vehicle = %self.id, from = ?self.state, to = ?to, "vehicle state");
            self.events.push(SimEvent::StateChanged {
                vehicle: self.id,
                from: self.state,
                to,
            });
            self.state = to;
        }
    }

    /// Move the whole vehicle so that node 0 sits at `position`, keeping
    /// its shape.
    pub fn translate_to(&mut self, position: Vec3) {
        let Some(first) = self.nodes.first() else {
            return;
        };
        let delta = position - first.abs_pos;
        self.origin += delta;
        for n in &mut self.nodes {
            n.abs_pos = self.origin + n.rel_pos;
        }
        self.bounds = self.bounds.translated(delta);
        self.predicted_bounds = self.predicted_bounds.translated(delta);
    }

    /// Rebuild the vehicle at `position` in its spawn shape: nodes at rest,
    /// beams restored, transient drivetrain and control state cleared.
    pub(crate) fn sync_reset(&mut self, position: Vec3) {
        let base = self.nodes.first().map(|n| n.initial_pos).unwrap_or(Vec3::ZERO);
        self.origin = position;
        for n in &mut self.nodes {
            n.set_position(position, n.initial_pos - base);
            n.velocity = Vec3::ZERO;
            n.forces = Vec3::ZERO;
            n.wet = WetState::Dry;
            n.wet_time = 0.0;
            n.contacted = false;
            n.coll_test_timer = 0.0;
            n.skin = false;
        }
        for beam in &mut self.beams {
            beam.reset_to_defaults();
            beam.hydro_length = beam.length;
        }
        for shock in &mut self.shocks {
            shock.last_pos = 0.0;
            shock.trigger_switch_state = 0.0;
        }
        for wheel in &mut self.wheels {
            wheel.reset();
        }
        for axle in &mut self.axles {
            axle.delta_rotation = 0.0;
        }
        self.shaft_twist.fill(0.0);
        for r in &mut self.rigidifiers {
            r.last_angle = r.rest_angle;
        }
        for key in &mut self.commands {
            key.reset();
        }
        for rotator in &mut self.rotators {
            rotator.angle = 0.0;
        }
        for hydro in &mut self.hydros {
            hydro.reset();
        }
        if let Some(stabilizer) = &mut self.stabilizer {
            stabilizer.reset();
        }
        self.controls.reset();
        self.cruise.disengage();
        self.brakes.brake = 0.0;
        self.wheel_speed = 0.0;
        self.external_forces.clear();
        self.reset_requested = false;
        self.increased_accuracy = true;
        self.last_good_position = position;
        self.sleep_counter = 0;
        self.sleep_reference = position;
        self.update_bounds();
        tracing::debug!(vehicle = %self.id, ?position, "vehicle reset");
    }

    /// Recompute the bounding boxes from the node positions.
    pub(crate) fn update_bounds(&mut self) {
        let bounds = Aabb::from_points(self.nodes.iter().map(|n| n.abs_pos))
            .expand_by(crate::constants::AABB_PADDING);
        let ahead = self
            .nodes
            .first()
            .map(|n| bounds.translated(n.velocity))
            .unwrap_or(bounds);
        self.bounds = bounds;
        self.predicted_bounds = bounds.union(&ahead);
    }

    /// Take the events produced since the last call. Deformations are
    /// reported once per beam.
    pub(crate) fn drain_events(&mut self, out: &mut Vec<SimEvent>) {
        if !self.deformed.is_empty() {
            self.deformed.sort_unstable();
            self.deformed.dedup();
            let id = self.id;
            out.extend(
                self.deformed
                    .drain(..)
                    .map(|beam| SimEvent::BeamDeformed { vehicle: id, beam }),
            );
        }
        out.append(&mut self.events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{BeamDef, NodeDef, VehicleDef};

    fn rod() -> Vehicle {
        let def = VehicleDef {
            nodes: vec![NodeDef::at(0.0, 1.0, 0.0), NodeDef::at(1.0, 1.0, 0.0)],
            beams: vec![BeamDef::between(0, 1)],
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(3), &def, Vec3::new(10.0, 0.0, 0.0), &SimContext::default())
            .expect("valid rod")
    }

    #[test]
    fn test_state_predicates() {
        assert!(VehicleState::MaySleep.is_simulated());
        assert!(!VehicleState::Sleeping.is_awake());
        assert!(VehicleState::Networked.is_awake());
        assert!(!VehicleState::Networked.is_simulated());
        assert!(VehicleState::NetworkedInvalid.is_networked());
    }

    #[test]
    fn test_set_state_emits_event() {
        let mut v = rod();
        v.events.clear();
        v.set_state(VehicleState::Sleeping);
        v.set_state(VehicleState::Sleeping);
        let mut events = Vec::new();
        v.drain_events(&mut events);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_sync_reset_restores_shape() {
        let mut v = rod();
        v.nodes[1].rel_pos += Vec3::new(0.0, 3.0, 0.0);
        v.nodes[1].velocity = Vec3::splat(5.0);
        v.beams[0].break_beam();
        v.sync_reset(Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(v.nodes[0].abs_pos, Vec3::new(0.0, 5.0, 0.0));
        assert_eq!(v.nodes[1].abs_pos, Vec3::new(1.0, 5.0, 0.0));
        assert_eq!(v.nodes[1].velocity, Vec3::ZERO);
        assert!(!v.beams[0].broken);
    }

    #[test]
    fn test_translate_keeps_abs_in_sync() {
        let mut v = rod();
        v.translate_to(Vec3::new(-4.0, 2.0, 0.0));
        for n in v.nodes() {
            assert_eq!(n.abs_pos, v.origin() + n.rel_pos);
        }
        assert_eq!(v.nodes[0].abs_pos, Vec3::new(-4.0, 2.0, 0.0));
    }

    #[test]
    fn test_deformations_reported_once() {
        let mut v = rod();
        v.events.clear();
        v.deformed.extend([0, 0, 0]);
        let mut events = Vec::new();
        v.drain_events(&mut events);
        assert_eq!(events, vec![SimEvent::BeamDeformed { vehicle: VehicleId(3), beam: 0 }]);
    }
}

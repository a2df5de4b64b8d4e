//! The multi-vehicle scheduler.
//!
//! [`Simulation::step`] advances every vehicle by one visual frame, split
//! into fixed sub-steps. Each sub-step runs three phases:
//!
//! 1. per vehicle, on the pool: beam forces, rigidifiers and self collision;
//! 2. per vehicle, on the pool: cab collisions against the other vehicles'
//!    contacters, read from a tree built after phase 1. Forces owed to a
//!    partner are added under that partner's lock;
//! 3. on the physics thread with every vehicle locked: inter-vehicle beams,
//!    slide-nodes, integration, powertrain, hydros, commands, couplers and
//!    replay sampling.
//!
//! Sleep, wake and network updates happen at frame boundaries.

use std::sync::{Arc, Mutex};

use glam::Vec3;
use softrig_net::StreamRegistration;

use crate::adapters::{BounceFilter, InputProvider, NetworkAdapter};
use crate::beam_kernel::calc_inter_vehicle_beams;
use crate::builder::build_vehicle;
use crate::collision::ContactWorld;
use crate::constants::MAX_VEHICLES;
use crate::context::SimContext;
use crate::couplers::{
    CouplerRequest, HookMode, apply_slide_nodes, follow_ropes, process_requests, release_vehicle,
    transfer_rope_forces, update_linked_sets,
};
use crate::def::VehicleDef;
use crate::error::SimError;
use crate::events::SimEvent;
use crate::fleet::{Fleet, VehicleSlot, lock};
use crate::ids::VehicleId;
use crate::pool::{WorkerPool, worker_count};
use crate::snapshot::{FrameSnapshot, SnapshotPublisher, SnapshotReader};
use crate::vehicle::{Vehicle, VehicleState};

/// Runs force kernels this sub-step.
fn runs_kernels(v: &Vehicle) -> bool {
    v.state.is_simulated() && !v.is_replaying()
}

pub struct Simulation {
    slots: Vec<VehicleSlot>,
    ctx: Arc<SimContext>,
    pool: WorkerPool,
    events: Vec<SimEvent>,
    focus: Option<VehicleId>,
    frame: u64,
    time: f64,
    publisher: SnapshotPublisher,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("vehicles", &self.vehicle_count())
            .field("pool", &self.pool)
            .field("frame", &self.frame)
            .field("time", &self.time)
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// A simulation with a worker pool sized from the context settings.
    pub fn new(ctx: SimContext) -> Self {
        let threads = worker_count(ctx.settings.worker_threads);
        Self::with_pool(ctx, WorkerPool::new(threads))
    }

    pub fn with_pool(ctx: SimContext, pool: WorkerPool) -> Self {
        Self {
            slots: Vec::new(),
            ctx: Arc::new(ctx),
            pool,
            events: Vec::new(),
            focus: None,
            frame: 0,
            time: 0.0,
            publisher: SnapshotPublisher::new(),
        }
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Swap terrain, gravity, ground models and settings. Refused while a
    /// vehicle is activated.
    pub fn rebind_context(&mut self, ctx: SimContext) -> Result<(), SimError> {
        let active = self.iter_slots().filter(|v| lock(v).state == VehicleState::Activated).count();
        if active > 0 {
            return Err(SimError::ContextLocked { active });
        }
        tracing::info!(gravity = ctx.gravity.y, "simulation context rebound");
        self.ctx = Arc::new(ctx);
        Ok(())
    }

    /// Physics frames completed.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.threads()
    }

    pub fn snapshot_reader(&self) -> SnapshotReader {
        self.publisher.reader()
    }

    fn iter_slots(&self) -> impl Iterator<Item = &Arc<Mutex<Vehicle>>> {
        self.slots.iter().flatten()
    }

    fn slot(&self, id: VehicleId) -> Result<&Arc<Mutex<Vehicle>>, SimError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(SimError::UnknownVehicle(id))
    }

    pub fn vehicle_count(&self) -> usize {
        self.iter_slots().count()
    }

    pub fn vehicle_ids(&self) -> Vec<VehicleId> {
        (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .map(|i| VehicleId(i as u32))
            .collect()
    }

    pub fn contains(&self, id: VehicleId) -> bool {
        self.slot(id).is_ok()
    }

    fn free_id(&self) -> Result<VehicleId, SimError> {
        if self.vehicle_count() >= MAX_VEHICLES {
            return Err(SimError::ResourceExhausted {
                what: "vehicles",
                limit: MAX_VEHICLES,
            });
        }
        let index = self.slots.iter().position(Option::is_none).unwrap_or(self.slots.len());
        Ok(VehicleId(index as u32))
    }

    fn insert(&mut self, vehicle: Vehicle) -> VehicleId {
        let id = vehicle.id;
        tracing::info!(vehicle = %id, name = %vehicle.name, nodes = vehicle.nodes.len(), beams = vehicle.beams.len(), "vehicle spawned");
        self.events.push(SimEvent::VehicleSpawned {
            vehicle: id,
            name: vehicle.name.clone(),
        });
        let slot = Some(Arc::new(Mutex::new(vehicle)));
        match self.slots.get_mut(id.index()) {
            Some(free) => *free = slot,
            None => self.slots.push(slot),
        }
        id
    }

    /// Build a vehicle from `def` with its origin at `origin`.
    pub fn spawn(&mut self, def: &VehicleDef, origin: Vec3) -> Result<VehicleId, SimError> {
        let id = self.free_id()?;
        let vehicle = build_vehicle(id, def, origin, &self.ctx)?;
        Ok(self.insert(vehicle))
    }

    /// Parse a RON vehicle description and spawn it.
    pub fn spawn_ron(&mut self, text: &str, origin: Vec3) -> Result<VehicleId, SimError> {
        let def = VehicleDef::from_ron(text)?;
        self.spawn(&def, origin)
    }

    /// Spawn a vehicle driven by received stream frames.
    pub fn spawn_networked(
        &mut self,
        def: &VehicleDef,
        origin: Vec3,
        registration: StreamRegistration,
    ) -> Result<VehicleId, SimError> {
        let id = self.free_id()?;
        let mut vehicle = build_vehicle(id, def, origin, &self.ctx)?;
        vehicle.make_networked(registration, self.ctx.settings.interpolation_offset_ms);
        Ok(self.insert(vehicle))
    }

    /// Remove a vehicle, releasing every coupler that references it.
    pub fn remove(&mut self, id: VehicleId) -> Result<(), SimError> {
        self.slot(id)?;
        {
            let mut fleet = Fleet::lock(&self.slots);
            release_vehicle(&mut fleet, id);
            update_linked_sets(&mut fleet);
            if let Some(vehicle) = fleet.get_mut(id) {
                vehicle.set_state(VehicleState::Deleting);
            }
            for vehicle in fleet.iter_mut() {
                vehicle.drain_events(&mut self.events);
            }
        }
        let Some(slot) = self.slots.get_mut(id.index()).and_then(Option::take) else {
            return Err(SimError::UnknownVehicle(id));
        };
        let scene_handles = lock(&slot).scene_handles();
        if self.focus == Some(id) {
            self.focus = None;
        }
        tracing::info!(vehicle = %id, "vehicle removed");
        self.events.push(SimEvent::VehicleRemoved {
            vehicle: id,
            scene_handles,
        });
        Ok(())
    }

    pub fn with_vehicle<R>(&self, id: VehicleId, f: impl FnOnce(&Vehicle) -> R) -> Result<R, SimError> {
        Ok(f(&lock(self.slot(id)?)))
    }

    pub fn with_vehicle_mut<R>(&mut self, id: VehicleId, f: impl FnOnce(&mut Vehicle) -> R) -> Result<R, SimError> {
        Ok(f(&mut lock(self.slot(id)?)))
    }

    pub fn state(&self, id: VehicleId) -> Result<VehicleState, SimError> {
        self.with_vehicle(id, Vehicle::state)
    }

    pub fn focus(&self) -> Option<VehicleId> {
        self.focus
    }

    /// Give the player focus to `id`, waking it; the previously focused
    /// vehicle is deactivated.
    pub fn set_focus(&mut self, id: Option<VehicleId>) -> Result<(), SimError> {
        if let Some(id) = id {
            self.slot(id)?;
        }
        if let Some(previous) = self.focus.take()
            && let Ok(slot) = self.slot(previous)
        {
            let mut v = lock(slot);
            if v.state == VehicleState::Activated {
                v.set_state(VehicleState::Deactivated);
            }
        }
        if let Some(id) = id {
            let mut v = lock(self.slot(id)?);
            if v.state.is_simulated() || v.state == VehicleState::Sleeping {
                v.sleep_counter = 0;
                v.set_state(VehicleState::Activated);
            }
        }
        self.focus = id;
        Ok(())
    }

    /// Read one frame of driver input into `id`.
    pub fn apply_input(
        &mut self,
        id: VehicleId,
        input: &dyn InputProvider,
        bounce: &mut BounceFilter,
        now: f64,
    ) -> Result<(), SimError> {
        self.with_vehicle_mut(id, |v| {
            v.apply_input(input, bounce, now);
            v.wake();
        })
    }

    /// Force on `node` of `id` for the next sub-step.
    pub fn add_external_force(&mut self, id: VehicleId, node: usize, force: Vec3) -> Result<(), SimError> {
        self.with_vehicle_mut(id, |v| {
            v.add_external_force(node, force);
            v.wake();
        })
    }

    /// Queue a coupler toggle on `id`, resolved in the next sub-step.
    pub fn queue_coupler(&mut self, id: VehicleId, request: CouplerRequest) -> Result<(), SimError> {
        self.with_vehicle_mut(id, |v| {
            v.pending_couplers.push(request);
            v.wake();
        })
    }

    pub fn request_reset(&mut self, id: VehicleId) -> Result<(), SimError> {
        self.with_vehicle_mut(id, Vehicle::request_reset)
    }

    /// Show replay frame `offset` of `id`; force kernels pause until
    /// [`Simulation::stop_replay`].
    pub fn seek_replay(&mut self, id: VehicleId, offset: isize) -> Result<bool, SimError> {
        self.with_vehicle_mut(id, |v| v.seek_replay(offset))
    }

    pub fn stop_replay(&mut self, id: VehicleId) -> Result<(), SimError> {
        self.with_vehicle_mut(id, Vehicle::stop_replay)
    }

    /// Feed one received stream payload to a networked vehicle.
    pub fn receive_network(&mut self, id: VehicleId, payload: &[u8]) -> Result<bool, SimError> {
        self.with_vehicle_mut(id, |v| v.receive_state(payload))
    }

    /// Pull every pending payload from `adapter`. Payloads for unknown
    /// vehicles are dropped.
    pub fn poll_network(&mut self, adapter: &mut dyn NetworkAdapter) -> usize {
        let mut accepted = 0;
        for (id, payload) in adapter.receive() {
            match self.receive_network(id, &payload) {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                Err(e) => tracing::debug!(error = %e, "stream frame dropped"),
            }
        }
        accepted
    }

    /// Send the state of every locally simulated vehicle.
    pub fn send_network(&self, adapter: &mut dyn NetworkAdapter) {
        let time_ms = (self.time * 1000.0) as i32;
        for slot in self.iter_slots() {
            let v = lock(slot);
            if v.state.is_networked() || v.state == VehicleState::Deleting {
                continue;
            }
            adapter.send(v.id, &v.encode_state(time_ms, &self.ctx.settings.compression));
        }
    }

    /// Events produced since the last call, in emission order per vehicle.
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    /// Sub-steps needed for a visual frame of `frame_dt` seconds.
    pub fn substeps_for(&self, frame_dt: f32) -> u32 {
        let settings = &self.ctx.settings;
        if frame_dt.is_nan() || frame_dt <= 0.0 {
            return 0;
        }
        let steps = (frame_dt / settings.dt).ceil();
        if steps >= settings.max_substeps as f32 {
            settings.max_substeps
        } else {
            (steps as u32).max(1)
        }
    }

    /// Advance one visual frame. Returns the number of sub-steps run; a
    /// zero or negative `frame_dt` changes nothing.
    pub fn step(&mut self, frame_dt: f32) -> u32 {
        let substeps = self.substeps_for(frame_dt);
        if substeps == 0 {
            return 0;
        }
        let dt = self.ctx.settings.dt;
        self.begin_frame();
        for i in 0..substeps {
            self.substep(dt, i == 0, frame_dt);
        }
        self.time += f64::from(dt) * f64::from(substeps);
        self.frame += 1;
        self.end_frame(frame_dt);
        substeps
    }

    /// Frame-start transitions: wake checks, pending sleeps and networked
    /// interpolation.
    fn begin_frame(&mut self) {
        let local_ms = (self.time * 1000.0) as i32;
        let mut fleet = Fleet::lock(&self.slots);

        // only vehicles that moved last frame wake their neighbours
        let awake: Vec<(VehicleId, softrig_math::Aabb)> = fleet
            .iter()
            .filter(|v| match v.state {
                VehicleState::Activated | VehicleState::Deactivated => v.sleep_counter == 0,
                VehicleState::Networked => true,
                _ => false,
            })
            .map(|v| (v.id, v.predicted_bounds))
            .collect();
        for v in fleet.iter_mut() {
            match v.state {
                VehicleState::Sleeping => {
                    let touched = awake.iter().any(|(id, b)| *id != v.id && b.intersects(&v.bounds));
                    let linked_awake = v.linked.iter().any(|l| *l != v.id && awake.iter().any(|(id, _)| id == l));
                    if touched || linked_awake {
                        v.wake();
                    }
                }
                VehicleState::GoSleep => v.set_state(VehicleState::Sleeping),
                VehicleState::Networked => v.update_networked(local_ms),
                _ => {}
            }
        }
    }

    fn substep(&mut self, dt: f32, first: bool, frame_dt: f32) {
        let settings = &self.ctx.settings;

        {
            let phase = self.pool.phase();
            for slot in self.slots.iter().flatten() {
                if !runs_kernels(&lock(slot)) {
                    continue;
                }
                let slot = Arc::clone(slot);
                let ctx = Arc::clone(&self.ctx);
                phase.spawn(move || {
                    let mut v = lock(&slot);
                    v.calc_beams(dt, first, &ctx.settings);
                    v.calc_rigidifiers(dt);
                    if ctx.settings.intra_collisions {
                        v.calc_intra_collisions(&ctx, dt);
                    }
                });
            }
            phase.join();
        }

        if settings.inter_collisions {
            self.inter_collision_phase(dt);
        }

        let mut fleet = Fleet::lock(&self.slots);
        sequential_phase(&mut fleet, &self.ctx, dt, first, frame_dt);
    }

    /// Phase 2: build the shared contact tree, then collide each vehicle's
    /// cabs against the overlapping vehicles.
    fn inter_collision_phase(&self, dt: f32) {
        let mut world = ContactWorld {
            detector: Default::default(),
            bodies: vec![None; self.slots.len()],
        };
        let mut bounds = vec![None; self.slots.len()];
        let mut points = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let v = lock(slot);
            if !v.state.is_awake() {
                continue;
            }
            bounds[i] = Some((v.predicted_bounds, runs_kernels(&v) && !v.cabs.is_empty()));
            if !v.contacters.is_empty() {
                points.extend(v.contact_points());
                world.bodies[i] = Some(v.contact_body());
            }
        }
        if bounds.iter().flatten().count() < 2 {
            return;
        }
        world.detector.rebuild(points);
        let world = Arc::new(world);
        let slots: Arc<Vec<VehicleSlot>> = Arc::new(self.slots.clone());

        let phase = self.pool.phase();
        for (i, entry) in bounds.iter().enumerate() {
            let Some((own, true)) = *entry else { continue };
            let partners: Vec<bool> = bounds
                .iter()
                .enumerate()
                .map(|(j, other)| j != i && world.bodies[j].is_some() && other.is_some_and(|(b, _)| b.intersects(&own)))
                .collect();
            if !partners.contains(&true) {
                continue;
            }
            let world = Arc::clone(&world);
            let slots = Arc::clone(&slots);
            let ctx = Arc::clone(&self.ctx);
            phase.spawn(move || {
                let Some(Some(own)) = slots.get(i) else { return };
                let outbox = lock(own).calc_inter_collisions(&world, &partners, &ctx, dt);
                for impulse in outbox {
                    if let Some(Some(peer)) = slots.get(impulse.slot) {
                        let mut peer = lock(peer);
                        if let Some(node) = peer.nodes.get_mut(impulse.node) {
                            node.forces += impulse.force;
                        }
                    }
                }
            });
        }
        phase.join();
    }

    /// Frame-end bookkeeping: sleep detection, event collection and the
    /// visual snapshot.
    fn end_frame(&mut self, frame_dt: f32) {
        let settings = &self.ctx.settings;
        let mut fleet = Fleet::lock(&self.slots);

        for v in fleet.iter_mut() {
            if v.state.is_networked() || v.is_replaying() {
                continue;
            }
            v.track_rest(frame_dt, settings.sleep_speed, settings.sleep_ticks);
        }

        let resting: Vec<VehicleId> = fleet
            .iter()
            .filter(|v| matches!(v.state, VehicleState::MaySleep | VehicleState::GoSleep | VehicleState::Sleeping))
            .map(Vehicle::id)
            .collect();
        for v in fleet.iter_mut() {
            if v.state == VehicleState::MaySleep && v.linked.iter().all(|l| resting.contains(l)) {
                v.set_state(VehicleState::GoSleep);
            }
        }

        for v in fleet.iter_mut() {
            v.drain_events(&mut self.events);
        }
        self.publisher
            .publish(FrameSnapshot::capture(self.frame, self.time, &fleet));
    }
}

/// Phase 3 of a sub-step, with every vehicle locked.
fn sequential_phase(fleet: &mut Fleet<'_>, ctx: &SimContext, dt: f32, first: bool, frame_dt: f32) {
    let settings = &ctx.settings;
    calc_inter_vehicle_beams(fleet, settings);
    apply_slide_nodes(fleet, dt);
    transfer_rope_forces(fleet);

    for v in fleet.iter_mut().filter(|v| runs_kernels(v)) {
        v.apply_external_forces();
        if !v.calc_nodes(ctx, dt) {
            v.reset_requested = true;
        }
    }
    follow_ropes(fleet);

    for v in fleet.iter_mut().filter(|v| runs_kernels(v)) {
        if first {
            v.update_cruise(frame_dt);
        }
        if let Some(engine) = &mut v.engine {
            engine.update(dt, first);
        }
        v.calc_wheels(dt);
        v.calc_hydros(dt);
        v.calc_commands(dt);
        v.apply_rotators();
        v.calc_stabilizer(dt, first, frame_dt);
        v.calc_ties(dt);
        v.calc_hooks(dt);
        if first && v.has_auto_lock_hooks() {
            v.pending_couplers.push(CouplerRequest::Hook {
                group: -2,
                mode: HookMode::Lock,
            });
        }
    }

    let mut relinked = process_requests(fleet);

    let resets: Vec<VehicleId> = fleet.iter().filter(|v| v.reset_requested).map(Vehicle::id).collect();
    for id in resets {
        release_vehicle(fleet, id);
        if let Some(v) = fleet.get_mut(id) {
            let position = v.last_good_position;
            v.sync_reset(position);
            v.emit(SimEvent::VehicleReset { vehicle: id });
        }
        relinked = true;
    }
    if relinked {
        update_linked_sets(fleet);
    }

    for v in fleet.iter_mut().filter(|v| runs_kernels(v)) {
        v.sample_replay(dt, settings);
    }
}

impl Vehicle {
    /// Leave any sleep state.
    pub(crate) fn wake(&mut self) {
        self.sleep_counter = 0;
        if matches!(
            self.state,
            VehicleState::MaySleep | VehicleState::GoSleep | VehicleState::Sleeping
        ) {
            self.set_state(VehicleState::Deactivated);
        }
    }

    /// Count frames in which node 0 moved slower than `sleep_speed`; after
    /// `sleep_ticks` of them an unfocused vehicle may sleep.
    fn track_rest(&mut self, frame_dt: f32, sleep_speed: f32, sleep_ticks: u32) {
        let Some(position) = self.nodes.first().map(|n| n.abs_pos) else {
            return;
        };
        let speed = position.distance(self.sleep_reference) / frame_dt;
        self.sleep_reference = position;
        if speed >= sleep_speed {
            self.wake();
            return;
        }
        self.sleep_counter = self.sleep_counter.saturating_add(1);
        if self.sleep_counter >= sleep_ticks && self.state == VehicleState::Deactivated {
            self.set_state(VehicleState::MaySleep);
        }
    }
}

#[cfg(test)]
#[path = "simulation_tests.rs"]
mod tests;

//! Turns a validated [`VehicleDef`] into a simulated [`Vehicle`].
//!
//! Beams are laid out in a fixed order: the described beams first, then
//! shocks, triggers, hydros, commands, wheel beams and rope beams, and
//! finally the assistance beams of hooks and ties. Everything but the last
//! group is structural and feeds the node adjacency.

use std::sync::Arc;

use glam::Vec3;

use crate::beam::{Beam, BeamKind, BoundedKind, HydroFlags};
use crate::brakes::Brakes;
use crate::collision::{CabRate, CollisionCab};
use crate::commands::Rotator;
use crate::constants::{
    BEAM_DEFORM, MAX_BEAMS, MAX_COMMANDS, MAX_HOOKS, MAX_NODES, MAX_RIGIDIFIERS, MAX_ROPABLES, MAX_ROPES,
    MAX_ROTATORS, MAX_TIES, MAX_WHEELS,
};
use crate::context::SimContext;
use crate::couplers::{Hook, Rail, RailRef, Ropable, Rope, SlideNode, Tie};
use crate::cruise::CruiseControl;
use crate::def::{
    BeamDef, CommandDef, HydroDef, HydroInput, InertiaDef, PressMode, ShockDef, ShockSide, TriggerDef,
    TriggerOption, VehicleDef, WheelDef,
};
use crate::differential::Axle;
use crate::engine::Engine;
use crate::error::SimError;
use crate::hydros::Hydro;
use crate::ids::VehicleId;
use crate::inertia::InertiaChannel;
use crate::node::Node;
use crate::replay::ReplayBuffer;
use crate::rigidifier::Rigidifier;
use crate::shocks::{Shock, ShockFlags};
use crate::stabilizer::Stabilizer;
use crate::topology::Topology;
use crate::vehicle::Vehicle;
use crate::wheels::{Wheel, rim_positions};

/// Inertia curve shaping how fast a tie takes up slack.
const TIE_INERTIA_FUNCTION: &str = "linear";
const TIE_INERTIA_DELAY: f32 = 1.0;

fn within(what: &'static str, count: usize, limit: usize) -> Result<(), SimError> {
    if count > limit {
        return Err(SimError::ResourceExhausted { what, limit });
    }
    Ok(())
}

/// Build `def` as vehicle `id` with its spawn point at `origin`.
///
/// The vehicle comes back deactivated and without any pending events; the
/// caller decides when it starts simulating.
pub fn build_vehicle(id: VehicleId, def: &VehicleDef, origin: Vec3, ctx: &SimContext) -> Result<Vehicle, SimError> {
    let mut asm = Assembler {
        def,
        ctx,
        vehicle: Vehicle::empty(id, def.name.clone(), origin),
    };
    asm.check_limits()?;
    asm.nodes()?;
    asm.beams()?;
    asm.shocks()?;
    asm.triggers()?;
    asm.hydros()?;
    asm.commands()?;
    asm.rotators()?;
    asm.wheels()?;
    asm.axles()?;
    asm.ropes()?;
    asm.rigidifiers()?;
    asm.cabs()?;
    asm.drivetrain()?;

    let v = &mut asm.vehicle;
    v.topology = Arc::new(Topology::build(v.nodes.len(), &v.beams));

    asm.hooks()?;
    asm.ties()?;
    asm.ropables()?;
    asm.rails()?;
    asm.slide_nodes()?;

    let mut vehicle = asm.vehicle;
    for beam in &mut vehicle.beams {
        beam.capture_defaults();
    }
    if ctx.settings.replay_enabled {
        vehicle.replay = Some(ReplayBuffer::new(
            ctx.settings.replay_frames,
            vehicle.nodes.len(),
            vehicle.beams.len(),
        ));
    }
    vehicle.last_good_position = vehicle.nodes.first().map_or(origin, |n| n.abs_pos);
    vehicle.sleep_reference = vehicle.last_good_position;
    vehicle.increased_accuracy = true;
    vehicle.update_bounds();
    tracing::debug!(
        vehicle = %id,
        name = %vehicle.name,
        nodes = vehicle.nodes.len(),
        beams = vehicle.beams.len(),
        wheels = vehicle.wheels.len(),
        "vehicle built"
    );
    Ok(vehicle)
}

struct Assembler<'a> {
    def: &'a VehicleDef,
    ctx: &'a SimContext,
    vehicle: Vehicle,
}

impl Assembler<'_> {
    fn check_limits(&self) -> Result<(), SimError> {
        let def = self.def;
        let rim_nodes: usize = def.wheels.iter().map(|w| w.rays.saturating_mul(2)).sum();
        within("nodes", def.nodes.len().saturating_add(rim_nodes), MAX_NODES)?;
        within("wheels", def.wheels.len(), MAX_WHEELS)?;
        within("rigidifiers", def.rigidifiers.len(), MAX_RIGIDIFIERS)?;
        within("rotators", def.rotators.len(), MAX_ROTATORS)?;
        within("hooks", def.hooks.len(), MAX_HOOKS)?;
        within("ties", def.ties.len(), MAX_TIES)?;
        within("ropes", def.ropes.len(), MAX_ROPES)?;
        within("ropables", def.ropables.len(), MAX_ROPABLES)?;
        Ok(())
    }

    /// Index of a described node, rejecting dangling references.
    fn node(&self, what: &str, index: usize) -> Result<usize, SimError> {
        if index < self.def.nodes.len() {
            Ok(index)
        } else {
            Err(SimError::construction(format!(
                "{what} references node {index}, but only {} nodes exist",
                self.def.nodes.len()
            )))
        }
    }

    fn pair(&self, what: &str, nodes: [usize; 2]) -> Result<[usize; 2], SimError> {
        let [a, b] = [self.node(what, nodes[0])?, self.node(what, nodes[1])?];
        if a == b {
            return Err(SimError::construction(format!("{what} connects node {a} to itself")));
        }
        Ok([a, b])
    }

    fn key(&self, what: &str, key: usize) -> Result<usize, SimError> {
        if key == 0 {
            return Err(SimError::construction(format!("{what} is bound to command key 0")));
        }
        within("command keys", key, MAX_COMMANDS)?;
        Ok(key)
    }

    fn distance(&self, a: usize, b: usize) -> f32 {
        let nodes = &self.vehicle.nodes;
        nodes[a].rel_pos.distance(nodes[b].rel_pos)
    }

    fn push_beam(&mut self, beam: Beam) -> Result<usize, SimError> {
        within("beams", self.vehicle.beams.len() + 1, MAX_BEAMS)?;
        self.vehicle.beams.push(beam);
        Ok(self.vehicle.beams.len() - 1)
    }

    fn inertia(&self, def: &InertiaDef) -> InertiaChannel {
        InertiaChannel::new(
            &self.ctx.inertia_models,
            def.start_delay,
            def.stop_delay,
            &def.start_function,
            &def.stop_function,
        )
    }

    fn nodes(&mut self) -> Result<(), SimError> {
        let def = self.def;
        let origin = self.vehicle.origin;
        for (i, nd) in def.nodes.iter().enumerate() {
            let position = Vec3::from_array(nd.position);
            if !position.is_finite() || !nd.mass.is_finite() || nd.mass < 0.0 {
                return Err(SimError::construction(format!("node {i} has a non-finite position or invalid mass")));
            }
            let mut node = Node::new(position, nd.mass);
            node.set_position(origin, position);
            node.contacter = nd.contacter;
            node.contactless = nd.contactless;
            node.locked = nd.locked;
            node.lock_group = nd.lock_group;
            node.friction_coef = nd.friction_coef;
            node.surface_coef = nd.surface_coef;
            node.volume_coef = nd.volume_coef;
            node.buoyancy = nd.buoyancy;
            self.vehicle.nodes.push(node);
        }
        self.vehicle.contacters = self
            .vehicle
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.contacter)
            .map(|(i, _)| i)
            .collect();
        Ok(())
    }

    fn beams(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, bd) in def.beams.iter().enumerate() {
            let beam = self.beam_from_def(i, bd)?;
            self.push_beam(beam)?;
        }
        Ok(())
    }

    fn beam_from_def(&self, index: usize, bd: &BeamDef) -> Result<Beam, SimError> {
        let what = format!("beam {index}");
        let [a, b] = self.pair(&what, bd.nodes)?;
        let length = bd.length.unwrap_or_else(|| self.distance(a, b));
        if !length.is_finite() || length < 0.0 || !bd.spring.is_finite() || !bd.damp.is_finite() {
            return Err(SimError::construction(format!("{what} has invalid dimensions")));
        }
        let mut beam = Beam::new(a, b, length);
        beam.k = bd.spring;
        beam.d = bd.damp;
        beam.bounded = bd.bounded;
        beam.kind = bd.kind;
        beam.short_bound = bd.short_bound;
        beam.long_bound = bd.long_bound;
        beam.detacher_group = bd.detacher_group;
        beam.disabled = bd.disabled;
        beam.set_limits(bd.deform, bd.strength, bd.plastic_coef);
        Ok(beam)
    }

    fn shocks(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, sd) in def.shocks.iter().enumerate() {
            self.shock(i, sd)?;
        }
        Ok(())
    }

    fn shock(&mut self, index: usize, sd: &ShockDef) -> Result<(), SimError> {
        let what = format!("shock {index}");
        let [a, b] = self.pair(&what, sd.nodes)?;
        if sd.precompression <= 0.0 || sd.short_bound < 0.0 || sd.long_bound < 0.0 {
            return Err(SimError::construction(format!("{what} has invalid bounds or precompression")));
        }
        let mut beam = Beam::new(a, b, self.distance(a, b) * sd.precompression);
        beam.k = sd.spring;
        beam.d = sd.damp;
        beam.short_bound = sd.short_bound;
        beam.long_bound = sd.long_bound;
        beam.detacher_group = sd.detacher_group;
        beam.bounded = if sd.progressive.is_some() {
            BoundedKind::Shock2
        } else {
            BoundedKind::Shock1
        };

        let mut flags = ShockFlags::empty();
        if sd.hard_stop {
            flags = flags | ShockFlags::NORMAL;
        }
        if sd.soft_bump {
            flags = flags | ShockFlags::SOFTBUMP;
        }
        if sd.progressive.is_some() {
            flags = flags | ShockFlags::ISSHOCK2;
        }
        flags = match sd.side {
            ShockSide::Passive => flags,
            ShockSide::Left => flags | ShockFlags::LACTIVE,
            ShockSide::Right => flags | ShockFlags::RACTIVE,
        };

        let shock_index = self.vehicle.shocks.len();
        beam.shock = Some(shock_index);
        let beam_index = self.push_beam(beam)?;
        let mut shock = Shock::new(beam_index, flags);
        match &sd.progressive {
            Some(p) => {
                shock.spring_in = p.spring_in;
                shock.damp_in = p.damp_in;
                shock.progress_spring_in = p.progress_spring_in;
                shock.progress_damp_in = p.progress_damp_in;
                shock.spring_out = p.spring_out;
                shock.damp_out = p.damp_out;
                shock.progress_spring_out = p.progress_spring_out;
                shock.progress_damp_out = p.progress_damp_out;
            }
            None => {
                shock.spring_in = sd.spring;
                shock.damp_in = sd.damp;
                shock.spring_out = sd.spring;
                shock.damp_out = sd.damp;
            }
        }
        shock.stop_spring = sd.stop_spring.unwrap_or(sd.spring);
        shock.stop_damp = sd.stop_damp.unwrap_or(sd.damp);
        self.vehicle.shocks.push(shock);
        Ok(())
    }

    fn triggers(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, td) in def.triggers.iter().enumerate() {
            self.trigger(i, td)?;
        }
        Ok(())
    }

    fn trigger(&mut self, index: usize, td: &TriggerDef) -> Result<(), SimError> {
        let what = format!("trigger {index}");
        let [a, b] = self.pair(&what, td.nodes)?;
        if td.short_bound < 0.0 || td.long_bound < 0.0 {
            return Err(SimError::construction(format!("{what} has negative bounds")));
        }
        let mut flags = ShockFlags::NORMAL | ShockFlags::ISTRIGGER;
        for option in &td.options {
            flags = flags
                | match option {
                    TriggerOption::Blocker => ShockFlags::TRG_BLOCKER,
                    TriggerOption::InvertedBlocker => ShockFlags::TRG_BLOCKER_A,
                    TriggerOption::CmdBlocker => ShockFlags::TRG_CMD_BLOCKER,
                    TriggerOption::CmdSwitch => ShockFlags::TRG_CMD_SWITCH,
                    TriggerOption::HookLock => ShockFlags::TRG_HOOK_LOCK,
                    TriggerOption::HookUnlock => ShockFlags::TRG_HOOK_UNLOCK,
                    TriggerOption::Engine => ShockFlags::TRG_ENGINE,
                    TriggerOption::Continuous => ShockFlags::TRG_CONTINUOUS,
                };
        }
        let is_hook = flags.contains(ShockFlags::TRG_HOOK_LOCK) || flags.contains(ShockFlags::TRG_HOOK_UNLOCK);
        let routes_keys = !is_hook
            && !flags.contains(ShockFlags::TRG_BLOCKER)
            && !flags.contains(ShockFlags::TRG_BLOCKER_A)
            && !flags.contains(ShockFlags::TRG_ENGINE);
        // negative ids leave that side unrouted
        if routes_keys {
            for key in [td.cmd_short, td.cmd_long] {
                if let Ok(key) = usize::try_from(key) {
                    within("command keys", key, MAX_COMMANDS)?;
                }
            }
        }

        let mut beam = Beam::new(a, b, self.distance(a, b));
        beam.k = 0.0;
        beam.d = 0.0;
        beam.bounded = BoundedKind::Trigger;
        beam.kind = BeamKind::Invisible;
        beam.short_bound = td.short_bound;
        beam.long_bound = td.long_bound;
        let shock_index = self.vehicle.shocks.len();
        beam.shock = Some(shock_index);
        let beam_index = self.push_beam(beam)?;

        let mut shock = Shock::new(beam_index, flags);
        shock.spring_in = 0.0;
        shock.damp_in = 0.0;
        shock.spring_out = 0.0;
        shock.damp_out = 0.0;
        shock.stop_spring = 0.0;
        shock.stop_damp = 0.0;
        shock.trigger_cmd_short = td.cmd_short;
        shock.trigger_cmd_long = td.cmd_long;
        shock.trigger_boundary_time = td.boundary_time;
        shock.trigger_enabled = !td.start_disabled;
        self.vehicle.shocks.push(shock);
        Ok(())
    }

    fn hydros(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, hd) in def.hydros.iter().enumerate() {
            self.hydro(i, hd)?;
        }
        Ok(())
    }

    fn hydro(&mut self, index: usize, hd: &HydroDef) -> Result<(), SimError> {
        let what = format!("hydro {index}");
        let [a, b] = self.pair(&what, hd.nodes)?;
        let length = self.distance(a, b);
        let mut beam = Beam::new(a, b, length);
        beam.k = hd.spring;
        beam.d = hd.damp;
        beam.kind = BeamKind::Hydro;
        beam.hydro_length = length;
        beam.hydro_ratio = hd.ratio;
        if let Some((short, long)) = hd.bounds {
            beam.animator_bounds = true;
            beam.short_bound = short;
            beam.long_bound = long;
        }
        let flags = hd.inputs.iter().fold(HydroFlags::empty(), |flags, input| {
            flags
                | match input {
                    HydroInput::Dir => HydroFlags::DIR,
                    HydroInput::SpeedDir => HydroFlags::SPEED,
                    HydroInput::Aileron => HydroFlags::AILERON,
                    HydroInput::Rudder => HydroFlags::RUDDER,
                    HydroInput::Elevator => HydroFlags::ELEVATOR,
                    HydroInput::InvAileron => HydroFlags::REV_AILERON,
                    HydroInput::InvRudder => HydroFlags::REV_RUDDER,
                    HydroInput::InvElevator => HydroFlags::REV_ELEVATOR,
                }
        });
        let inertia = hd.inertia.as_ref().map(|i| self.inertia(i));
        let beam_index = self.push_beam(beam)?;
        self.vehicle.hydros.push(Hydro::new(beam_index, flags, inertia));
        Ok(())
    }

    fn commands(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, cd) in def.commands.iter().enumerate() {
            self.command(i, cd)?;
        }
        Ok(())
    }

    fn command(&mut self, index: usize, cd: &CommandDef) -> Result<(), SimError> {
        let what = format!("command {index}");
        let [a, b] = self.pair(&what, cd.nodes)?;
        let key_short = self.key(&what, cd.key_short)?;
        let key_long = self.key(&what, cd.key_long)?;
        if cd.short_bound < 0.0 || cd.long_bound < cd.short_bound {
            return Err(SimError::construction(format!("{what} has inverted bounds")));
        }
        let length = self.distance(a, b);
        let mut beam = Beam::new(a, b, length);
        beam.k = cd.spring;
        beam.d = cd.damp;
        beam.kind = BeamKind::Hydro;
        beam.hydro_length = length;
        let cmd = &mut beam.command;
        cmd.ratio_short = cd.rate_short;
        cmd.ratio_long = cd.rate_long;
        cmd.short = cd.short_bound;
        cmd.long = cd.long_bound;
        cmd.engine_coupling = cd.engine_coupling;
        cmd.needs_engine = cd.needs_engine;
        cmd.force_restricted = cd.force_restricted;
        cmd.centering = cd.centering;
        cmd.center_length = if (cd.short_bound..=cd.long_bound).contains(&1.0) {
            1.0
        } else {
            (cd.short_bound + cd.long_bound) * 0.5
        };
        cmd.one_press_mode = match cd.press_mode {
            PressMode::Hold => 0,
            PressMode::OnePress => 1,
            PressMode::OnePressCenter => 2,
        };
        let beam_index = self.push_beam(beam)?;

        let inertia = cd.inertia.as_ref().map(|i| self.inertia(i));
        let keys = &mut self.vehicle.commands;
        keys[key_short].beams.push((beam_index, -1));
        keys[key_long].beams.push((beam_index, 1));
        for key in [key_short, key_long] {
            if keys[key].inertia.is_none() {
                keys[key].inertia = inertia.clone();
            }
        }
        Ok(())
    }

    fn rotators(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, rd) in def.rotators.iter().enumerate() {
            let what = format!("rotator {i}");
            let axis = self.pair(&what, rd.axis)?;
            for &n in rd.base_plate.iter().chain(&rd.rotating_plate) {
                self.node(&what, n)?;
            }
            let left = self.key(&what, rd.key_left)?;
            let right = self.key(&what, rd.key_right)?;
            let index = self.vehicle.rotators.len();
            self.vehicle.rotators.push(Rotator {
                axis,
                base_plate: rd.base_plate,
                rotating_plate: rd.rotating_plate,
                rate: rd.rate,
                force: rd.force,
                tolerance: rd.tolerance,
                angle: 0.0,
                engine_coupling: rd.engine_coupling,
                needs_engine: rd.needs_engine,
            });
            self.vehicle.commands[left].rotators.push((index, -1));
            self.vehicle.commands[right].rotators.push((index, 1));
        }
        Ok(())
    }

    fn wheels(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, wd) in def.wheels.iter().enumerate() {
            self.wheel(i, wd)?;
        }
        Ok(())
    }

    /// Generate the rim of a wheel and tie it to the hub.
    fn wheel(&mut self, index: usize, wd: &WheelDef) -> Result<(), SimError> {
        let what = format!("wheel {index}");
        let axis = self.pair(&what, wd.axis)?;
        let arm = self.node(&what, wd.arm)?;
        if wd.rays == 0 || !(wd.radius > 0.0) || !wd.mass.is_finite() || wd.mass < 0.0 {
            return Err(SimError::construction(format!("{what} has invalid dimensions")));
        }
        let hub = [self.vehicle.nodes[axis[0]].rel_pos, self.vehicle.nodes[axis[1]].rel_pos];
        let positions = rim_positions(hub[0], hub[1], wd.radius, wd.rays);
        if positions.is_empty() {
            return Err(SimError::construction(format!("{what} has a degenerate axis")));
        }

        let origin = self.vehicle.origin;
        let rim_mass = wd.mass / positions.len() as f32;
        let first = self.vehicle.nodes.len();
        for rel in &positions {
            let mut node = Node::new(*rel, rim_mass);
            node.set_position(origin, *rel);
            node.is_wheel = true;
            self.vehicle.nodes.push(node);
        }
        let rim: Vec<usize> = (first..first + positions.len()).collect();

        let count = rim.len();
        for (k, &r) in rim.iter().enumerate() {
            let links = [axis[0], axis[1], rim[(k + 1) % count], rim[(k + 2) % count]];
            for other in links {
                let mut beam = Beam::new(r, other, self.distance(r, other));
                beam.k = wd.spring;
                beam.d = wd.damp;
                beam.detacher_group = wd.detacher_group;
                self.push_beam(beam)?;
            }
        }

        let near_attach = if self.distance(axis[0], arm) <= self.distance(axis[1], arm) {
            axis[0]
        } else {
            axis[1]
        };
        self.vehicle.wheels.push(Wheel::new(
            rim,
            axis,
            arm,
            near_attach,
            wd.radius,
            wd.propulsion,
            wd.braking,
            wd.detacher_group,
        ));
        Ok(())
    }

    fn axles(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, ad) in def.axles.iter().enumerate() {
            let [a, b] = ad.wheels;
            if a >= self.vehicle.wheels.len() || b >= self.vehicle.wheels.len() || a == b {
                return Err(SimError::construction(format!("axle {i} references invalid wheels")));
            }
            self.vehicle.axles.push(Axle::new(ad.wheels, ad.differentials.clone()));
        }
        self.vehicle.shaft_twist = vec![0.0; self.vehicle.axles.len().saturating_sub(1)];
        Ok(())
    }

    fn ropes(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, rd) in def.ropes.iter().enumerate() {
            let [root, end] = self.pair(&format!("rope {i}"), [rd.root, rd.end])?;
            let mut beam = Beam::new(root, end, self.distance(root, end));
            beam.bounded = BoundedKind::Rope;
            let beam_index = self.push_beam(beam)?;
            self.vehicle.ropes.push(Rope::new(root, end, beam_index, rd.group));
        }
        Ok(())
    }

    fn rigidifiers(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, rd) in def.rigidifiers.iter().enumerate() {
            let what = format!("rigidifier {i}");
            let [a, b, c] = rd.nodes;
            for n in rd.nodes {
                self.node(&what, n)?;
            }
            if a == b || b == c || a == c {
                return Err(SimError::construction(format!("{what} repeats a node")));
            }
            let find = |x: usize, y: usize| {
                self.vehicle
                    .beams
                    .iter()
                    .position(|beam| (beam.p1 == x && beam.p2 == y) || (beam.p1 == y && beam.p2 == x))
            };
            let arms = [find(a, b), find(b, c)];
            if arms.iter().any(Option::is_none) {
                tracing::warn!(vehicle = %self.vehicle.id, rigidifier = i, "rigidifier arm has no beam");
            }
            let positions = rd.nodes.map(|n| self.vehicle.nodes[n].rel_pos);
            self.vehicle
                .rigidifiers
                .push(Rigidifier::new(rd.nodes, arms, rd.spring, rd.damp, positions));
        }
        Ok(())
    }

    fn cabs(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, cab) in def.cabs.iter().enumerate() {
            for &n in cab {
                self.node(&format!("cab {i}"), n)?;
            }
            self.vehicle.cabs.push(CollisionCab { nodes: *cab });
        }
        let count = self.vehicle.cabs.len();
        self.vehicle.intra_rates = vec![CabRate::default(); count];
        self.vehicle.inter_rates = vec![CabRate::default(); count];
        self.vehicle.collision_range = self.def.collision_range.max(0.0);
        Ok(())
    }

    fn drivetrain(&mut self) -> Result<(), SimError> {
        let def = self.def;
        self.vehicle.engine = def.engine.as_ref().map(Engine::new);
        self.vehicle.brakes = Brakes::new(&def.brakes);
        self.vehicle.cruise = CruiseControl::new(&def.cruise);
        if let Some(sd) = &def.stabilizer {
            let reference = self.node("stabilizer", sd.reference)?;
            let roll_node = self.node("stabilizer", sd.roll_node)?;
            self.vehicle.stabilizer = Some(Stabilizer::new(reference, roll_node));
        }
        Ok(())
    }

    /// A disabled beam from `node` parked on node 0, pointed at its target
    /// on attach.
    fn coupler_beam(&mut self, node: usize, length: f32) -> Result<usize, SimError> {
        let mut beam = Beam::new(node, 0, length);
        beam.bounded = BoundedKind::Rope;
        beam.kind = BeamKind::Virtual;
        beam.disabled = true;
        beam.set_limits(BEAM_DEFORM, f32::MAX, 0.0);
        self.push_beam(beam)
    }

    fn hooks(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, hd) in def.hooks.iter().enumerate() {
            let node = self.node(&format!("hook {i}"), hd.node)?;
            if hd.range <= 0.0 {
                tracing::warn!(vehicle = %self.vehicle.id, hook = i, "hook has no range and never locks");
            }
            let beam = self.coupler_beam(node, 0.0)?;
            self.vehicle.hooks.push(Hook::new(hd, beam));
        }
        Ok(())
    }

    fn ties(&mut self) -> Result<(), SimError> {
        let def = self.def;
        if !self.def.ties.is_empty() && self.def.ropables.is_empty() {
            tracing::warn!(vehicle = %self.vehicle.id, "ties without ropables can only reach other vehicles");
        }
        for (i, td) in def.ties.iter().enumerate() {
            let node = self.node(&format!("tie {i}"), td.node)?;
            if !(td.max_length > 0.0) {
                return Err(SimError::construction(format!("tie {i} has no reach")));
            }
            let beam = self.coupler_beam(node, td.max_length)?;
            let inertia = InertiaChannel::new(
                &self.ctx.inertia_models,
                TIE_INERTIA_DELAY,
                TIE_INERTIA_DELAY,
                TIE_INERTIA_FUNCTION,
                TIE_INERTIA_FUNCTION,
            );
            self.vehicle.ties.push(Tie {
                node,
                beam,
                group: td.group,
                tied: false,
                tying: false,
                target: None,
                ropable: None,
                rate: td.rate,
                min_length: td.min_length,
                max_stress: td.max_stress,
                no_self_lock: td.no_self_lock,
                inertia,
            });
        }
        Ok(())
    }

    fn ropables(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, rd) in def.ropables.iter().enumerate() {
            let node = self.node(&format!("ropable {i}"), rd.node)?;
            self.vehicle.ropables.push(Ropable {
                node,
                group: rd.group,
                multilock: rd.multilock,
            });
        }
        Ok(())
    }

    fn rails(&mut self) -> Result<(), SimError> {
        let def = self.def;
        for (i, rd) in def.rails.iter().enumerate() {
            let what = format!("rail {i}");
            if rd.nodes.len() < 2 {
                return Err(SimError::construction(format!("{what} needs at least two nodes")));
            }
            for &n in &rd.nodes {
                self.node(&what, n)?;
            }
            self.vehicle.rails.push(Rail { nodes: rd.nodes.clone() });
        }
        Ok(())
    }

    fn slide_nodes(&mut self) -> Result<(), SimError> {
        let def = self.def;
        let id = self.vehicle.id;
        for (i, sd) in def.slide_nodes.iter().enumerate() {
            let what = format!("slide node {i}");
            let node = self.node(&what, sd.node)?;
            let rail = match sd.rail {
                Some(r) if r >= self.vehicle.rails.len() => {
                    return Err(SimError::construction(format!("{what} references missing rail {r}")));
                }
                Some(r) => Some(RailRef { vehicle: id, rail: r }),
                None => None,
            };
            self.vehicle.slide_nodes.push(SlideNode {
                node,
                rail,
                spring: sd.spring,
                damp: sd.damp,
                break_force: sd.break_force,
                tolerance: sd.tolerance,
                threshold: sd.attach_distance.max(sd.tolerance),
                attach_rate: sd.attach_rate,
                attach_distance: sd.attach_distance,
                attach_foreign: sd.attach_foreign,
                attach_self: sd.attach_self,
                broken: false,
                segment: 0,
                ratio: 0.0,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::couplers::HookState;
    use crate::def::{HookDef, NodeDef, RailDef, RigidifierDef, SlideNodeDef, TieDef};

    fn tri() -> VehicleDef {
        VehicleDef {
            name: "tri".to_string(),
            nodes: vec![NodeDef::at(0.0, 1.0, 0.0), NodeDef::at(1.0, 1.0, 0.0), NodeDef::at(0.0, 2.0, 0.0)],
            beams: vec![BeamDef::between(0, 1), BeamDef::between(1, 2), BeamDef::between(2, 0)],
            ..VehicleDef::default()
        }
    }

    fn build(def: &VehicleDef) -> Result<Vehicle, SimError> {
        build_vehicle(VehicleId(7), def, Vec3::new(10.0, 0.0, -5.0), &SimContext::default())
    }

    #[test]
    fn test_nodes_placed_relative_to_origin() {
        let v = build(&tri()).expect("valid");
        assert_eq!(v.nodes()[1].rel_pos, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(v.nodes()[1].abs_pos, Vec3::new(11.0, 1.0, -5.0));
        assert_eq!(v.state(), crate::vehicle::VehicleState::Deactivated);
        assert!(v.events.is_empty());
    }

    #[test]
    fn test_described_beams_come_first() {
        let v = build(&tri()).expect("valid");
        assert_eq!((v.beams()[1].p1, v.beams()[1].p2), (1, 2));
        assert!((v.beams()[1].length - 2f32.sqrt()).abs() < 1e-6);
        assert_eq!(v.topology.neighbours(0).len(), 2);
    }

    #[test]
    fn test_dangling_node_rejected() {
        let mut def = tri();
        def.beams.push(BeamDef::between(0, 9));
        let err = build(&def).unwrap_err();
        assert!(matches!(err, SimError::Construction(_)), "{err}");
    }

    #[test]
    fn test_self_beam_rejected() {
        let mut def = tri();
        def.beams.push(BeamDef::between(1, 1));
        assert!(matches!(build(&def), Err(SimError::Construction(_))));
    }

    #[test]
    fn test_too_many_nodes_is_exhaustion() {
        let def = VehicleDef {
            nodes: (0..=MAX_NODES).map(|i| NodeDef::at(i as f32, 0.0, 0.0)).collect(),
            ..VehicleDef::default()
        };
        let err = build(&def).unwrap_err();
        assert!(matches!(err, SimError::ResourceExhausted { what: "nodes", limit: MAX_NODES }));
    }

    #[test]
    fn test_command_key_out_of_range() {
        let mut def = tri();
        def.commands.push(CommandDef {
            nodes: [0, 2],
            key_short: 1,
            key_long: MAX_COMMANDS + 1,
            ..CommandDef::default()
        });
        assert!(matches!(build(&def), Err(SimError::ResourceExhausted { .. })));
    }

    #[test]
    fn test_triggers_follow_shocks() {
        let mut def = tri();
        def.shocks.push(ShockDef {
            nodes: [0, 2],
            ..ShockDef::default()
        });
        def.triggers.push(TriggerDef {
            nodes: [1, 2],
            cmd_short: 3,
            cmd_long: 4,
            options: vec![TriggerOption::Continuous],
            start_disabled: true,
            ..TriggerDef::default()
        });
        let v = build(&def).expect("valid");
        assert_eq!(v.shocks().len(), 2);
        let trigger = &v.shocks()[1];
        assert!(trigger.is_trigger() && trigger.flags.contains(ShockFlags::TRG_CONTINUOUS));
        assert!(!trigger.trigger_enabled);
        let beam = &v.beams()[trigger.beam];
        assert_eq!(beam.bounded, BoundedKind::Trigger);
        assert_eq!((beam.k, beam.d), (0.0, 0.0));
        assert_eq!(v.beams()[v.shocks()[0].beam].bounded, BoundedKind::Shock1);
    }

    #[test]
    fn test_wheel_rim_generated() {
        let mut def = tri();
        def.nodes.push(NodeDef::at(0.0, 1.0, 0.5));
        def.wheels.push(WheelDef {
            axis: [0, 3],
            arm: 1,
            rays: 6,
            mass: 120.0,
            ..WheelDef::default()
        });
        let v = build(&def).expect("valid");
        let wheel = &v.wheels()[0];
        assert_eq!(wheel.rim.len(), 12);
        assert_eq!(wheel.near_attach, 0);
        assert!(wheel.rim.iter().all(|&r| v.nodes()[r].is_wheel));
        assert!((v.nodes()[wheel.rim[0]].mass() - 10.0).abs() < 1e-5);
        for &r in &wheel.rim {
            let hub = v.nodes()[0].rel_pos.distance(v.nodes()[r].rel_pos);
            let far = v.nodes()[3].rel_pos.distance(v.nodes()[r].rel_pos);
            assert!((hub.min(far) - 0.5).abs() < 1e-4);
        }
        assert_eq!(v.beams().len(), 3 + 12 * 4);
    }

    #[test]
    fn test_coupler_beams_start_disabled() {
        let mut def = tri();
        def.hooks.push(HookDef {
            node: 2,
            ..HookDef::default()
        });
        def.ties.push(TieDef {
            node: 1,
            max_length: 4.0,
            ..TieDef::default()
        });
        let v = build(&def).expect("valid");
        let hook = &v.hooks()[0];
        assert_eq!(hook.state, HookState::Unlocked);
        let beam = &v.beams()[hook.beam];
        assert!(beam.disabled && beam.p1 == 2 && beam.p2 == 0);
        let tie_beam = &v.beams()[v.ties()[0].beam];
        assert!(tie_beam.disabled);
        assert_eq!(tie_beam.ref_length, 4.0);
        assert!(tie_beam.defaults.disabled);
        // coupler beams stay out of the adjacency
        assert!(!v.topology.neighbours(2).contains(&2));
    }

    #[test]
    fn test_rigidifier_finds_arms() {
        let mut def = tri();
        def.rigidifiers.push(RigidifierDef {
            nodes: [0, 1, 2],
            ..RigidifierDef::default()
        });
        let v = build(&def).expect("valid");
        assert_eq!(v.rigidifiers[0].arms, [Some(0), Some(1)]);
    }

    #[test]
    fn test_slide_node_spawns_on_own_rail() {
        let mut def = tri();
        def.rails.push(RailDef { nodes: vec![0, 1] });
        def.slide_nodes.push(SlideNodeDef {
            node: 2,
            rail: Some(0),
            ..SlideNodeDef::default()
        });
        let v = build(&def).expect("valid");
        assert_eq!(v.slide_nodes()[0].rail, Some(RailRef { vehicle: VehicleId(7), rail: 0 }));

        def.slide_nodes[0].rail = Some(3);
        assert!(matches!(build(&def), Err(SimError::Construction(_))));
    }

    #[test]
    fn test_replay_buffer_sized_when_enabled() {
        let mut ctx = SimContext::default();
        ctx.settings.replay_enabled = true;
        ctx.settings.replay_frames = 8;
        let v = build_vehicle(VehicleId(1), &tri(), Vec3::ZERO, &ctx).expect("valid");
        assert_eq!(v.replay_buffer().map(ReplayBuffer::capacity), Some(8));
    }
}

//! Couplers: hooks, ties, ropes and slide-nodes.
//!
//! Couplers connect a node of one vehicle to a node of the same or another
//! vehicle. They never hold references; a peer is always addressed as a
//! [`NodeRef`] (or [`RopableRef`]) and resolved through the [`Fleet`] in the
//! sequential phase. Toggle requests queued by input or triggers are
//! resolved once per sub-step by [`process_requests`].

mod hooks;
mod linked;
mod ropes;
mod slide_nodes;
mod ties;

pub use hooks::{Hook, HookMode, HookState};
pub use ropes::Rope;
pub use slide_nodes::{Rail, RailRef, SlideNode};
pub use ties::{Ropable, Tie};

pub(crate) use hooks::toggle_hooks;
pub(crate) use linked::update_linked_sets;
pub(crate) use ropes::{follow_ropes, toggle_ropes, transfer_rope_forces};
pub(crate) use slide_nodes::{apply_slide_nodes, toggle_slide_nodes};
pub(crate) use ties::toggle_ties;

use crate::fleet::Fleet;
use crate::ids::{NodeRef, VehicleId};
use crate::vehicle::Vehicle;

/// A ropable slot addressed across vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RopableRef {
    pub vehicle: VehicleId,
    pub ropable: usize,
}

/// Toggle request queued on a vehicle and resolved in the sequential phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplerRequest {
    /// Group -1 addresses the standard hooks, -2 the auto-lock hooks and
    /// groups below -2 a single trigger group.
    Hook { group: i32, mode: HookMode },
    Tie { group: i32 },
    Rope { group: i32 },
    SlideNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CouplerKind {
    Hook,
    Tie,
    Rope,
}

/// Number of couplers of `kind` currently attached to `ropable`.
pub(crate) fn ropable_attachments(fleet: &Fleet<'_>, ropable: RopableRef, kind: CouplerKind) -> usize {
    let target = Some(ropable);
    fleet
        .iter()
        .map(|v| match kind {
            CouplerKind::Hook => v.hooks.iter().filter(|h| h.ropable == target).count(),
            CouplerKind::Tie => v.ties.iter().filter(|t| t.ropable == target).count(),
            CouplerKind::Rope => v.ropes.iter().filter(|r| r.ropable == target).count(),
        })
        .sum()
}

/// Nearest ropable within `max_distance` of `from` that accepts another
/// coupler of `kind`. `skip` filters out vehicles and slots by the caller's
/// rules.
pub(crate) fn nearest_ropable(
    fleet: &Fleet<'_>,
    from: glam::Vec3,
    max_distance: f32,
    kind: CouplerKind,
    skip: impl Fn(&Vehicle, &Ropable) -> bool,
) -> Option<(RopableRef, NodeRef, f32)> {
    let mut best: Option<(RopableRef, NodeRef, f32)> = None;
    for vehicle in fleet.iter().filter(|v| v.state().is_awake()) {
        for (i, ropable) in vehicle.ropables.iter().enumerate() {
            if skip(vehicle, ropable) {
                continue;
            }
            let rref = RopableRef {
                vehicle: vehicle.id(),
                ropable: i,
            };
            if !ropable.multilock && ropable_attachments(fleet, rref, kind) > 0 {
                continue;
            }
            let distance = from.distance(vehicle.nodes[ropable.node].abs_pos);
            let limit = best.map_or(max_distance, |b| b.2);
            if distance < limit {
                best = Some((rref, NodeRef::new(vehicle.id(), ropable.node), distance));
            }
        }
    }
    best
}

/// Point a coupler beam at `target`, enabling it.
pub(crate) fn attach_beam(vehicle: &mut Vehicle, beam: usize, target: NodeRef, length: f32) {
    let own = vehicle.id();
    let beam = &mut vehicle.beams[beam];
    beam.p2 = target.node;
    beam.remote = (target.vehicle != own).then_some(target);
    beam.length = length;
    beam.stress = 0.0;
    beam.disabled = false;
}

/// Park a coupler beam on node 0 of its vehicle, disabled.
pub(crate) fn detach_beam(vehicle: &mut Vehicle, beam: usize) {
    let beam = &mut vehicle.beams[beam];
    beam.p2 = 0;
    beam.remote = None;
    beam.stress = 0.0;
    beam.disabled = true;
}

/// Resolve every queued toggle request. Returns true when any coupler
/// changed state.
pub(crate) fn process_requests(fleet: &mut Fleet<'_>) -> bool {
    let mut queued = Vec::new();
    for vehicle in fleet.iter_mut() {
        for request in vehicle.pending_couplers.drain(..) {
            queued.push((vehicle.id, request));
        }
    }
    for (owner, request) in queued {
        match request {
            CouplerRequest::Hook { group, mode } => toggle_hooks(fleet, owner, group, mode),
            CouplerRequest::Tie { group } => toggle_ties(fleet, owner, group),
            CouplerRequest::Rope { group } => toggle_ropes(fleet, owner, group),
            CouplerRequest::SlideNode => toggle_slide_nodes(fleet, owner),
        }
    }
    let mut changed = false;
    for vehicle in fleet.iter_mut() {
        changed |= std::mem::take(&mut vehicle.couplers_changed);
    }
    changed
}

/// Drop every coupler that references `removed`, on all vehicles including
/// the removed one.
pub(crate) fn release_vehicle(fleet: &mut Fleet<'_>, removed: VehicleId) {
    for vehicle in fleet.iter_mut() {
        let own = vehicle.id();
        let all = own == removed;
        for i in 0..vehicle.hooks.len() {
            let hook = &vehicle.hooks[i];
            if hook.target.is_some_and(|t| all || t.vehicle == removed) {
                hooks::unlock_hook(vehicle, i);
            }
        }
        for i in 0..vehicle.ties.len() {
            if vehicle.ties[i].target.is_some_and(|t| all || t.vehicle == removed) {
                ties::untie(vehicle, i);
            }
        }
        for i in 0..vehicle.ropes.len() {
            if vehicle.ropes[i].target.is_some_and(|t| all || t.vehicle == removed) {
                ropes::unlock_rope(vehicle, i);
            }
        }
        for slide in &mut vehicle.slide_nodes {
            if slide.rail.is_some_and(|r| all || r.vehicle == removed) {
                slide.detach();
                vehicle.couplers_changed = true;
            }
        }
    }
}

/// Coupler edges of `vehicle` towards other vehicles.
pub(crate) fn coupled_vehicles(vehicle: &Vehicle) -> Vec<VehicleId> {
    let own = vehicle.id();
    let hooks = vehicle
        .hooks
        .iter()
        .filter(|h| matches!(h.state, HookState::PreLock | HookState::Locked))
        .filter_map(|h| h.target.map(|t| t.vehicle));
    let ties = vehicle.ties.iter().filter(|t| t.tied).filter_map(|t| t.target.map(|t| t.vehicle));
    let ropes = vehicle.ropes.iter().filter(|r| r.locked).filter_map(|r| r.target.map(|t| t.vehicle));
    let slides = vehicle.slide_nodes.iter().filter_map(|s| s.rail.map(|r| r.vehicle));
    let mut out: Vec<VehicleId> = hooks.chain(ties).chain(ropes).chain(slides).filter(|&v| v != own).collect();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{BeamDef, NodeDef, VehicleDef};

    #[test]
    fn test_detached_beam_parks_on_node_zero() {
        let def = VehicleDef {
            nodes: vec![
                NodeDef::at(0.0, 0.0, 0.0),
                NodeDef::at(1.0, 0.0, 0.0),
                NodeDef::at(2.0, 0.0, 0.0),
            ],
            beams: vec![BeamDef::between(1, 2)],
            ..VehicleDef::default()
        };
        let mut v = build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid");
        attach_beam(&mut v, 0, NodeRef::new(VehicleId(4), 2), 0.5);
        assert!(v.beams[0].remote.is_some());
        assert!(!v.beams[0].disabled);

        detach_beam(&mut v, 0);
        let beam = &v.beams[0];
        assert_eq!((beam.p1, beam.p2), (1, 0));
        assert!(beam.remote.is_none());
        assert!(beam.disabled);
        assert_eq!(beam.stress, 0.0);
    }
}

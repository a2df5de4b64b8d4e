use glam::Vec3;

use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::ids::{NodeRef, VehicleId};
use crate::vehicle::Vehicle;

use super::{CouplerKind, RopableRef, nearest_ropable};

/// A rope whose free end rides on a ropable of a peer once locked.
#[derive(Debug, Clone, PartialEq)]
pub struct Rope {
    pub root: usize,
    pub end: usize,
    /// Beam from `root` to `end`.
    pub beam: usize,
    pub group: i32,
    pub locked: bool,
    pub target: Option<NodeRef>,
    pub ropable: Option<RopableRef>,
}

impl Rope {
    pub fn new(root: usize, end: usize, beam: usize, group: i32) -> Self {
        Self {
            root,
            end,
            beam,
            group,
            locked: false,
            target: None,
            ropable: None,
        }
    }
}

pub(crate) fn unlock_rope(vehicle: &mut Vehicle, index: usize) {
    let rope = &mut vehicle.ropes[index];
    rope.locked = false;
    rope.target = None;
    rope.ropable = None;
    vehicle.couplers_changed = true;
    let id = vehicle.id();
    vehicle.emit(SimEvent::RopeChanged {
        vehicle: id,
        rope: index,
        locked: false,
    });
}

pub(crate) fn toggle_ropes(fleet: &mut Fleet<'_>, owner: VehicleId, group: i32) {
    let Some(vehicle) = fleet.get(owner) else {
        return;
    };
    let mut unlocks = Vec::new();
    let mut locks: Vec<(usize, RopableRef, NodeRef)> = Vec::new();
    for (i, rope) in vehicle.ropes.iter().enumerate() {
        if group != -1 && rope.group != -1 && rope.group != group {
            continue;
        }
        if rope.locked {
            unlocks.push(i);
            continue;
        }
        let from = vehicle.nodes[rope.end].abs_pos;
        let reach = vehicle.beams[rope.beam].length;
        let found = nearest_ropable(fleet, from, reach, CouplerKind::Rope, |v, r| {
            v.id() == owner && (r.node == rope.end || r.node == rope.root)
        });
        if let Some((rref, node, _)) = found
            && !locks.iter().any(|&(_, r, _)| r == rref)
        {
            locks.push((i, rref, node));
        }
    }
    let Some(vehicle) = fleet.get_mut(owner) else {
        return;
    };
    for i in unlocks {
        unlock_rope(vehicle, i);
    }
    for (i, rref, node) in locks {
        let rope = &mut vehicle.ropes[i];
        rope.locked = true;
        rope.target = Some(node);
        rope.ropable = Some(rref);
        vehicle.couplers_changed = true;
        vehicle.emit(SimEvent::RopeChanged {
            vehicle: owner,
            rope: i,
            locked: true,
        });
    }
}

fn locked_ends(fleet: &Fleet<'_>) -> Vec<(VehicleId, usize, NodeRef)> {
    fleet
        .iter()
        .filter(|v| v.state().is_simulated())
        .flat_map(|v| {
            v.ropes
                .iter()
                .filter(|r| r.locked)
                .filter_map(move |r| r.target.map(|t| (v.id(), r.end, t)))
        })
        .collect()
}

/// Move the force gathered on each locked rope end onto its peer node.
pub(crate) fn transfer_rope_forces(fleet: &mut Fleet<'_>) {
    for (owner, end, target) in locked_ends(fleet) {
        let force = match fleet.get_mut(owner) {
            Some(v) => std::mem::replace(&mut v.nodes[end].forces, Vec3::ZERO),
            None => continue,
        };
        if let Some(peer) = fleet.get_mut(target.vehicle)
            && let Some(node) = peer.nodes.get_mut(target.node)
        {
            node.forces += force;
        }
    }
}

/// Put each locked rope end on its peer node, after integration.
pub(crate) fn follow_ropes(fleet: &mut Fleet<'_>) {
    for (owner, end, target) in locked_ends(fleet) {
        let Some((abs, velocity)) = fleet
            .get(target.vehicle)
            .and_then(|peer| peer.nodes.get(target.node))
            .map(|n| (n.abs_pos, n.velocity))
        else {
            continue;
        };
        if let Some(vehicle) = fleet.get_mut(owner) {
            let origin = vehicle.origin;
            let node = &mut vehicle.nodes[end];
            node.set_position(origin, abs - origin);
            node.velocity = velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{NodeDef, RopableDef, RopeDef, VehicleDef};
    use crate::fleet::VehicleSlot;

    /// Vehicle 0 carries a 1 m rope along x; vehicle 1 offers a ropable
    /// half a metre past the rope end.
    fn rope_and_anchor() -> Vec<VehicleSlot> {
        let ctx = SimContext::default();
        let puller = VehicleDef {
            nodes: vec![NodeDef::at(0.0, 0.0, 0.0), NodeDef::at(1.0, 0.0, 0.0)],
            ropes: vec![RopeDef {
                root: 0,
                end: 1,
                ..RopeDef::default()
            }],
            ..VehicleDef::default()
        };
        let anchor = VehicleDef {
            nodes: vec![NodeDef::at(1.5, 0.0, 0.0), NodeDef::at(1.5, 1.0, 0.0)],
            ropables: vec![RopableDef::default()],
            ..VehicleDef::default()
        };
        [(0, puller), (1, anchor)]
            .into_iter()
            .map(|(id, def)| {
                let v = build_vehicle(VehicleId(id), &def, Vec3::ZERO, &ctx).expect("valid");
                Some(Arc::new(Mutex::new(v)))
            })
            .collect()
    }

    #[test]
    fn test_new_rope_is_free() {
        let rope = Rope::new(0, 1, 3, -1);
        assert!(!rope.locked);
        assert!(rope.target.is_none());
    }

    #[test]
    fn test_toggle_locks_then_unlocks() {
        let slots = rope_and_anchor();
        let mut fleet = Fleet::lock(&slots);
        let (owner, anchor) = (VehicleId(0), VehicleId(1));

        toggle_ropes(&mut fleet, owner, -1);
        let v = fleet.get(owner).expect("owner");
        assert!(v.ropes[0].locked);
        assert_eq!(v.ropes[0].target, Some(NodeRef::new(anchor, 0)));
        assert_eq!(
            v.ropes[0].ropable,
            Some(RopableRef {
                vehicle: anchor,
                ropable: 0
            })
        );

        toggle_ropes(&mut fleet, owner, -1);
        let v = fleet.get(owner).expect("owner");
        assert!(!v.ropes[0].locked);
        assert!(v.ropes[0].target.is_none());
        let locks: Vec<bool> = v
            .events
            .iter()
            .filter_map(|e| match e {
                SimEvent::RopeChanged { locked, .. } => Some(*locked),
                _ => None,
            })
            .collect();
        assert_eq!(locks, vec![true, false]);
    }

    #[test]
    fn test_ropable_out_of_reach_stays_free() {
        let slots = rope_and_anchor();
        let mut fleet = Fleet::lock(&slots);
        if let Some(anchor) = fleet.get_mut(VehicleId(1)) {
            anchor.nodes[0].set_position(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0));
        }
        toggle_ropes(&mut fleet, VehicleId(0), -1);
        assert!(!fleet.get(VehicleId(0)).expect("owner").ropes[0].locked);
    }

    #[test]
    fn test_locked_end_follows_peer() {
        let slots = rope_and_anchor();
        let mut fleet = Fleet::lock(&slots);
        toggle_ropes(&mut fleet, VehicleId(0), -1);

        let anchor = fleet.get_mut(VehicleId(1)).expect("anchor");
        anchor.nodes[0].set_position(Vec3::ZERO, Vec3::new(1.7, 0.2, 0.0));
        anchor.nodes[0].velocity = Vec3::new(0.0, 3.0, 0.0);
        follow_ropes(&mut fleet);

        let end = &fleet.get(VehicleId(0)).expect("owner").nodes[1];
        assert_eq!(end.abs_pos, Vec3::new(1.7, 0.2, 0.0));
        assert_eq!(end.velocity, Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn test_end_force_moves_to_peer() {
        let slots = rope_and_anchor();
        let mut fleet = Fleet::lock(&slots);
        let pull = Vec3::new(-40.0, 5.0, 0.0);
        if let Some(owner) = fleet.get_mut(VehicleId(0)) {
            owner.nodes[1].forces = pull;
        }

        // unlocked ropes keep their force
        transfer_rope_forces(&mut fleet);
        assert_eq!(fleet.get(VehicleId(0)).expect("owner").nodes[1].forces, pull);

        toggle_ropes(&mut fleet, VehicleId(0), -1);
        transfer_rope_forces(&mut fleet);
        assert_eq!(fleet.get(VehicleId(0)).expect("owner").nodes[1].forces, Vec3::ZERO);
        let anchor = fleet.get(VehicleId(1)).expect("anchor");
        assert_eq!(anchor.nodes[0].forces, pull);
        assert_eq!(anchor.nodes[1].forces, Vec3::ZERO);
    }
}

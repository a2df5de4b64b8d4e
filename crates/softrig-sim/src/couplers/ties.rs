use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::ids::{NodeRef, VehicleId};
use crate::inertia::InertiaChannel;
use crate::vehicle::Vehicle;

use super::{CouplerKind, RopableRef, attach_beam, detach_beam, nearest_ropable};

/// A node other vehicles' ties, ropes and hooks may attach to.
#[derive(Debug, Clone, PartialEq)]
pub struct Ropable {
    pub node: usize,
    pub group: i32,
    /// Accepts several couplers at once.
    pub multilock: bool,
}

#[derive(Debug, Clone)]
pub struct Tie {
    pub node: usize,
    /// Rope-bounded beam from `node` to the target.
    pub beam: usize,
    pub group: i32,
    pub tied: bool,
    /// Still shortening.
    pub tying: bool,
    pub target: Option<NodeRef>,
    pub ropable: Option<RopableRef>,
    /// Shortening rate, m/s.
    pub rate: f32,
    /// Fraction of the initial length where shortening stops.
    pub min_length: f32,
    pub max_stress: f32,
    pub no_self_lock: bool,
    pub inertia: InertiaChannel,
}

impl Tie {
    pub fn is_tied(&self) -> bool {
        self.tied
    }
}

pub(crate) fn untie(vehicle: &mut Vehicle, index: usize) {
    let tie = &mut vehicle.ties[index];
    tie.tied = false;
    tie.tying = false;
    tie.target = None;
    tie.ropable = None;
    tie.inertia.reset();
    let beam = tie.beam;
    detach_beam(vehicle, beam);
    let refl = vehicle.beams[beam].ref_length;
    vehicle.beams[beam].length = refl;
    vehicle.couplers_changed = true;
    let id = vehicle.id();
    vehicle.emit(SimEvent::TieChanged {
        vehicle: id,
        tie: index,
        tied: false,
    });
}

/// Untie every tied tie of `group`; when none was tied, tie each one to
/// the nearest free ropable within reach.
pub(crate) fn toggle_ties(fleet: &mut Fleet<'_>, owner: VehicleId, group: i32) {
    let Some(vehicle) = fleet.get(owner) else {
        return;
    };
    let in_group = |t: &Tie| group == -1 || t.group == -1 || t.group == group;
    let tied: Vec<usize> = (0..vehicle.ties.len())
        .filter(|&i| vehicle.ties[i].tied && in_group(&vehicle.ties[i]))
        .collect();
    if !tied.is_empty() {
        if let Some(vehicle) = fleet.get_mut(owner) {
            for i in tied {
                untie(vehicle, i);
            }
        }
        return;
    }

    let mut locks = Vec::new();
    for (i, tie) in vehicle.ties.iter().enumerate() {
        if tie.tied || !in_group(tie) {
            continue;
        }
        let from = vehicle.nodes[tie.node].abs_pos;
        let reach = vehicle.beams[tie.beam].ref_length;
        let found = nearest_ropable(fleet, from, reach, CouplerKind::Tie, |v, r| {
            v.id() == owner && (tie.no_self_lock || r.node == tie.node)
        });
        // ropables taken earlier in this pass count as used
        if let Some((rref, node, _)) = found
            && !locks.iter().any(|&(_, r, _)| r == rref)
        {
            locks.push((i, rref, node));
        }
    }
    let Some(vehicle) = fleet.get_mut(owner) else {
        return;
    };
    for (i, rref, node) in locks {
        let tie = &mut vehicle.ties[i];
        tie.tied = true;
        tie.tying = true;
        tie.target = Some(node);
        tie.ropable = Some(rref);
        let beam = tie.beam;
        let length = vehicle.beams[beam].ref_length;
        attach_beam(vehicle, beam, node, length);
        vehicle.couplers_changed = true;
        vehicle.emit(SimEvent::TieChanged {
            vehicle: owner,
            tie: i,
            tied: true,
        });
    }
}

impl Vehicle {
    /// Shorten the ties that are still tying.
    pub(crate) fn calc_ties(&mut self, dt: f32) {
        for tie in &mut self.ties {
            if !tie.tying {
                continue;
            }
            let beam = &mut self.beams[tie.beam];
            let factor = tie.inertia.calc_delay(1.0, dt);
            if beam.length / beam.ref_length > tie.min_length {
                beam.length *= 1.0 - tie.rate * factor * dt / beam.length;
            } else {
                tie.tying = false;
            }
            if beam.stress.abs() > tie.max_stress {
                tie.tying = false;
            }
        }
    }
}

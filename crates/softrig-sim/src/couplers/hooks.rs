use crate::constants::NODE_LOCKGROUP_EXCLUDED;
use crate::def::HookDef;
use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::ids::{NodeRef, VehicleId};
use crate::vehicle::Vehicle;

use super::{CouplerKind, RopableRef, attach_beam, detach_beam, nearest_ropable};

/// Shortest length the assistance beam is pulled to.
const MIN_ASSIST_LENGTH: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    Unlocked,
    /// Target chosen; the assistance beam is pulling it in.
    PreLock,
    Locked,
    /// Released this sub-step; unlocked on the next.
    PreUnlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    Toggle,
    Lock,
    Unlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hook {
    pub node: usize,
    /// Assistance beam.
    pub beam: usize,
    pub state: HookState,
    pub target: Option<NodeRef>,
    pub ropable: Option<RopableRef>,
    pub range: f32,
    /// Assistance beam shortening speed, m/s.
    pub speed: f32,
    pub max_force: f32,
    pub group: i32,
    pub lock_group: i32,
    pub auto_lock: bool,
    pub self_lock: bool,
    pub no_disable: bool,
    pub relock_time: f32,
    /// Relock delay left, seconds.
    pub timer: f32,
    pub min_length: f32,
    pub lock_ropables: bool,
}

impl Hook {
    pub fn new(def: &HookDef, beam: usize) -> Self {
        // auto-lock hooks live in the negative groups
        let group = if def.auto_lock && def.group == -1 { -2 } else { def.group };
        Self {
            node: def.node,
            beam,
            state: HookState::Unlocked,
            target: None,
            ropable: None,
            range: def.range,
            speed: def.speed,
            max_force: def.max_force,
            group,
            lock_group: def.lock_group,
            auto_lock: def.auto_lock,
            self_lock: def.self_lock,
            no_disable: def.no_disable,
            relock_time: def.relock_time,
            timer: 0.0,
            min_length: def.min_length,
            lock_ropables: def.lock_ropables,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state == HookState::Locked
    }

    /// Whether a request for `group` in `mode` addresses this hook.
    fn selected(&self, group: i32, mode: HookMode) -> bool {
        let in_group = match (mode, group) {
            (HookMode::Toggle, -1) => self.group >= -1,
            (HookMode::Toggle, g) => self.group == g,
            (_, -2) => self.group <= -2 && self.auto_lock,
            (_, g) if g <= -3 => self.group == g,
            (_, -1) => self.group >= -1,
            (_, g) => self.group == g,
        };
        in_group && !(mode == HookMode::Lock && self.timer > 0.0)
    }
}

enum HookAction {
    Lock {
        target: NodeRef,
        ropable: Option<RopableRef>,
        distance: f32,
    },
    Unlock,
}

/// Nearest lockable node for `hook` over all awake vehicles.
fn find_target(fleet: &Fleet<'_>, owner: &Vehicle, hook: &Hook) -> Option<(NodeRef, Option<RopableRef>, f32)> {
    let from = owner.nodes[hook.node].abs_pos;
    if hook.lock_ropables {
        return nearest_ropable(fleet, from, hook.range, CouplerKind::Hook, |v, r| {
            (v.id() == owner.id() && (!hook.self_lock || r.node == hook.node))
                || (hook.lock_group != -1 && v.nodes[r.node].lock_group != hook.lock_group)
        })
        .map(|(rref, node, d)| (node, Some(rref), d));
    }
    let mut best: Option<(NodeRef, f32)> = None;
    for vehicle in fleet.iter().filter(|v| v.state().is_awake()) {
        let own = vehicle.id() == owner.id();
        if own && !hook.self_lock {
            continue;
        }
        for (i, node) in vehicle.nodes.iter().enumerate() {
            if node.lock_group == NODE_LOCKGROUP_EXCLUDED || (own && i == hook.node) {
                continue;
            }
            if hook.lock_group != -1 && node.lock_group != hook.lock_group {
                continue;
            }
            let distance = from.distance(node.abs_pos);
            if distance < best.map_or(hook.range, |b| b.1) {
                best = Some((NodeRef::new(vehicle.id(), i), distance));
            }
        }
    }
    best.map(|(node, d)| (node, None, d))
}

pub(crate) fn unlock_hook(vehicle: &mut Vehicle, index: usize) {
    let hook = &mut vehicle.hooks[index];
    hook.state = HookState::PreUnlock;
    if hook.group <= -2 {
        hook.timer = hook.relock_time;
    }
    hook.target = None;
    hook.ropable = None;
    let beam = hook.beam;
    detach_beam(vehicle, beam);
    vehicle.couplers_changed = true;
    let id = vehicle.id();
    vehicle.emit(SimEvent::HookUnlocked {
        vehicle: id,
        hook: index,
    });
}

/// Lock, unlock or toggle the hooks of `owner` addressed by `group`.
pub(crate) fn toggle_hooks(fleet: &mut Fleet<'_>, owner: VehicleId, group: i32, mode: HookMode) {
    let Some(vehicle) = fleet.get(owner) else {
        return;
    };
    let mut actions = Vec::new();
    for (i, hook) in vehicle.hooks.iter().enumerate() {
        if !hook.selected(group, mode) {
            continue;
        }
        if mode != HookMode::Unlock && hook.state == HookState::Unlocked {
            if let Some((target, ropable, distance)) = find_target(fleet, vehicle, hook) {
                actions.push((i, HookAction::Lock { target, ropable, distance }));
            }
        } else if matches!(hook.state, HookState::Locked | HookState::PreLock) && mode != HookMode::Lock {
            actions.push((i, HookAction::Unlock));
        }
    }
    let Some(vehicle) = fleet.get_mut(owner) else {
        return;
    };
    for (i, action) in actions {
        match action {
            HookAction::Lock { target, ropable, distance } => {
                let hook = &mut vehicle.hooks[i];
                hook.state = HookState::PreLock;
                hook.target = Some(target);
                hook.ropable = ropable;
                let beam = hook.beam;
                attach_beam(vehicle, beam, target, distance);
                vehicle.couplers_changed = true;
                tracing::debug!(vehicle = %owner, hook = i, target = %target.vehicle, node = target.node, "hook pre-lock");
            }
            HookAction::Unlock => unlock_hook(vehicle, i),
        }
    }
}

impl Vehicle {
    /// Per sub-step hook state machine: pull pre-locked hooks in and finish
    /// pending unlocks.
    pub(crate) fn calc_hooks(&mut self, dt: f32) {
        let mut locked = Vec::new();
        let mut released = Vec::new();
        for (i, hook) in self.hooks.iter_mut().enumerate() {
            hook.timer = (hook.timer - dt).max(0.0);
            match hook.state {
                HookState::PreLock => {
                    let beam = &mut self.beams[hook.beam];
                    let step = hook.speed * dt;
                    let overloaded = beam.stress.abs() >= hook.max_force;
                    if beam.length < hook.min_length {
                        hook.state = HookState::Locked;
                    } else if !overloaded {
                        if beam.length > step {
                            beam.length -= step;
                        } else {
                            beam.length = MIN_ASSIST_LENGTH;
                            hook.state = HookState::Locked;
                        }
                    } else if hook.no_disable {
                        hook.state = HookState::Locked;
                    } else {
                        released.push(i);
                        continue;
                    }
                    if hook.state == HookState::Locked
                        && let Some(target) = hook.target
                    {
                        locked.push((i, target));
                    }
                }
                HookState::PreUnlock => hook.state = HookState::Unlocked,
                HookState::Unlocked | HookState::Locked => {}
            }
        }
        for i in released {
            tracing::debug!(vehicle = %self.id, hook = i, "hook force exceeded, released");
            unlock_hook(self, i);
            self.hooks[i].state = HookState::Unlocked;
        }
        for (hook, target) in locked {
            self.couplers_changed = true;
            self.emit(SimEvent::HookLocked {
                vehicle: self.id,
                hook,
                target,
            });
        }
    }

    pub fn has_auto_lock_hooks(&self) -> bool {
        self.hooks.iter().any(|h| h.auto_lock)
    }
}

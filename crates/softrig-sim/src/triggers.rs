//! Trigger beams: shocks whose bounds fire command keys, block other
//! triggers, switch commands, toggle hooks and drive the engine.

use crate::commands::CommandKey;
use crate::constants::MAX_COMMANDS;
use crate::couplers::{CouplerRequest, HookMode};
use crate::shocks::{BoundState, EngineTriggerAction, ShockFlags, bound_state};
use crate::vehicle::Vehicle;

/// A trigger beam evaluated by the beam kernel this sub-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TriggerHit {
    pub shock: usize,
    pub beam: usize,
    pub diff: f32,
    pub length: f32,
    pub long_bound: f32,
    pub short_bound: f32,
}

/// Debug message ids, so a state is logged once until it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum TriggerLog {
    Disabled = 1,
    KeyReleased = 2,
    Switched = 3,
    Long = 4,
    Short = 5,
    Enabled = 6,
    SwitchReset = 7,
    KeyBlocked = 8,
}

impl Vehicle {
    fn key_mut(&mut self, id: i32) -> Option<&mut CommandKey> {
        let id = usize::try_from(id).ok().filter(|&i| (1..=MAX_COMMANDS).contains(&i))?;
        self.commands.get_mut(id)
    }

    fn key_blocked(&self, id: i32) -> bool {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.commands.get(i))
            .is_some_and(|k| k.blocked)
    }

    fn set_trigger_input(&mut self, id: i32, value: f32) {
        if let Some(key) = self.key_mut(id) {
            key.trigger = value;
        }
    }

    /// Enable or disable the trigger beams `first..=last`; indices that are
    /// not trigger beams are skipped.
    fn set_triggers_enabled(&mut self, first: usize, count: i32, enabled: bool) -> bool {
        let mut changed = false;
        for b in first..first + usize::try_from(count).unwrap_or(0) {
            let Some(s) = self.beams.get(b).and_then(|beam| beam.shock) else {
                continue;
            };
            let shock = &mut self.shocks[s];
            if shock.is_trigger() {
                changed |= shock.trigger_enabled != enabled;
                shock.trigger_enabled = enabled;
            }
        }
        changed
    }

    /// Swap the command ids of every other trigger wired to the same pair
    /// as `switch`. Returns true if any trigger was switched.
    fn switch_commands(&mut self, switch: usize) -> bool {
        let (short, long) = (self.shocks[switch].trigger_cmd_short, self.shocks[switch].trigger_cmd_long);
        let mut switched = false;
        for (s, shock) in self.shocks.iter_mut().enumerate() {
            let (s1, l1) = (shock.trigger_cmd_short, shock.trigger_cmd_long);
            if s != switch && ((s1 == short && l1 == long) || (s1 == long && l1 == short)) {
                shock.trigger_cmd_short = l1;
                shock.trigger_cmd_long = s1;
                switched = true;
            }
        }
        switched
    }

    fn engine_trigger(&mut self, action: i32, value: f32) {
        let Some(action) = EngineTriggerAction::from_id(action) else {
            return;
        };
        if action == EngineTriggerAction::Brake {
            self.brakes.brake = value * self.brakes.brake_force;
            return;
        }
        let Some(engine) = &mut self.engine else {
            return;
        };
        match action {
            EngineTriggerAction::Clutch => engine.set_clutch(value),
            EngineTriggerAction::Accelerator => engine.set_acc(value),
            EngineTriggerAction::ShiftUp => engine.shift(1),
            EngineTriggerAction::ShiftDown => engine.shift(-1),
            EngineTriggerAction::Brake | EngineTriggerAction::Rpm => {}
        }
    }

    fn log_trigger(&mut self, shock: usize, beam: usize, message: TriggerLog, debug: bool) {
        let state = message as u8;
        if debug && self.shocks[shock].last_debug_state != state {
            self.shocks[shock].last_debug_state = state;
            tracing::trace!(vehicle = %self.id, beam, ?message, "trigger");
        }
    }

    /// Resolve the trigger beams hit this sub-step. `update` is set on the
    /// first sub-step of a frame; hook actions only fire then.
    pub(crate) fn process_triggers(&mut self, hits: &[TriggerHit], dt: f32, update: bool, debug: bool) {
        for hit in hits {
            let s = hit.shock;
            if !self.shocks[s].trigger_enabled {
                continue;
            }
            let flags = self.shocks[s].flags;
            let (cmd_short, cmd_long) = (self.shocks[s].trigger_cmd_short, self.shocks[s].trigger_cmd_long);
            let state = bound_state(hit.diff, hit.length, hit.long_bound, hit.short_bound);

            if state == BoundState::Inside {
                if flags.contains(ShockFlags::TRG_CONTINUOUS) {
                    let span = hit.long_bound - hit.short_bound;
                    if span > 0.0 {
                        let value = ((hit.diff / hit.length - hit.short_bound) / span).clamp(0.0, 1.0);
                        if flags.contains(ShockFlags::TRG_ENGINE) {
                            self.engine_trigger(cmd_long, value);
                        } else {
                            self.set_trigger_input(cmd_short, value);
                            self.set_trigger_input(cmd_long, value);
                        }
                    }
                } else if flags.contains(ShockFlags::TRG_BLOCKER) {
                    if self.set_triggers_enabled(hit.beam + 1, cmd_long, true) {
                        self.log_trigger(s, hit.beam, TriggerLog::Enabled, debug);
                    }
                } else if flags.contains(ShockFlags::TRG_BLOCKER_A) {
                    if self.set_triggers_enabled(hit.beam + 1, cmd_short, false) {
                        self.log_trigger(s, hit.beam, TriggerLog::Disabled, debug);
                    }
                } else if flags.contains(ShockFlags::TRG_CMD_SWITCH) && self.shocks[s].trigger_switch_state != 0.0 {
                    self.shocks[s].trigger_switch_state = 0.0;
                    self.log_trigger(s, hit.beam, TriggerLog::SwitchReset, debug);
                } else if flags.contains(ShockFlags::TRG_CMD_BLOCKER) && !self.key_blocked(cmd_short) {
                    if let Some(key) = self.key_mut(cmd_short) {
                        key.blocked = true;
                    }
                    self.log_trigger(s, hit.beam, TriggerLog::KeyBlocked, debug);
                }
                continue;
            }

            let shock = &mut self.shocks[s];
            shock.trigger_switch_state = (shock.trigger_switch_state - dt).max(0.0);

            if flags.contains(ShockFlags::TRG_BLOCKER) {
                if self.set_triggers_enabled(hit.beam + 1, cmd_short, false) {
                    self.log_trigger(s, hit.beam, TriggerLog::Disabled, debug);
                }
            } else if flags.contains(ShockFlags::TRG_BLOCKER_A) {
                if self.set_triggers_enabled(hit.beam + 1, cmd_long, true) {
                    self.log_trigger(s, hit.beam, TriggerLog::Enabled, debug);
                }
            } else if flags.contains(ShockFlags::TRG_CMD_BLOCKER) {
                if let Some(key) = self.key_mut(cmd_short) {
                    key.blocked = false;
                }
                self.log_trigger(s, hit.beam, TriggerLog::KeyReleased, debug);
            } else if flags.contains(ShockFlags::TRG_CMD_SWITCH) {
                if self.shocks[s].trigger_switch_state == 0.0 && self.switch_commands(s) {
                    self.shocks[s].trigger_switch_state = self.shocks[s].trigger_boundary_time;
                    self.log_trigger(s, hit.beam, TriggerLog::Switched, debug);
                }
            } else {
                let long = state == BoundState::PastLong;
                let hook_group = if long { cmd_long } else { cmd_short };
                if flags.contains(ShockFlags::TRG_HOOK_UNLOCK) {
                    if update {
                        self.pending_couplers.push(CouplerRequest::Hook {
                            group: hook_group,
                            mode: HookMode::Unlock,
                        });
                    }
                } else if flags.contains(ShockFlags::TRG_HOOK_LOCK) {
                    if update {
                        self.pending_couplers.push(CouplerRequest::Hook {
                            group: hook_group,
                            mode: HookMode::Lock,
                        });
                    }
                } else if flags.contains(ShockFlags::TRG_ENGINE) {
                    let value = if long || !flags.contains(ShockFlags::TRG_CONTINUOUS) { 1.0 } else { 0.0 };
                    self.engine_trigger(cmd_long, value);
                } else if long {
                    if !self.key_blocked(cmd_long) {
                        if flags.contains(ShockFlags::TRG_CONTINUOUS) {
                            self.set_trigger_input(cmd_short, 1.0);
                        } else {
                            self.set_trigger_input(cmd_long, 1.0);
                        }
                        self.log_trigger(s, hit.beam, TriggerLog::Long, debug);
                    }
                } else if !self.key_blocked(cmd_short) {
                    let value = if flags.contains(ShockFlags::TRG_CONTINUOUS) { 0.0 } else { 1.0 };
                    self.set_trigger_input(cmd_short, value);
                    self.log_trigger(s, hit.beam, TriggerLog::Short, debug);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{NodeDef, TriggerDef, TriggerOption, VehicleDef};
    use crate::ids::VehicleId;

    fn rig(triggers: Vec<TriggerDef>) -> Vehicle {
        let def = VehicleDef {
            nodes: vec![NodeDef::at(0.0, 1.0, 0.0), NodeDef::at(1.0, 1.0, 0.0), NodeDef::at(0.0, 2.0, 0.0)],
            triggers,
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid")
    }

    fn trigger(options: Vec<TriggerOption>, cmd_short: i32, cmd_long: i32) -> TriggerDef {
        TriggerDef {
            nodes: [0, 1],
            short_bound: 0.1,
            long_bound: 0.1,
            cmd_short,
            cmd_long,
            options,
            ..TriggerDef::default()
        }
    }

    fn hit(v: &Vehicle, index: usize, diff: f32) -> TriggerHit {
        let shock = v.shocks[index].clone();
        let beam = &v.beams[shock.beam];
        TriggerHit {
            shock: index,
            beam: shock.beam,
            diff,
            length: beam.length,
            long_bound: beam.long_bound,
            short_bound: beam.short_bound,
        }
    }

    #[test]
    fn test_long_bound_presses_long_key() {
        let mut v = rig(vec![trigger(vec![], 3, 4)]);
        let h = hit(&v, 0, 0.5);
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!(v.commands[4].trigger, 1.0);
        assert_eq!(v.commands[3].trigger, 0.0);
        let h = hit(&v, 0, -0.5);
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!(v.commands[3].trigger, 1.0);
    }

    #[test]
    fn test_inside_bounds_is_quiet() {
        let mut v = rig(vec![trigger(vec![], 3, 4)]);
        let h = hit(&v, 0, 0.01);
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!(v.commands[3].trigger, 0.0);
        assert_eq!(v.commands[4].trigger, 0.0);
    }

    #[test]
    fn test_blocker_disables_following_triggers() {
        let mut v = rig(vec![trigger(vec![TriggerOption::Blocker], 1, 1), trigger(vec![], 5, 6)]);
        let blocker = hit(&v, 0, 0.5);
        let second = hit(&v, 1, 0.5);
        v.process_triggers(&[blocker, second], 0.0005, true, false);
        assert!(!v.shocks[1].trigger_enabled);
        assert_eq!(v.commands[6].trigger, 0.0);

        let blocker = hit(&v, 0, 0.0);
        v.process_triggers(&[blocker], 0.0005, true, false);
        assert!(v.shocks[1].trigger_enabled);
    }

    #[test]
    fn test_hook_trigger_queues_request_on_update_only() {
        let mut v = rig(vec![trigger(vec![TriggerOption::HookLock], -3, -4)]);
        let h = hit(&v, 0, 0.5);
        v.process_triggers(&[h], 0.0005, false, false);
        assert!(v.pending_couplers.is_empty());
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!(
            v.pending_couplers,
            vec![CouplerRequest::Hook {
                group: -4,
                mode: HookMode::Lock
            }]
        );
    }

    #[test]
    fn test_cmd_switch_swaps_pair_once() {
        let mut v = rig(vec![trigger(vec![TriggerOption::CmdSwitch], 3, 4), trigger(vec![], 3, 4)]);
        v.shocks[0].trigger_boundary_time = 1.0;
        let h = hit(&v, 0, 0.5);
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!((v.shocks[1].trigger_cmd_short, v.shocks[1].trigger_cmd_long), (4, 3));
        v.process_triggers(&[h], 0.0005, true, false);
        assert_eq!((v.shocks[1].trigger_cmd_short, v.shocks[1].trigger_cmd_long), (4, 3));
    }

    #[test]
    fn test_cmd_blocker_blocks_inside_and_releases_outside() {
        let mut v = rig(vec![trigger(vec![TriggerOption::CmdBlocker], 7, 7)]);
        let inside = hit(&v, 0, 0.0);
        v.process_triggers(&[inside], 0.0005, true, false);
        assert!(v.commands[7].blocked);
        let outside = hit(&v, 0, 0.5);
        v.process_triggers(&[outside], 0.0005, true, false);
        assert!(!v.commands[7].blocked);
    }
}

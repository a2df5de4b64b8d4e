//! Command keys driving command beams and rotators.
//!
//! A key's value is the larger of the player input and the trigger input of
//! the current sub-step. Bound beams lengthen or shorten by
//! `ratio · value · crank_factor · dt` until they reach their bound; the
//! work done is reported to the engine as hydraulic pump load.

use glam::Vec3;
use softrig_math::{project_on_plane, rotate_about_axis};

use crate::beam::Beam;
use crate::inertia::InertiaChannel;
use crate::node::Node;
use crate::vehicle::Vehicle;

/// Key value above which a command counts as pressed.
const PRESS_THRESHOLD: f32 = 0.5;
/// Key value separating the started and stopped states.
const ACTIVE_THRESHOLD: f32 = 0.01;
const CENTER_TOLERANCE: f32 = 0.0001;

/// One command key (1..=84; slot 0 is unused).
#[derive(Debug, Clone, Default)]
pub struct CommandKey {
    pub player: f32,
    /// Reset after every sub-step.
    pub trigger: f32,
    pub value: f32,
    /// +1 just started, -1 just stopped, 0 otherwise.
    pub state: i8,
    /// Player input ignored until the blocking trigger is left.
    pub blocked: bool,
    /// Bound beams with +1 to extend or -1 to contract.
    pub beams: Vec<(usize, i8)>,
    pub rotators: Vec<(usize, i8)>,
    pub inertia: Option<InertiaChannel>,
    pub rotator_inertia: Option<InertiaChannel>,
}

impl CommandKey {
    pub(crate) fn reset(&mut self) {
        self.player = 0.0;
        self.trigger = 0.0;
        self.value = 0.0;
        self.state = 0;
        self.blocked = false;
        for inertia in [&mut self.inertia, &mut self.rotator_inertia].into_iter().flatten() {
            inertia.reset();
        }
    }

    fn is_bound(&self) -> bool {
        !self.beams.is_empty() || !self.rotators.is_empty()
    }

    /// Fold the inputs into `value` and update the started/stopped state.
    fn latch(&mut self) {
        let old = self.value;
        let player = if self.blocked { 0.0 } else { self.player };
        self.value = player.max(self.trigger);
        self.trigger = 0.0;
        if self.value > ACTIVE_THRESHOLD && old < ACTIVE_THRESHOLD {
            self.state = 1;
        } else if self.value < ACTIVE_THRESHOLD && old > ACTIVE_THRESHOLD {
            self.state = -1;
        }
    }
}

/// A pair of four-node plates turned against each other around an axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotator {
    pub axis: [usize; 2],
    pub base_plate: [usize; 4],
    pub rotating_plate: [usize; 4],
    pub rate: f32,
    pub force: f32,
    pub tolerance: f32,
    pub angle: f32,
    pub engine_coupling: f32,
    pub needs_engine: bool,
}

impl Rotator {
    /// Angle error of the rotating plate against the commanded angle,
    /// averaged over both node pairs.
    pub fn angle_error(&self, nodes: &[Node]) -> f32 {
        self.pair_errors(nodes).map(|e| e.0 * 0.5).sum()
    }

    fn pair_errors<'a>(&'a self, nodes: &'a [Node]) -> impl Iterator<Item = (f32, Vec3, f32, Vec3, f32)> + 'a {
        let ax1 = nodes[self.axis[0]].rel_pos;
        let ax2 = nodes[self.axis[1]].rel_pos;
        let axis = (ax1 - ax2).normalize_or_zero();
        (0..2).map(move |k| {
            let r1 = project_on_plane(ax1 - nodes[self.base_plate[k]].rel_pos, axis);
            let r2 = project_on_plane(ax2 - nodes[self.rotating_plate[k]].rel_pos, axis);
            let (len1, len2) = (r1.length(), r2.length());
            let (ref1, ref2) = (r1.normalize_or_zero(), r2.normalize_or_zero());
            let expected = rotate_about_axis(ref1, self.angle + std::f32::consts::FRAC_PI_2, axis);
            let error = expected.dot(ref2).clamp(-1.0, 1.0).asin();
            (error, ref1.cross(axis), len1, ref2.cross(axis), len2)
        })
    }

    /// Accumulate the restoring forces on both plates.
    pub fn apply(&self, nodes: &mut [Node]) {
        let errors: Vec<_> = self.pair_errors(nodes).collect();
        for (k, (error, dir1, len1, dir2, len2)) in errors.into_iter().enumerate() {
            let len1 = if len1 <= self.tolerance { 0.0 } else { len1 };
            let len2 = if len2 <= self.tolerance { 0.0 } else { len2 };
            let f1 = dir1 * (error * len1 * self.force);
            let f2 = dir2 * (error * len2 * self.force);
            nodes[self.base_plate[k]].forces += f1;
            nodes[self.rotating_plate[k]].forces -= f2;
            nodes[self.base_plate[k + 2]].forces -= f1;
            nodes[self.rotating_plate[k + 2]].forces += f2;
        }
    }
}

/// Length change of one command beam; returns the new length.
fn step_length(beam: &Beam, dir: i8, value: f32, cf: f32, dt: f32) -> f32 {
    let ratio = if dir > 0 {
        beam.command.ratio_long
    } else {
        beam.command.ratio_short
    };
    let delta = ratio * value * cf * dt / beam.length;
    beam.length * (1.0 + f32::from(dir) * delta)
}

fn center_beam(beam: &mut Beam) {
    let current = beam.length / beam.ref_length;
    let target = beam.command.center_length;
    if (current - target).abs() < CENTER_TOLERANCE {
        beam.command.auto_moving_mode = 0;
        return;
    }
    let previous = beam.command.auto_moving_mode;
    beam.command.auto_moving_mode = if current > target { -1 } else { 1 };
    if previous != 0 && previous != beam.command.auto_moving_mode {
        // overshot the centre
        beam.length = target * beam.ref_length;
        beam.command.auto_moving_mode = 0;
    }
}

/// One-press and press-and-centre state machines.
fn one_press(beam: &mut Beam, dir: i32, clen: f32, pressed: bool) {
    let cmd = &mut beam.command;
    if cmd.one_press_mode == 2 {
        let past_center = dir as f32 * clen > dir as f32 * cmd.center_length;
        if dir * cmd.auto_moving_mode > 0 && past_center && !cmd.pressed_center_mode {
            cmd.pressed_center_mode = true;
            cmd.auto_moving_mode = 0;
        } else if dir * cmd.auto_moving_mode < 0 && past_center && cmd.pressed_center_mode {
            cmd.pressed_center_mode = false;
        }
    }
    let mode = cmd.auto_moving_mode;
    if dir * mode <= 0 && pressed {
        cmd.auto_moving_mode = dir;
    } else if mode == dir && !pressed {
        cmd.auto_moving_mode = dir * 2;
    } else if mode == dir * 2 && pressed {
        cmd.auto_moving_mode = dir * 3;
    } else if mode == dir * 3 && !pressed {
        cmd.auto_moving_mode = 0;
    }
}

impl Vehicle {
    /// Advance every command key by one sub-step.
    pub(crate) fn calc_commands(&mut self, dt: f32) {
        if !self.commands.iter().any(CommandKey::is_bound) {
            return;
        }
        let (engine_running, hydraulics_ready, crank) = match &self.engine {
            Some(e) => (e.is_running(), e.rpm() > e.idle_rpm() * 0.95, e.crank_factor()),
            None => (true, true, 1.0),
        };
        let powered = engine_running && hydraulics_ready;

        for key in &self.commands {
            for &(b, _) in &key.beams {
                self.beams[b].command.auto_move_lock = false;
            }
        }
        for key in &mut self.commands {
            key.latch();
            if key.value >= PRESS_THRESHOLD {
                for &(b, _) in &key.beams {
                    let cmd = &mut self.beams[b].command;
                    cmd.auto_move_lock = true;
                    if cmd.centering {
                        cmd.auto_moving_mode = 0;
                    }
                }
            }
        }

        let mut work = 0.0;
        let mut requested = false;
        for key in &mut self.commands {
            if !key.is_bound() {
                continue;
            }
            let raw = key.value;
            let filtered = match &mut key.inertia {
                Some(inertia) => inertia.calc_delay(raw, dt),
                None => raw,
            };
            for &(b, dir) in &key.beams {
                let beam = &mut self.beams[b];
                if beam.broken {
                    continue;
                }
                if beam.command.centering && !beam.command.auto_move_lock {
                    if beam.ref_length == 0.0 || beam.length == 0.0 {
                        continue;
                    }
                    center_beam(beam);
                }
                if beam.ref_length == 0.0 || beam.length == 0.0 {
                    continue;
                }
                let d = i32::from(dir);
                let clen = beam.length / beam.ref_length;
                let bound = if dir > 0 { beam.command.long } else { beam.command.short };
                let one_press_mode = beam.command.one_press_mode != 0;
                if (dir > 0 && clen < bound) || (dir < 0 && clen > bound) {
                    if one_press_mode {
                        one_press(beam, d, clen, raw > PRESS_THRESHOLD);
                    }
                    let mut v = filtered;
                    if d * beam.command.auto_moving_mode > 0 {
                        v = 1.0;
                    }
                    if beam.command.needs_engine && !powered {
                        continue;
                    }
                    let coupled = beam.command.engine_coupling > 0.0;
                    let requests_power = v > 0.0 && coupled;
                    let mut cf = if coupled { crank } else { 1.0 };
                    if beam.command.force_restricted {
                        cf = cf.min(1.0);
                    }
                    let before = beam.length;
                    beam.length = step_length(beam, dir, v, cf, dt);
                    if requests_power {
                        requested = true;
                        work += beam.stress.abs() * (before - beam.length).abs() * beam.command.engine_coupling;
                    }
                } else if one_press_mode && d * beam.command.auto_moving_mode > 0 {
                    // bound reached
                    beam.command.auto_moving_mode = 0;
                }
            }

            let rotator_value = match &mut key.rotator_inertia {
                Some(inertia) => inertia.calc_delay(raw, dt),
                None => raw,
            };
            for &(r, dir) in &key.rotators {
                let rotator = &mut self.rotators[r];
                if rotator.needs_engine && !powered {
                    continue;
                }
                let coupled = rotator.engine_coupling > 0.0;
                if rotator_value > 0.0 && coupled {
                    requested = true;
                }
                let cf = if coupled { crank } else { 1.0 };
                rotator.angle += f32::from(dir) * rotator.rate * rotator_value * cf * dt;
            }
        }

        if let Some(engine) = &mut self.engine {
            engine.set_hydropump(work);
            engine.set_prime(requested);
        }
    }

    pub(crate) fn apply_rotators(&mut self) {
        for rotator in &self.rotators {
            rotator.apply(&mut self.nodes);
        }
    }
}

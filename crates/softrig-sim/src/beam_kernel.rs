//! Beam force kernel: spring laws per bounded kind, plastic deformation,
//! breakage with detacher cascades, and inter-vehicle coupler beams.

use glam::Vec3;

use crate::beam::{Beam, BeamKind, BoundedKind};
use crate::constants::{MIN_BEAM_LENGTH, SUPPORT_BEAM_LIMIT_DEFAULT};
use crate::context::PhysicsSettings;
use crate::events::SimEvent;
use crate::fleet::Fleet;
use crate::shocks::{shock1_coefficients, shock2_coefficients};
use crate::triggers::TriggerHit;
use crate::vehicle::Vehicle;

/// Live connections below which a contacter endpoint holds its beam.
const MIN_CONTACTER_CONNECTIONS: usize = 3;

/// Geometry of a beam between two positions.
#[derive(Debug, Clone, Copy)]
struct Span {
    dis: Vec3,
    inv_len: f32,
    diff: f32,
}

fn measure(a: Vec3, b: Vec3, rest: f32) -> Option<Span> {
    let dis = a - b;
    let len = dis.length();
    if len <= f32::EPSILON {
        return None;
    }
    Some(Span {
        dis,
        inv_len: 1.0 / len,
        diff: len - rest,
    })
}

/// Spring law of the simple bounded kinds. Returns `None` when a support
/// beam was stretched past its limit and must break.
fn bounded_coefficients(beam: &Beam, diff: f32, stop: Option<(f32, f32)>) -> Option<(f32, f32)> {
    let (mut k, mut d) = (beam.k, beam.d);
    match beam.bounded {
        BoundedKind::Rope if diff < 0.0 => {
            k = 0.0;
            d *= 0.1;
        }
        BoundedKind::Support if diff > 0.0 => {
            k = 0.0;
            d *= 0.1;
            let limit = if beam.long_bound > 0.0 {
                beam.long_bound
            } else {
                SUPPORT_BEAM_LIMIT_DEFAULT
            };
            if diff > beam.length * limit {
                return None;
            }
        }
        BoundedKind::Shock1 => {
            (k, d) = shock1_coefficients(k, d, diff, beam.length, beam.long_bound, beam.short_bound, stop);
        }
        _ => {}
    }
    Some((k, d))
}

/// Result of settling the spring force of one beam.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Settled {
    /// Signed spring force along the beam; positive pushes the ends apart.
    slen: f32,
    deformed: bool,
    /// The force exceeded the beam's strength.
    overloaded: bool,
}

/// Spring force with plastic deformation applied to `beam`.
fn settle(beam: &mut Beam, span: &Span, rel_velocity: Vec3, k: f32, d: f32) -> Settled {
    let diff = span.diff;
    let mut slen = -k * diff - d * rel_velocity.dot(span.dis) * span.inv_len;
    let mut len = slen.abs();
    let mut deformed = false;
    if len <= beam.min_max_pos_neg_stress {
        return Settled {
            slen,
            deformed,
            overloaded: false,
        };
    }

    let plastic = matches!(beam.kind, BeamKind::Normal | BeamKind::Invisible)
        && beam.bounded != BoundedKind::Shock1
        && k != 0.0;
    if plastic {
        if slen > beam.max_pos_stress && diff < 0.0 {
            // compression keeps the strength
            let yield_length = beam.max_pos_stress / k;
            let deform = diff + yield_length * (1.0 - beam.plastic_coef);
            let old = beam.length;
            beam.length = (beam.length + deform).max(MIN_BEAM_LENGTH);
            slen -= (slen - beam.max_pos_stress) * 0.5;
            len = slen;
            if beam.length > 0.0 && old > beam.length {
                beam.max_pos_stress *= old / beam.length;
                beam.refresh_stress_limit();
            }
            deformed = true;
        } else if slen < beam.max_neg_stress && diff > 0.0 {
            let yield_length = beam.max_neg_stress / k;
            let deform = diff + yield_length * (1.0 - beam.plastic_coef);
            let old = beam.length;
            beam.length += deform;
            slen -= (slen - beam.max_neg_stress) * 0.5;
            len = -slen;
            if old > 0.0 && beam.length > old {
                beam.max_neg_stress *= beam.length / old;
                beam.refresh_stress_limit();
            }
            beam.strength -= deform * k;
            deformed = true;
        }
    }
    Settled {
        slen,
        deformed,
        overloaded: len > beam.strength,
    }
}

impl Vehicle {
    /// Accumulate the forces of every enabled local beam into the nodes.
    /// Trigger beams are collected and resolved after the pass, in beam
    /// order.
    pub(crate) fn calc_beams(&mut self, dt: f32, update: bool, settings: &PhysicsSettings) {
        let mut hits = Vec::new();
        for i in 0..self.beams.len() {
            let beam = &self.beams[i];
            if beam.disabled || beam.remote.is_some() {
                continue;
            }
            let (p1, p2) = (beam.p1, beam.p2);
            let Some(span) = measure(self.nodes[p1].rel_pos, self.nodes[p2].rel_pos, beam.length) else {
                self.beams[i].stress = 0.0;
                continue;
            };

            let (k, d) = match (beam.bounded, beam.shock) {
                (BoundedKind::Shock2 | BoundedKind::Trigger, Some(s)) => {
                    let shock = &self.shocks[s];
                    let kd = shock2_coefficients(shock, span.diff, beam.length, beam.long_bound, beam.short_bound);
                    if shock.is_trigger() {
                        hits.push(TriggerHit {
                            shock: s,
                            beam: i,
                            diff: span.diff,
                            length: beam.length,
                            long_bound: beam.long_bound,
                            short_bound: beam.short_bound,
                        });
                    }
                    self.shocks[s].last_pos = span.diff;
                    kd
                }
                _ => {
                    let stop = (beam.kind == BeamKind::Hydro)
                        .then(|| beam.shock.map(|s| (self.shocks[s].stop_spring, self.shocks[s].stop_damp)))
                        .flatten();
                    match bounded_coefficients(beam, span.diff, stop) {
                        Some(kd) => kd,
                        None => {
                            if settings.beam_break_debug {
                                tracing::trace!(vehicle = %self.id, beam = i, diff = span.diff, "support beam over-extended");
                            }
                            self.break_with_cascade(i, settings);
                            continue;
                        }
                    }
                }
            };

            let rel_velocity = self.nodes[p1].velocity - self.nodes[p2].velocity;
            let mut settled = settle(&mut self.beams[i], &span, rel_velocity, k, d);
            if settled.deformed {
                self.increased_accuracy = true;
                self.deformed.push(i);
                if settings.beam_deform_debug {
                    let beam = &self.beams[i];
                    tracing::trace!(vehicle = %self.id, beam = i, force = settled.slen, strength = beam.strength, "beam deformed");
                }
            }
            if settled.overloaded {
                self.increased_accuracy = true;
                let pinned = [p1, p2].iter().any(|&n| {
                    self.nodes[n].contacter
                        && self.topology.node_beam_connections(&self.beams, n) < MIN_CONTACTER_CONNECTIONS
                });
                if pinned {
                    let beam = &mut self.beams[i];
                    beam.strength = 2.0 * beam.min_max_pos_neg_stress;
                } else {
                    if settings.beam_break_debug {
                        tracing::trace!(vehicle = %self.id, beam = i, force = settled.slen, "beam broke");
                    }
                    settled.slen = 0.0;
                    self.break_with_cascade(i, settings);
                }
            }

            let force = span.dis * (settled.slen * span.inv_len);
            self.beams[i].stress = settled.slen;
            self.nodes[p1].forces += force;
            self.nodes[p2].forces -= force;
        }

        if !hits.is_empty() {
            self.process_triggers(&hits, dt, update, settings.trigger_debug);
        }
    }

    /// Break beam `index`; a positive detacher group takes every beam and
    /// wheel of that group with it, in one pass in index order.
    pub(crate) fn break_with_cascade(&mut self, index: usize, settings: &PhysicsSettings) {
        let id = self.id;
        let beam = &mut self.beams[index];
        beam.break_beam();
        let (p1, p2, group) = (beam.p1, beam.p2, beam.detacher_group);
        self.nodes[p1].skin = true;
        self.nodes[p2].skin = true;
        self.increased_accuracy = true;
        self.events.push(SimEvent::BeamBroken { vehicle: id, beam: index });

        if group <= 0 {
            return;
        }
        for (j, other) in self.beams.iter_mut().enumerate() {
            if j == index || other.detacher_group.abs() != group || other.broken {
                continue;
            }
            other.break_beam();
            if settings.beam_break_debug {
                tracing::trace!(vehicle = %id, beam = j, group, "detacher beam removed");
            }
            self.events.push(SimEvent::BeamBroken { vehicle: id, beam: j });
        }
        for (w, wheel) in self.wheels.iter_mut().enumerate() {
            if wheel.detacher_group == group && !wheel.detached {
                wheel.detached = true;
                self.events.push(SimEvent::WheelDetached { vehicle: id, wheel: w });
            }
        }
    }

    /// Angular springs; inert once an arm has broken.
    pub(crate) fn calc_rigidifiers(&mut self, dt: f32) {
        for r in &mut self.rigidifiers {
            if !r.is_inert(&self.beams) {
                r.apply(&mut self.nodes, dt);
            }
        }
    }

    /// Beams whose far end lives on another vehicle.
    fn remote_beams(&self) -> Vec<usize> {
        self.beams
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.disabled && b.remote.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}

/// Coupler beams spanning two vehicles, on absolute positions. Runs in the
/// sequential phase so both ends can be written.
pub(crate) fn calc_inter_vehicle_beams(fleet: &mut Fleet<'_>, settings: &PhysicsSettings) {
    for owner in fleet.ids() {
        let Some(vehicle) = fleet.get(owner) else {
            continue;
        };
        if !vehicle.state().is_simulated() {
            continue;
        }
        for i in vehicle.remote_beams() {
            let Some(target) = fleet.get(owner).and_then(|v| v.beams[i].remote) else {
                continue;
            };
            let Some((vehicle, peer)) = fleet.pair_mut(owner, target.vehicle) else {
                continue;
            };
            let Some(far) = peer.nodes.get(target.node).map(|n| (n.abs_pos, n.velocity)) else {
                continue;
            };
            let p1 = vehicle.beams[i].p1;
            let near = &vehicle.nodes[p1];
            let Some(span) = measure(near.abs_pos, far.0, vehicle.beams[i].length) else {
                continue;
            };
            let rel_velocity = near.velocity - far.1;
            let Some((k, d)) = bounded_coefficients(&vehicle.beams[i], span.diff, None) else {
                vehicle.break_with_cascade(i, settings);
                continue;
            };
            let mut settled = settle(&mut vehicle.beams[i], &span, rel_velocity, k, d);
            if settled.deformed {
                vehicle.deformed.push(i);
            }
            if settled.overloaded {
                settled.slen = 0.0;
                vehicle.break_with_cascade(i, settings);
            }
            let force = span.dis * (settled.slen * span.inv_len);
            vehicle.beams[i].stress = settled.slen;
            vehicle.nodes[p1].forces += force;
            peer.nodes[target.node].forces -= force;
        }
    }
}

#[cfg(test)]
#[path = "beam_kernel_tests.rs"]
mod tests;

//! Node-versus-triangle collisions against collision cabs, within a vehicle
//! and between vehicles.

use std::sync::Arc;

use glam::Vec3;
use softrig_math::Triangle;

use super::point_detector::{CollisionPoint, PointDetector};
use super::primitive::{ContactPoint, primitive_collision};
use crate::constants::COLLCAB_MAX_RATE;
use crate::ground::GroundModel;
use crate::node::Node;
use crate::topology::Topology;

/// Rate assigned to an intra cab after a hit; keeps it tested for a long
/// stretch of sub-steps.
const INTRA_HIT_RATE: i32 = -20_000;

/// Closing speed (m/s) at which the inter envelope reaches its full scale.
const ENVELOPE_REF_SPEED: f32 = 55.5;
const ENVELOPE_MAX_SCALE: f32 = 12.0;

/// Squared node-0 speed difference above which a partner counts as fast.
const FAST_PARTNER_SPEED_SQ: f32 = 16.0;

/// A collision triangle `(no, na, nb)`; `no` is the frame origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionCab {
    pub nodes: [usize; 3],
}

/// Adaptive test schedule of a cab. A positive `rate` skips that many
/// sub-steps; `distance` counts the skipped ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CabRate {
    pub rate: i32,
    pub distance: i32,
}

/// Node state of a potential collision partner, copied once per sub-step.
#[derive(Debug, Clone)]
pub struct ContactBody {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    /// Forces after the vehicle's own beam and self-collision pass.
    pub forces: Vec<Vec3>,
    pub masses: Vec<f32>,
    /// Largest node speed.
    pub max_speed: f32,
    pub topology: Arc<Topology>,
    /// Driven by the network; its own mass is used for contact response.
    pub networked: bool,
}

impl ContactBody {
    pub fn capture(nodes: &[Node], topology: Arc<Topology>, networked: bool) -> Self {
        Self {
            positions: nodes.iter().map(|n| n.abs_pos).collect(),
            velocities: nodes.iter().map(|n| n.velocity).collect(),
            forces: nodes.iter().map(|n| n.forces).collect(),
            masses: nodes.iter().map(Node::mass).collect(),
            max_speed: nodes.iter().map(|n| n.velocity.length()).fold(0.0, f32::max),
            topology,
            networked,
        }
    }
}

/// Every awake vehicle's contacters in one tree plus the partner node
/// data needed for responses. Indexed by vehicle slot.
#[derive(Debug, Default)]
pub struct ContactWorld {
    pub detector: PointDetector,
    pub bodies: Vec<Option<ContactBody>>,
}

/// Force owed to a node of another vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteImpulse {
    pub slot: usize,
    pub node: usize,
    pub force: Vec3,
}

fn cab_triangle(nodes: &[Node], cab: &CollisionCab) -> Triangle {
    let [no, na, nb] = cab.nodes;
    Triangle::new(nodes[na].abs_pos, nodes[nb].abs_pos, nodes[no].abs_pos)
}

fn cab_bounds(nodes: &[Node], cab: &CollisionCab, collrange: f32) -> softrig_math::Aabb {
    cab_triangle(nodes, cab).bounds().expand_by(collrange)
}

/// Search distance for a node closing on a cab at `speed`. Never smaller
/// than `collrange`.
pub fn inter_envelope(collrange: f32, speed: f32) -> f32 {
    collrange * (ENVELOPE_MAX_SCALE * speed / ENVELOPE_REF_SPEED).clamp(1.0, ENVELOPE_MAX_SCALE)
}

/// Contact force on a hit node against a triangle, given relative
/// velocity and effective mass.
fn contact_force(
    hit_forces: Vec3,
    velocity: Vec3,
    mass: f32,
    normal: Vec3,
    penetration: f32,
    dt: f32,
    gm: &GroundModel,
) -> Vec3 {
    let point = ContactPoint {
        forces: hit_forces,
        velocity,
        mass,
        friction_coef: 1.0,
        surface_coef: 1.0,
        volume_coef: 1.0,
    };
    primitive_collision(&point, normal, dt, gm, penetration).force
}

/// Advance a cab's skip schedule. Returns true if the cab is tested this
/// sub-step.
fn intra_schedule(rate: &mut CabRate) -> bool {
    if rate.rate > 0 {
        rate.distance += 1;
        rate.rate -= 1;
        return false;
    }
    if rate.distance > 0 {
        rate.rate = rate.distance.min(COLLCAB_MAX_RATE);
        rate.distance = 0;
    }
    true
}

/// Self collision of a vehicle's contacters against its own cabs.
///
/// `detector` must hold this vehicle's contacter nodes at their current
/// absolute positions.
#[allow(clippy::too_many_arguments)]
pub fn resolve_intra_collisions(
    nodes: &mut [Node],
    cabs: &[CollisionCab],
    rates: &mut [CabRate],
    detector: &PointDetector,
    collrange: f32,
    dt: f32,
    gm: &GroundModel,
    hits: &mut Vec<usize>,
) {
    let mut scratch = Vec::new();
    for (cab, rate) in cabs.iter().zip(rates.iter_mut()) {
        if !intra_schedule(rate) {
            continue;
        }
        let [no, na, nb] = cab.nodes;
        detector.query(&cab_bounds(nodes, cab, collrange), &mut scratch);
        hits.clear();
        hits.extend(scratch.iter().map(|p| p.node));

        let triangle = cab_triangle(nodes, cab);
        let mut collision = false;
        for &h in hits.iter() {
            if nodes[h].is_wheel || h == no || h == na || h == nb {
                continue;
            }
            let Some(local) = triangle.to_local(nodes[h].abs_pos) else {
                continue;
            };
            if !local.inside(collrange) {
                continue;
            }
            collision = true;
            let mut normal = triangle.normal();
            let mut distance = local.distance;
            if distance < 0.0 {
                normal = -normal;
                distance = -distance;
            }
            let penetration = collrange - distance;
            let velocity = nodes[h].velocity
                - (nodes[na].velocity * local.alpha
                    + nodes[nb].velocity * local.beta
                    + nodes[no].velocity * local.gamma);
            let tri_mass = nodes[na].mass() * local.alpha
                + nodes[nb].mass() * local.beta
                + nodes[no].mass() * local.gamma;
            let hit_mass = nodes[h].mass();
            let mass = hit_mass * tri_mass / (hit_mass + tri_mass);
            let f = contact_force(nodes[h].forces, velocity, mass, normal, penetration, dt, gm);

            nodes[h].forces += f;
            nodes[na].forces -= f * local.alpha;
            nodes[nb].forces -= f * local.beta;
            nodes[no].forces -= f * local.gamma;
        }
        if collision {
            rate.rate = INTRA_HIT_RATE;
        } else {
            rate.rate += 1;
        }
    }
}

/// Heuristic side test: the hit node votes three times, its neighbours
/// once each when there are enough of them to change the outcome.
fn is_backface(distance: f32, normal: Vec3, origin: Vec3, hit: usize, body: &ContactBody) -> bool {
    const WEIGHT: i32 = 3;
    let sign = |x: f32| if x >= 0.0 { 1 } else { -1 };
    let mut face = WEIGHT * sign(distance);
    let neighbours = body.topology.neighbours(hit);
    if neighbours.len() > WEIGHT as usize {
        for &id in neighbours {
            if let Some(&p) = body.positions.get(id) {
                face += sign(normal.dot(p - origin));
            }
        }
    }
    face < 0
}

fn is_partner(own_slot: usize, partners: &[bool], slot: usize) -> bool {
    slot != own_slot && partners.get(slot).copied().unwrap_or(false)
}

fn partner_bodies<'a>(
    world: &'a ContactWorld,
    own_slot: usize,
    partners: &'a [bool],
) -> impl Iterator<Item = &'a ContactBody> + 'a {
    world
        .bodies
        .iter()
        .enumerate()
        .filter(move |(slot, _)| is_partner(own_slot, partners, *slot))
        .filter_map(|(_, b)| b.as_ref())
}

/// Collide this vehicle's cabs against other vehicles' contacters.
///
/// Forces on this vehicle's triangle nodes are applied directly; forces on
/// the partners' nodes are appended to `outbox`. `partners[slot]` selects
/// which vehicles are considered.
#[allow(clippy::too_many_arguments)]
pub fn resolve_inter_collisions(
    own_slot: usize,
    nodes: &mut [Node],
    cabs: &[CollisionCab],
    rates: &mut [CabRate],
    world: &ContactWorld,
    partners: &[bool],
    collrange: f32,
    dt: f32,
    gm: &GroundModel,
    outbox: &mut Vec<RemoteImpulse>,
) {
    let own_reference = nodes.first().map_or(Vec3::ZERO, |n| n.velocity);
    let fast_partner = partner_bodies(world, own_slot, partners).any(|b| {
        b.velocities
            .first()
            .is_some_and(|v| v.distance_squared(own_reference) > FAST_PARTNER_SPEED_SQ)
    });
    if fast_partner {
        for rate in rates.iter_mut() {
            rate.rate = 0;
        }
    }
    let partner_speed = partner_bodies(world, own_slot, partners).map(|b| b.max_speed).fold(0.0, f32::max);

    let mut scratch: Vec<&CollisionPoint> = Vec::new();
    for (cab, rate) in cabs.iter().zip(rates.iter_mut()) {
        if rate.rate > 0 {
            rate.distance += 1;
            rate.rate -= 1;
            continue;
        }
        rate.rate = rate.distance.min(COLLCAB_MAX_RATE);
        rate.distance = 0;

        let [no, na, nb] = cab.nodes;
        let cab_speed = [no, na, nb]
            .iter()
            .map(|&i| nodes[i].velocity.length())
            .fold(0.0, f32::max);
        let reach = inter_envelope(collrange, partner_speed + cab_speed);
        world.detector.query(&cab_bounds(nodes, cab, reach), &mut scratch);
        scratch.retain(|p| is_partner(own_slot, partners, p.owner));
        if scratch.is_empty() {
            rate.rate += 1;
            continue;
        }

        let triangle = cab_triangle(nodes, cab);
        for hit in scratch.iter() {
            let Some(Some(body)) = world.bodies.get(hit.owner) else {
                continue;
            };
            let Some(local) = triangle.to_local(hit.position) else {
                continue;
            };
            let hit_velocity = body.velocities[hit.node];
            let velocity = hit_velocity
                - (nodes[na].velocity * local.alpha
                    + nodes[nb].velocity * local.beta
                    + nodes[no].velocity * local.gamma);
            let envelope = inter_envelope(collrange, velocity.length());
            if !local.inside(envelope) {
                continue;
            }
            rate.rate = 0;

            let mut normal = triangle.normal();
            let mut distance = local.distance;
            if is_backface(distance, normal, nodes[no].abs_pos, hit.node, body) {
                normal = -normal;
                distance = -distance;
            }
            let penetration = envelope - distance;

            let hit_mass = body.masses[hit.node];
            let tri_mass = nodes[na].mass() * local.alpha
                + nodes[nb].mass() * local.beta
                + nodes[no].mass() * local.gamma;
            let mass = if body.networked {
                hit_mass
            } else {
                hit_mass * tri_mass / (hit_mass + tri_mass)
            };
            let f = contact_force(body.forces[hit.node], velocity, mass, normal, penetration, dt, gm);

            outbox.push(RemoteImpulse {
                slot: hit.owner,
                node: hit.node,
                force: f,
            });
            nodes[na].forces -= f * local.alpha;
            nodes[nb].forces -= f * local.beta;
            nodes[no].forces -= f * local.gamma;
        }
    }
}

#[cfg(test)]
#[path = "dynamic_tests.rs"]
mod tests;

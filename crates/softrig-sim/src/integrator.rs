//! Explicit Euler node integration with ground contact, gravity, drag and
//! water, plus the numeric guard.

use glam::Vec3;
use rand::Rng;

use crate::collision::{ContactPoint, primitive_collision};
use crate::constants::{
    DEFAULT_DRAG, DEFAULT_WATERDRAG, DRY_TIME, GROUND_TEST_INTERVAL, ORIGIN_SHIFT_THRESHOLD_SQ,
    WHEEL_GROUND_TEST_INTERVAL,
};
use crate::context::SimContext;
use crate::node::{Node, WetState};
use crate::vehicle::Vehicle;

/// Scale of the turbulent jitter relative to the drag magnitude.
const TURBULENCE_SCALE: f32 = 0.005;

fn due_for_ground_test(node: &Node, force_all: bool) -> bool {
    if node.contactless {
        return false;
    }
    let interval = if node.is_wheel {
        WHEEL_GROUND_TEST_INTERVAL
    } else {
        GROUND_TEST_INTERVAL
    };
    force_all || node.contacted || node.coll_test_timer > interval
}

/// Ground reaction on `node`; updates its contact bookkeeping.
fn ground_contact(node: &mut Node, ctx: &SimContext, dt: f32) {
    node.coll_test_timer = 0.0;
    let p = node.abs_pos;
    let height = ctx.terrain.height_at(p.x, p.z);
    if p.y >= height {
        node.contacted = false;
        return;
    }
    let normal = ctx.terrain.normal_at(p.x, height, p.z);
    let penetration = (height - p.y) * normal.y.abs().max(f32::EPSILON);
    let model = ctx.ground_model_at(p.x, p.z);
    let point = ContactPoint {
        forces: node.forces,
        velocity: node.velocity,
        mass: node.mass(),
        friction_coef: node.friction_coef,
        surface_coef: node.surface_coef,
        volume_coef: node.volume_coef,
    };
    let response = primitive_collision(&point, normal, dt, ctx.ground_models.get(model), penetration);
    node.forces += response.force;
    node.contacted = true;
    node.last_ground_model = Some(model);
    if let Some(slip) = response.slip {
        node.last_slip = slip;
    }
}

fn update_wetness(node: &mut Node, water: Option<f32>, dt: f32) {
    let submerged = water.is_some_and(|level| node.abs_pos.y < level);
    match (submerged, node.wet) {
        (true, _) => {
            node.wet = WetState::Wet;
            node.wet_time = 0.0;
        }
        (false, WetState::Wet) => {
            node.wet = WetState::Dripping;
            node.wet_time = 0.0;
        }
        (false, WetState::Dripping) => {
            node.wet_time += dt;
            if node.wet_time > DRY_TIME {
                node.wet = WetState::Dry;
            }
        }
        (false, WetState::Dry) => {}
    }
}

impl Vehicle {
    /// Fold queued one-shot external forces into the accumulators.
    pub(crate) fn apply_external_forces(&mut self) {
        for (node, force) in self.external_forces.drain(..) {
            self.nodes[node].forces += force;
        }
    }

    /// Ground-test, integrate and re-seed the force accumulators of every
    /// node. Returns false when the numeric guard fired; the vehicle is
    /// then flagged for reset and this sub-step's motion is discarded.
    pub(crate) fn calc_nodes(&mut self, ctx: &SimContext, dt: f32) -> bool {
        let settings = &ctx.settings;
        let turbulence = !settings.disable_drag && self.substep % u64::from(settings.turbulence_interval) == 0;
        let force_all = std::mem::take(&mut self.increased_accuracy);
        let gravity = ctx.gravity;
        let snapshot: Vec<(Vec3, Vec3)> = self.nodes.iter().map(|n| (n.rel_pos, n.velocity)).collect();

        for node in &mut self.nodes {
            node.coll_test_timer += dt;
            if due_for_ground_test(node, force_all) {
                ground_contact(node, ctx, dt);
            }

            if !node.locked {
                node.velocity += node.forces * (node.inv_mass() * dt);
                node.rel_pos += node.velocity * dt;
                node.abs_pos = self.origin + node.rel_pos;
            }

            let v = node.velocity;
            let speed = v.length();
            node.forces = gravity * node.mass();
            if !settings.disable_drag {
                node.forces -= v * (DEFAULT_DRAG * speed);
                if turbulence {
                    let jitter = Vec3::new(
                        self.rng.random_range(-1.0..=1.0),
                        self.rng.random_range(-1.0..=1.0),
                        self.rng.random_range(-1.0..=1.0),
                    );
                    node.forces += jitter * (DEFAULT_DRAG * speed * speed * TURBULENCE_SCALE);
                }
            }

            let water = ctx.terrain.water_height_at(node.abs_pos);
            update_wetness(node, water, dt);
            if node.wet == WetState::Wet {
                node.forces += -v * (DEFAULT_WATERDRAG * speed) + Vec3::Y * node.buoyancy;
            }
        }

        self.update_bounds();
        if !self.bounds.is_within_guard() || self.nodes.iter().any(|n| !n.velocity.is_finite()) {
            tracing::warn!(vehicle = %self.id, "node extents out of range, resetting vehicle");
            for (node, (rel, velocity)) in self.nodes.iter_mut().zip(snapshot) {
                node.set_position(self.origin, rel);
                node.velocity = velocity;
                node.forces = gravity * node.mass();
            }
            self.update_bounds();
            self.reset_requested = true;
            return false;
        }
        self.last_good_position = self.nodes.first().map_or(self.origin, |n| n.abs_pos);
        self.recenter_origin();
        self.substep += 1;
        self.sim_time += f64::from(dt);
        true
    }

    /// Move the origin onto node 0 once it drifts far, keeping `rel_pos`
    /// small.
    fn recenter_origin(&mut self) {
        let Some(shift) = self.nodes.first().map(|n| n.rel_pos) else {
            return;
        };
        if shift.length_squared() <= ORIGIN_SHIFT_THRESHOLD_SQ {
            return;
        }
        self.origin += shift;
        for node in &mut self.nodes {
            node.rel_pos -= shift;
            node.abs_pos = self.origin + node.rel_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_vehicle;
    use crate::def::{NodeDef, VehicleDef};
    use crate::ids::VehicleId;

    fn single_node(y: f32) -> Vehicle {
        let def = VehicleDef {
            nodes: vec![NodeDef::at(0.0, y, 0.0)],
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid")
    }

    #[test]
    fn test_free_fall_follows_gravity() {
        let ctx = SimContext::default();
        let mut v = single_node(100.0);
        v.nodes[0].forces = ctx.gravity * v.nodes[0].mass();
        for _ in 0..2000 {
            assert!(v.calc_nodes(&ctx, 0.0005));
        }
        // one second of fall with light drag
        let fallen = 100.0 - v.nodes[0].abs_pos.y;
        assert!(fallen > 4.5 && fallen < 4.95, "fell {fallen}");
    }

    #[test]
    fn test_abs_tracks_origin_plus_rel() {
        let ctx = SimContext::default();
        let mut v = single_node(3.0);
        for _ in 0..50 {
            v.calc_nodes(&ctx, 0.0005);
            let n = &v.nodes[0];
            assert_eq!(n.abs_pos, v.origin() + n.rel_pos);
        }
    }

    #[test]
    fn test_guard_requests_reset() {
        let ctx = SimContext::default();
        let mut v = single_node(1.0);
        v.nodes[0].velocity = Vec3::new(f32::MAX, 0.0, 0.0);
        assert!(!v.calc_nodes(&ctx, 0.0005));
        assert!(v.reset_requested);
        assert!(v.nodes[0].abs_pos.is_finite());
    }

    #[test]
    fn test_wetness_cycle() {
        let mut node = Node::new(Vec3::ZERO, 1.0);
        update_wetness(&mut node, Some(1.0), 0.1);
        assert_eq!(node.wet, WetState::Wet);
        update_wetness(&mut node, None, 0.1);
        assert_eq!(node.wet, WetState::Dripping);
        for _ in 0..60 {
            update_wetness(&mut node, None, 0.1);
        }
        assert_eq!(node.wet, WetState::Dry);
    }

    #[test]
    fn test_resting_node_contacts_ground() {
        let ctx = SimContext::default();
        let mut v = single_node(-0.01);
        v.increased_accuracy = true;
        v.calc_nodes(&ctx, 0.0005);
        assert!(v.nodes[0].contacted);
    }
}

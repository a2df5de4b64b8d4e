//! Point masses of the soft-body mesh.

use glam::Vec3;

use crate::constants::{
    MIN_NODE_MASS, NODE_FRICTION_COEF_DEFAULT, NODE_LOCKGROUP_DEFAULT, NODE_SURFACE_COEF_DEFAULT,
    NODE_VOLUME_COEF_DEFAULT,
};
use crate::ground::GroundModelId;

/// Water contact state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WetState {
    #[default]
    Dry,
    /// Currently submerged.
    Wet,
    /// Left the water less than [`crate::constants::DRY_TIME`] ago.
    Dripping,
}

/// A point mass.
///
/// `abs_pos` is always `origin + rel_pos` of the owning vehicle once a
/// sub-step has finished; kernels work on `rel_pos` to keep precision far
/// from the world origin.
#[derive(Debug, Clone)]
pub struct Node {
    /// Spawn position relative to the vehicle's spawn point.
    pub initial_pos: Vec3,
    pub abs_pos: Vec3,
    pub rel_pos: Vec3,
    pub velocity: Vec3,
    /// Force accumulated during the current sub-step.
    pub forces: Vec3,
    mass: f32,
    inv_mass: f32,
    pub wet: WetState,
    /// Seconds spent dripping.
    pub wet_time: f32,
    pub is_wheel: bool,
    /// Participates in collision cab tests.
    pub contacter: bool,
    /// Excluded from ground collision.
    pub contactless: bool,
    /// Exposed by a breakage.
    pub skin: bool,
    /// Hooks only lock onto nodes of the same group (-1 matches any).
    pub lock_group: i32,
    /// Position is held; the node is not integrated.
    pub locked: bool,
    /// Seconds since the last ground collision test.
    pub coll_test_timer: f32,
    pub friction_coef: f32,
    pub surface_coef: f32,
    pub volume_coef: f32,
    /// Buoyancy force in newtons while submerged.
    pub buoyancy: f32,
    /// Touched the ground during the last test.
    pub contacted: bool,
    pub last_ground_model: Option<GroundModelId>,
    /// Slip speed at the last ground contact, m/s.
    pub last_slip: f32,
}

impl Node {
    pub fn new(position: Vec3, mass: f32) -> Self {
        let mut node = Self {
            initial_pos: position,
            abs_pos: position,
            rel_pos: position,
            velocity: Vec3::ZERO,
            forces: Vec3::ZERO,
            mass: 0.0,
            inv_mass: 0.0,
            wet: WetState::Dry,
            wet_time: 0.0,
            is_wheel: false,
            contacter: false,
            contactless: false,
            skin: false,
            lock_group: NODE_LOCKGROUP_DEFAULT,
            locked: false,
            coll_test_timer: 0.0,
            friction_coef: NODE_FRICTION_COEF_DEFAULT,
            surface_coef: NODE_SURFACE_COEF_DEFAULT,
            volume_coef: NODE_VOLUME_COEF_DEFAULT,
            buoyancy: 0.0,
            contacted: false,
            last_ground_model: None,
            last_slip: 0.0,
        };
        node.set_mass(mass);
        node
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Set the mass; non-positive or non-finite values clamp to a small
    /// positive mass so the inverse stays finite.
    pub fn set_mass(&mut self, mass: f32) {
        let mass = if mass.is_finite() { mass.max(MIN_NODE_MASS) } else { MIN_NODE_MASS };
        self.mass = mass;
        self.inv_mass = 1.0 / mass;
    }

    /// Place the node at `rel` relative to `origin`.
    pub fn set_position(&mut self, origin: Vec3, rel: Vec3) {
        self.rel_pos = rel;
        self.abs_pos = origin + rel;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mass_is_clamped_positive() {
        let mut node = Node::new(Vec3::ZERO, 0.0);
        assert!(node.inv_mass().is_finite());
        assert!(node.inv_mass() > 0.0);
        node.set_mass(-3.0);
        assert_eq!(node.mass(), MIN_NODE_MASS);
        node.set_mass(f32::NAN);
        assert!(node.inv_mass().is_finite());
        node.set_mass(4.0);
        assert_eq!(node.inv_mass(), 0.25);
    }

    #[test]
    fn test_set_position_keeps_abs_in_sync() {
        let mut node = Node::new(Vec3::ZERO, 1.0);
        node.set_position(Vec3::new(100.0, 0.0, 0.0), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(node.abs_pos, Vec3::new(101.0, 2.0, 3.0));
    }
}

//! Contact response of a single node against a surface.

use glam::Vec3;

use crate::ground::GroundModel;

/// Gravity used for fluid buoyancy, independent of the world setting.
const FLUID_GRAVITY: f32 = 9.81;

/// Per-node inputs of a contact.
#[derive(Debug, Clone, Copy)]
pub struct ContactPoint {
    /// Force accumulated on the node so far this sub-step.
    pub forces: Vec3,
    /// Velocity relative to the surface.
    pub velocity: Vec3,
    /// Effective mass of the contact.
    pub mass: f32,
    pub friction_coef: f32,
    pub surface_coef: f32,
    pub volume_coef: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactResponse {
    /// Force to add to the node.
    pub force: Vec3,
    /// Tangential slip speed, when the solid part was evaluated.
    pub slip: Option<f32>,
}

/// Surface reaction for a node `penetration` metres below a surface with
/// outward `normal`.
///
/// Fluid surfaces (`solid_ground_level != 0`) first apply power-law drag
/// and buoyancy; once the node reaches solid ground the normal reaction
/// and friction (static below the adhesion velocity, Stribeck above it)
/// are added.
pub fn primitive_collision(
    point: &ContactPoint,
    normal: Vec3,
    dt: f32,
    gm: &GroundModel,
    penetration: f32,
) -> ContactResponse {
    let mut force = Vec3::ZERO;
    let mut slip_speed = None;
    let velocity = point.velocity;
    let vnormal = velocity.dot(normal);

    if gm.solid_ground_level != 0.0 && penetration >= 0.0 {
        let vsquared = velocity.length_squared();
        let m = if vsquared > 0.0 {
            gm.flow_consistency_index * vsquared.powf((gm.flow_behavior_index - 1.0) * 0.5)
        } else {
            0.0
        };
        let mut drag = velocity * (-m * point.surface_coef);
        if gm.drag_anisotropy < 1.0 && vnormal > 0.0 {
            let va2 = gm.va * gm.va;
            let da_factor = if vsquared > va2 || va2 <= 0.0 { 1.0 } else { vsquared / va2 };
            drag += normal * (vnormal * m * (1.0 - gm.drag_anisotropy) * da_factor);
        }
        force += drag;

        let mut buoyancy = gm.fluid_density * penetration * FLUID_GRAVITY * point.volume_coef;
        if gm.flow_behavior_index < 1.0 && vnormal >= 0.0 {
            let fnormal = (point.forces + force).dot(normal);
            if fnormal < 0.0 && buoyancy > -fnormal {
                buoyancy = -fnormal;
            }
        }
        force += normal * buoyancy;
    }

    if penetration >= gm.solid_ground_level {
        let total = point.forces + force;
        let fnormal = total.dot(normal);
        let mut reaction = -fnormal;
        if vnormal < 0.0 {
            reaction -= (0.8 * vnormal + 0.2 * (gm.solid_ground_level - penetration) / dt)
                * point.mass
                / dt;
        }
        if reaction > 0.0 {
            let slip_force = total - normal * fnormal;
            let slip = velocity - normal * vnormal;
            let slipv = slip.length();
            let slip_dir = if slipv > 0.0 { slip / slipv } else { Vec3::ZERO };
            slip_speed = Some(slipv);

            let g_reaction = reaction * gm.strength * point.friction_coef;
            let ms_g = gm.ms * g_reaction;
            if slipv < gm.va
                && g_reaction > 0.0
                && slip_force.length_squared() <= ms_g * ms_g
            {
                let ff = -ms_g * (1.0 - (-slipv / gm.va).exp());
                force += normal * reaction + slip_dir * ff - slip_force;
            } else {
                let stribeck = if gm.vs > 0.0 {
                    (-(slipv / gm.vs).powf(gm.alpha)).exp()
                } else {
                    0.0
                };
                let g = gm.mc + (gm.ms - gm.mc) * stribeck;
                let ff = -(g + (gm.t2 * slipv).min(5.0)) * g_reaction;
                force += normal * reaction + slip_dir * ff;
            }
        }
    }

    ContactResponse {
        force,
        slip: slip_speed,
    }
}

//! Wheels, the driveline that feeds them and the brakes that stop them.
//!
//! A wheel is a ring of rim nodes around an axis formed by two chassis
//! nodes. Torque enters tangentially at the rim; the reaction goes back
//! into the chassis through the arm node.

use glam::Vec3;
use softrig_math::{project_on_plane, rotate_about_axis};

use crate::brakes::AntiLock;
use crate::def::{BrakeCombo, Propulsion};
use crate::differential::{DiffData, DiffKind};
use crate::engine::Engine;
use crate::ground::GroundModelId;
use crate::vehicle::Vehicle;

/// Torsion stiffness of the legacy driveline couplings, N·m per m/s.
const LEGACY_LOCK_STIFFNESS: f32 = 10_000.0;
/// Wheel speed below which skid steering brakes engage, m/s.
const SKID_STEER_SPEED: f32 = 20.0;
/// Wheel speed below which brakes fade out quadratically, m/s.
const BRAKE_FADE_SPEED: f32 = 1.0;
const ROLLING_FRICTION: f32 = 1.0;
/// Smallest projected arm length taking reaction torque.
const MIN_ARM_LENGTH: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub rim: Vec<usize>,
    pub axis: [usize; 2],
    pub arm: usize,
    /// Axis node closest to the arm.
    pub near_attach: usize,
    pub radius: f32,
    pub propulsion: Propulsion,
    pub braking: BrakeCombo,
    /// Surface speed, m/s.
    pub speed: f32,
    pub last_speed: f32,
    pub avg_speed: f32,
    /// Rotation during the last sub-step, radians.
    pub delta_rotation: f32,
    /// Accumulated rotation, radians.
    pub rotation: f32,
    pub detacher_group: i32,
    pub detached: bool,
    /// Rotation latched by the slope brake.
    pub slope_latch: Option<f32>,
    pub last_ground_model: Option<GroundModelId>,
    pub last_slip: f32,
    /// Torque applied on the last sub-step.
    pub torque: f32,
}

impl Wheel {
    pub fn new(
        rim: Vec<usize>,
        axis: [usize; 2],
        arm: usize,
        near_attach: usize,
        radius: f32,
        propulsion: Propulsion,
        braking: BrakeCombo,
        detacher_group: i32,
    ) -> Self {
        Self {
            rim,
            axis,
            arm,
            near_attach,
            radius,
            propulsion,
            braking,
            speed: 0.0,
            last_speed: 0.0,
            avg_speed: 0.0,
            delta_rotation: 0.0,
            rotation: 0.0,
            detacher_group,
            detached: false,
            slope_latch: None,
            last_ground_model: None,
            last_slip: 0.0,
            torque: 0.0,
        }
    }

    pub fn is_propelled(&self) -> bool {
        self.propulsion != Propulsion::None
    }

    pub(crate) fn reset(&mut self) {
        self.speed = 0.0;
        self.last_speed = 0.0;
        self.avg_speed = 0.0;
        self.delta_rotation = 0.0;
        self.rotation = 0.0;
        self.detached = false;
        self.slope_latch = None;
        self.torque = 0.0;
    }
}

/// Rim node layout: `2 * rays` positions alternating between the two axis
/// planes, each half a ray apart.
pub fn rim_positions(axis_start: Vec3, axis_end: Vec3, radius: f32, rays: usize) -> Vec<Vec3> {
    let axis = (axis_end - axis_start).normalize_or_zero();
    if axis == Vec3::ZERO || rays == 0 {
        return Vec::new();
    }
    let reference = axis.any_orthonormal_vector() * radius;
    let count = rays * 2;
    (0..count)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::PI / rays as f32;
            let base = if i % 2 == 0 { axis_start } else { axis_end };
            base + rotate_about_axis(reference, angle, axis)
        })
        .collect()
}

impl Vehicle {
    /// Axis direction of a wheel; reversed for backward-mounted wheels.
    fn wheel_axis(&self, wheel: usize) -> Vec3 {
        let w = &self.wheels[wheel];
        let axis = (self.nodes[w.axis[1]].rel_pos - self.nodes[w.axis[0]].rel_pos).normalize_or_zero();
        if w.propulsion == Propulsion::Backward { -axis } else { axis }
    }

    /// Coupling torques between driven wheels, indexed like `self.wheels`.
    fn driveline_torques(&mut self, engine_torque: f32, dt: f32) -> Vec<f32> {
        let mut inter = vec![0.0; self.wheels.len()];
        let speed = |v: &Vehicle, i: usize| if v.wheels[i].detached { 0.0 } else { v.wheels[i].speed };

        if self.axles.is_empty() {
            let driven: Vec<usize> = (0..self.wheels.len()).filter(|&i| self.wheels[i].is_propelled()).collect();
            let per_wheel = if driven.is_empty() { 0.0 } else { engine_torque / driven.len() as f32 };
            for &i in &driven {
                inter[i] += per_wheel;
            }
            for pair in 0..(driven.len() / 2).saturating_sub(1) {
                let [a, b, c, d] = [
                    driven[pair * 2],
                    driven[pair * 2 + 1],
                    driven[pair * 2 + 2],
                    driven[pair * 2 + 3],
                ];
                let s1 = (speed(self, a) + speed(self, b)) * 0.5;
                let s2 = (speed(self, c) + speed(self, d)) * 0.5;
                let torsion = (s1 - s2) * LEGACY_LOCK_STIFFNESS * 0.5;
                inter[a] -= torsion;
                inter[b] -= torsion;
                inter[c] += torsion;
                inter[d] += torsion;
            }
            for (k, &i) in driven.iter().enumerate() {
                let partner = if k % 2 == 1 { driven.get(k - 1) } else { driven.get(k + 1) };
                if let Some(&p) = partner {
                    inter[i] -= (speed(self, i) - speed(self, p)) * LEGACY_LOCK_STIFFNESS;
                }
            }
            return inter;
        }

        let axle_count = self.axles.len();
        let per_axle = engine_torque / axle_count as f32;
        if self.shaft_twist.len() + 1 < axle_count {
            self.shaft_twist.resize(axle_count - 1, 0.0);
        }
        for i in 0..axle_count.saturating_sub(1) {
            let [a0, a1] = self.axles[i].wheels;
            let [b0, b1] = self.axles[i + 1].wheels;
            let mut data = DiffData {
                speed: [
                    (speed(self, a0) + speed(self, a1)) * 0.5,
                    (speed(self, b0) + speed(self, b1)) * 0.5,
                ],
                delta_rotation: self.shaft_twist[i],
                dt,
                ..DiffData::default()
            };
            DiffKind::Locked.calc_torque(&mut data);
            self.shaft_twist[i] = data.delta_rotation;
            inter[a0] += data.out_torque[0] * 0.5;
            inter[a1] += data.out_torque[0] * 0.5;
            inter[b0] += data.out_torque[1] * 0.5;
            inter[b1] += data.out_torque[1] * 0.5;
        }
        for i in 0..axle_count {
            let [w0, w1] = self.axles[i].wheels;
            let mut data = DiffData {
                speed: [speed(self, w0), speed(self, w1)],
                in_torque: per_axle,
                dt,
                ..DiffData::default()
            };
            self.axles[i].calc_torque(&mut data);
            inter[w0] += data.out_torque[0];
            inter[w1] += data.out_torque[1];
        }
        inter
    }

    /// Brake torque magnitude on one wheel before anti-lock modulation.
    fn wheel_brake_torque(&self, wheel: usize) -> f32 {
        let w = &self.wheels[wheel];
        let mut torque = 0.0;
        if w.braking == BrakeCombo::None {
            return 0.0;
        }
        if self.brakes.parking
            && matches!(
                w.braking,
                BrakeCombo::FootHand | BrakeCombo::FootHandSkidLeft | BrakeCombo::FootHandSkidRight
            )
        {
            torque += self.brakes.parking_force;
        }
        torque += self.brakes.brake;
        let dir = self.controls.hydro_dir_state;
        if self.wheel_speed.abs() < SKID_STEER_SPEED
            && ((w.braking == BrakeCombo::FootHandSkidLeft && dir > 0.0)
                || (w.braking == BrakeCombo::FootHandSkidRight && dir < 0.0))
        {
            torque += self.brakes.brake_force * dir.abs();
        }
        torque
    }

    /// Drive, brake and friction torque on every wheel, rim forces, and the
    /// wheel speeds fed back into the engine.
    pub(crate) fn calc_wheels(&mut self, dt: f32) {
        if self.wheels.is_empty() {
            return;
        }
        self.brakes.tick_pulses(dt);
        let engine_torque = self.engine.as_ref().map_or(0.0, Engine::torque);
        let accelerating = self.engine.as_ref().is_some_and(|e| e.acc() > 0.0);
        let chassis_speed = self.chassis_velocity().length();
        let inter = self.driveline_torques(engine_torque, dt);

        let mut antilock_active = false;
        let mut traction_active = false;
        for i in 0..self.wheels.len() {
            let speed = self.wheels[i].speed;
            let mut torque = inter[i];

            if accelerating
                && let Some(tc) = &self.brakes.traction_control
                && let Some(c) = tc.coefficient(speed, chassis_speed)
            {
                torque *= c;
                traction_active = true;
            }

            let mut brake = self.wheel_brake_torque(i);
            if speed.abs() < BRAKE_FADE_SPEED {
                brake *= speed * speed;
            }
            if let Some(abs) = &self.brakes.antilock
                && let Some(c) = abs.coefficient(speed, chassis_speed)
            {
                brake *= c;
                antilock_active |= AntiLock::engaged(c);
            }
            if speed != 0.0 {
                torque -= speed.signum() * brake;
            }

            if let Some(slope) = &self.brakes.slope_brake {
                let braking = self.brakes.brake > 0.0 || self.brakes.parking;
                let brake_force = self.brakes.brake_force;
                let w = &mut self.wheels[i];
                torque += slope.holding_torque(&mut w.slope_latch, braking, speed, w.rotation, brake_force);
            }

            torque -= speed * ROLLING_FRICTION;
            if self.wheels[i].detached {
                torque = 0.0;
            }
            self.wheels[i].torque = torque;
            self.apply_wheel_torque(i, torque);
        }
        if let Some(abs) = &mut self.brakes.antilock {
            abs.active = antilock_active;
        }
        if let Some(tc) = &mut self.brakes.traction_control {
            tc.active = traction_active;
        }

        for i in 0..self.wheels.len() {
            self.measure_wheel_speed(i, dt);
        }
        self.update_vehicle_wheel_speed(dt);
    }

    fn apply_wheel_torque(&mut self, wheel: usize, torque: f32) {
        if torque == 0.0 {
            return;
        }
        let axis = self.wheel_axis(wheel);
        let w = &self.wheels[wheel];
        let count = w.rim.len().max(1) as f32;
        for (k, &rim) in w.rim.iter().enumerate() {
            let hub = w.axis[k % 2];
            let radius = self.nodes[rim].rel_pos - self.nodes[hub].rel_pos;
            let len_sq = radius.length_squared();
            if len_sq <= f32::EPSILON {
                continue;
            }
            let force = axis.cross(radius) * (torque / count / len_sq);
            self.nodes[rim].forces += force;
        }

        // reaction into the chassis
        let (arm, near) = (w.arm, w.near_attach);
        let arm_vec = self.nodes[arm].rel_pos - self.nodes[near].rel_pos;
        let lever = project_on_plane(arm_vec, axis);
        let offset = (arm_vec - lever).length_squared();
        let len = lever.length();
        if len > MIN_ARM_LENGTH && offset * 2.0 < len * len {
            let force = axis.cross(lever / len) * (torque / len);
            self.nodes[arm].forces -= force;
            self.nodes[near].forces += force;
        }
    }

    fn measure_wheel_speed(&mut self, wheel: usize, dt: f32) {
        let axis = self.wheel_axis(wheel);
        let w = &self.wheels[wheel];
        let mut sum = 0.0;
        let mut count = 0;
        for (k, &rim) in w.rim.iter().enumerate() {
            let hub = w.axis[k % 2];
            let radius = self.nodes[rim].rel_pos - self.nodes[hub].rel_pos;
            let Some(tangent) = axis.cross(radius).try_normalize() else {
                continue;
            };
            sum += (self.nodes[rim].velocity - self.nodes[hub].velocity).dot(tangent);
            count += 1;
        }
        let contact = w
            .rim
            .iter()
            .map(|&r| &self.nodes[r])
            .find(|n| n.contacted)
            .map(|n| (n.last_ground_model, n.last_slip));

        let w = &mut self.wheels[wheel];
        w.last_speed = w.speed;
        w.speed = if count > 0 { sum / count as f32 } else { 0.0 };
        w.avg_speed = w.avg_speed * 0.995 + w.speed * 0.005;
        w.delta_rotation = if w.radius > 0.0 { w.speed / w.radius * dt } else { 0.0 };
        w.rotation += w.delta_rotation;
        if let Some((gm, slip)) = contact {
            w.last_ground_model = gm;
            w.last_slip = slip;
        }
    }

    fn update_vehicle_wheel_speed(&mut self, dt: f32) {
        let driven: Vec<&Wheel> = self.wheels.iter().filter(|w| w.is_propelled() && !w.detached).collect();
        let source: Vec<&Wheel> = if driven.is_empty() {
            self.wheels.iter().filter(|w| !w.detached).collect()
        } else {
            driven
        };
        if source.is_empty() {
            self.wheel_speed = 0.0;
            return;
        }
        let speed = source.iter().map(|w| w.speed).sum::<f32>() / source.len() as f32;
        let radius = source[0].radius;
        self.wheel_speed = speed;
        if let Some(engine) = &mut self.engine {
            engine.set_spin(Engine::spin_from_wheel(speed, radius));
        }
        let distance = (speed * dt).abs();
        self.odometer_total += distance;
        self.odometer_user += distance;
    }
}

//! Speed holding on top of the engine's accelerator.

use crate::def::CruiseDef;
use crate::vehicle::Vehicle;

/// Brake pedal position above which cruise control lets go.
const BRAKE_RELEASE: f32 = 1.0 / 6.0;
/// Time for the target to double while adjusting, seconds.
const ADJUST_DOUBLING_TIME: f32 = 5.0;
const OVERSPEED_MARGIN: f32 = 0.5;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CruiseControl {
    engaged: bool,
    target_speed: f32,
    target_rpm: f32,
    lower_limit: f32,
    can_brake: bool,
    speed_limit: Option<f32>,
}

impl CruiseControl {
    pub fn new(def: &CruiseDef) -> Self {
        Self {
            lower_limit: def.lower_limit.max(0.0),
            can_brake: def.can_brake,
            speed_limit: def.speed_limit,
            ..Self::default()
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn target_speed(&self) -> f32 {
        self.target_speed
    }

    pub fn target_rpm(&self) -> f32 {
        self.target_rpm
    }

    pub fn disengage(&mut self) {
        self.engaged = false;
    }

    fn clamp_speed(&self, speed: f32) -> f32 {
        let speed = speed.max(self.lower_limit);
        match self.speed_limit {
            Some(limit) => speed.min(limit),
            None => speed,
        }
    }
}

impl Vehicle {
    /// Engage at the current speed and rpm, or disengage.
    pub fn toggle_cruise(&mut self) {
        if self.cruise.engaged {
            self.cruise.disengage();
            return;
        }
        let Some(engine) = &self.engine else {
            return;
        };
        self.cruise.engaged = true;
        self.cruise.target_speed = self.wheel_speed.max(0.0);
        self.cruise.target_rpm = engine.rpm();
        tracing::debug!(vehicle = %self.id, target = self.cruise.target_speed, "cruise engaged");
    }

    fn should_disengage(&self) -> bool {
        let Some(engine) = &self.engine else {
            return true;
        };
        self.controls.brake > BRAKE_RELEASE
            || self.controls.clutch > 0.0
            || (self.brakes.parking && engine.gear() != 0)
            || !engine.is_running()
            || !engine.has_contact()
            || (engine.gear() != 0 && self.cruise.target_speed < self.cruise.lower_limit)
    }

    /// Per-frame cruise update, run before the engine reads its accelerator.
    pub(crate) fn update_cruise(&mut self, dt: f32) {
        if !self.cruise.engaged {
            return;
        }
        if self.should_disengage() {
            self.cruise.disengage();
            tracing::debug!(vehicle = %self.id, "cruise disengaged");
            return;
        }
        let Some(engine) = &mut self.engine else {
            return;
        };

        let factor = 2f32.powf(dt / ADJUST_DOUBLING_TIME);
        if self.controls.cruise_accelerate {
            self.cruise.target_speed = self.cruise.clamp_speed(self.cruise.target_speed * factor);
            self.cruise.target_rpm = (self.cruise.target_rpm * factor).min(engine.max_rpm());
        }
        if self.controls.cruise_decelerate {
            self.cruise.target_speed = self.cruise.clamp_speed(self.cruise.target_speed / factor);
            self.cruise.target_rpm = (self.cruise.target_rpm / factor).max(engine.idle_rpm());
        }
        if self.controls.cruise_readjust {
            self.cruise.target_speed = self.cruise.clamp_speed(self.wheel_speed.max(0.0));
            self.cruise.target_rpm = engine.rpm();
        }

        let ws = self.wheel_speed;
        let acc = if engine.gear() != 0 {
            ((self.cruise.target_speed - ws) * 2.0).clamp(self.controls.accelerator, 1.0)
        } else {
            let span = ((engine.max_rpm() - engine.idle_rpm()) / 50.0).max(f32::EPSILON);
            ((self.cruise.target_rpm - engine.rpm()) / span).clamp(self.controls.accelerator, 1.0)
        };
        engine.set_acc(acc.max(0.0));

        if self.cruise.can_brake && engine.gear() != 0 && ws > self.cruise.target_speed + OVERSPEED_MARGIN {
            let over = ((ws - self.cruise.target_speed - OVERSPEED_MARGIN) / 5.0).clamp(0.0, 1.0);
            self.brakes.brake = self.brakes.brake.max(over * self.brakes.brake_force);
        }
    }
}

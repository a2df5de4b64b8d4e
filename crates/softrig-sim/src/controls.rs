//! Driver controls: maps [`InputEvent`] values onto the vehicle's engine,
//! brakes, steering, command keys, lights and coupler requests.

use softrig_net::NetMask;

use crate::adapters::{BounceFilter, InputEvent, InputProvider};
use crate::constants::MAX_COMMANDS;
use crate::couplers::{CouplerRequest, HookMode};
use crate::engine::TransmissionMode;
use crate::events::SimEvent;
use crate::vehicle::Vehicle;

/// Control surface commands and their smoothed states.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Controls {
    pub accelerator: f32,
    pub brake: f32,
    /// Clutch pedal, 1 = pressed.
    pub clutch: f32,
    /// Steering request, positive to the left.
    pub hydro_dir_command: f32,
    pub hydro_dir_state: f32,
    /// Hydro direction shown by the steering wheel.
    pub hydro_dir_wheel_display: f32,
    pub aileron_command: f32,
    pub aileron_state: f32,
    pub rudder_command: f32,
    pub rudder_state: f32,
    pub elevator_command: f32,
    pub elevator_state: f32,
    pub cruise_accelerate: bool,
    pub cruise_decelerate: bool,
    pub cruise_readjust: bool,
}

impl Controls {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

fn axis(input: &dyn InputProvider, positive: InputEvent, negative: InputEvent) -> f32 {
    (input.value(positive) - input.value(negative)).clamp(-1.0, 1.0)
}

const LIGHT_TOGGLES: [(InputEvent, NetMask); 5] = [
    (InputEvent::Lights, NetMask::LIGHTS),
    (InputEvent::Beacons, NetMask::BEACONS),
    (InputEvent::BlinkLeft, NetMask::BLINK_LEFT),
    (InputEvent::BlinkRight, NetMask::BLINK_RIGHT),
    (InputEvent::BlinkWarn, NetMask::BLINK_WARN),
];

fn next_mode(mode: TransmissionMode) -> TransmissionMode {
    match mode {
        TransmissionMode::Automatic => TransmissionMode::SemiAuto,
        TransmissionMode::SemiAuto => TransmissionMode::Manual,
        TransmissionMode::Manual => TransmissionMode::ManualStick,
        TransmissionMode::ManualStick => TransmissionMode::ManualRanges,
        TransmissionMode::ManualRanges => TransmissionMode::Automatic,
    }
}

impl Vehicle {
    /// Read one frame of driver input. Toggle-style events go through
    /// `bounce`; `now` is the host clock in seconds.
    pub fn apply_input(&mut self, input: &dyn InputProvider, bounce: &mut BounceFilter, now: f64) {
        let pressed = |bounce: &mut BounceFilter, event| bounce.pressed(input, event, now);

        self.controls.accelerator = input.value(InputEvent::Accelerate).clamp(0.0, 1.0);
        self.controls.brake = input.value(InputEvent::Brake).clamp(0.0, 1.0);
        self.controls.clutch = input.value(InputEvent::Clutch).clamp(0.0, 1.0);
        self.controls.hydro_dir_command = axis(input, InputEvent::SteerLeft, InputEvent::SteerRight);
        self.controls.aileron_command = axis(input, InputEvent::AileronLeft, InputEvent::AileronRight);
        self.controls.rudder_command = axis(input, InputEvent::RudderLeft, InputEvent::RudderRight);
        self.controls.elevator_command = axis(input, InputEvent::ElevatorUp, InputEvent::ElevatorDown);

        self.brakes.set_pedal(self.controls.brake);
        if pressed(bounce, InputEvent::ParkingBrake) {
            self.brakes.parking = !self.brakes.parking;
        }
        if pressed(bounce, InputEvent::AntiLock)
            && let Some(abs) = &mut self.brakes.antilock
        {
            abs.enabled = !abs.enabled;
        }
        if pressed(bounce, InputEvent::TractionControl)
            && let Some(tc) = &mut self.brakes.traction_control
        {
            tc.enabled = !tc.enabled;
        }

        if let Some(engine) = &mut self.engine {
            if !self.cruise.is_engaged() {
                engine.set_acc(self.controls.accelerator);
            }
            engine.set_manual_clutch(self.controls.clutch);
            engine.set_starter(input.is_pressed(InputEvent::Starter));
            if pressed(bounce, InputEvent::ToggleContact) {
                engine.toggle_contact();
            }
            if pressed(bounce, InputEvent::ShiftUp) {
                engine.shift(1);
            }
            if pressed(bounce, InputEvent::ShiftDown) {
                engine.shift(-1);
            }
            if pressed(bounce, InputEvent::AutoShiftUp) {
                engine.auto_shift_up();
            }
            if pressed(bounce, InputEvent::AutoShiftDown) {
                engine.auto_shift_down();
            }
            if pressed(bounce, InputEvent::SwitchTransmission) {
                let mode = next_mode(engine.mode());
                engine.set_mode(mode);
                tracing::debug!(vehicle = %self.id, ?mode, "transmission mode");
            }
        }

        if pressed(bounce, InputEvent::CruiseToggle) {
            self.toggle_cruise();
        }
        self.controls.cruise_accelerate = input.is_pressed(InputEvent::CruiseAccelerate);
        self.controls.cruise_decelerate = input.is_pressed(InputEvent::CruiseDecelerate);
        self.controls.cruise_readjust = input.is_pressed(InputEvent::CruiseReadjust);

        if pressed(bounce, InputEvent::ToggleAxleLock) {
            for axle in &mut self.axles {
                axle.toggle();
            }
            if let Some(axle) = self.axles.first() {
                tracing::debug!(vehicle = %self.id, diff = axle.name(), "axle differential");
            }
        }

        for (event, request) in [
            (InputEvent::HookToggle, CouplerRequest::Hook { group: -1, mode: HookMode::Toggle }),
            (InputEvent::HookLock, CouplerRequest::Hook { group: -1, mode: HookMode::Lock }),
            (InputEvent::HookUnlock, CouplerRequest::Hook { group: -1, mode: HookMode::Unlock }),
            (InputEvent::TieToggle, CouplerRequest::Tie { group: -1 }),
            (InputEvent::RopeToggle, CouplerRequest::Rope { group: -1 }),
            (InputEvent::SlideNodeToggle, CouplerRequest::SlideNode),
        ] {
            if pressed(bounce, event) {
                self.pending_couplers.push(request);
            }
        }

        let before = self.lights;
        self.lights.set(NetMask::HORN, input.is_pressed(InputEvent::Horn));
        for (event, mask) in LIGHT_TOGGLES {
            if pressed(bounce, event) {
                let on = !self.lights.contains(mask);
                self.lights.set(mask, on);
            }
        }
        if self.lights != before {
            self.emit(SimEvent::LightsChanged {
                vehicle: self.id,
                lights: self.lights,
            });
        }

        for key in 1..=MAX_COMMANDS {
            let value = input.value(InputEvent::Command(key as u8));
            self.set_command_input(key, value);
        }

        if pressed(bounce, InputEvent::Reset) {
            self.request_reset();
        }
    }

    /// Status bits of the network header that mirror local state.
    pub(crate) fn status_mask(&self) -> NetMask {
        let mut mask = self.lights;
        mask.set(NetMask::BRAKES, self.brakes.brake > 0.0);
        mask.set(NetMask::PBRAKE, self.brakes.parking);
        mask.set(NetMask::TC_ACTIVE, self.brakes.traction_active());
        mask.set(NetMask::ALB_ACTIVE, self.brakes.antilock_active());
        if let Some(engine) = &self.engine {
            mask.set(NetMask::REVERSE, engine.gear() < 0);
            mask.set(NetMask::ENGINE_CONT, engine.has_contact());
            mask.set(NetMask::ENGINE_RUN, engine.is_running());
            mask.insert(match engine.mode() {
                TransmissionMode::Automatic => NetMask::ENGINE_MODE_AUTOMATIC,
                TransmissionMode::SemiAuto => NetMask::ENGINE_MODE_SEMIAUTO,
                TransmissionMode::Manual => NetMask::ENGINE_MODE_MANUAL,
                TransmissionMode::ManualStick => NetMask::ENGINE_MODE_MANUAL_STICK,
                TransmissionMode::ManualRanges => NetMask::ENGINE_MODE_MANUAL_RANGES,
            });
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::adapters::ScriptedInput;
    use crate::builder::build_vehicle;
    use crate::context::SimContext;
    use crate::def::{NodeDef, VehicleDef};
    use crate::ids::VehicleId;

    fn vehicle() -> Vehicle {
        let def = VehicleDef {
            nodes: vec![NodeDef::at(0.0, 0.0, 0.0)],
            ..VehicleDef::default()
        };
        build_vehicle(VehicleId(0), &def, Vec3::ZERO, &SimContext::default()).expect("valid")
    }

    #[test]
    fn test_steering_axis_and_pedals() {
        let mut v = vehicle();
        let mut input = ScriptedInput::new();
        input.set(InputEvent::SteerLeft, 1.0);
        input.set(InputEvent::SteerRight, 0.25);
        input.set(InputEvent::Brake, 0.5);
        let mut bounce = BounceFilter::new(0.2);
        v.apply_input(&input, &mut bounce, 0.0);
        assert_eq!(v.controls.hydro_dir_command, 0.75);
        assert_eq!(v.brakes.brake, 0.5 * v.brakes.brake_force);
    }

    #[test]
    fn test_toggles_are_debounced() {
        let mut v = vehicle();
        let mut input = ScriptedInput::new();
        input.set(InputEvent::Lights, 1.0);
        input.set(InputEvent::HookToggle, 1.0);
        let mut bounce = BounceFilter::new(0.2);
        v.apply_input(&input, &mut bounce, 0.0);
        v.apply_input(&input, &mut bounce, 0.1);
        assert!(v.lights.contains(NetMask::LIGHTS));
        assert_eq!(v.pending_couplers.len(), 1);
        v.apply_input(&input, &mut bounce, 0.5);
        assert!(!v.lights.contains(NetMask::LIGHTS));
    }

    #[test]
    fn test_command_keys_follow_input() {
        let mut v = vehicle();
        let mut input = ScriptedInput::new();
        input.set(InputEvent::Command(3), 1.0);
        v.apply_input(&input, &mut BounceFilter::new(0.2), 0.0);
        assert_eq!(v.command_key(3).map(|k| k.player), Some(1.0));
        assert_eq!(v.command_key(4).map(|k| k.player), Some(0.0));
    }
}

//! Engine, clutch and gearbox.
//!
//! The engine integrates its own rpm from combustion torque, engine braking,
//! hydraulic pump load and the clutch reaction. The clutch torque is what
//! the wheel stage distributes to the driven wheels.

use serde::{Deserialize, Serialize};

use crate::constants::RAD_PER_SEC_TO_RPM;

/// Clutch stiffness in N·m per rpm of slip.
const CLUTCH_FORCE: f32 = 10_000.0;
/// Seconds the clutch needs to open or close during an automatic shift.
const CLUTCH_TIME: f32 = 0.2;
const SHIFT_TIME: f32 = 0.5;
const POST_SHIFT_TIME: f32 = 0.2;
const STALL_RPM: f32 = 300.0;
const ENGINE_INERTIA: f32 = 10.0;
const MAX_IDLE_MIXTURE: f32 = 0.2;
const MIN_IDLE_MIXTURE: f32 = 0.0;
const CRANKING_RPM: f32 = 750.0;
const MAX_CLUTCH_TORQUE: f32 = 1_000_000.0;

/// Gearbox operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionMode {
    #[default]
    Automatic,
    SemiAuto,
    Manual,
    ManualStick,
    ManualRanges,
}

impl TransmissionMode {
    /// The gearbox drives the clutch itself.
    pub fn is_auto_clutch(self) -> bool {
        matches!(self, TransmissionMode::Automatic | TransmissionMode::SemiAuto)
    }

    pub fn is_manual(self) -> bool {
        !self.is_auto_clutch()
    }
}

/// Selector lever position of the automatic gearbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoSelect {
    Rear,
    Neutral,
    #[default]
    Drive,
    Two,
    One,
    ManualMode,
}

/// Engine description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineDef {
    pub min_rpm: f32,
    pub max_rpm: f32,
    /// Peak torque, N·m.
    pub torque: f32,
    pub differential_ratio: f32,
    /// Reverse, neutral, then forward ratios.
    pub gears: Vec<f32>,
    pub mode: TransmissionMode,
    pub inertia: f32,
}

impl Default for EngineDef {
    fn default() -> Self {
        Self {
            min_rpm: 800.0,
            max_rpm: 5000.0,
            torque: 1000.0,
            differential_ratio: 3.0,
            gears: vec![3.0, 1.0, 3.5, 2.2, 1.5, 1.0],
            mode: TransmissionMode::Automatic,
            inertia: ENGINE_INERTIA,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    mode: TransmissionMode,
    autoselect: AutoSelect,
    min_rpm: f32,
    max_rpm: f32,
    idle_rpm: f32,
    stall_rpm: f32,
    /// Engine braking torque, negative.
    braking_torque: f32,
    conf_torque: f32,
    inertia: f32,
    /// Index 0 is reverse, 1 neutral; each includes the final drive.
    ratios: Vec<f32>,
    num_gears: i32,

    rpm: f32,
    acc: f32,
    auto_acc: f32,
    clutch: f32,
    clutch_torque: f32,
    gear: i32,
    next_gear: i32,
    wheel_revolutions: f32,
    hydropump: f32,
    prime: bool,
    starter: bool,
    running: bool,
    contact: bool,

    shifting: bool,
    shift_clock: f32,
    post_shifting: bool,
    post_shift_clock: f32,
}

impl Engine {
    pub fn new(def: &EngineDef) -> Self {
        let braking_torque = -def.torque / 5.0;
        let mut ratios: Vec<f32> = def.gears.iter().map(|r| r * def.differential_ratio).collect();
        if let Some(reverse) = ratios.first_mut() {
            *reverse = -*reverse;
        }
        while ratios.len() < 2 {
            ratios.push(0.0);
        }
        let num_gears = ratios.len() as i32 - 2;
        Self {
            mode: def.mode,
            autoselect: AutoSelect::Drive,
            min_rpm: def.min_rpm,
            max_rpm: def.max_rpm.max(def.min_rpm + 1.0),
            idle_rpm: def.min_rpm.min(800.0),
            stall_rpm: STALL_RPM,
            braking_torque,
            conf_torque: def.torque - braking_torque,
            inertia: if def.inertia > 0.0 { def.inertia } else { ENGINE_INERTIA },
            ratios,
            num_gears,
            rpm: 0.0,
            acc: 0.0,
            auto_acc: 0.0,
            clutch: 0.0,
            clutch_torque: 0.0,
            gear: 0,
            next_gear: 0,
            wheel_revolutions: 0.0,
            hydropump: 0.0,
            prime: false,
            starter: false,
            running: false,
            contact: false,
            shifting: false,
            shift_clock: 0.0,
            post_shifting: false,
            post_shift_clock: 0.0,
        }
    }

    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    pub fn acc(&self) -> f32 {
        self.acc
    }

    pub fn clutch(&self) -> f32 {
        self.clutch
    }

    pub fn gear(&self) -> i32 {
        self.gear
    }

    pub fn num_gears(&self) -> i32 {
        self.num_gears
    }

    pub fn mode(&self) -> TransmissionMode {
        self.mode
    }

    pub fn autoselect(&self) -> AutoSelect {
        self.autoselect
    }

    pub fn idle_rpm(&self) -> f32 {
        self.idle_rpm
    }

    pub fn max_rpm(&self) -> f32 {
        self.max_rpm
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_contact(&self) -> bool {
        self.contact
    }

    pub fn is_shifting(&self) -> bool {
        self.shifting
    }

    pub fn hydropump(&self) -> f32 {
        self.hydropump
    }

    /// Clutch torque delivered to the driveline.
    pub fn torque(&self) -> f32 {
        self.clutch_torque.clamp(-MAX_CLUTCH_TORQUE, MAX_CLUTCH_TORQUE)
    }

    /// Hydraulic pressure factor for command beams, 0 at idle up to 5.
    pub fn crank_factor(&self) -> f32 {
        let min = 1.1 * self.idle_rpm;
        let range = self.max_rpm - min;
        if range <= 0.0 {
            return 0.0;
        }
        5.0 * ((self.rpm - min) / range).clamp(0.0, 1.0)
    }

    /// Accelerator input. While an automatic shift is running only the
    /// requested value is stored.
    pub fn set_acc(&mut self, value: f32) {
        self.auto_acc = value;
        if !self.shifting {
            self.acc = value;
        }
    }

    pub fn set_clutch(&mut self, value: f32) {
        self.clutch = value.clamp(0.0, 1.0);
    }

    /// Clutch pedal, 1 = pressed. Ignored by the self-clutching modes.
    pub fn set_manual_clutch(&mut self, value: f32) {
        if self.mode.is_manual() {
            self.clutch = 1.0 - value.max(0.0).min(1.0);
        }
    }

    /// Average angular speed of the driven wheels, in rpm.
    pub fn set_spin(&mut self, wheel_rpm: f32) {
        self.wheel_revolutions = wheel_rpm;
    }

    /// Wheel surface speed to driveline rpm.
    pub fn spin_from_wheel(speed: f32, radius: f32) -> f32 {
        if radius > 0.0 {
            speed / radius * RAD_PER_SEC_TO_RPM
        } else {
            0.0
        }
    }

    pub fn set_hydropump(&mut self, work: f32) {
        self.hydropump = work;
    }

    pub fn set_prime(&mut self, prime: bool) {
        self.prime = prime;
    }

    pub fn set_starter(&mut self, on: bool) {
        self.starter = on;
        if on && self.rpm < CRANKING_RPM {
            self.acc = 1.0;
        }
    }

    pub fn toggle_contact(&mut self) {
        self.contact = !self.contact;
    }

    pub fn set_mode(&mut self, mode: TransmissionMode) {
        self.mode = mode;
    }

    /// Start the engine instantly in a drivable gear.
    pub fn start(&mut self) {
        self.gear = match self.mode {
            TransmissionMode::Automatic => {
                self.autoselect = AutoSelect::Drive;
                1
            }
            TransmissionMode::SemiAuto => 1,
            _ => 0,
        };
        self.next_gear = self.gear;
        self.clutch = 0.0;
        self.rpm = CRANKING_RPM;
        self.running = true;
        self.contact = true;
        self.acc = 0.0;
        self.auto_acc = 0.0;
        self.shifting = false;
        self.post_shifting = false;
    }

    /// Switch off and stop dead.
    pub fn stop(&mut self) {
        self.gear = 0;
        self.next_gear = 0;
        self.rpm = 0.0;
        self.clutch_torque = 0.0;
        self.running = false;
        self.contact = false;
    }

    /// Change gear by `delta`. Self-clutching modes start a timed shift;
    /// manual modes need the clutch pedal pressed.
    pub fn shift(&mut self, delta: i32) {
        if delta == 0 {
            return;
        }
        let target = self.gear + delta;
        if target < -1 || target > self.num_gears {
            return;
        }
        if self.mode.is_auto_clutch() {
            self.next_gear = target;
            self.shifting = true;
            self.shift_clock = 0.0;
            self.acc = 0.0;
        } else if self.clutch <= 0.25 {
            self.gear = target;
        }
    }

    pub fn shift_to(&mut self, gear: i32) {
        self.shift(gear - self.gear);
    }

    pub fn auto_shift_up(&mut self) {
        self.autoselect = match self.autoselect {
            AutoSelect::Rear => AutoSelect::Neutral,
            AutoSelect::Neutral => AutoSelect::Drive,
            AutoSelect::Drive => AutoSelect::Drive,
            AutoSelect::Two => AutoSelect::Drive,
            AutoSelect::One => AutoSelect::Two,
            AutoSelect::ManualMode => AutoSelect::One,
        };
        self.apply_autoselect();
    }

    pub fn auto_shift_down(&mut self) {
        self.autoselect = match self.autoselect {
            AutoSelect::Rear => AutoSelect::Rear,
            AutoSelect::Neutral => AutoSelect::Rear,
            AutoSelect::Drive => AutoSelect::Two,
            AutoSelect::Two => AutoSelect::One,
            AutoSelect::One => AutoSelect::ManualMode,
            AutoSelect::ManualMode => AutoSelect::ManualMode,
        };
        self.apply_autoselect();
    }

    fn apply_autoselect(&mut self) {
        if self.mode != TransmissionMode::Automatic {
            return;
        }
        let target = match self.autoselect {
            AutoSelect::Rear => -1,
            AutoSelect::Neutral => 0,
            AutoSelect::Drive | AutoSelect::ManualMode => self.gear.max(1),
            AutoSelect::Two => self.gear.clamp(1, 2),
            AutoSelect::One => 1,
        };
        if target != self.gear {
            self.shift_to(target);
        }
    }

    /// Overwrite the state from a network frame.
    pub fn apply_network_state(
        &mut self,
        rpm: f32,
        acc: f32,
        clutch: f32,
        gear: i32,
        running: bool,
        contact: bool,
        mode: TransmissionMode,
    ) {
        self.rpm = rpm;
        self.acc = acc;
        self.clutch = clutch;
        self.gear = gear;
        self.running = running;
        self.contact = contact;
        self.mode = mode;
    }

    fn power(&self) -> f32 {
        // flat curve
        self.conf_torque
    }

    fn idle_mixture(&self) -> f32 {
        if self.rpm >= self.idle_rpm {
            return 0.0;
        }
        let power = self.power();
        if power <= 0.0 {
            return MAX_IDLE_MIXTURE;
        }
        let brake = -self.braking_torque * (self.rpm / (1.25 * self.max_rpm)).min(1.0);
        let mix = (brake / power).max(0.06) * (1.0 + (self.idle_rpm - self.rpm) / 100.0);
        mix.clamp(MIN_IDLE_MIXTURE, MAX_IDLE_MIXTURE)
    }

    fn prime_mixture(&self) -> f32 {
        if !self.prime {
            return 0.0;
        }
        let cf = self.crank_factor();
        if cf < 0.9 {
            1.0
        } else if cf < 1.0 {
            10.0 * (1.0 - cf)
        } else {
            0.0
        }
    }

    fn gear_ratio(&self, gear: i32) -> f32 {
        self.ratios.get((gear + 1) as usize).copied().unwrap_or(0.0)
    }

    /// Advance one sub-step. `do_update` is true on the first sub-step of a
    /// visual frame, when the gearbox logic runs.
    pub fn update(&mut self, dt: f32, do_update: bool) {
        let acc = self.acc.max(self.idle_mixture()).max(self.prime_mixture());

        let mut total = self.braking_torque * self.rpm / self.max_rpm;
        if !self.contact {
            total *= 10.0;
        }
        if self.rpm > 100.0 {
            total -= 8.0 * self.hydropump / (self.rpm * 0.105 * dt);
        }
        if self.running && self.contact && self.rpm < self.max_rpm * 1.25 {
            total += self.power() * acc;
        }

        if self.running && self.rpm < self.stall_rpm {
            self.running = false;
            tracing::debug!(rpm = self.rpm, "engine stalled");
        }
        if self.contact && self.starter && self.rpm < self.stall_rpm * 1.5 {
            total += -self.braking_torque;
        }
        if !self.running && self.contact && self.rpm > self.stall_rpm {
            self.running = true;
        }

        let ratio = self.gear_ratio(self.gear);
        if self.gear != 0 && ratio != 0.0 {
            total -= self.clutch_torque / ratio;
        }
        self.rpm += dt * total / self.inertia;

        self.clutch_torque = if self.gear != 0 && ratio != 0.0 {
            (self.rpm / ratio - self.wheel_revolutions) * self.clutch * self.clutch * CLUTCH_FORCE
        } else {
            0.0
        };
        self.rpm = self.rpm.max(0.0);

        if self.mode.is_auto_clutch() {
            self.update_gearbox(dt);
            self.auto_declutch(dt);
            if do_update {
                self.auto_shift();
            }
        }
    }

    fn update_gearbox(&mut self, dt: f32) {
        if !self.shifting {
            self.acc = self.auto_acc;
            return;
        }
        self.shift_clock += dt;
        if self.shift_clock < CLUTCH_TIME {
            self.clutch = (1.0 - self.shift_clock / CLUTCH_TIME).max(0.0);
        } else if self.shift_clock > SHIFT_TIME - CLUTCH_TIME {
            self.clutch = ((self.shift_clock - (SHIFT_TIME - CLUTCH_TIME)) / CLUTCH_TIME).min(1.0);
        } else {
            self.clutch = 0.0;
        }
        if self.shift_clock > CLUTCH_TIME / 2.0 && self.gear != self.next_gear {
            self.gear = self.next_gear.clamp(-1, self.num_gears);
        }
        if self.shift_clock > SHIFT_TIME {
            self.acc = self.auto_acc;
            self.shifting = false;
            self.clutch = 1.0;
            self.post_shifting = true;
            self.post_shift_clock = 0.0;
        }
    }

    fn auto_declutch(&mut self, dt: f32) {
        if self.post_shifting {
            self.post_shift_clock += dt;
            if self.post_shift_clock > POST_SHIFT_TIME {
                self.post_shifting = false;
            }
        }
        let low = self.rpm < self.stall_rpm * 1.2;
        if self.shifting {
            if low {
                self.clutch = 0.0;
            }
        } else if self.post_shifting {
            self.clutch = if low && self.acc < 0.5 { 0.0 } else { 1.0 };
        } else if low && self.acc < 0.5 {
            self.clutch = 0.0;
        } else if self.gear.abs() == 1 {
            self.clutch = if self.rpm > self.min_rpm {
                ((self.rpm - self.min_rpm) / (self.max_rpm - self.min_rpm)).min(1.0)
            } else {
                0.0
            };
        } else {
            self.clutch = 1.0;
        }
    }

    fn auto_shift(&mut self) {
        if self.shifting
            || self.post_shifting
            || self.mode != TransmissionMode::Automatic
            || self.autoselect != AutoSelect::Drive
            || self.gear <= 0
        {
            return;
        }
        let wheel_engine_rpm = self.wheel_revolutions * self.gear_ratio(self.gear);
        if (self.rpm > self.max_rpm - 100.0 && self.gear > 1) || wheel_engine_rpm > self.max_rpm - 100.0 {
            if self.gear < self.num_gears {
                self.shift(1);
            }
        } else if self.gear > 1 && self.rpm < self.min_rpm {
            self.shift(-1);
        }
        let excess = wheel_engine_rpm - self.max_rpm;
        if excess > 0.0 {
            self.clutch = self.clutch.min(1.0 / (1.0 + excess / 2.0));
        }
    }
}

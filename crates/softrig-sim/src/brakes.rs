//! Service brake, parking brake and the driving aids modulating them.

use serde::{Deserialize, Serialize};

/// Pulse rates outside `(1, 2000)` fall back to the fastest rate.
/// Brake multiplier at or below which the anti-lock flag is raised.
const ANTILOCK_ENGAGED_COEF: f32 = 0.9;

fn pulse_time(pulse_per_sec: f32) -> f32 {
    let pulse = if pulse_per_sec <= 1.0 || pulse_per_sec >= 2000.0 {
        2000.0
    } else {
        pulse_per_sec
    };
    1.0 / pulse
}

/// Free-running square wave.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulse {
    period: f32,
    timer: f32,
    state: bool,
}

impl Pulse {
    pub fn new(pulse_per_sec: f32) -> Self {
        Self {
            period: pulse_time(pulse_per_sec),
            timer: 0.0,
            state: false,
        }
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn tick(&mut self, dt: f32) {
        self.timer += dt;
        if self.timer >= self.period {
            self.timer = 0.0;
            self.state = !self.state;
        }
    }

    pub fn is_high(&self) -> bool {
        self.state
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiLockDef {
    /// Exponent of the speed ratio; clamped to `[0, 20]`.
    pub ratio: f32,
    /// Minimum chassis speed in km/h.
    pub min_speed: f32,
    pub pulse_per_sec: f32,
    pub enabled: bool,
}

impl Default for AntiLockDef {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            min_speed: 3.0,
            pulse_per_sec: 2000.0,
            enabled: true,
        }
    }
}

/// Anti-lock brakes.
#[derive(Debug, Clone, PartialEq)]
pub struct AntiLock {
    pub enabled: bool,
    pub ratio: f32,
    /// Chassis speed below which the system stays passive, m/s.
    pub min_speed: f32,
    pub pulse: Pulse,
    /// Set while the last evaluated coefficient was below 0.9.
    pub active: bool,
}

impl AntiLock {
    pub fn new(def: &AntiLockDef) -> Self {
        if !(0.0..=20.0).contains(&def.ratio) {
            tracing::info!(ratio = def.ratio, "clamping anti-lock ratio to 0..=20");
        }
        Self {
            enabled: def.enabled,
            ratio: def.ratio.clamp(0.0, 20.0),
            min_speed: (def.min_speed / 3.6).max(0.5),
            pulse: Pulse::new(def.pulse_per_sec),
            active: false,
        }
    }

    /// True if a brake multiplier of `coef` counts as the system
    /// intervening.
    pub fn engaged(coef: f32) -> bool {
        coef <= ANTILOCK_ENGAGED_COEF
    }

    /// Brake torque multiplier for a wheel turning at `wheel_speed` under a
    /// chassis moving at `chassis_speed`, or `None` when the system does not
    /// intervene this sub-step.
    pub fn coefficient(&self, wheel_speed: f32, chassis_speed: f32) -> Option<f32> {
        let ws = wheel_speed.abs();
        if !self.enabled || !self.pulse.is_high() || chassis_speed <= ws || chassis_speed <= self.min_speed {
            return None;
        }
        Some((ws / chassis_speed).powf(self.ratio))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TractionControlDef {
    pub ratio: f32,
    /// Allowed slip fraction.
    pub wheel_slip: f32,
    /// Speed at which the allowed slip doubles, m/s.
    pub fade_speed: f32,
    pub pulse_per_sec: f32,
    pub enabled: bool,
}

impl Default for TractionControlDef {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            wheel_slip: 0.25,
            fade_speed: 10.0,
            pulse_per_sec: 2000.0,
            enabled: true,
        }
    }
}

/// Traction control.
#[derive(Debug, Clone, PartialEq)]
pub struct TractionControl {
    pub enabled: bool,
    pub ratio: f32,
    pub wheel_slip: f32,
    pub fade_speed: f32,
    pub pulse: Pulse,
    pub active: bool,
}

impl TractionControl {
    pub fn new(def: &TractionControlDef) -> Self {
        Self {
            enabled: def.enabled,
            ratio: def.ratio.clamp(0.0, 20.0),
            wheel_slip: def.wheel_slip.max(0.0),
            fade_speed: def.fade_speed.max(0.1),
            pulse: Pulse::new(def.pulse_per_sec),
            active: false,
        }
    }

    /// Drive torque multiplier for a spinning wheel, or `None` when the wheel
    /// is within the allowed slip.
    pub fn coefficient(&self, wheel_speed: f32, chassis_speed: f32) -> Option<f32> {
        let ws = wheel_speed.abs();
        if !self.enabled || !self.pulse.is_high() || ws <= chassis_speed {
            return None;
        }
        let speed = chassis_speed.max(0.5);
        let slip = 1.0 + self.wheel_slip + self.wheel_slip * speed / self.fade_speed;
        if ws > speed * slip {
            Some((speed * slip / ws).powf(self.ratio))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlopeBrakeDef {
    /// Exponent of the excess angle; clamped to `[0, 20]`.
    pub factor: f32,
    /// Degrees; clamped to `[1, 45]`.
    pub attach_angle: f32,
    /// Degrees beyond the attach angle; clamped to `[1, 45]`.
    pub release_angle: f32,
}

impl Default for SlopeBrakeDef {
    fn default() -> Self {
        Self {
            factor: 6.0,
            attach_angle: 5.0,
            release_angle: 10.0,
        }
    }
}

/// Holds a braked, stationary vehicle on a slope.
#[derive(Debug, Clone, PartialEq)]
pub struct SlopeBrake {
    pub factor: f32,
    pub attach_angle: f32,
    /// Absolute release angle in degrees.
    pub release_angle: f32,
}

/// Wheel surface speed under which a braked wheel latches its angle.
const SLOPE_LATCH_SPEED: f32 = 0.1;

impl SlopeBrake {
    pub fn new(def: &SlopeBrakeDef) -> Self {
        let attach = def.attach_angle.clamp(1.0, 45.0);
        Self {
            factor: def.factor.clamp(0.0, 20.0),
            attach_angle: attach,
            release_angle: def.release_angle.clamp(1.0, 45.0) + attach,
        }
    }

    /// Update the wheel's latch and return the holding torque. `angle` is the
    /// wheel's accumulated rotation in radians.
    pub fn holding_torque(
        &self,
        latch: &mut Option<f32>,
        braking: bool,
        wheel_speed: f32,
        angle: f32,
        brake_force: f32,
    ) -> f32 {
        if !braking {
            *latch = None;
            return 0.0;
        }
        let anchor = match *latch {
            Some(anchor) => anchor,
            None if wheel_speed.abs() < SLOPE_LATCH_SPEED => {
                *latch = Some(angle);
                return 0.0;
            }
            None => return 0.0,
        };
        let rolled = (angle - anchor).to_degrees();
        if rolled.abs() <= self.release_angle {
            return 0.0;
        }
        let torque = (rolled.abs() - self.attach_angle)
            .powf(self.factor)
            .min(2.0 * brake_force);
        -rolled.signum() * torque
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrakesDef {
    pub brake_force: f32,
    /// Defaults to twice the service brake force.
    pub parking_force: Option<f32>,
    pub antilock: Option<AntiLockDef>,
    pub traction_control: Option<TractionControlDef>,
    pub slope_brake: Option<SlopeBrakeDef>,
}

impl Default for BrakesDef {
    fn default() -> Self {
        Self {
            brake_force: 30_000.0,
            parking_force: None,
            antilock: None,
            traction_control: None,
            slope_brake: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Brakes {
    pub brake_force: f32,
    pub parking_force: f32,
    /// Current service brake torque.
    pub brake: f32,
    pub parking: bool,
    pub antilock: Option<AntiLock>,
    pub traction_control: Option<TractionControl>,
    pub slope_brake: Option<SlopeBrake>,
}

impl Brakes {
    pub fn new(def: &BrakesDef) -> Self {
        Self {
            brake_force: def.brake_force.max(0.0),
            parking_force: def.parking_force.unwrap_or(2.0 * def.brake_force).max(0.0),
            brake: 0.0,
            parking: false,
            antilock: def.antilock.as_ref().map(AntiLock::new),
            traction_control: def.traction_control.as_ref().map(TractionControl::new),
            slope_brake: def.slope_brake.as_ref().map(SlopeBrake::new),
        }
    }

    /// Pedal position in `[0, 1]`.
    pub fn set_pedal(&mut self, pedal: f32) {
        self.brake = pedal.clamp(0.0, 1.0) * self.brake_force;
    }

    pub fn tick_pulses(&mut self, dt: f32) {
        if let Some(abs) = &mut self.antilock {
            abs.pulse.tick(dt);
        }
        if let Some(tc) = &mut self.traction_control {
            tc.pulse.tick(dt);
        }
    }

    pub fn antilock_active(&self) -> bool {
        self.antilock.as_ref().is_some_and(|a| a.active)
    }

    pub fn traction_active(&self) -> bool {
        self.traction_control.as_ref().is_some_and(|t| t.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_toggles_at_period() {
        let mut pulse = Pulse::new(8.0);
        assert_eq!(pulse.period(), 0.125);
        let dt = 0.0005;
        for _ in 0..249 {
            pulse.tick(dt);
        }
        assert!(!pulse.is_high());
        pulse.tick(dt);
        pulse.tick(dt);
        assert!(pulse.is_high());
        assert_eq!(Pulse::new(0.5).period(), 1.0 / 2000.0);
    }

    #[test]
    fn test_antilock_ratio_clamped() {
        let abs = AntiLock::new(&AntiLockDef {
            ratio: 50.0,
            ..AntiLockDef::default()
        });
        assert_eq!(abs.ratio, 20.0);
        assert_eq!(abs.min_speed, 0.5f32.max(3.0 / 3.6));
    }

    #[test]
    fn test_antilock_coefficient() {
        let mut abs = AntiLock::new(&AntiLockDef {
            ratio: 2.0,
            ..AntiLockDef::default()
        });
        // idle until the first pulse edge
        assert!(abs.coefficient(10.0, 20.0).is_none());
        let period = abs.pulse.period();
        abs.pulse.tick(period);
        let c = abs.coefficient(10.0, 20.0).unwrap();
        assert!((c - 0.25).abs() < 1e-6);
        assert!(abs.coefficient(25.0, 20.0).is_none());
        assert!(abs.coefficient(0.0, 0.6).is_none());
    }

    #[test]
    fn test_antilock_flag_boundary() {
        let mut abs = AntiLock::new(&AntiLockDef {
            ratio: 1.0,
            ..AntiLockDef::default()
        });
        let period = abs.pulse.period();
        abs.pulse.tick(period);
        let c = abs.coefficient(9.0, 10.0).unwrap();
        assert_eq!(c, 0.9);
        assert!(AntiLock::engaged(c));
        assert!(AntiLock::engaged(0.5));
        assert!(!AntiLock::engaged(0.91));
    }

    #[test]
    fn test_traction_limits_spin() {
        let tc = TractionControl::new(&TractionControlDef::default());
        assert!(tc.coefficient(5.0, 5.0).is_none());
        let c = tc.coefficient(20.0, 5.0).unwrap();
        assert!(c < 1.0 && c > 0.0);
    }

    #[test]
    fn test_slope_brake_latches_and_holds() {
        let slope = SlopeBrake::new(&SlopeBrakeDef::default());
        let mut latch = None;
        assert_eq!(slope.holding_torque(&mut latch, true, 0.0, 1.0, 1000.0), 0.0);
        assert_eq!(latch, Some(1.0));
        let small = 1.0 + 10f32.to_radians();
        assert_eq!(slope.holding_torque(&mut latch, true, 0.5, small, 1000.0), 0.0);
        let big = 1.0 + 30f32.to_radians();
        let t = slope.holding_torque(&mut latch, true, 0.5, big, 1000.0);
        assert_eq!(t, -2000.0);
        slope.holding_torque(&mut latch, false, 0.0, big, 1000.0);
        assert!(latch.is_none());
    }
}

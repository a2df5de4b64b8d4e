//! Shock descriptors: progressive spring/damper curves and trigger fences.

use crate::constants::{DEFAULT_DAMP, DEFAULT_SPRING};

/// Behaviour bits of a shock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ShockFlags(pub u32);

impl ShockFlags {
    /// Hard stop with bottom-stop spring/damp outside the bounds.
    pub const NORMAL: ShockFlags = ShockFlags(1 << 0);
    pub const INVISIBLE: ShockFlags = ShockFlags(1 << 1);
    /// Stabiliser shock lengthening with positive ratio.
    pub const RACTIVE: ShockFlags = ShockFlags(1 << 2);
    /// Stabiliser shock shortening with positive ratio.
    pub const LACTIVE: ShockFlags = ShockFlags(1 << 3);
    /// Progressive pre-limit region at 0.8 of each bound.
    pub const SOFTBUMP: ShockFlags = ShockFlags(1 << 4);
    pub const ISSHOCK2: ShockFlags = ShockFlags(1 << 5);
    pub const ISTRIGGER: ShockFlags = ShockFlags(1 << 6);
    /// Disables the next `cmd_short` triggers while outside its bounds.
    pub const TRG_BLOCKER: ShockFlags = ShockFlags(1 << 7);
    /// Routes a command key press into the key's block state.
    pub const TRG_CMD_BLOCKER: ShockFlags = ShockFlags(1 << 8);
    /// Swaps the command ids of matching trigger pairs.
    pub const TRG_CMD_SWITCH: ShockFlags = ShockFlags(1 << 9);
    pub const TRG_HOOK_UNLOCK: ShockFlags = ShockFlags(1 << 10);
    pub const TRG_HOOK_LOCK: ShockFlags = ShockFlags(1 << 11);
    /// Analog output proportional to the position between the bounds.
    pub const TRG_CONTINUOUS: ShockFlags = ShockFlags(1 << 12);
    pub const TRG_ENGINE: ShockFlags = ShockFlags(1 << 13);
    /// Enables the next `cmd_long` triggers while outside its bounds.
    pub const TRG_BLOCKER_A: ShockFlags = ShockFlags(1 << 14);

    pub const fn empty() -> Self {
        ShockFlags(0)
    }

    pub const fn contains(self, other: ShockFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ShockFlags {
    type Output = ShockFlags;

    fn bitor(self, rhs: ShockFlags) -> ShockFlags {
        ShockFlags(self.0 | rhs.0)
    }
}

/// Engine action routed from an engine trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTriggerAction {
    Clutch,
    Brake,
    Accelerator,
    /// Accepted for compatibility; has no effect.
    Rpm,
    ShiftUp,
    ShiftDown,
}

impl EngineTriggerAction {
    pub fn from_id(id: i32) -> Option<Self> {
        Some(match id {
            0 => EngineTriggerAction::Clutch,
            1 => EngineTriggerAction::Brake,
            2 => EngineTriggerAction::Accelerator,
            3 => EngineTriggerAction::Rpm,
            4 => EngineTriggerAction::ShiftUp,
            5 => EngineTriggerAction::ShiftDown,
            _ => return None,
        })
    }
}

/// Progressive shock parameters plus trigger state.
#[derive(Debug, Clone, PartialEq)]
pub struct Shock {
    /// Owning beam.
    pub beam: usize,
    pub flags: ShockFlags,
    pub spring_in: f32,
    pub damp_in: f32,
    pub progress_spring_in: f32,
    pub progress_damp_in: f32,
    pub spring_out: f32,
    pub damp_out: f32,
    pub progress_spring_out: f32,
    pub progress_damp_out: f32,
    /// Bottom-stop spring used past the bounds.
    pub stop_spring: f32,
    pub stop_damp: f32,
    /// Beam deviation seen on the previous sub-step.
    pub last_pos: f32,
    pub trigger_enabled: bool,
    pub trigger_cmd_short: i32,
    pub trigger_cmd_long: i32,
    /// Cooldown applied after a command switch.
    pub trigger_boundary_time: f32,
    pub trigger_switch_state: f32,
    /// Last debug message emitted, to avoid repeating it every sub-step.
    pub last_debug_state: u8,
}

impl Shock {
    pub fn new(beam: usize, flags: ShockFlags) -> Self {
        Self {
            beam,
            flags,
            spring_in: DEFAULT_SPRING,
            damp_in: DEFAULT_DAMP,
            progress_spring_in: 0.0,
            progress_damp_in: 0.0,
            spring_out: DEFAULT_SPRING,
            damp_out: DEFAULT_DAMP,
            progress_spring_out: 0.0,
            progress_damp_out: 0.0,
            stop_spring: DEFAULT_SPRING,
            stop_damp: DEFAULT_DAMP,
            last_pos: 0.0,
            trigger_enabled: true,
            trigger_cmd_short: 0,
            trigger_cmd_long: 0,
            trigger_boundary_time: 0.0,
            trigger_switch_state: 0.0,
            last_debug_state: 0,
        }
    }

    pub fn is_trigger(&self) -> bool {
        self.flags.contains(ShockFlags::ISTRIGGER)
    }
}

/// Where a shock sits relative to its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundState {
    Inside,
    PastLong,
    PastShort,
}

pub fn bound_state(diff: f32, length: f32, long_bound: f32, short_bound: f32) -> BoundState {
    if diff > long_bound * length {
        BoundState::PastLong
    } else if diff < -short_bound * length {
        BoundState::PastShort
    } else {
        BoundState::Inside
    }
}

/// Squared progression factor, saturating at 1. A zero bound means full
/// progression.
fn progression(numerator: f32, bound: f32, length: f32) -> f32 {
    if bound == 0.0 {
        return 1.0;
    }
    let f = numerator / (bound * length);
    (f * f).min(1.0)
}

/// Shock-1: blend `k`/`d` towards the stop values by the overshoot beyond
/// the bounds. Hydros blend to their own bottom-stop values, everything
/// else to the defaults.
pub fn shock1_coefficients(
    k: f32,
    d: f32,
    diff: f32,
    length: f32,
    long_bound: f32,
    short_bound: f32,
    stop: Option<(f32, f32)>,
) -> (f32, f32) {
    let ratio = if diff > long_bound * length {
        diff - long_bound * length
    } else if diff < -short_bound * length {
        -diff - short_bound * length
    } else {
        return (k, d);
    };
    let (ts, td) = stop.unwrap_or((DEFAULT_SPRING, DEFAULT_DAMP));
    (k + (ts - k) * ratio, d + (td - d) * ratio)
}

/// Shock-2: progressive in/out spring and damping.
///
/// The caller stores `diff` into `shock.last_pos` afterwards; trigger
/// processing still needs the previous value.
pub fn shock2_coefficients(
    shock: &Shock,
    diff: f32,
    length: f32,
    long_bound: f32,
    short_bound: f32,
) -> (f32, f32) {
    let prelimit = length * 0.8;
    let long_pre = long_bound * prelimit;
    let short_pre = -short_bound * prelimit;

    let outbound = |diff: f32| {
        let f = progression(diff, long_bound, length);
        (
            shock.spring_out + shock.progress_spring_out * shock.spring_out * f,
            shock.damp_out + shock.progress_damp_out * shock.damp_out * f,
        )
    };
    let inbound = |diff: f32| {
        let f = progression(diff, short_bound, length);
        (
            shock.spring_in + shock.progress_spring_in * shock.spring_in * f,
            shock.damp_in + shock.progress_damp_in * shock.damp_in * f,
        )
    };

    let (mut k, mut d) = if shock.last_pos < diff {
        outbound(diff)
    } else {
        inbound(diff)
    };

    if shock.flags.contains(ShockFlags::SOFTBUMP) {
        if diff > long_pre {
            (k, d) = outbound(diff);
            let f = progression((diff - long_pre) * 5.0, long_bound, length);
            k += (k + 100.0) * shock.progress_spring_out * f;
            d += (d + 100.0) * shock.progress_damp_out * f;
            if shock.last_pos > diff {
                (k, d) = (shock.spring_in, shock.damp_in);
            }
        } else if diff < short_pre {
            (k, d) = inbound(diff);
            let f = progression((diff - short_pre) * 5.0, short_bound, length);
            k += (k + 100.0) * shock.progress_spring_out * f;
            d += (d + 100.0) * shock.progress_damp_out * f;
            if shock.last_pos < diff {
                (k, d) = (shock.spring_out, shock.damp_out);
            }
        }
        if bound_state(diff, length, long_bound, short_bound) != BoundState::Inside {
            k = k.max(shock.stop_spring);
            d = d.max(shock.stop_damp);
        }
    }

    if shock.flags.contains(ShockFlags::NORMAL)
        && !shock.is_trigger()
        && bound_state(diff, length, long_bound, short_bound) != BoundState::Inside
    {
        k = shock.stop_spring;
        d = shock.stop_damp;
    }
    (k, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shock2() -> Shock {
        let mut s = Shock::new(0, ShockFlags::ISSHOCK2);
        s.spring_in = 1000.0;
        s.damp_in = 10.0;
        s.spring_out = 2000.0;
        s.damp_out = 20.0;
        s.progress_spring_in = 1.0;
        s.progress_spring_out = 1.0;
        s.stop_spring = 50_000.0;
        s.stop_damp = 500.0;
        s
    }

    #[test]
    fn test_shock1_inside_bounds_untouched() {
        assert_eq!(shock1_coefficients(10.0, 1.0, 0.05, 1.0, 0.1, 0.1, None), (10.0, 1.0));
        let (k, _) = shock1_coefficients(10.0, 1.0, 0.2, 1.0, 0.1, 0.1, None);
        assert!(k > 10.0);
    }

    #[test]
    fn test_shock2_direction_selects_curve() {
        let mut s = shock2();
        s.last_pos = 0.0;
        let (k_out, _) = shock2_coefficients(&s, 0.01, 1.0, 0.5, 0.5);
        s.last_pos = 0.02;
        let (k_in, _) = shock2_coefficients(&s, 0.01, 1.0, 0.5, 0.5);
        assert!(k_out > 2000.0 && k_out < 2100.0);
        assert!(k_in > 1000.0 && k_in < 1100.0);
    }

    #[test]
    fn test_shock2_progression_saturates() {
        let s = shock2();
        let (k, _) = shock2_coefficients(&s, 0.9, 1.0, 0.5, 0.5);
        assert_eq!(k, 4000.0);
    }

    #[test]
    fn test_normal_flag_hard_stop() {
        let mut s = shock2();
        s.flags = s.flags | ShockFlags::NORMAL;
        let (k, d) = shock2_coefficients(&s, 0.6, 1.0, 0.5, 0.5);
        assert_eq!((k, d), (50_000.0, 500.0));
    }

    #[test]
    fn test_engine_action_ids() {
        assert_eq!(EngineTriggerAction::from_id(4), Some(EngineTriggerAction::ShiftUp));
        assert_eq!(EngineTriggerAction::from_id(9), None);
    }
}

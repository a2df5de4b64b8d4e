//! Damped springs between two nodes.

use crate::constants::{BEAM_BREAK, BEAM_DEFORM, DEFAULT_DAMP, DEFAULT_SPRING};
use crate::ids::NodeRef;

/// How a beam's spring law is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundedKind {
    #[default]
    Normal,
    /// Pulls only; slack when compressed.
    Rope,
    /// Pushes only; breaks when stretched past its limit.
    Support,
    /// Shock blending towards default stiffness past its bounds.
    Shock1,
    /// Progressive shock with in/out curves.
    Shock2,
    /// Shock whose bounds fire command, hook and engine actions.
    Trigger,
}

impl BoundedKind {
    pub fn is_shock(self) -> bool {
        matches!(self, BoundedKind::Shock1 | BoundedKind::Shock2 | BoundedKind::Trigger)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamKind {
    #[default]
    Normal,
    Hydro,
    Virtual,
    Invisible,
}

/// Control inputs a hydro follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct HydroFlags(pub u32);

impl HydroFlags {
    pub const DIR: HydroFlags = HydroFlags(1 << 0);
    /// Steering scaled down with wheel speed.
    pub const SPEED: HydroFlags = HydroFlags(1 << 1);
    pub const AILERON: HydroFlags = HydroFlags(1 << 2);
    pub const RUDDER: HydroFlags = HydroFlags(1 << 3);
    pub const ELEVATOR: HydroFlags = HydroFlags(1 << 4);
    pub const REV_AILERON: HydroFlags = HydroFlags(1 << 5);
    pub const REV_RUDDER: HydroFlags = HydroFlags(1 << 6);
    pub const REV_ELEVATOR: HydroFlags = HydroFlags(1 << 7);
    pub const REV_DIR: HydroFlags = HydroFlags(1 << 8);

    pub const fn empty() -> Self {
        HydroFlags(0)
    }

    pub const fn contains(self, other: HydroFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for HydroFlags {
    type Output = HydroFlags;

    fn bitor(self, rhs: HydroFlags) -> HydroFlags {
        HydroFlags(self.0 | rhs.0)
    }
}

/// Command and coupler parameters carried by every beam.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandParams {
    pub ratio_long: f32,
    pub ratio_short: f32,
    /// Shortest length as a fraction of `ref_length`.
    pub short: f32,
    /// Longest length as a fraction of `ref_length`.
    pub long: f32,
    pub engine_coupling: f32,
    pub needs_engine: bool,
    pub force_restricted: bool,
    /// Returns to `center_length` when released.
    pub centering: bool,
    pub center_length: f32,
    /// 0 = hold, 1 = one press toggles, 2 = one press then centre.
    pub one_press_mode: i32,
    pub auto_moving_mode: i32,
    pub auto_move_lock: bool,
    pub pressed_center_mode: bool,
    /// Ties abort above this stress.
    pub max_tie_stress: f32,
}

impl Default for CommandParams {
    fn default() -> Self {
        Self {
            ratio_long: 0.0,
            ratio_short: 0.0,
            short: 0.0,
            long: 1.0,
            engine_coupling: 1.0,
            needs_engine: false,
            force_restricted: false,
            centering: false,
            center_length: 0.0,
            one_press_mode: 0,
            auto_moving_mode: 0,
            auto_move_lock: false,
            pressed_center_mode: false,
            max_tie_stress: 0.0,
        }
    }
}

/// Values a beam is restored to on reset.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamDefaults {
    pub length: f32,
    pub max_pos_stress: f32,
    pub max_neg_stress: f32,
    pub strength: f32,
    pub plastic_coef: f32,
    pub disabled: bool,
}

/// A damped spring.
#[derive(Debug, Clone)]
pub struct Beam {
    pub p1: usize,
    /// Local end; ignored when `remote` is set.
    pub p2: usize,
    /// Far end on another vehicle for coupler beams.
    pub remote: Option<NodeRef>,
    /// Current rest length.
    pub length: f32,
    pub ref_length: f32,
    pub hydro_length: f32,
    pub stress: f32,
    pub k: f32,
    pub d: f32,
    pub max_pos_stress: f32,
    pub max_neg_stress: f32,
    pub min_max_pos_neg_stress: f32,
    pub strength: f32,
    pub plastic_coef: f32,
    pub bounded: BoundedKind,
    pub kind: BeamKind,
    pub long_bound: f32,
    pub short_bound: f32,
    pub shock: Option<usize>,
    pub hydro_flags: HydroFlags,
    pub hydro_ratio: f32,
    pub animator_bounds: bool,
    pub command: CommandParams,
    /// Positive groups cascade their breakage to `|group|`.
    pub detacher_group: i32,
    pub broken: bool,
    pub disabled: bool,
    /// Opaque handle owned by the renderer.
    pub scene_handle: Option<u64>,
    pub defaults: BeamDefaults,
}

impl Beam {
    pub fn new(p1: usize, p2: usize, length: f32) -> Self {
        let mut beam = Self {
            p1,
            p2,
            remote: None,
            length,
            ref_length: length,
            hydro_length: length,
            stress: 0.0,
            k: DEFAULT_SPRING,
            d: DEFAULT_DAMP,
            max_pos_stress: BEAM_DEFORM,
            max_neg_stress: -BEAM_DEFORM,
            min_max_pos_neg_stress: BEAM_DEFORM,
            strength: BEAM_BREAK,
            plastic_coef: 0.0,
            bounded: BoundedKind::Normal,
            kind: BeamKind::Normal,
            long_bound: 0.0,
            short_bound: 0.0,
            shock: None,
            hydro_flags: HydroFlags::empty(),
            hydro_ratio: 0.0,
            animator_bounds: false,
            command: CommandParams::default(),
            detacher_group: 0,
            broken: false,
            disabled: false,
            scene_handle: None,
            defaults: BeamDefaults {
                length,
                max_pos_stress: BEAM_DEFORM,
                max_neg_stress: -BEAM_DEFORM,
                strength: BEAM_BREAK,
                plastic_coef: 0.0,
                disabled: false,
            },
        };
        beam.refresh_stress_limit();
        beam
    }

    /// Set deformation thresholds and strength, recording them as reset
    /// defaults.
    pub fn set_limits(&mut self, deform: f32, strength: f32, plastic_coef: f32) {
        self.max_pos_stress = deform;
        self.max_neg_stress = -deform;
        self.strength = strength;
        self.plastic_coef = plastic_coef;
        self.refresh_stress_limit();
        self.capture_defaults();
    }

    pub fn capture_defaults(&mut self) {
        self.defaults = BeamDefaults {
            length: self.ref_length,
            max_pos_stress: self.max_pos_stress,
            max_neg_stress: self.max_neg_stress,
            strength: self.strength,
            plastic_coef: self.plastic_coef,
            disabled: self.disabled,
        };
    }

    /// Recompute the fast deformation test threshold.
    pub fn refresh_stress_limit(&mut self) {
        self.min_max_pos_neg_stress = self
            .max_pos_stress
            .min(-self.max_neg_stress)
            .min(self.strength);
    }

    /// Mark broken; a broken beam is always disabled.
    pub fn break_beam(&mut self) {
        self.broken = true;
        self.disabled = true;
        self.stress = 0.0;
    }

    /// Live for connection counting: enabled and not bounded.
    pub fn is_live_link(&self) -> bool {
        !self.disabled && self.bounded == BoundedKind::Normal
    }

    pub fn is_inter_vehicle(&self) -> bool {
        self.remote.is_some()
    }

    /// Rest length relative to the reference length, for renderers.
    pub fn scale(&self) -> f32 {
        if self.ref_length > 0.0 {
            self.length / self.ref_length
        } else {
            1.0
        }
    }

    /// Restore the spawn-time shape and strength.
    pub fn reset_to_defaults(&mut self) {
        self.length = self.defaults.length;
        self.ref_length = self.defaults.length;
        self.max_pos_stress = self.defaults.max_pos_stress;
        self.max_neg_stress = self.defaults.max_neg_stress;
        self.strength = self.defaults.strength;
        self.plastic_coef = self.defaults.plastic_coef;
        self.refresh_stress_limit();
        self.broken = false;
        self.disabled = self.defaults.disabled;
        self.stress = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_break_disables() {
        let mut beam = Beam::new(0, 1, 1.0);
        beam.stress = 123.0;
        beam.break_beam();
        assert!(beam.broken && beam.disabled);
        assert_eq!(beam.stress, 0.0);
    }

    #[test]
    fn test_stress_limit_clamped_to_strength() {
        let mut beam = Beam::new(0, 1, 1.0);
        beam.set_limits(BEAM_DEFORM, 1000.0, 0.0);
        assert_eq!(beam.min_max_pos_neg_stress, 1000.0);
    }

    #[test]
    fn test_reset_restores_shape() {
        let mut beam = Beam::new(0, 1, 2.0);
        beam.length = 1.2;
        beam.strength = 5.0;
        beam.break_beam();
        beam.reset_to_defaults();
        assert_eq!(beam.length, 2.0);
        assert_eq!(beam.strength, BEAM_BREAK);
        assert!(!beam.broken && !beam.disabled);
    }

    #[test]
    fn test_hydro_flags() {
        let flags = HydroFlags::DIR | HydroFlags::REV_RUDDER;
        assert!(flags.contains(HydroFlags::DIR));
        assert!(!flags.contains(HydroFlags::AILERON));
        assert!(HydroFlags::empty().is_empty());
    }
}

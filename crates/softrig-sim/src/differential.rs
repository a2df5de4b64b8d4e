//! Two-output differentials shared by axles and the inter-axle driveshaft.

use serde::{Deserialize, Serialize};

/// Torsion stiffness of viscous and locked couplings, N·m per m/s.
const SLIP_STIFFNESS: f32 = 10_000.0;
/// Stiffness of a locked coupling against accumulated twist.
const TWIST_STIFFNESS: f32 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Torque follows the faster side, clamped to 10..90 %.
    Open,
    /// Both sides twist against each other through a stiff spring.
    Locked,
    /// Even split regardless of speed.
    Split,
    /// Speed difference is resisted proportionally.
    Viscous,
}

impl DiffKind {
    pub fn name(self) -> &'static str {
        match self {
            DiffKind::Open => "Open",
            DiffKind::Locked => "Locked",
            DiffKind::Split => "Split",
            DiffKind::Viscous => "Viscous",
        }
    }
}

/// Input and output of one differential evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiffData {
    /// Surface speed of each output.
    pub speed: [f32; 2],
    /// Accumulated twist between the outputs; only locked couplings use it.
    pub delta_rotation: f32,
    pub in_torque: f32,
    pub out_torque: [f32; 2],
    pub dt: f32,
}

impl DiffKind {
    pub fn calc_torque(self, data: &mut DiffData) {
        let half = data.in_torque * 0.5;
        let delta = data.speed[0] - data.speed[1];
        match self {
            DiffKind::Split => {
                data.out_torque = [half, half];
            }
            DiffKind::Open => {
                let sum = data.speed[0].abs() + data.speed[1].abs();
                let ratio = if data.speed[0].abs().min(data.speed[1].abs()) > 1.0 && sum > 0.0 {
                    data.speed[0].abs() / sum
                } else {
                    0.5
                };
                data.out_torque = [
                    data.in_torque * ratio.clamp(0.1, 0.9),
                    data.in_torque * (1.0 - ratio).clamp(0.1, 0.9),
                ];
            }
            DiffKind::Viscous => {
                data.out_torque = [half - delta * SLIP_STIFFNESS, half + delta * SLIP_STIFFNESS];
            }
            DiffKind::Locked => {
                data.delta_rotation += delta * data.dt;
                let twist = data.delta_rotation * TWIST_STIFFNESS + delta * SLIP_STIFFNESS;
                data.out_torque = [half - twist, half + twist];
            }
        }
    }
}

/// A driven wheel pair and its selectable differentials.
#[derive(Debug, Clone, PartialEq)]
pub struct Axle {
    pub wheels: [usize; 2],
    kinds: Vec<DiffKind>,
    /// Twist carried between sub-steps by locked couplings.
    pub delta_rotation: f32,
}

impl Axle {
    pub fn new(wheels: [usize; 2], kinds: Vec<DiffKind>) -> Self {
        Self {
            wheels,
            kinds,
            delta_rotation: 0.0,
        }
    }

    /// Active differential; an axle without any behaves as open.
    pub fn kind(&self) -> DiffKind {
        self.kinds.first().copied().unwrap_or(DiffKind::Open)
    }

    pub fn kinds(&self) -> &[DiffKind] {
        &self.kinds
    }

    /// Cycle to the next available differential.
    pub fn toggle(&mut self) {
        if self.kinds.len() > 1 {
            self.kinds.rotate_left(1);
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn calc_torque(&mut self, data: &mut DiffData) {
        data.delta_rotation = self.delta_rotation;
        self.kind().calc_torque(data);
        self.delta_rotation = data.delta_rotation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(speed: [f32; 2]) -> DiffData {
        DiffData {
            speed,
            in_torque: 100.0,
            dt: 0.0005,
            ..DiffData::default()
        }
    }

    #[test]
    fn test_split_is_even() {
        let mut d = data([5.0, 1.0]);
        DiffKind::Split.calc_torque(&mut d);
        assert_eq!(d.out_torque, [50.0, 50.0]);
    }

    #[test]
    fn test_open_ratio_is_clamped() {
        let mut d = data([100.0, 1.5]);
        DiffKind::Open.calc_torque(&mut d);
        assert!((d.out_torque[0] - 90.0).abs() < 1e-3);
        assert!((d.out_torque[1] - 10.0).abs() < 1e-3);

        let mut slow = data([0.5, 3.0]);
        DiffKind::Open.calc_torque(&mut slow);
        assert_eq!(slow.out_torque, [50.0, 50.0]);
    }

    #[test]
    fn test_viscous_resists_slip() {
        let mut d = data([2.0, 1.0]);
        DiffKind::Viscous.calc_torque(&mut d);
        assert!(d.out_torque[0] < d.out_torque[1]);
        assert_eq!(d.out_torque[0] + d.out_torque[1], 100.0);
    }

    #[test]
    fn test_locked_accumulates_twist() {
        let mut axle = Axle::new([0, 1], vec![DiffKind::Locked]);
        let mut d = data([1.0, 0.0]);
        axle.calc_torque(&mut d);
        axle.calc_torque(&mut d);
        assert!((axle.delta_rotation - 0.001).abs() < 1e-6);
        assert!(d.out_torque[0] < 50.0 - 10_000.0);
    }

    #[test]
    fn test_toggle_cycles_kinds() {
        let mut axle = Axle::new([0, 1], vec![DiffKind::Open, DiffKind::Locked]);
        assert_eq!(axle.name(), "Open");
        axle.toggle();
        assert_eq!(axle.name(), "Locked");
        axle.toggle();
        assert_eq!(axle.kind(), DiffKind::Open);

        let mut empty = Axle::new([0, 1], Vec::new());
        empty.toggle();
        assert_eq!(empty.kind(), DiffKind::Open);
    }
}

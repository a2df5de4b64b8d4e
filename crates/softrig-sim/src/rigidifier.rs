//! Angular springs holding the angle between two beams sharing a node.

use glam::Vec3;

use crate::beam::Beam;
use crate::node::Node;

/// Three-node angular spring `(a, b, c)` acting on the angle at `b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rigidifier {
    pub nodes: [usize; 3],
    /// Beams `a-b` and `b-c`, when the description has them.
    pub arms: [Option<usize>; 2],
    pub k: f32,
    pub d: f32,
    pub rest_angle: f32,
    pub last_angle: f32,
}

/// Angle at `b` and the unit arms towards `a` and `c` with their lengths.
fn arms(a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, Vec3, f32, Vec3, f32)> {
    let to_a = a - b;
    let to_c = c - b;
    let la = to_a.length();
    let lc = to_c.length();
    if la <= f32::EPSILON || lc <= f32::EPSILON {
        return None;
    }
    let ua = to_a / la;
    let uc = to_c / lc;
    let angle = ua.dot(uc).clamp(-1.0, 1.0).acos();
    Some((angle, ua, la, uc, lc))
}

impl Rigidifier {
    pub fn new(nodes: [usize; 3], arms_beams: [Option<usize>; 2], k: f32, d: f32, positions: [Vec3; 3]) -> Self {
        let rest_angle = arms(positions[0], positions[1], positions[2])
            .map(|(angle, ..)| angle)
            .unwrap_or(0.0);
        Self {
            nodes,
            arms: arms_beams,
            k,
            d,
            rest_angle,
            last_angle: rest_angle,
        }
    }

    /// Inert once one of its arms has broken.
    pub fn is_inert(&self, beams: &[Beam]) -> bool {
        self.arms
            .iter()
            .flatten()
            .any(|&b| beams.get(b).is_none_or(|beam| beam.broken))
    }

    /// Accumulate the restoring forces into `nodes`.
    pub fn apply(&mut self, nodes: &mut [Node], dt: f32) {
        let [a, b, c] = self.nodes;
        let Some((angle, ua, la, uc, lc)) = arms(nodes[a].rel_pos, nodes[b].rel_pos, nodes[c].rel_pos)
        else {
            return;
        };
        let rate = if dt > 0.0 { (angle - self.last_angle) / dt } else { 0.0 };
        self.last_angle = angle;
        let torque = self.k * (self.rest_angle - angle) - self.d * rate;

        // Opening the angle moves each end away from the other arm.
        let cos = ua.dot(uc);
        let ta = -(uc - ua * cos);
        let tc = -(ua - uc * cos);
        let (Some(ta), Some(tc)) = (ta.try_normalize(), tc.try_normalize()) else {
            return;
        };
        let fa = ta * (torque / la);
        let fc = tc * (torque / lc);
        nodes[a].forces += fa;
        nodes[c].forces += fc;
        nodes[b].forces -= fa + fc;
    }
}

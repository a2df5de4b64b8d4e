//! Active shock stabiliser: left and right active shocks work against body roll.

use crate::constants::STAB_RATE;
use crate::shocks::ShockFlags;
use crate::vehicle::Vehicle;

const RATIO_LIMIT: f32 = 0.1;
/// Roll below this is ignored, radians.
const ROLL_DEADBAND: f32 = 0.01;
/// Roll above this cancels the pause after a correction, radians.
const ROLL_EMERGENCY: f32 = 0.2;
/// Pause after the stabiliser settles, seconds.
const SETTLE_PAUSE: f32 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Stabilizer {
    /// Node pair whose direction measures roll.
    pub reference: usize,
    pub roll_node: usize,
    pub ratio: f32,
    /// +1 to lengthen the right side, -1 the left, 0 idle.
    pub request: i8,
    pub sleep: f32,
}

impl Stabilizer {
    pub fn new(reference: usize, roll_node: usize) -> Self {
        Self {
            reference,
            roll_node,
            ratio: 0.0,
            request: 0,
            sleep: 0.0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.ratio = 0.0;
        self.request = 0;
        self.sleep = 0.0;
    }

    /// Pick the correction direction from the measured roll.
    fn decide(&mut self, roll: f32, elapsed: f32) {
        self.sleep -= elapsed;
        if roll.abs() > ROLL_EMERGENCY {
            self.sleep = -1.0;
        }
        if roll.abs() > ROLL_DEADBAND && self.sleep < 0.0 {
            if roll > 0.0 && self.request != -1 {
                self.request = 1;
            } else if roll < 0.0 && self.request != 1 {
                self.request = -1;
            } else {
                self.request = 0;
                self.sleep = SETTLE_PAUSE;
            }
        } else {
            self.request = 0;
        }
    }
}

impl Vehicle {
    /// Body roll from the stabiliser's reference nodes, radians.
    fn stabilizer_roll(&self) -> Option<f32> {
        let stab = self.stabilizer.as_ref()?;
        let dir = (self.nodes[stab.reference].rel_pos - self.nodes[stab.roll_node].rel_pos).try_normalize()?;
        Some(dir.y.clamp(-1.0, 1.0).asin())
    }

    /// Per sub-step: move the active shocks towards the requested ratio.
    /// `decide` is set on the first sub-step of a frame, when the roll is
    /// re-evaluated over `frame_time`.
    pub(crate) fn calc_stabilizer(&mut self, dt: f32, decide: bool, frame_time: f32) {
        let roll = self.stabilizer_roll();
        let Some(stab) = &mut self.stabilizer else {
            return;
        };
        if stab.request != 0 {
            let request = f32::from(stab.request);
            if (stab.request == 1 && stab.ratio < RATIO_LIMIT) || (stab.request == -1 && stab.ratio > -RATIO_LIMIT) {
                stab.ratio += request * dt * STAB_RATE;
            }
            for shock in &self.shocks {
                let beam = &mut self.beams[shock.beam];
                if shock.flags.contains(ShockFlags::RACTIVE) {
                    beam.length = beam.ref_length * (1.0 + stab.ratio);
                } else if shock.flags.contains(ShockFlags::LACTIVE) {
                    beam.length = beam.ref_length * (1.0 - stab.ratio);
                }
            }
        }
        if decide && let Some(roll) = roll {
            stab.decide(roll, frame_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_requests_correction() {
        let mut s = Stabilizer::new(0, 1);
        s.decide(0.05, 0.016);
        assert_eq!(s.request, 1);
        s.decide(-0.05, 0.016);
        assert_eq!(s.request, 0);
        assert_eq!(s.sleep, SETTLE_PAUSE);
    }

    #[test]
    fn test_small_roll_is_ignored() {
        let mut s = Stabilizer::new(0, 1);
        s.decide(0.005, 0.016);
        assert_eq!(s.request, 0);
    }

    #[test]
    fn test_emergency_roll_skips_pause() {
        let mut s = Stabilizer::new(0, 1);
        s.sleep = SETTLE_PAUSE;
        s.decide(-0.3, 0.016);
        assert_eq!(s.request, -1);
    }
}

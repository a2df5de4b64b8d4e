//! In-memory replay ring buffer.
//!
//! Snapshots are taken at a fixed simulated-time stride and stored in a
//! pre-allocated ring; the oldest slot is overwritten once the ring is
//! full. Playback restores a snapshot bit-exactly: the stored relative
//! positions and origin are written back, so `abs == origin + rel` yields
//! the same bits as when the snapshot was taken.

use glam::Vec3;

use crate::beam::Beam;
use crate::context::PhysicsSettings;
use crate::node::Node;
use crate::vehicle::Vehicle;

/// Per-beam state kept for playback and renderers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamStatus {
    /// Rest length over reference length.
    pub scale: f32,
    pub length: f32,
    pub broken: bool,
    pub disabled: bool,
}

impl BeamStatus {
    fn capture(beam: &Beam) -> Self {
        Self {
            scale: beam.scale(),
            length: beam.length,
            broken: beam.broken,
            disabled: beam.disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    pub tick: u64,
    pub time: f64,
    pub origin: Vec3,
    pub rel_positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub beams: Vec<BeamStatus>,
}

impl ReplayFrame {
    fn with_capacity(nodes: usize, beams: usize) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            origin: Vec3::ZERO,
            rel_positions: Vec::with_capacity(nodes),
            velocities: Vec::with_capacity(nodes),
            beams: Vec::with_capacity(beams),
        }
    }

    /// Absolute node positions of this frame.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.rel_positions.iter().map(|rel| self.origin + *rel)
    }
}

#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    slots: Vec<ReplayFrame>,
    /// Next slot to write.
    head: usize,
    len: usize,
}

impl ReplayBuffer {
    /// A ring of `frames` slots sized for a vehicle of `nodes` nodes and
    /// `beams` beams.
    pub fn new(frames: usize, nodes: usize, beams: usize) -> Self {
        let frames = frames.max(1);
        Self {
            slots: (0..frames).map(|_| ReplayFrame::with_capacity(nodes, beams)).collect(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub(crate) fn record(&mut self, tick: u64, time: f64, origin: Vec3, nodes: &[Node], beams: &[Beam]) {
        let slot = &mut self.slots[self.head];
        slot.tick = tick;
        slot.time = time;
        slot.origin = origin;
        slot.rel_positions.clear();
        slot.rel_positions.extend(nodes.iter().map(|n| n.rel_pos));
        slot.velocities.clear();
        slot.velocities.extend(nodes.iter().map(|n| n.velocity));
        slot.beams.clear();
        slot.beams.extend(beams.iter().map(BeamStatus::capture));
        self.head = (self.head + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// Frame at `offset` from the newest one: 0 is the newest, -1 the one
    /// before it. Positive offsets and offsets past the oldest frame
    /// yield `None`.
    pub fn frame(&self, offset: isize) -> Option<&ReplayFrame> {
        if offset > 0 {
            return None;
        }
        let back = offset.unsigned_abs();
        if back >= self.len {
            return None;
        }
        let cap = self.slots.len();
        let index = (self.head + cap - 1 - back) % cap;
        self.slots.get(index)
    }

    pub fn newest(&self) -> Option<&ReplayFrame> {
        self.frame(0)
    }

    /// Frames from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ReplayFrame> {
        let oldest = -(self.len as isize) + 1;
        (oldest..=0).filter_map(move |offset| self.frame(offset))
    }
}

impl Vehicle {
    /// Record a snapshot when the replay stride has elapsed. Called at the
    /// end of each sub-step.
    pub(crate) fn sample_replay(&mut self, dt: f32, settings: &PhysicsSettings) {
        if self.replay_offset.is_some() {
            return;
        }
        let Some(replay) = &mut self.replay else {
            return;
        };
        if settings.replay_steps > 0 {
            let stride = 1.0 / settings.replay_steps as f32;
            self.replay_clock.accumulator += dt;
            if self.replay_clock.accumulator < stride {
                return;
            }
            self.replay_clock.accumulator -= stride;
        }
        replay.record(self.substep, self.sim_time, self.origin, &self.nodes, &self.beams);
    }

    /// Show the snapshot `offset` frames back (0 = newest). Force kernels
    /// stay suspended until [`Vehicle::stop_replay`]. Returns false when
    /// there is no such frame.
    pub fn seek_replay(&mut self, offset: isize) -> bool {
        let Some(frame) = self.replay.as_ref().and_then(|r| r.frame(offset)) else {
            return false;
        };
        if frame.rel_positions.len() != self.nodes.len() || frame.beams.len() != self.beams.len() {
            tracing::warn!(vehicle = %self.id, "replay frame does not match the vehicle layout");
            return false;
        }
        let origin = frame.origin;
        for ((node, rel), velocity) in self.nodes.iter_mut().zip(&frame.rel_positions).zip(&frame.velocities) {
            node.set_position(origin, *rel);
            node.velocity = *velocity;
        }
        for (beam, status) in self.beams.iter_mut().zip(&frame.beams) {
            beam.length = status.length;
            beam.broken = status.broken;
            beam.disabled = status.disabled;
        }
        self.origin = origin;
        self.replay_offset = Some(offset);
        self.update_bounds();
        true
    }

    /// Leave playback, resuming from the newest recorded state.
    pub fn stop_replay(&mut self) {
        if self.replay_offset.take().is_some() {
            self.seek_replay(0);
            self.replay_offset = None;
            for node in &mut self.nodes {
                node.forces = Vec3::ZERO;
            }
            self.increased_accuracy = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes_at(x: f32) -> Vec<Node> {
        vec![Node::new(Vec3::new(x, 0.0, 0.0), 1.0), Node::new(Vec3::new(x, 1.0, 0.0), 1.0)]
    }

    #[test]
    fn test_offsets_walk_backwards() {
        let mut buffer = ReplayBuffer::new(4, 2, 0);
        for tick in 0..3 {
            buffer.record(tick, tick as f64, Vec3::ZERO, &nodes_at(tick as f32), &[]);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.frame(0).map(|f| f.tick), Some(2));
        assert_eq!(buffer.frame(-2).map(|f| f.tick), Some(0));
        assert!(buffer.frame(-3).is_none());
        assert!(buffer.frame(1).is_none());
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let mut buffer = ReplayBuffer::new(3, 2, 0);
        for tick in 0..7 {
            buffer.record(tick, 0.0, Vec3::ZERO, &nodes_at(0.0), &[]);
        }
        assert_eq!(buffer.len(), 3);
        let ticks: Vec<u64> = buffer.iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![4, 5, 6]);
    }

    #[test]
    fn test_beam_status_captured() {
        let mut beam = Beam::new(0, 1, 2.0);
        beam.length = 1.0;
        beam.break_beam();
        let mut buffer = ReplayBuffer::new(2, 2, 1);
        buffer.record(0, 0.0, Vec3::ZERO, &nodes_at(0.0), &[beam]);
        let status = buffer.newest().map(|f| f.beams[0]).expect("frame");
        assert_eq!(status.scale, 0.5);
        assert!(status.broken && status.disabled);
    }

    #[test]
    fn test_frame_positions_are_absolute() {
        let mut buffer = ReplayBuffer::new(1, 2, 0);
        let origin = Vec3::new(100.0, 0.0, 0.0);
        buffer.record(0, 0.0, origin, &nodes_at(1.0), &[]);
        let positions: Vec<Vec3> = buffer.newest().expect("frame").positions().collect();
        assert_eq!(positions[0], Vec3::new(101.0, 0.0, 0.0));
    }
}

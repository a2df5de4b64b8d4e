//! Interpolation of remote vehicles between the two newest stream frames.

use glam::Vec3;

use crate::oob::VehicleStateHeader;
use crate::stream::StreamFrame;

/// Positions and wheel angles of a remote vehicle at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedState {
    pub header: VehicleStateHeader,
    pub positions: Vec<Vec3>,
    pub wheel_rotations: Vec<f32>,
    /// Blend factor between the older (0) and newer (1) frame.
    pub ratio: f32,
}

/// Keeps the last two frames of a remote vehicle and blends between them.
///
/// Remote timestamps are mapped onto the local clock with an offset that is
/// pulled back whenever the local estimate leaves the `[older, newer]`
/// window, so playback never extrapolates.
#[derive(Debug, Default)]
pub struct NetworkInterpolator {
    older: Option<StreamFrame>,
    newer: Option<StreamFrame>,
    time_offset: i32,
    received: u64,
}

impl NetworkInterpolator {
    /// `initial_offset_ms` seeds the remote-minus-local clock offset.
    pub fn new(initial_offset_ms: i32) -> Self {
        Self {
            time_offset: initial_offset_ms,
            ..Default::default()
        }
    }

    /// Accept a new frame. Frames older than the newest one are dropped.
    pub fn push(&mut self, frame: StreamFrame) {
        if let Some(newer) = &self.newer
            && frame.header.time < newer.header.time
        {
            tracing::trace!(
                time = frame.header.time,
                newest = newer.header.time,
                "dropping out-of-order stream frame"
            );
            return;
        }
        self.received += 1;
        self.older = self.newer.take().or_else(|| Some(frame.clone()));
        self.newer = Some(frame);
    }

    pub fn frames_received(&self) -> u64 {
        self.received
    }

    pub fn time_offset(&self) -> i32 {
        self.time_offset
    }

    /// Blend the stored frames at local time `local_ms`.
    pub fn sample(&mut self, local_ms: i32) -> Option<InterpolatedState> {
        let older = self.older.as_ref()?;
        let newer = self.newer.as_ref()?;

        let mut remote_now = local_ms + self.time_offset;
        if older.header.time > remote_now {
            self.time_offset = older.header.time - local_ms;
            remote_now = local_ms + self.time_offset;
        }
        if newer.header.time < remote_now {
            self.time_offset = newer.header.time - local_ms;
            remote_now = local_ms + self.time_offset;
        }

        let span = newer.header.time - older.header.time;
        let ratio = if span > 0 {
            (remote_now - older.header.time) as f32 / span as f32
        } else {
            1.0
        };

        let positions = older
            .positions
            .iter()
            .zip(&newer.positions)
            .map(|(a, b)| a.lerp(*b, ratio))
            .collect();
        let wheel_rotations = older
            .wheel_rotations
            .iter()
            .zip(&newer.wheel_rotations)
            .map(|(a, b)| a + (b - a) * ratio)
            .collect();

        Some(InterpolatedState {
            header: newer.header,
            positions,
            wheel_rotations,
            ratio,
        })
    }
}

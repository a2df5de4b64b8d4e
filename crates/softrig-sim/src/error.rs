//! Error types surfaced by vehicle construction and the simulation API.
//!
//! Kernels never return errors; anomalies inside a sub-step become vehicle
//! state transitions instead.

use crate::ids::VehicleId;

/// Errors returned to callers of [`crate::Simulation`].
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The vehicle description references something that does not exist or
    /// carries impossible dimensions. The vehicle is rejected.
    #[error("invalid vehicle description: {0}")]
    Construction(String),

    /// A hard capacity limit was hit; nothing was added.
    #[error("too many {what} (limit {limit})")]
    ResourceExhausted { what: &'static str, limit: usize },

    /// The simulation context cannot be rebound while vehicles are active.
    #[error("simulation context is locked while {active} vehicle(s) are active")]
    ContextLocked { active: usize },

    #[error("no vehicle with id {0}")]
    UnknownVehicle(VehicleId),

    /// The physics thread is gone; commands can no longer be delivered.
    #[error("physics thread has stopped")]
    ThreadStopped,

    #[error("failed to parse vehicle description: {0}")]
    Description(#[from] ron::error::SpannedError),
}

impl SimError {
    pub(crate) fn construction(msg: impl Into<String>) -> Self {
        SimError::Construction(msg.into())
    }
}

//! Soft-body vehicle simulation core.
//!
//! Vehicles are meshes of point masses ("nodes") joined by damped springs
//! ("beams"), integrated at a fixed sub-step while visual frames run at a
//! variable rate. A [`Simulation`] owns every vehicle and steps them in
//! lock-step over a worker pool; [`PhysicsThread`] runs it on a dedicated
//! thread. Terrain, input, rendering, audio and transport are reached only
//! through the traits in [`adapters`].

pub mod adapters;
pub mod audio;
pub mod beam;
mod beam_kernel;
pub mod brakes;
pub mod builder;
pub mod collision;
pub mod commands;
pub mod constants;
pub mod context;
pub mod controls;
pub mod couplers;
pub mod cruise;
pub mod def;
pub mod differential;
pub mod engine;
pub mod error;
pub mod events;
mod fleet;
pub mod ground;
pub mod hydros;
pub mod ids;
pub mod inertia;
mod integrator;
pub mod network;
pub mod node;
pub mod physics_thread;
pub mod pool;
pub mod replay;
pub mod rigidifier;
pub mod shocks;
pub mod simulation;
pub mod snapshot;
pub mod stabilizer;
pub mod topology;
mod triggers;
pub mod vehicle;
pub mod wheels;

pub use adapters::{
    AudioAdapter, BeamVisual, BounceFilter, FlatTerrain, InputEvent, InputProvider, NetworkAdapter,
    RendererAdapter, ScriptedInput, TerrainProvider,
};
pub use beam::{Beam, BeamKind, BoundedKind};
pub use builder::build_vehicle;
pub use context::{PhysicsSettings, SimContext};
pub use couplers::{CouplerRequest, HookMode, HookState};
pub use def::VehicleDef;
pub use error::SimError;
pub use events::SimEvent;
pub use ground::{GroundModel, GroundModelRegistry};
pub use ids::{NodeRef, VehicleId};
pub use node::Node;
pub use physics_thread::PhysicsThread;
pub use pool::WorkerPool;
pub use replay::{ReplayBuffer, ReplayFrame};
pub use simulation::Simulation;
pub use audio::AudioRelay;
pub use snapshot::{AudioCues, FrameSnapshot, SnapshotReader, VehicleSnapshot};
pub use vehicle::{Vehicle, VehicleState};

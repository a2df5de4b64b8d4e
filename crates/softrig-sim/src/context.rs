//! World-wide inputs of the simulation: terrain, gravity, ground models,
//! inertia curves and tunables.
//!
//! A [`SimContext`] is built once at start-up and shared read-only by every
//! vehicle. [`crate::Simulation::rebind_context`] swaps it, but only while no
//! vehicle is activated.

use std::sync::Arc;

use glam::Vec3;
use softrig_config::Config;
use softrig_net::CompressionConfig;

use crate::adapters::{FlatTerrain, TerrainProvider};
use crate::constants::{DEFAULT_GRAVITY, MAX_SUBSTEPS, PHYSICS_DT};
use crate::ground::{GroundModelId, GroundModelRegistry};
use crate::inertia::InertiaModels;

/// Tunables read by the kernels every sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicsSettings {
    pub dt: f32,
    pub max_substeps: u32,
    pub turbulence_interval: u32,
    pub disable_drag: bool,
    pub inter_collisions: bool,
    pub intra_collisions: bool,
    pub sleep_speed: f32,
    pub sleep_ticks: u32,
    pub worker_threads: usize,
    pub replay_enabled: bool,
    pub replay_frames: usize,
    pub replay_steps: u32,
    pub interpolation_offset_ms: i32,
    pub compression: CompressionConfig,
    pub bounce_dead_time: f32,
    pub beam_break_debug: bool,
    pub beam_deform_debug: bool,
    pub trigger_debug: bool,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PhysicsSettings {
    pub fn from_config(config: &Config) -> Self {
        let physics = &config.physics;
        let dt = if physics.substep_dt > 0.0 { physics.substep_dt } else { PHYSICS_DT };
        Self {
            dt,
            max_substeps: physics.max_substeps.clamp(1, MAX_SUBSTEPS),
            turbulence_interval: physics.turbulence_interval.max(1),
            disable_drag: physics.disable_drag,
            inter_collisions: physics.inter_collisions,
            intra_collisions: physics.intra_collisions,
            sleep_speed: physics.sleep_speed,
            sleep_ticks: physics.sleep_ticks,
            worker_threads: physics.worker_threads,
            replay_enabled: config.replay.enabled,
            replay_frames: config.replay.frames,
            replay_steps: config.replay.steps_per_second,
            interpolation_offset_ms: config.network.interpolation_offset_ms as i32,
            compression: CompressionConfig {
                threshold: config.network.compression_threshold,
                enabled: config.network.compression_enabled,
            },
            bounce_dead_time: config.input.bounce_dead_time,
            beam_break_debug: config.debug.beam_break_debug,
            beam_deform_debug: config.debug.beam_deform_debug,
            trigger_debug: config.debug.trigger_debug,
        }
    }
}

pub struct SimContext {
    pub terrain: Arc<dyn TerrainProvider>,
    pub gravity: Vec3,
    pub ground_models: GroundModelRegistry,
    pub inertia_models: InertiaModels,
    pub settings: PhysicsSettings,
}

impl std::fmt::Debug for SimContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimContext")
            .field("gravity", &self.gravity)
            .field("ground_models", &self.ground_models.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new(Arc::new(FlatTerrain::new(0.0)))
    }
}

impl SimContext {
    pub fn new(terrain: Arc<dyn TerrainProvider>) -> Self {
        Self {
            terrain,
            gravity: Vec3::new(0.0, DEFAULT_GRAVITY, 0.0),
            ground_models: GroundModelRegistry::with_builtins(),
            inertia_models: InertiaModels::with_builtins(),
            settings: PhysicsSettings::default(),
        }
    }

    /// Build a context from the loaded configuration. A missing or broken
    /// ground model file falls back to the built-in models with a warning.
    pub fn from_config(config: &Config, terrain: Arc<dyn TerrainProvider>) -> Self {
        let mut ground_models = GroundModelRegistry::with_builtins();
        if let Some(path) = &config.world.ground_models {
            if let Err(e) = ground_models.load_file(std::path::Path::new(path)) {
                tracing::warn!(error = %e, path = %path, "ground model file ignored");
            }
        }
        ground_models.set_default(&config.world.default_ground_model);
        Self {
            terrain,
            gravity: Vec3::new(0.0, config.physics.gravity, 0.0),
            ground_models,
            inertia_models: InertiaModels::with_builtins(),
            settings: PhysicsSettings::from_config(config),
        }
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = Vec3::new(0.0, gravity, 0.0);
        self
    }

    pub fn with_settings(mut self, settings: PhysicsSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Ground model under `(x, z)`, falling back to the default model.
    pub fn ground_model_at(&self, x: f32, z: f32) -> GroundModelId {
        self.terrain
            .ground_model_at(x, z)
            .and_then(|name| self.ground_models.id_of(name))
            .unwrap_or_else(|| self.ground_models.default_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.physics.max_substeps = 1000;
        config.physics.substep_dt = 0.0;
        let settings = PhysicsSettings::from_config(&config);
        assert_eq!(settings.max_substeps, MAX_SUBSTEPS);
        assert_eq!(settings.dt, PHYSICS_DT);
        assert_eq!(settings.compression.threshold, 256);
    }

    #[test]
    fn test_compression_toggle_changes_settings() {
        let mut config = Config::default();
        assert_eq!(PhysicsSettings::from_config(&config), PhysicsSettings::default());
        config.network.compression_enabled = false;
        let settings = PhysicsSettings::from_config(&config);
        assert_ne!(settings, PhysicsSettings::default());
        assert_eq!(
            settings.compression,
            CompressionConfig {
                threshold: 256,
                enabled: false,
            }
        );
    }

    #[test]
    fn test_ground_model_lookup_falls_back() {
        let terrain = FlatTerrain::new(0.0).with_ground_model("mud");
        let ctx = SimContext::new(Arc::new(terrain));
        let id = ctx.ground_model_at(0.0, 0.0);
        assert_eq!(ctx.ground_models.get(id).name, "mud");

        let ctx = SimContext::new(Arc::new(FlatTerrain::new(0.0).with_ground_model("lava")));
        assert_eq!(ctx.ground_model_at(0.0, 0.0), ctx.ground_models.default_id());
    }

    #[test]
    fn test_config_gravity() {
        let mut config = Config::default();
        config.physics.gravity = -1.62;
        let ctx = SimContext::from_config(&config, Arc::new(FlatTerrain::new(0.0)));
        assert_eq!(ctx.gravity.y, -1.62);
    }
}

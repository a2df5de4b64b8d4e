//! Configuration structs with simulation defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Integrator and scheduler settings.
    pub physics: PhysicsConfig,
    /// Replay buffer settings.
    pub replay: ReplayConfig,
    /// Vehicle stream settings.
    pub network: NetworkConfig,
    /// Input sampling settings.
    pub input: InputConfig,
    /// Terrain, water and ground model settings.
    pub world: WorldConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Integrator and scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Fixed physics sub-step in seconds.
    pub substep_dt: f32,
    /// Upper bound on sub-steps per visual frame.
    pub max_substeps: u32,
    /// Vertical gravitational acceleration in m/s² (negative is down).
    pub gravity: f32,
    /// Worker pool size (0 = derived from the CPU count).
    pub worker_threads: usize,
    /// Sub-steps between turbulence jitter samples.
    pub turbulence_interval: u32,
    /// Mean node speed below which a vehicle counts as resting, in m/s.
    pub sleep_speed: f32,
    /// Consecutive resting visual frames before a vehicle may sleep.
    pub sleep_ticks: u32,
    /// Disable aerodynamic drag on all nodes.
    pub disable_drag: bool,
    /// Enable vehicle-vs-vehicle collision.
    pub inter_collisions: bool,
    /// Enable self collision of collision cabs.
    pub intra_collisions: bool,
}

/// Replay buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplayConfig {
    /// Record replay frames for local vehicles.
    pub enabled: bool,
    /// Ring buffer length in frames.
    pub frames: usize,
    /// Recorded frames per simulated second (0 = every sub-step).
    pub steps_per_second: u32,
}

/// Vehicle stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Delay applied when interpolating remote vehicles, in milliseconds.
    pub interpolation_offset_ms: u32,
    /// Payload size in bytes above which frames are LZ4 compressed.
    pub compression_threshold: usize,
    /// Enable payload compression.
    pub compression_enabled: bool,
    /// Interval between outgoing vehicle frames, in milliseconds.
    pub send_interval_ms: u32,
}

/// Input configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Dead time of bounce-debounced buttons, in seconds.
    pub bounce_dead_time: f32,
}

/// World configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Optional ground model definition file (INI style).
    pub ground_models: Option<String>,
    /// Flat water plane height, if the world has water.
    pub water_level: Option<f32>,
    /// Ground model used where the terrain reports none.
    pub default_ground_model: String,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g. "debug", "info", "softrig_sim=trace").
    pub log_level: String,
    /// Log every beam break.
    pub beam_break_debug: bool,
    /// Log every plastic deformation.
    pub beam_deform_debug: bool,
    /// Log trigger beam activity.
    pub trigger_debug: bool,
}

// --- Default implementations ---

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            substep_dt: 0.0005,
            max_substeps: 100,
            gravity: -9.81,
            worker_threads: 0,
            turbulence_interval: 8,
            sleep_speed: 0.1,
            sleep_ticks: 10,
            disable_drag: false,
            inter_collisions: true,
            intra_collisions: true,
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frames: 10_000,
            steps_per_second: 240,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interpolation_offset_ms: 100,
            compression_threshold: 256,
            compression_enabled: true,
            send_interval_ms: 100,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            bounce_dead_time: 0.2,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            ground_models: None,
            water_level: None,
            default_ground_model: "concrete".to_string(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            beam_break_debug: false,
            beam_deform_debug: false,
            trigger_debug: false,
        }
    }
}

/// File name of the persisted config inside the config directory.
pub const CONFIG_FILE: &str = "config.ron";

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&text).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// when the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let defaults = Self::default();
            defaults.save(config_dir)?;
            log::info!("wrote default simulation config to {}", path.display());
            return Ok(defaults);
        }
        let config = read_file(&path)?;
        log::info!("simulation config loaded from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        let write_err = |source| ConfigError::WriteError {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(config_dir).map_err(write_err)?;
        let style = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .struct_names(false)
            .indentor("  ".to_string());
        let text = ron::ser::to_string_pretty(self, style).map_err(ConfigError::SerializeError)?;
        std::fs::write(&path, text).map_err(write_err)
    }

    /// Re-read the file; `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = read_file(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("simulation config changed on disk");
        Ok(Some(fresh))
    }

    /// Recorded frame interval in seconds; zero records every sub-step.
    pub fn replay_precision(&self) -> f32 {
        if self.replay.steps_per_second == 0 {
            0.0
        } else {
            1.0 / self.replay.steps_per_second as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(config: &Config) -> Config {
        let dir = tempfile::tempdir().unwrap();
        config.save(dir.path()).unwrap();
        Config::load_or_create(dir.path()).unwrap()
    }

    #[test]
    fn test_defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.physics.substep_dt, 0.0005);
        assert_eq!(config.physics.max_substeps, 100);
        assert_eq!(config.replay.frames, 10_000);
        assert_eq!(config.network.compression_threshold, 256);
        assert_eq!(config.world.default_ground_model, "concrete");
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_sections_fill_in_missing_fields() {
        let config: Config = ron::from_str("(physics: (gravity: -1.62, worker_threads: 3), debug: ())").unwrap();
        assert_eq!(config.physics.gravity, -1.62);
        assert_eq!(config.physics.worker_threads, 3);
        assert_eq!(config.physics.max_substeps, 100);
        assert_eq!(config.replay, ReplayConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let config: Config = ron::from_str("(tire_model: \"magic\", replay: (frames: 64))").unwrap();
        assert_eq!(config.replay.frames, 64);
    }

    #[test]
    fn test_saved_config_loads_back() {
        let mut config = Config::default();
        config.physics.worker_threads = 6;
        config.world.water_level = Some(-2.5);
        config.world.ground_models = Some("grounds.cfg".to_string());
        assert_eq!(roundtrip(&config), config);
    }

    #[test]
    fn test_first_load_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("softrig");
        assert_eq!(Config::load_or_create(&nested).unwrap(), Config::default());
        assert!(nested.join(CONFIG_FILE).is_file());
    }

    #[test]
    fn test_reload_reports_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());

        let mut edited = config.clone();
        edited.replay.frames = 500;
        edited.save(dir.path()).unwrap();
        let changed = config.reload(dir.path()).unwrap();
        assert_eq!(changed.map(|c| c.replay.frames), Some(500));
    }

    #[test]
    fn test_broken_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        match Config::load_or_create(dir.path()) {
            Err(ConfigError::ParseError { path, .. }) => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_precision() {
        let mut config = Config::default();
        config.replay.steps_per_second = 200;
        assert!((config.replay_precision() - 0.005).abs() < 1e-9);
        config.replay.steps_per_second = 0;
        assert_eq!(config.replay_precision(), 0.0);
    }
}

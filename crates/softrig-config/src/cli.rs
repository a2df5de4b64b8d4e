//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// softrig command-line arguments.
///
/// Simulation values override settings loaded from `config.ron`; the
/// remaining fields select what the runner does.
#[derive(Parser, Debug, Default)]
#[command(name = "softrig", about = "Soft-body vehicle simulation runner")]
pub struct CliArgs {
    /// Vertical gravity in m/s² (negative is down).
    #[arg(long, allow_hyphen_values = true)]
    pub gravity: Option<f32>,

    /// Worker pool size (0 = auto).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Maximum sub-steps per visual frame.
    #[arg(long)]
    pub substeps: Option<u32>,

    /// Replay frames per simulated second (0 = every sub-step).
    #[arg(long)]
    pub replay_steps: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of visual frames to simulate.
    #[arg(long)]
    pub frames: Option<u32>,

    /// RON vehicle description to spawn; may be repeated.
    #[arg(long)]
    pub vehicle: Vec<PathBuf>,

    /// Built-in scenario name (cube, rope, detacher, hook, abs).
    #[arg(long)]
    pub scenario: Option<String>,

    /// Write a replay file here.
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Write a JSON run report here.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl Config {
    /// Let command-line values win over the loaded file.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        let physics = &mut self.physics;
        physics.gravity = args.gravity.unwrap_or(physics.gravity);
        physics.worker_threads = args.threads.unwrap_or(physics.worker_threads);
        if let Some(max) = args.substeps {
            physics.max_substeps = max.max(1);
        }
        self.replay.steps_per_second = args.replay_steps.unwrap_or(self.replay.steps_per_second);
        if let Some(level) = &args.log_level {
            self.debug.log_level.clone_from(level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            gravity: Some(-1.62),
            threads: Some(2),
            substeps: Some(0),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.physics.gravity, -1.62);
        assert_eq!(config.physics.worker_threads, 2);
        assert_eq!(config.physics.max_substeps, 1);
        assert_eq!(config.replay.steps_per_second, 240);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_parse_runner_arguments() {
        let args = CliArgs::parse_from([
            "softrig",
            "--gravity",
            "-3.7",
            "--vehicle",
            "a.ron",
            "--vehicle",
            "b.ron",
            "--frames",
            "120",
        ]);
        assert_eq!(args.gravity, Some(-3.7));
        assert_eq!(args.vehicle.len(), 2);
        assert_eq!(args.frames, Some(120));
        assert!(args.record.is_none());
    }
}

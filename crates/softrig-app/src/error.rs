use std::path::PathBuf;

use softrig_config::ConfigError;
use softrig_net::ReplayFileError;
use softrig_sim::SimError;

/// Errors that end a runner invocation.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("could not determine the OS configuration directory")]
    NoConfigDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("failed to load {path}: {source}")]
    Vehicle {
        path: PathBuf,
        #[source]
        source: SimError,
    },

    #[error("replay recording failed: {0}")]
    Replay(#[from] ReplayFileError),

    #[error("failed to write report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("unknown scenario '{0}' (expected one of: cube, rope, detacher, hook, abs)")]
    UnknownScenario(String),

    #[error("nothing to simulate: pass --scenario or --vehicle")]
    NothingToRun,
}

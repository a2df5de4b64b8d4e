//! Configuration for the softrig simulation core.
//!
//! Settings persist to disk as RON, can be overridden from the command line
//! via clap, and support hot-reload detection. Unknown or missing fields are
//! tolerated so older and newer config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, InputConfig, NetworkConfig, PhysicsConfig, ReplayConfig, WorldConfig,
};
pub use error::ConfigError;

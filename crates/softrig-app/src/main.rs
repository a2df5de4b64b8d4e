//! The `softrig` binary.

use clap::Parser;
use softrig_app::error::AppError;
use softrig_app::platform::PlatformDirs;
use softrig_app::runner::{self, RunPlan};
use softrig_config::{CliArgs, Config};

fn run(args: &CliArgs) -> Result<(), AppError> {
    let dirs = match &args.config {
        Some(root) => PlatformDirs::with_root(root),
        None => PlatformDirs::resolve()?,
    };
    dirs.create()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    softrig_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    tracing::info!(config = %dirs.config_dir.display(), logs = %dirs.log_dir.display(), "softrig starting");

    let plan = RunPlan::from_args(args)?;
    let report = runner::run(&config, &plan)?;
    if let Some(path) = &args.report {
        report.write(path)?;
        tracing::info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(&args) {
        tracing::error!(error = %e, "run failed");
        eprintln!("softrig: {e}");
        std::process::exit(1);
    }
}

//! Per-user directories of the runner: `config.ron`, recordings and logs.

use std::path::{Path, PathBuf};

use crate::error::AppError;

const APP_NAME: &str = "softrig";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDirs {
    pub config_dir: PathBuf,
    /// Default location of replay recordings and reports.
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl PlatformDirs {
    /// Resolve the OS locations (XDG on Linux, Known Folders on Windows,
    /// Library on macOS) without touching the disk.
    pub fn resolve() -> Result<Self, AppError> {
        let config_base = dirs::config_dir().ok_or(AppError::NoConfigDir)?;
        let app = config_base.join(APP_NAME);
        let data_dir = dirs::data_dir().map_or_else(|| app.join("data"), |d| d.join(APP_NAME));
        Ok(Self {
            config_dir: app.clone(),
            data_dir,
            log_dir: app.join("logs"),
        })
    }

    /// Everything under `root`; `--config` and tests use this.
    pub fn with_root(root: &Path) -> Self {
        Self {
            config_dir: root.to_path_buf(),
            data_dir: root.join("data"),
            log_dir: root.join("logs"),
        }
    }

    pub fn create(&self) -> Result<(), AppError> {
        for dir in [&self.config_dir, &self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = PlatformDirs::with_root(tmp.path());
        assert_eq!(dirs.config_dir, tmp.path());
        assert!(dirs.log_dir.ends_with("logs"));
        dirs.create().unwrap();
        assert!(dirs.data_dir.is_dir());
        assert!(dirs.log_dir.is_dir());
    }

    #[test]
    fn test_resolved_paths_are_app_scoped() {
        if let Ok(dirs) = PlatformDirs::resolve() {
            assert!(dirs.config_dir.ends_with(APP_NAME));
            assert!(dirs.log_dir.starts_with(&dirs.config_dir));
        }
    }
}

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Base configuration file marking a project root.
pub const CONFIG_FILE: &str = "d2build.yml";

/// Selected environment (`env: <name>`).
pub const ENV_FILE: &str = ".d2build.env";

/// Presence of this file locks sync and reinitialization.
pub const LOCK_FILE: &str = ".d2build-locked";

/// Checksum snapshot written by the last successful build.
pub const CHECKSUM_FILE: &str = ".make.sum";

/// Per-environment overlay file name.
pub fn env_config_file(env: &str) -> String {
    format!("d2build.{}.yml", env)
}

/// Walk up from `start` to the nearest directory containing `d2build.yml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        current = dir.parent();
    }

    Err(Error::config_missing_file(
        start.join(CONFIG_FILE).to_string_lossy().to_string(),
    ))
}

/// Project root discovered from the process working directory.
pub fn current_project_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| Error::internal_io(e.to_string(), Some("read current dir".to_string())))?;
    find_project_root(&cwd)
}

//! Lock flag that disables sync and reinitialization on a project.

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    /// False when the call found the project already in the requested state.
    pub changed: bool,
}

pub fn is_locked(root: &Path) -> bool {
    root.join(paths::LOCK_FILE).exists()
}

/// Write the lock file with the current timestamp unless already locked.
pub fn lock(root: &Path) -> Result<LockStatus> {
    let path = root.join(paths::LOCK_FILE);
    if path.exists() {
        let since = io::read_file(&path, "read lock file")
            .ok()
            .map(|s| s.trim().to_string());
        return Ok(LockStatus {
            locked: true,
            since,
            changed: false,
        });
    }

    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
    io::write_file(&path, &stamp, "write lock file")?;
    log_status!("lock", "Locked at {}", stamp);

    Ok(LockStatus {
        locked: true,
        since: Some(stamp),
        changed: true,
    })
}

pub fn unlock(root: &Path) -> Result<LockStatus> {
    let removed = io::remove_path(&root.join(paths::LOCK_FILE), "remove lock file")?;
    if removed {
        log_status!("lock", "Unlocked");
    }
    Ok(LockStatus {
        locked: false,
        since: None,
        changed: removed,
    })
}

pub fn ensure_unlocked(root: &Path) -> Result<()> {
    if is_locked(root) {
        return Err(Error::build_locked(paths::LOCK_FILE));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_then_unlock() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_unlocked(dir.path()).is_ok());

        let status = lock(dir.path()).unwrap();
        assert!(status.changed);
        assert!(is_locked(dir.path()));

        let again = lock(dir.path()).unwrap();
        assert!(!again.changed);
        assert_eq!(again.since, status.since);

        let err = ensure_unlocked(dir.path()).unwrap_err();
        assert_eq!(err.code.as_str(), "build.locked");

        assert!(unlock(dir.path()).unwrap().changed);
        assert!(!unlock(dir.path()).unwrap().changed);
    }

    #[test]
    fn lock_stamp_format() {
        let dir = TempDir::new().unwrap();
        let stamp = lock(dir.path()).unwrap().since.unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M").is_ok());
    }
}

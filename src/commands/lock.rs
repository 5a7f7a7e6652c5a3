use d2build::lock::{self, LockStatus};
use d2build::paths;

use super::CmdResult;

/// `lock` when `locked` is true, `unlock` otherwise.
pub fn run_json(locked: bool) -> CmdResult<LockStatus> {
    let root = paths::current_project_root()?;
    let status = if locked {
        lock::lock(&root)?
    } else {
        lock::unlock(&root)?
    };
    Ok((status, 0))
}

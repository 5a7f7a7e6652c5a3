//! Project identity (git branch, project name) and environment selection.

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Environments that map to themselves when derived from the branch.
const BRANCH_ENVS: [&str; 2] = ["staging", "master"];
const FALLBACK_ENV: &str = "staging";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EnvFile {
    env: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSelection {
    pub env: String,
    /// True when the env file did not exist and was just written.
    pub is_new: bool,
}

fn git_output(root: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Current git branch, or an empty string outside a repository.
pub fn current_branch(root: &Path) -> String {
    git_output(root, &["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_default()
}

/// Basename of the git toplevel, falling back to the project directory name.
pub fn project_name(root: &Path) -> String {
    let toplevel = git_output(root, &["rev-parse", "--show-toplevel"]);
    let path = toplevel.as_deref().map(Path::new).unwrap_or(root);
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Environment derived from a branch name.
pub fn env_for_branch(branch: &str) -> String {
    if BRANCH_ENVS.contains(&branch) {
        branch.to_string()
    } else {
        FALLBACK_ENV.to_string()
    }
}

/// Read `.d2build.env`; when missing, derive it from the branch and write it.
pub fn read_env(root: &Path, branch: &str) -> Result<EnvSelection> {
    let path = root.join(paths::ENV_FILE);

    if path.is_file() {
        let content = io::read_file(&path, "read env file")?;
        let parsed: EnvFile = serde_yml::from_str(&content)
            .map_err(|e| Error::config_invalid_yaml(path.to_string_lossy().to_string(), e))?;
        return Ok(EnvSelection {
            env: parsed.env,
            is_new: false,
        });
    }

    let env = env_for_branch(branch);
    write_env(root, &env)?;
    Ok(EnvSelection { env, is_new: true })
}

pub fn write_env(root: &Path, env: &str) -> Result<()> {
    let env = env.trim();
    if env.is_empty() {
        return Err(Error::validation_invalid_argument(
            "env",
            "Environment name cannot be empty",
            None,
            None,
        ));
    }
    let content = serde_yml::to_string(&EnvFile {
        env: env.to_string(),
    })
    .map_err(|e| Error::internal_json(e.to_string(), Some("serialize env file".to_string())))?;
    io::write_file_atomic(&root.join(paths::ENV_FILE), &content, "write env file")
}

/// Environments with an overlay file (`d2build.<env>.yml`), sorted.
pub fn list_envs(root: &Path) -> Vec<String> {
    io::sorted_entries(root)
        .into_iter()
        .filter_map(|name| {
            name.strip_prefix("d2build.")
                .and_then(|rest| rest.strip_suffix(".yml"))
                .filter(|env| !env.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Default offered when confirming a freshly derived environment.
pub fn suggested_env(branch: &str, env: &str) -> Option<String> {
    if branch != env {
        Some(FALLBACK_ENV.to_string())
    } else if branch == "master" {
        Some("master".to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn branch_maps_to_env() {
        assert_eq!(env_for_branch("master"), "master");
        assert_eq!(env_for_branch("staging"), "staging");
        assert_eq!(env_for_branch("feature/login"), "staging");
        assert_eq!(env_for_branch(""), "staging");
    }

    #[test]
    fn read_env_creates_file_once() {
        let dir = TempDir::new().unwrap();

        let first = read_env(dir.path(), "master").unwrap();
        assert_eq!(first.env, "master");
        assert!(first.is_new);

        let second = read_env(dir.path(), "develop").unwrap();
        assert_eq!(second.env, "master");
        assert!(!second.is_new);
    }

    #[test]
    fn write_env_rejects_empty() {
        let dir = TempDir::new().unwrap();
        assert!(write_env(dir.path(), "  ").is_err());
    }

    #[test]
    fn list_envs_reads_overlay_names() {
        let dir = TempDir::new().unwrap();
        for name in ["d2build.yml", "d2build.staging.yml", "d2build.master.yml", "other.yml"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(list_envs(dir.path()), vec!["master", "staging"]);
    }

    #[test]
    fn suggested_env_cases() {
        assert_eq!(suggested_env("feature", "staging").as_deref(), Some("staging"));
        assert_eq!(suggested_env("master", "master").as_deref(), Some("master"));
        assert_eq!(suggested_env("staging", "staging"), None);
    }
}

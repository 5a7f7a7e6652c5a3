use std::path::{Path, PathBuf};

use crate::config::{self, Config};
use crate::environment;
use crate::error::Result;
use crate::paths;
use crate::utils::template::Tokens;

/// Everything a command needs to know about the project it runs in.
#[derive(Debug, Clone)]
pub struct Context {
    pub root: PathBuf,
    pub env: String,
    /// True when `.d2build.env` was created while loading this context.
    pub env_is_new: bool,
    pub branch: String,
    pub project_name: String,
    pub config: Config,
    pub uid: u32,
}

/// UID of the invoking user, passed to containers and compose.
pub fn invoking_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

impl Context {
    /// Discover the project root from the working directory and load it.
    pub fn discover() -> Result<Self> {
        let root = paths::current_project_root()?;
        Self::load(&root)
    }

    pub fn load(root: &Path) -> Result<Self> {
        let branch = environment::current_branch(root);
        let project_name = environment::project_name(root);
        let selection = environment::read_env(root, &branch)?;

        let tokens = Tokens {
            project_name: project_name.clone(),
            branch: branch.clone(),
            env: selection.env.clone(),
        };
        let config = config::load(root, &tokens)?;

        Ok(Self {
            root: root.to_path_buf(),
            env: selection.env,
            env_is_new: selection.is_new,
            branch,
            project_name,
            config,
            uid: invoking_uid(),
        })
    }

    /// Build a context from already-resolved parts.
    pub fn from_parts(root: &Path, env: &str, config: Config) -> Self {
        Self {
            root: root.to_path_buf(),
            env: env.to_string(),
            env_is_new: false,
            branch: String::new(),
            project_name: root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            config,
            uid: invoking_uid(),
        }
    }

    /// Reload after the environment selection changed.
    pub fn reload(&self) -> Result<Self> {
        Self::load(&self.root)
    }

    pub fn settings(&self) -> &config::Settings {
        &self.config.settings
    }

    /// Project-relative path resolved against the root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn web_path(&self) -> PathBuf {
        self.root.join(&self.config.settings.web_dir)
    }

}

use clap::Args;
use d2build::context::Context;
use d2build::environment;
use d2build::lifecycle::{self, InitOptions, InitReport};

use super::CmdResult;

#[derive(Args)]
pub struct InitArgs {
    /// Sync database and files after the build
    #[arg(short, long)]
    pub sync: bool,

    /// Sync only files after the build
    #[arg(long, visible_alias = "sf")]
    pub sync_files: bool,

    /// Sync only the database after the build
    #[arg(long, visible_alias = "sdb")]
    pub sync_db: bool,
}

pub fn run(args: InitArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<InitReport> {
    let ctx = confirm_new_env(super::project_context()?)?;
    let opts = InitOptions {
        sync: args.sync,
        sync_files: args.sync_files,
        sync_db: args.sync_db,
    };
    Ok((lifecycle::init(&ctx, &opts)?, 0))
}

/// Default for the new-environment prompt, or `None` when there is nothing to ask.
fn env_prompt_default(env_is_new: bool, branch: &str, env: &str) -> Option<String> {
    if !env_is_new {
        return None;
    }
    environment::suggested_env(branch, env)
}

/// A freshly derived environment is offered for confirmation before init
/// writes anything else.
fn confirm_new_env(ctx: Context) -> d2build::Result<Context> {
    if !crate::tty::is_stdin_tty() {
        return Ok(ctx);
    }
    let Some(default) = env_prompt_default(ctx.env_is_new, &ctx.branch, &ctx.env) else {
        return Ok(ctx);
    };

    let chosen = crate::tty::prompt_default(
        "Would you like to change your environment (which d2build.<env>.yml to use)",
        Some(&default),
    )?;
    if chosen == default {
        return Ok(ctx);
    }

    environment::write_env(&ctx.root, &chosen)?;
    crate::tty::status(&format!("Set {} environment.", chosen));
    ctx.reload()
}

#[cfg(test)]
mod tests {
    use super::env_prompt_default;

    #[test]
    fn prompt_only_with_a_suggestion() {
        assert_eq!(env_prompt_default(true, "feature/login", "staging").as_deref(), Some("staging"));
        assert_eq!(env_prompt_default(true, "master", "master").as_deref(), Some("master"));
        assert_eq!(env_prompt_default(true, "staging", "staging"), None);
    }

    #[test]
    fn existing_env_is_not_prompted() {
        assert_eq!(env_prompt_default(false, "feature/login", "staging"), None);
    }
}

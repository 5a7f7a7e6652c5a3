use clap::{Args, Subcommand};
use d2build::context::Context;
use d2build::environment;
use d2build::paths;
use serde::Serialize;

use super::CmdResult;

#[derive(Args)]
pub struct EnvArgs {
    #[command(subcommand)]
    command: EnvCommand,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Show the active environment
    Get,
    /// Switch the active environment
    Set(EnvSetArgs),
    /// List environments with an overlay file
    List,
}

#[derive(Args)]
pub struct EnvSetArgs {
    /// Environment name
    pub name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvOutput {
    pub env: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    pub available: Vec<String>,
}

pub fn run(args: EnvArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<EnvOutput> {
    match args.command {
        EnvCommand::Get | EnvCommand::List => {
            let ctx = super::project_context()?;
            Ok((output(&ctx, None), 0))
        }
        EnvCommand::Set(set) => run_json(set),
    }
}

/// `env set`, also reachable as `chenv` and `setenv`.
pub fn run_json(args: EnvSetArgs) -> CmdResult<EnvOutput> {
    let root = paths::current_project_root()?;
    let previous = Context::load(&root)?.env;
    environment::write_env(&root, &args.name)?;
    log_env_change(&previous, &args.name);

    let ctx = Context::load(&root)?;
    Ok((output(&ctx, Some(previous)), 0))
}

fn log_env_change(previous: &str, env: &str) {
    crate::tty::status(&format!("Environment: {} -> {}", previous, env.trim()));
}

fn output(ctx: &Context, previous: Option<String>) -> EnvOutput {
    EnvOutput {
        env: ctx.env.clone(),
        branch: ctx.branch.clone(),
        previous,
        available: environment::list_envs(&ctx.root),
    }
}

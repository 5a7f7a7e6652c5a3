use clap::Args;
use d2build::build::{self, BuildOptions, BuildReport};

use super::CmdResult;

#[derive(Args)]
pub struct BuildArgs {
    /// Run every step on the host even when docker is configured
    #[arg(long)]
    pub no_docker: bool,

    /// Pass --no-interaction to composer
    #[arg(long)]
    pub not_interactive: bool,

    /// Reinstall composer and theme dependencies regardless of checksums
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: BuildArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<BuildReport> {
    let ctx = super::project_context()?;
    let opts = BuildOptions {
        no_docker: args.no_docker,
        not_interactive: args.not_interactive,
        force: args.force,
    };
    Ok((build::build(&ctx, &opts)?, 0))
}

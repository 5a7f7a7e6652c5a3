use clap::Args;
use d2build::checklist::{self, ChecklistReport};
use d2build::executor::ExecOptions;

use super::CmdResult;

#[derive(Args)]
pub struct ChecklistArgs {
    /// Run the checklist on this connection instead of locally
    pub remote: Option<String>,

    /// Run drush on the host even when docker is configured
    #[arg(long)]
    pub no_docker: bool,
}

pub fn run(
    args: ChecklistArgs,
    _global: &crate::commands::GlobalArgs,
) -> CmdResult<ChecklistReport> {
    let ctx = super::project_context()?;
    let opts = ExecOptions {
        no_docker: args.no_docker,
        not_interactive: true,
    };
    let report = checklist::run(&ctx, args.remote.as_deref(), &opts)?;
    let exit_code = if report.passed { 0 } else { 1 };
    Ok((report, exit_code))
}

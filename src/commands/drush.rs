use clap::Args;
use d2build::docker;
use serde::Serialize;

use super::CmdResult;

const NOT_INTERACTIVE_FLAG: &str = "--not-interactive";

#[derive(Args)]
pub struct DrushArgs {
    /// Stream output instead of attaching the terminal
    #[arg(long)]
    pub not_interactive: bool,

    /// Arguments passed to drush
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub args: Vec<String>,
}

impl DrushArgs {
    /// The flag is also accepted after the drush arguments.
    pub fn is_interactive(&self) -> bool {
        !self.not_interactive && !self.args.iter().any(|a| a == NOT_INTERACTIVE_FLAG)
    }

    fn drush_args(&self) -> Vec<String> {
        self.args
            .iter()
            .filter(|a| *a != NOT_INTERACTIVE_FLAG)
            .cloned()
            .collect()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrushOutput {
    pub args: Vec<String>,
    pub exit_code: i32,
}

pub fn run(args: DrushArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DrushOutput> {
    let ctx = super::project_context()?;
    let drush_args = args.drush_args();
    let exit_code = docker::drush(&ctx, &drush_args, !args.is_interactive())?;
    Ok((
        DrushOutput {
            args: drush_args,
            exit_code,
        },
        exit_code,
    ))
}

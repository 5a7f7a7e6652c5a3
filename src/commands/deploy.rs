use clap::Args;
use d2build::deploy::{self, DeployReport};

use super::CmdResult;

#[derive(Args)]
pub struct DeployArgs {
    /// Deploy target (default: the first one configured)
    pub name: Option<String>,

    /// Continue past warnings without asking
    #[arg(short, long)]
    pub yes: bool,
}

/// Deploy prompts default to yes, so an unattended run goes on past warnings.
fn confirm_continue(yes: bool, interactive: bool, question: &str) -> bool {
    yes || crate::tty::confirm_on(interactive, question, true)
}

pub fn run(args: DeployArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DeployReport> {
    let ctx = super::project_context()?;
    let yes = args.yes;
    let interactive = crate::tty::is_stdin_tty();
    let mut confirm = |question: &str| confirm_continue(yes, interactive, question);
    Ok((deploy::run(&ctx, args.name.as_deref(), &mut confirm)?, 0))
}

#[cfg(test)]
mod tests {
    use super::confirm_continue;

    #[test]
    fn unattended_deploy_continues() {
        assert!(confirm_continue(false, false, "Do you want to continue?"));
        assert!(confirm_continue(true, false, "Problem detected in remote server. Continue?"));
    }

    #[test]
    fn yes_flag_skips_the_prompt() {
        // Interactive, but --yes answers before stdin is read.
        assert!(confirm_continue(true, true, "Do you want to continue?"));
    }
}

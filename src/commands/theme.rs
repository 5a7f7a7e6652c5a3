use clap::{Args, Subcommand};
use d2build::checksum;
use d2build::executor::ExecOptions;
use d2build::output::StepReport;
use d2build::theme;
use serde::Serialize;

use super::CmdResult;

#[derive(Args)]
pub struct ThemeArgs {
    #[command(subcommand)]
    pub command: ThemeCommand,

    /// Run on the host even when docker is configured
    #[arg(long, global = true)]
    pub no_docker: bool,
}

#[derive(Subcommand)]
pub enum ThemeCommand {
    /// npm install in themes whose package.json changed
    Install {
        /// Install in every theme
        #[arg(long)]
        force: bool,
    },
    /// Compile theme assets
    Compile,
    /// Watch one theme's sources
    Watch {
        /// Theme directory name
        theme: String,
    },
    /// Legacy compass compile
    Compass,
}

impl ThemeArgs {
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, ThemeCommand::Watch { .. })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum ThemeOutput {
    Steps(Vec<StepReport>),
    #[serde(rename_all = "camelCase")]
    Watch { theme: String, exit_code: i32 },
}

pub fn run(args: ThemeArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ThemeOutput> {
    let ctx = super::project_context()?;
    let opts = ExecOptions {
        no_docker: args.no_docker,
        not_interactive: false,
    };

    let steps = match args.command {
        ThemeCommand::Install { force } => {
            let changes = checksum::evaluate(&ctx.root, &theme::theme_paths(&ctx.root));
            theme::install_components(&ctx, &opts, force, Some(&changes))?
        }
        ThemeCommand::Compile => theme::compile(&ctx, &opts)?,
        ThemeCommand::Compass => theme::compass(&ctx, &opts)?,
        ThemeCommand::Watch { theme } => {
            let exit_code = theme::watch(&ctx, &opts, &theme)?;
            return Ok((ThemeOutput::Watch { theme, exit_code }, exit_code));
        }
    };
    Ok((ThemeOutput::Steps(steps), 0))
}

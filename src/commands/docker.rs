use clap::{Args, Subcommand};
use d2build::docker::{self, DockerReport};
use serde::Serialize;

use super::CmdResult;

#[derive(Args)]
pub struct DockerArgs {
    #[command(subcommand)]
    pub command: DockerCommand,
}

#[derive(Subcommand)]
pub enum DockerCommand {
    /// Start the containers
    Up,
    /// Stop the containers
    Down,
    /// Stop and start the containers
    Restart,
    /// Remove containers, local images and volumes
    Destroy,
    /// Pull fresh images and restart
    Refresh {
        /// Only refresh this service
        service: Option<String>,
    },
    /// Open a shell in a container as the current user
    Shell {
        /// Service name (default: the web service)
        service: Option<String>,
    },
    /// Open a root shell in a container
    RootShell {
        /// Service name (default: the web service)
        service: Option<String>,
    },
    /// Follow container logs
    Log {
        /// Service name (default: the web service)
        service: Option<String>,
    },
}

impl DockerArgs {
    pub fn is_interactive(&self) -> bool {
        matches!(
            self.command,
            DockerCommand::Shell { .. } | DockerCommand::RootShell { .. } | DockerCommand::Log { .. }
        )
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum DockerOutput {
    Action(DockerReport),
    #[serde(rename_all = "camelCase")]
    Session { exit_code: i32 },
}

pub fn run(args: DockerArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<DockerOutput> {
    let ctx = super::project_context()?;

    let report = match args.command {
        DockerCommand::Up => docker::up(&ctx)?,
        DockerCommand::Down => docker::down(&ctx)?,
        DockerCommand::Restart => docker::restart(&ctx)?,
        DockerCommand::Destroy => docker::destroy(&ctx)?,
        DockerCommand::Refresh { service } => docker::refresh(&ctx, service.as_deref())?,
        DockerCommand::Shell { service } => {
            return session(docker::shell(&ctx, service.as_deref())?)
        }
        DockerCommand::RootShell { service } => {
            return session(docker::root_shell(&ctx, service.as_deref())?)
        }
        DockerCommand::Log { service } => return session(docker::log(&ctx, service.as_deref())),
    };
    Ok((DockerOutput::Action(report), 0))
}

fn session(exit_code: i32) -> CmdResult<DockerOutput> {
    Ok((DockerOutput::Session { exit_code }, exit_code))
}

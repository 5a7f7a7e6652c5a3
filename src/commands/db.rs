use clap::{Args, Subcommand};
use d2build::backup::{self, BackupReport};
use d2build::executor::ExecOptions;

use super::CmdResult;

#[derive(Args)]
pub struct DbArgs {
    #[command(subcommand)]
    command: DbCommand,

    /// Run drush on the host even when docker is configured
    #[arg(long, global = true)]
    no_docker: bool,
}

#[derive(Subcommand)]
enum DbCommand {
    /// Dump the database to dump-<date>.sql.gz
    Backup,
    /// Import a gzipped dump
    Restore {
        /// Dump file, relative to the project root
        file: String,
    },
}

pub fn run(args: DbArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<BackupReport> {
    let ctx = super::project_context()?;
    let opts = ExecOptions {
        no_docker: args.no_docker,
        not_interactive: true,
    };
    let report = match args.command {
        DbCommand::Backup => backup::backup_db(&ctx, &opts)?,
        DbCommand::Restore { file } => backup::restore_db(&ctx, &opts, &file)?,
    };
    Ok((report, 0))
}

use clap::{Args, Subcommand};
use d2build::sync::{self, DbSyncReport, FilesSyncReport, SyncReport};
use serde::Serialize;

use super::CmdResult;

#[derive(Args)]
#[command(args_conflicts_with_subcommands = true)]
pub struct SyncArgs {
    #[command(subcommand)]
    command: Option<SyncCommand>,

    /// Connection to pull from (default: SyncDefaultSource)
    source: Option<String>,
}

#[derive(Subcommand)]
enum SyncCommand {
    /// Pull and import the remote databases
    Db {
        /// Connection to pull from
        source: Option<String>,
    },
    /// Rsync the remote files directories
    Files {
        /// Connection to pull from
        source: Option<String>,
    },
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SyncOutput {
    All(SyncReport),
    Db(DbSyncReport),
    Files(FilesSyncReport),
}

pub fn run(args: SyncArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<SyncOutput> {
    let ctx = super::project_context()?;
    let output = match args.command {
        Some(SyncCommand::Db { source }) => SyncOutput::Db(sync::sync_db(&ctx, source.as_deref())?),
        Some(SyncCommand::Files { source }) => {
            SyncOutput::Files(sync::sync_files(&ctx, source.as_deref())?)
        }
        None => SyncOutput::All(sync::sync(&ctx, args.source.as_deref())?),
    };
    Ok((output, 0))
}

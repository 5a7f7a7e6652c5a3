use clap::{Parser, Subcommand};

use commands::GlobalArgs;

#[derive(Debug, Clone, Copy)]
enum ResponseMode {
    Json,
    /// Child process owns the terminal; no envelope on success.
    InteractivePassthrough,
}

mod commands;
mod output;
mod tty;

use commands::{
    build, checklist, clean, db, deploy, docker, drush, env, init, sync, theme,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "d2build")]
#[command(version = VERSION)]
#[command(about = "Build, sync and deploy automation for Drupal projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up the project: docker, build, settings and optional sync
    #[command(visible_alias = "i")]
    Init(init::InitArgs),
    /// Install dependencies, link sources and compile themes
    #[command(visible_alias = "b")]
    Build(build::BuildArgs),
    /// Destroy containers and remove build output
    #[command(visible_alias = "c")]
    Clean(clean::CleanArgs),
    /// Pull database and files from a remote connection
    Sync(sync::SyncArgs),
    /// Deploy to a configured target
    Deploy(deploy::DeployArgs),
    /// Run pre-release checks
    #[command(visible_alias = "cl")]
    Checklist(checklist::ChecklistArgs),
    /// Manage the docker-compose stack
    Docker(docker::DockerArgs),
    /// Run drush in the web container
    Drush(drush::DrushArgs),
    /// Show or switch the active environment
    Env(env::EnvArgs),
    /// Switch the active environment
    #[command(hide = true)]
    Chenv(env::EnvSetArgs),
    /// Switch the active environment
    #[command(hide = true)]
    Setenv(env::EnvSetArgs),
    /// Disable sync and reinitialization on this project
    Lock,
    /// Re-enable sync and reinitialization
    Unlock,
    /// Back up or restore the local database
    Db(db::DbArgs),
    /// Theme dependency install and asset compilation
    Theme(theme::ThemeArgs),
}

fn response_mode(command: &Commands) -> ResponseMode {
    match command {
        Commands::Docker(args) if args.is_interactive() => ResponseMode::InteractivePassthrough,
        Commands::Drush(args) if args.is_interactive() => ResponseMode::InteractivePassthrough,
        Commands::Theme(args) if args.is_interactive() => ResponseMode::InteractivePassthrough,
        _ => ResponseMode::Json,
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};
    let mode = response_mode(&cli.command);

    if let ResponseMode::InteractivePassthrough = mode {
        if !tty::require_tty_for_interactive() {
            let err = d2build::Error::validation_invalid_argument(
                "tty",
                "This command requires an interactive TTY",
                None,
                Some(vec!["Pass --not-interactive where the command supports it".to_string()]),
            );
            let _ = output::print_result::<serde_json::Value>(Err(err));
            return std::process::ExitCode::from(exit_code_to_u8(2));
        }
    }

    let (json_result, exit_code) = commands::run_json(cli.command, &global);

    match (mode, json_result) {
        (ResponseMode::Json, result) => {
            let _ = output::print_result(result);
        }
        (ResponseMode::InteractivePassthrough, Err(err)) => {
            let _ = output::print_result::<serde_json::Value>(Err(err));
        }
        (ResponseMode::InteractivePassthrough, Ok(_)) => {}
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn init_sync_flags_have_short_aliases() {
        let cli = Cli::try_parse_from(["d2build", "init", "--sf", "--sdb"]).unwrap();
        match cli.command {
            Commands::Init(args) => {
                assert!(args.sync_files);
                assert!(args.sync_db);
                assert!(!args.sync);
            }
            _ => panic!("expected init"),
        }

        let cli = Cli::try_parse_from(["d2build", "i", "--sync-files"]).unwrap();
        assert!(matches!(cli.command, Commands::Init(args) if args.sync_files && !args.sync_db));
    }
}

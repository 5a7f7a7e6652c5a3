use d2build::context::Context;

pub type CmdResult<T> = d2build::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Load the project the working directory belongs to.
pub(crate) fn project_context() -> d2build::Result<Context> {
    Context::discover()
}

pub mod build;
pub mod checklist;
pub mod clean;
pub mod db;
pub mod deploy;
pub mod docker;
pub mod drush;
pub mod env;
pub mod init;
pub mod lock;
pub mod sync;
pub mod theme;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run_json($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (d2build::Result<serde_json::Value>, i32) {
    crate::tty::status("d2build is working...");

    match command {
        crate::Commands::Init(args) => dispatch!(args, global, init),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Clean(args) => dispatch!(args, global, clean),
        crate::Commands::Sync(args) => dispatch!(args, global, sync),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Checklist(args) => dispatch!(args, global, checklist),
        crate::Commands::Docker(args) => dispatch!(args, global, docker),
        crate::Commands::Drush(args) => dispatch!(args, global, drush),
        crate::Commands::Env(args) => dispatch!(args, global, env),
        crate::Commands::Chenv(args) | crate::Commands::Setenv(args) => {
            dispatch!(args, env)
        }
        crate::Commands::Lock => dispatch!(true, lock),
        crate::Commands::Unlock => dispatch!(false, lock),
        crate::Commands::Db(args) => dispatch!(args, global, db),
        crate::Commands::Theme(args) => dispatch!(args, global, theme),
    }
}

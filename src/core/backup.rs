use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{self, ExecOptions, Mode, Role};
use crate::utils::shell;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub file: String,
    pub command: String,
}

/// `dump-YYYY-MM-DD.HH.MM.sql.gz` for the given local time.
pub fn backup_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("dump-{}.sql.gz", now.format("%Y-%m-%d.%H.%M"))
}

pub fn backup_command(drush_cmd: &str, drupal_root: &str, file: &str) -> String {
    format!(
        "{} sql-dump -r {} | gzip > {}",
        drush_cmd,
        drupal_root,
        shell::quote_arg(file)
    )
}

pub fn restore_command(drush_cmd: &str, drupal_root: &str, file: &str) -> String {
    format!(
        "gunzip -c {} | {} sqlc -r {}",
        shell::quote_arg(file),
        drush_cmd,
        drupal_root
    )
}

fn run_in_project(ctx: &Context, opts: &ExecOptions, build: impl Fn(&str) -> String) -> Result<String> {
    let target = executor::resolve_target(ctx, opts, Role::Web);
    let root = executor::drupal_root(ctx, &target);
    let inner = build(&root);
    let command = format!(
        "cd {} && {}",
        shell::quote_path(&executor::project_dir(ctx, &target)),
        inner
    );
    executor::run_checked(ctx, &target, &command, Mode::Passthrough)?;
    Ok(inner)
}

/// Dump the site database into a gzip file in the project root.
pub fn backup_db(ctx: &Context, opts: &ExecOptions) -> Result<BackupReport> {
    let file = backup_file_name(chrono::Local::now());
    log_status!("backup", "Create sql backup {}", file);
    let command = run_in_project(ctx, opts, |root| {
        backup_command(&ctx.settings().drush_cmd, root, &file)
    })?;
    Ok(BackupReport { file, command })
}

/// Restore a gzip dump. The file is resolved against the project root.
pub fn restore_db(ctx: &Context, opts: &ExecOptions, file: &str) -> Result<BackupReport> {
    let path = Path::new(file);
    let local = if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.root.join(path)
    };
    if !local.is_file() {
        return Err(Error::backup_file_not_found(file));
    }

    // Commands run from the project dir, so keep paths under the root relative.
    let relative = local
        .strip_prefix(&ctx.root)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| file.to_string());

    log_status!("backup", "Restore database from {}", relative);
    let command = run_in_project(ctx, opts, |root| {
        restore_command(&ctx.settings().drush_cmd, root, &relative)
    })?;
    Ok(BackupReport {
        file: relative,
        command,
    })
}

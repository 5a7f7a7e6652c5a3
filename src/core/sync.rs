//! Database and public files sync from a configured connection.

use crate::config::{Config, Connection, SyncOptions, LOCAL_SOURCE};
use crate::context::Context;
use crate::docker;
use crate::error::{Error, Result};
use crate::executor::{self, ExecOptions, ExecTarget, Mode, Role};
use crate::lock;
use crate::output::StepReport;
use crate::ssh::{self, SshClient};
use crate::utils::{io, shell};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Tables dumped without data.
pub const STRUCTURE_TABLES: &str = "cache,cache_*,history,sessions,watchdog";
const DEFAULT_DATABASE: &str = "default";
const DEFAULT_DRUSH_MAJOR: u32 = 8;

/// One database of one site to pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbJob {
    pub uri: String,
    pub database: String,
    /// Dump file name, relative to the local dump directory.
    pub dump_file: String,
    pub backup_file: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSyncReport {
    pub source: String,
    pub databases: Vec<DbJob>,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesSyncReport {
    pub source: String,
    pub transfers: Vec<String>,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub db: DbSyncReport,
    pub files: FilesSyncReport,
}

/// `.database.<site.><db.>sql`; the db part is left out when none is given.
pub fn dump_file_name(site: Option<&str>, database: Option<&str>, backup: bool) -> String {
    let mut name = String::from(".database.");
    if backup {
        name.push_str("backup.");
    }
    if let Some(site) = site {
        name.push_str(site);
        name.push('.');
    }
    if let Some(db) = database {
        name.push_str(db);
        name.push('.');
    }
    name.push_str("sql");
    name
}

/// Databases to pull: every `MultiSite` entry, or the default site with the
/// source's `sync_source.databases`. Listed databases always carry their key
/// in the dump name.
pub fn db_jobs(config: &Config, options: &SyncOptions) -> Vec<DbJob> {
    if config.is_multisite() {
        return config
            .multisite_sites()
            .iter()
            .flat_map(|site| {
                site.databases.iter().map(move |db| DbJob {
                    uri: site.dir.clone(),
                    database: db.clone(),
                    dump_file: dump_file_name(Some(&site.dir), Some(db), false),
                    backup_file: dump_file_name(Some(&site.dir), Some(db), true),
                })
            })
            .collect();
    }

    let listed = options.sync_source.databases.is_some();
    options
        .sync_source
        .databases()
        .iter()
        .map(|db| {
            let part = if listed { Some(db.as_str()) } else { None };
            DbJob {
                uri: "default".to_string(),
                database: db.clone(),
                dump_file: dump_file_name(None, part, false),
                backup_file: dump_file_name(None, part, true),
            }
        })
        .collect()
}

/// Remote command producing a SQL dump on stdout.
pub fn remote_dump_command(
    connection: &Connection,
    drush_cmd: &str,
    web_container: &str,
    web_dir: &str,
    job: &DbJob,
) -> String {
    let dump = format!(
        "sql-dump --database={} --structure-tables-list={}",
        job.database, STRUCTURE_TABLES
    );
    if connection.enable_docker {
        format!(
            "cd {}; docker exec -i $(docker-compose ps -q {}) {} -l {} -r {}/{} {}",
            connection.home_dir.as_deref().unwrap_or("."),
            web_container,
            drush_cmd,
            job.uri,
            connection.app_dir.trim_end_matches('/'),
            web_dir,
            dump
        )
    } else {
        format!(
            "cd {}; {} -l {} {}",
            connection.web_dir.as_deref().unwrap_or("."),
            drush_cmd,
            job.uri,
            dump
        )
    }
}

/// Drush major version from the installed package, 8 when unknown.
pub fn drush_major_version(root: &Path) -> u32 {
    let package = root.join("vendor/drush/drush");

    if let Ok(info) = std::fs::read_to_string(package.join("drush.info")) {
        if let Some(major) = info
            .lines()
            .find_map(|l| l.trim().strip_prefix("drush_version"))
            .and_then(|rest| leading_number(rest.trim_start_matches([' ', '=']).trim()))
        {
            return major;
        }
    }

    let Ok(raw) = std::fs::read_to_string(package.join("composer.json")) else {
        return DEFAULT_DRUSH_MAJOR;
    };
    let Ok(json) = serde_json::from_str::<Value>(&raw) else {
        return DEFAULT_DRUSH_MAJOR;
    };
    json.get("version")
        .and_then(Value::as_str)
        .or_else(|| json.pointer("/extra/branch-alias/dev-master").and_then(Value::as_str))
        .and_then(leading_number)
        .unwrap_or(DEFAULT_DRUSH_MAJOR)
}

fn leading_number(version: &str) -> Option<u32> {
    let digits: String = version
        .trim_start_matches('v')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// `upwd` arguments; Drush 9 dropped `--password`.
pub fn reset_password_args(admin_user: &str, drush_major: u32) -> String {
    if drush_major >= 9 {
        format!("upwd {} admin", admin_user)
    } else {
        format!("upwd {} --password=admin", admin_user)
    }
}

pub fn cache_rebuild_args(drupal7: bool) -> &'static str {
    if drupal7 {
        "cc all"
    } else {
        "cr"
    }
}

/// rsync arguments pulling `remote_path` into `local_path`.
pub fn rsync_args(client: &SshClient, remote_path: &str, local_path: &str) -> Vec<String> {
    [
        "-razi",
        "--exclude",
        ".git",
        "--checksum",
        "--whole-file",
        "-v",
        "--progress",
        "-h",
        "--stats",
        "-e",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([
        client.rsync_shell(),
        format!("{}:{}", client.account(), remote_path),
        local_path.to_string(),
    ])
    .collect()
}

fn source_name(ctx: &Context, source: Option<&str>) -> String {
    match source {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => ctx.settings().sync_default_source.clone(),
    }
}

fn warn_legacy(ctx: &Context) {
    if ctx.config.legacy_sync_server {
        log_status!(
            "sync",
            "SyncServer configuration is deprecated, move it to connections and SyncOptions"
        );
    }
}

/// Dump directory relative to the project root: the web dir when it exists.
fn local_dump_dir(ctx: &Context) -> String {
    let web_dir = &ctx.settings().web_dir;
    if ctx.path(web_dir).is_dir() {
        format!("{}/", web_dir.trim_end_matches('/'))
    } else {
        String::new()
    }
}

struct Drush<'a> {
    ctx: &'a Context,
    target: ExecTarget,
    root: String,
}

impl<'a> Drush<'a> {
    fn new(ctx: &'a Context) -> Self {
        let target = executor::resolve_target(ctx, &ExecOptions::default(), Role::Web);
        let root = executor::drupal_root(ctx, &target);
        Self { ctx, target, root }
    }

    fn command(&self, uri: &str, args: &str) -> String {
        format!(
            "cd {} && {} -l {} -r {} {}",
            shell::quote_path(&executor::project_dir(self.ctx, &self.target)),
            self.ctx.settings().drush_cmd,
            uri,
            self.root,
            args
        )
    }

    fn run(&self, step: &str, uri: &str, args: &str) -> Result<StepReport> {
        log_status!("sync", "{}", step);
        let command = self.command(uri, args);
        executor::run_checked(self.ctx, &self.target, &command, Mode::Passthrough)?;
        Ok(StepReport::ran(step))
    }
}

fn download(
    ctx: &Context,
    client: &SshClient,
    connection: &Connection,
    job: &DbJob,
    local: &Path,
) -> Result<()> {
    let command = remote_dump_command(
        connection,
        &ctx.settings().drush_cmd,
        &docker::base_web_container(ctx),
        &ctx.settings().web_dir,
        job,
    );
    log_status!("sync", "Download database {} ({})", job.database, job.uri);
    let output = client.execute_to_file(&command, local);
    if !output.success {
        io::remove_path(local, "remove partial dump")?;
    }
    output.into_result(&command, Some(client.account()))?;
    Ok(())
}

/// Pull databases from `source` (default: `SyncDefaultSource`) into the local site.
pub fn sync_db(ctx: &Context, source: Option<&str>) -> Result<DbSyncReport> {
    lock::ensure_unlocked(&ctx.root)?;
    warn_legacy(ctx);

    let source = source_name(ctx, source);
    log_status!("sync", "Sync database from {}", source);

    let connection = match ctx.config.connection(&source) {
        Ok(conn) => Some(conn),
        Err(_) if source == LOCAL_SOURCE => None,
        Err(e) => return Err(e),
    };

    let client = match connection {
        Some(conn) if conn.server.is_some() => {
            let mut missing = Vec::new();
            if conn.user.is_none() {
                missing.push("user".to_string());
            }
            if conn.home_dir.is_none() {
                missing.push("HomeDir".to_string());
            }
            if !conn.enable_docker && conn.web_dir.is_none() {
                missing.push("WebDir".to_string());
            }
            if !missing.is_empty() {
                return Err(Error::sync_remote_invalid(&source, missing));
            }
            Some(ssh::resolve(ctx, &source)?)
        }
        _ => None,
    };

    let options = ctx.config.sync_options(&source);
    let jobs = db_jobs(&ctx.config, &options);
    let mut steps = Vec::new();
    if docker::ensure_running(ctx, false)? {
        steps.push(StepReport::ran("docker up"));
    }

    let drush = Drush::new(ctx);
    let dump_dir = local_dump_dir(ctx);
    let drush_major = drush_major_version(&ctx.root);

    for job in &jobs {
        let dump_rel = format!("{}{}", dump_dir, job.dump_file);
        let backup_rel = format!("{}{}", dump_dir, job.backup_file);
        let database = format!("--database={}", job.database);

        if let (Some(client), Some(conn)) = (&client, connection) {
            download(ctx, client, conn, job, &ctx.path(&dump_rel))?;
            steps.push(StepReport::ran(format!("download {}", job.database)).with_detail(&dump_rel));
        }

        steps.push(drush.run(
            &format!("backup local {}", job.database),
            &job.uri,
            &format!(
                "sql-dump {} --structure-tables-list={} > ./{}",
                database, STRUCTURE_TABLES, backup_rel
            ),
        )?);

        if ctx.path(&dump_rel).is_file() {
            steps.push(drush.run(
                &format!("drop tables {}", job.database),
                &job.uri,
                &format!("sql-drop {} -y", database),
            )?);
            steps.push(drush.run(
                &format!("import {}", job.database),
                &job.uri,
                &format!("sql-cli {} < ./{}", database, dump_rel),
            )?);
        } else {
            steps.push(StepReport::skipped(
                format!("import {}", job.database),
                format!("{} not found", dump_rel),
            ));
        }

        if job.database != DEFAULT_DATABASE {
            continue;
        }
        if options.sanitize {
            steps.push(drush.run("sanitize", &job.uri, "sql-sanitize -y")?);
        }
        if options.reset_password {
            steps.push(drush.run(
                "reset admin password",
                &job.uri,
                &reset_password_args(&options.admin_user, drush_major),
            )?);
        }
        steps.push(drush.run(
            "cache rebuild",
            &job.uri,
            cache_rebuild_args(ctx.config.is_drupal7()),
        )?);
    }

    Ok(DbSyncReport {
        source,
        databases: jobs,
        steps,
    })
}

/// Pull public files dirs from `source` with rsync.
pub fn sync_files(ctx: &Context, source: Option<&str>) -> Result<FilesSyncReport> {
    lock::ensure_unlocked(&ctx.root)?;
    warn_legacy(ctx);

    let source = source_name(ctx, source);
    log_status!("sync", "Sync files from {}", source);

    let connection = match ctx.config.connection(&source) {
        Ok(conn) => conn,
        Err(_) if source == LOCAL_SOURCE => {
            return Ok(FilesSyncReport {
                source,
                transfers: Vec::new(),
                steps: vec![StepReport::skipped("rsync", "local source")],
            });
        }
        Err(e) => return Err(e),
    };

    let mut missing = Vec::new();
    if connection.user.is_none() {
        missing.push("user".to_string());
    }
    if connection.server.is_none() {
        missing.push("server".to_string());
    }
    if connection.web_dir.is_none() {
        missing.push("WebDir".to_string());
    }
    let remote_web = match &connection.web_dir {
        Some(dir) if missing.is_empty() => dir.trim_end_matches('/').to_string(),
        _ => return Err(Error::sync_remote_invalid(&source, missing)),
    };

    let client = ssh::resolve(ctx, &source)?;
    let options = ctx.config.sync_options(&source);
    let local_dir = local_dump_dir(ctx);
    let mut transfers = Vec::new();
    let mut steps = Vec::new();

    for (i, remote) in options.remote_files_dir.iter().enumerate() {
        let local = options.local_files_dir.get(i).unwrap_or(remote);
        let remote_path = format!("{}/{}/", remote_web, remote.trim_matches('/'));
        let local_path = format!("./{}{}", local_dir, local.trim_end_matches('/'));

        let args = rsync_args(&client, &remote_path, &local_path);
        let display = format!("rsync {}", shell::quote_args(&args));
        log_status!("sync", "{}", display);
        executor::run_program("rsync", &args, &ctx.root, ctx.uid, Mode::Passthrough)
            .into_result(&display, None)?;
        transfers.push(display);
        steps.push(StepReport::ran(format!("rsync {}", remote)).with_detail(local_path));
    }

    Ok(FilesSyncReport {
        source,
        transfers,
        steps,
    })
}

/// Database first, then files.
pub fn sync(ctx: &Context, source: Option<&str>) -> Result<SyncReport> {
    lock::ensure_unlocked(&ctx.root)?;
    let db = sync_db(ctx, source)?;
    let files = sync_files(ctx, source)?;
    Ok(SyncReport { db, files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::utils::template::Tokens;
    use std::fs;
    use tempfile::TempDir;

    fn config(yaml: &str) -> Config {
        config::parse(yaml, &Tokens::default()).unwrap()
    }

    #[test]
    fn single_default_database_has_short_name() {
        let cfg = config("settings: {}\n");
        let jobs = db_jobs(&cfg, &cfg.sync_options("local"));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].dump_file, ".database.sql");
        assert_eq!(jobs[0].backup_file, ".database.backup.sql");
        assert_eq!(jobs[0].uri, "default");
    }

    #[test]
    fn listed_databases_keep_their_key() {
        let cfg = config(
            "settings:\n  SyncOptions:\n    staging:\n      sync_source:\n        databases: [default]\n",
        );
        let jobs = db_jobs(&cfg, &cfg.sync_options("staging"));
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].database, "default");
        assert_eq!(jobs[0].dump_file, ".database.default.sql");
        assert_eq!(jobs[0].backup_file, ".database.backup.default.sql");

        let cfg = config(
            "settings:\n  SyncOptions:\n    staging:\n      sync_source:\n        databases: [default, legacy]\n",
        );
        let names: Vec<_> = db_jobs(&cfg, &cfg.sync_options("staging"))
            .into_iter()
            .map(|j| j.dump_file)
            .collect();
        assert_eq!(names, vec![".database.default.sql", ".database.legacy.sql"]);
    }

    #[test]
    fn multisite_jobs_follow_declaration_order() {
        let cfg = config(
            "settings:\n  MultiSite:\n    site_b: b_db\n    site_a: [default, legacy]\n",
        );
        let jobs = db_jobs(&cfg, &cfg.sync_options("local"));
        let names: Vec<_> = jobs.iter().map(|j| j.dump_file.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ".database.site_b.b_db.sql",
                ".database.site_a.default.sql",
                ".database.site_a.legacy.sql"
            ]
        );
        assert_eq!(jobs[1].backup_file, ".database.backup.site_a.default.sql");
    }

    #[test]
    fn remote_dump_command_variants() {
        let job = DbJob {
            uri: "default".to_string(),
            database: "default".to_string(),
            dump_file: ".database.sql".to_string(),
            backup_file: ".database.backup.sql".to_string(),
        };
        let mut conn = Connection {
            server: Some("example.org".to_string()),
            user: Some("deploy".to_string()),
            home_dir: Some("/home/deploy/acme".to_string()),
            web_dir: Some("/home/deploy/acme/web".to_string()),
            enable_docker: true,
            ..Connection::default()
        };

        let cmd = remote_dump_command(&conn, "drush", "phpfpm", "web", &job);
        assert!(cmd.starts_with(
            "cd /home/deploy/acme; docker exec -i $(docker-compose ps -q phpfpm) drush -l default -r /var/www/web sql-dump"
        ));
        assert!(cmd.ends_with("--structure-tables-list=cache,cache_*,history,sessions,watchdog"));

        conn.enable_docker = false;
        let cmd = remote_dump_command(&conn, "drush", "phpfpm", "web", &job);
        assert!(cmd.starts_with("cd /home/deploy/acme/web; drush -l default sql-dump --database=default"));
    }

    #[test]
    fn password_reset_depends_on_drush() {
        assert_eq!(reset_password_args("admin", 8), "upwd admin --password=admin");
        assert_eq!(reset_password_args("root", 10), "upwd root admin");
        assert_eq!(cache_rebuild_args(true), "cc all");
        assert_eq!(cache_rebuild_args(false), "cr");
    }

    #[test]
    fn drush_version_detection() {
        let dir = TempDir::new().unwrap();
        assert_eq!(drush_major_version(dir.path()), 8);

        let pkg = dir.path().join("vendor/drush/drush");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("composer.json"),
            r#"{"name": "drush/drush", "extra": {"branch-alias": {"dev-master": "10.x-dev"}}}"#,
        )
        .unwrap();
        assert_eq!(drush_major_version(dir.path()), 10);

        fs::write(pkg.join("drush.info"), "drush_version=8.4.8\n").unwrap();
        assert_eq!(drush_major_version(dir.path()), 8);
    }

    #[test]
    fn rsync_args_shape() {
        let conn = Connection {
            server: Some("example.org".to_string()),
            user: Some("deploy".to_string()),
            port: 2222,
            ..Connection::default()
        };
        let client = SshClient::from_connection("staging", &conn).unwrap();
        let args = rsync_args(&client, "/srv/web/sites/default/files/", "./web/sites/default/files");
        assert_eq!(args[0], "-razi");
        assert!(args.contains(&"ssh -p 2222".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@example.org:/srv/web/sites/default/files/");
        assert_eq!(args[args.len() - 1], "./web/sites/default/files");
    }

    #[test]
    fn unknown_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_parts(dir.path(), "staging", config("settings: {}\n"));
        let err = sync_db(&ctx, Some("nowhere")).unwrap_err();
        assert_eq!(err.code.as_str(), "sync.source_not_found");
    }

    #[test]
    fn remote_without_home_dir_is_invalid() {
        let dir = TempDir::new().unwrap();
        let cfg = config(
            "settings:\n  connections:\n    prod:\n      server: example.org\n      user: deploy\n      WebDir: /srv/web\n",
        );
        let ctx = Context::from_parts(dir.path(), "staging", cfg);
        let err = sync_db(&ctx, Some("prod")).unwrap_err();
        assert_eq!(err.code.as_str(), "sync.remote_invalid");
    }

    #[test]
    fn files_from_local_source_are_skipped() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_parts(dir.path(), "staging", config("settings: {}\n"));
        let report = sync_files(&ctx, Some("local")).unwrap();
        assert!(report.transfers.is_empty());
    }

    #[test]
    fn locked_project_refuses_sync() {
        let dir = TempDir::new().unwrap();
        let ctx = Context::from_parts(dir.path(), "staging", config("settings: {}\n"));
        crate::lock::lock(dir.path()).unwrap();
        let err = sync(&ctx, None).unwrap_err();
        assert_eq!(err.code.as_str(), "build.locked");
    }
}

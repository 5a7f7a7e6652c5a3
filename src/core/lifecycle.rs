//! Project setup from scratch and teardown.

use crate::build::{self, BuildOptions, BuildReport};
use crate::context::Context;
use crate::docker;
use crate::error::{Error, Result};
use crate::lock;
use crate::output::StepReport;
use crate::paths;
use crate::site_settings::{self, SettingsReport};
use crate::sync::{self, DbSyncReport, FilesSyncReport};
use crate::utils::io;
use serde::Serialize;
use std::os::unix::fs::PermissionsExt;

const SCRIPTS_LINK: &str = "scripts";
const SCRIPTS_TARGET: &str = "drupal_build/composer-scripts";

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub sync: bool,
    pub sync_files: bool,
    pub sync_db: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitReport {
    pub project: String,
    pub env: String,
    pub steps: Vec<StepReport>,
    pub build: BuildReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_settings: Option<SettingsReport>,
    pub extra_config: SettingsReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_db: Option<DbSyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_files: Option<FilesSyncReport>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    pub project: String,
    pub steps: Vec<StepReport>,
    pub removed: Vec<String>,
}

fn link_scripts(ctx: &Context) -> Result<Option<StepReport>> {
    let link = ctx.path(SCRIPTS_LINK);
    if std::fs::symlink_metadata(&link).is_ok() {
        return Ok(None);
    }
    std::os::unix::fs::symlink(SCRIPTS_TARGET, &link).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("symlink {}", SCRIPTS_LINK)))
    })?;
    Ok(Some(
        StepReport::ran("link scripts").with_detail(format!("{} -> {}", SCRIPTS_LINK, SCRIPTS_TARGET)),
    ))
}

/// Set up a working site: docker, build, settings, then the requested syncs.
pub fn init(ctx: &Context, opts: &InitOptions) -> Result<InitReport> {
    lock::ensure_unlocked(&ctx.root)?;
    log_status!("init", "Init {} project ({})", ctx.project_name, ctx.env);

    let mut steps = Vec::new();
    steps.extend(link_scripts(ctx)?);

    if ctx.config.docker_enabled(false) {
        let files = docker::copy_docker_files(ctx)?;
        let detail = match files.port {
            Some(port) => format!("{} copied, port {}", files.copied.len(), port),
            None => format!("{} copied", files.copied.len()),
        };
        steps.push(StepReport::ran("docker files").with_detail(detail));
        docker::up(ctx)?;
        steps.push(StepReport::ran("docker up"));
    }

    let build = build::build(ctx, &BuildOptions::default())?;

    let local_settings = if ctx.settings().create_local_settings {
        Some(site_settings::create_local_settings_for(ctx)?)
    } else {
        None
    };
    let extra_config = site_settings::enable_extra_config_for(ctx)?;

    let (sync_db, sync_files) = if opts.sync {
        let report = sync::sync(ctx, None)?;
        (Some(report.db), Some(report.files))
    } else {
        let files = if opts.sync_files {
            Some(sync::sync_files(ctx, None)?)
        } else {
            None
        };
        let db = if opts.sync_db {
            Some(sync::sync_db(ctx, None)?)
        } else {
            None
        };
        (db, files)
    };

    Ok(InitReport {
        project: ctx.project_name.clone(),
        env: ctx.env.clone(),
        steps,
        build,
        local_settings,
        extra_config,
        sync_db,
        sync_files,
    })
}

/// Drupal leaves `sites/default` read-only; removal needs it writable.
fn make_sites_default_writable(ctx: &Context) {
    let dir = ctx.web_path().join("sites/default");
    if let Ok(meta) = std::fs::metadata(&dir) {
        let mut perms = meta.permissions();
        perms.set_mode(perms.mode() | 0o200);
        let _ = std::fs::set_permissions(&dir, perms);
    }
}

/// Tear down containers and remove everything the build produced.
pub fn clean(ctx: &Context) -> Result<CleanReport> {
    lock::ensure_unlocked(&ctx.root)?;
    log_status!("clean", "Clean {} project", ctx.project_name);

    let mut steps = Vec::new();

    if docker::uses_docker_sync(ctx) {
        let output = crate::executor::run_program(
            "docker-sync",
            &["clean".to_string()],
            &ctx.root,
            ctx.uid,
            crate::executor::Mode::Passthrough,
        );
        output.into_result("docker-sync clean", None)?;
        steps.push(StepReport::ran("docker-sync clean"));
    }

    if ctx.config.docker_enabled(false) {
        docker::destroy(ctx)?;
        steps.push(StepReport::ran("docker destroy"));
    }

    make_sites_default_writable(ctx);

    let web_dir = ctx.settings().web_dir.clone();
    let targets = [
        "vendor",
        web_dir.as_str(),
        "docker-compose.yml",
        "docker-sync.yml",
        paths::CHECKSUM_FILE,
        paths::ENV_FILE,
    ];

    let mut removed = Vec::new();
    for target in targets {
        if io::remove_path(&ctx.path(target), &format!("remove {}", target))? {
            log_status!("clean", "Removed {}", target);
            removed.push(target.to_string());
        }
    }
    steps.push(StepReport::ran("remove build output").with_detail(format!("{} removed", removed.len())));

    Ok(CleanReport {
        project: ctx.project_name.clone(),
        steps,
        removed,
    })
}

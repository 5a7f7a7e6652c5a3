use serde::Serialize;

use crate::checksum::{self, CategoryState};
use crate::context::Context;
use crate::docker;
use crate::error::Result;
use crate::executor::{self, ExecOptions, ExecTarget, Role};
use crate::link;
use crate::output::StepReport;
use crate::site_settings;
use crate::theme;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub no_docker: bool,
    pub not_interactive: bool,
    pub force: bool,
}

impl BuildOptions {
    pub fn exec(&self) -> ExecOptions {
        ExecOptions {
            no_docker: self.no_docker,
            not_interactive: self.not_interactive,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub project: String,
    pub env: String,
    pub steps: Vec<StepReport>,
    pub checksums: Vec<CategoryState>,
    pub snapshot_written: bool,
}

/// `composer install` flags for the build mode.
pub fn composer_install_command(composer: &str, not_interactive: bool, dev: bool) -> String {
    let mut cmd = format!("{} install", composer);
    if not_interactive {
        cmd.push_str(" --no-interaction");
    }
    if !dev {
        cmd.push_str(" --no-dev");
    }
    cmd
}

fn in_project(ctx: &Context, target: &ExecTarget, command: &str) -> String {
    format!(
        "cd {} && {}",
        crate::utils::shell::quote_path(&executor::project_dir(ctx, target)),
        command
    )
}

/// Scaffold Drupal when `index.php` is missing, then wire extra settings.
fn drupal_init(ctx: &Context, target: &ExecTarget, steps: &mut Vec<StepReport>) -> Result<()> {
    let composer = &ctx.settings().composer_cmd;

    if !ctx.web_path().join("index.php").is_file() {
        for script in ["drupal-scaffold", "post-install-cmd"] {
            let name = format!("composer run-script {}", script);
            let command = in_project(ctx, target, &format!("{} run-script {}", composer, script));
            executor::step(ctx, target, &name, &command)?;
            steps.push(StepReport::ran(name));
        }
    } else {
        steps.push(StepReport::skipped("drupal scaffold", "index.php present"));
    }

    if ctx.web_path().join("sites/default/settings.php").is_file() {
        let report = site_settings::enable_extra_config_for(ctx)?;
        steps.push(StepReport::ran("enable extra config").with_detail(report.action));
    }
    Ok(())
}

/// Build the Drupal site: dependencies, links, extras and theme assets.
/// The checksum snapshot is written only after every step succeeded.
pub fn build(ctx: &Context, opts: &BuildOptions) -> Result<BuildReport> {
    log_status!("build", "Build {} project ({})", ctx.project_name, ctx.env);
    let exec = opts.exec();
    let mut steps = Vec::new();

    if docker::ensure_running(ctx, opts.no_docker)? {
        steps.push(StepReport::ran("docker up"));
    }

    let sites_default = ctx.web_path().join("sites/default");
    if sites_default.is_dir() {
        let command = format!(
            "chmod u+w {}",
            crate::utils::shell::quote_path(&sites_default.to_string_lossy())
        );
        executor::step(ctx, &ExecTarget::Local, "chmod sites/default", &command)?;
        steps.push(StepReport::ran("chmod sites/default"));
    }

    let theme_paths = theme::theme_paths(&ctx.root);
    let changes = checksum::evaluate(&ctx.root, &theme_paths);

    let target = executor::resolve_target(ctx, &exec, Role::Web);
    if opts.force || !changes.has_snapshot() || changes.is_changed(checksum::COMPOSER) {
        let s = ctx.settings();
        let command = in_project(
            ctx,
            &target,
            &composer_install_command(&s.composer_cmd, opts.not_interactive, s.dev_environment),
        );
        executor::step(ctx, &target, "composer install", &command)?;
        steps.push(StepReport::ran("composer install"));
        drupal_init(ctx, &target, &mut steps)?;
    } else {
        steps.push(StepReport::skipped("composer install", "composer.json unchanged"));
    }

    let links = link::link_project(ctx)?;
    steps.push(
        StepReport::ran("link directories")
            .with_detail(format!("{} created, {} existing", links.created.len(), links.existing.len())),
    );

    let extras = link::copy_drupal_extras(ctx)?;
    if extras.is_empty() {
        steps.push(StepReport::skipped("copy drupal extras", "nothing to copy"));
    } else {
        steps.push(StepReport::ran("copy drupal extras").with_detail(format!("{} files", extras.len())));
    }

    if ctx.settings().theme_build {
        steps.extend(theme::install_components(ctx, &exec, opts.force, Some(&changes))?);
        steps.extend(theme::compile(ctx, &exec)?);
    } else {
        steps.push(StepReport::disabled("theme build"));
    }

    let snapshot_written = changes.persist()?;

    Ok(BuildReport {
        project: ctx.project_name.clone(),
        env: ctx.env.clone(),
        steps,
        checksums: changes.states(),
        snapshot_written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composer_flags() {
        assert_eq!(
            composer_install_command("composer", false, true),
            "composer install"
        );
        assert_eq!(
            composer_install_command("/usr/local/bin/composer", true, false),
            "/usr/local/bin/composer install --no-interaction --no-dev"
        );
    }
}

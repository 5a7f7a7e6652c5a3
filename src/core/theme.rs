//! Theme discovery and front-end asset builds.

use crate::checksum::{self, ChangeSet};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{self, ExecOptions, ExecTarget, Mode, Role};
use crate::output::StepReport;
use crate::utils::{io, shell};
use serde::Serialize;
use std::path::Path;

/// Directory levels searched below a theme source.
const MAX_DEPTH: usize = 3;
const COLONEL_DIR: &str = "themes/contrib/colonel";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDir {
    /// Project-relative path.
    pub path: String,
    pub name: String,
}

impl ThemeDir {
    pub fn category(&self) -> String {
        checksum::theme_category(&self.path)
    }
}

/// `themes` plus every `profiles/*/themes` that exists.
pub fn theme_sources(root: &Path) -> Vec<String> {
    let mut sources = vec!["themes".to_string()];
    let pattern = root.join("profiles/*/themes");
    if let Ok(paths) = glob::glob(&pattern.to_string_lossy()) {
        let mut found: Vec<String> = paths
            .filter_map(|p| p.ok())
            .filter(|p| p.is_dir())
            .filter_map(|p| {
                p.strip_prefix(root)
                    .ok()
                    .map(|r| r.to_string_lossy().to_string())
            })
            .collect();
        found.sort();
        sources.extend(found);
    }
    sources
}

fn collect_theme_dirs(root: &Path, rel: &str, level: usize, out: &mut Vec<ThemeDir>) {
    if level >= MAX_DEPTH {
        return;
    }
    let dir = root.join(rel);
    for name in io::sorted_entries(&dir) {
        let child_rel = format!("{}/{}", rel, name);
        let child = root.join(&child_rel);
        if !child.is_dir() {
            continue;
        }
        if child.join("package.json").is_file() {
            out.push(ThemeDir {
                path: child_rel,
                name,
            });
        } else if name != "node_modules" {
            collect_theme_dirs(root, &child_rel, level + 1, out);
        }
    }
}

/// Directories under `source` that carry a `package.json`.
pub fn theme_dirs(root: &Path, source: &str) -> Vec<ThemeDir> {
    let mut out = Vec::new();
    if root.join(source).is_dir() {
        collect_theme_dirs(root, source, 0, &mut out);
    }
    out
}

/// Every theme directory across all sources.
pub fn all_theme_dirs(root: &Path) -> Vec<ThemeDir> {
    theme_sources(root)
        .iter()
        .flat_map(|source| theme_dirs(root, source))
        .collect()
}

/// Theme paths as checksum categories expect them.
pub fn theme_paths(root: &Path) -> Vec<String> {
    all_theme_dirs(root).into_iter().map(|t| t.path).collect()
}

fn in_dir(ctx: &Context, target: &ExecTarget, rel: &str, command: &str) -> String {
    let dir = format!("{}/{}", executor::project_dir(ctx, target).trim_end_matches('/'), rel);
    format!("cd {} && {}", shell::quote_path(&dir), command)
}

/// Compile command for a theme, or `None` when it has no known build tool.
pub fn compile_command(theme_dir: &Path, npm: &str, task: &str) -> Option<String> {
    if theme_dir.join("gulpfile.js").is_file() {
        Some(format!("$({} bin)/gulp {}", npm, task))
    } else if theme_dir.join("postcss.config.js").is_file() {
        Some(format!("{} run {}", npm, task))
    } else {
        None
    }
}

/// Watch command for a theme, or `None` when it has no known build tool.
pub fn watch_command(theme_dir: &Path, npm: &str) -> Option<String> {
    if theme_dir.join("gulpfile.js").is_file() {
        Some(format!("$({} bin)/gulp watch-docker", npm))
    } else if theme_dir.join("postcss.config.js").is_file() {
        Some(format!("{} run watch", npm))
    } else {
        None
    }
}

/// `npm install` in every changed theme, plus the colonel contrib theme when
/// it lacks `node_modules`. `force` installs everywhere.
pub fn install_components(
    ctx: &Context,
    opts: &ExecOptions,
    force: bool,
    changes: Option<&ChangeSet>,
) -> Result<Vec<StepReport>> {
    if !ctx.settings().theme_build {
        log_status!("theme", "Disabled theme building!");
        return Ok(vec![StepReport::disabled("theme install")]);
    }

    let target = executor::resolve_target(ctx, opts, Role::Theme);
    let npm = ctx.settings().npm_cmd.clone();
    let mut steps = Vec::new();

    for theme in all_theme_dirs(&ctx.root) {
        let step = format!("npm install ({})", theme.name);
        let changed = force || changes.is_none_or(|c| c.is_changed(&theme.category()));
        if !changed {
            steps.push(StepReport::skipped(step, "package.json unchanged"));
            continue;
        }
        let command = in_dir(ctx, &target, &theme.path, &format!("{} install", npm));
        executor::step(ctx, &target, &step, &command)?;
        steps.push(StepReport::ran(step).with_detail(theme.path));
    }

    let colonel = format!("{}/{}", ctx.settings().web_dir, COLONEL_DIR);
    let colonel_path = ctx.path(&colonel);
    if colonel_path.join("package.json").is_file()
        && (force || !colonel_path.join("node_modules").is_dir())
    {
        let step = "npm install (colonel)".to_string();
        let command = in_dir(ctx, &target, &colonel, &format!("{} install", npm));
        executor::step(ctx, &target, &step, &command)?;
        steps.push(StepReport::ran(step).with_detail(colonel));
    }

    Ok(steps)
}

/// Run the configured theme task in every theme.
pub fn compile(ctx: &Context, opts: &ExecOptions) -> Result<Vec<StepReport>> {
    if !ctx.settings().theme_build {
        log_status!("theme", "Disabled theme building!");
        return Ok(vec![StepReport::disabled("theme compile")]);
    }

    let target = executor::resolve_target(ctx, opts, Role::Theme);
    let s = ctx.settings();
    let mut steps = Vec::new();

    for theme in all_theme_dirs(&ctx.root) {
        let step = format!("compile css ({})", theme.name);
        match compile_command(&ctx.path(&theme.path), &s.npm_cmd, &s.theme_task) {
            Some(cmd) => {
                let command = in_dir(ctx, &target, &theme.path, &cmd);
                executor::step(ctx, &target, &step, &command)?;
                steps.push(StepReport::ran(step).with_detail(theme.path));
            }
            None => steps.push(StepReport::skipped(step, "no gulpfile.js or postcss.config.js")),
        }
    }

    Ok(steps)
}

/// Watch one theme's sources interactively. Returns the watcher's exit code.
pub fn watch(ctx: &Context, opts: &ExecOptions, theme: &str) -> Result<i32> {
    let found = all_theme_dirs(&ctx.root)
        .into_iter()
        .find(|t| t.name == theme)
        .ok_or_else(|| {
            Error::validation_invalid_argument(
                "theme",
                format!("Theme '{}' not found", theme),
                Some(theme.to_string()),
                Some(all_theme_dirs(&ctx.root).into_iter().map(|t| t.name).collect()),
            )
        })?;

    let cmd = watch_command(&ctx.path(&found.path), &ctx.settings().npm_cmd).ok_or_else(|| {
        Error::validation_invalid_argument(
            "theme",
            "Theme has no gulpfile.js or postcss.config.js",
            Some(theme.to_string()),
            None,
        )
    })?;

    let target = executor::resolve_target(ctx, opts, Role::Theme);
    let command = in_dir(ctx, &target, &found.path, &cmd);
    log_status!("theme", "Watch {} theme files", theme);
    Ok(executor::run(ctx, &target, &command, Mode::Interactive)?.exit_code)
}

/// `compass compile` in every `themes/*` directory with a `config.rb`.
pub fn compass(ctx: &Context, opts: &ExecOptions) -> Result<Vec<StepReport>> {
    let target = executor::resolve_target(ctx, opts, Role::Theme);
    let mut steps = Vec::new();

    for name in io::sorted_entries(&ctx.path("themes")) {
        let rel = format!("themes/{}", name);
        if !ctx.path(&rel).join("config.rb").is_file() {
            continue;
        }
        let step = format!("compass compile ({})", name);
        let command = in_dir(ctx, &target, &rel, "compass compile");
        executor::step(ctx, &target, &step, &command)?;
        steps.push(StepReport::ran(step).with_detail(rel));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "{}").unwrap();
    }

    #[test]
    fn finds_themes_and_skips_node_modules() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "themes/custom/acme/package.json");
        touch(dir.path(), "themes/custom/acme/node_modules/dep/package.json");
        touch(dir.path(), "themes/custom/node_modules/x/package.json");
        touch(dir.path(), "themes/base/package.json");

        let found = theme_dirs(dir.path(), "themes");
        assert_eq!(
            found,
            vec![
                ThemeDir {
                    path: "themes/base".to_string(),
                    name: "base".to_string()
                },
                ThemeDir {
                    path: "themes/custom/acme".to_string(),
                    name: "acme".to_string()
                },
            ]
        );
        assert_eq!(found[1].category(), "themes-custom-acme");
    }

    #[test]
    fn depth_is_limited() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "themes/a/b/c/package.json");
        touch(dir.path(), "themes/x/y/z/w/package.json");
        let found = theme_dirs(dir.path(), "themes");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "themes/a/b/c");
    }

    #[test]
    fn profile_theme_sources() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("profiles/acme/themes")).unwrap();
        fs::create_dir_all(dir.path().join("profiles/bare")).unwrap();
        assert_eq!(theme_sources(dir.path()), vec!["themes", "profiles/acme/themes"]);
    }

    #[test]
    fn compile_command_prefers_gulp() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "postcss.config.js");
        assert_eq!(
            compile_command(dir.path(), "npm", "sass-dev").as_deref(),
            Some("npm run sass-dev")
        );
        touch(dir.path(), "gulpfile.js");
        assert_eq!(
            compile_command(dir.path(), "npm", "sass-dev").as_deref(),
            Some("$(npm bin)/gulp sass-dev")
        );
        assert_eq!(
            watch_command(dir.path(), "npm").as_deref(),
            Some("$(npm bin)/gulp watch-docker")
        );
    }

    #[test]
    fn no_build_tool_means_no_command() {
        let dir = TempDir::new().unwrap();
        assert!(compile_command(dir.path(), "npm", "sass-dev").is_none());
        assert!(watch_command(dir.path(), "npm").is_none());
    }
}

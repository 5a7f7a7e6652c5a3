//! Relative symlinks from the Drupal web root into the project's custom code.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::utils::io;
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<String>,
}

impl LinkReport {
    fn merge(&mut self, other: LinkReport) {
        self.created.extend(other.created);
        self.existing.extend(other.existing);
        self.skipped_sources.extend(other.skipped_sources);
    }
}

fn depth(path: &str) -> usize {
    Path::new(path)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Link target for `<dest_base>/<source>/<name>`, relative to the link's directory.
pub fn relative_target(source: &str, dest_base: &str, name: &str) -> String {
    let ups = depth(dest_base) + depth(source);
    format!("{}{}/{}", "../".repeat(ups), source.trim_matches('/'), name)
}

/// Symlink every subdirectory of `source` to `<dest_base>/<source>/<name>`.
/// A missing source directory is skipped.
pub fn link_dirs(root: &Path, source: &str, dest_base: &str) -> Result<LinkReport> {
    let mut report = LinkReport::default();
    let source_dir = root.join(source);
    if !source_dir.is_dir() {
        report.skipped_sources.push(source.to_string());
        return Ok(report);
    }

    let dest_dir = root.join(dest_base).join(source);
    fs::create_dir_all(&dest_dir).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("create {}", dest_dir.display())))
    })?;

    for name in io::sorted_entries(&source_dir) {
        if !source_dir.join(&name).is_dir() {
            continue;
        }

        let link = dest_dir.join(&name);
        let display = format!("{}/{}/{}", dest_base, source, name);
        if fs::symlink_metadata(&link).is_ok() {
            report.existing.push(display);
            continue;
        }

        let target = relative_target(source, dest_base, &name);
        std::os::unix::fs::symlink(&target, &link).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("symlink {}", display)))
        })?;
        log_status!("link", "{} -> {}", display, target);
        report.created.push(display);
    }

    Ok(report)
}

/// Link profiles, modules, themes and libraries into the web root.
/// Drupal 7 keeps modules, themes and libraries under `sites/all`.
pub fn link_project(ctx: &Context) -> Result<LinkReport> {
    let web_dir = ctx.settings().web_dir.clone();
    let sites_all = format!("{}/sites/all", web_dir);
    let nested_base = if ctx.config.is_drupal7() {
        sites_all.as_str()
    } else {
        web_dir.as_str()
    };

    let mut report = link_dirs(&ctx.root, "profiles", &web_dir)?;
    for source in ["modules", "themes", "libraries"] {
        report.merge(link_dirs(&ctx.root, source, nested_base)?);
    }
    Ok(report)
}

fn copy_tree(from: &Path, to: &Path, copied: &mut Vec<PathBuf>) -> Result<()> {
    for name in io::sorted_entries(from) {
        let src = from.join(&name);
        let dst = to.join(&name);
        if src.is_dir() {
            fs::create_dir_all(&dst).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", dst.display())))
            })?;
            copy_tree(&src, &dst, copied)?;
        } else {
            io::copy_file(&src, &dst, &format!("copy {}", src.display()))?;
            copied.push(dst);
        }
    }
    Ok(())
}

/// Copy the `DrupalExtra` tree over the web root. Returns copied files relative to the root.
pub fn copy_drupal_extras(ctx: &Context) -> Result<Vec<String>> {
    let extra = ctx.path(&ctx.settings().drupal_extra);
    if !extra.is_dir() {
        return Ok(Vec::new());
    }

    let mut copied = Vec::new();
    copy_tree(&extra, &ctx.web_path(), &mut copied)?;
    Ok(copied
        .into_iter()
        .map(|p| {
            p.strip_prefix(&ctx.root)
                .map(|r| r.to_string_lossy().to_string())
                .unwrap_or_else(|_| p.to_string_lossy().to_string())
        })
        .collect())
}

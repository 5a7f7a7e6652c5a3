//! Pre-release checks against the local site, or a remote one over ssh.

use crate::context::Context;
use crate::docker;
use crate::error::Result;
use crate::executor::{self, ExecOptions, ExecTarget, Mode, Role};
use crate::ssh::CommandOutput;
use crate::utils::{command, io, shell};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

const CONFIG_STATES: [&str; 3] = ["Only in DB", "Only in sync dir", "Different"];
/// Drupal requirement severities: error, warning.
const SEVERITY_ERROR: u8 = 2;
const SEVERITY_WARNING: u8 = 1;
const MIN_ADVAGG_CACHE_LEVEL: i64 = 2;
const DISALLOW_ALL: &str = r"(?i)^\s*disallow:\s*/\s*$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutcome {
    pub name: String,
    pub passed: bool,
    pub messages: Vec<String>,
}

impl CheckOutcome {
    fn new(name: &str, passed: bool, messages: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            messages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub passed: bool,
    pub checks: Vec<CheckOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvaggStatus {
    Missing,
    Disabled,
    LowCacheLevel,
    Ok,
}

fn parse_json(output: &str) -> Option<Value> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn items(value: Value) -> Vec<Value> {
    match value {
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Array(list) => list,
        _ => Vec::new(),
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.replace('\n', ""),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Non-empty lines of `cst --format=list`.
pub fn config_status_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pending updates from `updbst --format=json`.
pub fn pending_updates(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let Some(value) = parse_json(trimmed) else {
        return vec![trimmed.to_string()];
    };

    items(value)
        .iter()
        .map(|item| {
            let module = text(item.get("module"));
            let id = text(item.get("update_id"));
            let description = text(item.get("description"));
            match (module.is_empty(), description.is_empty()) {
                (true, _) => id,
                (false, true) => format!("{} {}", module, id),
                (false, false) => format!("{} {}: {}", module, id, description),
            }
        })
        .collect()
}

/// `title: value` lines from `core:requirements --format=json`.
pub fn requirement_messages(output: &str) -> Vec<String> {
    parse_json(output)
        .map(items)
        .unwrap_or_default()
        .iter()
        .map(|item| {
            let title = text(item.get("title"));
            let value = text(item.get("value"));
            if value.is_empty() {
                title
            } else {
                format!("{}: {}", title, value)
            }
        })
        .collect()
}

/// `Some(enabled)` from `sget system.maintenance_mode --format=json`, `None` when unknown.
pub fn maintenance_mode(output: &str) -> Option<bool> {
    match parse_json(output)? {
        Value::Object(map) => map.get("system.maintenance_mode").map(truthy),
        scalar @ (Value::Bool(_) | Value::Number(_) | Value::String(_)) => Some(truthy(&scalar)),
        _ => None,
    }
}

/// Problems in `cget system.performance --format=json`.
pub fn performance_issues(output: &str) -> Vec<String> {
    let Some(perf) = parse_json(output) else {
        return Vec::new();
    };
    let (Some(css), Some(js)) = (perf.get("css"), perf.get("js")) else {
        return Vec::new();
    };

    let checks = [
        (css, "gzip", "CSS gzip compression is disabled."),
        (css, "preprocess", "CSS aggregation is disabled."),
        (js, "gzip", "JS gzip compress is disabled."),
        (js, "preprocess", "JS aggregation is disabled."),
    ];
    checks
        .iter()
        .filter(|(section, key, _)| section.get(*key).is_some_and(|v| !truthy(v)))
        .map(|(_, _, message)| message.to_string())
        .collect()
}

/// State of `cget advagg.settings --format=json`.
pub fn advagg_status(output: &str) -> AdvaggStatus {
    let Some(settings) = parse_json(output).filter(truthy) else {
        return AdvaggStatus::Missing;
    };
    if !settings.get("enabled").is_some_and(truthy) {
        return AdvaggStatus::Disabled;
    }
    let level = settings
        .get("cache_level")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(0);
    if level < MIN_ADVAGG_CACHE_LEVEL {
        AdvaggStatus::LowCacheLevel
    } else {
        AdvaggStatus::Ok
    }
}

/// `Disallow: /` lines in a robots.txt body, whitespace and case tolerant.
pub fn robots_blocking_lines(content: &str) -> Vec<String> {
    let Ok(re) = Regex::new(DISALLOW_ALL) else {
        return Vec::new();
    };
    content
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| re.is_match(l))
        .map(|l| l.trim().to_string())
        .collect()
}

fn extra_files(dir: &Path, prefix: &str, out: &mut Vec<String>) {
    for name in io::sorted_entries(dir) {
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        let path = dir.join(&name);
        if path.is_dir() {
            extra_files(&path, &rel, out);
        } else {
            out.push(rel);
        }
    }
}

/// Compare every `DrupalExtra` file with its copy under the web dir.
pub fn check_diff(ctx: &Context) -> Result<CheckOutcome> {
    let extra_dir = ctx.path(&ctx.settings().drupal_extra);
    let web = ctx.web_path();
    let mut files = Vec::new();
    extra_files(&extra_dir, "", &mut files);

    let mut messages = Vec::new();
    for file in &files {
        let copy = web.join(file);
        if !copy.is_file() {
            messages.push(format!("{}: missing in {}", file, ctx.settings().web_dir));
            continue;
        }
        let command = format!(
            "diff {} {}",
            shell::quote_path(&extra_dir.join(file).to_string_lossy()),
            shell::quote_path(&copy.to_string_lossy())
        );
        let output = executor::run(ctx, &ExecTarget::Local, &command, Mode::Captured)?;
        if !output.stdout.trim().is_empty() {
            messages.push(format!("{}\n{}", file, output.stdout.trim_end()));
        }
    }

    if messages.is_empty() {
        Ok(CheckOutcome::new("diff", true, Vec::new()))
    } else {
        messages.insert(0, "Extra files diff found!".to_string());
        Ok(CheckOutcome::new("diff", false, messages))
    }
}

/// A `Disallow: /` line in robots.txt fails.
pub fn check_robots(ctx: &Context) -> CheckOutcome {
    let content = std::fs::read_to_string(ctx.web_path().join("robots.txt")).unwrap_or_default();
    let blocking = robots_blocking_lines(&content);
    if blocking.is_empty() {
        CheckOutcome::new("robots", true, Vec::new())
    } else {
        CheckOutcome::new(
            "robots",
            false,
            vec![format!("{} detected in robots.txt!", blocking[0])],
        )
    }
}

struct SiteDrush<'a> {
    ctx: &'a Context,
    target: ExecTarget,
    root: String,
    multisite: bool,
}

impl<'a> SiteDrush<'a> {
    fn new(ctx: &'a Context, opts: &ExecOptions) -> Self {
        let target = executor::resolve_target(ctx, opts, Role::Web);
        let root = executor::drupal_root(ctx, &target);
        Self {
            ctx,
            target,
            root,
            multisite: ctx.config.is_multisite(),
        }
    }

    fn run(&self, uri: &str, args: &str) -> Result<CommandOutput> {
        let command = format!(
            "cd {} && {} -l {} -r {} {}",
            shell::quote_path(&executor::project_dir(self.ctx, &self.target)),
            self.ctx.settings().drush_cmd,
            uri,
            self.root,
            args
        );
        executor::run(self.ctx, &self.target, &command, Mode::Captured)
    }

    /// Captured stdout, or `None` after recording why drush failed in `failures`.
    fn query(&self, uri: &str, args: &str, failures: &mut Vec<String>) -> Result<Option<String>> {
        let output = self.run(uri, args)?;
        if output.success {
            return Ok(Some(output.stdout));
        }
        let text = command::tail_lines(&command::error_text(&output.stdout, &output.stderr), 5);
        let reason = if text.is_empty() {
            format!("exit code {}", output.exit_code)
        } else {
            text
        };
        failures.push(self.label(uri, format!("drush {} failed: {}", args, reason)));
        Ok(None)
    }

    fn label(&self, uri: &str, message: String) -> String {
        if self.multisite {
            format!("[{}] {}", uri, message)
        } else {
            message
        }
    }
}

fn check_config(drush: &SiteDrush, uris: &[String]) -> Result<CheckOutcome> {
    let mut messages = Vec::new();
    for uri in uris {
        for state in CONFIG_STATES {
            let args = format!("cst --format=list --state={}", shell::quote_path(state));
            let Some(output) = drush.query(uri, &args, &mut messages)? else {
                continue;
            };
            for line in config_status_lines(&output) {
                messages.push(drush.label(uri, format!("{}: {}", state, line)));
            }
        }
    }
    Ok(finish("config", "Config diff detected!", messages))
}

fn check_updates(drush: &SiteDrush, uris: &[String]) -> Result<CheckOutcome> {
    let mut messages = Vec::new();
    for uri in uris {
        let Some(output) = drush.query(uri, "updbst --format=json", &mut messages)? else {
            continue;
        };
        for update in pending_updates(&output) {
            messages.push(drush.label(uri, update));
        }
    }
    Ok(finish("updb", "Pending database updates found!", messages))
}

fn check_status(drush: &SiteDrush, uris: &[String]) -> Result<CheckOutcome> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for uri in uris {
        for severity in [SEVERITY_ERROR, SEVERITY_WARNING] {
            let args = format!("core:requirements --severity={} --format=json", severity);
            let Some(output) = drush.query(uri, &args, &mut errors)? else {
                continue;
            };
            let bucket = if severity == SEVERITY_ERROR {
                &mut errors
            } else {
                &mut warnings
            };
            for message in requirement_messages(&output) {
                bucket.push(drush.label(uri, message));
            }
        }
    }

    let passed = errors.is_empty();
    let mut messages = Vec::new();
    if !passed {
        messages.push("Drupal status error found!".to_string());
        messages.extend(errors.into_iter().map(|m| format!("Error: {}", m)));
    }
    messages.extend(warnings.into_iter().map(|m| format!("Warning: {}", m)));
    Ok(CheckOutcome::new("status", passed, messages))
}

fn check_maintenance(drush: &SiteDrush, uris: &[String]) -> Result<CheckOutcome> {
    let mut messages = Vec::new();
    for uri in uris {
        let Some(output) =
            drush.query(uri, "sget system.maintenance_mode --format=json", &mut messages)?
        else {
            continue;
        };
        match maintenance_mode(&output) {
            Some(false) => {}
            Some(true) => messages.push(drush.label(uri, "Maintenance mode enabled!".to_string())),
            None => messages.push(drush.label(
                uri,
                "Maintenance mode information not found!".to_string(),
            )),
        }
    }
    let passed = messages.is_empty();
    Ok(CheckOutcome::new("maintenance", passed, messages))
}

fn check_cache(drush: &SiteDrush, uris: &[String]) -> Result<CheckOutcome> {
    let mut messages = Vec::new();
    let mut passed = true;
    for uri in uris {
        let mut failures = Vec::new();
        if let Some(output) =
            drush.query(uri, "cget system.performance --format=json", &mut failures)?
        {
            for issue in performance_issues(&output) {
                failures.push(drush.label(uri, issue));
            }
        }
        if !failures.is_empty() {
            passed = false;
            messages.append(&mut failures);
        }

        // cget fails when advagg is not installed.
        let advagg = drush.run(uri, "cget advagg.settings --format=json")?;
        let advagg = if advagg.success {
            advagg_status(&advagg.stdout)
        } else {
            AdvaggStatus::Missing
        };
        let message = match advagg {
            AdvaggStatus::Ok => continue,
            AdvaggStatus::Missing => "Advanced Aggregation module is disabled.",
            AdvaggStatus::Disabled => "Advanced Aggregation is disabled.",
            AdvaggStatus::LowCacheLevel => "Cache level to low!",
        };
        if advagg != AdvaggStatus::Missing {
            passed = false;
        }
        messages.push(drush.label(uri, message.to_string()));
    }
    Ok(CheckOutcome::new("cache", passed, messages))
}

fn finish(name: &str, headline: &str, mut messages: Vec<String>) -> CheckOutcome {
    if messages.is_empty() {
        return CheckOutcome::new(name, true, messages);
    }
    messages.insert(0, headline.to_string());
    CheckOutcome::new(name, false, messages)
}

/// Run `./d2build checklist` in the remote project dir.
pub fn run_remote(ctx: &Context, source: &str) -> Result<ChecklistReport> {
    let target = executor::remote_target(ctx, source)?;
    let command = format!("cd {}; ./d2build checklist", executor::project_dir(ctx, &target));
    log_status!(
        "checklist",
        "{}: {}",
        target.account().unwrap_or_default(),
        command
    );

    let output = executor::run(ctx, &target, &command, Mode::Passthrough)?;
    let messages = if output.success {
        Vec::new()
    } else {
        vec![format!("Remote checklist exited with {}", output.exit_code)]
    };
    Ok(ChecklistReport {
        remote: Some(source.to_string()),
        passed: output.success,
        checks: vec![CheckOutcome::new("remote", output.success, messages)],
    })
}

/// Run every local check in order, or the remote checklist for `remote`.
pub fn run(ctx: &Context, remote: Option<&str>, opts: &ExecOptions) -> Result<ChecklistReport> {
    if let Some(source) = remote.filter(|s| !s.is_empty()) {
        return run_remote(ctx, source);
    }

    docker::ensure_running(ctx, opts.no_docker)?;
    let drush = SiteDrush::new(ctx, opts);
    let uris = ctx.config.site_uris();

    let checks = vec![
        check_diff(ctx)?,
        check_config(&drush, &uris)?,
        check_updates(&drush, &uris)?,
        check_status(&drush, &uris)?,
        check_robots(ctx),
        check_maintenance(&drush, &uris)?,
        check_cache(&drush, &uris)?,
    ];

    for check in &checks {
        let state = if check.passed { "ok" } else { "failed" };
        log_status!("checklist", "{}: {}", check.name, state);
    }

    Ok(ChecklistReport {
        remote: None,
        passed: checks.iter().all(|c| c.passed),
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_updates_from_json_map() {
        let json = r#"{"system_update_8901": {"module": "system", "update_id": "8901", "description": "Update the stored schema"}}"#;
        assert_eq!(pending_updates(json), vec!["system 8901: Update the stored schema"]);
        assert!(pending_updates("").is_empty());
        assert!(pending_updates("[]").is_empty());
    }

    #[test]
    fn requirement_lines() {
        let json = r#"{"cron": {"title": "Cron maintenance tasks", "value": "Last run 3 weeks ago\n", "severity": "Warning"}}"#;
        assert_eq!(requirement_messages(json), vec!["Cron maintenance tasks: Last run 3 weeks ago"]);
        assert!(requirement_messages("[]").is_empty());
    }

    #[test]
    fn maintenance_mode_shapes() {
        assert_eq!(maintenance_mode(r#"{"system.maintenance_mode": 0}"#), Some(false));
        assert_eq!(maintenance_mode(r#"{"system.maintenance_mode": true}"#), Some(true));
        assert_eq!(maintenance_mode("1"), Some(true));
        assert_eq!(maintenance_mode(""), None);
        assert_eq!(maintenance_mode("{}"), None);
    }

    #[test]
    fn performance_flags() {
        let json = r#"{"css": {"preprocess": false, "gzip": true}, "js": {"preprocess": true, "gzip": false}}"#;
        assert_eq!(
            performance_issues(json),
            vec!["CSS aggregation is disabled.", "JS gzip compress is disabled."]
        );
        assert!(performance_issues(r#"{"cache": {}}"#).is_empty());
    }

    #[test]
    fn advagg_states() {
        assert_eq!(advagg_status(""), AdvaggStatus::Missing);
        assert_eq!(advagg_status(r#"{"enabled": false}"#), AdvaggStatus::Disabled);
        assert_eq!(advagg_status(r#"{"enabled": true, "cache_level": 1}"#), AdvaggStatus::LowCacheLevel);
        assert_eq!(advagg_status(r#"{"enabled": true, "cache_level": 3}"#), AdvaggStatus::Ok);
    }

    #[test]
    fn robots_detection_only_matches_root_disallow() {
        assert_eq!(robots_blocking_lines("User-agent: *\nDisallow: /\n"), vec!["Disallow: /"]);
        assert!(robots_blocking_lines("User-agent: *\nDisallow: /admin/\n").is_empty());
        assert_eq!(robots_blocking_lines("disallow:/\r\n"), vec!["disallow:/"]);
    }

    #[test]
    fn config_lines_skip_blanks() {
        assert_eq!(config_status_lines("\nsystem.site\n  \n"), vec!["system.site"]);
    }

    fn local_site(dir: &Path, drush_cmd: &str) -> Context {
        let yaml = format!("settings:\n  DrushCmd: \"{}\"\n", drush_cmd);
        let config = crate::config::parse(&yaml, &crate::utils::template::Tokens::default()).unwrap();
        Context::from_parts(dir, "staging", config)
    }

    #[test]
    fn failing_drush_fails_every_drush_check() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = local_site(dir.path(), "false");
        let drush = SiteDrush::new(&ctx, &ExecOptions::default());
        let uris = ctx.config.site_uris();

        let checks = [
            check_config(&drush, &uris).unwrap(),
            check_updates(&drush, &uris).unwrap(),
            check_status(&drush, &uris).unwrap(),
            check_maintenance(&drush, &uris).unwrap(),
            check_cache(&drush, &uris).unwrap(),
        ];
        for check in &checks {
            assert!(!check.passed, "{} passed with a failing drush", check.name);
            assert!(
                check.messages.iter().any(|m| m.contains("failed")),
                "{} messages: {:?}",
                check.name,
                check.messages
            );
        }
    }

    #[test]
    fn remote_checklist_runs_in_home_dir() {
        use std::os::unix::fs::PermissionsExt;

        let home = tempfile::TempDir::new().unwrap();
        let script = home.path().join("d2build");
        std::fs::write(&script, "#!/bin/sh\n[ \"$1\" = checklist ] && [ -f ready ]\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let yaml = format!(
            "settings:\n  connections:\n    prod:\n      server: 127.0.0.1\n      HomeDir: {}\n",
            home.path().display()
        );
        let config = crate::config::parse(&yaml, &crate::utils::template::Tokens::default()).unwrap();
        let project = tempfile::TempDir::new().unwrap();
        let ctx = Context::from_parts(project.path(), "staging", config);

        let report = run(&ctx, Some("prod"), &ExecOptions::default()).unwrap();
        assert_eq!(report.remote.as_deref(), Some("prod"));
        assert!(!report.passed);
        assert_eq!(report.checks[0].messages, vec!["Remote checklist exited with 1"]);

        std::fs::write(home.path().join("ready"), "").unwrap();
        let report = run(&ctx, Some("prod"), &ExecOptions::default()).unwrap();
        assert!(report.passed);
        assert!(report.checks[0].messages.is_empty());
    }

    #[test]
    fn quiet_drush_passes_drush_checks() {
        let dir = tempfile::TempDir::new().unwrap();
        let ctx = local_site(dir.path(), "true");
        let drush = SiteDrush::new(&ctx, &ExecOptions::default());
        let uris = ctx.config.site_uris();

        assert!(check_config(&drush, &uris).unwrap().passed);
        assert!(check_updates(&drush, &uris).unwrap().passed);
        assert!(check_status(&drush, &uris).unwrap().passed);

        let cache = check_cache(&drush, &uris).unwrap();
        assert!(cache.passed);
        assert_eq!(cache.messages, vec!["Advanced Aggregation module is disabled."]);
    }
}

//! Local and extra settings files for the default Drupal site.

use crate::config::SqlServer;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::utils::io;
use serde::Serialize;
use std::path::Path;

const SITE: &str = "default";

const COMMENTED_LOCAL_INCLUDE: &str = "# if (file_exists($app_root . '/' . $site_path . '/settings.local.php')) {
#   include $app_root . '/' . $site_path . '/settings.local.php';
# }";

const EXTRA_AND_LOCAL_INCLUDE: &str = "if (file_exists($app_root . '/' . $site_path . '/settings.extra.php')) {
  include $app_root . '/' . $site_path . '/settings.extra.php';
}
if (file_exists($app_root . '/' . $site_path . '/settings.local.php')) {
  include $app_root . '/' . $site_path . '/settings.local.php';
}";

/// Cache bins switched to the null backend in local settings.
const NULL_CACHE_BINS: [&str; 2] = ["render", "dynamic_page_cache"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsReport {
    pub file: String,
    pub action: String,
    pub database: bool,
}

fn null_cache_line(bin: &str) -> String {
    format!("$settings['cache']['bins']['{}'] = 'cache.backend.null'", bin)
}

/// PHP block defining `$databases['default']['default']`.
pub fn database_block(sql: &SqlServer) -> String {
    let lines = [
        String::new(),
        "/**".to_string(),
        " * Database config.".to_string(),
        " */".to_string(),
        "$databases['default']['default'] = array (".to_string(),
        format!("  'database' => '{}',", sql.database),
        format!("  'username' => '{}',", sql.username),
        format!("  'password' => '{}',", sql.password),
        format!("  'prefix' => '{}',", sql.prefix),
        format!("  'host' => '{}',", sql.host),
        format!("  'port' => '{}',", sql.port),
        "  'namespace' => 'Drupal\\Core\\Database\\Driver\\mysql',".to_string(),
        "  'driver' => 'mysql',".to_string(),
        ");".to_string(),
        String::new(),
    ];
    lines.join("\n")
}

/// Uncomment the null-backend lines of `example.settings.local.php`.
pub fn enable_null_cache_bins(content: &str) -> String {
    NULL_CACHE_BINS.iter().fold(content.to_string(), |acc, bin| {
        let line = null_cache_line(bin);
        acc.replace(&format!("# {}", line), &line)
    })
}

fn touch(path: &Path) -> Result<()> {
    if !path.exists() {
        io::write_file(path, "", &format!("create {}", path.display()))?;
    }
    Ok(())
}

/// Create `sites/default/settings.local.php` under `web`.
///
/// With an example file present the example is copied (touched only on
/// `master`); Drupal 7 gets a bare `<?php` file. A configured dev SQL
/// server is appended in both cases.
pub fn create_local_settings(
    web: &Path,
    web_dir: &str,
    env: &str,
    drupal7: bool,
    sql: Option<&SqlServer>,
) -> Result<SettingsReport> {
    let example = web.join("sites/example.settings.local.php");
    let local = web.join("sites").join(SITE).join("settings.local.php");

    let action = if example.is_file() {
        if env == "master" {
            touch(&local)?;
            "touched"
        } else {
            io::remove_path(&local, "remove settings.local.php")?;
            let content = io::read_file(&example, "read example.settings.local.php")?;
            io::write_file(
                &local,
                &enable_null_cache_bins(&content),
                "write settings.local.php",
            )?;
            "copied"
        }
    } else if drupal7 {
        touch(&local)?;
        io::append_file(&local, "<?php \n", "write settings.local.php")?;
        "created"
    } else {
        return Err(Error::site_settings_template_missing(format!(
            "{}/sites/example.settings.local.php",
            web_dir
        )));
    };

    if let Some(sql) = sql {
        io::append_file(&local, &database_block(sql), "append database settings")?;
    }

    log_status!("settings", "Local settings {}", action);
    Ok(SettingsReport {
        file: format!("{}/sites/{}/settings.local.php", web_dir, SITE),
        action: action.to_string(),
        database: sql.is_some(),
    })
}

fn drupal7_includes() -> String {
    format!(
        "\nif (file_exists('sites/{site}/settings.extra.php')) {{\n  include 'sites/{site}/settings.extra.php';\n}}\nif (file_exists('sites/{site}/settings.local.php')) {{\n  include 'sites/{site}/settings.local.php';\n}}\n",
        site = SITE
    )
}

/// Make `settings.php` include `settings.extra.php` and `settings.local.php`.
/// Running it twice leaves the file unchanged.
pub fn enable_extra_config(web: &Path, web_dir: &str, drupal7: bool) -> Result<SettingsReport> {
    let site_dir = web.join("sites").join(SITE);
    let settings = site_dir.join("settings.php");
    let default_settings = site_dir.join("default.settings.php");
    let file = format!("{}/sites/{}/settings.php", web_dir, SITE);

    if !settings.is_file() && default_settings.is_file() {
        io::copy_file(&default_settings, &settings, "copy default.settings.php")?;
    }

    if !settings.is_file() {
        return Ok(SettingsReport {
            file,
            action: "missing".to_string(),
            database: false,
        });
    }

    let content = io::read_file(&settings, "read settings.php")?;
    let action = if content.contains("settings.extra.php") {
        "unchanged"
    } else if drupal7 {
        io::append_file(&settings, &drupal7_includes(), "append settings.php")?;
        "appended"
    } else if content.contains(COMMENTED_LOCAL_INCLUDE) {
        io::write_file(
            &settings,
            &content.replace(COMMENTED_LOCAL_INCLUDE, EXTRA_AND_LOCAL_INCLUDE),
            "write settings.php",
        )?;
        "enabled"
    } else {
        "unchanged"
    };

    Ok(SettingsReport {
        file,
        action: action.to_string(),
        database: false,
    })
}

pub fn create_local_settings_for(ctx: &Context) -> Result<SettingsReport> {
    let s = ctx.settings();
    create_local_settings(
        &ctx.web_path(),
        &s.web_dir,
        &ctx.env,
        ctx.config.is_drupal7(),
        s.dev_sql_server.as_ref(),
    )
}

pub fn enable_extra_config_for(ctx: &Context) -> Result<SettingsReport> {
    enable_extra_config(
        &ctx.web_path(),
        &ctx.settings().web_dir,
        ctx.config.is_drupal7(),
    )
}

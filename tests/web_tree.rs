use d2build::config::SqlServer;
use d2build::link;
use d2build::site_settings;
use d2build::theme;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn mkdirs(root: &Path, dirs: &[&str]) {
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
}

#[test]
fn link_dirs_creates_relative_links_once() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["modules/custom", "modules/contrib", "web"]);
    fs::write(dir.path().join("modules/README.txt"), "").unwrap();

    let report = link::link_dirs(dir.path(), "modules", "web").unwrap();
    assert_eq!(report.created, vec!["web/modules/contrib", "web/modules/custom"]);

    let link = dir.path().join("web/modules/custom");
    assert_eq!(fs::read_link(&link).unwrap(), Path::new("../../modules/custom"));
    assert!(link.is_dir());

    let again = link::link_dirs(dir.path(), "modules", "web").unwrap();
    assert!(again.created.is_empty());
    assert_eq!(again.existing.len(), 2);
}

#[test]
fn link_dirs_skips_missing_source() {
    let dir = TempDir::new().unwrap();
    let report = link::link_dirs(dir.path(), "libraries", "web/sites/all").unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.skipped_sources, vec!["libraries"]);
    assert!(!dir.path().join("web").exists());
}

#[test]
fn nested_dest_base_climbs_out_of_sites_all() {
    assert_eq!(
        link::relative_target("themes", "web/sites/all", "custom"),
        "../../../../themes/custom"
    );
}

const EXAMPLE_LOCAL: &str = "<?php
# $settings['cache']['bins']['render'] = 'cache.backend.null';
# $settings['cache']['bins']['dynamic_page_cache'] = 'cache.backend.null';
";

#[test]
fn local_settings_copy_example_and_append_database() {
    let dir = TempDir::new().unwrap();
    let web = dir.path().join("web");
    mkdirs(&web, &["sites/default"]);
    fs::write(web.join("sites/example.settings.local.php"), EXAMPLE_LOCAL).unwrap();

    let sql = SqlServer {
        database: "acme".into(),
        username: "root".into(),
        password: "secret".into(),
        host: "mysql".into(),
        ..SqlServer::default()
    };
    let report =
        site_settings::create_local_settings(&web, "web", "staging", false, Some(&sql)).unwrap();

    assert_eq!(report.action, "copied");
    assert!(report.database);
    let content = fs::read_to_string(web.join("sites/default/settings.local.php")).unwrap();
    assert!(content.contains("\n$settings['cache']['bins']['render'] = 'cache.backend.null';"));
    assert!(!content.contains("# $settings['cache']['bins']['dynamic_page_cache']"));
    assert!(content.contains("$databases['default']['default']"));
    assert!(content.contains("'acme'"));
}

#[test]
fn local_settings_on_master_only_touch() {
    let dir = TempDir::new().unwrap();
    let web = dir.path().join("web");
    mkdirs(&web, &["sites/default"]);
    fs::write(web.join("sites/example.settings.local.php"), EXAMPLE_LOCAL).unwrap();

    let report = site_settings::create_local_settings(&web, "web", "master", false, None).unwrap();
    assert_eq!(report.action, "touched");
    assert_eq!(
        fs::read_to_string(web.join("sites/default/settings.local.php")).unwrap(),
        ""
    );
}

#[test]
fn local_settings_without_template_fails_on_drupal8() {
    let dir = TempDir::new().unwrap();
    let web = dir.path().join("web");
    mkdirs(&web, &["sites/default"]);

    let err = site_settings::create_local_settings(&web, "web", "staging", false, None).unwrap_err();
    assert_eq!(err.code.as_str(), "site.settings_template_missing");

    let report = site_settings::create_local_settings(&web, "web", "staging", true, None).unwrap();
    assert_eq!(report.action, "created");
}

#[test]
fn extra_config_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let web = dir.path().join("web");
    mkdirs(&web, &["sites/default"]);
    fs::write(
        web.join("sites/default/default.settings.php"),
        "<?php\n# if (file_exists($app_root . '/' . $site_path . '/settings.local.php')) {\n#   include $app_root . '/' . $site_path . '/settings.local.php';\n# }\n",
    )
    .unwrap();

    let first = site_settings::enable_extra_config(&web, "web", false).unwrap();
    assert_eq!(first.action, "enabled");
    let content = fs::read_to_string(web.join("sites/default/settings.php")).unwrap();
    assert!(content.contains("/settings.extra.php';"));
    assert!(!content.contains("# if (file_exists"));

    let second = site_settings::enable_extra_config(&web, "web", false).unwrap();
    assert_eq!(second.action, "unchanged");
    assert_eq!(
        fs::read_to_string(web.join("sites/default/settings.php")).unwrap(),
        content
    );
}

#[test]
fn drupal7_extra_config_appends_includes() {
    let dir = TempDir::new().unwrap();
    let web = dir.path().join("web");
    mkdirs(&web, &["sites/default"]);
    fs::write(web.join("sites/default/settings.php"), "<?php\n").unwrap();

    let report = site_settings::enable_extra_config(&web, "web", true).unwrap();
    assert_eq!(report.action, "appended");
    let content = fs::read_to_string(web.join("sites/default/settings.php")).unwrap();
    assert!(content.contains("include 'sites/default/settings.extra.php';"));
    assert!(content.contains("include 'sites/default/settings.local.php';"));
}

#[test]
fn theme_discovery_covers_profiles_and_skips_node_modules() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    for theme in [
        "themes/custom/acme",
        "profiles/corp/themes/corporate",
        "themes/node_modules/pkg",
    ] {
        mkdirs(root, &[theme]);
        fs::write(root.join(theme).join("package.json"), "{}").unwrap();
    }
    mkdirs(root, &["themes/custom/plain"]);

    assert_eq!(
        theme::theme_sources(root),
        vec!["themes", "profiles/corp/themes"]
    );

    let names: Vec<String> = theme::all_theme_dirs(root).into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["acme", "corporate"]);
    assert_eq!(
        theme::theme_paths(root),
        vec!["themes/custom/acme", "profiles/corp/themes/corporate"]
    );
}

#[test]
fn theme_build_tool_detection() {
    let dir = TempDir::new().unwrap();
    let gulp = dir.path().join("gulp");
    let postcss = dir.path().join("postcss");
    mkdirs(dir.path(), &["gulp", "postcss", "none"]);
    fs::write(gulp.join("gulpfile.js"), "").unwrap();
    fs::write(postcss.join("postcss.config.js"), "").unwrap();

    assert_eq!(
        theme::compile_command(&gulp, "npm", "build").as_deref(),
        Some("$(npm bin)/gulp build")
    );
    assert_eq!(
        theme::compile_command(&postcss, "npm", "build").as_deref(),
        Some("npm run build")
    );
    assert_eq!(theme::watch_command(&postcss, "npm").as_deref(), Some("npm run watch"));
    assert!(theme::compile_command(&dir.path().join("none"), "npm", "build").is_none());
}

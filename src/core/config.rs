//! Project configuration.
//!
//! `d2build.yml` is read as YAML into a `serde_json::Value`, the
//! `d2build.<env>.yml` overlay is deep-merged over it, legacy keys are
//! migrated, tokens are expanded and defaults are filled in. Only then is
//! the `settings:` map deserialized into typed structs.

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use crate::utils::template::Tokens;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Keys of the deprecated `SyncServer` block that describe the host.
const LEGACY_CONNECTION_KEYS: [&str; 6] =
    ["server", "user", "port", "HomeDir", "WebDir", "EnableDocker"];

const DEFAULT_CONTAINER: &str = "phpfpm";
const DEFAULT_SYNC_SOURCE: &str = "staging";
pub const LOCAL_SOURCE: &str = "local";

#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    /// Files that contributed to this config, base first.
    pub files: Vec<PathBuf>,
    /// True when the deprecated `SyncServer` block was present.
    pub legacy_sync_server: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "WebDir", default = "default_web_dir", deserialize_with = "de::string")]
    pub web_dir: String,
    #[serde(rename = "AppDir", default = "default_app_dir", deserialize_with = "de::string")]
    pub app_dir: String,
    #[serde(rename = "Drupal", default = "default_drupal", deserialize_with = "de::string")]
    pub drupal: String,
    #[serde(
        rename = "ComposerCmd",
        default = "default_composer_cmd",
        deserialize_with = "de::string"
    )]
    pub composer_cmd: String,
    #[serde(rename = "NpmCmd", default = "default_npm_cmd", deserialize_with = "de::string")]
    pub npm_cmd: String,
    #[serde(rename = "DrushCmd", default = "default_drush_cmd", deserialize_with = "de::string")]
    pub drush_cmd: String,
    #[serde(rename = "ThemeBuild", default = "default_true", deserialize_with = "de::flag")]
    pub theme_build: bool,
    #[serde(rename = "ThemeTask", default = "default_theme_task", deserialize_with = "de::string")]
    pub theme_task: String,
    #[serde(rename = "MultiSite", default, deserialize_with = "de::multisite")]
    pub multi_site: Vec<Site>,
    #[serde(
        rename = "DrupalExtra",
        default = "default_drupal_extra",
        deserialize_with = "de::string"
    )]
    pub drupal_extra: String,
    #[serde(rename = "EnableDocker", default, deserialize_with = "de::flag")]
    pub enable_docker: bool,
    #[serde(default)]
    pub docker: Option<DockerSettings>,
    #[serde(rename = "DevEnvironment", default, deserialize_with = "de::flag")]
    pub dev_environment: bool,
    #[serde(rename = "CreateLocalSettings", default, deserialize_with = "de::flag")]
    pub create_local_settings: bool,
    #[serde(rename = "DevSqlServer", default)]
    pub dev_sql_server: Option<SqlServer>,
    #[serde(
        rename = "SyncDefaultSource",
        default = "default_sync_source",
        deserialize_with = "de::string"
    )]
    pub sync_default_source: String,
    #[serde(default)]
    pub connections: BTreeMap<String, Connection>,
    #[serde(rename = "SyncOptions", default)]
    pub sync_options: BTreeMap<String, SyncOptions>,
    #[serde(default, deserialize_with = "de::ordered")]
    pub deploy: Vec<(String, DeployTarget)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DockerSettings {
    #[serde(rename = "webContainer", default = "default_container", deserialize_with = "de::string")]
    pub web_container: String,
    #[serde(
        rename = "themeContainer",
        default = "default_container",
        deserialize_with = "de::string"
    )]
    pub theme_container: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqlServer {
    #[serde(default, deserialize_with = "de::string")]
    pub database: String,
    #[serde(default, deserialize_with = "de::string")]
    pub username: String,
    #[serde(default, deserialize_with = "de::string")]
    pub password: String,
    #[serde(default, deserialize_with = "de::string")]
    pub prefix: String,
    #[serde(default, deserialize_with = "de::string")]
    pub host: String,
    #[serde(default, deserialize_with = "de::string")]
    pub port: String,
}

/// A named remote host used by sync, deploy and the remote checklist.
#[derive(Debug, Clone, Deserialize)]
pub struct Connection {
    #[serde(default, deserialize_with = "de::opt_string")]
    pub server: Option<String>,
    #[serde(default, deserialize_with = "de::opt_string")]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port", deserialize_with = "de::port")]
    pub port: u16,
    #[serde(rename = "HomeDir", default, deserialize_with = "de::opt_string")]
    pub home_dir: Option<String>,
    #[serde(rename = "WebDir", default, deserialize_with = "de::opt_string")]
    pub web_dir: Option<String>,
    #[serde(rename = "AppDir", default = "default_app_dir", deserialize_with = "de::string")]
    pub app_dir: String,
    #[serde(rename = "EnableDocker", default, deserialize_with = "de::flag")]
    pub enable_docker: bool,
    #[serde(default = "default_ctype", deserialize_with = "de::string")]
    pub ctype: String,
    #[serde(rename = "identityFile", default, deserialize_with = "de::opt_string")]
    pub identity_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncOptions {
    #[serde(
        rename = "remoteFilesDir",
        default = "default_files_dirs",
        deserialize_with = "de::string_list"
    )]
    pub remote_files_dir: Vec<String>,
    #[serde(
        rename = "localFilesDir",
        default = "default_files_dirs",
        deserialize_with = "de::string_list"
    )]
    pub local_files_dir: Vec<String>,
    #[serde(rename = "adminUser", default = "default_admin_user", deserialize_with = "de::string")]
    pub admin_user: String,
    #[serde(default = "default_true", deserialize_with = "de::flag")]
    pub sanitize: bool,
    #[serde(rename = "resetPassword", default = "default_true", deserialize_with = "de::flag")]
    pub reset_password: bool,
    #[serde(default)]
    pub sync_source: SyncSource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncSource {
    /// `None` when the source does not list its databases.
    #[serde(default, deserialize_with = "de::opt_string_list")]
    pub databases: Option<Vec<String>>,
}

impl SyncSource {
    /// Listed databases, or just `default`.
    pub fn databases(&self) -> Vec<String> {
        self.databases.clone().unwrap_or_else(default_databases)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployTarget {
    #[serde(default = "default_deploy_strategy", deserialize_with = "de::string")]
    pub deploy: String,
    #[serde(default, deserialize_with = "de::string_list")]
    pub sync_dirs: Vec<String>,
}

/// One Drupal site directory and the database keys it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub dir: String,
    pub databases: Vec<String>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            server: None,
            user: None,
            port: default_ssh_port(),
            home_dir: None,
            web_dir: None,
            app_dir: default_app_dir(),
            enable_docker: false,
            ctype: default_ctype(),
            identity_file: None,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            remote_files_dir: default_files_dirs(),
            local_files_dir: default_files_dirs(),
            admin_user: default_admin_user(),
            sanitize: true,
            reset_password: true,
            sync_source: SyncSource::default(),
        }
    }
}

fn default_web_dir() -> String {
    "web".to_string()
}

fn default_app_dir() -> String {
    "/var/www".to_string()
}

fn default_drupal() -> String {
    "8".to_string()
}

fn default_composer_cmd() -> String {
    "/usr/local/bin/composer".to_string()
}

fn default_npm_cmd() -> String {
    "npm".to_string()
}

fn default_drush_cmd() -> String {
    "drush".to_string()
}

fn default_theme_task() -> String {
    "sass-dev".to_string()
}

fn default_drupal_extra() -> String {
    "drupal_extra".to_string()
}

fn default_sync_source() -> String {
    DEFAULT_SYNC_SOURCE.to_string()
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ctype() -> String {
    "ssh".to_string()
}

fn default_files_dirs() -> Vec<String> {
    vec!["sites/default/files".to_string()]
}

fn default_admin_user() -> String {
    "admin".to_string()
}

fn default_databases() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_deploy_strategy() -> String {
    "robo".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Loading
// ============================================================================

/// Load `d2build.yml` from `root`, overlaying `d2build.<env>.yml` when present.
pub fn load(root: &Path, tokens: &Tokens) -> Result<Config> {
    let base_path = root.join(paths::CONFIG_FILE);
    if !base_path.is_file() {
        return Err(Error::config_missing_file(
            base_path.to_string_lossy().to_string(),
        ));
    }

    let mut raw = read_yaml(&base_path)?;
    let mut files = vec![base_path];

    if !tokens.env.is_empty() {
        let overlay_path = root.join(paths::env_config_file(&tokens.env));
        if overlay_path.is_file() {
            let overlay = read_yaml(&overlay_path)?;
            deep_merge(&mut raw, overlay);
            files.push(overlay_path);
        }
    }

    resolve(raw, tokens, files)
}

/// Parse a single YAML document into a resolved config.
pub fn parse(yaml: &str, tokens: &Tokens) -> Result<Config> {
    let raw: Value =
        serde_yml::from_str(yaml).map_err(|e| Error::config_invalid_yaml("<inline>", e))?;
    resolve(raw, tokens, Vec::new())
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = io::read_file(path, &format!("read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_yml::from_str(&content)
        .map_err(|e| Error::config_invalid_yaml(path.to_string_lossy().to_string(), e))
}

fn resolve(raw: Value, tokens: &Tokens, files: Vec<PathBuf>) -> Result<Config> {
    let mut settings = match raw {
        Value::Object(mut root) => root.remove("settings").unwrap_or(Value::Null),
        Value::Null => Value::Null,
        _ => {
            return Err(Error::config_invalid_value(
                "settings",
                None,
                "configuration root must be a mapping",
            ))
        }
    };
    if settings.is_null() {
        settings = Value::Object(Map::new());
    }
    strip_nulls(&mut settings);

    let obj = settings.as_object_mut().ok_or_else(|| {
        Error::config_invalid_value("settings", None, "settings must be a mapping")
    })?;

    let legacy_sync_server = migrate_legacy_sync_server(obj);
    expand_tokens(obj, tokens);
    apply_defaults(obj);

    let settings: Settings = serde_json::from_value(settings)
        .map_err(|e| Error::config_invalid_value("settings", None, e.to_string()))?;

    Ok(Config {
        settings,
        files,
        legacy_sync_server,
    })
}

/// Objects merge key by key; everything else in the overlay replaces the base.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_obj), Value::Object(overlay_obj)) => {
            for (key, value) in overlay_obj {
                deep_merge(base_obj.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn strip_nulls(value: &mut Value) {
    if let Value::Object(obj) = value {
        obj.retain(|_, v| !v.is_null());
        for v in obj.values_mut() {
            strip_nulls(v);
        }
    }
}

/// Split a legacy `SyncServer` block into `connections.<source>` and
/// `SyncOptions.<source>`. Returns whether the legacy block was present.
fn migrate_legacy_sync_server(obj: &mut Map<String, Value>) -> bool {
    let legacy = match obj.get("SyncServer") {
        Some(Value::Object(legacy)) => legacy.clone(),
        Some(_) => return true,
        None => return false,
    };
    if obj.contains_key("SyncOptions") {
        return true;
    }

    let source = obj
        .get("SyncDefaultSource")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SYNC_SOURCE)
        .to_string();

    let mut connection = Map::new();
    let mut options = Map::new();
    for (key, value) in legacy {
        if LEGACY_CONNECTION_KEYS.contains(&key.as_str()) {
            connection.insert(key, value);
        } else {
            options.insert(key, value);
        }
    }

    let connections = obj
        .entry("connections")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(connections) = connections {
        connections
            .entry(source.clone())
            .or_insert(Value::Object(connection));
    }

    let mut sync_options = Map::new();
    sync_options.insert(source, Value::Object(options));
    obj.insert("SyncOptions".to_string(), Value::Object(sync_options));

    true
}

fn expand_tokens(obj: &mut Map<String, Value>, tokens: &Tokens) {
    if let Some(Value::String(extra)) = obj.get_mut("DrupalExtra") {
        *extra = tokens.render(extra);
    }

    if let Some(Value::Object(connections)) = obj.get_mut("connections") {
        for connection in connections.values_mut() {
            for key in ["HomeDir", "WebDir"] {
                if let Some(Value::String(dir)) = connection.get_mut(key) {
                    *dir = tokens.render(dir);
                }
            }
        }
    }
}

fn apply_defaults(obj: &mut Map<String, Value>) {
    let docker_enabled = obj.get("EnableDocker").map(flag_value).unwrap_or(false);

    if docker_enabled || obj.get("docker").is_some_and(Value::is_object) {
        let docker = obj
            .entry("docker")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(docker) = docker {
            for key in ["webContainer", "themeContainer"] {
                docker
                    .entry(key)
                    .or_insert_with(|| Value::String(DEFAULT_CONTAINER.to_string()));
            }
        }
    }

    let mut names = vec![LOCAL_SOURCE.to_string()];
    if let Some(Value::Object(connections)) = obj.get_mut("connections") {
        for (name, connection) in connections.iter_mut() {
            if let Value::Object(connection) = connection {
                connection
                    .entry("EnableDocker")
                    .or_insert(Value::Bool(docker_enabled));
            }
            names.push(name.clone());
        }
    }

    let sync_options = obj
        .entry("SyncOptions")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(sync_options) = sync_options {
        for name in names {
            sync_options
                .entry(name)
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }
}

/// Truthiness of a loosely typed YAML flag: `0`, `""`, `"0"` and `"false"` are false.
pub fn flag_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl Config {
    pub fn connection(&self, name: &str) -> Result<&Connection> {
        self.settings
            .connections
            .get(name)
            .ok_or_else(|| Error::connection_not_found(name))
    }

    /// Sync options for a source; every connection and `local` has an entry.
    pub fn sync_options(&self, name: &str) -> SyncOptions {
        self.settings
            .sync_options
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn deploy_target(&self, name: &str) -> Result<&DeployTarget> {
        self.settings
            .deploy
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, target)| target)
            .ok_or_else(|| {
                Error::validation_invalid_argument(
                    "deploy",
                    format!("Deploy target '{}' is not configured", name),
                    Some(name.to_string()),
                    Some(self.settings.deploy.iter().map(|(k, _)| k.clone()).collect()),
                )
            })
    }

    /// First configured deploy target.
    pub fn default_deploy_name(&self) -> Option<&str> {
        self.settings.deploy.first().map(|(name, _)| name.as_str())
    }

    /// `MultiSite` entries in declaration order. Empty for single-site projects.
    pub fn multisite_sites(&self) -> &[Site] {
        &self.settings.multi_site
    }

    pub fn is_multisite(&self) -> bool {
        !self.settings.multi_site.is_empty()
    }

    /// Site URIs for per-site drush calls.
    pub fn site_uris(&self) -> Vec<String> {
        if self.is_multisite() {
            self.settings.multi_site.iter().map(|s| s.dir.clone()).collect()
        } else {
            vec!["default".to_string()]
        }
    }

    /// Docker applies when enabled in config, configured, and not disabled on the CLI.
    pub fn docker_enabled(&self, no_docker: bool) -> bool {
        !no_docker && self.settings.enable_docker && self.settings.docker.is_some()
    }

    pub fn docker(&self) -> Option<&DockerSettings> {
        self.settings.docker.as_ref()
    }

    pub fn is_drupal7(&self) -> bool {
        self.settings.drupal.trim() == "7"
    }
}

mod de {
    use super::{flag_value, Site};
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn scalar_to_string(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(true) => Some("1".to_string()),
            Value::Bool(false) | Value::Null => Some(String::new()),
            _ => None,
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        let value = Value::deserialize(d)?;
        let shown = value.to_string();
        scalar_to_string(value)
            .ok_or_else(|| D::Error::custom(format!("expected a string, found {}", shown)))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let s = string(d)?;
        Ok(if s.trim().is_empty() { None } else { Some(s) })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(flag_value(&value))
    }

    pub fn port<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
        match Value::deserialize(d)? {
            Value::Number(n) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| D::Error::custom(format!("invalid port {}", n))),
            Value::String(s) => s
                .trim()
                .parse::<u16>()
                .map_err(|_| D::Error::custom(format!("invalid port '{}'", s))),
            other => Err(D::Error::custom(format!("invalid port {}", other))),
        }
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        match Value::deserialize(d)? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(scalar_to_string)
                .filter(|s| !s.is_empty())
                .collect()),
            other => Ok(scalar_to_string(other)
                .filter(|s| !s.is_empty())
                .into_iter()
                .collect()),
        }
    }

    pub fn opt_string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        let list = string_list(d)?;
        Ok(if list.is_empty() { None } else { Some(list) })
    }

    /// `MultiSite` maps a site directory to one database key or a list of them.
    pub fn multisite<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Site>, D::Error> {
        let Value::Object(map) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };

        Ok(map
            .into_iter()
            .map(|(dir, dbs)| {
                let databases = match dbs {
                    Value::Array(items) => items.into_iter().filter_map(scalar_to_string).collect(),
                    other => scalar_to_string(other).into_iter().collect(),
                };
                Site { dir, databases }
            })
            .collect())
    }

    pub fn ordered<'de, D, T>(d: D) -> Result<Vec<(String, T)>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let Value::Object(map) = Value::deserialize(d)? else {
            return Ok(Vec::new());
        };

        map.into_iter()
            .map(|(key, value)| {
                serde_json::from_value(value)
                    .map(|v| (key.clone(), v))
                    .map_err(|e| D::Error::custom(format!("{}: {}", key, e)))
            })
            .collect()
    }
}

//! Checksum gate for expensive build steps.
//!
//! Each category hashes one input file. A category is changed when the
//! previous snapshot has no entry for it or the digest differs. A file that
//! is missing now and was recorded as missing is unchanged.

use crate::error::{Error, Result};
use crate::paths;
use crate::utils::io;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const COMPOSER: &str = "composer";
pub const DOCKER: &str = "docker";
pub const MAKE: &str = "make";

#[derive(Debug, Clone)]
pub struct ChangeSet {
    snapshot_path: PathBuf,
    previous: Option<BTreeMap<String, Option<String>>>,
    current: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryState {
    pub category: String,
    pub changed: bool,
}

/// Snapshot category for a theme directory: `themes/custom/acme` -> `themes-custom-acme`.
pub fn theme_category(dir: &str) -> String {
    dir.replace('/', "-")
}

/// SHA-256 hex digest of a file, `None` when the file is missing or unreadable.
pub fn file_digest(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    let digest = Sha256::digest(&bytes);
    Some(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

fn read_snapshot(path: &Path) -> Option<BTreeMap<String, Option<String>>> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_yml::from_str(&content).ok()
}

/// Hash the gate inputs under `root` and compare them with the stored snapshot.
pub fn evaluate(root: &Path, theme_dirs: &[String]) -> ChangeSet {
    let snapshot_path = root.join(paths::CHECKSUM_FILE);
    let previous = read_snapshot(&snapshot_path);

    let mut current = vec![
        (COMPOSER.to_string(), file_digest(&root.join("composer.json"))),
        (DOCKER.to_string(), file_digest(&root.join("docker-compose.yml"))),
    ];

    for dir in theme_dirs {
        current.push((
            theme_category(dir),
            file_digest(&root.join(dir).join("package.json")),
        ));
    }

    let make = file_digest(&root.join("drupal.make")).map(|make| {
        match file_digest(&root.join("drupal-dev.make")) {
            Some(dev) => format!("{}-{}", make, dev),
            None => make,
        }
    });
    current.push((MAKE.to_string(), make));

    ChangeSet {
        snapshot_path,
        previous,
        current,
    }
}

impl ChangeSet {
    /// True when a previous snapshot was found and parsed.
    pub fn has_snapshot(&self) -> bool {
        self.previous.is_some()
    }

    /// Unknown categories count as changed.
    pub fn is_changed(&self, category: &str) -> bool {
        let Some((_, current)) = self.current.iter().find(|(c, _)| c == category) else {
            return true;
        };
        match self.previous.as_ref().and_then(|p| p.get(category)) {
            Some(previous) => previous != current,
            None => true,
        }
    }

    pub fn any_changed(&self) -> bool {
        self.current.iter().any(|(c, _)| self.is_changed(c))
    }

    pub fn states(&self) -> Vec<CategoryState> {
        self.current
            .iter()
            .map(|(category, _)| CategoryState {
                category: category.clone(),
                changed: self.is_changed(category),
            })
            .collect()
    }

    pub fn changed_categories(&self) -> Vec<String> {
        self.current
            .iter()
            .filter(|(c, _)| self.is_changed(c))
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Write the snapshot when at least one category changed. Returns whether it wrote.
    pub fn persist(&self) -> Result<bool> {
        if !self.any_changed() {
            return Ok(false);
        }

        let mut map = Map::new();
        for (category, digest) in &self.current {
            map.insert(
                category.clone(),
                digest.clone().map(Value::String).unwrap_or(Value::Null),
            );
        }

        let content = serde_yml::to_string(&Value::Object(map)).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize checksum snapshot".to_string()))
        })?;
        io::write_file_atomic(&self.snapshot_path, &content, "write checksum snapshot")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn first_run_marks_everything_changed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("composer.json"), "{}").unwrap();

        let changes = evaluate(dir.path(), &[]);
        assert!(!changes.has_snapshot());
        assert!(changes.is_changed(COMPOSER));
        assert!(changes.is_changed(DOCKER));
        assert!(changes.is_changed("themes-custom-unknown"));
    }

    #[test]
    fn persisted_snapshot_clears_changes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("composer.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("themes/custom/acme")).unwrap();
        fs::write(dir.path().join("themes/custom/acme/package.json"), "{}").unwrap();
        let themes = vec!["themes/custom/acme".to_string()];

        assert!(evaluate(dir.path(), &themes).persist().unwrap());

        let second = evaluate(dir.path(), &themes);
        assert!(second.has_snapshot());
        assert!(!second.is_changed(COMPOSER));
        assert!(!second.is_changed("themes-custom-acme"));

        fs::write(dir.path().join("composer.json"), "{\"require\":{}}").unwrap();
        let third = evaluate(dir.path(), &themes);
        assert!(third.is_changed(COMPOSER));
        assert!(!third.is_changed("themes-custom-acme"));
    }

    #[test]
    fn file_missing_in_both_runs_is_unchanged() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("composer.json"), "{}").unwrap();
        assert!(evaluate(dir.path(), &[]).persist().unwrap());

        let again = evaluate(dir.path(), &[]);
        assert!(!again.is_changed(MAKE));
        assert!(!again.is_changed(DOCKER));
        assert!(!again.any_changed());
        assert!(!again.persist().unwrap());

        fs::write(dir.path().join("drupal.make"), "core = 8.x").unwrap();
        assert!(evaluate(dir.path(), &[]).is_changed(MAKE));
    }

    #[test]
    fn make_digest_includes_dev_make() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("drupal.make"), "core = 8.x").unwrap();
        let plain = evaluate(dir.path(), &[]).current;
        fs::write(dir.path().join("drupal-dev.make"), "dev").unwrap();
        let with_dev = evaluate(dir.path(), &[]).current;

        let make = |set: &Vec<(String, Option<String>)>| {
            set.iter().find(|(c, _)| c == MAKE).and_then(|(_, d)| d.clone())
        };
        let plain = make(&plain).unwrap();
        let with_dev = make(&with_dev).unwrap();
        assert!(with_dev.starts_with(&plain));
        assert!(with_dev.contains('-'));
    }

    #[test]
    fn corrupt_snapshot_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(paths::CHECKSUM_FILE), "- [not a map").unwrap();
        assert!(!evaluate(dir.path(), &[]).has_snapshot());
    }

    #[test]
    fn theme_category_replaces_slashes() {
        assert_eq!(theme_category("profiles/acme/themes/base"), "profiles-acme-themes-base");
    }
}

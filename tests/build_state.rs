use d2build::checksum::{self, COMPOSER, DOCKER, MAKE};
use d2build::lock;
use std::fs;
use tempfile::TempDir;

const THEME: &str = "themes/custom/acme";

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("composer.json"), "{\"name\": \"acme/site\"}").unwrap();
    fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
    fs::write(dir.path().join("drupal.make"), "core = 8.x\n").unwrap();
    fs::create_dir_all(dir.path().join(THEME)).unwrap();
    fs::write(dir.path().join(THEME).join("package.json"), "{}").unwrap();
    dir
}

#[test]
fn first_evaluation_marks_everything_changed() {
    let dir = project();
    let changes = checksum::evaluate(dir.path(), &[THEME.to_string()]);

    assert!(!changes.has_snapshot());
    for category in [COMPOSER, DOCKER, MAKE, "themes-custom-acme"] {
        assert!(changes.is_changed(category), "{category}");
    }
}

#[test]
fn persisted_snapshot_gates_the_next_run() {
    let dir = project();
    let themes = [THEME.to_string()];

    assert!(checksum::evaluate(dir.path(), &themes).persist().unwrap());

    let unchanged = checksum::evaluate(dir.path(), &themes);
    assert!(unchanged.has_snapshot());
    assert!(!unchanged.any_changed());
    assert!(!unchanged.persist().unwrap());

    fs::write(dir.path().join("composer.json"), "{\"name\": \"acme/other\"}").unwrap();
    let changed = checksum::evaluate(dir.path(), &themes);
    assert_eq!(changed.changed_categories(), vec![COMPOSER.to_string()]);
}

#[test]
fn missing_files_change_only_when_they_appear() {
    let dir = project();
    let themes = [THEME.to_string()];
    fs::remove_file(dir.path().join("docker-compose.yml")).unwrap();
    fs::remove_file(dir.path().join("drupal.make")).unwrap();
    assert!(checksum::evaluate(dir.path(), &themes).persist().unwrap());

    let changes = checksum::evaluate(dir.path(), &themes);
    assert!(!changes.is_changed(DOCKER));
    assert!(!changes.is_changed(MAKE));
    assert!(!changes.any_changed());
    assert!(!changes.persist().unwrap());

    fs::write(dir.path().join("docker-compose.yml"), "services: {}\n").unwrap();
    let changes = checksum::evaluate(dir.path(), &themes);
    assert_eq!(changes.changed_categories(), vec![DOCKER.to_string()]);
}

#[test]
fn dev_make_file_changes_the_make_category() {
    let dir = project();
    checksum::evaluate(dir.path(), &[]).persist().unwrap();
    assert!(!checksum::evaluate(dir.path(), &[]).is_changed(MAKE));

    fs::write(dir.path().join("drupal-dev.make"), "projects[] = devel\n").unwrap();
    assert!(checksum::evaluate(dir.path(), &[]).is_changed(MAKE));
}

#[test]
fn corrupt_snapshot_counts_as_missing() {
    let dir = project();
    fs::write(dir.path().join(".make.sum"), ":: not yaml [").unwrap();
    let changes = checksum::evaluate(dir.path(), &[]);
    assert!(!changes.has_snapshot());
    assert!(changes.is_changed(COMPOSER));
}

#[test]
fn lock_blocks_until_unlocked() {
    let dir = TempDir::new().unwrap();

    let locked = lock::lock(dir.path()).unwrap();
    assert!(locked.locked && locked.changed);
    assert!(!lock::lock(dir.path()).unwrap().changed);

    let err = lock::ensure_unlocked(dir.path()).unwrap_err();
    assert_eq!(err.code.as_str(), "build.locked");
    assert!(!err.hints.is_empty());

    let unlocked = lock::unlock(dir.path()).unwrap();
    assert!(!unlocked.locked);
    assert!(lock::ensure_unlocked(dir.path()).is_ok());
}

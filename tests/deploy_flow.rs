use d2build::config;
use d2build::context::Context;
use d2build::deploy::{self, Confirm, DeployIssue, DeployStrategy, Phase};
use d2build::utils::template::Tokens;
use std::cell::Cell;
use tempfile::TempDir;

/// Reports one warning per phase it is told to complain about.
struct Noisy {
    warn_in: Vec<Phase>,
    post_ran: Cell<bool>,
}

impl Noisy {
    fn issues(&self, phase: Phase) -> Vec<DeployIssue> {
        if self.warn_in.contains(&phase) {
            vec![DeployIssue::warn(format!("{} looked odd", phase.as_str()))]
        } else {
            Vec::new()
        }
    }
}

impl DeployStrategy for Noisy {
    fn name(&self) -> &'static str {
        "noisy"
    }
    fn prepare(&self, _confirm: &mut Confirm<'_>) -> Vec<DeployIssue> {
        self.issues(Phase::Prepare)
    }
    fn pre_deploy(&self) -> Vec<DeployIssue> {
        self.issues(Phase::PreDeploy)
    }
    fn deploy(&self) -> Vec<DeployIssue> {
        self.issues(Phase::Deploy)
    }
    fn post_deploy(&self) -> Vec<DeployIssue> {
        self.post_ran.set(true);
        self.issues(Phase::PostDeploy)
    }
}

fn noisy(warn_in: Vec<Phase>) -> Noisy {
    Noisy {
        warn_in,
        post_ran: Cell::new(false),
    }
}

fn ctx(dir: &TempDir, yaml: &str) -> Context {
    let cfg = config::parse(yaml, &Tokens::default()).unwrap();
    Context::from_parts(dir.path(), "staging", cfg)
}

#[test]
fn every_warning_is_confirmed_before_post_deploy() {
    let strategy = noisy(vec![Phase::Prepare, Phase::Deploy]);
    let mut asked = 0;
    let report = deploy::execute("staging", &strategy, &mut |_| {
        asked += 1;
        true
    })
    .unwrap();

    assert_eq!(asked, 2);
    assert!(strategy.post_ran.get());
    assert_eq!(report.strategy, "noisy");
    let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(
        phases,
        vec![Phase::Prepare, Phase::PreDeploy, Phase::Deploy, Phase::PostDeploy]
    );
}

#[test]
fn declined_warning_skips_post_deploy() {
    let strategy = noisy(vec![Phase::Deploy]);
    let err = deploy::execute("staging", &strategy, &mut |_| false).unwrap_err();

    assert_eq!(err.code.as_str(), "deploy.aborted");
    assert_eq!(err.details["phase"], "deploy");
    assert_eq!(err.details["issues"][0], "deploy looked odd");
    assert!(!strategy.post_ran.get());
}

#[test]
fn post_deploy_warnings_are_reported_without_prompt() {
    let strategy = noisy(vec![Phase::PostDeploy]);
    let report = deploy::execute("staging", &strategy, &mut |_| panic!("unexpected prompt")).unwrap();
    assert_eq!(report.phases[3].issues.len(), 1);
}

#[test]
fn run_without_targets_is_not_configured() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir, "settings: {}\n");
    let err = deploy::run(&ctx, None, &mut |_| true).unwrap_err();
    assert_eq!(err.code.as_str(), "deploy.not_configured");
}

#[test]
fn unknown_strategy_is_rejected_before_any_phase() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(
        &dir,
        "settings:
  connections:
    prod:
      server: prod.example.com
      user: deploy
      HomeDir: /srv/acme
  deploy:
    prod:
      deploy: capistrano
",
    );
    let err = deploy::run(&ctx, Some("prod"), &mut |_| panic!("unexpected prompt")).unwrap_err();
    assert_eq!(err.code.as_str(), "deploy.unknown_strategy");
}

#[test]
fn target_without_connection_is_not_found() {
    let dir = TempDir::new().unwrap();
    let ctx = ctx(&dir, "settings:\n  deploy:\n    prod: {}\n");
    let err = deploy::run(&ctx, None, &mut |_| true).unwrap_err();
    assert_eq!(err.code.as_str(), "sync.source_not_found");
}

//! Deploy strategies and the phase runner.

use crate::build::{self, BuildOptions};
use crate::config::DeployTarget;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::{self, Mode};
use crate::ssh::{self, SshClient};
use crate::utils::shell;
use serde::Serialize;

pub const STRATEGY_ROBO: &str = "robo";
pub const STRATEGY_ROBO_SYNC: &str = "robo+sync";

const REMOTE_PROBLEM: &str = "Problem detected in remote server.";
const CONTINUE_PROMPT: &str = "Do you want to continue?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployIssue {
    pub message: String,
    /// Stop the deploy without asking.
    pub exit: bool,
}

impl DeployIssue {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit: false,
        }
    }

    pub fn exit(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit: true,
        }
    }
}

/// Asks the user a yes/no question.
pub type Confirm<'a> = dyn FnMut(&str) -> bool + 'a;

pub trait DeployStrategy {
    fn name(&self) -> &'static str;

    fn prepare(&self, _confirm: &mut Confirm<'_>) -> Vec<DeployIssue> {
        Vec::new()
    }

    fn pre_deploy(&self) -> Vec<DeployIssue> {
        Vec::new()
    }

    fn deploy(&self) -> Vec<DeployIssue>;

    fn post_deploy(&self) -> Vec<DeployIssue> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Prepare,
    PreDeploy,
    Deploy,
    PostDeploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::PreDeploy => "pre_deploy",
            Phase::Deploy => "deploy",
            Phase::PostDeploy => "post_deploy",
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            Phase::Deploy => "Problem detected in remote server. Continue?",
            _ => CONTINUE_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseReport {
    pub phase: Phase,
    pub issues: Vec<DeployIssue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
    pub target: String,
    pub strategy: String,
    pub phases: Vec<PhaseReport>,
}

/// `git` and build commands run in the remote project dir over ssh.
pub struct RoboDeploy {
    client: SshClient,
    home_dir: String,
}

impl RoboDeploy {
    pub fn new(client: SshClient, home_dir: impl Into<String>) -> Self {
        Self {
            client,
            home_dir: home_dir.into(),
        }
    }

    pub fn remote_command(&self, command: &str) -> String {
        format!("cd {}; {}", self.home_dir, command)
    }

    fn passthrough(&self, command: &str) -> Vec<DeployIssue> {
        let command = self.remote_command(command);
        log_status!("deploy", "{}: {}", self.client.account(), command);
        if executor::run_remote(&self.client, &command, Mode::Passthrough).success {
            Vec::new()
        } else {
            vec![DeployIssue::warn(REMOTE_PROBLEM)]
        }
    }
}

impl DeployStrategy for RoboDeploy {
    fn name(&self) -> &'static str {
        STRATEGY_ROBO
    }

    fn prepare(&self, _confirm: &mut Confirm<'_>) -> Vec<DeployIssue> {
        let output = executor::run_remote(&self.client, &self.remote_command("git status -s"), Mode::Captured);
        if !output.success {
            return vec![DeployIssue::warn(REMOTE_PROBLEM)];
        }
        let status = output.stdout.trim();
        if status.is_empty() {
            return Vec::new();
        }
        log_status!("deploy", "git status report:\n{}", status);
        vec![DeployIssue::warn(REMOTE_PROBLEM)]
    }

    fn pre_deploy(&self) -> Vec<DeployIssue> {
        self.passthrough("git pull")
    }

    fn deploy(&self) -> Vec<DeployIssue> {
        self.passthrough("./d2build build --not-interactive")
    }
}

/// Builds locally, deploys like [`RoboDeploy`], then pushes built directories.
pub struct RoboSyncDeploy<'a> {
    robo: RoboDeploy,
    sync_dirs: Vec<String>,
    local_build: Box<dyn Fn() -> Result<()> + 'a>,
    root: std::path::PathBuf,
    uid: u32,
}

impl<'a> RoboSyncDeploy<'a> {
    pub fn new(
        robo: RoboDeploy,
        sync_dirs: Vec<String>,
        root: impl Into<std::path::PathBuf>,
        uid: u32,
        local_build: impl Fn() -> Result<()> + 'a,
    ) -> Self {
        Self {
            robo,
            sync_dirs,
            local_build: Box::new(local_build),
            root: root.into(),
            uid,
        }
    }

    /// rsync arguments pushing `dir` to the remote project dir. The source
    /// is passed as given, so a trailing `/` copies the directory contents.
    pub fn rsync_args(&self, dir: &str) -> Vec<String> {
        [
            "-r",
            "--exclude",
            ".git",
            "--checksum",
            "--whole-file",
            "-v",
            "--progress",
            "-h",
            "--stats",
            "-e",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([
            self.robo.client.rsync_shell(),
            dir.to_string(),
            format!(
                "{}:{}/{}",
                self.robo.client.account(),
                self.robo.home_dir.trim_end_matches('/'),
                dir.trim_end_matches('/')
            ),
        ])
        .collect()
    }
}

impl DeployStrategy for RoboSyncDeploy<'_> {
    fn name(&self) -> &'static str {
        STRATEGY_ROBO_SYNC
    }

    fn prepare(&self, confirm: &mut Confirm<'_>) -> Vec<DeployIssue> {
        if let Err(e) = (self.local_build)() {
            return vec![DeployIssue::exit(format!("Local build failed: {}", e.message))];
        }
        if !confirm(CONTINUE_PROMPT) {
            return vec![DeployIssue::exit("Deploy cancelled")];
        }
        self.robo.prepare(confirm)
    }

    fn pre_deploy(&self) -> Vec<DeployIssue> {
        self.robo.pre_deploy()
    }

    fn deploy(&self) -> Vec<DeployIssue> {
        let mut issues = self.robo.deploy();
        for dir in &self.sync_dirs {
            let args = self.rsync_args(dir);
            log_status!("deploy", "rsync {}", shell::quote_args(&args));
            let output = executor::run_program("rsync", &args, &self.root, self.uid, Mode::Passthrough);
            if !output.success {
                issues.push(DeployIssue::warn(format!("Sync error: {}", dir)));
            }
        }
        issues
    }
}

/// Build the strategy a deploy target names.
pub fn strategy_for<'a>(
    ctx: &'a Context,
    name: &str,
    target: &DeployTarget,
) -> Result<Box<dyn DeployStrategy + 'a>> {
    let connection = ctx.config.connection(name)?;
    let client = ssh::resolve(ctx, name)?;
    let home_dir = connection
        .home_dir
        .clone()
        .ok_or_else(|| Error::sync_remote_invalid(name, vec!["HomeDir".to_string()]))?;
    let robo = RoboDeploy::new(client, home_dir);

    match target.deploy.as_str() {
        STRATEGY_ROBO => Ok(Box::new(robo)),
        STRATEGY_ROBO_SYNC => Ok(Box::new(RoboSyncDeploy::new(
            robo,
            target.sync_dirs.clone(),
            ctx.root.clone(),
            ctx.uid,
            move || {
                let opts = BuildOptions {
                    not_interactive: true,
                    ..BuildOptions::default()
                };
                build::build(ctx, &opts).map(|_| ())
            },
        ))),
        other => Err(Error::deploy_unknown_strategy(other)),
    }
}

fn messages(issues: &[DeployIssue]) -> Vec<String> {
    issues.iter().map(|i| i.message.clone()).collect()
}

/// Run the four phases in order. An `exit` issue stops at once; other
/// issues are shown and the user decides whether to go on.
pub fn execute(
    target: &str,
    strategy: &dyn DeployStrategy,
    confirm: &mut Confirm<'_>,
) -> Result<DeployReport> {
    let mut phases = Vec::new();

    for phase in [Phase::Prepare, Phase::PreDeploy, Phase::Deploy, Phase::PostDeploy] {
        log_status!("deploy", "{} ({})", phase.as_str(), strategy.name());
        let issues = match phase {
            Phase::Prepare => strategy.prepare(confirm),
            Phase::PreDeploy => strategy.pre_deploy(),
            Phase::Deploy => strategy.deploy(),
            Phase::PostDeploy => strategy.post_deploy(),
        };

        if issues.iter().any(|i| i.exit) {
            return Err(Error::deploy_aborted(phase.as_str(), messages(&issues)));
        }

        for issue in &issues {
            log_status!("deploy", "{}", issue.message);
        }

        if !issues.is_empty() && phase != Phase::PostDeploy && !confirm(phase.prompt()) {
            return Err(Error::deploy_aborted(phase.as_str(), messages(&issues)));
        }

        phases.push(PhaseReport { phase, issues });
    }

    Ok(DeployReport {
        target: target.to_string(),
        strategy: strategy.name().to_string(),
        phases,
    })
}

/// Deploy to `name`, or the first configured target.
pub fn run(ctx: &Context, name: Option<&str>, confirm: &mut Confirm<'_>) -> Result<DeployReport> {
    let name = match name {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => ctx
            .config
            .default_deploy_name()
            .map(str::to_string)
            .ok_or_else(Error::deploy_not_configured)?,
    };

    let target = ctx.config.deploy_target(&name)?;
    let strategy = strategy_for(ctx, &name, target)?;
    execute(&name, strategy.as_ref(), confirm)
}

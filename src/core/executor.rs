// Unified command execution - routes to local shell, a compose service container, or SSH

use crate::context::Context;
use crate::docker;
use crate::error::{Error, Result};
use crate::ssh::{
    execute_local_command_in_dir, execute_local_command_interactive,
    execute_local_command_passthrough, stderr_stdio, CommandOutput, SshClient,
};
use std::path::Path;
use std::process::{Command, Stdio};

/// UIDs below this are treated as macOS-style accounts that the theme
/// container cannot map.
const REGULAR_UID_MIN: u32 = 1000;

#[derive(Debug, Clone)]
pub enum ExecTarget {
    Local,
    Container {
        service: String,
        user: Option<u32>,
        interactive: bool,
    },
    Remote(Box<SshClient>),
}

impl ExecTarget {
    /// `user@host` of a remote target, used to label failures.
    pub fn account(&self) -> Option<String> {
        match self {
            ExecTarget::Remote(client) => Some(client.account()),
            _ => None,
        }
    }
}

/// Which configured container a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Web,
    Theme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Capture stdout/stderr.
    Captured,
    /// Forward output to stderr, capture nothing.
    Passthrough,
    /// Inherit the terminal.
    Interactive,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    pub no_docker: bool,
    pub not_interactive: bool,
}

/// Pick the execution target for a role.
///
/// Container when docker is configured and enabled (`--no-docker` wins over
/// config), local otherwise.
pub fn resolve_target(ctx: &Context, opts: &ExecOptions, role: Role) -> ExecTarget {
    if !ctx.config.docker_enabled(opts.no_docker) {
        return ExecTarget::Local;
    }
    let Some(settings) = ctx.config.docker() else {
        return ExecTarget::Local;
    };

    match role {
        Role::Web => ExecTarget::Container {
            service: docker::web_service(ctx),
            user: Some(ctx.uid),
            interactive: !opts.not_interactive,
        },
        Role::Theme => {
            let separate = settings.theme_container != settings.web_container;
            let user = if separate && ctx.uid < REGULAR_UID_MIN {
                None
            } else {
                Some(ctx.uid)
            };
            let service = if separate {
                settings.theme_container.clone()
            } else {
                docker::web_service(ctx)
            };
            ExecTarget::Container {
                service,
                user,
                interactive: !opts.not_interactive,
            }
        }
    }
}

pub fn remote_target(ctx: &Context, connection: &str) -> Result<ExecTarget> {
    Ok(ExecTarget::Remote(Box::new(crate::ssh::resolve(
        ctx, connection,
    )?)))
}

/// Project directory as seen by the target.
pub fn project_dir(ctx: &Context, target: &ExecTarget) -> String {
    match target {
        ExecTarget::Local => ctx.root.to_string_lossy().to_string(),
        ExecTarget::Container { .. } => ctx.settings().app_dir.clone(),
        ExecTarget::Remote(client) => ctx
            .config
            .connection(&client.connection)
            .ok()
            .and_then(|c| c.home_dir.clone())
            .unwrap_or_else(|| ".".to_string()),
    }
}

/// Drupal root (`<project>/<WebDir>`) as seen by the target.
pub fn drupal_root(ctx: &Context, target: &ExecTarget) -> String {
    format!(
        "{}/{}",
        project_dir(ctx, target).trim_end_matches('/'),
        ctx.settings().web_dir
    )
}

/// Arguments for `docker exec` running `command` through `sh -c`.
pub fn container_exec_args(
    container_id: &str,
    user: Option<u32>,
    env_uid: u32,
    interactive: bool,
    tty: bool,
    command: &str,
) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if interactive {
        args.push("-i".to_string());
    }
    if tty {
        args.push("-t".to_string());
    }
    if let Some(uid) = user {
        args.push("--user".to_string());
        args.push(uid.to_string());
    }
    args.push("-e".to_string());
    args.push(format!("UID={}", env_uid));
    args.push(container_id.to_string());
    args.push("sh".to_string());
    args.push("-c".to_string());
    args.push(command.to_string());
    args
}

/// Run a program (no shell) in `dir` with `UID` exported.
pub fn run_program(
    program: &str,
    args: &[String],
    dir: &Path,
    uid: u32,
    mode: Mode,
) -> CommandOutput {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(dir).env("UID", uid.to_string());

    let result = match mode {
        Mode::Captured => cmd.output().map(|out| CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }),
        Mode::Passthrough => cmd
            .stdout(stderr_stdio())
            .stderr(Stdio::inherit())
            .status()
            .map(|s| status_output(s.success(), s.code())),
        Mode::Interactive => cmd
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map(|s| status_output(s.success(), s.code())),
    };

    result.unwrap_or_else(|e| CommandOutput {
        stdout: String::new(),
        stderr: format!("Failed to run {}: {}", program, e),
        success: false,
        exit_code: -1,
    })
}

fn status_output(success: bool, code: Option<i32>) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: String::new(),
        success,
        exit_code: code.unwrap_or(-1),
    }
}

/// Run `command` on `target`. Non-zero exits are returned, not raised.
pub fn run(ctx: &Context, target: &ExecTarget, command: &str, mode: Mode) -> Result<CommandOutput> {
    match target {
        ExecTarget::Local => {
            let uid = ctx.uid.to_string();
            let env = [("UID", uid.as_str())];
            let dir = Some(ctx.root.as_path());
            Ok(match mode {
                Mode::Captured => execute_local_command_in_dir(command, dir, Some(&env)),
                Mode::Passthrough => execute_local_command_passthrough(command, dir, Some(&env)),
                Mode::Interactive => {
                    let code = execute_local_command_interactive(command, dir, Some(&env));
                    status_output(code == 0, Some(code))
                }
            })
        }
        ExecTarget::Container {
            service,
            user,
            interactive,
        } => {
            let id = docker::container_id(ctx, service)?;
            let args = container_exec_args(
                &id,
                *user,
                ctx.uid,
                *interactive || mode == Mode::Interactive,
                mode == Mode::Interactive,
                command,
            );
            Ok(run_program("docker", &args, &ctx.root, ctx.uid, mode))
        }
        ExecTarget::Remote(client) => Ok(run_remote(client, command, mode)),
    }
}

/// Run `command` over ssh, or locally for a localhost connection.
pub fn run_remote(client: &SshClient, command: &str, mode: Mode) -> CommandOutput {
    match mode {
        Mode::Captured => client.execute(command),
        Mode::Passthrough => client.execute_passthrough(command),
        Mode::Interactive => {
            let code = client.execute_interactive(Some(command));
            status_output(code == 0, Some(code))
        }
    }
}

/// Like [`run`], but a non-zero exit becomes a `command.failed` error.
pub fn run_checked(
    ctx: &Context,
    target: &ExecTarget,
    command: &str,
    mode: Mode,
) -> Result<CommandOutput> {
    let output = run(ctx, target, command, mode)?;
    output.into_result(command, target.account())
}

/// Exit code of a step, mapped to a `build.step_failed` error when non-zero.
pub fn step(ctx: &Context, target: &ExecTarget, name: &str, command: &str) -> Result<()> {
    log_status!("build", "{}", name);
    let output = run(ctx, target, command, Mode::Passthrough)?;
    if output.success {
        Ok(())
    } else {
        Err(Error::build_step_failed(name, output.exit_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::utils::template::Tokens;

    fn ctx(yaml: &str) -> Context {
        let config = config::parse(yaml, &Tokens::default()).unwrap();
        Context::from_parts(Path::new("/srv/acme"), "staging", config)
    }

    #[test]
    fn local_when_docker_disabled() {
        let ctx = ctx("settings: {}\n");
        let target = resolve_target(&ctx, &ExecOptions::default(), Role::Web);
        assert!(matches!(target, ExecTarget::Local));
        assert_eq!(drupal_root(&ctx, &target), "/srv/acme/web");
    }

    #[test]
    fn no_docker_overrides_config() {
        let ctx = ctx("settings:\n  EnableDocker: 1\n");
        let opts = ExecOptions {
            no_docker: true,
            not_interactive: false,
        };
        assert!(matches!(resolve_target(&ctx, &opts, Role::Web), ExecTarget::Local));
    }

    #[test]
    fn container_when_docker_enabled() {
        let ctx = ctx("settings:\n  EnableDocker: 1\n  AppDir: /app\n");
        let target = resolve_target(&ctx, &ExecOptions::default(), Role::Web);
        match &target {
            ExecTarget::Container { service, user, interactive } => {
                assert_eq!(service, "phpfpm");
                assert_eq!(*user, Some(ctx.uid));
                assert!(*interactive);
            }
            other => panic!("unexpected target {:?}", other),
        }
        assert_eq!(drupal_root(&ctx, &target), "/app/web");
    }

    #[test]
    fn separate_theme_container_skips_user_for_low_uid() {
        let mut ctx = ctx(
            "settings:\n  EnableDocker: 1\n  docker:\n    webContainer: php\n    themeContainer: node\n",
        );
        ctx.uid = 501;
        match resolve_target(&ctx, &ExecOptions::default(), Role::Theme) {
            ExecTarget::Container { service, user, .. } => {
                assert_eq!(service, "node");
                assert_eq!(user, None);
            }
            other => panic!("unexpected target {:?}", other),
        }

        ctx.uid = 1000;
        match resolve_target(&ctx, &ExecOptions::default(), Role::Theme) {
            ExecTarget::Container { user, .. } => assert_eq!(user, Some(1000)),
            other => panic!("unexpected target {:?}", other),
        }
    }

    #[test]
    fn exec_args_shape() {
        let args = container_exec_args("abc123", Some(1000), 1000, true, false, "drush cr");
        assert_eq!(
            args,
            vec!["exec", "-i", "--user", "1000", "-e", "UID=1000", "abc123", "sh", "-c", "drush cr"]
        );

        let args = container_exec_args("abc123", None, 501, false, true, "bash");
        assert_eq!(args, vec!["exec", "-t", "-e", "UID=501", "abc123", "sh", "-c", "bash"]);
    }

    #[test]
    fn local_run_uses_project_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = config::parse("settings: {}\n", &Tokens::default()).unwrap();
        let ctx = Context::from_parts(dir.path(), "staging", config);
        let out = run(&ctx, &ExecTarget::Local, "pwd", Mode::Captured).unwrap();
        assert!(out.success);
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());

        let err = run_checked(&ctx, &ExecTarget::Local, "exit 3", Mode::Captured).unwrap_err();
        assert_eq!(err.details["exitCode"], 3);
    }

    #[test]
    fn remote_target_dispatches_through_connection() {
        let home = tempfile::TempDir::new().unwrap();
        let yaml = format!(
            "settings:\n  connections:\n    box:\n      server: localhost\n      user: deploy\n      HomeDir: {}\n",
            home.path().display()
        );
        let config = config::parse(&yaml, &Tokens::default()).unwrap();
        let ctx = Context::from_parts(Path::new("/srv/acme"), "staging", config);

        let target = remote_target(&ctx, "box").unwrap();
        assert_eq!(target.account().as_deref(), Some("deploy@localhost"));
        assert_eq!(project_dir(&ctx, &target), home.path().display().to_string());
        assert_eq!(
            drupal_root(&ctx, &target),
            format!("{}/web", home.path().display())
        );

        let out = run(&ctx, &target, "echo hi", Mode::Captured).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout.trim(), "hi");

        let err = run_checked(&ctx, &target, "exit 4", Mode::Captured).unwrap_err();
        assert_eq!(err.details["exitCode"], 4);
        assert_eq!(err.details["target"], "deploy@localhost");

        assert!(remote_target(&ctx, "missing").is_err());
    }
}

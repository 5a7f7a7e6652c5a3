//! Docker Compose lifecycle for the project's containers.

use crate::context::Context;
use crate::error::{CommandFailedDetails, Error, Result};
use crate::executor::{self, ExecOptions, ExecTarget, Mode, Role};
use crate::lock;
use crate::ssh::CommandOutput;
use crate::utils::{io, shell};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_WEB_PORT: u16 = 9481;
const DOCKER_SYNC_FILE: &str = "docker-sync.yml";
const COMPOSE_FILE: &str = "docker-compose.yml";
const OS_MARKER: &str = "-[os]";
const MACOS_SUFFIX: &str = "-dev-macos";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerReport {
    pub action: String,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerFilesReport {
    pub copied: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

pub fn uses_docker_sync(ctx: &Context) -> bool {
    ctx.path(DOCKER_SYNC_FILE).is_file()
}

/// Configured web service name without the docker-sync suffix.
pub fn base_web_container(ctx: &Context) -> String {
    ctx.config
        .docker()
        .map(|d| d.web_container.clone())
        .unwrap_or_else(|| "phpfpm".to_string())
}

/// Web service name; docker-sync setups expose it with an `sh` suffix.
pub fn web_service(ctx: &Context) -> String {
    let base = base_web_container(ctx);
    if uses_docker_sync(ctx) {
        format!("{}sh", base)
    } else {
        base
    }
}

fn run_tool(ctx: &Context, program: &str, args: &[&str], mode: Mode) -> CommandOutput {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    executor::run_program(program, &args, &ctx.root, ctx.uid, mode)
}

fn run_tool_checked(ctx: &Context, program: &str, args: &[&str], log: &mut Vec<String>) -> Result<()> {
    let display = format!("{} {}", program, args.join(" "));
    log_status!("docker", "{}", display);
    let output = run_tool(ctx, program, args, Mode::Passthrough);
    log.push(display.clone());
    output.into_result(&display, None).map(|_| ())
}

/// Container ID for a compose service.
pub fn container_id(ctx: &Context, service: &str) -> Result<String> {
    let output = run_tool(ctx, "docker-compose", &["ps", "-q", service], Mode::Captured);
    if !output.success {
        return Err(Error::command_failed(CommandFailedDetails {
            command: format!("docker-compose ps -q {}", service),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            target: None,
        }));
    }

    output
        .stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::docker_container_not_found(service))
}

pub fn up(ctx: &Context) -> Result<DockerReport> {
    let mut commands = Vec::new();
    if uses_docker_sync(ctx) {
        run_tool_checked(ctx, "docker-sync", &["start"], &mut commands)?;
    }
    run_tool_checked(ctx, "docker-compose", &["up", "-d"], &mut commands)?;
    Ok(DockerReport {
        action: "up".to_string(),
        commands,
    })
}

pub fn down(ctx: &Context) -> Result<DockerReport> {
    let mut commands = Vec::new();
    down_into(ctx, &mut commands)?;
    Ok(DockerReport {
        action: "down".to_string(),
        commands,
    })
}

fn down_into(ctx: &Context, commands: &mut Vec<String>) -> Result<()> {
    run_tool_checked(ctx, "docker-compose", &["down"], commands)?;
    if uses_docker_sync(ctx) {
        run_tool_checked(ctx, "docker-sync", &["stop"], commands)?;
    }
    Ok(())
}

pub fn restart(ctx: &Context) -> Result<DockerReport> {
    let mut commands = Vec::new();
    down_into(ctx, &mut commands)?;
    commands.extend(up(ctx)?.commands);
    Ok(DockerReport {
        action: "restart".to_string(),
        commands,
    })
}

/// Stop the containers and remove local images and volumes.
pub fn destroy(ctx: &Context) -> Result<DockerReport> {
    lock::ensure_unlocked(&ctx.root)?;

    let mut commands = Vec::new();
    down_into(ctx, &mut commands)?;
    run_tool_checked(
        ctx,
        "docker-compose",
        &["down", "--rmi", "local", "--volumes"],
        &mut commands,
    )?;
    Ok(DockerReport {
        action: "destroy".to_string(),
        commands,
    })
}

/// Stop, pull fresh images (optionally for one service) and start again.
pub fn refresh(ctx: &Context, service: Option<&str>) -> Result<DockerReport> {
    let mut commands = Vec::new();
    down_into(ctx, &mut commands)?;
    match service {
        Some(service) => run_tool_checked(ctx, "docker-compose", &["pull", service], &mut commands)?,
        None => run_tool_checked(ctx, "docker-compose", &["pull"], &mut commands)?,
    }
    commands.extend(up(ctx)?.commands);
    Ok(DockerReport {
        action: "refresh".to_string(),
        commands,
    })
}

fn open_shell(ctx: &Context, service: Option<&str>, user: Option<u32>) -> Result<i32> {
    let service = service.map(str::to_string).unwrap_or_else(|| web_service(ctx));
    let target = ExecTarget::Container {
        service,
        user,
        interactive: true,
    };
    let output = executor::run(ctx, &target, "/bin/bash", Mode::Interactive)?;
    Ok(output.exit_code)
}

/// Interactive shell in a service container as the invoking user.
pub fn shell(ctx: &Context, service: Option<&str>) -> Result<i32> {
    open_shell(ctx, service, Some(ctx.uid))
}

/// Interactive shell in a service container as the container's default (root) user.
pub fn root_shell(ctx: &Context, service: Option<&str>) -> Result<i32> {
    open_shell(ctx, service, None)
}

/// Drush command line: `<DrushCmd> <args> -y -r <drupal root>`.
pub fn drush_command(drush_cmd: &str, args: &[String], drupal_root: &str) -> String {
    let mut parts = vec![drush_cmd.to_string()];
    parts.extend(args.iter().map(|a| shell::quote_arg(a)));
    parts.push("-y".to_string());
    parts.push("-r".to_string());
    parts.push(shell::quote_arg(drupal_root));
    parts.join(" ")
}

/// Run drush in the web container (or locally without docker).
pub fn drush(ctx: &Context, args: &[String], not_interactive: bool) -> Result<i32> {
    let opts = ExecOptions {
        no_docker: false,
        not_interactive,
    };
    let target = executor::resolve_target(ctx, &opts, Role::Web);
    let command = drush_command(
        &ctx.settings().drush_cmd,
        args,
        &executor::drupal_root(ctx, &target),
    );
    let mode = if not_interactive {
        Mode::Passthrough
    } else {
        Mode::Interactive
    };
    Ok(executor::run(ctx, &target, &command, mode)?.exit_code)
}

/// Follow the last 100 log lines of a service.
pub fn log(ctx: &Context, service: Option<&str>) -> i32 {
    let service = service
        .map(str::to_string)
        .unwrap_or_else(|| base_web_container(ctx));
    run_tool(
        ctx,
        "docker-compose",
        &["logs", "--tail", "100", "--follow", &service],
        Mode::Interactive,
    )
    .exit_code
}

/// True when `docker-compose ps` lists the web service as up.
pub fn is_running(ctx: &Context) -> bool {
    let output = run_tool(ctx, "docker-compose", &["ps"], Mode::Captured);
    output.success && ps_shows_running(&output.stdout, &base_web_container(ctx))
}

/// Start the containers when docker is enabled and they are down.
/// Returns true when `up` ran.
pub fn ensure_running(ctx: &Context, no_docker: bool) -> Result<bool> {
    if !ctx.config.docker_enabled(no_docker) || is_running(ctx) {
        return Ok(false);
    }
    up(ctx)?;
    Ok(true)
}

pub fn ps_shows_running(ps_output: &str, service: &str) -> bool {
    ps_output
        .lines()
        .any(|line| line.contains("Up") && line.contains(service))
}

/// Copy the compose and user env templates when their targets are missing.
pub fn copy_docker_files(ctx: &Context) -> Result<DockerFilesReport> {
    let mut report = DockerFilesReport::default();
    let compose = ctx.path(COMPOSE_FILE);
    let compose_dist = ctx.path("docker-compose.yml.dist");

    if !compose.exists() && compose_dist.is_file() {
        io::copy_file(&compose_dist, &compose, "copy docker-compose.yml.dist")?;
        report.copied.push(COMPOSE_FILE.to_string());
        report.port = Some(assign_port(ctx, &compose)?);
    }

    let user_env = ctx.path("docker/env/user.env");
    let user_env_dist = ctx.path("docker/env/user.env.dist");
    if !user_env.exists() && user_env_dist.is_file() {
        io::copy_file(&user_env_dist, &user_env, "copy user.env.dist")?;
        report.copied.push("docker/env/user.env".to_string());
    }

    if compose.is_file() {
        let content = io::read_file(&compose, "read docker-compose.yml")?;
        if content.contains(OS_MARKER) {
            let replaced = replace_os_marker(&content, ctx.uid);
            io::write_file(&compose, &replaced, "write docker-compose.yml")?;
        }
    }

    Ok(report)
}

/// `-[os]` becomes `-dev-macos` for UIDs below 1000, nothing otherwise.
pub fn replace_os_marker(content: &str, uid: u32) -> String {
    let suffix = if uid < 1000 { MACOS_SUFFIX } else { "" };
    content.replace(OS_MARKER, suffix)
}

/// Pseudo-unique 8xxx port derived from the project name.
pub fn project_port(project_name: &str) -> u16 {
    let digest = Sha256::digest(project_name.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    8000 + (value % 1000) as u16
}

fn port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok()
}

/// Rewrite the default web port binding when the project port is free.
pub fn assign_port(ctx: &Context, compose: &Path) -> Result<u16> {
    let port = project_port(&ctx.project_name);
    if port_in_use(port) {
        log_status!("docker", "Using default port {}", DEFAULT_WEB_PORT);
        return Ok(DEFAULT_WEB_PORT);
    }

    let content = io::read_file(compose, "read docker-compose.yml")?;
    let replaced = content.replace(
        &format!("127.0.0.1:{}:80", DEFAULT_WEB_PORT),
        &format!("127.0.0.1:{}:80", port),
    );
    io::write_file(compose, &replaced, "write docker-compose.yml")?;
    log_status!("docker", "Using port {}", port);
    Ok(port)
}

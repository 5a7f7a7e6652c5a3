use crate::config::Connection;
use crate::error::{CommandFailedDetails, Error, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct SshClient {
    pub connection: String,
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    fn spawn_error(context: &str, err: io::Error) -> Self {
        Self {
            stdout: String::new(),
            stderr: format!("{}: {}", context, err),
            success: false,
            exit_code: -1,
        }
    }

    fn from_output(out: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        }
    }

    fn from_status(status: io::Result<std::process::ExitStatus>, context: &str) -> Self {
        match status {
            Ok(status) => Self {
                stdout: String::new(),
                stderr: String::new(),
                success: status.success(),
                exit_code: status.code().unwrap_or(-1),
            },
            Err(e) => Self::spawn_error(context, e),
        }
    }

    /// Turn a failed run into a `command.failed` (or `remote.command_failed`) error.
    pub fn into_result(self, command: &str, target: Option<String>) -> Result<CommandOutput> {
        if self.success {
            return Ok(self);
        }
        Err(Error::command_failed(CommandFailedDetails {
            command: command.to_string(),
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
            target,
        }))
    }
}

impl SshClient {
    pub fn from_connection(name: &str, connection: &Connection) -> Result<Self> {
        let host = match connection.server.as_deref() {
            Some(host) if !host.trim().is_empty() => host.trim().to_string(),
            _ => return Err(Error::ssh_server_invalid(name, vec!["server".to_string()])),
        };

        let identity_file = match &connection.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(name, expanded));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host);
        if is_local {
            log_status!("ssh", "Connection '{}' is localhost, using local execution", name);
        }

        Ok(Self {
            connection: name.to_string(),
            host,
            user: connection.user.clone(),
            port: connection.port,
            identity_file,
            is_local,
        })
    }

    /// `user@host`, or just the host when no user is configured.
    pub fn account(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Remote shell for `rsync -e`.
    pub fn rsync_shell(&self) -> String {
        let mut shell = format!("ssh -p {}", self.port);
        if let Some(identity_file) = &self.identity_file {
            shell.push_str(&format!(" -i {}", identity_file));
        }
        shell
    }

    fn build_ssh_args(&self, command: Option<&str>, interactive: bool, compress: bool) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        if compress {
            args.push("-C".to_string());
        }

        // Non-interactive sessions must never hang on a prompt or a stalled link.
        if !interactive {
            args.extend([
                "-o".to_string(),
                "BatchMode=yes".to_string(),
                "-o".to_string(),
                "ConnectTimeout=10".to_string(),
                "-o".to_string(),
                "ServerAliveInterval=15".to_string(),
                "-o".to_string(),
                "ServerAliveCountMax=3".to_string(),
            ]);
        } else if command.is_some() {
            args.push("-t".to_string());
        }

        args.push(self.account());

        if let Some(cmd) = command {
            args.push(cmd.to_string());
        }

        args
    }

    /// Run a remote command and capture its output.
    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(3, || self.execute_once(command))
    }

    /// Run a remote command, forwarding its output to stderr.
    pub fn execute_passthrough(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command_passthrough(command, None, None);
        }

        let args = self.build_ssh_args(Some(command), false, false);
        let status = Command::new("ssh")
            .args(&args)
            .stdout(stderr_stdio())
            .stderr(Stdio::inherit())
            .status();
        CommandOutput::from_status(status, "SSH error")
    }

    /// Run a remote command with its stdout written to a local file.
    pub fn execute_to_file(&self, command: &str, path: &Path) -> CommandOutput {
        self.execute_with_retry(3, || {
            let file = match File::create(path) {
                Ok(file) => file,
                Err(e) => return CommandOutput::spawn_error("Failed to create output file", e),
            };

            if self.is_local {
                return execute_local_command_to_file(command, file);
            }

            let args = self.build_ssh_args(Some(command), false, true);
            let output = Command::new("ssh")
                .args(&args)
                .stdout(Stdio::from(file))
                .stderr(Stdio::piped())
                .output();

            match output {
                Ok(out) => CommandOutput::from_output(out),
                Err(e) => CommandOutput::spawn_error("SSH error", e),
            }
        })
    }

    fn execute_with_retry<F>(&self, max_attempts: u32, run: F) -> CommandOutput
    where
        F: Fn() -> CommandOutput,
    {
        let backoff_secs = [0, 2, 5];

        let mut attempt = 0;
        loop {
            let result = run();

            // Only connection failures are retried, never remote command failures.
            if result.success
                || self.is_local
                || attempt + 1 >= max_attempts
                || !is_transient_ssh_error(&result)
            {
                return result;
            }

            let delay = backoff_secs.get(attempt as usize + 1).copied().unwrap_or(5);
            log_status!(
                "ssh",
                "Connection failed (attempt {}/{}), retrying in {}s...",
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            attempt += 1;
        }
    }

    fn execute_once(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command_in_dir(command, None, None);
        }

        let args = self.build_ssh_args(Some(command), false, false);
        match Command::new("ssh").args(&args).output() {
            Ok(out) => CommandOutput::from_output(out),
            Err(e) => CommandOutput::spawn_error("SSH error", e),
        }
    }

    pub fn execute_interactive(&self, command: Option<&str>) -> i32 {
        if self.is_local {
            return execute_local_command_interactive(command.unwrap_or("sh"), None, None);
        }

        let args = self.build_ssh_args(command, true, false);

        let status = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status();

        match status {
            Ok(s) => s.code().unwrap_or(-1),
            Err(_) => -1,
        }
    }
}

/// Child stdout routed to our stderr so JSON on stdout stays clean.
pub(crate) fn stderr_stdio() -> Stdio {
    Stdio::from(io::stderr())
}

fn shell_command(command: &str, current_dir: Option<&Path>, env: Option<&[(&str, &str)]>) -> Command {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    if let Some(env_pairs) = env {
        cmd.envs(env_pairs.iter().copied());
    }

    cmd
}

pub fn execute_local_command_in_dir(
    command: &str,
    current_dir: Option<&Path>,
    env: Option<&[(&str, &str)]>,
) -> CommandOutput {
    match shell_command(command, current_dir, env).output() {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::spawn_error("Command error", e),
    }
}

pub fn execute_local_command_interactive(
    command: &str,
    current_dir: Option<&Path>,
    env: Option<&[(&str, &str)]>,
) -> i32 {
    let status = shell_command(command, current_dir, env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(s) => s.code().unwrap_or(-1),
        Err(_) => -1,
    }
}

/// Execute local command with its output forwarded to stderr.
/// Returns only exit status, not captured output.
pub fn execute_local_command_passthrough(
    command: &str,
    current_dir: Option<&Path>,
    env: Option<&[(&str, &str)]>,
) -> CommandOutput {
    let status = shell_command(command, current_dir, env)
        .stdout(stderr_stdio())
        .stderr(Stdio::inherit())
        .status();
    CommandOutput::from_status(status, "Command error")
}

fn execute_local_command_to_file(command: &str, file: File) -> CommandOutput {
    let output = shell_command(command, None, None)
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped())
        .output();
    match output {
        Ok(out) => CommandOutput::from_output(out),
        Err(e) => CommandOutput::spawn_error("Command error", e),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

/// Check if an SSH failure is a transient connection error worth retrying.
fn is_transient_ssh_error(output: &CommandOutput) -> bool {
    let stderr = output.stderr.to_lowercase();
    // SSH exit code 255 = connection error (not a remote command failure)
    let is_connection_exit = output.exit_code == 255;

    let transient_patterns = [
        "connection refused",
        "connection reset",
        "connection timed out",
        "no route to host",
        "network is unreachable",
        "temporary failure in name resolution",
        "could not resolve hostname",
        "broken pipe",
        "connection closed by remote host",
    ];

    is_connection_exit || transient_patterns.iter().any(|p| stderr.contains(p))
}

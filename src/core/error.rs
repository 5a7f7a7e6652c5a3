use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingFile,
    ConfigInvalidYaml,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    ConnectionNotFound,
    DeployNotConfigured,
    BackupFileNotFound,
    DockerContainerNotFound,

    SshServerInvalid,
    SshIdentityFileNotFound,

    CommandFailed,
    RemoteCommandFailed,

    BuildLocked,
    BuildStepFailed,
    SyncRemoteInvalid,
    SiteSettingsTemplateMissing,
    DeployUnknownStrategy,
    DeployAborted,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingFile => "config.missing_file",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::ConnectionNotFound => "sync.source_not_found",
            ErrorCode::DeployNotConfigured => "deploy.not_configured",
            ErrorCode::BackupFileNotFound => "backup.file_not_found",
            ErrorCode::DockerContainerNotFound => "docker.container_not_found",

            ErrorCode::SshServerInvalid => "ssh.server_invalid",
            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",

            ErrorCode::CommandFailed => "command.failed",
            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::BuildLocked => "build.locked",
            ErrorCode::BuildStepFailed => "build.step_failed",
            ErrorCode::SyncRemoteInvalid => "sync.remote_invalid",
            ErrorCode::SiteSettingsTemplateMissing => "site.settings_template_missing",
            ErrorCode::DeployUnknownStrategy => "deploy.unknown_strategy",
            ErrorCode::DeployAborted => "deploy.aborted",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingFileDetails {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshServerInvalidDetails {
    pub connection: String,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStepFailedDetails {
    pub step: String,
    pub exit_code: i32,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn config_missing_file(path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ConfigMissingFile,
            "Configuration file not found",
            to_details(ConfigMissingFileDetails { path: path.into() }),
        )
        .with_hint("Run d2build from a project directory containing d2build.yml")
    }

    pub fn config_invalid_yaml(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidYaml,
            "Invalid YAML in configuration",
            to_details(ConfigInvalidYamlDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            to_details(ConfigInvalidValueDetails {
                key: key.into(),
                value,
                problem: problem.into(),
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem: problem.into(),
                id,
                tried,
            }),
        )
    }

    pub fn connection_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::ConnectionNotFound,
            format!("Connection '{}' not found", name),
            to_details(NotFoundDetails { id: name }),
        )
        .with_hint("Define it under settings.connections in d2build.yml")
    }

    pub fn deploy_not_configured() -> Self {
        Self::new(
            ErrorCode::DeployNotConfigured,
            "Deploy config not found",
            Value::Object(serde_json::Map::new()),
        )
        .with_hint("Add a target under settings.deploy in d2build.yml")
    }

    pub fn backup_file_not_found(file: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BackupFileNotFound,
            "Backup file not found",
            to_details(NotFoundDetails { id: file.into() }),
        )
    }

    pub fn docker_container_not_found(service: impl Into<String>) -> Self {
        let service = service.into();
        Self::new(
            ErrorCode::DockerContainerNotFound,
            format!("No running container for service '{}'", service),
            to_details(NotFoundDetails { id: service }),
        )
        .with_hint("Run 'd2build docker up' to start the containers")
    }

    pub fn ssh_server_invalid(connection: impl Into<String>, missing_fields: Vec<String>) -> Self {
        Self::new(
            ErrorCode::SshServerInvalid,
            "Connection is not properly configured",
            to_details(SshServerInvalidDetails {
                connection: connection.into(),
                missing_fields,
            }),
        )
    }

    pub fn ssh_identity_file_not_found(
        connection: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            serde_json::json!({
                "connection": connection.into(),
                "identityFile": identity_file.into(),
            }),
        )
    }

    pub fn command_failed(details: CommandFailedDetails) -> Self {
        let code = if details.target.is_some() {
            ErrorCode::RemoteCommandFailed
        } else {
            ErrorCode::CommandFailed
        };
        let message = if details.target.is_some() {
            "Remote command failed"
        } else {
            "Command failed"
        };
        Self::new(code, message, to_details(details))
    }

    pub fn build_locked(lock_file: impl Into<String>) -> Self {
        let lock_file = lock_file.into();
        Self::new(
            ErrorCode::BuildLocked,
            "The build system is currently locked. Syncing and reinitializing functions are disabled.",
            serde_json::json!({ "lockFile": lock_file }),
        )
        .with_hint(format!(
            "Delete {} (or run 'd2build unlock') to enable them",
            lock_file
        ))
    }

    pub fn build_step_failed(step: impl Into<String>, exit_code: i32) -> Self {
        let step = step.into();
        Self::new(
            ErrorCode::BuildStepFailed,
            format!("Build step '{}' failed", step),
            to_details(BuildStepFailedDetails { step, exit_code }),
        )
    }

    pub fn sync_remote_invalid(connection: impl Into<String>, missing_fields: Vec<String>) -> Self {
        Self::new(
            ErrorCode::SyncRemoteInvalid,
            "Not found remote server configuration",
            to_details(SshServerInvalidDetails {
                connection: connection.into(),
                missing_fields,
            }),
        )
    }

    pub fn site_settings_template_missing(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::SiteSettingsTemplateMissing,
            format!("Not found \"{}\" file", path),
            serde_json::json!({ "path": path }),
        )
    }

    pub fn deploy_unknown_strategy(strategy: impl Into<String>) -> Self {
        Self::validation_like(
            ErrorCode::DeployUnknownStrategy,
            "Unknown deploy strategy",
            strategy.into(),
        )
        .with_hint("Supported strategies: robo, robo+sync")
    }

    pub fn deploy_aborted(phase: impl Into<String>, issues: Vec<String>) -> Self {
        let phase = phase.into();
        Self::new(
            ErrorCode::DeployAborted,
            format!("Deploy stopped during {}", phase),
            serde_json::json!({ "phase": phase, "issues": issues }),
        )
    }

    fn validation_like(code: ErrorCode, message: &str, id: String) -> Self {
        Self::new(code, message, to_details(NotFoundDetails { id }))
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

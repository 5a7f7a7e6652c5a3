//! JSON envelope printed on stdout and exit code mapping.

use d2build::error::Hint;
use d2build::{Error, ErrorCode, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CliResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CliError>,
}

#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Hint>>,
}

impl<T: Serialize> CliResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::internal_json(e.to_string(), Some("serialize response".to_string()))
        })
    }
}

impl CliResponse<()> {
    pub fn from_error(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(CliError {
                code: err.code.as_str().to_string(),
                message: err.message.clone(),
                details: err.details.clone(),
                hints: (!err.hints.is_empty()).then(|| err.hints.clone()),
            }),
        }
    }
}

fn print_response<T: Serialize>(response: &CliResponse<T>) -> Result<()> {
    use std::io::{self, Write};

    let payload = response.to_json()?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", payload) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(Error::internal_io(e.to_string(), Some("write stdout".to_string())));
    }
    Ok(())
}

pub fn print_result<T: Serialize>(result: Result<T>) -> Result<()> {
    match result {
        Ok(data) => print_response(&CliResponse::success(data)),
        Err(err) => print_response(&CliResponse::<()>::from_error(&err)),
    }
}

pub fn map_cmd_result_to_json<T: Serialize>(
    result: Result<(T, i32)>,
) -> (Result<serde_json::Value>, i32) {
    match result {
        Ok((data, exit_code)) => match serde_json::to_value(data) {
            Ok(value) => (Ok(value), exit_code),
            Err(err) => (
                Err(Error::internal_json(
                    err.to_string(),
                    Some("serialize response".to_string()),
                )),
                1,
            ),
        },
        Err(err) => {
            let exit_code = exit_code_for_error(err.code);
            (Err(err), exit_code)
        }
    }
}

pub fn exit_code_for_error(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::ConfigMissingFile
        | ErrorCode::ConfigInvalidYaml
        | ErrorCode::ConfigInvalidValue
        | ErrorCode::ValidationInvalidArgument => 2,

        ErrorCode::ConnectionNotFound
        | ErrorCode::DeployNotConfigured
        | ErrorCode::BackupFileNotFound
        | ErrorCode::DockerContainerNotFound => 4,

        ErrorCode::SshServerInvalid | ErrorCode::SshIdentityFileNotFound => 10,

        ErrorCode::CommandFailed
        | ErrorCode::RemoteCommandFailed
        | ErrorCode::BuildLocked
        | ErrorCode::BuildStepFailed
        | ErrorCode::SyncRemoteInvalid
        | ErrorCode::SiteSettingsTemplateMissing
        | ErrorCode::DeployUnknownStrategy
        | ErrorCode::DeployAborted => 20,

        ErrorCode::InternalIoError
        | ErrorCode::InternalJsonError
        | ErrorCode::InternalUnexpected => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_omits_data_and_empty_hints() {
        let err = Error::backup_file_not_found("dump.sql.gz");
        let value = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("data").is_none());
        assert_eq!(value["error"]["code"], "backup.file_not_found");
        assert_eq!(value["error"]["details"]["id"], "dump.sql.gz");
        assert!(value["error"].get("hints").is_none());
    }

    #[test]
    fn error_envelope_keeps_hints() {
        let err = Error::build_locked(".d2build-locked");
        let value = serde_json::to_value(CliResponse::<()>::from_error(&err)).unwrap();
        assert!(value["error"]["hints"].as_array().is_some_and(|h| !h.is_empty()));
    }

    #[test]
    fn exit_codes_follow_error_family() {
        let cases = [
            (Error::config_missing_file("d2build.yml"), 2),
            (Error::validation_invalid_argument("tty", "needs a terminal", None, None), 2),
            (Error::connection_not_found("prod"), 4),
            (Error::ssh_server_invalid("prod", vec!["server".into()]), 10),
            (Error::build_step_failed("composer install", 1), 20),
            (Error::deploy_aborted("prepare", vec![]), 20),
            (Error::internal_unexpected("boom"), 1),
        ];
        for (err, code) in cases {
            let (result, exit) = map_cmd_result_to_json::<()>(Err(err));
            assert!(result.is_err());
            assert_eq!(exit, code);
        }
    }

    #[test]
    fn success_passes_exit_code_through() {
        let (result, exit) = map_cmd_result_to_json(Ok((vec!["a"], 1)));
        assert_eq!(result.unwrap(), serde_json::json!(["a"]));
        assert_eq!(exit, 1);
    }
}

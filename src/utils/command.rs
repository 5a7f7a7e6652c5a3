//! Captured command output and error text helpers.

use serde::Serialize;

/// Captured output from command execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl CapturedOutput {
    pub fn new(stdout: String, stderr: String) -> Self {
        Self { stdout, stderr }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

/// Prefer stderr, fall back to stdout when stderr is empty.
pub fn error_text(stdout: &str, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        stdout.trim().to_string()
    }
}

/// Last `n` lines of a command's output, for error messages.
pub fn tail_lines(text: &str, n: usize) -> String {
    let tail: Vec<&str> = text.lines().rev().take(n).collect();
    tail.into_iter().rev().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_text_prefers_stderr() {
        assert_eq!(error_text("stdout content", "stderr content"), "stderr content");
    }

    #[test]
    fn error_text_falls_back_to_stdout() {
        assert_eq!(error_text("stdout content\n", "  "), "stdout content");
    }

    #[test]
    fn tail_lines_keeps_last_lines_in_order() {
        assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail_lines("only", 5), "only");
    }

    #[test]
    fn captured_output_whitespace_is_empty() {
        assert!(CapturedOutput::new(" \n".to_string(), String::new()).is_empty());
    }
}

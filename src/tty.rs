//! Terminal I/O for the CLI: TTY detection and prompts.

use std::io::{self, BufRead, IsTerminal, Write};

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn is_stdout_tty() -> bool {
    io::stdout().is_terminal()
}

pub fn require_tty_for_interactive() -> bool {
    is_stdin_tty() && is_stdout_tty()
}

pub fn prompt(message: &str) -> d2build::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| d2build::Error::internal_io(e.to_string(), Some("read input".to_string())))?;

    Ok(line.trim().to_string())
}

/// Prompt with a default shown in brackets; empty input keeps the default.
pub fn prompt_default(message: &str, default: Option<&str>) -> d2build::Result<String> {
    let label = match default {
        Some(value) => format!("{} [{}]: ", message, value),
        None => format!("{}: ", message),
    };
    let answer = prompt(&label)?;
    if answer.is_empty() {
        return Ok(default.unwrap_or_default().to_string());
    }
    Ok(answer)
}

/// Yes/no question. Without a terminal the default is taken.
pub fn confirm(message: &str, default: bool) -> bool {
    confirm_on(is_stdin_tty(), message, default)
}

/// [`confirm`] with the terminal check already made.
pub fn confirm_on(interactive: bool, message: &str, default: bool) -> bool {
    if !interactive {
        return default;
    }
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    match prompt(&format!("{} {} ", message, suffix)) {
        Ok(answer) => parse_answer(&answer, default),
        Err(_) => default,
    }
}

fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

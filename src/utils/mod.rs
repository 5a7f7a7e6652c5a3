//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Captured command output and error text extraction
//! - `io` - File I/O with consistent error handling
//! - `shell` - Shell escaping and quoting
//! - `template` - `@token` substitution in config strings

pub mod command;
pub mod io;
pub mod shell;
pub mod template;

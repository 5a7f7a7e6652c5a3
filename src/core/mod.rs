// Public modules
pub mod backup;
pub mod build;
pub mod checklist;
pub mod checksum;
pub mod config;
pub mod context;
pub mod deploy;
pub mod docker;
pub mod environment;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod link;
pub mod lock;
pub mod output;
pub mod paths;
pub mod site_settings;
pub mod ssh;
pub mod sync;
pub mod theme;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};

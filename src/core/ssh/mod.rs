mod client;

pub use client::*;

use crate::context::Context;
use crate::error::Result;

/// SSH client for a named connection.
pub fn resolve(ctx: &Context, name: &str) -> Result<SshClient> {
    let connection = ctx.config.connection(name)?;
    SshClient::from_connection(name, connection)
}

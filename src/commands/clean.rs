use clap::Args;
use d2build::lifecycle::{self, CleanReport};

use super::CmdResult;

#[derive(Args)]
pub struct CleanArgs {}

pub fn run(_args: CleanArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<CleanReport> {
    let ctx = super::project_context()?;
    Ok((lifecycle::clean(&ctx)?, 0))
}

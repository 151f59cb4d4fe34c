//! `shebe-resolve`: command-line front end for the shebe-mcp resolver.

mod cli;
mod commands;
mod tracing;

use crate::cli::parse;
use crate::tracing::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = parse();

    init_tracing(TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
    })?;

    commands::execute(cli.command).await
}

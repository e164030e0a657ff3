use anyhow::Result;
use colored::Colorize;
use logsearch::{config, server};

/// Execute the start command
///
/// Configuration errors abort before any socket is bound.
pub async fn execute() -> Result<()> {
    println!("{}", "Starting log search API...".green());

    let cfg = config::load_config()?;

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}

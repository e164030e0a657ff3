use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute().await?;
        }
        cli::Commands::Check => {
            commands::check::execute()?;
        }
        cli::Commands::Version => {
            println!("logsearch v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "logsearch", version, about = "Audit log ingestion and search API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the API server (default)
    Start,

    /// Load and validate configuration from the environment, then exit
    Check,

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}

mod logging;
mod migrate;

pub use migrate::MigrateCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// shift - versioned SQL schema migrations
#[derive(Parser)]
#[command(name = "shift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage database migrations.
    Migrate(MigrateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Migrate(cmd) => cmd.execute().await,
        }
    }
}

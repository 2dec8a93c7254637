//! treemirror CLI - Keeps local directories in line with remote update sources
//!
//! Provides commands for:
//! - Checking which files each configured source would update
//! - Applying those updates
//! - Viewing and validating the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use treemirror_core::config::Config;

mod commands;
mod output;

use commands::{apply::ApplyCommand, check::CheckCommand, config::ConfigCommand};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "treemirror",
    version,
    about = "Mirror remote update sources into local directories"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show what each source would update, without changing anything
    Check(CheckCommand),
    /// Download and remove files so local directories match their sources
    Apply(ApplyCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Filter used when `RUST_LOG` is not set
    fn log_filter(&self, config: &Config) -> String {
        match self.verbose {
            0 => config.logging.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config_path();

    // Setup tracing
    let filter = cli.log_filter(&Config::load_or_default(&config_path));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Check(cmd) => cmd.execute(&config_path, format).await,
        Commands::Apply(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format).await,
    }
}

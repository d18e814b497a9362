//! simquery CLI - Command-line interface
//!
//! Drives the simquery library against a live backend: fetches one
//! endpoint through the full scheduling, caching and retry stack and prints
//! the payload, or manages the configuration file.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use error::CliError;
use simquery::config::{config_file_path, ConfigFile};
use simquery::logging::{init_logging_with_level, DEFAULT_LOG_LEVEL, VERBOSE_LOG_LEVEL};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "simquery")]
#[command(version = simquery::VERSION)]
#[command(about = "Query a simulation analysis backend", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Configuration file (default: ~/.simquery/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one endpoint and print its payload
    Fetch(FetchArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Config(command) => commands::config::run(command, &config_path),
        Commands::Fetch(args) => {
            let config = load_config(&config_path)?;
            let level = if cli.verbose {
                VERBOSE_LOG_LEVEL
            } else {
                DEFAULT_LOG_LEVEL
            };
            let _guard =
                init_logging_with_level(&config.logging.directory, &config.logging.file, level)
                    .map_err(CliError::LoggingInit)?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(CliError::Runtime)?;
            runtime.block_on(commands::fetch::run(args, &config))
        }
    }
}

fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(path)?)
}

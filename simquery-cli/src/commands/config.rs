//! Configuration management CLI commands.

use clap::Subcommand;
use simquery::config::ConfigFile;
use std::path::Path;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Init { force } => run_init(path, force),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;
    let source = if path.exists() {
        path.display().to_string()
    } else {
        "(defaults, no file)".to_string()
    };

    println!("Configuration: {}", source);
    println!();
    println!("[backend]");
    println!("  base_url          = {}", config.backend.base_url);
    println!("  api_prefix        = {}", config.backend.api_prefix);
    println!("  timeout_secs      = {}", config.backend.timeout_secs);
    println!("[scheduler]");
    println!("  max_concurrency   = {}", config.scheduler.max_concurrency);
    println!(
        "  dispatch_delay_ms = {}",
        config.scheduler.dispatch_delay.as_millis()
    );
    println!("[cache]");
    println!(
        "  dedup_window_ms   = {}",
        config.cache.dedup_window.as_millis()
    );
    println!("  max_entries       = {}", config.cache.max_entries);
    println!("[retry]");
    println!("  max_attempts      = {}", config.retry.max_attempts);
    println!("  base_delay_ms     = {}", config.retry.base_delay.as_millis());
    println!("[logging]");
    println!("  file              = {}", config.log_file_path().display());

    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Argument(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }

    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

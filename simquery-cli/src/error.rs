//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use simquery::config::ConfigFileError;
use simquery::FetchError;
use std::process;
use thiserror::Error;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug, Error)]
pub enum CliError {
    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(std::io::Error),

    /// Configuration file could not be read or written
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// Invalid command-line arguments
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Failed to start the async runtime
    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),

    /// The HTTP client could not be created
    #[error("Failed to create backend client: {0}")]
    Client(#[from] FetchError),

    /// The backend request failed
    #[error("Request failed: {0}")]
    Fetch(String),

    /// The payload could not be printed
    #[error("Failed to format response: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Argument(_) => 2,
            CliError::Fetch(_) => 3,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::InvalidValue { .. }) => {
                eprintln!();
                eprintln!("Run 'simquery config show' to see the effective settings,");
                eprintln!("or 'simquery config path' to locate the file.");
            }
            CliError::Fetch(_) => {
                eprintln!();
                eprintln!("Check that the backend is running and the base_url in the");
                eprintln!("[backend] section of the config file points at it.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Argument("x".into()).exit_code(), 2);
        assert_eq!(CliError::Fetch("x".into()).exit_code(), 3);
        assert_eq!(
            CliError::Client(FetchError::Network("x".into())).exit_code(),
            1
        );
    }

    #[test]
    fn test_display() {
        let err = CliError::Fetch("Request failed with status code 404".into());
        assert_eq!(
            err.to_string(),
            "Request failed: Request failed with status code 404"
        );
    }
}

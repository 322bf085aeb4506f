//! CLI error type.

use agrowatch::config::ConfigError;
use agrowatch::pins::PinError;
use agrowatch::QueryError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A query failed; the text is the user-facing message.
    #[error("{0}")]
    Query(String),

    #[error("Pin error: {0}")]
    Pins(#[from] PinError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Validation(message) => CliError::InvalidArgument(message),
            other => match other.user_message() {
                Some(message) => CliError::Query(message.text().to_string()),
                None => CliError::Query(other.to_string()),
            },
        }
    }
}

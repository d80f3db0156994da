//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer is offline or its device node is gone
    #[error("Printer offline: {0}")]
    Offline(String),

    /// Timeout waiting for the printer or the spooler
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The spooler refused or failed the job
    #[error("Spooler error: {0}")]
    Spooler(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;

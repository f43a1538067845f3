//! Error types shared across ratefeed crates

use thiserror::Error;

/// Result type alias for ratefeed operations
pub type Result<T> = std::result::Result<T, RatefeedError>;

/// Workspace-wide error type
#[derive(Error, Debug)]
pub enum RatefeedError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RatefeedError {
    /// Shorthand for a configuration error naming the offending variable
    pub fn config(var: &str, message: impl std::fmt::Display) -> Self {
        RatefeedError::Config(format!("{}: {}", var, message))
    }
}

//! Error types for meique-platform

use thiserror::Error;

/// Errors that can occur in platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install interrupt handler: {0}")]
    InterruptHandler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

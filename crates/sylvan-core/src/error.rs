//! Error types for the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration, reported when the system is configured
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Page generation failed inside a worker task
    #[error("Generation failed: {0}")]
    Generation(String),

    /// A persisted page no longer matches the current configuration
    #[error("Stale page cache {}: {reason} (delete the file to regenerate)", path.display())]
    StaleCache {
        /// File holding the stale page.
        path: PathBuf,
        /// Which stored parameter disagreed.
        reason: String,
    },

    /// The paging grid broke one of its invariants
    #[error("Grid consistency violated: {0}")]
    GridConsistency(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether the error needs an operator to fix something on disk.
    pub const fn is_operator_error(&self) -> bool {
        matches!(self, Self::StaleCache { .. })
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

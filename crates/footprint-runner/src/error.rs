//! Error types for the runner.

use footprint_tile::TileError;
use footprint_vector::PipelineError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Configuration file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed configuration document.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration parsed but unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Failure inside a pipeline stage.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Failure reading masks or tile geometry.
    #[error(transparent)]
    Tile(#[from] TileError),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

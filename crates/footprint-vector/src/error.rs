//! Error types for the postprocessing pipeline.

use footprint_tile::TileError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// An empty mask or an empty tile is not an error: it yields an empty
/// feature set and an empty (but processed) tile.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or inconsistent reference system, resolution or class map.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A merge request matched no cached tile datasets.
    #[error("Merge of {requested} requested tiles found no cached features")]
    EmptyMerge {
        /// Number of distinct coordinates requested.
        requested: usize,
    },

    /// A stage produced or received an invalid polygon.
    #[error("Invalid geometry during {stage}: {reason}")]
    GeometryValidity {
        /// Pipeline stage that detected the problem.
        stage: &'static str,
        /// What is wrong with the geometry.
        reason: String,
    },

    /// Reading or writing the tile cache failed.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored dataset could not be decoded.
    #[error("Corrupt dataset {}: {reason}", path.display())]
    Corrupt {
        /// Dataset file.
        path: PathBuf,
        /// Decoding failure.
        reason: String,
    },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed GeoJSON document or geometry.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// GeoJSON document that parses but does not fit the feature schema.
    #[error("Unsupported GeoJSON: {0}")]
    Decode(String),

    /// Tile addressing or mask error.
    #[error(transparent)]
    Tile(#[from] TileError),
}

impl PipelineError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid(stage: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::GeometryValidity {
            stage,
            reason: reason.into(),
        }
    }
}

//! Error types for the tile crate.

use thiserror::Error;

/// Errors that can occur when addressing tiles or reading masks.
#[derive(Debug, Error)]
pub enum TileError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// A tile key string that does not encode a coordinate.
    #[error("Invalid tile key: {0:?}")]
    InvalidTileKey(String),

    /// Bounding box with x1 >= x2 or y1 >= y2.
    #[error("Invalid bounding box ({x1}, {y1}, {x2}, {y2}): expected x1 < x2 and y1 < y2")]
    InvalidBoundingBox {
        /// West edge.
        x1: f64,
        /// South edge.
        y1: f64,
        /// East edge.
        x2: f64,
        /// North edge.
        y2: f64,
    },

    /// Tile size, border or resolution are inconsistent.
    #[error("Invalid tile geometry: {0}")]
    InvalidGeometry(String),

    /// Mask dimensions do not match the data buffer or the tile geometry.
    #[error("Mask shape mismatch: {0}")]
    MaskShape(String),

    /// Unsupported sample type in the TIFF file.
    #[error("Unsupported mask data type: {0}")]
    UnsupportedDataType(String),

    /// No mask is available for the requested tile.
    #[error("No mask found for tile {0}")]
    NoMaskForTile(String),
}

//! # footprint-tile
//!
//! Tile addressing and classification mask sources for footprint extraction.
//!
//! The processing grid is made of square tiles addressed by the integer
//! coordinate of their top-left corner. This crate provides:
//! - [`Coordinate`] with a tested `"{x}_{y}"` key encoding
//! - [`BoundingBox`] and [`bounding_box_of`], the single place where the
//!   optional border margin is applied
//! - [`TileGeometry`] (tile size, border, resolution) and the north-up
//!   [`GeoTransform`] from cell indices to map coordinates
//! - [`Mask`] plus the [`MaskSource`] abstraction with a directory-backed
//!   GeoTIFF reader and an in-memory implementation
//!
//! ## Example
//!
//! ```no_run
//! use footprint_tile::{Coordinate, LocalMaskSource, MaskSource, TileGeometry};
//!
//! let geometry = TileGeometry::new(256.0, 0.0, 0.2, false)?;
//! let source = LocalMaskSource::from_directory("masks")?;
//!
//! for coord in source.coordinates() {
//!     let mask = source.fetch(coord)?;
//!     let bbox = geometry.bounding_box(coord);
//!     println!("{coord}: {}x{} cells, {:?}", mask.width(), mask.height(), bbox);
//! }
//! # Ok::<(), footprint_tile::TileError>(())
//! ```

mod coord;
mod error;
mod mask;
mod source;

pub use coord::{bounding_box_of, BoundingBox, Coordinate, GeoTransform, TileGeometry};
pub use error::TileError;
pub use mask::Mask;
pub use source::{LocalMaskSource, MaskSource, MemoryMaskSource};

/// Result type for tile operations.
pub type Result<T> = std::result::Result<T, TileError>;

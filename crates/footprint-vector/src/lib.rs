//! # footprint-vector
//!
//! Turns per-tile classification masks into one cleaned, simplified vector
//! layer of building and structure footprints.
//!
//! ## Overview
//!
//! Tiles are processed independently and committed to a [`TileCache`];
//! consistency across tile seams is only restored when a set of tiles is
//! merged and postprocessed together:
//!
//! 1. [`Extractor`] vectorizes a [`Mask`](footprint_tile::Mask) into
//!    classified polygons aligned to the cell grid
//! 2. [`TileCache`] atomically replaces the stored features of a tile
//! 3. [`TileMerger`] concatenates the cached features of requested tiles
//! 4. [`dissolve_seams`] unions same-class parts split by a tile edge
//! 5. [`sieve`] and [`fill_holes`] drop small features and small holes
//! 6. [`simplify`] runs Douglas-Peucker on a shared arc topology
//! 7. [`clip`] restricts the result to a [`Region`]
//!
//! [`process_tiles`] runs steps 1-2 for a batch on the rayon pool, and
//! [`Postprocessor::run`] chains steps 3-7.
//!
//! ## Example
//!
//! ```no_run
//! use footprint_tile::{Coordinate, LocalMaskSource, TileGeometry};
//! use footprint_vector::{
//!     process_tiles, ClassMap, Epsg, Extractor, PostprocessConfig, Postprocessor, Region,
//!     TileCache,
//! };
//! use std::collections::HashSet;
//!
//! let geometry = TileGeometry::new(256.0, 0.0, 0.2, false)?;
//! let source = LocalMaskSource::from_directory("masks")?;
//! let extractor = Extractor::new(geometry, ClassMap::default())?;
//! let cache = TileCache::open("cached_tiles", Epsg(25832))?;
//!
//! let coords = vec![Coordinate::new(363_000, 5_621_000), Coordinate::new(363_256, 5_621_000)];
//! process_tiles(&source, &extractor, &cache, &coords)?;
//!
//! let requested: HashSet<Coordinate> = coords.iter().copied().collect();
//! let region = Region::BoundingBox(geometry.extent(&requested).expect("tiles requested"));
//! let postprocessor = Postprocessor::new(cache, PostprocessConfig::for_resolution(0.2))?;
//! let layer = postprocessor.run(&requested, &region)?;
//! footprint_vector::geojson::write_layer("footprints.geojson", &layer)?;
//! # Ok::<(), footprint_vector::PipelineError>(())
//! ```

mod cache;
mod clean;
mod clip;
mod dissolve;
mod error;
mod extract;
mod feature;
pub mod geojson;
mod merge;
mod pipeline;
mod rings;
mod topology;
pub mod validity;

pub use cache::{TileCache, TileState};
pub use clean::{fill_holes, hole_threshold, sieve};
pub use clip::{clip, Region};
pub use dissolve::dissolve_seams;
pub use error::PipelineError;
pub use extract::Extractor;
pub use feature::{ClassMap, Epsg, Feature, FeatureClass, Layer};
pub use merge::{EmptyMergePolicy, TileMerger};
pub use pipeline::{process_tiles, BatchReport, PostprocessConfig, Postprocessor};
pub use topology::simplify;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

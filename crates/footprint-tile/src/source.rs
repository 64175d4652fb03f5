//! Mask sources.
//!
//! The segmentation model that turns imagery into masks runs upstream; a
//! [`MaskSource`] only hands out its results per tile.

use crate::{Coordinate, Mask, Result, TileError};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Something that can produce the classification mask of a tile.
///
/// Implementations must be shareable across the worker threads that
/// process tiles in parallel.
pub trait MaskSource: Send + Sync {
    /// Mask for the tile whose top-left corner is `coord`.
    fn fetch(&self, coord: Coordinate) -> Result<Mask>;

    /// Tiles this source can serve, in ascending order.
    fn coordinates(&self) -> Vec<Coordinate>;
}

/// Mask rasters on disk, one `{x}_{y}.tif` file per tile.
///
/// Indexing only looks at filenames; rasters are decoded on [`fetch`](MaskSource::fetch).
#[derive(Debug, Default)]
pub struct LocalMaskSource {
    /// Indexed mask files by tile.
    paths: BTreeMap<Coordinate, PathBuf>,
}

impl LocalMaskSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source and index a directory.
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut source = Self::new();
        source.add_directory(dir)?;
        Ok(source)
    }

    /// Add all `{x}_{y}.tif` / `.tiff` files from a directory to the index.
    ///
    /// Files with other names are skipped. Returns the number of tiles indexed.
    pub fn add_directory<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let mut count = 0;

        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();
            if !path
                .extension()
                .is_some_and(|ext| ext == "tif" || ext == "tiff")
            {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Coordinate::from_key(stem) {
                Ok(coord) => {
                    self.paths.insert(coord, path);
                    count += 1;
                }
                Err(_) => debug!(path = %path.display(), "skipping file without a tile key"),
            }
        }

        Ok(count)
    }

    /// Number of indexed tiles.
    pub fn tile_count(&self) -> usize {
        self.paths.len()
    }
}

impl MaskSource for LocalMaskSource {
    fn fetch(&self, coord: Coordinate) -> Result<Mask> {
        let path = self
            .paths
            .get(&coord)
            .ok_or_else(|| TileError::NoMaskForTile(coord.key()))?;
        Mask::from_tiff(path)
    }

    fn coordinates(&self) -> Vec<Coordinate> {
        self.paths.keys().copied().collect()
    }
}

/// Masks held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryMaskSource {
    masks: HashMap<Coordinate, Mask>,
}

impl MemoryMaskSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the mask for a tile.
    pub fn insert(&mut self, coord: Coordinate, mask: Mask) {
        self.masks.insert(coord, mask);
    }
}

impl MaskSource for MemoryMaskSource {
    fn fetch(&self, coord: Coordinate) -> Result<Mask> {
        self.masks
            .get(&coord)
            .cloned()
            .ok_or_else(|| TileError::NoMaskForTile(coord.key()))
    }

    fn coordinates(&self) -> Vec<Coordinate> {
        let mut coords: Vec<_> = self.masks.keys().copied().collect();
        coords.sort();
        coords
    }
}

//! On-disk cache of per-tile feature sets.
//!
//! Layout: one directory per processed tile, named by its key, holding at
//! most one GeoJSON dataset named after the same key:
//!
//! ```text
//! cache_dir/
//!   363000_5621000/
//!     363000_5621000.geojson
//!   363256_5621000/          (processed, no features)
//! ```

use crate::feature::{Epsg, Feature, Layer};
use crate::geojson::{layer_from_str, layer_to_string};
use crate::validity::check_feature;
use crate::{PipelineError, Result};
use footprint_tile::Coordinate;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STAGE: &str = "cache";
const EXTENSION: &str = "geojson";

/// Processing state of one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Never written.
    Unprocessed,
    /// Written with no features.
    Empty,
    /// Written with at least one feature.
    Populated,
}

/// Tile cache rooted at a directory.
///
/// Writes to different tiles never conflict. Writes to the same tile must
/// be serialized by the caller.
#[derive(Debug, Clone)]
pub struct TileCache {
    root: PathBuf,
    epsg: Epsg,
}

impl TileCache {
    /// Open (and create if needed) a cache directory for the given reference system.
    pub fn open<P: AsRef<Path>>(root: P, epsg: Epsg) -> Result<Self> {
        epsg.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| PipelineError::storage(&root, e))?;
        Ok(Self { root, epsg })
    }

    /// Cache directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reference system of every stored dataset.
    pub fn epsg(&self) -> Epsg {
        self.epsg
    }

    fn tile_dir(&self, coord: Coordinate) -> PathBuf {
        self.root.join(coord.key())
    }

    fn dataset_path(&self, coord: Coordinate) -> PathBuf {
        self.tile_dir(coord)
            .join(format!("{}.{EXTENSION}", coord.key()))
    }

    /// Replace the stored features of a tile.
    ///
    /// A non-empty set is written to a temporary file and renamed over the
    /// dataset, so readers see either the old or the new content. An empty
    /// set removes the dataset. Any other entry in the tile directory is
    /// removed afterwards.
    pub fn put(&self, coord: Coordinate, features: &[Feature]) -> Result<()> {
        let dir = self.tile_dir(coord);
        fs::create_dir_all(&dir).map_err(|e| PipelineError::storage(&dir, e))?;
        let dataset = self.dataset_path(coord);

        if features.is_empty() {
            match fs::remove_file(&dataset) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(PipelineError::storage(&dataset, e)),
            }
        } else {
            for feature in features {
                check_feature(feature, STAGE)?;
            }
            let text = layer_to_string(&Layer::new(self.epsg, features.to_vec()))?;
            let temp = dir.join(format!(".{}.{EXTENSION}.tmp", coord.key()));
            fs::write(&temp, text).map_err(|e| PipelineError::storage(&temp, e))?;
            fs::rename(&temp, &dataset).map_err(|e| PipelineError::storage(&dataset, e))?;
        }

        self.sweep(&dir, &dataset)?;
        debug!(tile = %coord, features = features.len(), "Stored tile");
        Ok(())
    }

    /// Remove everything in a tile directory except its dataset.
    fn sweep(&self, dir: &Path, keep: &Path) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| PipelineError::storage(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::storage(dir, e))?;
            let path = entry.path();
            if path == keep {
                continue;
            }
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            removed.map_err(|e| PipelineError::storage(&path, e))?;
            debug!(path = %path.display(), "Removed stale cache entry");
        }
        Ok(())
    }

    /// Stored layer of a tile; empty if the tile was never written or its
    /// last write was empty.
    pub fn get(&self, coord: Coordinate) -> Result<Layer> {
        let dataset = self.dataset_path(coord);
        let text = match fs::read_to_string(&dataset) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Layer::empty(self.epsg)),
            Err(e) => return Err(PipelineError::storage(&dataset, e)),
        };
        let layer = layer_from_str(&text).map_err(|e| PipelineError::Corrupt {
            path: dataset.clone(),
            reason: e.to_string(),
        })?;
        if layer.epsg != self.epsg {
            return Err(PipelineError::Configuration(format!(
                "{} is tagged {}, cache uses {}",
                dataset.display(),
                layer.epsg,
                self.epsg
            )));
        }
        for feature in &layer.features {
            check_feature(feature, STAGE)?;
        }
        Ok(layer)
    }

    /// Processing state of a tile.
    pub fn state(&self, coord: Coordinate) -> TileState {
        if self.dataset_path(coord).is_file() {
            TileState::Populated
        } else if self.tile_dir(coord).is_dir() {
            TileState::Empty
        } else {
            TileState::Unprocessed
        }
    }

    /// Coordinates of every processed tile, sorted.
    ///
    /// Directories whose name is not a tile key are skipped.
    pub fn tiles(&self) -> Result<Vec<Coordinate>> {
        let entries = fs::read_dir(&self.root).map_err(|e| PipelineError::storage(&self.root, e))?;
        let mut tiles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::storage(&self.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(Coordinate::from_key) {
                Some(Ok(coord)) => tiles.push(coord),
                _ => warn!(entry = ?name, "Skipping directory that is not a tile key"),
            }
        }
        tiles.sort();
        Ok(tiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureClass;
    use geo::polygon;
    use tempfile::TempDir;

    fn square(x: f64, y: f64, side: f64, class: FeatureClass) -> Feature {
        Feature::new(
            class,
            polygon![(x: x, y: y), (x: x + side, y: y), (x: x + side, y: y + side), (x: x, y: y + side)],
        )
    }

    fn cache() -> (TempDir, TileCache) {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path().join("tiles"), Epsg(25832)).unwrap();
        (dir, cache)
    }

    #[test]
    fn test_states() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new(-10, 20);
        assert_eq!(cache.state(coord), TileState::Unprocessed);
        cache.put(coord, &[]).unwrap();
        assert_eq!(cache.state(coord), TileState::Empty);
        cache.put(coord, &[square(0.0, 0.0, 2.0, FeatureClass::Building)]).unwrap();
        assert_eq!(cache.state(coord), TileState::Populated);
        assert_eq!(cache.tiles().unwrap(), vec![coord]);
    }

    #[test]
    fn test_layout_and_no_temp_files() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new(363_000, 5_621_000);
        cache.put(coord, &[square(0.0, 0.0, 2.0, FeatureClass::Structure)]).unwrap();
        let tile_dir = cache.root().join("363000_5621000");
        let names: Vec<String> = fs::read_dir(&tile_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["363000_5621000.geojson".to_string()]);
    }

    #[test]
    fn test_stale_entries_are_removed() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new(0, 0);
        let tile_dir = cache.root().join(coord.key());
        fs::create_dir_all(tile_dir.join("old_layer")).unwrap();
        fs::write(tile_dir.join("leftover.shp"), b"x").unwrap();
        cache.put(coord, &[]).unwrap();
        assert_eq!(fs::read_dir(&tile_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_foreign_directories_are_ignored() {
        let (_dir, cache) = cache();
        fs::create_dir_all(cache.root().join("not_a_tile")).unwrap();
        fs::write(cache.root().join("README"), b"x").unwrap();
        cache.put(Coordinate::new(5, -5), &[]).unwrap();
        assert_eq!(cache.tiles().unwrap(), vec![Coordinate::new(5, -5)]);
    }

    #[test]
    fn test_corrupt_dataset() {
        let (_dir, cache) = cache();
        let coord = Coordinate::new(1, 2);
        cache.put(coord, &[square(0.0, 0.0, 1.0, FeatureClass::Building)]).unwrap();
        fs::write(cache.dataset_path(coord), b"{not json").unwrap();
        assert!(matches!(cache.get(coord), Err(PipelineError::Corrupt { .. })));
    }

    #[test]
    fn test_foreign_crs_is_rejected() {
        let (dir, cache) = cache();
        let coord = Coordinate::new(1, 2);
        cache.put(coord, &[square(0.0, 0.0, 1.0, FeatureClass::Building)]).unwrap();
        let other = TileCache::open(dir.path().join("tiles"), Epsg(3857)).unwrap();
        assert!(matches!(other.get(coord), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn test_invalid_feature_is_not_stored() {
        let (_dir, cache) = cache();
        let bow_tie = Feature::new(
            FeatureClass::Building,
            polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)],
        );
        assert!(matches!(
            cache.put(Coordinate::new(0, 0), &[bow_tie]),
            Err(PipelineError::GeometryValidity { .. })
        ));
    }
}

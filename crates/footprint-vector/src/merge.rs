//! Gathering cached tiles into one layer.

use crate::cache::TileCache;
use crate::feature::{Epsg, Layer};
use crate::{PipelineError, Result};
use footprint_metrics::metric_defs;
use footprint_tile::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// What a merge that matches no cached features returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyMergePolicy {
    /// An empty layer.
    #[default]
    #[serde(rename = "empty")]
    ReturnEmpty,
    /// [`PipelineError::EmptyMerge`].
    Error,
}

/// Concatenates the cached feature sets of a requested set of tiles.
///
/// Must only run once every write to the requested tiles has finished.
#[derive(Debug, Clone)]
pub struct TileMerger {
    cache: TileCache,
    policy: EmptyMergePolicy,
}

impl TileMerger {
    /// Merger reading from `cache`.
    pub fn new(cache: TileCache, policy: EmptyMergePolicy) -> Self {
        Self { cache, policy }
    }

    /// Merge the tiles in `coords` that are cached and non-empty.
    ///
    /// Tiles are visited in coordinate order so the output does not depend on
    /// the iteration order of `coords`. Geometry is copied unchanged.
    pub fn merge(&self, coords: &HashSet<Coordinate>, epsg: Epsg) -> Result<Layer> {
        if epsg != self.cache.epsg() {
            return Err(PipelineError::Configuration(format!(
                "merge requested in {epsg}, cache holds {}",
                self.cache.epsg()
            )));
        }

        let mut layer = Layer::empty(epsg);
        let mut included = 0usize;
        for coord in self.cache.tiles()? {
            if !coords.contains(&coord) {
                continue;
            }
            let tile = self.cache.get(coord)?;
            if tile.is_empty() {
                debug!(tile = %coord, "Skipping empty tile");
                continue;
            }
            included += 1;
            layer.extend(tile)?;
        }
        metrics::counter!(metric_defs::MERGE_TILES.name).increment(included as u64);

        if included == 0 {
            match self.policy {
                EmptyMergePolicy::Error => {
                    return Err(PipelineError::EmptyMerge {
                        requested: coords.len(),
                    })
                }
                EmptyMergePolicy::ReturnEmpty => {
                    info!(requested = coords.len(), "No cached features for requested tiles");
                }
            }
        } else {
            info!(
                requested = coords.len(),
                tiles = included,
                features = layer.len(),
                "Merged tiles"
            );
        }
        Ok(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, FeatureClass};
    use geo::polygon;
    use tempfile::TempDir;

    fn unit(x: f64, y: f64) -> Feature {
        Feature::new(
            FeatureClass::Building,
            polygon![(x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0)],
        )
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            serde_json::from_str::<EmptyMergePolicy>("\"empty\"").unwrap(),
            EmptyMergePolicy::ReturnEmpty
        );
        assert_eq!(
            serde_json::from_str::<EmptyMergePolicy>("\"error\"").unwrap(),
            EmptyMergePolicy::Error
        );
        assert_eq!(EmptyMergePolicy::default(), EmptyMergePolicy::ReturnEmpty);
    }

    #[test]
    fn test_merge_selects_requested_tiles() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path(), Epsg(25832)).unwrap();
        cache.put(Coordinate::new(-10, 10), &[unit(-10.0, 5.0)]).unwrap();
        cache.put(Coordinate::new(0, 10), &[unit(0.0, 5.0), unit(3.0, 5.0)]).unwrap();
        cache.put(Coordinate::new(10, 10), &[unit(10.0, 5.0)]).unwrap();
        cache.put(Coordinate::new(20, 10), &[]).unwrap();

        let merger = TileMerger::new(cache, EmptyMergePolicy::Error);
        let coords = HashSet::from([
            Coordinate::new(-10, 10),
            Coordinate::new(0, 10),
            Coordinate::new(20, 10),
            Coordinate::new(30, 10),
        ]);
        let layer = merger.merge(&coords, Epsg(25832)).unwrap();
        assert_eq!(layer.len(), 3);
        assert_eq!(layer.epsg, Epsg(25832));

        let nothing = HashSet::from([Coordinate::new(20, 10)]);
        assert!(matches!(
            merger.merge(&nothing, Epsg(25832)),
            Err(PipelineError::EmptyMerge { requested: 1 })
        ));
        assert!(matches!(
            merger.merge(&coords, Epsg(4326)),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_policy_returns_empty_layer() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path(), Epsg(25832)).unwrap();
        let merger = TileMerger::new(cache, EmptyMergePolicy::ReturnEmpty);
        let layer = merger.merge(&HashSet::new(), Epsg(25832)).unwrap();
        assert!(layer.is_empty());
    }
}

//! Orchestration: parallel tile extraction and the postprocessing chain.

use crate::cache::TileCache;
use crate::clean::{fill_holes, sieve};
use crate::clip::{clip, Region};
use crate::dissolve::dissolve_seams;
use crate::extract::Extractor;
use crate::feature::{Epsg, Layer};
use crate::merge::{EmptyMergePolicy, TileMerger};
use crate::topology::simplify;
use crate::{PipelineError, Result};
use footprint_metrics::metric_defs;
use footprint_tile::{Coordinate, MaskSource};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of a tile batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Distinct tiles extracted and stored.
    pub processed: usize,
    /// Tiles that produced no features.
    pub empty: usize,
    /// Features stored across all tiles.
    pub features: usize,
}

/// Extract and cache every tile in `coords` on the rayon pool.
///
/// Duplicate coordinates are processed once, so no tile is written twice
/// concurrently. Returns after every write has finished, which makes the
/// call a barrier before merging the same tiles. The first error aborts the
/// batch; tiles already written stay written.
pub fn process_tiles<S>(
    source: &S,
    extractor: &Extractor,
    cache: &TileCache,
    coords: &[Coordinate],
) -> Result<BatchReport>
where
    S: MaskSource + ?Sized,
{
    let distinct: Vec<Coordinate> = coords
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    info!(
        tiles = distinct.len(),
        threads = rayon::current_num_threads(),
        "Processing tiles"
    );
    let start = Instant::now();

    let counts: Vec<usize> = distinct
        .par_iter()
        .map(|&coord| -> Result<usize> {
            let mask = source.fetch(coord)?;
            let features = extractor.extract(&mask, coord)?;
            cache.put(coord, &features)?;
            metrics::counter!(metric_defs::TILES_EXTRACTED.name).increment(1);
            if features.is_empty() {
                metrics::counter!(metric_defs::TILES_EMPTY.name).increment(1);
            }
            Ok(features.len())
        })
        .collect::<Result<Vec<_>>>()?;

    let report = BatchReport {
        processed: counts.len(),
        empty: counts.iter().filter(|&&n| n == 0).count(),
        features: counts.iter().sum(),
    };
    metrics::histogram!(metric_defs::STAGE_DURATION.name, "stage" => "extract")
        .record(start.elapsed().as_secs_f64());
    info!(
        processed = report.processed,
        empty = report.empty,
        features = report.features,
        elapsed_s = start.elapsed().as_secs_f64(),
        "Tile batch finished"
    );
    Ok(report)
}

fn default_sieve() -> f64 {
    2.0
}

fn default_hole() -> f64 {
    1.0
}

/// Thresholds of the postprocessing chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostprocessConfig {
    /// Minimum feature area in square metres.
    #[serde(default = "default_sieve")]
    pub sieve_m2: f64,
    /// Base hole area in square metres; doubled for buildings.
    #[serde(default = "default_hole")]
    pub hole_m2: f64,
    /// Douglas-Peucker tolerance in metres.
    pub simplify_tolerance_m: f64,
    /// Result of a merge with no cached features.
    #[serde(default)]
    pub empty_merge: EmptyMergePolicy,
}

impl PostprocessConfig {
    /// Default thresholds with the tolerance set to one cell.
    pub fn for_resolution(resolution_m: f64) -> Self {
        Self {
            sieve_m2: default_sieve(),
            hole_m2: default_hole(),
            simplify_tolerance_m: resolution_m,
            empty_merge: EmptyMergePolicy::default(),
        }
    }

    /// Reject negative or non-finite thresholds.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("sieve_m2", self.sieve_m2),
            ("hole_m2", self.hole_m2),
            ("simplify_tolerance_m", self.simplify_tolerance_m),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(PipelineError::Configuration(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Merge, reconcile, clean, simplify and clip cached tiles.
#[derive(Debug, Clone)]
pub struct Postprocessor {
    merger: TileMerger,
    epsg: Epsg,
    config: PostprocessConfig,
}

impl Postprocessor {
    /// Postprocessor over `cache` in the cache's reference system.
    pub fn new(cache: TileCache, config: PostprocessConfig) -> Result<Self> {
        config.validate()?;
        let epsg = cache.epsg();
        Ok(Self {
            merger: TileMerger::new(cache, config.empty_merge),
            epsg,
            config,
        })
    }

    /// Thresholds in use.
    pub fn config(&self) -> &PostprocessConfig {
        &self.config
    }

    fn stage<F>(name: &'static str, f: F) -> Result<Layer>
    where
        F: FnOnce() -> Result<Layer>,
    {
        let start = Instant::now();
        let layer = f()?;
        let elapsed = start.elapsed().as_secs_f64();
        metrics::histogram!(metric_defs::STAGE_DURATION.name, "stage" => name).record(elapsed);
        info!(stage = name, features = layer.len(), elapsed_s = elapsed, "Stage finished");
        Ok(layer)
    }

    /// Run the chain for the tiles in `coords`, clipped to `region`.
    ///
    /// Every write to the requested tiles must have finished.
    pub fn run(&self, coords: &HashSet<Coordinate>, region: &Region) -> Result<Layer> {
        let c = self.config;
        debug!(tiles = coords.len(), config = ?c, "Postprocessing");
        let layer = Self::stage("merge", || self.merger.merge(coords, self.epsg))?;
        let layer = Self::stage("dissolve", || dissolve_seams(layer))?;
        let layer = Self::stage("sieve", || Ok(sieve(layer, c.sieve_m2)))?;
        let layer = Self::stage("fill_holes", || Ok(fill_holes(layer, c.hole_m2)))?;
        let layer = Self::stage("simplify", || simplify(layer, c.simplify_tolerance_m))?;
        Self::stage("clip", || clip(layer, region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::ClassMap;
    use footprint_tile::{Mask, MemoryMaskSource, TileGeometry};
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = PostprocessConfig::for_resolution(0.2);
        assert_eq!(config.simplify_tolerance_m, 0.2);
        config.validate().unwrap();
        config.sieve_m2 = -1.0;
        assert!(config.validate().is_err());
        config.sieve_m2 = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_defaults_from_yaml_like_json() {
        let config: PostprocessConfig =
            serde_json::from_str(r#"{"simplify_tolerance_m": 0.5, "empty_merge": "error"}"#).unwrap();
        assert_eq!(config.sieve_m2, 2.0);
        assert_eq!(config.hole_m2, 1.0);
        assert_eq!(config.empty_merge, EmptyMergePolicy::Error);
    }

    #[test]
    fn test_batch_collapses_duplicates_and_counts() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path(), Epsg(25832)).unwrap();
        let extractor = Extractor::new(
            TileGeometry::new(4.0, 0.0, 1.0, false).unwrap(),
            ClassMap::default(),
        )
        .unwrap();
        let mut source = MemoryMaskSource::new();
        source.insert(Coordinate::new(0, 4), Mask::from_fn(4, 4, |r, c| u8::from(r < 2 && c < 2)));
        source.insert(Coordinate::new(4, 4), Mask::from_fn(4, 4, |_, _| 0));

        let coords = [Coordinate::new(0, 4), Coordinate::new(4, 4), Coordinate::new(0, 4)];
        let report = process_tiles(&source, &extractor, &cache, &coords).unwrap();
        assert_eq!(
            report,
            BatchReport {
                processed: 2,
                empty: 1,
                features: 1
            }
        );
        assert_eq!(cache.tiles().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_mask_fails_batch() {
        let dir = TempDir::new().unwrap();
        let cache = TileCache::open(dir.path(), Epsg(25832)).unwrap();
        let extractor = Extractor::new(
            TileGeometry::new(4.0, 0.0, 1.0, false).unwrap(),
            ClassMap::default(),
        )
        .unwrap();
        let source = MemoryMaskSource::new();
        assert!(matches!(
            process_tiles(&source, &extractor, &cache, &[Coordinate::new(0, 4)]),
            Err(PipelineError::Tile(_))
        ));
    }
}

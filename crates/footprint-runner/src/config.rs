//! YAML run configuration.
//!
//! ```yaml
//! tile:
//!   size_m: 256
//!   resolution_m: 0.2
//! epsg: 25832
//! cache_dir: out/cached_tiles
//! classes: { 1: building, 2: structure }
//! postprocess:
//!   sieve_m2: 2.0
//!   empty_merge: error
//! ```
//!
//! Only `tile`, `epsg` and `cache_dir` are required. The simplification
//! tolerance defaults to one cell.

use crate::error::{Result, RunnerError};
use footprint_tile::TileGeometry;
use footprint_vector::{ClassMap, EmptyMergePolicy, Epsg, PostprocessConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides for the postprocessing thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostprocessSection {
    /// Features smaller than this area (m²) are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sieve_m2: Option<f64>,
    /// Base hole-fill area (m²); doubled for buildings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hole_m2: Option<f64>,
    /// Douglas-Peucker tolerance in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplify_tolerance_m: Option<f64>,
    /// What a merge over tiles without features returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_merge: Option<EmptyMergePolicy>,
}

/// Everything a run needs, loaded once and passed down by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Processing grid.
    pub tile: TileGeometry,
    /// Reference system of masks, cache and output.
    pub epsg: Epsg,
    /// Root directory of the tile cache.
    pub cache_dir: PathBuf,
    /// Mask label to class mapping.
    #[serde(default)]
    pub classes: ClassMap,
    /// Threshold overrides.
    #[serde(default)]
    pub postprocess: PostprocessSection,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RunnerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Check the grid, the reference system, the cache path and the
    /// effective postprocessing thresholds.
    pub fn validate(&self) -> Result<()> {
        self.tile.validate()?;
        self.epsg.validate()?;
        if self.cache_dir.as_os_str().is_empty() {
            return Err(RunnerError::Config("cache_dir must not be empty".to_string()));
        }
        self.postprocess_config().validate()?;
        Ok(())
    }

    /// Postprocessing thresholds with defaults filled in.
    pub fn postprocess_config(&self) -> PostprocessConfig {
        let mut config = PostprocessConfig::for_resolution(self.tile.resolution_m);
        let section = &self.postprocess;
        if let Some(sieve) = section.sieve_m2 {
            config.sieve_m2 = sieve;
        }
        if let Some(hole) = section.hole_m2 {
            config.hole_m2 = hole;
        }
        if let Some(tolerance) = section.simplify_tolerance_m {
            config.simplify_tolerance_m = tolerance;
        }
        if let Some(policy) = section.empty_merge {
            config.empty_merge = policy;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use footprint_vector::{FeatureClass, PipelineError};

    const MINIMAL: &str = r#"
tile:
  size_m: 256
  resolution_m: 0.2
epsg: 25832
cache_dir: out/cached_tiles
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.tile.tile_cells(), 1280);
        assert!(!config.tile.clip_border);
        assert_eq!(config.epsg, Epsg(25832));
        assert_eq!(config.classes, ClassMap::default());

        let post = config.postprocess_config();
        assert_eq!(post.sieve_m2, 2.0);
        assert_eq!(post.hole_m2, 1.0);
        assert_eq!(post.simplify_tolerance_m, 0.2);
        assert_eq!(post.empty_merge, EmptyMergePolicy::ReturnEmpty);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
tile:
  size_m: 100
  border_m: 10
  resolution_m: 0.5
  clip_border: true
epsg: 2056
cache_dir: /tmp/cache
classes:
  3: building
  7: structure
postprocess:
  sieve_m2: 4.0
  hole_m2: 0.5
  simplify_tolerance_m: 1.0
  empty_merge: error
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.tile.mask_cells(), 240);
        assert_eq!(config.classes.class_of(3), Some(FeatureClass::Building));
        assert_eq!(config.classes.class_of(1), None);
        let post = config.postprocess_config();
        assert_eq!(post.sieve_m2, 4.0);
        assert_eq!(post.simplify_tolerance_m, 1.0);
        assert_eq!(post.empty_merge, EmptyMergePolicy::Error);
    }

    #[test]
    fn test_invalid_configs() {
        let bad_resolution = MINIMAL.replace("0.2", "0.3");
        assert!(matches!(
            Config::from_yaml(&bad_resolution),
            Err(RunnerError::Tile(_))
        ));

        let zero_epsg = MINIMAL.replace("25832", "0");
        assert!(matches!(
            Config::from_yaml(&zero_epsg),
            Err(RunnerError::Pipeline(PipelineError::Configuration(_)))
        ));

        let negative_sieve = format!("{MINIMAL}postprocess:\n  sieve_m2: -1\n");
        assert!(Config::from_yaml(&negative_sieve).is_err());

        let background = format!("{MINIMAL}classes:\n  0: building\n");
        assert!(matches!(Config::from_yaml(&background), Err(RunnerError::Yaml(_))));

        let unknown = format!("{MINIMAL}threads: 4\n");
        assert!(Config::from_yaml(&unknown).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/footprint.yaml"),
            Err(RunnerError::Io { .. })
        ));
    }
}
